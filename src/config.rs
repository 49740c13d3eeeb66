//! 引擎配置
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. Files are json5 (comments and trailing commas allowed).

use crate::core::ocr::RecognizerRole;
use crate::core::video::Rect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] json5::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Overlay geometry at the reference resolution.
///
/// Frames are scaled by height alone since some sources crop the sides,
/// so only the reference height is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub reference_height: u32,
    pub label_rect: Rect,
    pub countdown_rect: Rect,
    pub label_enlarge: f32,
    pub countdown_enlarge: f32,
    pub contour_enlarge: f32,
    /// 边缘梯度阈值 (0-255)
    pub edge_threshold: u8,
    /// A glyph contour must span at least this fraction of the region height.
    pub min_glyph_height_ratio: f32,
    pub min_glyph_pixels: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            reference_height: 288,
            label_rect: Rect::new(107, 224, 103, 16),
            countdown_rect: Rect::new(244, 243, 28, 13),
            label_enlarge: 5.0,
            countdown_enlarge: 20.0,
            contour_enlarge: 14.0,
            edge_threshold: 48,
            min_glyph_height_ratio: 0.4,
            min_glyph_pixels: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Minimum shape similarity (0.0 - 1.0) for a template to match at all.
    pub similarity_cutoff: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: 0.6,
        }
    }
}

/// Agreement a voted reading needs, as `numerator / denominator` of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl AgreementRatio {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `votes / total >= numerator / denominator`, in integer arithmetic.
    pub fn is_met(&self, votes: usize, total: usize) -> bool {
        total > 0 && votes as u64 * self.denominator as u64 >= self.numerator as u64 * total as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentConfig {
    pub min_samples: u32,
    pub max_samples: u32,
    pub agreement: AgreementRatio,
}

impl Default for MomentConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            max_samples: 9,
            agreement: AgreementRatio::new(4, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Stride between moments is `match_duration / stride_divisor`.
    pub stride_divisor: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { stride_divisor: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub match_duration_secs: u32,
    pub preroll_secs: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            match_duration_secs: 180,
            preroll_secs: 40,
        }
    }
}

impl TimingConfig {
    pub fn match_duration_ms(&self) -> u64 {
        self.match_duration_secs as u64 * 1000
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub label_handles: usize,
    pub countdown_handles: usize,
    /// 标签识别后清空自适应状态（实测略有负面影响，默认关闭）
    pub reset_label_adaptive: bool,
    /// 倒计时识别后清空自适应状态（实测明显提升准确率）
    pub reset_countdown_adaptive: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let handles = num_cpus::get().clamp(1, 4);
        Self {
            label_handles: handles,
            countdown_handles: handles,
            reset_label_adaptive: false,
            reset_countdown_adaptive: true,
        }
    }
}

impl PoolConfig {
    pub fn capacity(&self, role: RecognizerRole) -> usize {
        match role {
            RecognizerRole::Label => self.label_handles,
            RecognizerRole::Countdown => self.countdown_handles,
        }
    }

    pub fn resets_after_step(&self, role: RecognizerRole) -> bool {
        match role {
            RecognizerRole::Label => self.reset_label_adaptive,
            RecognizerRole::Countdown => self.reset_countdown_adaptive,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub region: RegionConfig,
    pub label: LabelConfig,
    pub moment: MomentConfig,
    pub scan: ScanConfig,
    pub timing: TimingConfig,
    pub pools: PoolConfig,
}

impl EngineConfig {
    pub fn from_json5_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };

        if self.pools.label_handles == 0 || self.pools.countdown_handles == 0 {
            return invalid("recognizer pools need at least one handle per role");
        }
        if self.moment.min_samples == 0 {
            return invalid("moment.min_samples must be at least 1");
        }
        if self.moment.max_samples < self.moment.min_samples {
            return invalid("moment.max_samples must not be below moment.min_samples");
        }
        let agreement = self.moment.agreement;
        if agreement.numerator == 0 || agreement.numerator > agreement.denominator {
            return invalid("moment.agreement must be a ratio in (0, 1]");
        }
        if self.scan.stride_divisor == 0 {
            return invalid("scan.stride_divisor must be at least 1");
        }
        if self.timing.match_duration_secs == 0 {
            return invalid("timing.match_duration_secs must be at least 1");
        }
        if self.region.reference_height == 0 {
            return invalid("region.reference_height must be non-zero");
        }
        if self.region.label_rect.is_empty() || self.region.countdown_rect.is_empty() {
            return invalid("overlay rectangles must be non-empty");
        }
        let ratios = [
            self.region.label_enlarge,
            self.region.countdown_enlarge,
            self.region.contour_enlarge,
        ];
        if ratios.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return invalid("enlarge ratios must be positive");
        }
        if !(0.0..=1.0).contains(&self.label.similarity_cutoff) {
            return invalid("label.similarity_cutoff must be within 0.0 - 1.0");
        }
        Ok(())
    }
}
