//! 整段视频扫描
//!
//! Moments are read strictly one after another at a fixed stride, since
//! every read moves the shared seek position of the video source.

use super::moment::{MomentReader, Observation};
use crate::config::EngineConfig;
use crate::core::cache::ReplayCache;
use crate::core::ocr::DecoderContext;
use crate::core::video::{VideoError, VideoSource};
use crate::error::EngineError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Observations keyed by timestamp (ms), iterated in time order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    observations: BTreeMap<u64, Observation>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, observation: Observation) {
        self.observations.insert(observation.timestamp_ms, observation);
    }

    pub fn get(&self, timestamp_ms: u64) -> Option<&Observation> {
        self.observations.get(&timestamp_ms)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, u64, Observation> {
        self.observations.values()
    }

    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, u64, Observation> {
        self.observations.values_mut()
    }

    /// Observations that carry a match label.
    pub fn events(&self) -> impl Iterator<Item = &Observation> {
        self.iter().filter(|o| o.is_event())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl FromIterator<Observation> for ScanResult {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        let mut result = ScanResult::new();
        for observation in iter {
            result.insert(observation);
        }
        result
    }
}

/// 外部中断信号，可跨线程克隆
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Releases the video and the recognizer pools unless the scan completed.
/// Runs on early return and on unwinding alike.
struct ScanGuard<'v, 'c> {
    video: &'v mut dyn VideoSource,
    ctx: &'c DecoderContext,
    completed: bool,
}

impl Drop for ScanGuard<'_, '_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        warn!("🧹 Scan aborted, releasing video source and recognizer pools");
        self.video.release();
        self.ctx.teardown();
    }
}

/// Scan a whole video, one moment per stride.
///
/// The stride is `match_duration / stride_divisor`. Source exhaustion ends
/// the scan early with the observations gathered so far. Cancellation and
/// pool failures release the video and tear down `ctx` before the error is
/// returned; no partial result escapes in that case.
pub fn scan_video(
    video: &mut dyn VideoSource,
    ctx: &DecoderContext,
    config: &EngineConfig,
    cache: ReplayCache,
    cancel: &CancelToken,
) -> Result<ScanResult, EngineError> {
    config.validate()?;
    if !(video.fps() > 0.0) {
        return Err(VideoError::Open(format!("unusable frame rate {}", video.fps())).into());
    }
    ctx.initialize()?;

    let mut guard = ScanGuard {
        video,
        ctx,
        completed: false,
    };

    let stride_ms = (config.timing.match_duration_ms() / config.scan.stride_divisor as u64).max(1);
    let duration_ms = guard.video.duration_ms().max(0.0) as u64;
    info!(
        "🎬 Scanning {:.1}s of video every {} ms",
        duration_ms as f64 / 1000.0,
        stride_ms
    );

    let started = Instant::now();
    let mut reader = MomentReader::new(ctx, config, cache);
    let mut result = ScanResult::new();
    let mut timestamp_ms = 0;

    while timestamp_ms < duration_ms {
        if cancel.is_cancelled() {
            warn!("⏹️ Scan interrupted at {} ms", timestamp_ms);
            return Err(EngineError::Interrupted);
        }

        let observation = reader.read_moment(&mut *guard.video, timestamp_ms)?;
        result.insert(observation);

        if reader.is_exhausted() {
            info!("📼 Source exhausted at {} ms, keeping {} moments", timestamp_ms, result.len());
            break;
        }
        timestamp_ms += stride_ms;
    }

    reader.finish();
    guard.completed = true;
    info!(
        "✅ Scan finished: {} moments, {} with a match label, {:.2}s",
        result.len(),
        result.events().count(),
        started.elapsed().as_secs_f64()
    );
    Ok(result)
}
