//! 比赛扫描器

use crate::config::EngineConfig;
use crate::core::cache::{CacheSink, CacheSource, ReplayCache};
use crate::core::ocr::{DecoderContext, RecognizerFactory};
use crate::core::video::VideoSource;
use crate::error::EngineError;
use crate::match_reader::accuracy::{self, AccuracyReport};
use crate::match_reader::{
    reconcile_totals, scan_video, time_video, CancelToken, ClipWindow, OverlayReader, ScanResult,
};
use log::info;
use std::path::Path;
use std::sync::Arc;

/// Output of a full analysis: the scan, the reconciled total and the clip
/// windows derived from it.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: ScanResult,
    pub total: Option<u32>,
    pub windows: Vec<ClipWindow>,
}

/// 比赛扫描器 - 持有识别器池，可复用于多段视频
///
/// ```ignore
/// let scanner = MatchScanner::create(EngineConfig::default(), factory)?;
/// let cache = MatchScanner::open_cache(None, Some(Path::new("run.cache")))?;
/// let analysis = scanner.analyze(&mut video, cache, &CancelToken::new())?;
/// ```
pub struct MatchScanner {
    config: EngineConfig,
    ctx: DecoderContext,
}

impl MatchScanner {
    /// Validate `config` and bring the recognizer pools up.
    pub fn create(
        config: EngineConfig,
        factory: Arc<dyn RecognizerFactory>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let ctx = DecoderContext::new(factory, config.pools.clone());
        ctx.initialize()?;
        info!("🎬 MatchScanner: created");
        Ok(Self { config, ctx })
    }

    pub fn from_config_file(
        path: impl AsRef<Path>,
        factory: Arc<dyn RecognizerFactory>,
    ) -> Result<Self, EngineError> {
        Self::create(EngineConfig::from_file(path)?, factory)
    }

    /// Build a replay cache from optional file paths.
    pub fn open_cache(
        replay_from: Option<&Path>,
        record_to: Option<&Path>,
    ) -> Result<ReplayCache, EngineError> {
        let mut cache = ReplayCache::disabled();
        if let Some(path) = replay_from {
            cache = cache.with_source(CacheSource::open(path)?);
        }
        if let Some(path) = record_to {
            cache = cache.with_sink(CacheSink::open(path)?);
        }
        Ok(cache)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &DecoderContext {
        &self.ctx
    }

    pub fn scan(
        &self,
        video: &mut dyn VideoSource,
        cache: ReplayCache,
        cancel: &CancelToken,
    ) -> Result<ScanResult, EngineError> {
        scan_video(video, &self.ctx, &self.config, cache, cancel)
    }

    /// Scan, reconcile totals, then time every match.
    pub fn analyze(
        &self,
        video: &mut dyn VideoSource,
        cache: ReplayCache,
        cancel: &CancelToken,
    ) -> Result<Analysis, EngineError> {
        let mut result = self.scan(video, cache, cancel)?;
        let total = reconcile_totals(&mut result);
        let windows = time_video(&result, &self.config.timing);
        Ok(Analysis {
            result,
            total,
            windows,
        })
    }

    /// Score per-frame reading against a hand-made transcript of
    /// `image{N}.{extension}` stills in `image_dir`.
    pub fn measure_accuracy(
        &self,
        transcript_path: impl AsRef<Path>,
        image_dir: impl AsRef<Path>,
        extension: &str,
    ) -> Result<AccuracyReport, EngineError> {
        self.ctx.initialize()?;
        let text = std::fs::read_to_string(transcript_path.as_ref())
            .map_err(accuracy::AccuracyError::from)?;
        let transcript = accuracy::parse_transcript(&text);

        let reader = OverlayReader::new(&self.ctx, &self.config);
        let dir = image_dir.as_ref();
        let report = accuracy::measure_accuracy(&reader, &transcript, |n| {
            accuracy::load_frame(accuracy::image_path(dir, n, extension), n)
        })?;
        Ok(report)
    }

    /// Release the recognizer pools. A later scan brings them back up.
    pub fn shutdown(&self) {
        self.ctx.teardown();
    }
}

impl Drop for MatchScanner {
    fn drop(&mut self) {
        self.ctx.teardown();
        info!("🗑️ MatchScanner: released");
    }
}
