use crate::config::ConfigError;
use crate::core::cache::CacheError;
use crate::core::ocr::DetectError;
use crate::core::video::VideoError;
use crate::match_reader::AccuracyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Recognizer error: {0}")]
    Detect(#[from] DetectError),
    #[error("Video error: {0}")]
    Video(#[from] VideoError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Accuracy run error: {0}")]
    Accuracy(#[from] AccuracyError),
    #[error("Scan interrupted")]
    Interrupted,
}
