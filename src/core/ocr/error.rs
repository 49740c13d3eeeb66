use super::recognizer::RecognizerRole;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Recognizer failed: {0}")]
    Recognition(String),
    #[error("Recognizer creation failed: {0}")]
    CreateFailed(String),
    #[error("Pool size for {0} recognizers must be at least 1")]
    InvalidPoolSize(RecognizerRole),
    #[error("Decoder context not initialized")]
    NotInitialized,
    #[error("{0} recognizer pool already torn down")]
    PoolClosed(RecognizerRole),
}
