//! 文字识别资源层
//!
//! Recognizer handles are expensive to build, so each decoding role owns a
//! small fixed-size pool of them. `DecoderContext` owns both pools and is
//! threaded through the scan explicitly.

pub mod context;
pub mod error;
pub mod pool;
pub mod recognizer;

pub use context::DecoderContext;
pub use error::DetectError;
pub use pool::{PooledRecognizer, RecognizerPool};
pub use recognizer::{
    LayoutHint, MockRecognizer, MockRecognizerFactory, Recognizer, RecognizerFactory,
    RecognizerRole,
};
