pub mod frame;
pub mod source;

pub use frame::{Frame, Rect};
pub use source::{MockVideoSource, VideoError, VideoSource};
