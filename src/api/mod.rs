pub mod clips;
pub mod scanner;

pub use clips::{export_clips, plan_clips, ClipError, ClipJob, ClipTranscoder};
pub use scanner::{Analysis, MatchScanner};
