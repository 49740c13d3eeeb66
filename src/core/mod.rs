pub mod cache;
pub mod ocr;
pub mod video;
