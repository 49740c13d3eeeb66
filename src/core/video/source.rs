//! 视频源抽象
//!
//! Decoding and seeking live outside this crate. The engine only needs a
//! stateful cursor over decoded frames.

use super::frame::Frame;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Video open failed: {0}")]
    Open(String),
    #[error("Seek failed: {0}")]
    Seek(String),
    #[error("Frame decode failed: {0}")]
    Decode(String),
    #[error("Video source already released")]
    Released,
}

/// A seekable stream of decoded frames.
///
/// Seeking is stateful: `next_frame` returns the frame at the current
/// index and advances it, so callers must never share one source between
/// concurrent readers.
pub trait VideoSource: Send {
    fn timestamp_ms(&self) -> f64;
    fn set_timestamp_ms(&mut self, timestamp_ms: f64) -> Result<(), VideoError>;

    /// 0-based index of the frame `next_frame` will return.
    fn frame_index(&self) -> u64;
    fn set_frame_index(&mut self, index: u64) -> Result<(), VideoError>;

    fn fps(&self) -> f64;
    fn frame_count(&self) -> u64;
    fn dimensions(&self) -> (u32, u32);

    /// `Ok(None)` signals end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;

    /// Release decoder resources. Must be safe to call more than once.
    fn release(&mut self);

    /// Total playable length derived from frame count and frame period.
    fn duration_ms(&self) -> f64 {
        let fps = self.fps();
        if fps <= 0.0 {
            return 0.0;
        }
        self.frame_count() as f64 * 1000.0 / fps
    }
}

type FramePainter = Box<dyn Fn(u64, &mut Frame) + Send>;
type ReadHook = Box<dyn Fn(u64) + Send>;

/// 内存中的模拟视频源，帧内容由闭包生成
pub struct MockVideoSource {
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u64,
    position: u64,
    released: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
    painter: Option<FramePainter>,
    on_read: Option<ReadHook>,
    fail_after: Option<u64>,
}

impl MockVideoSource {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
            position: 0,
            released: Arc::new(AtomicBool::new(false)),
            reads: Arc::new(AtomicUsize::new(0)),
            painter: None,
            on_read: None,
            fail_after: None,
        }
    }

    /// Draw custom content into each generated frame.
    pub fn with_painter<F>(mut self, painter: F) -> Self
    where
        F: Fn(u64, &mut Frame) + Send + 'static,
    {
        self.painter = Some(Box::new(painter));
        self
    }

    /// Invoke `hook` with the frame index on every successful read.
    pub fn with_read_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(u64) + Send + 'static,
    {
        self.on_read = Some(Box::new(hook));
        self
    }

    /// Report a decode error for every frame at or past `index`.
    pub fn failing_after(mut self, index: u64) -> Self {
        self.fail_after = Some(index);
        self
    }

    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), VideoError> {
        if self.is_released() {
            return Err(VideoError::Released);
        }
        Ok(())
    }
}

impl VideoSource for MockVideoSource {
    fn timestamp_ms(&self) -> f64 {
        self.position as f64 * 1000.0 / self.fps
    }

    fn set_timestamp_ms(&mut self, timestamp_ms: f64) -> Result<(), VideoError> {
        let index = (timestamp_ms.max(0.0) * self.fps / 1000.0).round() as u64;
        self.set_frame_index(index)
    }

    fn frame_index(&self) -> u64 {
        self.position
    }

    fn set_frame_index(&mut self, index: u64) -> Result<(), VideoError> {
        self.check_open()?;
        self.position = index.min(self.frame_count);
        Ok(())
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        self.check_open()?;
        if self.position >= self.frame_count {
            return Ok(None);
        }
        let index = self.position;
        if self.fail_after.is_some_and(|limit| index >= limit) {
            return Err(VideoError::Decode(format!("frame {} unreadable", index)));
        }

        let timestamp_ms = (index as f64 * 1000.0 / self.fps) as u64;
        let mut frame = Frame::filled(self.width, self.height, 0, timestamp_ms, index);
        if let Some(painter) = &self.painter {
            painter(index, &mut frame);
        }

        self.position += 1;
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_read {
            hook(index);
        }
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}
