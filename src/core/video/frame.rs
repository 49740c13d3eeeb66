use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// 纯色帧，主要给测试和占位用
    pub fn filled(width: u32, height: u32, fill: u8, timestamp_ms: u64, frame_number: u64) -> Self {
        let mut data = vec![fill; (width * height * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self::new(width, height, data, timestamp_ms, frame_number)
    }

    /// 从已解码图像构建帧（测试截图等）
    pub fn from_image(image: RgbaImage, timestamp_ms: u64, frame_number: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw(), timestamp_ms, frame_number)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let idx = ((y * self.width + x) * 4) as usize;
        match self.data.get(idx..idx + 3) {
            Some(rgb) => {
                ((rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000) as u8
            }
            None => 0,
        }
    }

    /// Crop a rectangle out of the frame as a grayscale raster.
    ///
    /// The rectangle is clamped to the frame; a rectangle that falls fully
    /// outside yields a 1x1 black raster so downstream recognition simply
    /// reads nothing.
    pub fn crop_luma(&self, rect: Rect) -> GrayImage {
        let rect = rect.clamp_to(self.width, self.height);
        if rect.is_empty() {
            return GrayImage::from_pixel(1, 1, Luma([0]));
        }

        GrayImage::from_fn(rect.width, rect.height, |x, y| {
            Luma([self.luma_at(rect.x + x, rect.y + y)])
        })
    }
}

/// 像素矩形 (x, y, width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Scale every coordinate by the same factor, rounding to the nearest pixel.
    pub fn scaled(&self, factor: f64) -> Rect {
        let s = |v: u32| (v as f64 * factor).round().max(0.0) as u32;
        Rect::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }

    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rect::new(
            x,
            y,
            self.width.min(width - x),
            self.height.min(height - y),
        )
    }
}
