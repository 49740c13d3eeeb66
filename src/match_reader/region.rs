//! 叠加层区域提取
//!
//! Cuts the label and countdown regions out of a frame and prepares the
//! rasters handed to recognition. Geometry is fixed configuration at a
//! reference resolution and scaled by frame height only, since some
//! sources crop the sides of the picture.

use crate::config::RegionConfig;
use crate::core::video::{Frame, Rect};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use log::debug;

/// Two independent candidates for the countdown region.
#[derive(Debug, Clone)]
pub struct CountdownRasters {
    /// Plain crop, enlarged.
    pub direct: GrayImage,
    /// Glyph pixels isolated by contour, enlarged. Falls back to a copy of
    /// `direct` when no usable contour is found.
    pub isolated: GrayImage,
}

#[derive(Debug, Clone, Copy)]
struct Component {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u32,
}

impl Component {
    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

pub struct RegionExtractor {
    config: RegionConfig,
}

impl RegionExtractor {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    /// Frame height over reference height.
    pub fn scale_for(&self, frame_height: u32) -> f64 {
        frame_height as f64 / self.config.reference_height as f64
    }

    pub fn label_rect(&self, frame_height: u32) -> Rect {
        self.config.label_rect.scaled(self.scale_for(frame_height))
    }

    pub fn countdown_rect(&self, frame_height: u32) -> Rect {
        self.config.countdown_rect.scaled(self.scale_for(frame_height))
    }

    pub fn label_raster(&self, frame: &Frame) -> GrayImage {
        let crop = frame.crop_luma(self.label_rect(frame.height));
        enlarge(&crop, self.config.label_enlarge)
    }

    pub fn countdown_rasters(&self, frame: &Frame) -> CountdownRasters {
        let crop = frame.crop_luma(self.countdown_rect(frame.height));
        let direct = enlarge(&crop, self.config.countdown_enlarge);

        let isolated = match self.isolate_glyphs(&crop) {
            Some(glyphs) => enlarge(&glyphs, self.config.contour_enlarge),
            None => {
                debug!(
                    "🔍 No glyph contours in countdown region of frame {}, reusing direct crop",
                    frame.frame_number
                );
                direct.clone()
            }
        };

        CountdownRasters { direct, isolated }
    }

    /// Redraw the glyphs found in `crop` as dark ink on a white canvas.
    ///
    /// Glyphs are 8-connected components of the gradient edge mask that are
    /// tall enough and large enough. Inside each kept bounding box, pixels
    /// brighter than the box mean become ink.
    fn isolate_glyphs(&self, crop: &GrayImage) -> Option<GrayImage> {
        let (w, h) = crop.dimensions();
        let mask = edge_mask(crop, self.config.edge_threshold);
        let min_height = (h as f32 * self.config.min_glyph_height_ratio).ceil() as u32;

        let glyphs: Vec<Component> = connected_components(&mask, w, h)
            .into_iter()
            .filter(|c| c.height() >= min_height && c.pixels >= self.config.min_glyph_pixels)
            .collect();
        if glyphs.is_empty() {
            return None;
        }

        let mut canvas = GrayImage::from_pixel(w, h, Luma([255]));
        for glyph in &glyphs {
            let mut sum = 0u64;
            let mut count = 0u64;
            for y in glyph.min_y..=glyph.max_y {
                for x in glyph.min_x..=glyph.max_x {
                    sum += crop.get_pixel(x, y).0[0] as u64;
                    count += 1;
                }
            }
            let mean = (sum / count.max(1)) as u8;

            for y in glyph.min_y..=glyph.max_y {
                for x in glyph.min_x..=glyph.max_x {
                    if crop.get_pixel(x, y).0[0] > mean {
                        canvas.put_pixel(x, y, Luma([0]));
                    }
                }
            }
        }

        Some(canvas)
    }
}

fn enlarge(raster: &GrayImage, ratio: f32) -> GrayImage {
    let (w, h) = raster.dimensions();
    let nw = ((w as f32 * ratio).round() as u32).max(1);
    let nh = ((h as f32 * ratio).round() as u32).max(1);
    imageops::resize(raster, nw, nh, FilterType::Triangle)
}

/// Central-difference gradient magnitude (L1) above `threshold`, interior
/// pixels only.
fn edge_mask(raster: &GrayImage, threshold: u8) -> Vec<bool> {
    let (w, h) = raster.dimensions();
    let mut mask = vec![false; (w * h) as usize];
    if w < 3 || h < 3 {
        return mask;
    }

    let px = |x: u32, y: u32| raster.get_pixel(x, y).0[0] as i32;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = px(x + 1, y) - px(x - 1, y);
            let gy = px(x, y + 1) - px(x, y - 1);
            if gx.abs() + gy.abs() > threshold as i32 {
                mask[(y * w + x) as usize] = true;
            }
        }
    }
    mask
}

fn connected_components(mask: &[bool], w: u32, h: u32) -> Vec<Component> {
    let mut seen = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);

        let (sx, sy) = ((start as u32) % w, (start as u32) / w);
        let mut c = Component {
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
            pixels: 0,
        };

        while let Some(idx) = stack.pop() {
            let (x, y) = ((idx as u32) % w, (idx as u32) / w);
            c.pixels += 1;
            c.min_x = c.min_x.min(x);
            c.max_x = c.max_x.max(x);
            c.min_y = c.min_y.min(y);
            c.max_y = c.max_y.max(y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let n = (ny * w + nx) as usize;
                    if mask[n] && !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }
        }
        components.push(c);
    }
    components
}
