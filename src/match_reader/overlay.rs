//! 单帧叠加层读取：区域提取 → 识别 → 解码

use super::decoder::{decode_countdown, Decoded, LabelDecoder};
use super::region::RegionExtractor;
use super::template::{MatchDescriptor, MatchTemplate};
use crate::config::EngineConfig;
use crate::core::cache::CacheEntry;
use crate::core::ocr::{DecoderContext, DetectError, RecognizerRole};
use crate::core::video::Frame;
use image::GrayImage;
use log::{debug, warn};
use rayon::prelude::*;
use thiserror::Error;

/// Why a cache row could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The row names a template this build does not know.
    #[error("unknown template code {0:?}")]
    UnknownTemplate(String),

    /// The values could never have come out of the label decoder.
    #[error("values do not fit the {0} slots")]
    InvalidSlots(String),
}

/// What one frame says about the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameReading {
    /// A decoded label (possibly empty, meaning "no event") and countdown.
    Read {
        descriptor: MatchDescriptor,
        countdown: Option<u32>,
    },
    Undecodable,
}

impl FrameReading {
    pub fn no_event() -> Self {
        FrameReading::Read {
            descriptor: MatchDescriptor::empty(),
            countdown: None,
        }
    }

    pub fn is_undecodable(&self) -> bool {
        matches!(self, FrameReading::Undecodable)
    }

    pub fn to_cache_entry(&self, frame_index: u64) -> CacheEntry {
        match self {
            FrameReading::Read {
                descriptor,
                countdown,
            } => CacheEntry {
                frame_index,
                template_code: descriptor.template().code().to_string(),
                number: descriptor.number(),
                total: descriptor.total(),
                countdown: *countdown,
            },
            FrameReading::Undecodable => CacheEntry {
                frame_index,
                template_code: CacheEntry::UNDECODABLE_CODE.to_string(),
                number: None,
                total: None,
                countdown: None,
            },
        }
    }

    pub fn from_cache_entry(entry: &CacheEntry) -> Result<Self, ReplayError> {
        if entry.template_code == CacheEntry::UNDECODABLE_CODE {
            if entry.number.is_some() || entry.total.is_some() || entry.countdown.is_some() {
                return Err(ReplayError::InvalidSlots(entry.template_code.clone()));
            }
            return Ok(FrameReading::Undecodable);
        }
        let template = MatchTemplate::from_code(&entry.template_code)
            .ok_or_else(|| ReplayError::UnknownTemplate(entry.template_code.clone()))?;
        let descriptor = MatchDescriptor::new(template, entry.number, entry.total)
            .ok_or_else(|| ReplayError::InvalidSlots(entry.template_code.clone()))?;
        Ok(FrameReading::Read {
            descriptor,
            countdown: entry.countdown,
        })
    }
}

/// 叠加层读取器，持有解码上下文的借用
pub struct OverlayReader<'a> {
    ctx: &'a DecoderContext,
    regions: RegionExtractor,
    labels: LabelDecoder,
    countdown_limit_secs: u32,
}

impl<'a> OverlayReader<'a> {
    pub fn new(ctx: &'a DecoderContext, config: &EngineConfig) -> Self {
        Self {
            ctx,
            regions: RegionExtractor::new(config.region.clone()),
            labels: LabelDecoder::new(&config.label),
            countdown_limit_secs: config.timing.match_duration_secs,
        }
    }

    /// Read one frame.
    ///
    /// A recognizer failure on a raster only makes this frame undecodable;
    /// pool errors (closed, not initialized) are returned.
    pub fn read_frame(&self, frame: &Frame) -> Result<FrameReading, DetectError> {
        let label_raster = self.regions.label_raster(frame);
        let Some(label_text) = self.recognize(RecognizerRole::Label, &label_raster, frame)? else {
            return Ok(FrameReading::Undecodable);
        };

        let descriptor = match self.labels.decode(&label_text) {
            Decoded::Value(descriptor) => descriptor,
            Decoded::Undecodable => {
                debug!("🔍 Frame {}: label {:?} undecodable", frame.frame_number, label_text);
                return Ok(FrameReading::Undecodable);
            }
        };
        // countdown OCR is skipped when there is no overlay to time
        if descriptor.is_empty() {
            return Ok(FrameReading::no_event());
        }

        let rasters = self.regions.countdown_rasters(frame);
        let direct = self.recognize(RecognizerRole::Countdown, &rasters.direct, frame)?;
        let isolated = self.recognize(RecognizerRole::Countdown, &rasters.isolated, frame)?;
        let (Some(direct), Some(isolated)) = (direct, isolated) else {
            return Ok(FrameReading::Undecodable);
        };

        match decode_countdown(&direct, &isolated, self.countdown_limit_secs) {
            Decoded::Value(countdown) => {
                debug!(
                    "🔍 Frame {}: {:?} countdown {:?}",
                    frame.frame_number,
                    descriptor.identity(),
                    countdown
                );
                Ok(FrameReading::Read {
                    descriptor,
                    countdown,
                })
            }
            Decoded::Undecodable => {
                debug!(
                    "🔍 Frame {}: countdown {:?}/{:?} undecodable",
                    frame.frame_number, direct, isolated
                );
                Ok(FrameReading::Undecodable)
            }
        }
    }

    /// Read a batch in parallel. Results keep the input order.
    pub fn read_frames(&self, frames: &[&Frame]) -> Result<Vec<FrameReading>, DetectError> {
        frames.par_iter().map(|frame| self.read_frame(frame)).collect()
    }

    fn recognize(
        &self,
        role: RecognizerRole,
        raster: &GrayImage,
        frame: &Frame,
    ) -> Result<Option<String>, DetectError> {
        match self.ctx.recognize(role, raster) {
            Ok(text) => Ok(Some(text)),
            Err(DetectError::Recognition(msg)) => {
                warn!(
                    "⚠️ {} recognition failed on frame {}: {}",
                    role, frame.frame_number, msg
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::core::ocr::{MockRecognizerFactory, Recognizer, RecognizerFactory};
    use std::sync::Arc;

    fn context(factory: Arc<dyn RecognizerFactory>) -> DecoderContext {
        let ctx = DecoderContext::new(factory, PoolConfig::default());
        ctx.initialize().unwrap();
        ctx
    }

    fn frame(fill: u8, index: u64) -> Frame {
        Frame::filled(512, 288, fill, index * 100, index)
    }

    fn read(label: &str, countdown: &str) -> (FrameReading, usize) {
        let factory = Arc::new(MockRecognizerFactory::fixed(label, countdown));
        let ctx = context(factory.clone());
        let reader = OverlayReader::new(&ctx, &EngineConfig::default());
        let reading = reader.read_frame(&frame(0, 0)).unwrap();
        (reading, factory.calls())
    }

    struct BrokenRecognizer;

    impl Recognizer for BrokenRecognizer {
        fn step(&mut self, _raster: &GrayImage) -> Result<String, DetectError> {
            Err(DetectError::Recognition("engine crashed".to_string()))
        }

        fn reset(&mut self) {}
    }

    struct BrokenFactory;

    impl RecognizerFactory for BrokenFactory {
        fn create(&self, _role: RecognizerRole) -> Result<Box<dyn Recognizer>, DetectError> {
            Ok(Box::new(BrokenRecognizer))
        }
    }

    #[test]
    fn test_reads_label_and_countdown() {
        let (reading, calls) = read("Qualification 5 of 78", "150");
        assert_eq!(
            reading,
            FrameReading::Read {
                descriptor: MatchDescriptor::new(MatchTemplate::Qualification, Some(5), Some(78)).unwrap(),
                countdown: Some(150),
            }
        );
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_empty_label_skips_countdown() {
        let (reading, calls) = read("", "150");
        assert_eq!(reading, FrameReading::no_event());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_undecodable_parts() {
        assert_eq!(read("Final 012", "12").0, FrameReading::Undecodable);
        assert_eq!(read("Final 2", "999").0, FrameReading::Undecodable);
    }

    #[test]
    fn test_blank_countdown_is_absent() {
        let (reading, _) = read("Final 2", "");
        assert_eq!(
            reading,
            FrameReading::Read {
                descriptor: MatchDescriptor::new(MatchTemplate::Final, Some(2), None).unwrap(),
                countdown: None,
            }
        );
    }

    #[test]
    fn test_recognizer_failure_is_soft() {
        let ctx = context(Arc::new(BrokenFactory));
        let reader = OverlayReader::new(&ctx, &EngineConfig::default());
        assert_eq!(reader.read_frame(&frame(0, 0)).unwrap(), FrameReading::Undecodable);
    }

    #[test]
    fn test_torn_down_context_is_an_error() {
        let ctx = context(Arc::new(MockRecognizerFactory::fixed("Final 1", "10")));
        ctx.teardown();
        let reader = OverlayReader::new(&ctx, &EngineConfig::default());
        assert!(matches!(
            reader.read_frame(&frame(0, 0)),
            Err(DetectError::NotInitialized)
        ));
    }

    #[test]
    fn test_batch_keeps_frame_order() {
        let factory = Arc::new(MockRecognizerFactory::with_readers(
            |raster| match raster.get_pixel(0, 0).0[0] {
                v if v > 150 => "Final 1".to_string(),
                v if v > 50 => "Final 2".to_string(),
                _ => String::new(),
            },
            |_| "42".to_string(),
        ));
        let ctx = context(factory);
        let reader = OverlayReader::new(&ctx, &EngineConfig::default());

        let frames: Vec<Frame> = [200, 0, 100, 200, 0, 100, 100]
            .iter()
            .enumerate()
            .map(|(i, &fill)| frame(fill, i as u64))
            .collect();
        let refs: Vec<&Frame> = frames.iter().collect();
        let readings = reader.read_frames(&refs).unwrap();

        let final_n = |n| FrameReading::Read {
            descriptor: MatchDescriptor::new(MatchTemplate::Final, Some(n), None).unwrap(),
            countdown: Some(42),
        };
        assert_eq!(
            readings,
            vec![
                final_n(1),
                FrameReading::no_event(),
                final_n(2),
                final_n(1),
                FrameReading::no_event(),
                final_n(2),
                final_n(2),
            ]
        );
    }

    #[test]
    fn test_cache_entry_conversion() {
        let reading = FrameReading::Read {
            descriptor: MatchDescriptor::new(MatchTemplate::Qualification, Some(5), Some(78)).unwrap(),
            countdown: Some(100),
        };
        let entry = reading.to_cache_entry(12);
        assert_eq!(entry.to_row(), "12\tQ\t5\t78\t100");
        assert_eq!(FrameReading::from_cache_entry(&entry), Ok(reading));

        let entry = FrameReading::Undecodable.to_cache_entry(13);
        assert_eq!(entry.to_row(), "13\t!\t\t\t");
        assert_eq!(
            FrameReading::from_cache_entry(&entry),
            Ok(FrameReading::Undecodable)
        );

        let mut unknown = entry;
        unknown.template_code = "ZZ".to_string();
        assert_eq!(
            FrameReading::from_cache_entry(&unknown),
            Err(ReplayError::UnknownTemplate("ZZ".to_string()))
        );
    }

    #[test]
    fn test_cache_rows_outside_slot_rules() {
        let rows = [
            "7\tF\t\t\t12",
            "7\tF\t1000\t\t12",
            "7\tQ\t\t78\t12",
            "7\tT\t3\t\t",
            "7\t!\t3\t\t",
        ];
        for row in rows {
            let entry = CacheEntry::parse_row(row).unwrap();
            assert!(
                matches!(
                    FrameReading::from_cache_entry(&entry),
                    Err(ReplayError::InvalidSlots(_))
                ),
                "row {:?}",
                row
            );
        }
    }
}
