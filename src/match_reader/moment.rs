//! 时间点读取：多帧采样 + 投票
//!
//! One moment is read from several consecutive frames around the requested
//! timestamp. Each undecodable frame earns one replacement frame, up to a
//! hard maximum, and the most frequent reading wins only with enough
//! agreement.

use super::overlay::{FrameReading, OverlayReader, ReplayError};
use super::template::MatchDescriptor;
use crate::config::{AgreementRatio, EngineConfig, MomentConfig};
use crate::core::cache::ReplayCache;
use crate::core::ocr::{DecoderContext, DetectError};
use crate::core::video::{Frame, VideoSource};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// The voted reading of one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp_ms: u64,
    pub descriptor: MatchDescriptor,
    pub countdown: Option<u32>,
}

impl Observation {
    pub fn no_event(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            descriptor: MatchDescriptor::empty(),
            countdown: None,
        }
    }

    pub fn is_event(&self) -> bool {
        !self.descriptor.is_empty()
    }
}

/// Majority vote over frame readings.
///
/// Undecodable frames form their own bucket and stay in the denominator.
/// Ties go to the reading seen first. `None` when nothing decoded, when the
/// undecodable bucket wins, or when the winner falls short of `agreement`.
pub fn vote(
    readings: &[FrameReading],
    agreement: AgreementRatio,
) -> Option<(MatchDescriptor, Option<u32>)> {
    if readings.iter().all(FrameReading::is_undecodable) {
        return None;
    }

    let mut tally: Vec<(&FrameReading, usize)> = Vec::new();
    for reading in readings {
        match tally.iter_mut().find(|(seen, _)| *seen == reading) {
            Some((_, count)) => *count += 1,
            None => tally.push((reading, 1)),
        }
    }

    let mut best: Option<(&FrameReading, usize)> = None;
    for &(reading, count) in &tally {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((reading, count));
        }
    }

    let (winner, votes) = best?;
    if !agreement.is_met(votes, readings.len()) {
        return None;
    }
    match winner {
        FrameReading::Read {
            descriptor,
            countdown,
        } => Some((descriptor.clone(), *countdown)),
        FrameReading::Undecodable => None,
    }
}

/// 时间点读取器
///
/// Owns the replay cache for the whole scan, since cache rows must be
/// consumed in frame order across moments.
pub struct MomentReader<'a> {
    overlay: OverlayReader<'a>,
    config: MomentConfig,
    cache: ReplayCache,
    exhausted: bool,
}

impl<'a> MomentReader<'a> {
    pub fn new(ctx: &'a DecoderContext, config: &EngineConfig, cache: ReplayCache) -> Self {
        Self {
            overlay: OverlayReader::new(ctx, config),
            config: config.moment.clone(),
            cache,
            exhausted: false,
        }
    }

    /// The video stopped producing frames (end of stream or read error).
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn read_moment(
        &mut self,
        video: &mut dyn VideoSource,
        timestamp_ms: u64,
    ) -> Result<Observation, DetectError> {
        let min = self.config.min_samples as usize;
        let max = self.config.max_samples as usize;

        let center = (timestamp_ms as f64 * video.fps() / 1000.0).round() as u64;
        let start = center.saturating_sub(min as u64 / 2);
        if let Err(e) = video.set_frame_index(start) {
            warn!("⚠️ Seek to frame {} failed: {}, treating source as exhausted", start, e);
            self.exhausted = true;
            return Ok(Observation::no_event(timestamp_ms));
        }

        let first = self.pull_frames(video, min);
        let mut readings = self.decode_batch(first)?;

        // each undecodable frame is owed one replacement, never past `max`
        while !self.exhausted && readings.len() < max {
            let owed = readings.iter().filter(|r| r.is_undecodable()).count();
            let extra = readings.len().saturating_sub(min);
            if extra >= owed {
                break;
            }
            let more = self.pull_frames(video, 1);
            if more.is_empty() {
                break;
            }
            readings.extend(self.decode_batch(more)?);
        }

        let observation = match vote(&readings, self.config.agreement) {
            Some((descriptor, countdown)) => Observation {
                timestamp_ms,
                descriptor,
                countdown,
            },
            None => Observation::no_event(timestamp_ms),
        };
        debug!(
            "🎯 Moment {} ms: {:?} countdown {:?} from {} frames",
            timestamp_ms,
            observation.descriptor.identity(),
            observation.countdown,
            readings.len()
        );
        Ok(observation)
    }

    /// Flush any recorded cache rows.
    pub fn finish(&mut self) {
        self.cache.flush();
    }

    fn pull_frames(&mut self, video: &mut dyn VideoSource, count: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match video.next_frame() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {
                    info!("📼 Video source reached end of stream");
                    self.exhausted = true;
                    break;
                }
                Err(e) => {
                    warn!("⚠️ Frame read failed: {}, treating source as exhausted", e);
                    self.exhausted = true;
                    break;
                }
            }
        }
        frames
    }

    /// Replay what the cache knows, decode the rest in parallel, and record
    /// the live results in frame order.
    fn decode_batch(&mut self, frames: Vec<Frame>) -> Result<Vec<FrameReading>, DetectError> {
        let mut slots: Vec<Option<FrameReading>> = Vec::with_capacity(frames.len());
        for frame in &frames {
            let replayed = match self.cache.replay(frame.frame_number) {
                None => None,
                Some(entry) => match FrameReading::from_cache_entry(&entry) {
                    Ok(reading) => Some(reading),
                    Err(e @ ReplayError::UnknownTemplate(_)) => {
                        warn!("⚠️ Cache row for frame {}: {}, decoding live", entry.frame_index, e);
                        None
                    }
                    Err(e @ ReplayError::InvalidSlots(_)) => {
                        self.cache.abandon_replay(entry.frame_index, &e.to_string());
                        None
                    }
                },
            };
            slots.push(replayed);
        }

        let live: Vec<&Frame> = frames
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(frame, _)| frame)
            .collect();
        let mut decoded = self.overlay.read_frames(&live)?.into_iter();

        let mut readings = Vec::with_capacity(frames.len());
        for (frame, slot) in frames.iter().zip(slots) {
            let reading = match slot {
                Some(reading) => reading,
                None => {
                    let reading = decoded.next().unwrap_or(FrameReading::Undecodable);
                    self.cache.record(&reading.to_cache_entry(frame.frame_number));
                    reading
                }
            };
            readings.push(reading);
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheSource;
    use crate::core::ocr::MockRecognizerFactory;
    use crate::core::video::MockVideoSource;
    use crate::match_reader::template::MatchTemplate;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const FPS: f64 = 10.0;

    fn final_n(n: u32, countdown: Option<u32>) -> FrameReading {
        FrameReading::Read {
            descriptor: MatchDescriptor::new(MatchTemplate::Final, Some(n), None).unwrap(),
            countdown,
        }
    }

    /// Frames are painted with a gray level per index; the mock label
    /// recognizer maps gray levels to text.
    fn video(fills: HashMap<u64, u8>, frame_count: u64) -> MockVideoSource {
        MockVideoSource::new(512, 288, FPS, frame_count).with_painter(move |index, frame| {
            let v = fills.get(&index).copied().unwrap_or(200);
            for px in frame.data.chunks_exact_mut(4) {
                px[..3].copy_from_slice(&[v, v, v]);
            }
        })
    }

    fn factory() -> Arc<MockRecognizerFactory> {
        Arc::new(MockRecognizerFactory::with_readers(
            |raster| match raster.get_pixel(0, 0).0[0] {
                v if v > 175 => "Final 1".to_string(),
                v if v > 125 => "Final 2".to_string(),
                v if v > 75 => "Final 012".to_string(),
                _ => String::new(),
            },
            |_| "120".to_string(),
        ))
    }

    fn context(factory: Arc<MockRecognizerFactory>) -> DecoderContext {
        let ctx = DecoderContext::new(factory, EngineConfig::default().pools);
        ctx.initialize().unwrap();
        ctx
    }

    #[test]
    fn test_vote_accepts_four_of_five() {
        let readings = vec![
            final_n(1, Some(10)),
            final_n(1, Some(10)),
            FrameReading::no_event(),
            final_n(1, Some(10)),
            final_n(1, Some(10)),
        ];
        let (descriptor, countdown) = vote(&readings, AgreementRatio::new(4, 5)).unwrap();
        assert_eq!(descriptor.identity(), "Final 1");
        assert_eq!(countdown, Some(10));
    }

    #[test]
    fn test_vote_rejects_split() {
        let readings = vec![
            final_n(1, Some(10)),
            final_n(1, Some(10)),
            final_n(2, Some(10)),
            final_n(2, Some(10)),
            FrameReading::no_event(),
        ];
        assert_eq!(vote(&readings, AgreementRatio::new(4, 5)), None);
    }

    #[test]
    fn test_vote_separates_countdowns() {
        let readings = vec![
            final_n(1, Some(10)),
            final_n(1, Some(10)),
            final_n(1, Some(10)),
            final_n(1, Some(11)),
            final_n(1, Some(10)),
        ];
        assert!(vote(&readings, AgreementRatio::new(4, 5)).is_some());
        assert_eq!(vote(&readings, AgreementRatio::new(1, 1)), None);
    }

    #[test]
    fn test_vote_ties_go_to_first_seen() {
        let readings = vec![final_n(2, None), final_n(1, None)];
        let (descriptor, _) = vote(&readings, AgreementRatio::new(1, 2)).unwrap();
        assert_eq!(descriptor.identity(), "Final 2");
    }

    #[test]
    fn test_vote_with_nothing_decoded() {
        assert_eq!(vote(&[], AgreementRatio::new(4, 5)), None);
        let all_bad = vec![FrameReading::Undecodable; 5];
        assert_eq!(vote(&all_bad, AgreementRatio::new(1, 5)), None);
    }

    #[test]
    fn test_vote_undecodable_winner_is_no_event() {
        let readings = vec![
            FrameReading::Undecodable,
            FrameReading::Undecodable,
            final_n(1, None),
        ];
        assert_eq!(vote(&readings, AgreementRatio::new(1, 2)), None);
    }

    #[test]
    fn test_moment_with_four_agreeing_frames() {
        // moment at 2000 ms → frames 18..=22, frame 19 shows nothing
        let mut video = video(HashMap::from([(19, 0)]), 100);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert_eq!(observation.timestamp_ms, 2000);
        assert_eq!(observation.descriptor.identity(), "Final 1");
        assert_eq!(observation.countdown, Some(120));
        assert_eq!(video.read_counter().load(Ordering::SeqCst), 5);
        assert!(!reader.is_exhausted());
    }

    #[test]
    fn test_moment_with_split_vote_is_no_event() {
        let mut video = video(HashMap::from([(20, 150), (21, 150), (22, 0)]), 100);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert_eq!(observation, Observation::no_event(2000));
    }

    #[test]
    fn test_undecodable_frame_is_replaced() {
        let mut video = video(HashMap::from([(18, 100)]), 100);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert_eq!(video.read_counter().load(Ordering::SeqCst), 6);
        assert_eq!(observation.descriptor.identity(), "Final 1");
    }

    #[test]
    fn test_retries_stop_at_max_samples() {
        let fills: HashMap<u64, u8> = (0..100).map(|i| (i, 100)).collect();
        let mut video = video(fills, 100);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert_eq!(observation, Observation::no_event(2000));
        assert_eq!(video.read_counter().load(Ordering::SeqCst), 9);
    }

    #[test]
    fn test_end_of_stream_marks_exhausted() {
        let mut video = video(HashMap::new(), 20);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert!(reader.is_exhausted());
        assert_eq!(observation.descriptor.identity(), "Final 1");
        assert_eq!(video.read_counter().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_read_error_marks_exhausted() {
        let mut video = video(HashMap::new(), 100).failing_after(20);
        let ctx = context(factory());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), ReplayCache::disabled());

        reader.read_moment(&mut video, 2000).unwrap();
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_cached_rows_skip_recognition() {
        let rows: String = (18..=22)
            .map(|i| format!("{}\tF\t2\t\t33\n", i))
            .collect();
        let cache = ReplayCache::disabled().with_source(CacheSource::from_reader(Cursor::new(rows)));

        let factory = factory();
        let mut video = video(HashMap::new(), 100);
        let ctx = context(factory.clone());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), cache);

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        assert_eq!(observation.descriptor.identity(), "Final 2");
        assert_eq!(observation.countdown, Some(33));
        assert_eq!(factory.calls(), 0);
    }

    #[test]
    fn test_cache_desync_falls_back_to_live() {
        let rows = "18\tF\t2\t\t33\n99\tF\t2\t\t33\n".to_string();
        let cache = ReplayCache::disabled().with_source(CacheSource::from_reader(Cursor::new(rows)));

        let factory = factory();
        let mut video = video(HashMap::new(), 100);
        let ctx = context(factory.clone());
        let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), cache);

        let observation = reader.read_moment(&mut video, 2000).unwrap();
        // one replayed "Final 2" against four live "Final 1"
        assert_eq!(observation.descriptor.identity(), "Final 1");
        assert_eq!(factory.calls(), 4 * 3);
    }

    #[test]
    fn test_cache_row_outside_slot_rules_goes_live() {
        for first in ["18\tF\t\t\t12", "18\tF\t1000\t\t12"] {
            let rows = format!("{}\n19\tF\t2\t\t33\n", first);
            let cache =
                ReplayCache::disabled().with_source(CacheSource::from_reader(Cursor::new(rows)));

            let factory = factory();
            let mut video = video(HashMap::new(), 100);
            let ctx = context(factory.clone());
            let mut reader = MomentReader::new(&ctx, &EngineConfig::default(), cache);

            let observation = reader.read_moment(&mut video, 2000).unwrap();
            assert_eq!(observation.descriptor.identity(), "Final 1");
            assert_eq!(factory.calls(), 5 * 3, "row {:?}", first);
        }
    }
}
