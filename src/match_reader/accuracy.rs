//! 识别准确率测试
//!
//! Runs the per-frame reader over still images whose overlay text was
//! transcribed by hand and scores the results.
//!
//! Transcript format: one `frame \t label \t countdown` line per change,
//! `#` starts a comment line. The frame column is a number or an image
//! name such as `image42.png`. A line holds for every frame up to the next
//! line.

use super::overlay::{FrameReading, OverlayReader};
use super::similarity::ratio;
use crate::core::ocr::DetectError;
use crate::core::video::Frame;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccuracyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image load failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Recognition error: {0}")]
    Detect(#[from] DetectError),
    #[error("Frame {0} recorded twice")]
    DuplicateFrame(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub frame: u64,
    pub label: String,
    pub countdown: String,
}

pub fn parse_transcript(text: &str) -> Vec<TranscriptLine> {
    let mut lines: Vec<TranscriptLine> = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(4, '\t');
        let frame_field = fields.next().unwrap_or_default();
        let label = fields.next().unwrap_or_default().to_string();
        let countdown = fields.next().unwrap_or_default().to_string();

        let frame = match parse_frame_field(frame_field) {
            Some(frame) => frame,
            None => {
                let guess = lines.last().map_or(1, |l| l.frame.saturating_add(1));
                warn!(
                    "⚠️ Unreadable transcript frame {:?}, assuming frame {}",
                    frame_field, guess
                );
                guess
            }
        };
        lines.push(TranscriptLine {
            frame,
            label,
            countdown,
        });
    }
    lines
}

/// `42`, `image42.png` or `shots/image42.png`.
fn parse_frame_field(field: &str) -> Option<u64> {
    if let Ok(n) = field.parse() {
        return Some(n);
    }
    let name = Path::new(field).file_name()?.to_str()?;
    let digits = name.strip_prefix("image")?;
    let digits = match digits.rfind('.') {
        Some(dot) => &digits[..dot],
        None => digits,
    };
    digits.parse().ok()
}

/// Longest run of frames one transcript line is stretched over.
const MAX_FILLED_FRAMES: u64 = 10_000;

/// One expectation per frame, repeating each line until the next one.
///
/// Frames are produced lazily; a line never covers more than
/// [`MAX_FILLED_FRAMES`] frames, so a mistyped frame number cannot blow up
/// the run.
pub fn expand_transcript(lines: &[TranscriptLine]) -> impl Iterator<Item = TranscriptLine> + '_ {
    lines.iter().enumerate().flat_map(move |(idx, line)| {
        let last = match lines.get(idx + 1) {
            Some(next) if next.frame > line.frame => next.frame - 1,
            _ => line.frame,
        };
        let capped = last.min(line.frame.saturating_add(MAX_FILLED_FRAMES - 1));
        if capped < last {
            warn!(
                "⚠️ Transcript gap after frame {} too long, stopping at frame {}",
                line.frame, capped
            );
        }
        (line.frame..=capped).map(move |frame| TranscriptLine {
            frame,
            ..line.clone()
        })
    })
}

/// The reader's output rendered as transcript text.
/// `None` for an undecodable frame.
pub fn reading_text(reading: &FrameReading) -> Option<(String, String)> {
    match reading {
        FrameReading::Read {
            descriptor,
            countdown,
        } => Some((
            descriptor.identity(),
            countdown.map(|c| c.to_string()).unwrap_or_default(),
        )),
        FrameReading::Undecodable => None,
    }
}

#[derive(Debug, Clone)]
struct FrameScore {
    read: Option<(String, String)>,
    expected_label: String,
    expected_countdown: String,
    elapsed: Duration,
}

/// 准确率统计
#[derive(Debug, Clone, Default)]
pub struct AccuracyReport {
    frames: BTreeMap<u64, FrameScore>,
    total_time: Duration,
}

impl AccuracyReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        expected: &TranscriptLine,
        reading: &FrameReading,
        elapsed: Duration,
    ) -> Result<(), AccuracyError> {
        if self.frames.contains_key(&expected.frame) {
            return Err(AccuracyError::DuplicateFrame(expected.frame));
        }
        self.frames.insert(
            expected.frame,
            FrameScore {
                read: reading_text(reading),
                expected_label: expected.label.clone(),
                expected_countdown: expected.countdown.clone(),
                elapsed,
            },
        );
        self.total_time += elapsed;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    pub fn failed_frames(&self) -> usize {
        self.frames.values().filter(|f| f.read.is_none()).count()
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    /// The frame that took longest to read; the later frame on ties.
    pub fn slowest_frame(&self) -> Option<(u64, Duration)> {
        self.frames
            .iter()
            .map(|(&frame, score)| (frame, score.elapsed))
            .max_by_key(|&(_, elapsed)| elapsed)
    }

    pub fn average_time(&self) -> Option<Duration> {
        let n = u32::try_from(self.frames.len()).ok().filter(|&n| n > 0)?;
        Some(self.total_time / n)
    }

    /// Mean string similarity of decoded labels, in percent.
    pub fn label_partial_pct(&self) -> Option<f64> {
        self.partial(|read, f| ratio(&read.0, &f.expected_label))
    }

    pub fn countdown_partial_pct(&self) -> Option<f64> {
        self.partial(|read, f| ratio(&read.1, &f.expected_countdown))
    }

    /// Share of all frames whose label was read exactly, in percent.
    pub fn label_perfect_pct(&self) -> Option<f64> {
        self.perfect(|read, f| read.0 == f.expected_label)
    }

    pub fn countdown_perfect_pct(&self) -> Option<f64> {
        self.perfect(|read, f| read.1 == f.expected_countdown)
    }

    fn partial<F>(&self, score: F) -> Option<f64>
    where
        F: Fn(&(String, String), &FrameScore) -> f64,
    {
        let scores: Vec<f64> = self
            .frames
            .values()
            .filter_map(|f| f.read.as_ref().map(|read| score(read, f)))
            .collect();
        if scores.is_empty() {
            return None;
        }
        Some(100.0 * scores.iter().sum::<f64>() / scores.len() as f64)
    }

    fn perfect<F>(&self, is_exact: F) -> Option<f64>
    where
        F: Fn(&(String, String), &FrameScore) -> bool,
    {
        if self.frames.is_empty() {
            return None;
        }
        let exact = self
            .frames
            .values()
            .filter(|f| f.read.as_ref().is_some_and(|read| is_exact(read, f)))
            .count();
        Some(100.0 * exact as f64 / self.frames.len() as f64)
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |v: Option<f64>| match v {
            Some(v) => format!("{:6.2}%", v),
            None => "   N/A ".to_string(),
        };

        writeln!(f, "{} Frames\tPartial\tPerfect", self.frames())?;
        writeln!(
            f,
            "Label\t\t{}\t{}",
            pct(self.label_partial_pct()),
            pct(self.label_perfect_pct())
        )?;
        writeln!(
            f,
            "Countdown\t{}\t{}",
            pct(self.countdown_partial_pct()),
            pct(self.countdown_perfect_pct())
        )?;
        writeln!(f, "Failed Frames: {}", self.failed_frames())?;
        match self.average_time() {
            Some(avg) => writeln!(f, "Average Time: {:.3}s", avg.as_secs_f64())?,
            None => writeln!(f, "Average Time: N/A")?,
        }
        if let Some((frame, elapsed)) = self.slowest_frame() {
            writeln!(f, "Slowest Frame: {} ({:.3}s)", frame, elapsed.as_secs_f64())?;
        }
        write!(f, "Total Time: {:.3}s", self.total_time.as_secs_f64())
    }
}

/// Load a still image as a frame.
pub fn load_frame(path: impl AsRef<Path>, frame_number: u64) -> Result<Frame, AccuracyError> {
    let image = image::open(path.as_ref())?.to_rgba8();
    Ok(Frame::from_image(image, 0, frame_number))
}

/// `dir/image{N}.{extension}`
pub fn image_path(dir: &Path, frame_number: u64, extension: &str) -> PathBuf {
    dir.join(format!("image{}.{}", frame_number, extension))
}

/// Score `reader` against every transcribed frame.
///
/// `load` supplies the frame for a frame number; frames that fail to load
/// are skipped with a warning.
pub fn measure_accuracy<F>(
    reader: &OverlayReader<'_>,
    transcript: &[TranscriptLine],
    mut load: F,
) -> Result<AccuracyReport, AccuracyError>
where
    F: FnMut(u64) -> Result<Frame, AccuracyError>,
{
    info!(
        "🧪 Measuring read accuracy over {} transcript lines",
        transcript.len()
    );

    let mut report = AccuracyReport::new();
    for line in expand_transcript(transcript) {
        let frame = match load(line.frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("⚠️ Frame {} failed to load: {}", line.frame, e);
                continue;
            }
        };

        let started = Instant::now();
        let reading = reader.read_frame(&frame)?;
        let elapsed = started.elapsed();
        debug!(
            "🧪 Frame {}: expected {:?}/{:?}, read {:?}",
            line.frame, line.label, line.countdown, reading
        );
        report.record(&line, &reading, elapsed)?;
    }

    info!(
        "✅ Accuracy run done: {} frames, {} failed",
        report.frames(),
        report.failed_frames()
    );
    Ok(report)
}
