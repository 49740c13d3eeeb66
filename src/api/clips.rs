//! 切片任务规划
//!
//! Turns clip windows into concrete cut jobs. The cutting itself belongs to
//! an external transcoder behind [`ClipTranscoder`].

use crate::match_reader::ClipWindow;
use log::{info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transcode failed for {identity}: {reason}")]
    Transcode { identity: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipJob {
    pub identity: String,
    pub source: PathBuf,
    pub output: PathBuf,
    /// Seconds from the start of the source, never negative.
    pub start: f64,
    pub duration: f64,
}

pub trait ClipTranscoder {
    fn transcode(&self, job: &ClipJob) -> Result<(), ClipError>;
}

/// One job per window. A window that opens before the recording starts is
/// clipped at zero and loses the missing head.
pub fn plan_clips(
    source: &Path,
    windows: &[ClipWindow],
    out_dir: &Path,
    extension: &str,
) -> Vec<ClipJob> {
    windows
        .iter()
        .filter_map(|window| {
            let start = window.start.max(0.0);
            let duration = window.stop - start;
            if duration <= 0.0 {
                warn!("⚠️ Clip window for {:?} ends before the video starts", window.identity);
                return None;
            }
            Some(ClipJob {
                identity: window.identity.clone(),
                source: source.to_path_buf(),
                output: out_dir.join(window.output_file_name(extension)),
                start,
                duration,
            })
        })
        .collect()
}

/// Run every job, continuing past failures. Returns the failed jobs.
pub fn export_clips(transcoder: &dyn ClipTranscoder, jobs: &[ClipJob]) -> Vec<(ClipJob, ClipError)> {
    let mut failed = Vec::new();
    for job in jobs {
        match transcoder.transcode(job) {
            Ok(()) => info!("✂️ Clip written: {}", job.output.display()),
            Err(e) => {
                warn!("⚠️ Clip {} failed: {}", job.identity, e);
                failed.push((job.clone(), e));
            }
        }
    }
    info!("✅ Exported {} of {} clips", jobs.len() - failed.len(), jobs.len());
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn window(identity: &str, start: f64, stop: f64) -> ClipWindow {
        ClipWindow {
            identity: identity.to_string(),
            start,
            stop,
        }
    }

    #[test]
    fn test_plan_clips() {
        let windows = vec![
            window("Qualification 1 of 78", -179.0, 41.0),
            window("Qualification 2 of 78", 300.5, 520.5),
            window("Test Match", -400.0, -180.0),
        ];
        let jobs = plan_clips(Path::new("/videos/day1.mp4"), &windows, Path::new("/out"), "mp4");

        assert_eq!(
            jobs,
            vec![
                ClipJob {
                    identity: "Qualification 1 of 78".to_string(),
                    source: PathBuf::from("/videos/day1.mp4"),
                    output: PathBuf::from("/out/Qualification_1_of_78.mp4"),
                    start: 0.0,
                    duration: 41.0,
                },
                ClipJob {
                    identity: "Qualification 2 of 78".to_string(),
                    source: PathBuf::from("/videos/day1.mp4"),
                    output: PathBuf::from("/out/Qualification_2_of_78.mp4"),
                    start: 300.5,
                    duration: 220.0,
                },
            ]
        );
    }

    struct RecordingTranscoder {
        seen: Mutex<Vec<String>>,
    }

    impl ClipTranscoder for RecordingTranscoder {
        fn transcode(&self, job: &ClipJob) -> Result<(), ClipError> {
            self.seen.lock().unwrap().push(job.identity.clone());
            if job.identity.contains('2') {
                return Err(ClipError::Transcode {
                    identity: job.identity.clone(),
                    reason: "disk full".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_export_continues_past_failures() {
        let windows = vec![
            window("Final 1", 10.0, 230.0),
            window("Final 2", 400.0, 620.0),
            window("Final 3", 800.0, 1020.0),
        ];
        let jobs = plan_clips(Path::new("in.mp4"), &windows, Path::new("out"), "mkv");
        let transcoder = RecordingTranscoder {
            seen: Mutex::new(Vec::new()),
        };

        let failed = export_clips(&transcoder, &jobs);
        assert_eq!(transcoder.seen.lock().unwrap().len(), 3);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0.identity, "Final 2");
    }
}
