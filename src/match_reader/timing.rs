//! 比赛时间窗推算
//!
//! Each observation pins the match start at `timestamp - countdown`. All
//! pins for one identity are averaged, then widened by the preroll.

use super::scan::ScanResult;
use crate::config::TimingConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Clip bounds for one match, in seconds from the start of the video.
/// `start` may be negative when the match began before the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub identity: String,
    pub start: f64,
    pub stop: f64,
}

impl ClipWindow {
    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }

    /// Filesystem-safe name derived from the identity, e.g.
    /// `Qualification_5_of_78.mp4`.
    pub fn output_file_name(&self, extension: &str) -> String {
        let stem: String = self
            .identity
            .chars()
            .filter_map(|c| match c {
                ' ' => Some('_'),
                c if c.is_ascii_alphanumeric() => Some(c),
                _ => None,
            })
            .collect();
        let stem = if stem.is_empty() { "match".to_string() } else { stem };

        match extension.trim_start_matches('.') {
            "" => stem,
            ext => format!("{}.{}", stem, ext),
        }
    }
}

/// One window per distinct identity, in first-seen order.
///
/// Identities without a single countdown reading are skipped.
pub fn time_video(result: &ScanResult, config: &TimingConfig) -> Vec<ClipWindow> {
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for observation in result.events() {
        let identity = observation.descriptor.identity();
        let idx = match groups.iter().position(|(id, _)| *id == identity) {
            Some(idx) => idx,
            None => {
                groups.push((identity, Vec::new()));
                groups.len() - 1
            }
        };
        if let Some(countdown) = observation.countdown {
            groups[idx]
                .1
                .push(observation.timestamp_ms as f64 / 1000.0 - countdown as f64);
        }
    }

    let preroll = config.preroll_secs as f64;
    let duration = config.match_duration_secs as f64;

    let mut windows = Vec::with_capacity(groups.len());
    for (identity, starts) in groups {
        if starts.is_empty() {
            warn!("⚠️ No usable frames for {:?}, no clip produced", identity);
            continue;
        }
        let start = starts.iter().sum::<f64>() / starts.len() as f64 - preroll;
        windows.push(ClipWindow {
            identity,
            start,
            stop: start + preroll + duration,
        });
    }

    info!("⏱️ Timed {} matches", windows.len());
    windows
}
