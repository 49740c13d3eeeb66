//! 总场次校正
//!
//! The "of N" total is the same across a whole event but is read less
//! reliably than the match number. The most frequent total seen anywhere
//! in the scan replaces every individual reading.

use super::scan::ScanResult;
use log::{info, warn};

/// Rewrite `total` on every observation whose template has a total slot.
///
/// Returns the total applied, or `None` (leaving the result untouched) when
/// no observation carried one. Ties go to the total seen first.
pub fn reconcile_totals(result: &mut ScanResult) -> Option<u32> {
    let mut tally: Vec<(u32, usize)> = Vec::new();
    for total in result.iter().filter_map(|o| o.descriptor.total()) {
        match tally.iter_mut().find(|(t, _)| *t == total) {
            Some((_, count)) => *count += 1,
            None => tally.push((total, 1)),
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for &(total, count) in &tally {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((total, count));
        }
    }

    let Some((total, votes)) = best else {
        warn!("⚠️ No match total observed in scan, labels left as read");
        return None;
    };
    info!(
        "🔢 Match total reconciled to {} ({} of {} readings)",
        total,
        votes,
        tally.iter().map(|(_, c)| c).sum::<usize>()
    );

    for observation in result.iter_mut() {
        observation.descriptor.set_total(Some(total));
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_reader::moment::Observation;
    use crate::match_reader::template::{MatchDescriptor, MatchTemplate};

    fn qualification(ts: u64, number: u32, total: Option<u32>) -> Observation {
        Observation {
            timestamp_ms: ts,
            descriptor: MatchDescriptor::new(MatchTemplate::Qualification, Some(number), total).unwrap(),
            countdown: Some(100),
        }
    }

    #[test]
    fn test_most_frequent_total_wins() {
        let mut result: ScanResult = vec![
            qualification(0, 1, Some(78)),
            qualification(1000, 2, Some(78)),
            qualification(2000, 3, Some(80)),
            qualification(3000, 4, Some(78)),
            qualification(4000, 5, None),
        ]
        .into_iter()
        .collect();

        assert_eq!(reconcile_totals(&mut result), Some(78));
        assert!(result.iter().all(|o| o.descriptor.total() == Some(78)));
        assert_eq!(result.get(2000).unwrap().descriptor.identity(), "Qualification 3 of 78");
    }

    #[test]
    fn test_ties_go_to_first_seen() {
        let mut result: ScanResult = vec![
            qualification(0, 1, Some(40)),
            qualification(1000, 2, Some(41)),
        ]
        .into_iter()
        .collect();

        assert_eq!(reconcile_totals(&mut result), Some(40));
    }

    #[test]
    fn test_templates_without_total_untouched() {
        let semi = Observation {
            timestamp_ms: 5000,
            descriptor: MatchDescriptor::new(MatchTemplate::Semifinal, Some(2), None).unwrap(),
            countdown: Some(3),
        };
        let mut result: ScanResult = vec![
            qualification(0, 1, Some(78)),
            semi.clone(),
            Observation::no_event(6000),
        ]
        .into_iter()
        .collect();

        reconcile_totals(&mut result);
        assert_eq!(result.get(5000), Some(&semi));
        assert_eq!(result.get(6000), Some(&Observation::no_event(6000)));
    }

    #[test]
    fn test_no_totals_leaves_result_unchanged() {
        let mut result: ScanResult = vec![qualification(0, 1, None), Observation::no_event(1000)]
            .into_iter()
            .collect();
        let before = result.clone();

        assert_eq!(reconcile_totals(&mut result), None);
        assert_eq!(result, before);
    }
}
