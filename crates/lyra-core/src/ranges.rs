//! Helpers over sorted, non-overlapping time ranges in seconds.
//!
//! Buffered ranges reported by a media platform are `f64` intervals, which
//! rules out `Ord`-based range sets; these helpers keep a `Vec<Range<f64>>`
//! sorted and merged instead.

use std::ops::Range;

/// Gap under which two ranges are considered contiguous.
pub const RANGE_EPSILON: f64 = 1.0 / 60.0;

/// Insert `range`, merging it with every range it touches.
pub fn insert_range(ranges: &mut Vec<Range<f64>>, range: Range<f64>) {
    if range.end <= range.start {
        return;
    }
    let mut merged = range;
    ranges.retain(|r| {
        let touches = r.start <= merged.end + RANGE_EPSILON && r.end + RANGE_EPSILON >= merged.start;
        if touches {
            merged.start = merged.start.min(r.start);
            merged.end = merged.end.max(r.end);
        }
        !touches
    });
    let pos = ranges
        .iter()
        .position(|r| r.start > merged.start)
        .unwrap_or(ranges.len());
    ranges.insert(pos, merged);
}

/// Remove `range` from every range it overlaps, splitting where needed.
pub fn remove_range(ranges: &mut Vec<Range<f64>>, range: Range<f64>) {
    let mut result = Vec::with_capacity(ranges.len() + 1);
    for r in ranges.drain(..) {
        if r.end <= range.start || r.start >= range.end {
            result.push(r);
            continue;
        }
        if r.start < range.start {
            result.push(r.start..range.start);
        }
        if r.end > range.end {
            result.push(range.end..r.end);
        }
    }
    *ranges = result;
}

/// The range containing `time`, if any.
pub fn range_containing(ranges: &[Range<f64>], time: f64) -> Option<Range<f64>> {
    ranges
        .iter()
        .find(|r| time >= r.start && time < r.end)
        .cloned()
}

/// Seconds buffered ahead of `time`, `f64::INFINITY` when `time` is not buffered.
pub fn buffer_gap(ranges: &[Range<f64>], time: f64) -> f64 {
    range_containing(ranges, time).map_or(f64::INFINITY, |r| r.end - time)
}

/// Whether two half-open ranges share any time.
pub fn overlaps(a: &Range<f64>, b: &Range<f64>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Total seconds covered.
pub fn total_duration(ranges: &[Range<f64>]) -> f64 {
    ranges.iter().map(|r| r.end - r.start).sum()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn insert_merges_touching_ranges() {
        let mut ranges = Vec::new();
        insert_range(&mut ranges, 0.0..2.0);
        insert_range(&mut ranges, 4.0..6.0);
        insert_range(&mut ranges, 2.0..4.0);
        assert_eq!(ranges, vec![0.0..6.0]);
    }

    #[test]
    fn insert_keeps_order() {
        let mut ranges = Vec::new();
        insert_range(&mut ranges, 10.0..12.0);
        insert_range(&mut ranges, 0.0..2.0);
        insert_range(&mut ranges, 5.0..6.0);
        assert_eq!(ranges, vec![0.0..2.0, 5.0..6.0, 10.0..12.0]);
    }

    #[test]
    fn remove_splits_range() {
        let mut ranges = vec![0.0..10.0];
        remove_range(&mut ranges, 4.0..6.0);
        assert_eq!(ranges, vec![0.0..4.0, 6.0..10.0]);
    }

    #[rstest]
    #[case::inside(3.0, 7.0)]
    #[case::at_start(0.0, 10.0)]
    #[case::outside(12.0, f64::INFINITY)]
    #[case::at_end(10.0, f64::INFINITY)]
    fn test_buffer_gap(#[case] time: f64, #[case] expected: f64) {
        let ranges = vec![0.0..10.0, 20.0..30.0];
        assert_eq!(buffer_gap(&ranges, time), expected);
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(&(0.0..2.0), &(1.0..3.0)));
        assert!(!overlaps(&(0.0..2.0), &(2.0..3.0)));
    }
}
