//! Segment index contract and a timeline-based implementation.

use parking_lot::RwLock;
use tracing::trace;

use crate::Segment;

/// Answers "which segments exist around time T" for one Representation.
///
/// Produced by manifest parsing; this crate only consumes the contract.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = SegmentIndexMock)
)]
pub trait SegmentIndex: Send + Sync {
    /// The initialization segment, if the format has one.
    fn init_segment(&self) -> Option<Segment>;

    /// Media segments overlapping `[from, from + duration)`, in time order.
    fn segments(&self, from: f64, duration: f64) -> Vec<Segment>;

    /// Whether the manifest should be refreshed to plan `[from, to)`.
    fn should_refresh(&self, from: f64, to: f64) -> bool;

    /// Whether the index has enough information to be queried.
    fn is_initialized(&self) -> bool;

    /// Whether the index received every segment it will ever have.
    fn is_finished(&self) -> bool;

    fn first_position(&self) -> Option<f64>;

    /// End of the last known segment.
    fn last_position(&self) -> Option<f64>;

    /// Whether new segments are only ever appended after existing ones.
    fn are_segments_chronologically_generated(&self) -> bool;

    /// End of the announced gap containing `time`, if `time` is in one.
    fn check_discontinuity(&self, time: f64) -> Option<f64>;
}

/// Index over an explicit, ordered list of segments.
///
/// Live content appends segments with [`TimelineIndex::append`] and marks the
/// end with [`TimelineIndex::set_finished`].
pub struct TimelineIndex {
    init: Option<Segment>,
    state: RwLock<TimelineState>,
}

struct TimelineState {
    segments: Vec<Segment>,
    finished: bool,
}

impl TimelineIndex {
    pub fn new(init: Option<Segment>, segments: Vec<Segment>, finished: bool) -> Self {
        Self {
            init,
            state: RwLock::new(TimelineState { segments, finished }),
        }
    }

    /// Append segments starting after the last known one.
    pub fn append(&self, segments: impl IntoIterator<Item = Segment>) {
        let mut state = self.state.write();
        let last_end = state.segments.last().map_or(f64::NEG_INFINITY, |s| s.end);
        let before = state.segments.len();
        state
            .segments
            .extend(segments.into_iter().filter(|s| s.time >= last_end));
        trace!(
            added = state.segments.len() - before,
            "timeline index: segments appended"
        );
    }

    pub fn set_finished(&self) {
        self.state.write().finished = true;
    }

    pub fn len(&self) -> usize {
        self.state.read().segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SegmentIndex for TimelineIndex {
    fn init_segment(&self) -> Option<Segment> {
        self.init.clone()
    }

    fn segments(&self, from: f64, duration: f64) -> Vec<Segment> {
        let to = from + duration;
        self.state
            .read()
            .segments
            .iter()
            .filter(|s| s.end > from && s.time < to)
            .cloned()
            .collect()
    }

    fn should_refresh(&self, _from: f64, to: f64) -> bool {
        let state = self.state.read();
        if state.finished {
            return false;
        }
        state.segments.last().is_none_or(|last| to > last.end)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn is_finished(&self) -> bool {
        self.state.read().finished
    }

    fn first_position(&self) -> Option<f64> {
        self.state.read().segments.first().map(|s| s.time)
    }

    fn last_position(&self) -> Option<f64> {
        self.state.read().segments.last().map(|s| s.end)
    }

    fn are_segments_chronologically_generated(&self) -> bool {
        true
    }

    fn check_discontinuity(&self, time: f64) -> Option<f64> {
        let state = self.state.read();
        let first = state.segments.first()?;
        if time < first.time {
            return Some(first.time);
        }
        state
            .segments
            .windows(2)
            .find(|pair| time >= pair[0].end && time < pair[1].time)
            .map(|pair| pair[1].time)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn index_with_gap() -> TimelineIndex {
        TimelineIndex::new(
            Some(Segment::init("init")),
            vec![
                Segment::media("0", 0.0, 2.0),
                Segment::media("1", 2.0, 2.0),
                Segment::media("2", 6.0, 2.0),
            ],
            true,
        )
    }

    #[test]
    fn segments_returns_overlapping_only() {
        let index = index_with_gap();
        let ids: Vec<_> = index
            .segments(1.0, 2.0)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[rstest]
    #[case::inside_gap(4.5, Some(6.0))]
    #[case::before_first(-1.0, Some(0.0))]
    #[case::inside_segment(1.0, None)]
    #[case::after_last(9.0, None)]
    fn test_check_discontinuity(#[case] time: f64, #[case] expected: Option<f64>) {
        assert_eq!(index_with_gap().check_discontinuity(time), expected);
    }

    #[test]
    fn live_index_needs_refresh_past_last_segment() {
        let index = TimelineIndex::new(None, vec![Segment::media("0", 0.0, 2.0)], false);
        assert!(index.should_refresh(0.0, 3.0));
        assert!(!index.should_refresh(0.0, 1.5));

        index.append([Segment::media("1", 2.0, 2.0), Segment::media("0-dup", 0.0, 2.0)]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.last_position(), Some(4.0));

        index.set_finished();
        assert!(!index.should_refresh(0.0, 10.0));
    }
}
