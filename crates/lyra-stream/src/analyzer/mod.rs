//! Buffer sufficiency analysis.
//!
//! [`get_buffer_status`] is a synchronous function of what the sink holds,
//! what is wanted and what is still being pushed. It decides which segments
//! a Representation stream loads next.

mod discontinuity;
mod needed_segments;
mod priority;
mod wanted_range;

use lyra_buffer::SegmentSink;
use lyra_manifest::{RepresentationContent, Segment};
use tracing::trace;

pub use self::discontinuity::Discontinuity;
use self::{
    discontinuity::imminent_discontinuity,
    needed_segments::{NeededSegmentsInput, needed_segments},
    wanted_range::wanted_range,
};

/// Segments shorter than this are ignored.
const MINIMUM_SEGMENT_SIZE: f64 = 0.005;

/// Tolerance on time comparisons between index and buffered data. Never
/// below [`MINIMUM_SEGMENT_SIZE`].
const ROUNDING_ERROR: f64 = 1.0 / 60.0;

/// Segment to load, with its scheduling priority (`0` is the most urgent).
#[derive(Clone, Debug, PartialEq)]
pub struct NeededSegment {
    pub segment: Segment,
    pub priority: u8,
}

/// Result of one analysis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BufferStatus {
    pub imminent_discontinuity: Option<Discontinuity>,
    /// The wanted range reaches the end of the track and nothing is left to load.
    pub has_finished_loading: bool,
    /// Most urgent first.
    pub needed_segments: Vec<NeededSegment>,
    /// Being pushed, or held back by the memory budget.
    pub on_hold: Vec<Segment>,
    pub should_refresh_manifest: bool,
    /// The sink's memory budget cannot admit what the buffer goal asks for.
    pub is_buffer_full: bool,
}

/// Inputs of [`get_buffer_status`].
pub struct AnalyzerInput<'a> {
    pub content: &'a RepresentationContent,
    /// Time loading should start from.
    pub initial_wanted_time: f64,
    /// Current playback position.
    pub position: f64,
    /// Bitrate under which buffered data may be replaced. `None` means no
    /// restriction, `Some(0)` means nothing is replaced.
    pub fast_switch_threshold: Option<u64>,
    /// Seconds to buffer ahead of `initial_wanted_time`.
    pub buffer_goal: f64,
    /// Memory budget of the sink, in kilobytes.
    pub max_buffer_size: Option<f64>,
    pub sink: &'a dyn SegmentSink,
}

/// Decide what to load next.
pub fn get_buffer_status(input: &AnalyzerInput<'_>) -> BufferStatus {
    let content = input.content;
    let index = &content.representation.index;

    input.sink.synchronize_inventory();
    let inventory = input.sink.inventory();
    let pending = input.sink.pending_operations();

    let range = wanted_range(content, input.initial_wanted_time, input.buffer_goal);
    let should_refresh_manifest = index.should_refresh(range.start, range.end);

    let segments = needed_segments(&NeededSegmentsInput {
        content,
        chunks: inventory.chunks(),
        pending: &pending,
        fast_switch_threshold: input.fast_switch_threshold,
        needed_range: range.clone(),
        position: input.position,
        max_buffer_size: input.max_buffer_size,
        buffered_bytes: inventory.total_size(),
    });

    let mut needed: Vec<NeededSegment> = segments
        .needed
        .into_iter()
        .map(|segment| NeededSegment {
            priority: priority::priority(&segment, input.initial_wanted_time),
            segment,
        })
        .collect();
    needed.sort_by(|a, b| {
        a.priority.cmp(&b.priority).then_with(|| {
            priority::distance(&a.segment, input.initial_wanted_time)
                .total_cmp(&priority::distance(&b.segment, input.initial_wanted_time))
        })
    });

    let has_finished_loading = index.is_initialized()
        && track_end(content).is_some_and(|end| range.end >= end - ROUNDING_ERROR)
        && needed.is_empty()
        && segments.on_hold.is_empty();

    let imminent_discontinuity =
        imminent_discontinuity(content, &range, inventory.chunks(), has_finished_loading);

    trace!(
        representation = %content.representation.id,
        start = range.start,
        end = range.end,
        needed = needed.len(),
        on_hold = segments.on_hold.len(),
        has_finished_loading,
        "analyzer: buffer status"
    );

    BufferStatus {
        imminent_discontinuity,
        has_finished_loading,
        needed_segments: needed,
        on_hold: segments.on_hold,
        should_refresh_manifest,
        is_buffer_full: segments.is_buffer_full,
    }
}

/// Last time the track can have data for, when known.
fn track_end(content: &RepresentationContent) -> Option<f64> {
    let index = &content.representation.index;
    let index_end = index
        .is_finished()
        .then(|| index.last_position())
        .flatten();
    match (index_end, content.period.end) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
