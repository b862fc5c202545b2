//! Which segments of the wanted range still have to be loaded.

use std::ops::Range;

use lyra_buffer::{BufferedChunk, SinkOperation};
use lyra_core::ranges;
use lyra_manifest::{RepresentationContent, Segment};
use tracing::trace;

use super::{MINIMUM_SEGMENT_SIZE, ROUNDING_ERROR};

/// Around the position, buffered data is never replaced: the decoder may
/// already hold it.
const CONTENT_REPLACEMENT_PADDING: f64 = 1.2;

/// Without a fast-switch threshold, buffered data is replaced only when the
/// current quality is this many times its bitrate.
const BITRATE_REPLACEMENT_RATIO: f64 = 1.5;

/// A buffered chunk missing more than this at one edge was partially
/// garbage collected and no longer fills its slot.
const MAX_TIME_MISSING_FROM_COMPLETE_SEGMENT: f64 = 0.15;

/// Seconds ahead of the position always admitted, whatever the memory budget.
const MIN_BUFFER_AHEAD_UNDER_BUDGET: f64 = 5.0;

pub(crate) struct NeededSegmentsInput<'a> {
    pub content: &'a RepresentationContent,
    pub chunks: &'a [BufferedChunk],
    pub pending: &'a [SinkOperation],
    pub fast_switch_threshold: Option<u64>,
    pub needed_range: Range<f64>,
    pub position: f64,
    /// Kilobytes.
    pub max_buffer_size: Option<f64>,
    /// Bytes currently held by the sink.
    pub buffered_bytes: usize,
}

#[derive(Debug, Default)]
pub(crate) struct NeededSegmentsOutput {
    /// In time order.
    pub needed: Vec<Segment>,
    /// Being pushed, or not admitted by the memory budget.
    pub on_hold: Vec<Segment>,
    pub is_buffer_full: bool,
}

pub(crate) fn needed_segments(input: &NeededSegmentsInput<'_>) -> NeededSegmentsOutput {
    let range = &input.needed_range;
    if range.end - range.start < MINIMUM_SEGMENT_SIZE {
        return NeededSegmentsOutput::default();
    }

    let candidates = input
        .content
        .representation
        .index
        .segments(range.start, range.end - range.start);

    let satisfying: Vec<Range<f64>> = input
        .chunks
        .iter()
        .filter(|c| ranges::overlaps(&c.range(), &widened(range)))
        .filter(|c| fills_its_slot(c, range))
        .filter(|c| !should_be_replaced(c, input))
        .map(BufferedChunk::effective_range)
        .fold(Vec::new(), |mut acc, r| {
            ranges::insert_range(&mut acc, r);
            acc
        });

    let mut wanted = Vec::new();
    let mut being_pushed = Vec::new();
    for segment in candidates {
        if segment.duration < MINIMUM_SEGMENT_SIZE {
            continue;
        }
        if is_being_pushed(&segment, input) {
            trace!(segment = %segment.id, "analyzer: segment already being pushed");
            being_pushed.push(segment);
            continue;
        }
        if is_covered(&segment, range, &satisfying) {
            continue;
        }
        wanted.push(segment);
    }

    let mut output = apply_memory_budget(wanted, input);
    output.on_hold.splice(0..0, being_pushed);
    output
}

fn widened(range: &Range<f64>) -> Range<f64> {
    (range.start - ROUNDING_ERROR)..(range.end + ROUNDING_ERROR)
}

/// Whether a buffered chunk can stand for its segment.
fn fills_its_slot(chunk: &BufferedChunk, needed: &Range<f64>) -> bool {
    if chunk.partially_pushed {
        return false;
    }
    let representation = &chunk.info.representation;
    if representation.is_supported() == Some(false) || representation.decipherable() == Some(false) {
        return false;
    }
    let effective = chunk.effective_range();
    let start_collected = effective.start - chunk.start > MAX_TIME_MISSING_FROM_COMPLETE_SEGMENT
        && effective.start > needed.start + ROUNDING_ERROR;
    let end_collected = chunk.end - effective.end > MAX_TIME_MISSING_FROM_COMPLETE_SEGMENT
        && effective.end < needed.end - ROUNDING_ERROR;
    !(start_collected || end_collected)
}

/// Whether buffered data should be loaded again in the current quality.
fn should_be_replaced(chunk: &BufferedChunk, input: &NeededSegmentsInput<'_>) -> bool {
    let padded = (chunk.start - CONTENT_REPLACEMENT_PADDING)..(chunk.end + CONTENT_REPLACEMENT_PADDING);
    if padded.contains(&input.position) {
        return false;
    }
    let current = input.content;
    // Another Period's data is its own to manage.
    if chunk.info.period.id != current.period.id {
        return false;
    }
    if chunk.info.adaptation.id != current.adaptation.id {
        return true;
    }
    let old = &chunk.info.representation;
    if old.id == current.representation.id {
        return false;
    }
    let new_bitrate = current.representation.bitrate;
    match input.fast_switch_threshold {
        None => {
            #[expect(clippy::cast_precision_loss)]
            let replace = (old.bitrate as f64) * BITRATE_REPLACEMENT_RATIO < new_bitrate as f64;
            replace
        }
        Some(threshold) => old.bitrate < threshold && new_bitrate > old.bitrate,
    }
}

fn is_being_pushed(segment: &Segment, input: &NeededSegmentsInput<'_>) -> bool {
    input.pending.iter().any(|op| match op {
        SinkOperation::Push(info) => {
            info.is_same_representation(input.content) && info.segment.id == segment.id
        }
        _ => false,
    })
}

/// Whether the part of `segment` inside `needed` is already buffered.
fn is_covered(segment: &Segment, needed: &Range<f64>, buffered: &[Range<f64>]) -> bool {
    let start = segment.time.max(needed.start) + ROUNDING_ERROR;
    let end = segment.end.min(needed.end) - ROUNDING_ERROR;
    if end <= start {
        return true;
    }
    buffered.iter().any(|r| r.start <= start && r.end >= end)
}

fn apply_memory_budget(wanted: Vec<Segment>, input: &NeededSegmentsInput<'_>) -> NeededSegmentsOutput {
    let Some(max_kb) = input.max_buffer_size else {
        return NeededSegmentsOutput {
            needed: wanted,
            ..Default::default()
        };
    };
    let budget = max_kb * 1000.0;
    #[expect(clippy::cast_precision_loss)]
    let mut used = input.buffered_bytes as f64;
    #[expect(clippy::cast_precision_loss)]
    let bytes_per_sec = input.content.representation.bitrate as f64 / 8.0;

    let mut output = NeededSegmentsOutput::default();
    for segment in wanted {
        let size = bytes_per_sec * segment.duration;
        let mandatory = segment.time < input.position + MIN_BUFFER_AHEAD_UNDER_BUDGET;
        if used + size > budget && !mandatory {
            output.on_hold.push(segment);
        } else {
            used += size;
            output.needed.push(segment);
        }
    }
    output.is_buffer_full = !output.on_hold.is_empty() || used > budget;
    output
}
