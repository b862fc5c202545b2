use std::ops::Range;

use lyra_buffer::BufferedChunk;
use lyra_manifest::RepresentationContent;

use super::ROUNDING_ERROR;

/// A hole in the content that loading more segments cannot fill.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Discontinuity {
    /// Where playback will run out of data.
    pub start: f64,
    /// Where data resumes. `None` when nothing follows (end of content).
    pub end: Option<f64>,
}

/// Next discontinuity reachable from the start of `needed` without leaving
/// buffered data, if any.
pub(crate) fn imminent_discontinuity(
    content: &RepresentationContent,
    needed: &Range<f64>,
    chunks: &[BufferedChunk],
    has_finished_loading: bool,
) -> Option<Discontinuity> {
    let index = &content.representation.index;
    if !index.is_initialized() {
        return None;
    }
    if !index.are_segments_chronologically_generated() && !has_finished_loading {
        return None;
    }

    if let Some(next) = index.check_discontinuity(needed.start) {
        return Some(Discontinuity {
            start: needed.start,
            end: Some(next),
        });
    }

    let buffered_end = contiguous_buffered_end(chunks, needed.start);
    if buffered_end < needed.end + ROUNDING_ERROR
        && let Some(next) = index.check_discontinuity(buffered_end)
    {
        return Some(Discontinuity {
            start: buffered_end,
            end: Some(next),
        });
    }

    end_of_index_gap(content, buffered_end)
}

/// End of the fully pushed data running without holes from `from`.
fn contiguous_buffered_end(chunks: &[BufferedChunk], from: f64) -> f64 {
    let mut end = from;
    for chunk in chunks.iter().filter(|c| !c.partially_pushed) {
        let range = chunk.effective_range();
        if range.start > end + ROUNDING_ERROR {
            break;
        }
        end = end.max(range.end);
    }
    end
}

/// Gap between the last segment of a finished index and the period end,
/// once buffered data reaches it.
fn end_of_index_gap(content: &RepresentationContent, buffered_end: f64) -> Option<Discontinuity> {
    let index = &content.representation.index;
    if !index.is_finished() {
        return None;
    }
    let last = index.last_position()?;
    let period_end = content.period.end?;
    if period_end - last <= ROUNDING_ERROR || buffered_end < last - ROUNDING_ERROR {
        return None;
    }
    let end = if content.manifest.is_last_period(&content.period) {
        None
    } else {
        Some(period_end)
    };
    Some(Discontinuity { start: last, end })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lyra_buffer::SegmentInventory;
    use lyra_manifest::{
        Adaptation, AdaptationContent, BufferType, Manifest, Period, Representation, Segment,
        SegmentIndex, SegmentIndexMock, TimelineIndex,
    };
    use rstest::rstest;
    use unimock::{MockFn, Unimock, matching};

    use super::*;

    /// Segments 0..2, 2..4, then a hole until 6..8. Period ends at `period_end`.
    fn content(period_end: f64) -> RepresentationContent {
        let index = TimelineIndex::new(
            None,
            vec![
                Segment::media("0", 0.0, 2.0),
                Segment::media("1", 2.0, 2.0),
                Segment::media("2", 6.0, 2.0),
            ],
            true,
        );
        content_with(Arc::new(index), period_end)
    }

    fn content_with(index: Arc<dyn SegmentIndex>, period_end: f64) -> RepresentationContent {
        let rep = Arc::new(Representation::new("v", 1_000, index));
        let adaptation = Arc::new(Adaptation::new("video", BufferType::Video, vec![Arc::clone(&rep)]));
        let period = Arc::new(Period::new("p0", 0.0, Some(period_end), vec![Arc::clone(&adaptation)]));
        AdaptationContent::new(Arc::new(Manifest::new(vec![Arc::clone(&period)], false)), period, adaptation)
            .with_representation(rep)
    }

    fn buffered(content: &RepresentationContent, ids: &[usize]) -> SegmentInventory {
        let segments = content.representation.index.segments(0.0, 100.0);
        let mut inv = SegmentInventory::new();
        for &i in ids {
            let info = content.segment_context(segments[i].clone());
            inv.insert_chunk(info.clone(), true, 10);
            inv.complete_segment(&info);
        }
        inv
    }

    #[test]
    fn wanted_time_inside_hole() {
        let c = content(8.0);
        let inv = SegmentInventory::new();
        let found = imminent_discontinuity(&c, &(4.5..10.0), inv.chunks(), false);
        assert_eq!(found, Some(Discontinuity { start: 4.5, end: Some(6.0) }));
    }

    #[test]
    fn hole_after_buffered_data() {
        let c = content(8.0);
        let inv = buffered(&c, &[0, 1]);
        let found = imminent_discontinuity(&c, &(0.0..8.0), inv.chunks(), false);
        assert_eq!(found, Some(Discontinuity { start: 4.0, end: Some(6.0) }));
    }

    #[test]
    fn no_discontinuity_before_buffer_reaches_hole() {
        let c = content(8.0);
        let inv = buffered(&c, &[0]);
        assert_eq!(imminent_discontinuity(&c, &(0.0..8.0), inv.chunks(), false), None);
    }

    #[test]
    fn gap_before_period_end() {
        let c = content(9.0);
        let inv = buffered(&c, &[2]);
        let found = imminent_discontinuity(&c, &(6.0..9.0), inv.chunks(), true);
        assert_eq!(found, Some(Discontinuity { start: 8.0, end: None }));
    }

    /// Index announcing a hole from 4 to 6.
    fn index_with_hole(initialized: bool, chronological: bool) -> Unimock {
        Unimock::new((
            SegmentIndexMock::is_initialized
                .each_call(matching!())
                .returns(initialized),
            SegmentIndexMock::are_segments_chronologically_generated
                .each_call(matching!())
                .returns(chronological),
            SegmentIndexMock::check_discontinuity
                .each_call(matching!(_))
                .returns(Some(6.0)),
        ))
        .no_verify_in_drop()
    }

    #[rstest]
    #[case::uninitialized(false, true, true, false)]
    #[case::uninitialized_and_loaded(false, true, true, true)]
    #[case::unordered_while_loading(true, false, false, false)]
    #[case::unordered_once_loaded(true, false, true, true)]
    #[case::chronological_while_loading(true, true, false, true)]
    fn detection_requires_a_settled_index(
        #[case] initialized: bool,
        #[case] chronological: bool,
        #[case] has_finished_loading: bool,
        #[case] detected: bool,
    ) {
        let c = content_with(Arc::new(index_with_hole(initialized, chronological)), 8.0);
        let inv = SegmentInventory::new();
        let found = imminent_discontinuity(&c, &(4.5..10.0), inv.chunks(), has_finished_loading);
        let expected = detected.then_some(Discontinuity { start: 4.5, end: Some(6.0) });
        assert_eq!(found, expected);
    }
}
