use std::ops::Range;

use lyra_manifest::RepresentationContent;

/// Time range that should be buffered: `buffer_goal` seconds from the
/// wanted time, clipped to the period and to a finished index.
///
/// When the wanted time is at or past the last known position of the last
/// period, the range starts one second before that position so the final
/// segment is still requested.
pub(crate) fn wanted_range(
    content: &RepresentationContent,
    initial_wanted_time: f64,
    buffer_goal: f64,
) -> Range<f64> {
    let period = &content.period;
    let index = &content.representation.index;
    let last_position = index.last_position();

    let mut start = initial_wanted_time.max(period.start);
    if let Some(last) = last_position
        && content.manifest.is_last_period(period)
        && initial_wanted_time >= last
    {
        start = (last - 1.0).max(period.start);
    }

    let mut end = start + buffer_goal.max(0.0);
    if let Some(period_end) = period.end {
        end = end.min(period_end);
    }
    if index.is_finished()
        && let Some(last) = last_position
    {
        end = end.min(last);
    }
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lyra_manifest::{
        Adaptation, AdaptationContent, BufferType, Manifest, Period, fixture,
    };
    use rstest::rstest;

    use super::*;

    fn content(last_period: bool) -> RepresentationContent {
        let rep = fixture::representation("v", 1_000, 10, 2.0);
        let adaptation = Arc::new(Adaptation::new(
            "video",
            BufferType::Video,
            vec![Arc::clone(&rep)],
        ));
        let period = Arc::new(Period::new(
            "p0",
            0.0,
            Some(20.0),
            vec![Arc::clone(&adaptation)],
        ));
        let mut periods = vec![Arc::clone(&period)];
        if !last_period {
            periods.push(Arc::new(Period::new("p1", 20.0, None, vec![])));
        }
        AdaptationContent::new(Arc::new(Manifest::new(periods, false)), period, adaptation)
            .with_representation(rep)
    }

    #[rstest]
    #[case::start(0.0, 10.0, 0.0..10.0)]
    #[case::clipped_to_end(15.0, 10.0, 15.0..20.0)]
    #[case::negative_time(-3.0, 4.0, 0.0..4.0)]
    fn test_range_follows_goal(#[case] wanted: f64, #[case] goal: f64, #[case] expected: Range<f64>) {
        assert_eq!(wanted_range(&content(true), wanted, goal), expected);
    }

    #[rstest]
    #[case::at_last_position(20.0)]
    #[case::past_last_position(25.0)]
    fn test_last_segment_is_still_requested(#[case] wanted: f64) {
        let range = wanted_range(&content(true), wanted, 30.0);
        assert_eq!(range.start, 19.0);
        assert_eq!(range.end, 20.0);
    }

    #[test]
    fn non_final_period_does_not_back_up() {
        let range = wanted_range(&content(false), 20.0, 30.0);
        assert_eq!(range, 20.0..20.0);
    }
}
