//! Content builders for tests.

use std::sync::Arc;

use crate::{
    Adaptation, AdaptationContent, BufferType, Manifest, Period, Representation, Segment,
    TimelineIndex,
};

/// `count` contiguous segments of `duration` seconds starting at `start`.
pub fn contiguous_segments(prefix: &str, start: f64, count: usize, duration: f64) -> Vec<Segment> {
    (0..count)
        .map(|i| {
            #[expect(clippy::cast_precision_loss)]
            let time = start + i as f64 * duration;
            Segment::media(format!("{prefix}-{i}"), time, duration)
        })
        .collect()
}

/// Finished representation with an init segment and `count` segments.
pub fn representation(id: &str, bitrate: u64, count: usize, duration: f64) -> Arc<Representation> {
    let index = TimelineIndex::new(
        Some(Segment::init(format!("{id}-init"))),
        contiguous_segments(id, 0.0, count, duration),
        true,
    );
    Arc::new(
        Representation::new(id, bitrate, Arc::new(index))
            .with_mime_type("video/mp4")
            .with_codec("avc1.42E01E"),
    )
}

/// Single-period VOD content with one track whose encodings have `bitrates`.
pub fn single_period_content(
    buffer_type: BufferType,
    bitrates: &[u64],
    count: usize,
    duration: f64,
) -> AdaptationContent {
    let representations = bitrates
        .iter()
        .map(|&b| representation(&format!("{buffer_type}-{b}"), b, count, duration))
        .collect();
    let adaptation = Arc::new(Adaptation::new(
        format!("{buffer_type}-track"),
        buffer_type,
        representations,
    ));
    #[expect(clippy::cast_precision_loss)]
    let end = count as f64 * duration;
    let period = Arc::new(Period::new("p0", 0.0, Some(end), vec![Arc::clone(&adaptation)]));
    let manifest = Arc::new(Manifest::new(vec![Arc::clone(&period)], false));
    AdaptationContent::new(manifest, period, adaptation)
}
