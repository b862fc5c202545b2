use lyra_manifest::Segment;

/// Distance steps (seconds from the wanted time) separating priority levels.
const PRIORITY_STEPS: [f64; 6] = [2.0, 4.0, 8.0, 12.0, 18.0, 25.0];

/// Seconds between `segment` and `wanted_time`, zero when it contains it.
pub(crate) fn distance(segment: &Segment, wanted_time: f64) -> f64 {
    if segment.end <= wanted_time {
        wanted_time - segment.end
    } else {
        (segment.time - wanted_time).max(0.0)
    }
}

/// Scheduling priority of `segment`; `0` is the most urgent.
pub(crate) fn priority(segment: &Segment, wanted_time: f64) -> u8 {
    let distance = distance(segment, wanted_time);
    let level = PRIORITY_STEPS
        .iter()
        .position(|&step| distance < step)
        .unwrap_or(PRIORITY_STEPS.len());
    u8::try_from(level).unwrap_or(u8::MAX)
}
