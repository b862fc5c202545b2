//! Observation snapshot and the pure status computations behind it.

use std::ops::Range;

use lyra_core::ranges;
use tokio::time::Instant;

use crate::{MediaElement, MediaEventKind, ReadyState};

/// What triggered an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObservationEvent {
    /// First observation, emitted on construction.
    Init,
    /// Timer sample with no recent platform event.
    Timeupdate,
    Play,
    Pause,
    /// Platform seek not requested by the observer.
    Seeking,
    /// Platform seek requested through [`crate::PlaybackObserver::set_current_time`].
    InternalSeeking,
    Seeked,
    RateChange,
    Stalled,
    LoadedMetadata,
    CanPlay,
    CanPlayThrough,
    Ended,
}

impl From<MediaEventKind> for ObservationEvent {
    fn from(kind: MediaEventKind) -> Self {
        match kind {
            MediaEventKind::Play => Self::Play,
            MediaEventKind::Pause => Self::Pause,
            MediaEventKind::Seeking => Self::Seeking,
            MediaEventKind::Seeked => Self::Seeked,
            MediaEventKind::RateChange => Self::RateChange,
            MediaEventKind::Stalled => Self::Stalled,
            MediaEventKind::LoadedMetadata => Self::LoadedMetadata,
            MediaEventKind::CanPlay => Self::CanPlay,
            MediaEventKind::CanPlayThrough => Self::CanPlayThrough,
            MediaEventKind::Ended => Self::Ended,
        }
    }
}

/// Seek in progress, and who asked for it.
///
/// Classification is best-effort: it counts observer-requested seeks and
/// assumes the platform reports them in order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SeekingState {
    #[default]
    None,
    Internal,
    External,
}

impl SeekingState {
    pub fn is_seeking(self) -> bool {
        self != Self::None
    }
}

/// Playback position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationPosition {
    /// Position reported by the platform.
    pub last: f64,
    /// Target of an internal seek the platform has not reached yet.
    pub wanted: Option<f64>,
}

impl ObservationPosition {
    pub fn get_polled(&self) -> f64 {
        self.last
    }

    /// Position playback logic should plan for.
    pub fn get_wanted(&self) -> f64 {
        self.wanted.unwrap_or(self.last)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RebufferingReason {
    Seeking,
    NotReady,
    Buffering,
}

/// Playback is stalled for lack of data.
#[derive(Clone, Debug, PartialEq)]
pub struct RebufferingStatus {
    pub reason: RebufferingReason,
    pub since: Instant,
    /// Position at which playback should resume, when known.
    pub position: Option<f64>,
}

/// Playback is stuck although data is buffered.
#[derive(Clone, Debug, PartialEq)]
pub struct FreezingStatus {
    pub since: Instant,
}

/// Immutable sample of the media element state.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackObservation {
    pub event: ObservationEvent,
    pub position: ObservationPosition,
    pub buffered: Vec<Range<f64>>,
    /// Seconds buffered ahead of the position, `INFINITY` when not buffered.
    pub buffer_gap: f64,
    pub current_range: Option<Range<f64>>,
    pub duration: f64,
    pub paused: bool,
    pub seeking: SeekingState,
    pub ready_state: ReadyState,
    pub playback_rate: f64,
    pub ended: bool,
    pub rebuffering: Option<RebufferingStatus>,
    pub freezing: Option<FreezingStatus>,
}

/// Raw platform values read in one go.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MediaSnapshot {
    pub position: f64,
    pub buffered: Vec<Range<f64>>,
    pub duration: f64,
    pub paused: bool,
    pub seeking: bool,
    pub ended: bool,
    pub ready_state: ReadyState,
    pub playback_rate: f64,
}

impl MediaSnapshot {
    pub(crate) fn read(element: &dyn MediaElement) -> Self {
        Self {
            position: element.current_time(),
            buffered: element.buffered(),
            duration: element.duration(),
            paused: element.paused(),
            seeking: element.seeking(),
            ended: element.ended(),
            ready_state: element.ready_state(),
            playback_rate: element.playback_rate(),
        }
    }
}

/// Gap thresholds for rebuffering detection.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RebufferingThresholds {
    /// Enter rebuffering under this gap.
    pub enter_gap: f64,
    pub resume_after_seeking: f64,
    pub resume_not_ready: f64,
    pub resume_buffering: f64,
}

impl RebufferingThresholds {
    pub(crate) fn new(low_latency: bool) -> Self {
        if low_latency {
            Self {
                enter_gap: 0.2,
                resume_after_seeking: 0.6,
                resume_not_ready: 0.4,
                resume_buffering: 0.5,
            }
        } else {
            Self {
                enter_gap: 0.5,
                resume_after_seeking: 1.5,
                resume_not_ready: 0.5,
                resume_buffering: 5.0,
            }
        }
    }

    fn resume_gap(&self, reason: RebufferingReason) -> f64 {
        match reason {
            RebufferingReason::Seeking => self.resume_after_seeking,
            RebufferingReason::NotReady => self.resume_not_ready,
            RebufferingReason::Buffering => self.resume_buffering,
        }
    }
}

/// Distance to the end under which running out of data is not a stall.
const END_OF_CONTENT_TOLERANCE: f64 = 0.5;

/// Buffered seconds above which a non-moving position is a freeze.
pub(crate) const MINIMUM_BUFFER_GAP_FOR_FREEZE: f64 = 2.0;

fn near_end(position: f64, gap: f64, duration: f64) -> bool {
    if !duration.is_finite() {
        return false;
    }
    let buffered_until = if gap.is_finite() { position + gap } else { position };
    duration - buffered_until <= END_OF_CONTENT_TOLERANCE
}

/// Rebuffering status for a new sample, given the previous one.
pub(crate) fn rebuffering_status(
    previous: Option<&RebufferingStatus>,
    snapshot: &MediaSnapshot,
    seeking: SeekingState,
    buffer_gap: f64,
    with_media_source: bool,
    thresholds: RebufferingThresholds,
    now: Instant,
) -> Option<RebufferingStatus> {
    if snapshot.ended {
        return None;
    }

    if !with_media_source {
        // Without sinks the buffered ranges are not ours to interpret.
        let stalled = !snapshot.paused && snapshot.ready_state < ReadyState::HaveFutureData;
        return stalled.then(|| RebufferingStatus {
            reason: if seeking.is_seeking() {
                RebufferingReason::Seeking
            } else {
                RebufferingReason::NotReady
            },
            since: previous.map_or(now, |p| p.since),
            position: None,
        });
    }

    if near_end(snapshot.position, buffer_gap, snapshot.duration) {
        return None;
    }

    if let Some(previous) = previous {
        let resume = thresholds.resume_gap(previous.reason);
        if buffer_gap.is_finite() && buffer_gap >= resume {
            return None;
        }
        return Some(RebufferingStatus {
            position: Some(snapshot.position),
            ..previous.clone()
        });
    }

    let starving = !buffer_gap.is_finite() || buffer_gap <= thresholds.enter_gap;
    if !starving {
        return None;
    }
    let reason = if seeking.is_seeking() {
        RebufferingReason::Seeking
    } else if snapshot.ready_state < ReadyState::HaveCurrentData {
        RebufferingReason::NotReady
    } else {
        RebufferingReason::Buffering
    };
    Some(RebufferingStatus {
        reason,
        since: now,
        position: Some(snapshot.position),
    })
}

/// Freezing status: the position did not move on a timer sample although
/// playback should progress.
pub(crate) fn freezing_status(
    previous: Option<&PlaybackObservation>,
    snapshot: &MediaSnapshot,
    event: ObservationEvent,
    buffer_gap: f64,
    rebuffering: Option<&RebufferingStatus>,
    now: Instant,
) -> Option<FreezingStatus> {
    let previous = previous?;
    if event != ObservationEvent::Timeupdate
        || snapshot.paused
        || snapshot.seeking
        || snapshot.ended
        || snapshot.playback_rate == 0.0
        || rebuffering.is_some()
        || !buffer_gap.is_finite()
        || buffer_gap < MINIMUM_BUFFER_GAP_FOR_FREEZE
    {
        return None;
    }
    // The platform reports the very same value when stuck.
    let stuck = previous.position.last == snapshot.position;
    if !stuck {
        return None;
    }
    Some(FreezingStatus {
        since: previous.freezing.as_ref().map_or(now, |f| f.since),
    })
}

/// Build the buffered-range part of an observation.
pub(crate) fn buffer_info(buffered: &[Range<f64>], position: f64) -> (f64, Option<Range<f64>>) {
    (
        ranges::buffer_gap(buffered, position),
        ranges::range_containing(buffered, position),
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn snapshot(position: f64, buffered: Vec<Range<f64>>) -> MediaSnapshot {
        MediaSnapshot {
            position,
            buffered,
            duration: 100.0,
            paused: false,
            seeking: false,
            ended: false,
            ready_state: ReadyState::HaveEnoughData,
            playback_rate: 1.0,
        }
    }

    fn rebuffering(
        previous: Option<&RebufferingStatus>,
        snap: &MediaSnapshot,
        seeking: SeekingState,
    ) -> Option<RebufferingStatus> {
        let (gap, _) = buffer_info(&snap.buffered, snap.position);
        rebuffering_status(
            previous,
            snap,
            seeking,
            gap,
            true,
            RebufferingThresholds::new(false),
            Instant::now(),
        )
    }

    #[rstest]
    #[case::nothing_buffered(vec![], SeekingState::None, Some(RebufferingReason::Buffering))]
    #[case::small_gap(vec![0.0..10.3], SeekingState::None, Some(RebufferingReason::Buffering))]
    #[case::seeking(vec![], SeekingState::External, Some(RebufferingReason::Seeking))]
    #[case::enough_gap(vec![0.0..20.0], SeekingState::None, None)]
    fn test_rebuffering_entry(
        #[case] buffered: Vec<Range<f64>>,
        #[case] seeking: SeekingState,
        #[case] expected: Option<RebufferingReason>,
    ) {
        let snap = snapshot(10.0, buffered);
        assert_eq!(rebuffering(None, &snap, seeking).map(|s| s.reason), expected);
    }

    #[test]
    fn rebuffering_exits_only_past_resume_gap() {
        let previous = RebufferingStatus {
            reason: RebufferingReason::Buffering,
            since: Instant::now(),
            position: None,
        };
        // 2s buffered: above the entry gap but below the 5s resume gap.
        let snap = snapshot(10.0, vec![0.0..12.0]);
        assert!(rebuffering(Some(&previous), &snap, SeekingState::None).is_some());

        let snap = snapshot(10.0, vec![0.0..16.0]);
        assert!(rebuffering(Some(&previous), &snap, SeekingState::None).is_none());
    }

    #[test]
    fn no_rebuffering_near_end_of_content() {
        let snap = snapshot(99.8, vec![0.0..100.0]);
        assert!(rebuffering(None, &snap, SeekingState::None).is_none());
    }

    #[test]
    fn not_ready_without_current_data() {
        let mut snap = snapshot(0.0, vec![]);
        snap.ready_state = ReadyState::HaveMetadata;
        assert_eq!(
            rebuffering(None, &snap, SeekingState::None).map(|s| s.reason),
            Some(RebufferingReason::NotReady)
        );
    }

    fn observation_at(position: f64) -> PlaybackObservation {
        PlaybackObservation {
            event: ObservationEvent::Timeupdate,
            position: ObservationPosition {
                last: position,
                wanted: None,
            },
            buffered: vec![0.0..30.0],
            buffer_gap: 30.0 - position,
            current_range: Some(0.0..30.0),
            duration: 100.0,
            paused: false,
            seeking: SeekingState::None,
            ready_state: ReadyState::HaveEnoughData,
            playback_rate: 1.0,
            ended: false,
            rebuffering: None,
            freezing: None,
        }
    }

    #[test]
    fn freezing_when_position_stuck_with_buffer() {
        let previous = observation_at(5.0);
        let snap = snapshot(5.0, vec![0.0..30.0]);
        let now = Instant::now();
        let status = freezing_status(
            Some(&previous),
            &snap,
            ObservationEvent::Timeupdate,
            25.0,
            None,
            now,
        );
        assert_eq!(status, Some(FreezingStatus { since: now }));
    }

    #[rstest]
    #[case::moved(6.0, ObservationEvent::Timeupdate, 24.0)]
    #[case::platform_event(5.0, ObservationEvent::Play, 25.0)]
    #[case::little_buffer(5.0, ObservationEvent::Timeupdate, 1.0)]
    fn test_no_freezing(#[case] position: f64, #[case] event: ObservationEvent, #[case] gap: f64) {
        let previous = observation_at(5.0);
        let snap = snapshot(position, vec![0.0..30.0]);
        assert!(freezing_status(Some(&previous), &snap, event, gap, None, Instant::now()).is_none());
    }

    #[test]
    fn wanted_position_falls_back_to_polled() {
        let pos = ObservationPosition {
            last: 3.0,
            wanted: None,
        };
        assert_eq!(pos.get_wanted(), 3.0);
        let pos = ObservationPosition {
            last: 3.0,
            wanted: Some(5.0),
        };
        assert_eq!(pos.get_wanted(), 5.0);
        assert_eq!(pos.get_polled(), 3.0);
    }
}
