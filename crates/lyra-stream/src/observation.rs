//! What streams see of playback.

use std::{collections::HashMap, ops::Range, sync::Arc};

use lyra_abr::AbrObservation;
use lyra_buffer::BufferSinkStore;
use lyra_manifest::BufferType;
use lyra_observer::{
    ObservationEvent, ObservationPosition, PlaybackObservation, PlaybackObserver,
    ReadOnlyPlaybackObserver, SeekingState,
};

/// A playback observation plus what each sink holds.
#[derive(Clone, Debug)]
pub struct StreamObservation {
    pub event: ObservationEvent,
    pub position: ObservationPosition,
    pub paused: bool,
    pub seeking: SeekingState,
    pub playback_rate: f64,
    pub duration: f64,
    /// Seconds buffered ahead of the position in the media element.
    pub buffer_gap: f64,
    pub rebuffering: bool,
    /// Ranges buffered by each created sink.
    pub buffered: HashMap<BufferType, Vec<Range<f64>>>,
}

impl StreamObservation {
    pub fn from_playback(obs: &PlaybackObservation, store: &BufferSinkStore) -> Self {
        let buffered = BufferType::ALL
            .iter()
            .filter_map(|&t| {
                store
                    .get_status(t)
                    .sink()
                    .map(|sink| (t, sink.buffered()))
            })
            .collect();
        Self {
            event: obs.event,
            position: obs.position,
            paused: obs.paused,
            seeking: obs.seeking,
            playback_rate: obs.playback_rate,
            duration: obs.duration,
            buffer_gap: obs.buffer_gap,
            rebuffering: obs.rebuffering.is_some(),
            buffered,
        }
    }

    /// Position planning should start from.
    pub fn wanted_position(&self) -> f64 {
        self.position.get_wanted()
    }

    pub fn buffered_of(&self, buffer_type: BufferType) -> &[Range<f64>] {
        self.buffered.get(&buffer_type).map_or(&[], Vec::as_slice)
    }

    pub fn to_abr(&self) -> AbrObservation {
        AbrObservation {
            position: self.position.get_wanted(),
            buffer_gap: self.buffer_gap,
            playback_rate: self.playback_rate,
            duration: self.duration,
            rebuffering: self.rebuffering,
        }
    }
}

/// Read-only observer of [`StreamObservation`]s for the streams of a session.
pub fn stream_observer(
    observer: &PlaybackObserver,
    store: Arc<BufferSinkStore>,
) -> ReadOnlyPlaybackObserver<StreamObservation> {
    observer.derive_read_only(move |obs| StreamObservation::from_playback(obs, &store))
}
