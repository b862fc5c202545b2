#![forbid(unsafe_code)]

use lyra_manifest::BufferType;

/// Why a track's stream stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Content ended or estimates stopped.
    Finished,
    /// A reload of the media source was requested instead.
    ReloadRequested,
    /// The track cannot progress any more.
    Failed { error: String },
}

/// Events emitted by adaptation and representation streams.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A new Representation became current for the track.
    RepresentationChange {
        buffer_type: BufferType,
        period_id: String,
        representation_id: String,
    },
    /// The bitrate estimate attached to the latest ABR estimate changed.
    BitrateEstimateChange {
        buffer_type: BufferType,
        bitrate: Option<u64>,
    },
    /// A segment was pushed and acknowledged by the sink.
    AddedSegment {
        buffer_type: BufferType,
        representation_id: String,
        segment_id: String,
        start: f64,
        end: f64,
    },
    /// Result of one planning pass of a representation stream.
    StreamStatusUpdate {
        buffer_type: BufferType,
        position: f64,
        needed_segments: usize,
        has_finished_loading: bool,
        is_buffer_full: bool,
        discontinuity_start: Option<f64>,
        discontinuity_end: Option<f64>,
    },
    /// The segment index asked for a fresher manifest.
    NeedsManifestRefresh { buffer_type: BufferType },
    /// A termination order was received; the next stream follows.
    Terminating {
        buffer_type: BufferType,
        representation_id: String,
    },
    /// The buffer goal ratio of a Representation was lowered after buffer-full.
    BufferGoalReduced {
        buffer_type: BufferType,
        representation_id: String,
        ratio: f64,
    },
    /// A full media-source reload is needed to apply a manual switch.
    ReloadRequested {
        buffer_type: BufferType,
        period_id: String,
        position_delta: f64,
    },
    /// A non-fatal problem (failed segment request, etc).
    Warning {
        buffer_type: BufferType,
        message: String,
    },
    /// The track's stream stopped.
    TrackEnded {
        buffer_type: BufferType,
        outcome: TrackOutcome,
    },
}
