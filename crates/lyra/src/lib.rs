#![forbid(unsafe_code)]

//! # Lyra
//!
//! Facade crate over the adaptive streaming engine.
//!
//! ## Quick start
//!
//! ```ignore
//! use lyra::prelude::*;
//!
//! let session = Session::new(element, media_source, SessionConfig::default(), &CancelToken::new());
//! let tracks: Vec<_> = contents
//!     .into_iter()
//!     .map(|content| session.track(content, collaborators.clone()))
//!     .collect();
//! let outcomes = session.play(&tracks).await;
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod core {
    pub use lyra_core::*;
}

pub mod manifest {
    pub use lyra_manifest::*;
}

pub mod events {
    pub use lyra_events::*;
}

pub mod observer {
    pub use lyra_observer::*;
}

pub mod abr {
    pub use lyra_abr::*;
}

pub mod buffer {
    pub use lyra_buffer::*;
}

pub mod stream {
    pub use lyra_stream::*;
}

// ── Session ─────────────────────────────────────────────────────────────

mod config;
mod session;

pub use config::{DEFAULT_EVENT_CAPACITY, SessionConfig};
pub use session::{Session, TrackCollaborators};

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use lyra_abr::{AbrOptions, Estimate, RepresentationEstimator, ThroughputAbr};
    pub use lyra_buffer::{BufferSinkStore, MediaSourceBackend, SegmentSink, SinkError, SourceBufferBackend};
    pub use lyra_core::{CancelToken, CancellationError, SharedReference};
    pub use lyra_events::{Event, EventBus, SinkEvent, StreamEvent, TrackOutcome};
    pub use lyra_manifest::{
        Adaptation, AdaptationContent, BufferType, Manifest, Period, Representation, Segment,
        SegmentIndex,
    };
    pub use lyra_observer::{MediaElement, ObserverOptions, PlaybackObserver, ReadOnlyPlaybackObserver};
    pub use lyra_stream::{
        AdaptationStream, ManualSwitchingMode, ReloadRequester, SegmentFetcher, StreamError,
        StreamOptions,
    };

    pub use crate::{Session, SessionConfig, TrackCollaborators};
}
