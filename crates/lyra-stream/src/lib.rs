//! `lyra-stream`
//!
//! Planning and loading of media segments.
//!
//! - [`get_buffer_status`]: the buffer sufficiency analyzer, deciding which
//!   segments to load next from what is wanted and what is buffered;
//! - [`RepresentationStream`]: loads one Representation's segments into its
//!   sink, honoring termination orders;
//! - [`AdaptationStream`]: drives one Representation stream at a time for a
//!   track from ABR estimates, with buffer-goal reduction on buffer-full.
//!
//! Segment downloading ([`SegmentFetcher`]) and media-source reloads
//! ([`ReloadRequester`]) are collaborators provided by the caller.

#![forbid(unsafe_code)]

mod adaptation;
mod analyzer;
mod config;
mod error;
mod fetch;
mod observation;
mod reload;
mod representation;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use adaptation::{AdaptationStream, AdaptationStreamArgs, run_tracks};
pub use analyzer::{AnalyzerInput, BufferStatus, Discontinuity, NeededSegment, get_buffer_status};
pub use config::{
    BUFFER_GOAL_RATIO_STEP, DEFAULT_BUFFER_GOAL, DEFAULT_GC_MARGIN, MIN_BUFFER_GOAL_RATIO,
    MIN_EFFECTIVE_BUFFER_GOAL, ManualSwitchingMode, StreamOptions,
};
pub use error::{FetchError, StreamError, StreamResult};
pub use fetch::{FetchedSegment, ProgressFn, SegmentFetcher, SegmentRequest};
pub use observation::{StreamObservation, stream_observer};
#[cfg(any(test, feature = "test-utils"))]
pub use reload::ReloadRequesterMock;
pub use reload::{NoopReloadRequester, ReloadRequest, ReloadRequester};
pub use representation::{RepresentationStream, RepresentationStreamArgs, TerminationOrder};
