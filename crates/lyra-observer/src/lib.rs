//! `lyra-observer`
//!
//! Playback observation of one media element.
//!
//! A [`PlaybackObserver`] samples the element on platform events and on a
//! timer, and republishes each sample as an immutable
//! [`PlaybackObservation`] through a [`lyra_core::SharedReference`].
//! Inner components get a [`ReadOnlyPlaybackObserver`]: the same updates,
//! optionally narrowed by a transform, without seek authority.

#![forbid(unsafe_code)]

mod element;
mod observation;
mod observer;
mod options;
mod read_only;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use element::{MediaElement, MediaEventKind, MediaEventListener, MediaListenerId, ReadyState};
pub use observation::{
    FreezingStatus, ObservationEvent, ObservationPosition, PlaybackObservation, RebufferingReason,
    RebufferingStatus, SeekingState,
};
pub use observer::{ListenOptions, PlaybackObserver};
pub use options::{
    ImpreciseSeekPredicate, ObserverOptions, SAMPLING_INTERVAL_LOW_LATENCY,
    SAMPLING_INTERVAL_MEDIASOURCE, SAMPLING_INTERVAL_NO_MEDIASOURCE,
};
pub use read_only::ReadOnlyPlaybackObserver;
