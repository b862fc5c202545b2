//! Contract of the platform media element the observer samples.

use std::{ops::Range, sync::Arc};

/// Platform media events the observer reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaEventKind {
    Play,
    Pause,
    Seeking,
    Seeked,
    RateChange,
    Stalled,
    LoadedMetadata,
    CanPlay,
    CanPlayThrough,
    Ended,
}

/// `HTMLMediaElement.readyState` levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

pub type MediaEventListener = Arc<dyn Fn(MediaEventKind) + Send + Sync>;

/// Identifies a listener registered on a [`MediaElement`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediaListenerId(pub u64);

/// The platform media element.
///
/// Getters always return the live platform value.
pub trait MediaElement: Send + Sync {
    fn current_time(&self) -> f64;
    fn set_current_time(&self, time: f64);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);
    fn paused(&self) -> bool;
    fn seeking(&self) -> bool;
    fn ended(&self) -> bool;
    fn ready_state(&self) -> ReadyState;
    /// `f64::NAN` until metadata is loaded, `f64::INFINITY` for live.
    fn duration(&self) -> f64;
    fn buffered(&self) -> Vec<Range<f64>>;
    fn add_event_listener(&self, listener: MediaEventListener) -> MediaListenerId;
    fn remove_event_listener(&self, id: MediaListenerId);
}
