//! Configuration for [`Session`](crate::Session).

use lyra_buffer::SinkStoreOptions;
use lyra_observer::ObserverOptions;
use lyra_stream::StreamOptions;

/// Events buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Unified configuration for a playback [`Session`](crate::Session).
///
/// # Example
///
/// ```ignore
/// use lyra::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_stream(StreamOptions::default().with_buffer_goal(20.0))
///     .with_video(false);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    pub observer: ObserverOptions,
    pub stream: StreamOptions,
    pub sinks: SinkStoreOptions,
    /// Whether the content has a video track. Without one, audio is the only
    /// platform-decoded buffer type.
    pub has_video: bool,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            observer: ObserverOptions::default(),
            stream: StreamOptions::default(),
            sinks: SinkStoreOptions::default(),
            has_video: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    pub fn with_observer(mut self, options: ObserverOptions) -> Self {
        self.observer = options;
        self
    }

    pub fn with_stream(mut self, options: StreamOptions) -> Self {
        self.stream = options;
        self
    }

    pub fn with_sinks(mut self, options: SinkStoreOptions) -> Self {
        self.sinks = options;
        self
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = has_video;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
