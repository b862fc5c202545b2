use std::{fmt, sync::Arc, time::Duration};

/// Predicate telling whether the platform may settle a seek at a position
/// other than the requested one (typically the previous keyframe).
pub type ImpreciseSeekPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Sampling interval when content is played through a media source.
pub const SAMPLING_INTERVAL_MEDIASOURCE: Duration = Duration::from_millis(1000);
/// Sampling interval in low-latency mode.
pub const SAMPLING_INTERVAL_LOW_LATENCY: Duration = Duration::from_millis(250);
/// Sampling interval for directly played files.
pub const SAMPLING_INTERVAL_NO_MEDIASOURCE: Duration = Duration::from_millis(500);

/// Playback observer configuration.
#[derive(Clone)]
pub struct ObserverOptions {
    /// Content is pushed through sinks (media source) rather than a plain URL.
    pub with_media_source: bool,
    /// Tighter rebuffering thresholds and a faster timer.
    pub low_latency_mode: bool,
    /// Overrides the timer period derived from the two flags above.
    pub sampling_interval: Option<Duration>,
    /// Enables the imprecise-seek workaround when it returns `true`.
    pub imprecise_seek: Option<ImpreciseSeekPredicate>,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            with_media_source: true,
            low_latency_mode: false,
            sampling_interval: None,
            imprecise_seek: None,
        }
    }
}

impl fmt::Debug for ObserverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverOptions")
            .field("with_media_source", &self.with_media_source)
            .field("low_latency_mode", &self.low_latency_mode)
            .field("sampling_interval", &self.sampling_interval)
            .field(
                "imprecise_seek",
                &self.imprecise_seek.as_ref().map(|_| "ImpreciseSeekPredicate"),
            )
            .finish()
    }
}

impl ObserverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media_source(mut self, with_media_source: bool) -> Self {
        self.with_media_source = with_media_source;
        self
    }

    pub fn with_low_latency(mut self, low_latency: bool) -> Self {
        self.low_latency_mode = low_latency;
        self
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = Some(interval);
        self
    }

    pub fn with_imprecise_seek(mut self, predicate: ImpreciseSeekPredicate) -> Self {
        self.imprecise_seek = Some(predicate);
        self
    }

    pub fn effective_sampling_interval(&self) -> Duration {
        if let Some(interval) = self.sampling_interval {
            return interval;
        }
        if !self.with_media_source {
            SAMPLING_INTERVAL_NO_MEDIASOURCE
        } else if self.low_latency_mode {
            SAMPLING_INTERVAL_LOW_LATENCY
        } else {
            SAMPLING_INTERVAL_MEDIASOURCE
        }
    }

    pub(crate) fn has_imprecise_seek(&self) -> bool {
        self.imprecise_seek.as_ref().is_some_and(|p| p())
    }
}
