use std::{fmt, sync::Arc, time::Duration};

use lyra_manifest::Representation;
use web_time::Instant;

/// Quality decision produced by an estimator.
#[derive(Clone)]
pub struct Estimate {
    pub representation: Arc<Representation>,
    /// Current bandwidth estimate, bits per second.
    pub bitrate: Option<u64>,
    /// Bandwidth the network sustained over a longer window.
    pub known_stable_bitrate: Option<u64>,
    /// Chosen by the user rather than by adaptation.
    pub manual: bool,
    /// Apply now, even if it interrupts an in-flight request.
    pub urgent: bool,
}

impl Estimate {
    pub fn new(representation: Arc<Representation>) -> Self {
        Self {
            representation,
            bitrate: None,
            known_stable_bitrate: None,
            manual: false,
            urgent: false,
        }
    }

    pub fn with_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_known_stable_bitrate(mut self, bitrate: Option<u64>) -> Self {
        self.known_stable_bitrate = bitrate;
        self
    }

    pub fn manual(mut self) -> Self {
        self.manual = true;
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

impl PartialEq for Estimate {
    fn eq(&self, other: &Self) -> bool {
        self.representation.id == other.representation.id
            && self.bitrate == other.bitrate
            && self.known_stable_bitrate == other.known_stable_bitrate
            && self.manual == other.manual
            && self.urgent == other.urgent
    }
}

impl fmt::Debug for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Estimate")
            .field("representation", &self.representation.id)
            .field("bitrate", &self.bitrate)
            .field("known_stable_bitrate", &self.known_stable_bitrate)
            .field("manual", &self.manual)
            .field("urgent", &self.urgent)
            .finish()
    }
}

/// ABR mode selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbrMode {
    /// Automatic adaptation, optionally starting at the highest encoding
    /// not above the given bitrate.
    Auto(Option<u64>),
    /// Fixed quality: the highest encoding not above the given bitrate.
    Manual(u64),
}

impl Default for AbrMode {
    fn default() -> Self {
        Self::Auto(None)
    }
}

/// Throughput-based estimator configuration.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Hysteresis ratio for down-switch.
    pub down_hysteresis_ratio: f64,
    /// Buffer gap (seconds) under which a down-switch is urgent.
    pub down_switch_buffer_secs: f64,
    /// Minimum buffer gap (seconds) required for up-switch.
    pub min_buffer_for_up_switch_secs: f64,
    /// Minimum interval between automatic switches.
    pub min_switch_interval: Duration,
    pub mode: AbrMode,
    /// Divides the estimate (1.5 keeps 66% of the measured throughput).
    pub throughput_safety_factor: f64,
    /// Bandwidth must exceed the target by this factor to up-switch.
    pub up_hysteresis_ratio: f64,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            down_hysteresis_ratio: 0.8,
            down_switch_buffer_secs: 5.0,
            min_buffer_for_up_switch_secs: 10.0,
            min_switch_interval: Duration::from_secs(10),
            mode: AbrMode::default(),
            throughput_safety_factor: 1.5,
            up_hysteresis_ratio: 1.3,
        }
    }
}

impl AbrOptions {
    pub fn with_mode(mut self, mode: AbrMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_min_switch_interval(mut self, interval: Duration) -> Self {
        self.min_switch_interval = interval;
        self
    }

    pub fn with_min_buffer_for_up_switch(mut self, secs: f64) -> Self {
        self.min_buffer_for_up_switch_secs = secs;
        self
    }

    pub fn with_down_switch_buffer(mut self, secs: f64) -> Self {
        self.down_switch_buffer_secs = secs;
        self
    }

    pub fn is_auto(&self) -> bool {
        matches!(self.mode, AbrMode::Auto(_))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThroughputSampleSource {
    Network,
    Cache,
}

#[derive(Clone, Copy, Debug)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
    pub at: Instant,
    pub source: ThroughputSampleSource,
}

/// Identifies one segment request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// A segment request that just started.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestInfo {
    pub id: RequestId,
    pub representation_id: String,
    pub segment_id: String,
    /// Media duration of the requested segment, seconds.
    pub duration: f64,
}

/// Measurements of a finished segment request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestMetrics {
    pub representation_id: String,
    pub bytes: u64,
    pub duration: Duration,
    pub segment_duration: Option<f64>,
    pub from_cache: bool,
}

/// The part of playback observations an estimator may see.
#[derive(Clone, Debug, PartialEq)]
pub struct AbrObservation {
    pub position: f64,
    pub buffer_gap: f64,
    pub playback_rate: f64,
    pub duration: f64,
    pub rebuffering: bool,
}

impl AbrObservation {
    pub fn from_playback(obs: &lyra_observer::PlaybackObservation) -> Self {
        Self {
            position: obs.position.get_wanted(),
            buffer_gap: obs.buffer_gap,
            playback_rate: obs.playback_rate,
            duration: obs.duration,
            rebuffering: obs.rebuffering.is_some(),
        }
    }
}
