#![forbid(unsafe_code)]

use lyra_core::SharedReference;

/// Default seconds of media to keep buffered ahead of the position.
pub const DEFAULT_BUFFER_GOAL: f64 = 30.0;

/// Default seconds of media kept behind the position when the buffer is full.
pub const DEFAULT_GC_MARGIN: f64 = 10.0;

/// Lowest buffer-goal ratio a Representation can be reduced to.
pub const MIN_BUFFER_GOAL_RATIO: f64 = 0.25;

/// Step by which the buffer-goal ratio is lowered after a buffer-full error.
pub const BUFFER_GOAL_RATIO_STEP: f64 = 0.25;

/// Effective buffer goal (seconds) under which the ratio is not lowered further.
pub const MIN_EFFECTIVE_BUFFER_GOAL: f64 = 2.0;

/// How a manual quality change is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManualSwitchingMode {
    /// Keep playing buffered data and switch seamlessly.
    #[default]
    Seamless,
    /// Reload the media source so the new quality shows up at once.
    Direct,
}

/// Configuration shared by every stream of a playback session.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Seconds of media wanted ahead of the position. Observable: streams
    /// replan when it changes.
    pub buffer_goal: SharedReference<f64>,
    /// Memory budget of one sink, in kilobytes. `None` means unlimited.
    pub max_buffer_size: Option<f64>,
    /// Replace buffered low-quality data when a better quality is loaded.
    pub enable_fast_switching: bool,
    pub manual_switching_mode: ManualSwitchingMode,
    /// Position shift (seconds) applied by a reload after a direct switch.
    pub reload_position_delta: f64,
    /// Seconds of media kept behind the position when garbage collecting.
    pub gc_margin: f64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_goal: SharedReference::new(DEFAULT_BUFFER_GOAL),
            max_buffer_size: None,
            enable_fast_switching: true,
            manual_switching_mode: ManualSwitchingMode::default(),
            reload_position_delta: 0.0,
            gc_margin: DEFAULT_GC_MARGIN,
        }
    }
}

impl StreamOptions {
    pub fn with_buffer_goal(self, secs: f64) -> Self {
        self.buffer_goal.set(secs);
        self
    }

    pub fn with_max_buffer_size(mut self, kilobytes: f64) -> Self {
        self.max_buffer_size = Some(kilobytes);
        self
    }

    pub fn with_fast_switching(mut self, enabled: bool) -> Self {
        self.enable_fast_switching = enabled;
        self
    }

    pub fn with_manual_switching_mode(mut self, mode: ManualSwitchingMode) -> Self {
        self.manual_switching_mode = mode;
        self
    }

    pub fn with_reload_position_delta(mut self, delta: f64) -> Self {
        self.reload_position_delta = delta;
        self
    }

    pub fn with_gc_margin(mut self, secs: f64) -> Self {
        self.gc_margin = secs;
        self
    }
}
