use std::sync::{Arc, Weak};

use lyra_core::{CancelToken, ListenerHandle, SharedReference, UpdateOptions};
use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::{
    MediaElement, MediaEventKind, ObserverOptions, ReadOnlyPlaybackObserver, ReadyState,
    observation::{
        MediaSnapshot, ObservationEvent, ObservationPosition, PlaybackObservation,
        RebufferingThresholds, SeekingState, buffer_info, freezing_status, rebuffering_status,
    },
};

/// Options for [`PlaybackObserver::listen`].
#[derive(Clone, Copy, Default)]
pub struct ListenOptions<'a> {
    /// Deliver the last observation synchronously on registration.
    pub include_last_observation: bool,
    /// Stop listening once this token is cancelled.
    pub clear_signal: Option<&'a CancelToken>,
}

impl<'a> ListenOptions<'a> {
    pub fn with_last_observation(mut self) -> Self {
        self.include_last_observation = true;
        self
    }

    pub fn with_clear_signal(mut self, signal: &'a CancelToken) -> Self {
        self.clear_signal = Some(signal);
        self
    }

    pub(crate) fn as_update_options(self) -> UpdateOptions<'a> {
        UpdateOptions {
            emit_current_value: self.include_last_observation,
            clear_signal: self.clear_signal,
        }
    }
}

struct ObserverState {
    /// Seeks requested through the observer and not yet seen as `seeking`.
    internal_seeks_incoming: usize,
    seeking: SeekingState,
    /// Furthest internal seek target, kept while the platform lags behind it.
    expected_seek_position: Option<f64>,
    last_emit: Instant,
}

pub(crate) struct ObserverInner {
    element: Arc<dyn MediaElement>,
    options: ObserverOptions,
    imprecise_seek: bool,
    thresholds: RebufferingThresholds,
    observation: SharedReference<PlaybackObservation>,
    state: Mutex<ObserverState>,
    cancel: CancelToken,
}

/// Samples a media element and republishes its state as observations.
///
/// Emits on construction (`Init`), on each platform event, and on a timer
/// when no event fired for one sampling interval. Stopping (or cancelling
/// the parent token) removes the platform listener and the timer
/// synchronously and seals the observation reference.
#[derive(Clone)]
pub struct PlaybackObserver {
    inner: Arc<ObserverInner>,
}

impl PlaybackObserver {
    /// Start observing `element`. Must be called inside a tokio runtime.
    pub fn new(
        element: Arc<dyn MediaElement>,
        options: ObserverOptions,
        parent: &CancelToken,
    ) -> Self {
        let cancel = parent.child();
        let now = Instant::now();
        let snapshot = MediaSnapshot::read(element.as_ref());
        let thresholds = RebufferingThresholds::new(options.low_latency_mode);
        let imprecise_seek = options.has_imprecise_seek();
        let initial = build_observation(
            ObservationEvent::Init,
            &snapshot,
            None,
            SeekingState::None,
            None,
            options.with_media_source,
            thresholds,
            now,
        );

        let inner = Arc::new(ObserverInner {
            element,
            options,
            imprecise_seek,
            thresholds,
            observation: SharedReference::new(initial),
            state: Mutex::new(ObserverState {
                internal_seeks_incoming: 0,
                seeking: SeekingState::None,
                expected_seek_position: None,
                last_emit: now,
            }),
            cancel,
        });

        if inner.cancel.is_cancelled() {
            inner.observation.finish();
            return Self { inner };
        }

        let weak = Arc::downgrade(&inner);
        let listener_id = inner.element.add_event_listener(Arc::new(move |kind| {
            if let Some(inner) = weak.upgrade() {
                inner.on_platform_event(kind);
            }
        }));

        let timer = tokio::spawn(run_timer(Arc::downgrade(&inner)));

        let element = Arc::clone(&inner.element);
        let observation = inner.observation.clone();
        inner.cancel.register(move |_| {
            element.remove_event_listener(listener_id);
            timer.abort();
            observation.finish();
            debug!(listener = ?listener_id, "playback observer: stopped");
        });

        debug!(
            interval = ?inner.options.effective_sampling_interval(),
            imprecise_seek,
            "playback observer: started"
        );
        Self { inner }
    }

    pub fn get_current_time(&self) -> f64 {
        self.inner.element.current_time()
    }

    pub fn get_playback_rate(&self) -> f64 {
        self.inner.element.playback_rate()
    }

    pub fn get_is_paused(&self) -> bool {
        self.inner.element.paused()
    }

    pub fn get_ready_state(&self) -> ReadyState {
        self.inner.element.ready_state()
    }

    /// Seek the media element.
    ///
    /// With the imprecise-seek workaround enabled, a seek to a position the
    /// platform already reached on its own is not re-issued.
    pub fn set_current_time(&self, time: f64) {
        {
            let mut state = self.inner.state.lock();
            if self.inner.imprecise_seek {
                let current = self.inner.element.current_time();
                if let Some(expected) = state.expected_seek_position
                    && time <= expected
                    && current >= time
                {
                    debug!(time, current, expected, "playback observer: corrective seek suppressed");
                    return;
                }
                state.expected_seek_position =
                    Some(state.expected_seek_position.map_or(time, |e| e.max(time)));
            }
            state.internal_seeks_incoming += 1;
        }
        trace!(time, "playback observer: internal seek");
        self.inner.element.set_current_time(time);
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.inner.element.set_playback_rate(rate);
    }

    /// The latest observation, as a shared reference.
    pub fn get_reference(&self) -> SharedReference<PlaybackObservation> {
        self.inner.observation.clone()
    }

    pub fn last_observation(&self) -> PlaybackObservation {
        self.inner.observation.get()
    }

    /// Call `callback` for every future observation.
    pub fn listen<F>(&self, callback: F, options: ListenOptions<'_>) -> ListenerHandle
    where
        F: Fn(&PlaybackObservation) + Send + Sync + 'static,
    {
        self.inner
            .observation
            .on_update(callback, options.as_update_options())
    }

    /// Observer over `transform(observation)` without seek capability.
    ///
    /// Shares this observer's lifecycle.
    pub fn derive_read_only<U, F>(&self, transform: F) -> ReadOnlyPlaybackObserver<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&PlaybackObservation) -> U + Send + Sync + 'static,
    {
        let reference = self.inner.observation.map(transform, &self.inner.cancel);
        ReadOnlyPlaybackObserver::new(
            reference,
            Arc::clone(&self.inner.element),
            self.inner.cancel.clone(),
        )
    }

    /// Read-only view over the full observation.
    pub fn as_read_only(&self) -> ReadOnlyPlaybackObserver<PlaybackObservation> {
        ReadOnlyPlaybackObserver::new(
            self.inner.observation.clone(),
            Arc::clone(&self.inner.element),
            self.inner.cancel.clone(),
        )
    }

    /// Remove the platform listener and the timer, and seal the reference.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }
}

impl ObserverInner {
    fn on_platform_event(&self, kind: MediaEventKind) {
        if self.cancel.is_cancelled() {
            return;
        }
        let event = {
            let mut state = self.state.lock();
            match kind {
                MediaEventKind::Seeking => {
                    if state.internal_seeks_incoming > 0 {
                        state.internal_seeks_incoming -= 1;
                        state.seeking = SeekingState::Internal;
                        ObservationEvent::InternalSeeking
                    } else {
                        state.seeking = SeekingState::External;
                        ObservationEvent::Seeking
                    }
                }
                MediaEventKind::Seeked => {
                    state.seeking = SeekingState::None;
                    ObservationEvent::Seeked
                }
                other => ObservationEvent::from(other),
            }
        };
        trace!(?event, "playback observer: platform event");
        self.emit(event);
    }

    fn emit(&self, event: ObservationEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let snapshot = MediaSnapshot::read(self.element.as_ref());
        let previous = self.observation.get();

        let (seeking, wanted) = {
            let mut state = self.state.lock();
            state.last_emit = now;
            let seek_event = matches!(
                event,
                ObservationEvent::Seeking | ObservationEvent::InternalSeeking
            );
            if !snapshot.seeking && !seek_event && state.seeking.is_seeking() {
                // The platform finished seeking without a `seeked` event.
                state.seeking = SeekingState::None;
            }
            if let Some(expected) = state.expected_seek_position
                && !snapshot.seeking
                && snapshot.position >= expected
            {
                state.expected_seek_position = None;
            }
            (state.seeking, state.expected_seek_position)
        };

        let observation = build_observation(
            event,
            &snapshot,
            Some(&previous),
            seeking,
            wanted,
            self.options.with_media_source,
            self.thresholds,
            now,
        );
        if let Some(status) = &observation.rebuffering
            && previous.rebuffering.is_none()
        {
            debug!(reason = ?status.reason, position = snapshot.position, "playback observer: rebuffering");
        }
        if observation.freezing.is_some() && previous.freezing.is_none() {
            debug!(position = snapshot.position, "playback observer: freezing");
        }
        self.observation.set(observation);
    }
}

#[expect(clippy::too_many_arguments)]
fn build_observation(
    event: ObservationEvent,
    snapshot: &MediaSnapshot,
    previous: Option<&PlaybackObservation>,
    seeking: SeekingState,
    wanted: Option<f64>,
    with_media_source: bool,
    thresholds: RebufferingThresholds,
    now: Instant,
) -> PlaybackObservation {
    let (buffer_gap, current_range) = buffer_info(&snapshot.buffered, snapshot.position);
    let rebuffering = rebuffering_status(
        previous.and_then(|p| p.rebuffering.as_ref()),
        snapshot,
        seeking,
        buffer_gap,
        with_media_source,
        thresholds,
        now,
    );
    let freezing = freezing_status(
        previous,
        snapshot,
        event,
        buffer_gap,
        rebuffering.as_ref(),
        now,
    );
    PlaybackObservation {
        event,
        position: ObservationPosition {
            last: snapshot.position,
            wanted,
        },
        buffered: snapshot.buffered.clone(),
        buffer_gap,
        current_range,
        duration: snapshot.duration,
        paused: snapshot.paused,
        seeking,
        ready_state: snapshot.ready_state,
        playback_rate: snapshot.playback_rate,
        ended: snapshot.ended,
        rebuffering,
        freezing,
    }
}

async fn run_timer(inner: Weak<ObserverInner>) {
    loop {
        let (deadline, cancel) = {
            let Some(inner) = inner.upgrade() else { return };
            let interval = inner.options.effective_sampling_interval();
            let last_emit = inner.state.lock().last_emit;
            (last_emit + interval, inner.cancel.clone())
        };
        tokio::select! {
            () = cancel.cancelled() => return,
            () = sleep_until(deadline) => {}
        }
        let Some(inner) = inner.upgrade() else { return };
        let interval = inner.options.effective_sampling_interval();
        let due = inner.state.lock().last_emit + interval <= Instant::now();
        if due {
            inner.emit(ObservationEvent::Timeupdate);
        }
    }
}

impl std::fmt::Debug for PlaybackObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackObserver")
            .field("options", &self.inner.options)
            .field("stopped", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
