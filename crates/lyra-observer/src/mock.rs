//! Scriptable media element for tests.

use std::{
    ops::Range,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::{MediaElement, MediaEventKind, MediaEventListener, MediaListenerId, ReadyState};

#[derive(Debug, Clone)]
struct FakeState {
    position: f64,
    rate: f64,
    paused: bool,
    seeking: bool,
    ended: bool,
    ready_state: ReadyState,
    duration: f64,
    buffered: Vec<Range<f64>>,
    /// Position a seek actually lands on, for imprecise-seek scenarios.
    seek_snap: Option<f64>,
}

/// In-memory [`MediaElement`]. Events are only fired through [`fire`](Self::fire).
pub struct FakeMediaElement {
    state: Mutex<FakeState>,
    listeners: Mutex<Vec<(MediaListenerId, MediaEventListener)>>,
    next_id: AtomicU64,
    seeks: Mutex<Vec<f64>>,
}

impl Default for FakeMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaElement {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                position: 0.0,
                rate: 1.0,
                paused: true,
                seeking: false,
                ended: false,
                ready_state: ReadyState::HaveNothing,
                duration: f64::NAN,
                buffered: Vec::new(),
                seek_snap: None,
            }),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            seeks: Mutex::new(Vec::new()),
        }
    }

    /// Fire `kind` to every registered listener, updating the state the way
    /// a platform would.
    pub fn fire(&self, kind: MediaEventKind) {
        {
            let mut state = self.state.lock();
            match kind {
                MediaEventKind::Play => state.paused = false,
                MediaEventKind::Pause => state.paused = true,
                MediaEventKind::Seeking => state.seeking = true,
                MediaEventKind::Seeked => state.seeking = false,
                MediaEventKind::Ended => state.ended = true,
                _ => {}
            }
        }
        let listeners: Vec<_> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(kind);
        }
    }

    pub fn set_position(&self, position: f64) {
        self.state.lock().position = position;
    }

    pub fn set_buffered(&self, buffered: Vec<Range<f64>>) {
        self.state.lock().buffered = buffered;
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.state.lock().ready_state = ready_state;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    /// Make the next seeks land on `position` whatever was requested.
    pub fn snap_seeks_to(&self, position: Option<f64>) {
        self.state.lock().seek_snap = position;
    }

    /// Positions requested through `set_current_time`.
    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl MediaElement for FakeMediaElement {
    fn current_time(&self) -> f64 {
        self.state.lock().position
    }

    fn set_current_time(&self, time: f64) {
        self.seeks.lock().push(time);
        let mut state = self.state.lock();
        state.position = state.seek_snap.unwrap_or(time);
        state.seeking = true;
        state.ended = false;
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn seeking(&self) -> bool {
        self.state.lock().seeking
    }

    fn ended(&self) -> bool {
        self.state.lock().ended
    }

    fn ready_state(&self) -> ReadyState {
        self.state.lock().ready_state
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.state.lock().buffered.clone()
    }

    fn add_event_listener(&self, listener: MediaEventListener) -> MediaListenerId {
        let id = MediaListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_event_listener(&self, id: MediaListenerId) {
        self.listeners.lock().retain(|(l, _)| *l != id);
    }
}
