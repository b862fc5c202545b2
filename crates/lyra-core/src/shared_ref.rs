//! Observable mutable cell.
//!
//! [`SharedReference`] is the second (and last) piece of coordination
//! vocabulary next to [`CancelToken`]: a value that can be read at any time,
//! replaced, and listened to. Listeners are plain callbacks, optionally tied
//! to a [`CancelToken`] that removes them when cancelled.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

use crate::{CancelToken, CancellationError, cancel::Deregister};

type UpdateCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type FinishCallback = Box<dyn FnOnce() + Send>;

/// Options for [`SharedReference::on_update`].
#[derive(Clone, Copy, Default)]
pub struct UpdateOptions<'a> {
    /// Call the listener synchronously with the current value on registration.
    pub emit_current_value: bool,
    /// Remove the listener once this token is cancelled.
    pub clear_signal: Option<&'a CancelToken>,
}

impl<'a> UpdateOptions<'a> {
    pub fn with_current_value(mut self) -> Self {
        self.emit_current_value = true;
        self
    }

    pub fn with_clear_signal(mut self, signal: &'a CancelToken) -> Self {
        self.clear_signal = Some(signal);
        self
    }
}

struct Listener<T> {
    id: u64,
    callback: UpdateCallback<T>,
    active: Arc<AtomicBool>,
    clear: Option<Deregister>,
}

struct RefState<T> {
    value: T,
    /// Bumped on every accepted `set`, to stop delivering a stale value.
    version: u64,
    listeners: Vec<Listener<T>>,
    finish_callbacks: Vec<(u64, FinishCallback)>,
    finished: bool,
    next_id: u64,
}

/// Observable value shared between components.
///
/// Cloning yields a handle to the same cell.
pub struct SharedReference<T> {
    inner: Arc<Mutex<RefState<T>>>,
}

impl<T> Clone for SharedReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReference<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RefState {
                value,
                version: 0,
                listeners: Vec::new(),
                finish_callbacks: Vec::new(),
                finished: false,
                next_id: 0,
            })),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Borrow the current value without cloning it.
    ///
    /// The cell is locked while `f` runs: `f` must not touch this reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock().value)
    }

    /// Replace the value and notify every listener, even if it did not change.
    ///
    /// Dropped with a warning once the reference is finished.
    pub fn set(&self, value: T) {
        self.store(value, |_, _| true);
    }

    /// Replace the value only if it differs from the current one.
    pub fn set_if_changed(&self, value: T)
    where
        T: PartialEq,
    {
        self.store(value, |old, new| old != new);
    }

    fn store(&self, value: T, accept: impl FnOnce(&T, &T) -> bool) {
        let (version, snapshot) = {
            let mut state = self.inner.lock();
            if state.finished {
                warn!("shared reference: set after finish, value dropped");
                return;
            }
            if !accept(&state.value, &value) {
                return;
            }
            state.value = value.clone();
            state.version += 1;
            let snapshot: Vec<_> = state
                .listeners
                .iter()
                .map(|l| (Arc::clone(&l.callback), Arc::clone(&l.active)))
                .collect();
            (state.version, snapshot)
        };

        for (callback, active) in snapshot {
            // A listener set a newer value: it has been delivered to everyone.
            if self.inner.lock().version != version {
                break;
            }
            if active.load(Ordering::Acquire) {
                callback(&value);
            }
        }
    }

    /// Register a listener called on every future [`set`](Self::set).
    ///
    /// Registering on a finished reference, or with an already cancelled
    /// clear signal, is a no-op.
    pub fn on_update<F>(&self, callback: F, options: UpdateOptions<'_>) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if options.clear_signal.is_some_and(CancelToken::is_cancelled) {
            return ListenerHandle::inert();
        }

        let callback: UpdateCallback<T> = Arc::new(callback);
        let active = Arc::new(AtomicBool::new(true));
        let (id, current) = {
            let mut state = self.inner.lock();
            if state.finished {
                return ListenerHandle::inert();
            }
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.push(Listener {
                id,
                callback: Arc::clone(&callback),
                active: Arc::clone(&active),
                clear: None,
            });
            let current = options.emit_current_value.then(|| state.value.clone());
            (id, current)
        };

        let weak = Arc::downgrade(&self.inner);
        let handle = ListenerHandle::new(move || remove_listener(&weak, id));

        if let Some(signal) = options.clear_signal {
            let remover = handle.clone();
            let deregister = signal.register(move |_| remover.remove());
            let mut state = self.inner.lock();
            match state.listeners.iter_mut().find(|l| l.id == id) {
                Some(listener) => listener.clear = Some(deregister),
                None => {
                    drop(state);
                    deregister.deregister();
                }
            }
            if signal.is_cancelled() {
                handle.remove();
                return handle;
            }
        }

        if let Some(value) = current
            && active.load(Ordering::Acquire)
        {
            callback(&value);
        }
        handle
    }

    /// Register a callback run once when the reference is finished.
    ///
    /// Runs immediately if the reference is already finished.
    pub fn on_finish<F>(&self, callback: F) -> ListenerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.lock();
        if state.finished {
            drop(state);
            callback();
            return ListenerHandle::inert();
        }
        let id = state.next_id;
        state.next_id += 1;
        state.finish_callbacks.push((id, Box::new(callback)));
        drop(state);

        let weak = Arc::downgrade(&self.inner);
        ListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = {
                    let mut state = inner.lock();
                    state
                        .finish_callbacks
                        .iter()
                        .position(|(cb_id, _)| *cb_id == id)
                        .map(|pos| state.finish_callbacks.remove(pos))
                };
                drop(removed);
            }
        })
    }

    /// Seal the reference: later `set` calls are dropped and every listener
    /// is removed.
    pub fn finish(&self) {
        let (listeners, finish_callbacks) = {
            let mut state = self.inner.lock();
            if state.finished {
                return;
            }
            state.finished = true;
            (
                std::mem::take(&mut state.listeners),
                std::mem::take(&mut state.finish_callbacks),
            )
        };

        for listener in listeners {
            listener.active.store(false, Ordering::Release);
            if let Some(clear) = listener.clear {
                clear.deregister();
            }
        }
        for (_, callback) in finish_callbacks {
            callback();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    /// Wait for the first value (current one included) matching `predicate`.
    ///
    /// If the reference is finished before a match, this only returns once
    /// `cancel` is cancelled.
    pub async fn wait_until<P>(&self, predicate: P, cancel: &CancelToken) -> Result<T, CancellationError>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        cancel.check()?;

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let handle = self.on_update(
            move |value| {
                if predicate(value)
                    && let Some(tx) = tx.lock().take()
                {
                    let _ = tx.send(value.clone());
                }
            },
            UpdateOptions::default()
                .with_current_value()
                .with_clear_signal(cancel),
        );

        let result = tokio::select! {
            value = rx => match value {
                Ok(value) => Ok(value),
                Err(_) => {
                    cancel.cancelled().await;
                    Err(cancel.reason().unwrap_or_default())
                }
            },
            () = cancel.cancelled() => Err(cancel.reason().unwrap_or_default()),
        };
        handle.remove();
        result
    }

    /// Derive a reference tracking `f(value)`, kept in sync until `cancel`.
    pub fn map<U, F>(&self, f: F, cancel: &CancelToken) -> SharedReference<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let mapped = SharedReference::new(self.with(&f));
        let target = mapped.clone();
        self.on_update(
            move |value| target.set(f(value)),
            UpdateOptions::default().with_clear_signal(cancel),
        );

        let sealed = mapped.clone();
        let finish_handle = self.on_finish(move || sealed.finish());
        let sealed = mapped.clone();
        cancel.register(move |_| {
            finish_handle.remove();
            sealed.finish();
        });
        mapped
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SharedReference")
            .field("value", &state.value)
            .field("listeners", &state.listeners.len())
            .field("finished", &state.finished)
            .finish()
    }
}

fn remove_listener<T>(inner: &Weak<Mutex<RefState<T>>>, id: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let removed = {
        let mut state = inner.lock();
        state
            .listeners
            .iter()
            .position(|l| l.id == id)
            .map(|pos| state.listeners.remove(pos))
    };
    if let Some(listener) = removed {
        listener.active.store(false, Ordering::Release);
        if let Some(clear) = listener.clear {
            clear.deregister();
        }
    }
}

/// Handle removing a listener registered on a [`SharedReference`].
///
/// Dropping the handle keeps the listener registered.
#[derive(Clone)]
pub struct ListenerHandle {
    remove: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ListenerHandle {
    fn new(remove: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Arc::new(remove)),
        }
    }

    fn inert() -> Self {
        Self { remove: None }
    }

    pub fn remove(&self) {
        if let Some(remove) = &self.remove {
            remove();
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("inert", &self.remove.is_none())
            .finish()
    }
}
