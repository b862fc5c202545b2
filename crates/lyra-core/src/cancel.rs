//! Cooperative cancellation token.
//!
//! [`CancelToken`] combines two views of the same "stop now" signal:
//!
//! - a callback registry, for synchronous cleanup that must have happened by
//!   the time [`CancelToken::cancel`] returns (event listeners, timers);
//! - a [`tokio_util::sync::CancellationToken`], so async code can race any
//!   suspension point against [`CancelToken::cancelled`].

use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::CancellationError;

type CancelCallback = Box<dyn FnOnce(&CancellationError) + Send>;

struct CancelState {
    reason: Option<CancellationError>,
    callbacks: Vec<(u64, CancelCallback)>,
    next_id: u64,
    /// Registration on the parent token, released when this token is cancelled.
    parent_link: Option<Deregister>,
}

struct CancelInner {
    state: Mutex<CancelState>,
    token: CancellationToken,
}

/// Cancellation token shared by every long-lived loop of the engine.
///
/// Cloning is cheap and yields a handle to the same token.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                state: Mutex::new(CancelState {
                    reason: None,
                    callbacks: Vec::new(),
                    next_id: 0,
                    parent_link: None,
                }),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Create a token that is cancelled whenever `self` is.
    ///
    /// Cancelling the child alone leaves the parent untouched and releases the
    /// child's registration on the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let weak_child = Arc::downgrade(&child.inner);
        let link = self.register(move |reason| {
            if let Some(inner) = weak_child.upgrade() {
                CancelToken { inner }.cancel_with(reason.clone());
            }
        });
        child.inner.state.lock().parent_link = Some(link);

        // Registration is a no-op on a cancelled parent.
        if let Some(reason) = self.reason() {
            child.cancel_with(reason);
        }
        child
    }

    /// Register `callback` to run once when the token is cancelled.
    ///
    /// Callbacks run synchronously inside [`cancel`](Self::cancel), in
    /// registration order. Registering on an already-cancelled token is a
    /// no-op: the callback is dropped without being called.
    pub fn register<F>(&self, callback: F) -> Deregister
    where
        F: FnOnce(&CancellationError) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.reason.is_some() {
            return Deregister::inert();
        }
        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.push((id, Box::new(callback)));
        Deregister {
            token: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Cancel with a default reason. See [`cancel_with`](Self::cancel_with).
    pub fn cancel(&self) {
        self.cancel_with(CancellationError::default());
    }

    /// Cancel the token.
    ///
    /// Idempotent: only the first call runs the registered callbacks, each
    /// exactly once, then the token stays cancelled forever.
    pub fn cancel_with(&self, reason: CancellationError) {
        let (callbacks, parent_link) = {
            let mut state = self.inner.state.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            (
                std::mem::take(&mut state.callbacks),
                state.parent_link.take(),
            )
        };

        trace!(
            reason = reason.reason(),
            callbacks = callbacks.len(),
            "cancel token: cancelling"
        );

        if let Some(link) = parent_link {
            link.deregister();
        }
        for (_, callback) in callbacks {
            callback(&reason);
        }
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().reason.is_some()
    }

    /// Reason of the cancellation, `None` while the token is live.
    pub fn reason(&self) -> Option<CancellationError> {
        self.inner.state.lock().reason.clone()
    }

    /// `Err` once cancelled, for early returns with `?`.
    pub fn check(&self) -> Result<(), CancellationError> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Number of callbacks still waiting for cancellation.
    pub fn registered_callbacks(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }

    /// Guard cancelling the token when dropped.
    #[must_use]
    pub fn drop_guard(self) -> CancelGuard {
        CancelGuard { token: self }
    }
}

/// Cancels its token on drop. See [`CancelToken::drop_guard`].
#[derive(Debug)]
pub struct CancelGuard {
    token: CancelToken,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CancelToken")
            .field("reason", &state.reason)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// Handle removing a callback registered with [`CancelToken::register`].
///
/// Dropping the handle keeps the callback registered.
pub struct Deregister {
    token: Weak<CancelInner>,
    id: u64,
}

impl Deregister {
    fn inert() -> Self {
        Self {
            token: Weak::new(),
            id: u64::MAX,
        }
    }

    /// Remove the callback. No-op if it already ran or the token is gone.
    pub fn deregister(self) {
        let Some(inner) = self.token.upgrade() else {
            return;
        };
        let removed = {
            let mut state = inner.state.lock();
            state
                .callbacks
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|pos| state.callbacks.remove(pos))
        };
        // Dropped outside the lock: a callback may own other tokens.
        drop(removed);
    }
}

impl fmt::Debug for Deregister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deregister").field("id", &self.id).finish()
    }
}
