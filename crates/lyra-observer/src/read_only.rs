use std::sync::Arc;

use lyra_core::{CancelToken, ListenerHandle, SharedReference};

use crate::{ListenOptions, MediaElement, ReadyState};

/// Observer restricted to a derived view of the observations.
///
/// Reads live platform values but cannot seek or change the playback rate.
pub struct ReadOnlyPlaybackObserver<T> {
    reference: SharedReference<T>,
    element: Arc<dyn MediaElement>,
    cancel: CancelToken,
}

impl<T> Clone for ReadOnlyPlaybackObserver<T> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            element: Arc::clone(&self.element),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> ReadOnlyPlaybackObserver<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        reference: SharedReference<T>,
        element: Arc<dyn MediaElement>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            reference,
            element,
            cancel,
        }
    }

    pub fn get_current_time(&self) -> f64 {
        self.element.current_time()
    }

    pub fn get_playback_rate(&self) -> f64 {
        self.element.playback_rate()
    }

    pub fn get_is_paused(&self) -> bool {
        self.element.paused()
    }

    pub fn get_ready_state(&self) -> ReadyState {
        self.element.ready_state()
    }

    pub fn get_reference(&self) -> SharedReference<T> {
        self.reference.clone()
    }

    pub fn last_observation(&self) -> T {
        self.reference.get()
    }

    pub fn listen<F>(&self, callback: F, options: ListenOptions<'_>) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.reference.on_update(callback, options.as_update_options())
    }

    /// Further restrict the view.
    pub fn derive_read_only<U, F>(&self, transform: F) -> ReadOnlyPlaybackObserver<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        ReadOnlyPlaybackObserver {
            reference: self.reference.map(transform, &self.cancel),
            element: Arc::clone(&self.element),
            cancel: self.cancel.clone(),
        }
    }

    /// Token cancelled when the source observer stops.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl<T> std::fmt::Debug for ReadOnlyPlaybackObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyPlaybackObserver")
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
