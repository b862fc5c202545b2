#![forbid(unsafe_code)]

use std::sync::Arc;

use lyra_manifest::{BufferType, Period};

/// What a reload of the media source should do.
#[derive(Clone, Debug)]
pub struct ReloadRequest {
    pub period: Arc<Period>,
    pub buffer_type: BufferType,
    /// Position when the reload was requested.
    pub position: f64,
    /// Shift applied to `position` once reloaded.
    pub position_delta: f64,
}

/// Performs a full media-source reload.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = ReloadRequesterMock)
)]
pub trait ReloadRequester: Send + Sync {
    fn request_reload(&self, request: ReloadRequest);
}

/// Ignores reload requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReloadRequester;

impl ReloadRequester for NoopReloadRequester {
    fn request_reload(&self, _request: ReloadRequest) {}
}
