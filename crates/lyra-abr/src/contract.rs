//! What the engine hands an ABR estimator, and what it gets back.

use std::{ops::Range, sync::Arc, time::Duration};

use lyra_core::{CancelToken, SharedReference};
use lyra_manifest::{AdaptationContent, Representation};
use lyra_observer::ReadOnlyPlaybackObserver;

use crate::{AbrObservation, Estimate, RequestId, RequestInfo, RequestMetrics};

/// Request lifecycle feedback sent to the estimator.
#[cfg_attr(
    any(test, feature = "test-utils"),
    unimock::unimock(api = AbrCallbacksMock)
)]
pub trait AbrCallbacks: Send + Sync {
    fn on_request_begin(&self, request: &RequestInfo);

    fn on_request_progress(&self, id: RequestId, loaded_bytes: u64, elapsed: Duration);

    fn on_request_end(&self, id: RequestId);

    fn on_metrics(&self, metrics: &RequestMetrics);

    /// A segment was pushed; `buffered` is the sink's inventory after it.
    fn on_added_segment(&self, representation_id: &str, buffered: &[Range<f64>]);
}

/// Callbacks that ignore everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAbrCallbacks;

impl AbrCallbacks for NoopAbrCallbacks {
    fn on_request_begin(&self, _request: &RequestInfo) {}

    fn on_request_progress(&self, _id: RequestId, _loaded_bytes: u64, _elapsed: Duration) {}

    fn on_request_end(&self, _id: RequestId) {}

    fn on_metrics(&self, _metrics: &RequestMetrics) {}

    fn on_added_segment(&self, _representation_id: &str, _buffered: &[Range<f64>]) {}
}

/// Inputs of one estimation session (one track, one period).
#[derive(Clone, Debug)]
pub struct EstimatorContext {
    pub content: AdaptationContent,
    /// Candidates, already filtered on support and decipherability.
    pub representations: Vec<Arc<Representation>>,
    /// Representation currently loaded by the engine.
    pub current_representation: SharedReference<Option<Arc<Representation>>>,
    pub observer: ReadOnlyPlaybackObserver<AbrObservation>,
}

/// Output of one estimation session.
///
/// Finishing `estimates` ends the session: the engine treats it as an
/// estimator failure and stops the track urgently.
#[derive(Clone)]
pub struct EstimatorOutput {
    pub estimates: SharedReference<Option<Estimate>>,
    pub callbacks: Arc<dyn AbrCallbacks>,
}

impl std::fmt::Debug for EstimatorOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimatorOutput")
            .field("estimates", &self.estimates)
            .finish_non_exhaustive()
    }
}

/// Produces Representation estimates for one track.
pub trait RepresentationEstimator: Send + Sync {
    /// Start estimating. Everything the session registered is released when
    /// `cancel` is cancelled.
    fn estimate(&self, context: EstimatorContext, cancel: &CancelToken) -> EstimatorOutput;
}
