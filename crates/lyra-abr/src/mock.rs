//! Scripted estimator for tests.

use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use lyra_core::{CancelToken, SharedReference};
use parking_lot::Mutex;

use crate::{
    AbrCallbacks, Estimate, EstimatorContext, EstimatorOutput, RepresentationEstimator,
    RequestId, RequestInfo, RequestMetrics,
};

/// Callback received by [`RecordingCallbacks`].
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackEvent {
    RequestBegin(RequestInfo),
    RequestProgress(RequestId, u64),
    RequestEnd(RequestId),
    Metrics(RequestMetrics),
    AddedSegment(String),
}

/// [`AbrCallbacks`] recording every call.
#[derive(Debug, Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    pub fn added_segments(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, CallbackEvent::AddedSegment(_)))
            .count()
    }
}

impl AbrCallbacks for RecordingCallbacks {
    fn on_request_begin(&self, request: &RequestInfo) {
        self.events
            .lock()
            .push(CallbackEvent::RequestBegin(request.clone()));
    }

    fn on_request_progress(&self, id: RequestId, loaded_bytes: u64, _elapsed: Duration) {
        self.events
            .lock()
            .push(CallbackEvent::RequestProgress(id, loaded_bytes));
    }

    fn on_request_end(&self, id: RequestId) {
        self.events.lock().push(CallbackEvent::RequestEnd(id));
    }

    fn on_metrics(&self, metrics: &RequestMetrics) {
        self.events
            .lock()
            .push(CallbackEvent::Metrics(metrics.clone()));
    }

    fn on_added_segment(&self, representation_id: &str, _buffered: &[Range<f64>]) {
        self.events
            .lock()
            .push(CallbackEvent::AddedSegment(representation_id.to_string()));
    }
}

/// Estimator whose estimates are pushed by the test.
pub struct ScriptedEstimator {
    estimates: SharedReference<Option<Estimate>>,
    callbacks: Arc<RecordingCallbacks>,
    sessions: AtomicUsize,
    contexts: Mutex<Vec<EstimatorContext>>,
}

impl Default for ScriptedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEstimator {
    pub fn new() -> Self {
        Self {
            estimates: SharedReference::new(None),
            callbacks: Arc::new(RecordingCallbacks::default()),
            sessions: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Start with `estimate` already available.
    pub fn with_initial(estimate: Estimate) -> Self {
        let this = Self::new();
        this.estimates.set(Some(estimate));
        this
    }

    pub fn push(&self, estimate: Estimate) {
        self.estimates.set(Some(estimate));
    }

    /// End the estimate stream, as an estimator failure would.
    pub fn end(&self) {
        self.estimates.finish();
    }

    pub fn estimates(&self) -> SharedReference<Option<Estimate>> {
        self.estimates.clone()
    }

    pub fn callbacks(&self) -> Arc<RecordingCallbacks> {
        Arc::clone(&self.callbacks)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }

    /// Contexts received by [`RepresentationEstimator::estimate`].
    pub fn contexts(&self) -> Vec<EstimatorContext> {
        self.contexts.lock().clone()
    }
}

impl RepresentationEstimator for ScriptedEstimator {
    fn estimate(&self, context: EstimatorContext, _cancel: &CancelToken) -> EstimatorOutput {
        self.sessions.fetch_add(1, Ordering::AcqRel);
        self.contexts.lock().push(context);
        EstimatorOutput {
            estimates: self.estimates.clone(),
            callbacks: Arc::clone(&self.callbacks) as Arc<dyn AbrCallbacks>,
        }
    }
}
