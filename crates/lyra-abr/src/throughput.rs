use std::{ops::Range, sync::Arc, time::Duration};

use lyra_core::{CancelToken, SharedReference, UpdateOptions};
use lyra_manifest::Representation;
use lyra_observer::ListenOptions;
use parking_lot::Mutex;
use tracing::{debug, trace};
use web_time::Instant;

use crate::{
    AbrCallbacks, AbrController, AbrOptions, Estimate, EstimatorContext, EstimatorOutput,
    RepresentationEstimator, RequestId, RequestInfo, RequestMetrics, ThroughputSample,
    ThroughputSampleSource,
};

/// Default [`RepresentationEstimator`]: an [`AbrController`] fed by request
/// metrics and the buffer gap.
///
/// A manual bitrate set through [`ThroughputAbr::manual_bitrate`] overrides
/// adaptation and produces `manual` estimates.
pub struct ThroughputAbr {
    options: AbrOptions,
    manual_bitrate: SharedReference<Option<u64>>,
}

impl ThroughputAbr {
    pub fn new(options: AbrOptions) -> Self {
        Self {
            options,
            manual_bitrate: SharedReference::new(None),
        }
    }

    /// Bitrate lock shared by every session of this estimator.
    pub fn manual_bitrate(&self) -> SharedReference<Option<u64>> {
        self.manual_bitrate.clone()
    }
}

impl Default for ThroughputAbr {
    fn default() -> Self {
        Self::new(AbrOptions::default())
    }
}

struct Session {
    controller: Mutex<AbrController>,
    representations: Vec<Arc<Representation>>,
    manual_bitrate: SharedReference<Option<u64>>,
    estimates: SharedReference<Option<Estimate>>,
    last_buffer_gap: Mutex<f64>,
}

impl Session {
    fn reevaluate(&self) {
        let buffer_gap = *self.last_buffer_gap.lock();
        let estimate = match self.manual_bitrate.get() {
            Some(bitrate) => self.manual_estimate(bitrate),
            None => self.automatic_estimate(buffer_gap),
        };
        if let Some(estimate) = estimate {
            self.estimates.set_if_changed(Some(estimate));
        }
    }

    fn manual_estimate(&self, bitrate: u64) -> Option<Estimate> {
        let mut sorted = self.representations.clone();
        sorted.sort_by_key(|r| r.bitrate);
        let target = sorted
            .iter()
            .rev()
            .find(|r| r.bitrate <= bitrate)
            .or_else(|| sorted.first())
            .cloned()?;
        let controller = self.controller.lock();
        Some(
            Estimate::new(target)
                .with_bitrate(controller.estimate_bps())
                .with_known_stable_bitrate(controller.stable_bps())
                .manual()
                .urgent(),
        )
    }

    fn automatic_estimate(&self, buffer_gap: f64) -> Option<Estimate> {
        let now = Instant::now();
        let mut controller = self.controller.lock();
        let decision = controller.decide(&self.representations, buffer_gap, now)?;
        controller.apply(&decision, now);
        trace!(target = %decision.target.id, reason = ?decision.reason, "throughput ABR: decision");
        let mut estimate = Estimate::new(decision.target)
            .with_bitrate(controller.estimate_bps())
            .with_known_stable_bitrate(controller.stable_bps());
        estimate.urgent = decision.urgent;
        Some(estimate)
    }
}

impl RepresentationEstimator for ThroughputAbr {
    fn estimate(&self, context: EstimatorContext, cancel: &CancelToken) -> EstimatorOutput {
        let session = Arc::new(Session {
            controller: Mutex::new(AbrController::new(self.options.clone())),
            representations: context.representations,
            manual_bitrate: self.manual_bitrate.clone(),
            estimates: SharedReference::new(None),
            last_buffer_gap: Mutex::new(context.observer.last_observation().buffer_gap),
        });
        debug!(
            track = %context.content.adaptation.id,
            candidates = session.representations.len(),
            "throughput ABR: session started"
        );

        session.reevaluate();

        let weak = Arc::downgrade(&session);
        context.observer.listen(
            move |obs| {
                if let Some(session) = weak.upgrade() {
                    *session.last_buffer_gap.lock() = obs.buffer_gap;
                    session.reevaluate();
                }
            },
            ListenOptions::default().with_clear_signal(cancel),
        );

        let weak = Arc::downgrade(&session);
        self.manual_bitrate.on_update(
            move |_| {
                if let Some(session) = weak.upgrade() {
                    session.reevaluate();
                }
            },
            UpdateOptions::default().with_clear_signal(cancel),
        );

        let estimates = session.estimates.clone();
        let sealed = estimates.clone();
        cancel.register(move |_| sealed.finish());

        EstimatorOutput {
            estimates,
            callbacks: Arc::new(ThroughputCallbacks { session }),
        }
    }
}

struct ThroughputCallbacks {
    session: Arc<Session>,
}

impl AbrCallbacks for ThroughputCallbacks {
    fn on_request_begin(&self, request: &RequestInfo) {
        trace!(id = request.id.0, segment = %request.segment_id, "throughput ABR: request begin");
    }

    fn on_request_progress(&self, _id: RequestId, _loaded_bytes: u64, _elapsed: Duration) {}

    fn on_request_end(&self, id: RequestId) {
        trace!(id = id.0, "throughput ABR: request end");
    }

    fn on_metrics(&self, metrics: &RequestMetrics) {
        let source = if metrics.from_cache {
            ThroughputSampleSource::Cache
        } else {
            ThroughputSampleSource::Network
        };
        self.session
            .controller
            .lock()
            .push_throughput_sample(ThroughputSample {
                bytes: metrics.bytes,
                duration: metrics.duration,
                at: Instant::now(),
                source,
            });
        self.session.reevaluate();
    }

    fn on_added_segment(&self, _representation_id: &str, _buffered: &[Range<f64>]) {}
}

#[cfg(test)]
mod tests {
    use lyra_core::CancelToken;
    use lyra_manifest::{BufferType, fixture};
    use lyra_observer::{
        ObserverOptions, PlaybackObserver, ReadyState, mock::FakeMediaElement,
    };

    use super::*;
    use crate::AbrObservation;

    fn context(cancel: &CancelToken) -> (EstimatorContext, Arc<FakeMediaElement>) {
        let element = Arc::new(FakeMediaElement::new());
        element.set_ready_state(ReadyState::HaveEnoughData);
        element.set_buffered(vec![0.0..20.0]);
        let observer = PlaybackObserver::new(
            Arc::clone(&element) as Arc<dyn lyra_observer::MediaElement>,
            ObserverOptions::default(),
            cancel,
        );
        let content = fixture::single_period_content(
            BufferType::Video,
            &[300_000, 1_000_000, 3_000_000],
            10,
            2.0,
        );
        let representations = content.adaptation.representations.clone();
        let ctx = EstimatorContext {
            content,
            representations,
            current_representation: SharedReference::new(None),
            observer: observer.derive_read_only(AbrObservation::from_playback),
        };
        (ctx, element)
    }

    #[tokio::test(start_paused = true)]
    async fn starts_on_lowest_then_upswitches_on_metrics() {
        let cancel = CancelToken::new();
        let (ctx, _element) = context(&cancel);
        let abr = ThroughputAbr::new(
            AbrOptions::default()
                .with_min_switch_interval(Duration::ZERO)
                .with_min_buffer_for_up_switch(0.0),
        );
        let output = abr.estimate(ctx, &cancel);
        let first = output.estimates.get().unwrap();
        assert_eq!(first.representation.bitrate, 300_000);
        assert!(!first.manual);

        output.callbacks.on_metrics(&RequestMetrics {
            representation_id: first.representation.id.clone(),
            bytes: 2_000_000,
            duration: Duration::from_secs(1),
            segment_duration: Some(2.0),
            from_cache: false,
        });
        let next = output.estimates.get().unwrap();
        assert_eq!(next.representation.bitrate, 3_000_000);
        assert_eq!(next.known_stable_bitrate, Some(16_000_000));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_bitrate_produces_manual_estimates() {
        let cancel = CancelToken::new();
        let (ctx, _element) = context(&cancel);
        let abr = ThroughputAbr::default();
        let output = abr.estimate(ctx, &cancel);

        abr.manual_bitrate().set(Some(1_500_000));
        let estimate = output.estimates.get().unwrap();
        assert_eq!(estimate.representation.bitrate, 1_000_000);
        assert!(estimate.manual);
        assert!(estimate.urgent);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_finishes_estimates() {
        let cancel = CancelToken::new();
        let (ctx, _element) = context(&cancel);
        let abr = ThroughputAbr::default();
        let output = abr.estimate(ctx, &cancel);
        cancel.cancel();
        assert!(output.estimates.is_finished());
        assert_eq!(abr.manual_bitrate().listener_count(), 0);
    }
}
