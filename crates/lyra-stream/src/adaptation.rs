//! Quality-selection loop of one track.
//!
//! An [`AdaptationStream`] turns ABR estimates into at most one running
//! [`RepresentationStream`] at a time: it starts one for the estimated
//! Representation, watches the estimates for a switch, orders the running
//! stream to terminate and starts the next one once it has. Buffer-full
//! failures lower the Representation's buffer-goal ratio and restart it.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::join_all;
use lyra_abr::{Estimate, EstimatorContext, EstimatorOutput, RepresentationEstimator};
use lyra_buffer::{BufferSinkStore, SegmentSink};
use lyra_core::{CancelToken, ListenerHandle, SharedReference, UpdateOptions};
use lyra_events::{EventBus, StreamEvent, TrackOutcome};
use lyra_manifest::{AdaptationContent, BufferType, Representation};
use lyra_observer::ReadOnlyPlaybackObserver;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{
    ManualSwitchingMode, ReloadRequest, ReloadRequester, RepresentationStream,
    RepresentationStreamArgs, SegmentFetcher, StreamError, StreamObservation, StreamOptions,
    StreamResult, TerminationOrder,
    config::{BUFFER_GOAL_RATIO_STEP, MIN_BUFFER_GOAL_RATIO, MIN_EFFECTIVE_BUFFER_GOAL},
};

/// Collaborators and content of one [`AdaptationStream`].
#[derive(Clone)]
pub struct AdaptationStreamArgs {
    pub content: AdaptationContent,
    pub observer: ReadOnlyPlaybackObserver<StreamObservation>,
    pub store: Arc<BufferSinkStore>,
    pub estimator: Arc<dyn RepresentationEstimator>,
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub reload: Arc<dyn ReloadRequester>,
    pub bus: EventBus,
    pub options: StreamOptions,
}

/// Orchestrates the Representation streams of one track.
pub struct AdaptationStream {
    args: AdaptationStreamArgs,
    /// Buffer-goal ratio per Representation id. Survives switches.
    ratios: Mutex<HashMap<String, f64>>,
    current_representation: SharedReference<Option<Arc<Representation>>>,
    /// Last published bitrate estimate; `None` before the first one.
    published_bitrate: Arc<Mutex<Option<Option<u64>>>>,
    active_streams: AtomicUsize,
}

impl AdaptationStream {
    pub fn new(args: AdaptationStreamArgs) -> Self {
        Self {
            args,
            ratios: Mutex::new(HashMap::new()),
            current_representation: SharedReference::new(None),
            published_bitrate: Arc::new(Mutex::new(None)),
            active_streams: AtomicUsize::new(0),
        }
    }

    pub fn buffer_type(&self) -> BufferType {
        self.args.content.buffer_type()
    }

    /// Representation being loaded, as shown to the estimator.
    pub fn current_representation(&self) -> SharedReference<Option<Arc<Representation>>> {
        self.current_representation.clone()
    }

    /// Buffer-goal ratio applied to `representation_id`.
    pub fn buffer_goal_ratio(&self, representation_id: &str) -> f64 {
        self.ratios
            .lock()
            .get(representation_id)
            .copied()
            .unwrap_or(1.0)
    }

    /// Representation streams running right now: `0` or `1`.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::Acquire)
    }

    /// Run the track, publishing [`StreamEvent::TrackEnded`] unless cancelled.
    pub async fn run_to_end(&self, cancel: &CancelToken) -> StreamResult<TrackOutcome> {
        let result = self.run(cancel).await;
        let buffer_type = self.buffer_type();
        match &result {
            Ok(outcome) => {
                info!(%buffer_type, ?outcome, "adaptation stream: track ended");
                self.args.bus.publish(StreamEvent::TrackEnded {
                    buffer_type,
                    outcome: outcome.clone(),
                });
            }
            Err(err) if err.is_cancelled() => {
                debug!(%buffer_type, "adaptation stream: cancelled");
            }
            Err(err) => {
                warn!(%buffer_type, %err, "adaptation stream: track failed");
                self.args.bus.publish(StreamEvent::TrackEnded {
                    buffer_type,
                    outcome: TrackOutcome::Failed {
                        error: err.to_string(),
                    },
                });
            }
        }
        result
    }

    /// Run until the estimates end, a reload is requested, `cancel` is
    /// cancelled or the track fails.
    pub async fn run(&self, cancel: &CancelToken) -> StreamResult<TrackOutcome> {
        let content = &self.args.content;
        let buffer_type = content.buffer_type();
        let representations = content.adaptation.playable_representations();
        let Some(first) = representations.first() else {
            return Err(StreamError::NoPlayableRepresentation(content.adaptation.id.clone()));
        };
        let sink = self
            .args
            .store
            .create_segment_sink(buffer_type, &first.content_type())?;

        let session = cancel.child();
        let _session_guard = session.clone().drop_guard();
        if self.args.store.is_native(buffer_type) && !self.args.store.is_usable() {
            debug!(%buffer_type, "adaptation stream: waiting for the other native buffers");
            self.args.store.wait_for_usable_buffers(&session).await?;
        }
        let output = self.args.estimator.estimate(
            EstimatorContext {
                content: content.clone(),
                representations: representations.clone(),
                current_representation: self.current_representation.clone(),
                observer: self.args.observer.derive_read_only(StreamObservation::to_abr),
            },
            &session,
        );

        let wake = Arc::new(Notify::new());
        {
            let wake = Arc::clone(&wake);
            output.estimates.on_update(
                move |_| wake.notify_one(),
                UpdateOptions::default().with_clear_signal(&session),
            );
        }
        let finished_handle = {
            let wake = Arc::clone(&wake);
            output.estimates.on_finish(move || wake.notify_one())
        };

        let result = self
            .estimate_loop(&output, &sink, &wake, &session)
            .await;
        finished_handle.remove();
        result
    }

    async fn estimate_loop(
        &self,
        output: &EstimatorOutput,
        sink: &Arc<dyn SegmentSink>,
        wake: &Notify,
        session: &CancelToken,
    ) -> StreamResult<TrackOutcome> {
        let buffer_type = self.buffer_type();
        let mut is_initial = true;

        loop {
            let estimate = loop {
                session.check()?;
                if output.estimates.is_finished() {
                    debug!(%buffer_type, "adaptation stream: estimates ended");
                    return Ok(TrackOutcome::Finished);
                }
                if let Some(estimate) = output.estimates.get() {
                    break estimate;
                }
                tokio::select! {
                    () = wake.notified() => {}
                    () = session.cancelled() => {}
                }
            };

            debug!(
                %buffer_type,
                representation = %estimate.representation.id,
                bitrate = ?estimate.bitrate,
                manual = estimate.manual,
                urgent = estimate.urgent,
                "adaptation stream: new estimate"
            );
            publish_bitrate(&self.args.bus, buffer_type, &self.published_bitrate, estimate.bitrate);

            if !is_initial && self.needs_reload(&estimate) {
                self.request_reload();
                return Ok(TrackOutcome::ReloadRequested);
            }
            is_initial = false;

            self.args.bus.publish(StreamEvent::RepresentationChange {
                buffer_type,
                period_id: self.args.content.period.id.clone(),
                representation_id: estimate.representation.id.clone(),
            });
            self.current_representation
                .set(Some(Arc::clone(&estimate.representation)));

            self.run_representation(&estimate, output, sink, session)
                .await?;
            self.args.bus.publish(StreamEvent::Terminating {
                buffer_type,
                representation_id: estimate.representation.id.clone(),
            });
        }
    }

    /// Manual switch to another Representation in direct mode.
    fn needs_reload(&self, estimate: &Estimate) -> bool {
        estimate.manual
            && self.args.options.manual_switching_mode == ManualSwitchingMode::Direct
            && self
                .current_representation
                .with(|current| current.as_ref().is_some_and(|c| c.id != estimate.representation.id))
    }

    fn request_reload(&self) {
        let buffer_type = self.buffer_type();
        let period = Arc::clone(&self.args.content.period);
        let position_delta = self.args.options.reload_position_delta;
        info!(%buffer_type, period = %period.id, "adaptation stream: direct switch, reloading");
        self.args.bus.publish(StreamEvent::ReloadRequested {
            buffer_type,
            period_id: period.id.clone(),
            position_delta,
        });
        self.args.reload.request_reload(ReloadRequest {
            period,
            buffer_type,
            position: self.args.observer.last_observation().position.last,
            position_delta,
        });
    }

    /// Run streams for `estimate`'s Representation until one is terminated,
    /// restarting it with a lower buffer goal after buffer-full failures.
    async fn run_representation(
        &self,
        estimate: &Estimate,
        output: &EstimatorOutput,
        sink: &Arc<dyn SegmentSink>,
        session: &CancelToken,
    ) -> StreamResult<()> {
        let representation = Arc::clone(&estimate.representation);
        let watch = session.child();
        let _watch_guard = watch.clone().drop_guard();
        let threshold = SharedReference::new(self.fast_switch_threshold(estimate));
        let terminate = SharedReference::new(None);
        let finished_handle = self.watch_estimates(estimate, output, &threshold, &terminate, &watch);

        let result = loop {
            let ratio = self.buffer_goal_ratio(&representation.id);
            let stream = RepresentationStream::new(RepresentationStreamArgs {
                content: self
                    .args
                    .content
                    .with_representation(Arc::clone(&representation)),
                observer: self.args.observer.clone(),
                sink: Arc::clone(sink),
                fetcher: Arc::clone(&self.args.fetcher),
                callbacks: Arc::clone(&output.callbacks),
                bus: self.args.bus.clone(),
                options: self.args.options.clone(),
                buffer_goal_ratio: ratio,
                fast_switch_threshold: threshold.clone(),
                terminate: terminate.clone(),
            });

            let run = {
                let _active = ActiveStream::enter(&self.active_streams);
                stream.run(&watch).await
            };
            match run {
                Err(err) if err.is_buffer_full() => {
                    if !self.reduce_buffer_goal(&representation.id, ratio) {
                        break Err(err);
                    }
                }
                other => break other,
            }
        };
        finished_handle.remove();
        result
    }

    fn fast_switch_threshold(&self, estimate: &Estimate) -> Option<u64> {
        if self.args.options.enable_fast_switching {
            estimate.known_stable_bitrate
        } else {
            Some(0)
        }
    }

    /// Issue at most one termination order: on the first estimate for
    /// another Representation or leaving manual mode, or when estimates end.
    fn watch_estimates(
        &self,
        estimate: &Estimate,
        output: &EstimatorOutput,
        threshold: &SharedReference<Option<u64>>,
        terminate: &SharedReference<Option<TerminationOrder>>,
        watch: &CancelToken,
    ) -> ListenerHandle {
        let buffer_type = self.buffer_type();
        let fast_switching = self.args.options.enable_fast_switching;
        {
            let representation_id = estimate.representation.id.clone();
            let was_manual = estimate.manual;
            let threshold = threshold.clone();
            let terminate = terminate.clone();
            let bus = self.args.bus.clone();
            let published_bitrate = Arc::clone(&self.published_bitrate);
            output.estimates.on_update(
                move |next| {
                    let Some(next) = next else {
                        return;
                    };
                    publish_bitrate(&bus, buffer_type, &published_bitrate, next.bitrate);
                    threshold.set_if_changed(if fast_switching {
                        next.known_stable_bitrate
                    } else {
                        Some(0)
                    });
                    if terminate.with(Option::is_some) {
                        return;
                    }
                    if next.representation.id != representation_id || (was_manual && !next.manual) {
                        debug!(
                            %buffer_type,
                            from = %representation_id,
                            to = %next.representation.id,
                            urgent = next.urgent,
                            "adaptation stream: switching representation"
                        );
                        terminate.set(Some(TerminationOrder {
                            urgent: next.urgent,
                        }));
                    }
                },
                UpdateOptions::default()
                    .with_current_value()
                    .with_clear_signal(watch),
            );
        }

        let terminate = terminate.clone();
        output.estimates.on_finish(move || {
            if terminate.with(Option::is_none) {
                warn!(%buffer_type, "adaptation stream: estimates ended, terminating urgently");
                terminate.set(Some(TerminationOrder { urgent: true }));
            }
        })
    }

    /// Lower the ratio of `representation_id` after a buffer-full failure.
    /// Returns `false` once it cannot go lower.
    fn reduce_buffer_goal(&self, representation_id: &str, ratio: f64) -> bool {
        let buffer_type = self.buffer_type();
        let effective_goal = self.args.options.buffer_goal.get() * ratio;
        if ratio <= MIN_BUFFER_GOAL_RATIO || effective_goal <= MIN_EFFECTIVE_BUFFER_GOAL {
            warn!(
                %buffer_type,
                representation = representation_id,
                ratio,
                effective_goal,
                "adaptation stream: buffer full at minimal goal"
            );
            return false;
        }
        let reduced = (ratio - BUFFER_GOAL_RATIO_STEP).max(MIN_BUFFER_GOAL_RATIO);
        self.ratios
            .lock()
            .insert(representation_id.to_string(), reduced);
        warn!(
            %buffer_type,
            representation = representation_id,
            ratio = reduced,
            "adaptation stream: buffer full, reducing buffer goal"
        );
        self.args.bus.publish(StreamEvent::BufferGoalReduced {
            buffer_type,
            representation_id: representation_id.to_string(),
            ratio: reduced,
        });
        true
    }
}

/// Publish [`StreamEvent::BitrateEstimateChange`] if `bitrate` differs from
/// the last published estimate.
fn publish_bitrate(
    bus: &EventBus,
    buffer_type: BufferType,
    published: &Mutex<Option<Option<u64>>>,
    bitrate: Option<u64>,
) {
    {
        let mut published = published.lock();
        if *published == Some(bitrate) {
            return;
        }
        *published = Some(bitrate);
    }
    bus.publish(StreamEvent::BitrateEstimateChange {
        buffer_type,
        bitrate,
    });
}

/// Counts a running Representation stream for as long as it lives.
struct ActiveStream<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> ActiveStream<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for ActiveStream<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run every track until it ends. A failing track does not stop the others.
pub async fn run_tracks(
    streams: &[Arc<AdaptationStream>],
    cancel: &CancelToken,
) -> Vec<StreamResult<TrackOutcome>> {
    join_all(streams.iter().map(|stream| stream.run_to_end(cancel))).await
}
