//! Segment-by-segment loading of one Representation.
//!
//! A [`RepresentationStream`] loops over "analyze, then load the most urgent
//! segment", and sleeps when nothing is needed until playback moves, the
//! buffer goal changes or a termination order arrives.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use lyra_abr::{AbrCallbacks, RequestId, RequestInfo, RequestMetrics};
use lyra_buffer::{PushedChunk, SegmentSink};
use lyra_core::{CancelToken, CancellationError, SharedReference, UpdateOptions};
use lyra_events::{EventBus, StreamEvent};
use lyra_manifest::{RepresentationContent, Segment};
use lyra_observer::{ListenOptions, ReadOnlyPlaybackObserver};
use tokio::{sync::Notify, time::Instant};
use tracing::{debug, trace, warn};

use crate::{
    BufferStatus, FetchError, SegmentFetcher, SegmentRequest, StreamError, StreamObservation,
    StreamOptions, StreamResult,
    analyzer::{AnalyzerInput, get_buffer_status},
};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    RequestId(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// Ask a [`RepresentationStream`] to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminationOrder {
    /// Interrupt the current operation instead of letting it finish.
    pub urgent: bool,
}

/// Everything a [`RepresentationStream`] works with.
#[derive(Clone)]
pub struct RepresentationStreamArgs {
    pub content: RepresentationContent,
    pub observer: ReadOnlyPlaybackObserver<StreamObservation>,
    pub sink: Arc<dyn SegmentSink>,
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub callbacks: Arc<dyn AbrCallbacks>,
    pub bus: EventBus,
    pub options: StreamOptions,
    /// Multiplier applied to the buffer goal.
    pub buffer_goal_ratio: f64,
    pub fast_switch_threshold: SharedReference<Option<u64>>,
    pub terminate: SharedReference<Option<TerminationOrder>>,
}

/// Loads the segments of one Representation into its sink.
pub struct RepresentationStream {
    args: RepresentationStreamArgs,
}

impl RepresentationStream {
    pub fn new(args: RepresentationStreamArgs) -> Self {
        Self { args }
    }

    fn representation_id(&self) -> &str {
        &self.args.content.representation.id
    }

    /// Run until a termination order is honored (`Ok`), `cancel` is
    /// cancelled (`Err(Cancelled)`) or loading fails.
    pub async fn run(&self, cancel: &CancelToken) -> StreamResult<()> {
        let scope = cancel.child();
        let _scope_guard = scope.clone().drop_guard();
        // Cancelled by an urgent termination order.
        let operations = scope.child();
        let wake = Arc::new(Notify::new());
        self.listen(&scope, &operations, &wake);

        debug!(
            buffer_type = %self.args.content.buffer_type(),
            representation = self.representation_id(),
            ratio = self.args.buffer_goal_ratio,
            "representation stream: starting"
        );

        let init_id = match self.load_init_segment(&operations).await {
            Ok(id) => id,
            Err(err) => return self.end_on(err, &scope),
        };
        let result = self
            .load_loop(&scope, &operations, &wake, init_id.as_deref())
            .await;
        if let Some(id) = &init_id {
            self.args.sink.free_init_segment(id);
        }
        result
    }

    /// Wake the loop whenever something it plans with changes.
    fn listen(&self, scope: &CancelToken, operations: &CancelToken, wake: &Arc<Notify>) {
        let notify = {
            let wake = Arc::clone(wake);
            move || wake.notify_one()
        };

        {
            let notify = notify.clone();
            self.args.observer.listen(
                move |_| notify(),
                ListenOptions::default().with_clear_signal(scope),
            );
        }
        {
            let notify = notify.clone();
            self.args.options.buffer_goal.on_update(
                move |_| notify(),
                UpdateOptions::default().with_clear_signal(scope),
            );
        }
        {
            let notify = notify.clone();
            self.args.fast_switch_threshold.on_update(
                move |_| notify(),
                UpdateOptions::default().with_clear_signal(scope),
            );
        }

        let operations = operations.clone();
        let representation_id = self.representation_id().to_string();
        self.args.terminate.on_update(
            move |order| {
                let Some(order) = order else {
                    return;
                };
                debug!(
                    representation = %representation_id,
                    urgent = order.urgent,
                    "representation stream: termination order"
                );
                if order.urgent {
                    operations.cancel_with(CancellationError::new("urgent termination"));
                }
                notify();
            },
            UpdateOptions::default()
                .with_current_value()
                .with_clear_signal(scope),
        );
    }

    async fn load_loop(
        &self,
        scope: &CancelToken,
        operations: &CancelToken,
        wake: &Notify,
        init_id: Option<&str>,
    ) -> StreamResult<()> {
        let buffer_type = self.args.content.buffer_type();
        let mut collected_after_full = false;

        loop {
            scope.check()?;
            if self.args.terminate.with(Option::is_some) {
                debug!(representation = self.representation_id(), "representation stream: terminated");
                return Ok(());
            }

            let observation = self.args.observer.last_observation();
            let status = self.buffer_status(&observation);
            self.publish_status(&observation, &status);

            if status.is_buffer_full
                && let Err(err) = self
                    .collect_garbage(observation.position.last, operations)
                    .await
            {
                return self.end_on(err, scope);
            }

            let Some(next) = status.needed_segments.first() else {
                tokio::select! {
                    () = wake.notified() => {}
                    () = scope.cancelled() => {}
                }
                continue;
            };

            match self
                .load_segment(next.segment.clone(), init_id, operations)
                .await
            {
                Ok(()) => collected_after_full = false,
                Err(StreamError::Sink(err)) if err.is_buffer_full() => {
                    let collected = if collected_after_full {
                        false
                    } else {
                        match self
                            .collect_garbage(observation.position.last, operations)
                            .await
                        {
                            Ok(collected) => collected,
                            Err(err) => return self.end_on(err, scope),
                        }
                    };
                    if !collected {
                        warn!(
                            %buffer_type,
                            representation = self.representation_id(),
                            "representation stream: buffer full"
                        );
                        return Err(StreamError::BufferFull {
                            representation_id: self.representation_id().to_string(),
                        });
                    }
                    collected_after_full = true;
                }
                Err(err) => return self.end_on(err, scope),
            }
        }
    }

    fn buffer_status(&self, observation: &StreamObservation) -> BufferStatus {
        get_buffer_status(&AnalyzerInput {
            content: &self.args.content,
            initial_wanted_time: observation.wanted_position(),
            position: observation.position.last,
            fast_switch_threshold: self.args.fast_switch_threshold.get(),
            buffer_goal: self.args.options.buffer_goal.get() * self.args.buffer_goal_ratio,
            max_buffer_size: self.args.options.max_buffer_size,
            sink: self.args.sink.as_ref(),
        })
    }

    fn publish_status(&self, observation: &StreamObservation, status: &BufferStatus) {
        let buffer_type = self.args.content.buffer_type();
        self.args.bus.publish(StreamEvent::StreamStatusUpdate {
            buffer_type,
            position: observation.position.last,
            needed_segments: status.needed_segments.len(),
            has_finished_loading: status.has_finished_loading,
            is_buffer_full: status.is_buffer_full,
            discontinuity_start: status.imminent_discontinuity.map(|d| d.start),
            discontinuity_end: status.imminent_discontinuity.and_then(|d| d.end),
        });
        if status.should_refresh_manifest {
            self.args
                .bus
                .publish(StreamEvent::NeedsManifestRefresh { buffer_type });
        }
    }

    /// Fetch and declare the init segment. Returns the id chunks refer to.
    async fn load_init_segment(&self, operations: &CancelToken) -> StreamResult<Option<String>> {
        let Some(init) = self.args.content.representation.index.init_segment() else {
            return Ok(None);
        };
        let request = SegmentRequest::new(next_request_id(), self.args.content.segment_context(init));
        let fetched = self
            .args
            .fetcher
            .fetch(&request, operations)
            .await
            .inspect_err(|err| self.warn_fetch(&request, err))?;
        let id = self.representation_id().to_string();
        self.args.sink.declare_init_segment(&id, fetched.data);
        trace!(representation = %id, "representation stream: init segment declared");
        Ok(Some(id))
    }

    async fn load_segment(
        &self,
        segment: Segment,
        init_id: Option<&str>,
        operations: &CancelToken,
    ) -> StreamResult<()> {
        let callbacks = &self.args.callbacks;
        let context = self.args.content.segment_context(segment);
        let id = next_request_id();
        callbacks.on_request_begin(&RequestInfo {
            id,
            representation_id: self.representation_id().to_string(),
            segment_id: context.segment.id.clone(),
            duration: context.segment.duration,
        });

        let started = Instant::now();
        let progress = {
            let callbacks = Arc::clone(callbacks);
            Arc::new(move |loaded: u64| callbacks.on_request_progress(id, loaded, started.elapsed()))
        };
        let request = SegmentRequest::new(id, context.clone()).with_progress(progress);
        let fetched = self.args.fetcher.fetch(&request, operations).await;
        callbacks.on_request_end(id);
        let fetched = fetched.inspect_err(|err| self.warn_fetch(&request, err))?;

        callbacks.on_metrics(&RequestMetrics {
            representation_id: self.representation_id().to_string(),
            bytes: fetched.data.len() as u64,
            duration: started.elapsed(),
            segment_duration: Some(context.segment.duration),
            from_cache: fetched.from_cache,
        });

        self.args
            .sink
            .push_chunk(
                PushedChunk {
                    data: fetched.data,
                    init_segment_id: init_id.map(str::to_string),
                    info: context.clone(),
                },
                operations,
            )
            .await?;
        self.args
            .sink
            .signal_segment_complete(&context, operations)
            .await?;

        let buffered = self.args.sink.inventory().buffered_ranges();
        callbacks.on_added_segment(self.representation_id(), &buffered);
        self.args.bus.publish(StreamEvent::AddedSegment {
            buffer_type: self.args.content.buffer_type(),
            representation_id: self.representation_id().to_string(),
            segment_id: context.segment.id.clone(),
            start: context.segment.time,
            end: context.segment.end,
        });
        Ok(())
    }

    /// Remove media behind `position`. Returns whether anything was removed.
    async fn collect_garbage(&self, position: f64, operations: &CancelToken) -> StreamResult<bool> {
        let until = position - self.args.options.gc_margin;
        let has_data_behind = self
            .args
            .sink
            .buffered()
            .first()
            .is_some_and(|r| r.start < until);
        if !has_data_behind {
            return Ok(false);
        }
        debug!(
            buffer_type = %self.args.content.buffer_type(),
            until,
            "representation stream: collecting garbage"
        );
        self.args.sink.remove_buffer(0.0, until, operations).await?;
        Ok(true)
    }

    fn warn_fetch(&self, request: &SegmentRequest, err: &FetchError) {
        if matches!(err, FetchError::Cancelled(_)) {
            return;
        }
        warn!(?request, %err, "representation stream: segment request failed");
        self.args.bus.publish(StreamEvent::Warning {
            buffer_type: self.args.content.buffer_type(),
            message: err.to_string(),
        });
    }

    /// An operation cancelled by an urgent termination order ends the stream
    /// normally. `scope` is only cancelled from the outside.
    fn end_on(&self, err: StreamError, scope: &CancelToken) -> StreamResult<()> {
        if err.is_cancelled() && !scope.is_cancelled() {
            debug!(
                representation = self.representation_id(),
                "representation stream: interrupted by termination order"
            );
            return Ok(());
        }
        Err(err)
    }
}
