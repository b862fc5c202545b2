#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use lyra_abr::{RepresentationEstimator, mock::ScriptedEstimator};
use lyra_buffer::{BufferSinkStore, MediaSourceBackend, SinkStoreOptions, mock::FakeMediaSource};
use lyra_core::CancelToken;
use lyra_events::{Event, EventBus, StreamEvent, TrackOutcome};
use lyra_manifest::{AdaptationContent, BufferType, Representation, fixture};
use lyra_observer::{MediaElement, ObserverOptions, PlaybackObserver, ReadyState, mock::FakeMediaElement};
use lyra_stream::{
    AdaptationStream, AdaptationStreamArgs, NoopReloadRequester, ReloadRequester, SegmentFetcher,
    StreamOptions, StreamResult, mock::ScriptedFetcher, stream_observer,
};
use tokio::{sync::broadcast, task::JoinHandle};

pub const BITRATES: [u64; 3] = [500_000, 1_000_000, 4_000_000];

/// Ten 2s video segments per Representation, one stream session.
pub struct Harness {
    pub element: Arc<FakeMediaElement>,
    pub observer: PlaybackObserver,
    pub media_source: Arc<FakeMediaSource>,
    pub store: Arc<BufferSinkStore>,
    pub estimator: Arc<ScriptedEstimator>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub bus: EventBus,
    pub events: broadcast::Receiver<Event>,
    pub content: AdaptationContent,
    /// Parent of the streams; the observer has its own token.
    pub cancel: CancelToken,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self::with_media_source(fetcher, FakeMediaSource::new())
    }

    pub fn with_media_source(fetcher: ScriptedFetcher, media_source: FakeMediaSource) -> Self {
        init_tracing();
        let element = Arc::new(FakeMediaElement::new());
        element.set_duration(20.0);
        element.set_ready_state(ReadyState::HaveEnoughData);
        let observer = PlaybackObserver::new(
            Arc::clone(&element) as Arc<dyn MediaElement>,
            ObserverOptions::default(),
            &CancelToken::new(),
        );

        let bus = EventBus::new(4096);
        let events = bus.subscribe();
        let media_source = Arc::new(media_source);
        let store = Arc::new(BufferSinkStore::new(
            Arc::clone(&media_source) as Arc<dyn MediaSourceBackend>,
            true,
            SinkStoreOptions::default(),
            bus.clone(),
        ));
        // Video-only content: audio is settled up front.
        store.disable_segment_sink(BufferType::Audio).unwrap();

        Self {
            element,
            observer,
            media_source,
            store,
            estimator: Arc::new(ScriptedEstimator::new()),
            fetcher: Arc::new(fetcher),
            bus,
            events,
            content: fixture::single_period_content(BufferType::Video, &BITRATES, 10, 2.0),
            cancel: CancelToken::new(),
        }
    }

    pub fn representation(&self, index: usize) -> Arc<Representation> {
        Arc::clone(&self.content.adaptation.representations[index])
    }

    pub fn stream(&self, options: StreamOptions) -> Arc<AdaptationStream> {
        self.stream_with_reload(options, Arc::new(NoopReloadRequester))
    }

    pub fn stream_with_reload(
        &self,
        options: StreamOptions,
        reload: Arc<dyn ReloadRequester>,
    ) -> Arc<AdaptationStream> {
        Arc::new(AdaptationStream::new(AdaptationStreamArgs {
            content: self.content.clone(),
            observer: stream_observer(&self.observer, Arc::clone(&self.store)),
            store: Arc::clone(&self.store),
            estimator: Arc::clone(&self.estimator) as Arc<dyn RepresentationEstimator>,
            fetcher: Arc::clone(&self.fetcher) as Arc<dyn SegmentFetcher>,
            reload,
            bus: self.bus.clone(),
            options,
        }))
    }

    pub fn spawn(&self, stream: &Arc<AdaptationStream>) -> JoinHandle<StreamResult<TrackOutcome>> {
        let stream = Arc::clone(stream);
        let cancel = self.cancel.clone();
        tokio::spawn(async move { stream.run_to_end(&cancel).await })
    }

    /// Stream events published since the last call.
    pub fn stream_events(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let Event::Stream(e) = event {
                events.push(e);
            }
        }
        events
    }
}

/// Log to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn rep_id(bitrate: u64) -> String {
    format!("video-{bitrate}")
}

pub fn segment_id(bitrate: u64, index: usize) -> String {
    format!("video-{bitrate}-{index}")
}

pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn added_segments(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::AddedSegment { segment_id, .. } => Some(segment_id.clone()),
            _ => None,
        })
        .collect()
}

pub fn representation_changes(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::RepresentationChange {
                representation_id, ..
            } => Some(representation_id.clone()),
            _ => None,
        })
        .collect()
}
