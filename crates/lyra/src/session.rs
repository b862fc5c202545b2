//! Wiring of the engine parts for one playback.

use std::sync::Arc;

use lyra_abr::RepresentationEstimator;
use lyra_buffer::{BufferSinkStore, MediaSourceBackend, SinkMetrics};
use lyra_core::CancelToken;
use lyra_events::{Event, EventBus, TrackOutcome};
use lyra_manifest::AdaptationContent;
use lyra_observer::{MediaElement, PlaybackObserver};
use lyra_stream::{
    AdaptationStream, AdaptationStreamArgs, ReloadRequester, SegmentFetcher, StreamOptions,
    StreamResult, run_tracks, stream_observer,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::SessionConfig;

/// Collaborators of one track.
#[derive(Clone)]
pub struct TrackCollaborators {
    pub estimator: Arc<dyn RepresentationEstimator>,
    pub fetcher: Arc<dyn SegmentFetcher>,
    pub reload: Arc<dyn ReloadRequester>,
}

/// A media element, the sinks feeding it and the streams filling them.
///
/// Owns the [`PlaybackObserver`] and the [`BufferSinkStore`]; tracks created
/// with [`Session::track`] share both. Dropping the session stops everything.
///
/// # Example
///
/// ```ignore
/// use lyra::prelude::*;
///
/// let session = Session::new(element, media_source, SessionConfig::default(), &CancelToken::new());
/// let video = session.track(video_content, collaborators.clone());
/// let audio = session.track(audio_content, collaborators);
/// for outcome in session.play(&[video, audio]).await {
///     println!("{outcome:?}");
/// }
/// ```
pub struct Session {
    observer: PlaybackObserver,
    store: Arc<BufferSinkStore>,
    bus: EventBus,
    options: StreamOptions,
    cancel: CancelToken,
}

impl Session {
    pub fn new(
        element: Arc<dyn MediaElement>,
        media_source: Arc<dyn MediaSourceBackend>,
        config: SessionConfig,
        parent: &CancelToken,
    ) -> Self {
        let cancel = parent.child();
        let bus = EventBus::new(config.event_capacity);
        let observer = PlaybackObserver::new(element, config.observer, &cancel);
        let store = Arc::new(BufferSinkStore::new(
            media_source,
            config.has_video,
            config.sinks,
            bus.clone(),
        ));
        debug!(has_video = config.has_video, "session: created");
        Self {
            observer,
            store,
            bus,
            options: config.stream,
            cancel,
        }
    }

    pub fn observer(&self) -> &PlaybackObserver {
        &self.observer
    }

    pub fn store(&self) -> &Arc<BufferSinkStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to stream and sink events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    /// Per-sink codec and inventory snapshot.
    pub fn metrics(&self) -> Vec<SinkMetrics> {
        self.store.metrics()
    }

    /// Adaptation stream for `content`, sharing this session's observer,
    /// sinks, bus and options.
    pub fn track(&self, content: AdaptationContent, collaborators: TrackCollaborators) -> Arc<AdaptationStream> {
        Arc::new(AdaptationStream::new(AdaptationStreamArgs {
            content,
            observer: stream_observer(&self.observer, Arc::clone(&self.store)),
            store: Arc::clone(&self.store),
            estimator: collaborators.estimator,
            fetcher: collaborators.fetcher,
            reload: collaborators.reload,
            bus: self.bus.clone(),
            options: self.options.clone(),
        }))
    }

    /// Run `tracks` until each finishes, fails, requests a reload or the
    /// session stops. Results are in `tracks` order.
    ///
    /// Native buffer types without a track are disabled first, so the
    /// others do not wait for them.
    pub async fn play(&self, tracks: &[Arc<AdaptationStream>]) -> Vec<StreamResult<TrackOutcome>> {
        self.disable_untracked(tracks);
        run_tracks(tracks, &self.cancel).await
    }

    fn disable_untracked(&self, tracks: &[Arc<AdaptationStream>]) {
        for &buffer_type in self.store.get_native_buffer_types() {
            if tracks.iter().any(|t| t.buffer_type() == buffer_type) {
                continue;
            }
            if let Err(err) = self.store.disable_segment_sink(buffer_type) {
                debug!(%buffer_type, %err, "session: native buffer left as is");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel every stream, stop observing and release the sinks.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("session: stopping");
        self.cancel.cancel();
        self.observer.stop();
        self.store.dispose_all();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
