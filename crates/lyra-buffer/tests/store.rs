#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use lyra_buffer::{
    BufferSinkStore, MemorySinkFactory, MediaSourceBackend, PushedChunk, SinkError, SinkStatus,
    SinkStoreOptions, mock::{FakeMediaSource, FakeSourceBuffer},
};
use lyra_core::CancelToken;
use lyra_events::{Event, EventBus, SinkEvent};
use lyra_manifest::{BufferType, Segment, fixture};
use rstest::{fixture, rstest};

// ==================== Fixtures ====================

#[fixture]
fn media_source() -> Arc<FakeMediaSource> {
    Arc::new(FakeMediaSource::new())
}

fn store(media_source: &Arc<FakeMediaSource>, has_video: bool) -> (BufferSinkStore, EventBus) {
    let bus = EventBus::new(64);
    let options = SinkStoreOptions::default()
        .with_sink_factory(BufferType::Text, Arc::new(MemorySinkFactory::new()));
    let store = BufferSinkStore::new(
        Arc::clone(media_source) as Arc<dyn MediaSourceBackend>,
        has_video,
        options,
        bus.clone(),
    );
    (store, bus)
}

fn video_chunk(index: usize) -> PushedChunk {
    let content = fixture::single_period_content(BufferType::Video, &[1_000], 10, 2.0);
    let rep = Arc::clone(&content.adaptation.representations[0]);
    #[expect(clippy::cast_precision_loss)]
    let start = index as f64 * 2.0;
    PushedChunk {
        data: FakeSourceBuffer::media_payload(start, start + 2.0),
        init_segment_id: None,
        info: content
            .with_representation(rep)
            .segment_context(Segment::media(index.to_string(), start, 2.0)),
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<SinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::Sink(e) = event {
            events.push(e);
        }
    }
    events
}

// ==================== Test Cases ====================

#[rstest]
#[case::with_video(true, vec![BufferType::Video, BufferType::Audio])]
#[case::audio_only(false, vec![BufferType::Audio])]
fn test_native_buffer_types(
    media_source: Arc<FakeMediaSource>,
    #[case] has_video: bool,
    #[case] expected: Vec<BufferType>,
) {
    let (store, _bus) = store(&media_source, has_video);
    assert_eq!(store.get_native_buffer_types(), expected.as_slice());
}

#[rstest]
fn sinks_are_memoized(media_source: Arc<FakeMediaSource>) {
    let (store, bus) = store(&media_source, true);
    let mut rx = bus.subscribe();

    let first = store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    let second = store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(media_source.created().len(), 1);
    assert_eq!(
        drain(&mut rx),
        vec![SinkEvent::Created {
            buffer_type: BufferType::Video,
            codec: "avc1".into()
        }]
    );
}

#[rstest]
fn native_codec_mismatch_keeps_existing_sink(media_source: Arc<FakeMediaSource>) {
    let (store, bus) = store(&media_source, true);
    let mut rx = bus.subscribe();

    let first = store.create_segment_sink(BufferType::Audio, "mp4a.40.2").unwrap();
    let second = store.create_segment_sink(BufferType::Audio, "opus").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.codec().as_deref(), Some("mp4a.40.2"));
    assert!(drain(&mut rx).contains(&SinkEvent::CodecMismatch {
        buffer_type: BufferType::Audio,
        current: "mp4a.40.2".into(),
        requested: "opus".into(),
    }));
}

#[rstest]
fn existing_custom_sink_is_returned_on_codec_change(media_source: Arc<FakeMediaSource>) {
    let (store, bus) = store(&media_source, true);
    let mut rx = bus.subscribe();
    let first = store.create_segment_sink(BufferType::Text, "wvtt").unwrap();
    let second = store.create_segment_sink(BufferType::Text, "stpp").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.codec().as_deref(), Some("wvtt"));
    assert!(media_source.created().is_empty());

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, SinkEvent::Disposed { .. })));
    assert!(!events.iter().any(|e| matches!(e, SinkEvent::CodecMismatch { .. })));
}

#[rstest]
fn text_without_factory_is_unsupported(media_source: Arc<FakeMediaSource>) {
    let store = BufferSinkStore::new(
        Arc::clone(&media_source) as Arc<dyn MediaSourceBackend>,
        true,
        SinkStoreOptions::default(),
        EventBus::default(),
    );
    let err = store.create_segment_sink(BufferType::Text, "wvtt").err().expect("expected error");
    assert!(matches!(err, SinkError::UnsupportedType(BufferType::Text)));
    assert!(store.get_status(BufferType::Text).is_uninitialized());
}

#[rstest]
fn disable_after_creation_fails(media_source: Arc<FakeMediaSource>) {
    let (store, _bus) = store(&media_source, true);
    store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    let err = store.disable_segment_sink(BufferType::Video).unwrap_err();
    assert!(matches!(err, SinkError::AlreadyCreated(BufferType::Video)));

    store.disable_segment_sink(BufferType::Text).unwrap();
    assert!(matches!(store.get_status(BufferType::Text), SinkStatus::Disabled));
    let err = store.create_segment_sink(BufferType::Text, "wvtt").err().expect("expected error");
    assert!(matches!(err, SinkError::Disabled(BufferType::Text)));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn usable_once_every_native_type_is_settled(media_source: Arc<FakeMediaSource>) {
    let (store, bus) = store(&media_source, true);
    let store = Arc::new(store);
    let mut rx = bus.subscribe();
    let cancel = CancelToken::new();

    let waiter = {
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        tokio::spawn(async move { store.wait_for_usable_buffers(&cancel).await })
    };

    store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());
    assert!(!store.is_usable());

    store.disable_segment_sink(BufferType::Audio).unwrap();
    waiter.await.unwrap().unwrap();
    assert!(drain(&mut rx).contains(&SinkEvent::NativeBuffersUsable));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn all_disabled_never_becomes_usable(media_source: Arc<FakeMediaSource>) {
    let (store, _bus) = store(&media_source, true);
    store.disable_segment_sink(BufferType::Video).unwrap();
    store.disable_segment_sink(BufferType::Audio).unwrap();

    let cancel = CancelToken::new();
    let wait = store.wait_for_usable_buffers(&cancel);
    let timed_out = tokio::time::timeout(Duration::from_secs(5), wait).await;
    assert!(timed_out.is_err());

    cancel.cancel();
    assert!(store.wait_for_usable_buffers(&cancel).await.is_err());
}

#[rstest]
#[tokio::test]
async fn dispose_releases_platform_buffer(media_source: Arc<FakeMediaSource>) {
    let (store, bus) = store(&media_source, false);
    let mut rx = bus.subscribe();
    let sink = store.create_segment_sink(BufferType::Audio, "mp4a.40.2").unwrap();

    store.dispose_segment_sink(BufferType::Audio);
    assert_eq!(media_source.removed(), vec![BufferType::Audio]);
    assert!(store.get_status(BufferType::Audio).is_uninitialized());
    assert!(drain(&mut rx).contains(&SinkEvent::Disposed {
        buffer_type: BufferType::Audio
    }));

    let err = sink
        .push_chunk(video_chunk(0), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Disposed(BufferType::Audio)));

    // Never created: warning only.
    store.dispose_segment_sink(BufferType::Text);
    assert_eq!(media_source.removed(), vec![BufferType::Audio]);
}

#[rstest]
#[tokio::test]
async fn metrics_expose_codec_and_inventory(media_source: Arc<FakeMediaSource>) {
    let (store, _bus) = store(&media_source, true);
    let video = store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    store.create_segment_sink(BufferType::Audio, "mp4a.40.2").unwrap();
    let cancel = CancelToken::new();
    video.push_chunk(video_chunk(0), &cancel).await.unwrap();
    video.push_chunk(video_chunk(1), &cancel).await.unwrap();

    let metrics = store.metrics();
    assert_eq!(metrics.len(), 2);
    let video_metrics = metrics
        .iter()
        .find(|m| m.buffer_type == BufferType::Video)
        .unwrap();
    assert_eq!(video_metrics.codec.as_deref(), Some("avc1"));
    assert_eq!(video_metrics.inventory.len(), 2);
    assert_eq!(store.buffered_ranges(BufferType::Video), vec![0.0..4.0]);

    store.dispose_all();
    assert!(store.metrics().is_empty());
    assert_eq!(media_source.removed().len(), 2);
}

#[rstest]
#[tokio::test]
async fn inventory_follows_platform_eviction(media_source: Arc<FakeMediaSource>) {
    let (store, _bus) = store(&media_source, true);
    let video = store.create_segment_sink(BufferType::Video, "avc1").unwrap();
    let cancel = CancelToken::new();
    for i in 0..3 {
        video.push_chunk(video_chunk(i), &cancel).await.unwrap();
    }

    let backend = media_source.source_buffer(BufferType::Video).unwrap();
    backend.evict(0.0, 2.0);

    video.synchronize_inventory();
    let once = video.inventory();
    video.synchronize_inventory();
    assert_eq!(video.inventory(), once);
    assert_eq!(once.len(), 2);
    assert_eq!(once.chunks()[0].start, 2.0);
}
