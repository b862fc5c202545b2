#![forbid(unsafe_code)]

mod common;

use std::{sync::Arc, time::Duration};

use common::{
    BITRATES, Harness, added_segments, advance, rep_id, representation_changes, segment_id,
};
use lyra_abr::{Estimate, mock::CallbackEvent};
use lyra_buffer::mock::FakeMediaSource;
use lyra_events::{StreamEvent, TrackOutcome};
use lyra_stream::{
    ManualSwitchingMode, ReloadRequesterMock, StreamError, StreamOptions, mock::ScriptedFetcher,
};
use rstest::rstest;
use unimock::{MockFn, Unimock, matching};

// ==================== Test Cases ====================

#[tokio::test(start_paused = true)]
async fn loads_the_whole_track_then_finishes_with_estimates() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(0)).with_bitrate(Some(600_000)));
    let stream = h.stream(StreamOptions::default());
    let handle = h.spawn(&stream);

    advance(500).await;
    let expected: Vec<_> = (0..10).map(|i| segment_id(BITRATES[0], i)).collect();
    assert_eq!(h.fetcher.media_requests(), expected);

    let events = h.stream_events();
    assert_eq!(representation_changes(&events), vec![rep_id(BITRATES[0])]);
    assert_eq!(added_segments(&events), expected);
    assert!(events.contains(&StreamEvent::BitrateEstimateChange {
        buffer_type: h.content.buffer_type(),
        bitrate: Some(600_000),
    }));
    let last_status = events.iter().rev().find_map(|e| match e {
        StreamEvent::StreamStatusUpdate {
            has_finished_loading,
            needed_segments,
            ..
        } => Some((*has_finished_loading, *needed_segments)),
        _ => None,
    });
    assert_eq!(last_status, Some((true, 0)));

    let callbacks = h.estimator.callbacks();
    assert_eq!(callbacks.added_segments(), 10);
    let metrics = callbacks
        .events()
        .iter()
        .filter(|e| matches!(e, CallbackEvent::Metrics(_)))
        .count();
    assert_eq!(metrics, 10);
    assert_eq!(
        stream.current_representation().get().map(|r| r.id.clone()),
        Some(rep_id(BITRATES[0]))
    );

    h.estimator.end();
    assert_eq!(handle.await.unwrap().unwrap(), TrackOutcome::Finished);
    let events = h.stream_events();
    assert!(events.contains(&StreamEvent::TrackEnded {
        buffer_type: h.content.buffer_type(),
        outcome: TrackOutcome::Finished,
    }));
}

#[tokio::test(start_paused = true)]
async fn bitrate_estimates_are_published_without_a_switch() {
    let mut h = Harness::new(ScriptedFetcher::new());
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    for bitrate in [1, 2, 2, 3] {
        h.estimator
            .push(Estimate::new(h.representation(0)).with_bitrate(Some(bitrate)));
        advance(50).await;
    }

    let events = h.stream_events();
    let bitrates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::BitrateEstimateChange { bitrate, .. } => Some(*bitrate),
            _ => None,
        })
        .collect();
    assert_eq!(bitrates, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(representation_changes(&events), vec![rep_id(BITRATES[0])]);
}

#[tokio::test(start_paused = true)]
async fn graceful_switch_waits_for_the_current_segment() {
    let mut h = Harness::new(ScriptedFetcher::new().with_delay(Duration::from_secs(1)));
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    // Init segment until 1s, first media segment until 2s.
    advance(1500).await;
    h.estimator.push(Estimate::new(h.representation(2)));
    advance(3000).await;

    assert_eq!(h.fetcher.cancelled(), 0);
    let requests = h.fetcher.media_requests();
    assert_eq!(requests[0], segment_id(BITRATES[0], 0));
    // The low-quality segment under the position is kept.
    assert_eq!(requests[1], segment_id(BITRATES[2], 1));

    let events = h.stream_events();
    assert_eq!(
        representation_changes(&events),
        vec![rep_id(BITRATES[0]), rep_id(BITRATES[2])]
    );
    assert_eq!(added_segments(&events)[0], segment_id(BITRATES[0], 0));
    assert!(events.contains(&StreamEvent::Terminating {
        buffer_type: h.content.buffer_type(),
        representation_id: rep_id(BITRATES[0]),
    }));
}

#[tokio::test(start_paused = true)]
async fn urgent_switch_interrupts_the_current_request() {
    let mut h = Harness::new(ScriptedFetcher::new().with_delay(Duration::from_secs(1)));
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    advance(1500).await;
    h.estimator.push(Estimate::new(h.representation(2)).urgent());
    advance(3000).await;

    assert_eq!(h.fetcher.cancelled(), 1);
    let requests = h.fetcher.media_requests();
    assert_eq!(
        requests[..2],
        [segment_id(BITRATES[0], 0), segment_id(BITRATES[2], 0)]
    );

    let added = added_segments(&h.stream_events());
    assert!(!added.contains(&segment_id(BITRATES[0], 0)));
    assert_eq!(added[0], segment_id(BITRATES[2], 0));
    assert!(h.store.buffered_ranges(h.content.buffer_type())[0].start <= 0.0);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_representation_stream_per_track() {
    let mut h = Harness::new(ScriptedFetcher::new().with_delay(Duration::from_millis(100)));
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    for i in 0..40_usize {
        let mut estimate = Estimate::new(h.representation(i % 3));
        if i % 4 == 0 {
            estimate = estimate.urgent();
        }
        h.estimator.push(estimate);
        for _ in 0..3 {
            advance(13).await;
            assert!(stream.active_streams() <= 1);
        }
    }

    assert!(h.fetcher.max_in_flight() <= 1);
    assert!(representation_changes(&h.stream_events()).len() > 2);
}

#[rstest]
#[case::default_goal(30.0, vec![0.75, 0.5, 0.25])]
#[case::small_goal(4.0, vec![0.75, 0.5])]
#[tokio::test(start_paused = true)]
async fn buffer_goal_ratio_is_reduced_then_error_propagates(
    #[case] goal: f64,
    #[case] expected: Vec<f64>,
) {
    // Room for the init segment and nothing else.
    let mut h = Harness::with_media_source(
        ScriptedFetcher::new(),
        FakeMediaSource::new().with_quota(10),
    );
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default().with_buffer_goal(goal));

    let result = h.spawn(&stream).await.unwrap();
    assert!(matches!(result, Err(StreamError::BufferFull { .. })));

    let events = h.stream_events();
    let ratios: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::BufferGoalReduced { ratio, .. } => Some(*ratio),
            _ => None,
        })
        .collect();
    assert_eq!(ratios, expected);
    assert!(ratios.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(
        stream.buffer_goal_ratio(&rep_id(BITRATES[0])),
        *expected.last().unwrap()
    );
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::TrackEnded {
            outcome: TrackOutcome::Failed { .. },
            ..
        }
    )));
}

#[rstest]
#[case::enabled(true, 9)]
#[case::disabled(false, 0)]
#[tokio::test(start_paused = true)]
async fn fast_switching_replaces_low_quality_data(
    #[case] enabled: bool,
    #[case] expected_replacements: usize,
) {
    let h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default().with_fast_switching(enabled));
    let _handle = h.spawn(&stream);

    advance(200).await;
    h.estimator.push(Estimate::new(h.representation(2)));
    advance(200).await;

    let high_quality = h
        .fetcher
        .media_requests()
        .iter()
        .filter(|id| id.starts_with(&rep_id(BITRATES[2])))
        .count();
    // Segment 0 sits under the position and is never replaced.
    assert_eq!(high_quality, expected_replacements);
}

#[tokio::test(start_paused = true)]
async fn direct_manual_switch_requests_a_reload() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(0)));
    let reload = Unimock::new(
        ReloadRequesterMock::request_reload
            .next_call(matching!(_))
            .returns(()),
    );
    let stream = h.stream_with_reload(
        StreamOptions::default()
            .with_manual_switching_mode(ManualSwitchingMode::Direct)
            .with_reload_position_delta(0.5),
        Arc::new(reload),
    );
    let handle = h.spawn(&stream);

    advance(100).await;
    h.estimator.push(Estimate::new(h.representation(2)).manual());

    assert_eq!(handle.await.unwrap().unwrap(), TrackOutcome::ReloadRequested);
    let events = h.stream_events();
    assert_eq!(representation_changes(&events), vec![rep_id(BITRATES[0])]);
    assert!(events.contains(&StreamEvent::ReloadRequested {
        buffer_type: h.content.buffer_type(),
        period_id: "p0".to_string(),
        position_delta: 0.5,
    }));
}

#[tokio::test(start_paused = true)]
async fn seamless_manual_switch_changes_representation() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    advance(100).await;
    h.estimator.push(Estimate::new(h.representation(2)).manual());
    advance(100).await;

    let events = h.stream_events();
    assert_eq!(
        representation_changes(&events),
        vec![rep_id(BITRATES[0]), rep_id(BITRATES[2])]
    );
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, StreamEvent::ReloadRequested { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn initial_manual_estimate_never_reloads() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(1)).manual());
    let stream = h.stream(
        StreamOptions::default().with_manual_switching_mode(ManualSwitchingMode::Direct),
    );
    let _handle = h.spawn(&stream);

    advance(100).await;
    assert_eq!(
        representation_changes(&h.stream_events()),
        vec![rep_id(BITRATES[1])]
    );
}

#[tokio::test(start_paused = true)]
async fn leaving_manual_mode_restarts_the_stream() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.estimator.push(Estimate::new(h.representation(1)).manual());
    let stream = h.stream(StreamOptions::default());
    let _handle = h.spawn(&stream);

    advance(100).await;
    h.estimator.push(Estimate::new(h.representation(1)));
    advance(100).await;

    let events = h.stream_events();
    assert_eq!(
        representation_changes(&events),
        vec![rep_id(BITRATES[1]), rep_id(BITRATES[1])]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_segment_request_fails_the_track() {
    let mut h = Harness::new(ScriptedFetcher::new());
    h.fetcher.fail(&segment_id(BITRATES[0], 3));
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());

    let result = h.spawn(&stream).await.unwrap();
    assert!(matches!(result, Err(StreamError::Fetch(_))));

    let events = h.stream_events();
    assert_eq!(added_segments(&events).len(), 3);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, StreamEvent::Warning { .. }))
    );
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::TrackEnded {
            outcome: TrackOutcome::Failed { .. },
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_final() {
    let mut h = Harness::new(ScriptedFetcher::new().with_delay(Duration::from_millis(500)));
    h.estimator.push(Estimate::new(h.representation(0)));
    let stream = h.stream(StreamOptions::default());
    let handle = h.spawn(&stream);

    advance(1200).await;
    h.cancel.cancel();
    let result = handle.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());

    let requests = h.fetcher.requests().len();
    let callbacks = h.estimator.callbacks().events().len();
    let inventory = h.store.metrics();
    h.stream_events();

    h.element.set_position(4.0);
    h.element.fire(lyra_observer::MediaEventKind::Seeking);
    h.estimator.push(Estimate::new(h.representation(2)).urgent());
    advance(1000).await;

    assert_eq!(h.fetcher.requests().len(), requests);
    assert_eq!(h.estimator.callbacks().events().len(), callbacks);
    assert_eq!(h.store.metrics()[0].inventory, inventory[0].inventory);
    assert!(h.stream_events().is_empty());
    assert_eq!(stream.active_streams(), 0);
}
