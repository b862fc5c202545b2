//! Scripted segment fetcher for tests.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_buffer::mock::FakeSourceBuffer;
use lyra_core::CancelToken;
use parking_lot::Mutex;

use crate::{FetchError, FetchedSegment, SegmentFetcher, SegmentRequest};

/// [`SegmentFetcher`] answering with payloads a [`FakeSourceBuffer`] understands.
///
/// Media segments come back as [`FakeSourceBuffer::media_payload`] of their
/// time range, init segments as `b"init"`.
#[derive(Default)]
pub struct ScriptedFetcher {
    delay: Option<Duration>,
    requests: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancelled: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `delay` (tokio time) to answer each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer requests for `segment_id` with HTTP 404.
    pub fn fail(&self, segment_id: &str) {
        self.failing.lock().insert(segment_id.to_string());
    }

    /// Requested segment ids, in request order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Requested media segment ids, in request order.
    pub fn media_requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter(|id| !id.ends_with("-init"))
            .cloned()
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Most requests ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    /// Requests abandoned because their token was cancelled.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SegmentFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        request: &SegmentRequest,
        cancel: &CancelToken,
    ) -> Result<FetchedSegment, FetchError> {
        cancel.check()?;
        let segment = &request.context.segment;
        self.requests.lock().push(segment.id.clone());

        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(running, Ordering::AcqRel);
        let waited = match self.delay {
            Some(delay) => tokio::select! {
                () = tokio::time::sleep(delay) => Ok(()),
                () = cancel.cancelled() => Err(()),
            },
            None => Ok(()),
        };
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if waited.is_err() {
            self.cancelled.fetch_add(1, Ordering::AcqRel);
            cancel.check()?;
        }

        if self.failing.lock().contains(&segment.id) {
            return Err(FetchError::Status {
                segment_id: segment.id.clone(),
                status: 404,
            });
        }
        let data = if segment.is_init {
            Bytes::from_static(b"init")
        } else {
            FakeSourceBuffer::media_payload(segment.time, segment.end)
        };
        request.report_progress(data.len() as u64);
        Ok(FetchedSegment::new(data))
    }
}
