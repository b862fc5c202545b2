//! In-memory platform buffers for tests.
//!
//! Media payloads built with [`FakeSourceBuffer::media_payload`] carry their
//! own time range, so the fake can report what is buffered. Any other
//! payload (init data) buffers nothing.

use std::{collections::HashMap, ops::Range, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_core::ranges;
use lyra_manifest::BufferType;
use parking_lot::Mutex;

use crate::{MediaSourceBackend, PlatformError, SourceBufferBackend};

#[derive(Default)]
struct FakeState {
    appended: Vec<Bytes>,
    buffered: Vec<Range<f64>>,
    bytes: usize,
    removed: Vec<Range<f64>>,
    aborted: usize,
}

/// Scriptable [`SourceBufferBackend`].
#[derive(Default)]
pub struct FakeSourceBuffer {
    state: Mutex<FakeState>,
    quota: Option<usize>,
    append_delay: Option<Duration>,
}

impl FakeSourceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject appends once more than `bytes` bytes are held.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn media_payload(start: f64, end: f64) -> Bytes {
        Bytes::from(format!("media:{start}:{end}"))
    }

    pub fn appended(&self) -> Vec<Bytes> {
        self.state.lock().appended.clone()
    }

    pub fn removed(&self) -> Vec<Range<f64>> {
        self.state.lock().removed.clone()
    }

    pub fn aborted(&self) -> usize {
        self.state.lock().aborted
    }

    /// Simulate the platform evicting data on its own.
    pub fn evict(&self, start: f64, end: f64) {
        ranges::remove_range(&mut self.state.lock().buffered, start..end);
    }

    fn parse(data: &[u8]) -> Option<Range<f64>> {
        let text = std::str::from_utf8(data).ok()?;
        let mut parts = text.strip_prefix("media:")?.split(':');
        let start = parts.next()?.parse().ok()?;
        let end = parts.next()?.parse().ok()?;
        Some(start..end)
    }
}

#[async_trait]
impl SourceBufferBackend for FakeSourceBuffer {
    async fn append(&self, data: Bytes) -> Result<(), PlatformError> {
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if let Some(quota) = self.quota
            && state.bytes + data.len() > quota
        {
            return Err(PlatformError::QuotaExceeded);
        }
        state.bytes += data.len();
        if let Some(range) = Self::parse(&data) {
            ranges::insert_range(&mut state.buffered, range);
        }
        state.appended.push(data);
        Ok(())
    }

    async fn remove(&self, start: f64, end: f64) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        ranges::remove_range(&mut state.buffered, start..end);
        state.removed.push(start..end);
        Ok(())
    }

    fn abort(&self) {
        self.state.lock().aborted += 1;
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.state.lock().buffered.clone()
    }
}

/// [`MediaSourceBackend`] handing out [`FakeSourceBuffer`]s.
#[derive(Default)]
pub struct FakeMediaSource {
    buffers: Mutex<HashMap<BufferType, Arc<FakeSourceBuffer>>>,
    created: Mutex<Vec<(BufferType, String)>>,
    removed: Mutex<Vec<BufferType>>,
    quota: Option<usize>,
}

impl FakeMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn source_buffer(&self, buffer_type: BufferType) -> Option<Arc<FakeSourceBuffer>> {
        self.buffers.lock().get(&buffer_type).cloned()
    }

    pub fn created(&self) -> Vec<(BufferType, String)> {
        self.created.lock().clone()
    }

    pub fn removed(&self) -> Vec<BufferType> {
        self.removed.lock().clone()
    }
}

impl MediaSourceBackend for FakeMediaSource {
    fn add_source_buffer(
        &self,
        buffer_type: BufferType,
        codec: &str,
    ) -> Result<Arc<dyn SourceBufferBackend>, PlatformError> {
        let mut buffer = FakeSourceBuffer::new();
        if let Some(quota) = self.quota {
            buffer = buffer.with_quota(quota);
        }
        let buffer = Arc::new(buffer);
        self.buffers.lock().insert(buffer_type, Arc::clone(&buffer));
        self.created.lock().push((buffer_type, codec.to_string()));
        Ok(buffer)
    }

    fn remove_source_buffer(&self, buffer_type: BufferType) {
        self.buffers.lock().remove(&buffer_type);
        self.removed.lock().push(buffer_type);
    }
}
