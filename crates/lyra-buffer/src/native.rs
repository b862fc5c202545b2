//! Sink backed by a platform decode buffer.

use std::{collections::HashMap, ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_core::CancelToken;
use lyra_manifest::{BufferType, SegmentContext};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    PlatformError, PushedChunk, SegmentInventory, SegmentSink, SinkError, SinkOperation,
    SinkResult,
};

/// Platform decode buffer for one media type.
#[async_trait]
pub trait SourceBufferBackend: Send + Sync {
    async fn append(&self, data: Bytes) -> Result<(), PlatformError>;

    async fn remove(&self, start: f64, end: f64) -> Result<(), PlatformError>;

    /// Interrupt the running append, if any.
    fn abort(&self);

    fn buffered(&self) -> Vec<Range<f64>>;
}

/// Platform container of decode buffers.
pub trait MediaSourceBackend: Send + Sync {
    fn add_source_buffer(
        &self,
        buffer_type: BufferType,
        codec: &str,
    ) -> Result<Arc<dyn SourceBufferBackend>, PlatformError>;

    fn remove_source_buffer(&self, buffer_type: BufferType);
}

struct NativeState {
    inventory: SegmentInventory,
    init_segments: HashMap<String, Bytes>,
    last_init_pushed: Option<String>,
    pending: Vec<(u64, SinkOperation)>,
    next_op_id: u64,
    disposed: bool,
}

/// [`SegmentSink`] over a [`SourceBufferBackend`].
///
/// Operations wait for each other on an async queue lock and every wait is
/// raced against the caller's token.
pub struct NativeSegmentSink {
    buffer_type: BufferType,
    codec: String,
    backend: Arc<dyn SourceBufferBackend>,
    queue: tokio::sync::Mutex<()>,
    state: Mutex<NativeState>,
}

impl NativeSegmentSink {
    pub fn new(buffer_type: BufferType, codec: &str, backend: Arc<dyn SourceBufferBackend>) -> Self {
        Self {
            buffer_type,
            codec: codec.to_string(),
            backend,
            queue: tokio::sync::Mutex::new(()),
            state: Mutex::new(NativeState {
                inventory: SegmentInventory::new(),
                init_segments: HashMap::new(),
                last_init_pushed: None,
                pending: Vec::new(),
                next_op_id: 0,
                disposed: false,
            }),
        }
    }

    fn enqueue(&self, op: SinkOperation) -> SinkResult<PendingGuard<'_>> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SinkError::Disposed(self.buffer_type));
        }
        let id = state.next_op_id;
        state.next_op_id += 1;
        state.pending.push((id, op));
        Ok(PendingGuard { sink: self, id })
    }

    async fn acquire(&self, cancel: &CancelToken) -> SinkResult<tokio::sync::MutexGuard<'_, ()>> {
        cancel.check()?;
        tokio::select! {
            guard = self.queue.lock() => {
                if self.state.lock().disposed {
                    return Err(SinkError::Disposed(self.buffer_type));
                }
                Ok(guard)
            }
            () = cancel.cancelled() => Err(cancelled(cancel)),
        }
    }

    async fn append(&self, data: Bytes, cancel: &CancelToken) -> SinkResult<()> {
        tokio::select! {
            res = self.backend.append(data) => {
                res.map_err(|e| SinkError::from_platform(self.buffer_type, e))
            }
            () = cancel.cancelled() => {
                trace!(buffer_type = %self.buffer_type, "native sink: aborting append");
                self.backend.abort();
                // The platform may hold part of the data: force the init
                // segment to be pushed again.
                self.state.lock().last_init_pushed = None;
                Err(cancelled(cancel))
            }
        }
    }

    async fn push_init_if_needed(&self, init_id: Option<&str>, cancel: &CancelToken) -> SinkResult<()> {
        let Some(init_id) = init_id else {
            return Ok(());
        };
        let data = {
            let state = self.state.lock();
            if state.last_init_pushed.as_deref() == Some(init_id) {
                return Ok(());
            }
            state
                .init_segments
                .get(init_id)
                .cloned()
                .ok_or_else(|| SinkError::UnknownInitSegment(init_id.to_string()))?
        };
        debug!(buffer_type = %self.buffer_type, init_id, "native sink: pushing init segment");
        self.append(data, cancel).await?;
        self.state.lock().last_init_pushed = Some(init_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl SegmentSink for NativeSegmentSink {
    fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    fn codec(&self) -> Option<String> {
        Some(self.codec.clone())
    }

    fn declare_init_segment(&self, id: &str, data: Bytes) {
        let mut state = self.state.lock();
        if let Some(previous) = state.init_segments.insert(id.to_string(), data.clone())
            && previous != data
            && state.last_init_pushed.as_deref() == Some(id)
        {
            state.last_init_pushed = None;
        }
    }

    fn free_init_segment(&self, id: &str) {
        let mut state = self.state.lock();
        state.init_segments.remove(id);
        if state.last_init_pushed.as_deref() == Some(id) {
            state.last_init_pushed = None;
        }
    }

    async fn push_chunk(
        &self,
        chunk: PushedChunk,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>> {
        let _pending = self.enqueue(SinkOperation::Push(chunk.info.clone()))?;
        let _queue = self.acquire(cancel).await?;

        self.push_init_if_needed(chunk.init_segment_id.as_deref(), cancel)
            .await?;

        let size = chunk.data.len();
        if !chunk.info.segment.is_init {
            self.append(chunk.data, cancel).await?;
        }
        trace!(
            buffer_type = %self.buffer_type,
            segment = %chunk.info.segment.id,
            size,
            "native sink: chunk acknowledged"
        );

        let buffered = self.backend.buffered();
        let mut state = self.state.lock();
        state.inventory.insert_chunk(chunk.info, true, size);
        state.inventory.synchronize_buffered(&buffered);
        Ok(buffered)
    }

    async fn remove_buffer(
        &self,
        start: f64,
        end: f64,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>> {
        let _pending = self.enqueue(SinkOperation::Remove(start..end))?;
        let _queue = self.acquire(cancel).await?;

        debug!(buffer_type = %self.buffer_type, start, end, "native sink: removing buffer");
        tokio::select! {
            res = self.backend.remove(start, end) => {
                res.map_err(|e| SinkError::from_platform(self.buffer_type, e))?;
            }
            () = cancel.cancelled() => return Err(cancelled(cancel)),
        }

        let buffered = self.backend.buffered();
        let mut state = self.state.lock();
        state.inventory.remove_range(start, end);
        state.inventory.synchronize_buffered(&buffered);
        Ok(buffered)
    }

    async fn signal_segment_complete(
        &self,
        info: &SegmentContext,
        cancel: &CancelToken,
    ) -> SinkResult<()> {
        let _pending = self.enqueue(SinkOperation::SignalComplete(info.clone()))?;
        let _queue = self.acquire(cancel).await?;
        self.state.lock().inventory.complete_segment(info);
        Ok(())
    }

    fn pending_operations(&self) -> Vec<SinkOperation> {
        self.state
            .lock()
            .pending
            .iter()
            .map(|(_, op)| op.clone())
            .collect()
    }

    fn synchronize_inventory(&self) {
        let buffered = self.backend.buffered();
        self.state.lock().inventory.synchronize_buffered(&buffered);
    }

    fn inventory(&self) -> SegmentInventory {
        self.state.lock().inventory.clone()
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.backend.buffered()
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.inventory = SegmentInventory::new();
        state.init_segments.clear();
        state.last_init_pushed = None;
        drop(state);
        if self.queue.try_lock().is_err() {
            warn!(buffer_type = %self.buffer_type, "native sink: disposed with an operation running");
            self.backend.abort();
        }
        debug!(buffer_type = %self.buffer_type, "native sink: disposed");
    }
}

/// Removes its operation from the pending list when dropped.
struct PendingGuard<'a> {
    sink: &'a NativeSegmentSink,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.sink.state.lock().pending.retain(|(id, _)| *id != self.id);
    }
}

fn cancelled(cancel: &CancelToken) -> SinkError {
    SinkError::Cancelled(cancel.reason().unwrap_or_default())
}
