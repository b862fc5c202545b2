use std::{fmt, ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_core::CancelToken;
use lyra_manifest::{BufferType, SegmentContext};

use crate::{SegmentInventory, SinkResult};

/// Media data handed to a sink.
#[derive(Clone)]
pub struct PushedChunk {
    pub data: Bytes,
    /// Init segment the chunk depends on, declared beforehand with
    /// [`SegmentSink::declare_init_segment`].
    pub init_segment_id: Option<String>,
    pub info: SegmentContext,
}

impl fmt::Debug for PushedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushedChunk")
            .field("len", &self.data.len())
            .field("init_segment_id", &self.init_segment_id)
            .field("segment", &self.info.segment.id)
            .field("representation", &self.info.representation.id)
            .finish()
    }
}

/// An operation queued or running on a sink.
#[derive(Clone, Debug)]
pub enum SinkOperation {
    Push(SegmentContext),
    Remove(Range<f64>),
    SignalComplete(SegmentContext),
}

impl SinkOperation {
    /// Segment the operation is about, if any.
    pub fn segment(&self) -> Option<&SegmentContext> {
        match self {
            Self::Push(info) | Self::SignalComplete(info) => Some(info),
            Self::Remove(_) => None,
        }
    }
}

/// Owns append and removal of media data for one buffer type.
///
/// Operations are applied in call order. Each async operation is abandoned
/// when its token is cancelled, and the sink's inventory only records data
/// the backing buffer acknowledged.
#[async_trait]
pub trait SegmentSink: Send + Sync {
    fn buffer_type(&self) -> BufferType;

    fn codec(&self) -> Option<String>;

    /// Keep init data around so it can be (re)pushed before dependent chunks.
    fn declare_init_segment(&self, id: &str, data: Bytes);

    fn free_init_segment(&self, id: &str);

    /// Append a chunk. Returns the buffered ranges after the append.
    async fn push_chunk(
        &self,
        chunk: PushedChunk,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>>;

    /// Remove `[start, end)`. Returns the buffered ranges after the removal.
    async fn remove_buffer(
        &self,
        start: f64,
        end: f64,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>>;

    /// Every chunk of the segment in `info` has been pushed.
    async fn signal_segment_complete(
        &self,
        info: &SegmentContext,
        cancel: &CancelToken,
    ) -> SinkResult<()>;

    /// Operations queued or running, oldest first.
    fn pending_operations(&self) -> Vec<SinkOperation>;

    /// Reconcile the inventory with what the backing buffer reports.
    fn synchronize_inventory(&self);

    /// Snapshot of the inventory.
    fn inventory(&self) -> SegmentInventory;

    /// Ranges currently buffered, as reported by the backing buffer.
    fn buffered(&self) -> Vec<Range<f64>>;

    /// Release the backing buffer. Later operations fail with `Disposed`.
    fn dispose(&self);
}

/// Builds sinks for buffer types that are not backed by the platform.
pub trait SinkFactory: Send + Sync {
    fn create(&self, buffer_type: BufferType, codec: &str) -> SinkResult<Arc<dyn SegmentSink>>;
}
