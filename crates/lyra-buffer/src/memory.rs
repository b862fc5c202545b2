//! Sink keeping segments in memory, for buffer types the platform does not
//! decode (text tracks rendered by the caller).

use std::{ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_core::CancelToken;
use lyra_manifest::{BufferType, SegmentContext};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    PushedChunk, SegmentInventory, SegmentSink, SinkError, SinkFactory, SinkOperation, SinkResult,
};

/// A media chunk held by a [`MemorySegmentSink`].
#[derive(Clone, Debug)]
pub struct StoredChunk {
    pub range: Range<f64>,
    pub data: Bytes,
    pub info: SegmentContext,
}

#[derive(Default)]
struct MemoryState {
    chunks: Vec<StoredChunk>,
    inventory: SegmentInventory,
    disposed: bool,
}

/// [`SegmentSink`] storing pushed chunks, readable through [`MemorySegmentSink::chunks`].
pub struct MemorySegmentSink {
    buffer_type: BufferType,
    codec: String,
    state: Mutex<MemoryState>,
}

impl MemorySegmentSink {
    pub fn new(buffer_type: BufferType, codec: &str) -> Self {
        Self {
            buffer_type,
            codec: codec.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Chunks covering `time`, latest push last.
    pub fn chunks_at(&self, time: f64) -> Vec<StoredChunk> {
        self.state
            .lock()
            .chunks
            .iter()
            .filter(|c| c.range.contains(&time))
            .cloned()
            .collect()
    }

    pub fn chunks(&self) -> Vec<StoredChunk> {
        self.state.lock().chunks.clone()
    }

    fn check_open(&self, cancel: &CancelToken) -> SinkResult<()> {
        cancel.check()?;
        if self.state.lock().disposed {
            return Err(SinkError::Disposed(self.buffer_type));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentSink for MemorySegmentSink {
    fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    fn codec(&self) -> Option<String> {
        Some(self.codec.clone())
    }

    // Text data is self-contained.
    fn declare_init_segment(&self, _id: &str, _data: Bytes) {}

    fn free_init_segment(&self, _id: &str) {}

    async fn push_chunk(
        &self,
        chunk: PushedChunk,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>> {
        self.check_open(cancel)?;
        if chunk.info.segment.is_init {
            return Ok(self.buffered());
        }
        let range = chunk.info.segment.time_range();
        let mut state = self.state.lock();
        state.chunks.retain(|c| !c.info.is_same_segment(&chunk.info));
        state
            .inventory
            .insert_chunk(chunk.info.clone(), true, chunk.data.len());
        state.chunks.push(StoredChunk {
            range,
            data: chunk.data,
            info: chunk.info,
        });
        Ok(state.inventory.buffered_ranges())
    }

    async fn remove_buffer(
        &self,
        start: f64,
        end: f64,
        cancel: &CancelToken,
    ) -> SinkResult<Vec<Range<f64>>> {
        self.check_open(cancel)?;
        let mut state = self.state.lock();
        state
            .chunks
            .retain(|c| c.range.start < start || c.range.end > end);
        state.inventory.remove_range(start, end);
        Ok(state.inventory.buffered_ranges())
    }

    async fn signal_segment_complete(
        &self,
        info: &SegmentContext,
        cancel: &CancelToken,
    ) -> SinkResult<()> {
        self.check_open(cancel)?;
        self.state.lock().inventory.complete_segment(info);
        Ok(())
    }

    fn pending_operations(&self) -> Vec<SinkOperation> {
        Vec::new()
    }

    // The inventory is the buffer.
    fn synchronize_inventory(&self) {}

    fn inventory(&self) -> SegmentInventory {
        self.state.lock().inventory.clone()
    }

    fn buffered(&self) -> Vec<Range<f64>> {
        self.state.lock().inventory.buffered_ranges()
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.chunks.clear();
        state.inventory = SegmentInventory::new();
        debug!(buffer_type = %self.buffer_type, "memory sink: disposed");
    }
}

/// [`SinkFactory`] building [`MemorySegmentSink`]s.
#[derive(Default)]
pub struct MemorySinkFactory {
    created: Mutex<Vec<Arc<MemorySegmentSink>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created sink.
    pub fn last_created(&self) -> Option<Arc<MemorySegmentSink>> {
        self.created.lock().last().cloned()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, buffer_type: BufferType, codec: &str) -> SinkResult<Arc<dyn SegmentSink>> {
        let sink = Arc::new(MemorySegmentSink::new(buffer_type, codec));
        self.created.lock().push(Arc::clone(&sink));
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use lyra_manifest::{Segment, fixture};

    use super::*;

    fn cue(id: &str, start: f64) -> PushedChunk {
        let content = fixture::single_period_content(BufferType::Text, &[100], 10, 2.0);
        let rep = Arc::clone(&content.adaptation.representations[0]);
        PushedChunk {
            data: Bytes::from(format!("cue {id}")),
            init_segment_id: None,
            info: content
                .with_representation(rep)
                .segment_context(Segment::media(id, start, 2.0)),
        }
    }

    #[tokio::test]
    async fn stores_and_removes_chunks() {
        let sink = MemorySegmentSink::new(BufferType::Text, "wvtt");
        let cancel = CancelToken::new();
        sink.push_chunk(cue("a", 0.0), &cancel).await.unwrap();
        sink.push_chunk(cue("b", 2.0), &cancel).await.unwrap();

        assert_eq!(sink.buffered(), vec![0.0..4.0]);
        assert_eq!(sink.chunks_at(3.0)[0].data, Bytes::from("cue b"));

        let buffered = sink.remove_buffer(0.0, 2.0, &cancel).await.unwrap();
        assert_eq!(buffered, vec![2.0..4.0]);
        assert_eq!(sink.chunks().len(), 1);
    }

    #[tokio::test]
    async fn pushing_same_segment_replaces_data() {
        let sink = MemorySegmentSink::new(BufferType::Text, "wvtt");
        let cancel = CancelToken::new();
        sink.push_chunk(cue("a", 0.0), &cancel).await.unwrap();
        sink.push_chunk(cue("a", 0.0), &cancel).await.unwrap();
        assert_eq!(sink.chunks().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_rejects_push() {
        let sink = MemorySegmentSink::new(BufferType::Text, "wvtt");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = sink.push_chunk(cue("a", 0.0), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(sink.inventory().is_empty());
    }
}
