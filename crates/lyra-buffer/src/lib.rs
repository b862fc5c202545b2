//! `lyra-buffer`
//!
//! Where downloaded segments go: a [`SegmentSink`] per buffer type, its
//! [`SegmentInventory`] of pushed chunks, and the [`BufferSinkStore`] that
//! creates and shares the sinks.
//!
//! Audio and video sinks are backed by a platform decode buffer
//! ([`NativeSegmentSink`] over a [`SourceBufferBackend`]); other types use a
//! registered [`SinkFactory`], e.g. [`MemorySinkFactory`] for text.

#![forbid(unsafe_code)]

mod error;
mod inventory;
mod memory;
mod native;
mod sink;
mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use error::{PlatformError, SinkError, SinkResult};
pub use inventory::{BufferedChunk, SegmentInventory};
pub use memory::{MemorySegmentSink, MemorySinkFactory, StoredChunk};
pub use native::{MediaSourceBackend, NativeSegmentSink, SourceBufferBackend};
pub use sink::{PushedChunk, SegmentSink, SinkFactory, SinkOperation};
pub use store::{BufferSinkStore, SinkMetrics, SinkStatus, SinkStoreOptions};
