#![forbid(unsafe_code)]

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use lyra_abr::RequestId;
use lyra_core::CancelToken;
use lyra_manifest::SegmentContext;

use crate::FetchError;

/// Progress callback: bytes loaded so far.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// One segment to download.
#[derive(Clone)]
pub struct SegmentRequest {
    pub id: RequestId,
    pub context: SegmentContext,
    progress: Option<ProgressFn>,
}

impl SegmentRequest {
    pub fn new(id: RequestId, context: SegmentContext) -> Self {
        Self {
            id,
            context,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Report that `loaded_bytes` were received so far.
    pub fn report_progress(&self, loaded_bytes: u64) {
        if let Some(progress) = &self.progress {
            progress(loaded_bytes);
        }
    }

    pub fn is_init(&self) -> bool {
        self.context.segment.is_init
    }
}

impl fmt::Debug for SegmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentRequest")
            .field("id", &self.id)
            .field("representation", &self.context.representation.id)
            .field("segment", &self.context.segment.id)
            .finish_non_exhaustive()
    }
}

/// Downloaded segment data.
#[derive(Clone, Debug)]
pub struct FetchedSegment {
    pub data: Bytes,
    pub from_cache: bool,
}

impl FetchedSegment {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            from_cache: false,
        }
    }
}

/// Downloads segments. Transport, caching and decryption live behind it.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Download `request`, giving up when `cancel` is cancelled.
    async fn fetch(
        &self,
        request: &SegmentRequest,
        cancel: &CancelToken,
    ) -> Result<FetchedSegment, FetchError>;
}
