//! Record of what was pushed into a sink, reconciled against what the
//! platform reports as buffered.

use std::ops::Range;

use lyra_core::ranges;
use lyra_manifest::SegmentContext;
use tracing::{debug, trace};

/// Buffered span under which a chunk is considered fully garbage collected.
const MINIMUM_BUFFERED_DURATION: f64 = 0.05;

/// A pushed segment, as the sink knows it.
#[derive(Clone, Debug)]
pub struct BufferedChunk {
    /// Nominal start, possibly trimmed by a later overlapping push.
    pub start: f64,
    /// Nominal end, possibly trimmed by a later overlapping push.
    pub end: f64,
    /// Start actually reported by the platform, after the last resync.
    pub buffered_start: Option<f64>,
    /// End actually reported by the platform, after the last resync.
    pub buffered_end: Option<f64>,
    /// Still waiting for more chunks of the same segment.
    pub partially_pushed: bool,
    /// Bytes pushed for this chunk.
    pub size: usize,
    pub info: SegmentContext,
}

impl BufferedChunk {
    pub fn range(&self) -> Range<f64> {
        self.start..self.end
    }

    /// Start and end the platform reports, falling back to nominal bounds.
    pub fn effective_range(&self) -> Range<f64> {
        self.buffered_start.unwrap_or(self.start)..self.buffered_end.unwrap_or(self.end)
    }

    pub fn bitrate(&self) -> u64 {
        self.info.representation.bitrate
    }
}

impl PartialEq for BufferedChunk {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.buffered_start == other.buffered_start
            && self.buffered_end == other.buffered_end
            && self.partially_pushed == other.partially_pushed
            && self.size == other.size
            && self.info.is_same_segment(&other.info)
    }
}

/// Chunks pushed into one sink, sorted by start time and non-overlapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentInventory {
    chunks: Vec<BufferedChunk>,
}

impl SegmentInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> &[BufferedChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes held by every chunk.
    pub fn total_size(&self) -> usize {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Record a pushed media chunk, trimming what it overlaps.
    ///
    /// Init segments carry no media time and are ignored.
    pub fn insert_chunk(&mut self, info: SegmentContext, partially_pushed: bool, size: usize) {
        if info.segment.is_init {
            return;
        }
        let new_range = info.segment.time_range();
        if new_range.end <= new_range.start {
            return;
        }

        // Chunks of the same segment pushed in several parts merge into one.
        if let Some(existing) = self
            .chunks
            .iter_mut()
            .find(|c| c.info.is_same_segment(&info))
        {
            existing.partially_pushed = existing.partially_pushed && partially_pushed;
            existing.size += size;
            return;
        }

        let mut kept = Vec::with_capacity(self.chunks.len() + 2);
        for chunk in self.chunks.drain(..) {
            if !ranges::overlaps(&chunk.range(), &new_range) {
                kept.push(chunk);
                continue;
            }
            trace!(
                old_start = chunk.start,
                old_end = chunk.end,
                new_start = new_range.start,
                new_end = new_range.end,
                "inventory: trimming overlapped chunk"
            );
            if chunk.start < new_range.start {
                let mut left = chunk.clone();
                left.end = new_range.start;
                left.buffered_end = left.buffered_end.map(|e| e.min(new_range.start));
                kept.push(left);
            }
            if chunk.end > new_range.end {
                let mut right = chunk;
                right.start = new_range.end;
                right.buffered_start = right.buffered_start.map(|s| s.max(new_range.end));
                kept.push(right);
            }
        }

        let pos = kept
            .iter()
            .position(|c| c.start > new_range.start)
            .unwrap_or(kept.len());
        kept.insert(
            pos,
            BufferedChunk {
                start: new_range.start,
                end: new_range.end,
                buffered_start: None,
                buffered_end: None,
                partially_pushed,
                size,
                info,
            },
        );
        self.chunks = kept;
    }

    /// Every chunk of the segment in `info` has been pushed.
    pub fn complete_segment(&mut self, info: &SegmentContext) {
        for chunk in self
            .chunks
            .iter_mut()
            .filter(|c| c.info.is_same_segment(info))
        {
            chunk.partially_pushed = false;
        }
    }

    /// Reconcile with the ranges the platform reports.
    ///
    /// Buffered bounds are derived from the nominal ones, so calling this
    /// twice with the same ranges yields the same inventory. Chunks with
    /// (almost) nothing left buffered are dropped.
    pub fn synchronize_buffered(&mut self, buffered: &[Range<f64>]) {
        let before = self.chunks.len();
        self.chunks.retain_mut(|chunk| {
            let nominal = chunk.range();
            let overlapping: Vec<_> = buffered
                .iter()
                .filter(|r| ranges::overlaps(r, &nominal))
                .collect();
            let (Some(first), Some(last)) = (overlapping.first(), overlapping.last()) else {
                return false;
            };
            let start = nominal.start.max(first.start);
            let end = nominal.end.min(last.end);
            if end - start < MINIMUM_BUFFERED_DURATION {
                return false;
            }
            chunk.buffered_start = Some(start);
            chunk.buffered_end = Some(end);
            true
        });
        let removed = before - self.chunks.len();
        if removed > 0 {
            debug!(removed, remaining = self.chunks.len(), "inventory: garbage-collected chunks removed");
        }
    }

    /// Forget chunks entirely inside `[start, end)` and trim the others.
    pub fn remove_range(&mut self, start: f64, end: f64) {
        let removed = start..end;
        let mut kept = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks.drain(..) {
            if !ranges::overlaps(&chunk.range(), &removed) {
                kept.push(chunk);
                continue;
            }
            if chunk.start < start {
                let mut left = chunk.clone();
                left.end = start;
                left.buffered_end = left.buffered_end.map(|e| e.min(start));
                kept.push(left);
            }
            if chunk.end > end {
                let mut right = chunk;
                right.start = end;
                right.buffered_start = right.buffered_start.map(|s| s.max(end));
                kept.push(right);
            }
        }
        self.chunks = kept;
    }

    /// Merged ranges covered by the inventory.
    pub fn buffered_ranges(&self) -> Vec<Range<f64>> {
        let mut merged = Vec::new();
        for chunk in &self.chunks {
            ranges::insert_range(&mut merged, chunk.effective_range());
        }
        merged
    }
}
