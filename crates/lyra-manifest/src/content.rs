//! Back-references from engine objects to the content they carry.

use std::sync::Arc;

use crate::{Adaptation, BufferType, Manifest, Period, Representation, Segment};

/// A track in a period of a manifest.
#[derive(Clone, Debug)]
pub struct AdaptationContent {
    pub manifest: Arc<Manifest>,
    pub period: Arc<Period>,
    pub adaptation: Arc<Adaptation>,
}

impl AdaptationContent {
    pub fn new(manifest: Arc<Manifest>, period: Arc<Period>, adaptation: Arc<Adaptation>) -> Self {
        Self {
            manifest,
            period,
            adaptation,
        }
    }

    pub fn buffer_type(&self) -> BufferType {
        self.adaptation.buffer_type
    }

    pub fn with_representation(&self, representation: Arc<Representation>) -> RepresentationContent {
        RepresentationContent {
            manifest: Arc::clone(&self.manifest),
            period: Arc::clone(&self.period),
            adaptation: Arc::clone(&self.adaptation),
            representation,
        }
    }
}

/// One encoding of a track in a period of a manifest.
#[derive(Clone, Debug)]
pub struct RepresentationContent {
    pub manifest: Arc<Manifest>,
    pub period: Arc<Period>,
    pub adaptation: Arc<Adaptation>,
    pub representation: Arc<Representation>,
}

impl RepresentationContent {
    pub fn buffer_type(&self) -> BufferType {
        self.adaptation.buffer_type
    }

    pub fn segment_context(&self, segment: Segment) -> SegmentContext {
        SegmentContext {
            period: Arc::clone(&self.period),
            adaptation: Arc::clone(&self.adaptation),
            representation: Arc::clone(&self.representation),
            segment,
        }
    }
}

/// Which segment of which encoding a buffered chunk came from.
#[derive(Clone, Debug)]
pub struct SegmentContext {
    pub period: Arc<Period>,
    pub adaptation: Arc<Adaptation>,
    pub representation: Arc<Representation>,
    pub segment: Segment,
}

impl SegmentContext {
    pub fn is_same_representation(&self, other: &RepresentationContent) -> bool {
        self.period.id == other.period.id
            && self.adaptation.id == other.adaptation.id
            && self.representation.id == other.representation.id
    }

    pub fn is_same_segment(&self, other: &SegmentContext) -> bool {
        self.period.id == other.period.id
            && self.adaptation.id == other.adaptation.id
            && self.representation.id == other.representation.id
            && self.segment.id == other.segment.id
    }
}
