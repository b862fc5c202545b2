//! `lyra-manifest`
//!
//! Normalized content model: a [`Manifest`] holds [`Period`]s, each period
//! holds tracks ([`Adaptation`]), each track holds encodings
//! ([`Representation`]) whose [`SegmentIndex`] lists the [`Segment`]s.
//!
//! Parsing concrete manifest formats is out of scope; parsers build these
//! types and the engine consumes them.

#![forbid(unsafe_code)]

mod content;
mod index;
mod manifest;
mod representation;
mod segment;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;

pub use content::{AdaptationContent, RepresentationContent, SegmentContext};
#[cfg(any(test, feature = "test-utils"))]
pub use index::SegmentIndexMock;
pub use index::{SegmentIndex, TimelineIndex};
pub use manifest::{Adaptation, Manifest, Period};
pub use representation::Representation;
pub use segment::Segment;
pub use types::BufferType;
