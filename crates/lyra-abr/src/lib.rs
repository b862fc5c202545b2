//! `lyra-abr`
//!
//! Adaptive bitrate selection seen from the engine: an estimator consumes a
//! track description, the Representation being loaded and a read-only
//! playback observer, and produces a stream of [`Estimate`]s. The engine
//! feeds request measurements back through [`AbrCallbacks`].
//!
//! [`ThroughputAbr`] is the default estimator: fast/slow EWMA bandwidth
//! estimation driving an [`AbrController`].

#![forbid(unsafe_code)]

mod contract;
mod controller;
mod estimator;
mod throughput;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(any(test, feature = "test-utils"))]
pub use contract::AbrCallbacksMock;
pub use contract::{
    AbrCallbacks, EstimatorContext, EstimatorOutput, NoopAbrCallbacks, RepresentationEstimator,
};
pub use controller::{AbrController, AbrDecision, AbrReason};
pub use estimator::{Estimator, ThroughputEstimator};
pub use throughput::ThroughputAbr;
pub use types::{
    AbrMode, AbrObservation, AbrOptions, Estimate, RequestId, RequestInfo, RequestMetrics,
    ThroughputSample, ThroughputSampleSource,
};
