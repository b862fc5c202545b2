//! `lyra-core`
//!
//! Coordination primitives shared by every lyra component.
//!
//! The engine speaks exactly two concurrency words:
//! - [`CancelToken`]: "stop now", with synchronous cleanup callbacks and an
//!   async `cancelled()` future;
//! - [`SharedReference`]: "this value changed", readable at any time and
//!   observable through callbacks.
//!
//! Time-range helpers used for buffered-range bookkeeping live in [`ranges`].

#![forbid(unsafe_code)]

mod cancel;
mod error;
pub mod ranges;
mod shared_ref;

pub use cancel::{CancelGuard, CancelToken, Deregister};
pub use error::CancellationError;
pub use shared_ref::{ListenerHandle, SharedReference, UpdateOptions};
