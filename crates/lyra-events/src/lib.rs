#![forbid(unsafe_code)]

//! Event bus for the lyra streaming engine.
//!
//! Adaptation streams publish [`StreamEvent`]s, the buffer sink store
//! publishes [`SinkEvent`]s. Both reach callers through one [`EventBus`].

mod bus;
mod event;
mod sink;
mod stream;

pub use bus::EventBus;
pub use event::Event;
pub use sink::SinkEvent;
pub use stream::{StreamEvent, TrackOutcome};
