#![forbid(unsafe_code)]

use crate::{SinkEvent, StreamEvent};

/// Any event published by the engine.
#[derive(Clone, Debug)]
pub enum Event {
    Stream(StreamEvent),
    Sink(SinkEvent),
}

impl From<StreamEvent> for Event {
    fn from(e: StreamEvent) -> Self {
        Self::Stream(e)
    }
}

impl From<SinkEvent> for Event {
    fn from(e: SinkEvent) -> Self {
        Self::Sink(e)
    }
}
