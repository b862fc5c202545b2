#![forbid(unsafe_code)]

use lyra_buffer::SinkError;
use lyra_core::CancellationError;
use thiserror::Error;

/// Failure of a segment request.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("segment {0} has no URL")]
    MissingUrl(String),

    #[error("HTTP status {status} for segment {segment_id}")]
    Status { segment_id: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

/// Track-level streaming errors.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The sink rejected data or its memory budget is saturated.
    #[error("buffer full while loading representation {representation_id}")]
    BufferFull { representation_id: String },

    #[error("no playable representation in track {0}")]
    NoPlayableRepresentation(String),

    #[error("sink error: {0}")]
    Sink(SinkError),

    #[error("fetch error: {0}")]
    Fetch(FetchError),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn is_buffer_full(&self) -> bool {
        matches!(self, Self::BufferFull { .. })
    }
}

impl From<SinkError> for StreamError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Cancelled(reason) => Self::Cancelled(reason),
            err => Self::Sink(err),
        }
    }
}

impl From<FetchError> for StreamError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled(reason) => Self::Cancelled(reason),
            err => Self::Fetch(err),
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
