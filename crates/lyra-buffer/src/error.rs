#![forbid(unsafe_code)]

use lyra_core::CancellationError;
use lyra_manifest::BufferType;
use thiserror::Error;

/// Failure reported by a platform decode buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("operation aborted")]
    Aborted,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{0} buffer is full")]
    BufferFull(BufferType),

    #[error("no sink implementation for buffer type {0}")]
    UnsupportedType(BufferType),

    #[error("{0} sink already created")]
    AlreadyCreated(BufferType),

    #[error("{0} sink was disabled")]
    Disabled(BufferType),

    #[error("{0} sink is disposed")]
    Disposed(BufferType),

    #[error("init segment {0} was not declared")]
    UnknownInitSegment(String),

    #[error("platform error on {buffer_type} buffer: {source}")]
    Platform {
        buffer_type: BufferType,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

impl SinkError {
    pub fn is_buffer_full(&self) -> bool {
        matches!(self, Self::BufferFull(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub(crate) fn from_platform(buffer_type: BufferType, source: PlatformError) -> Self {
        match source {
            PlatformError::QuotaExceeded => Self::BufferFull(buffer_type),
            source => Self::Platform {
                buffer_type,
                source,
            },
        }
    }
}

pub type SinkResult<T> = Result<T, SinkError>;
