#![forbid(unsafe_code)]

use lyra_manifest::BufferType;

/// Lifecycle events of the buffer sink store.
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    /// A sink was created for `buffer_type`.
    Created {
        buffer_type: BufferType,
        codec: String,
    },
    /// `buffer_type` was marked as deliberately unused.
    Disabled { buffer_type: BufferType },
    /// A sink's resources were released.
    Disposed { buffer_type: BufferType },
    /// An existing native sink was requested with a different codec.
    CodecMismatch {
        buffer_type: BufferType,
        current: String,
        requested: String,
    },
    /// Every native buffer type is now created or disabled.
    NativeBuffersUsable,
}
