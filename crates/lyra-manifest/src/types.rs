#![forbid(unsafe_code)]

use std::fmt;

/// Media type of a track, and of the sink its segments are pushed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferType {
    Audio,
    Video,
    Text,
}

impl BufferType {
    pub const ALL: [BufferType; 3] = [Self::Audio, Self::Video, Self::Text];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
