use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use crate::SegmentIndex;

/// One encoding (quality level) of a track.
///
/// Support and decipherability are tri-state: `None` means "not known yet".
/// They are updated in place by the decryption and capability layers.
pub struct Representation {
    pub id: String,
    /// Bits per second.
    pub bitrate: u64,
    pub codec: Option<String>,
    pub mime_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub index: Arc<dyn SegmentIndex>,
    status: RwLock<PlayableStatus>,
}

#[derive(Clone, Copy, Debug, Default)]
struct PlayableStatus {
    supported: Option<bool>,
    decipherable: Option<bool>,
}

impl Representation {
    pub fn new<S: Into<String>>(id: S, bitrate: u64, index: Arc<dyn SegmentIndex>) -> Self {
        Self {
            id: id.into(),
            bitrate,
            codec: None,
            mime_type: None,
            width: None,
            height: None,
            index,
            status: RwLock::new(PlayableStatus {
                supported: Some(true),
                decipherable: None,
            }),
        }
    }

    pub fn with_codec<S: Into<String>>(mut self, codec: S) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn is_supported(&self) -> Option<bool> {
        self.status.read().supported
    }

    pub fn set_supported(&self, supported: Option<bool>) {
        self.status.write().supported = supported;
    }

    pub fn decipherable(&self) -> Option<bool> {
        self.status.read().decipherable
    }

    pub fn set_decipherable(&self, decipherable: Option<bool>) {
        self.status.write().decipherable = decipherable;
    }

    /// Playable unless known to be unsupported or undecipherable.
    pub fn is_playable(&self) -> bool {
        let status = *self.status.read();
        status.supported != Some(false) && status.decipherable != Some(false)
    }

    /// `mime;codecs="..."` string used to create a sink for this encoding.
    pub fn content_type(&self) -> String {
        let mime = self.mime_type.as_deref().unwrap_or("");
        match self.codec.as_deref() {
            Some(codec) => format!("{mime};codecs=\"{codec}\""),
            None => mime.to_string(),
        }
    }
}

impl fmt::Debug for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Representation")
            .field("id", &self.id)
            .field("bitrate", &self.bitrate)
            .field("codec", &self.codec)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}
