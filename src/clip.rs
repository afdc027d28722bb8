// src/clip.rs

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// One finalized recording: an encoded container (WAV when recorded here)
/// carrying a single audio track. Immutable; clones share the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip {
    bytes: Arc<[u8]>,
}

impl AudioClip {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Seekable reader over the shared bytes, used to feed symphonia without copying.
    pub(crate) fn reader(&self) -> Cursor<Arc<[u8]>> {
        Cursor::new(self.bytes.clone())
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<Vec<u8>> for AudioClip {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}
