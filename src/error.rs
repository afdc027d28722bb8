// src/error.rs

use thiserror::Error;

/// Failures surfaced by the capture/playback core.
///
/// Session errors are returned synchronously by the engine. Decode errors never
/// leave the waveform pipeline; they become "no summary" there.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The audio device could not be acquired (no device, permission, busy).
    #[error("audio session unavailable: {0}")]
    SessionUnavailable(String),

    /// The clip could not be probed or has no decodable audio track.
    #[error("failed to decode clip: {0}")]
    DecodeFailed(String),

    /// The clip (or the decoded signal) holds no audio.
    #[error("clip contains no audio")]
    EmptyInput,
}

impl CoreError {
    pub fn session(err: impl std::fmt::Display) -> Self {
        Self::SessionUnavailable(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::DecodeFailed(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
