// src/engine/backend.rs

use crate::clip::AudioClip;
use crate::error::{CoreError, CoreResult};
use crate::player::ClipPlayer;
use crate::recorder::Recorder;
use std::time::Duration;

/// A live microphone capture owned by the engine.
pub trait CaptureSession: Send {
    /// Audio captured so far, measured in samples written.
    fn elapsed(&self) -> Duration;

    /// The input stream reported an error; no more audio will arrive.
    fn has_failed(&self) -> bool;

    /// Stop capturing and return the encoded clip, `None` when nothing usable
    /// was captured.
    fn finish(self: Box<Self>) -> Option<AudioClip>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Completed,
    Failed,
}

/// A clip being played back to the output device.
pub trait PlaybackSession: Send {
    fn position(&self) -> Duration;

    /// Total length, once the container tells us.
    fn duration(&self) -> Option<Duration>;

    fn status(&self) -> PlaybackStatus;

    fn stop(self: Box<Self>);
}

/// Source of hardware sessions. The engine holds exactly one.
pub trait AudioBackend: Send {
    fn open_capture(&mut self) -> CoreResult<Box<dyn CaptureSession>>;

    fn open_playback(&mut self, clip: &AudioClip) -> CoreResult<Box<dyn PlaybackSession>>;
}

/// Default cpal devices for both directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_capture(&mut self) -> CoreResult<Box<dyn CaptureSession>> {
        let recorder = Recorder::start().map_err(|e| CoreError::session(format!("{e:#}")))?;
        Ok(Box::new(recorder))
    }

    fn open_playback(&mut self, clip: &AudioClip) -> CoreResult<Box<dyn PlaybackSession>> {
        Ok(Box::new(ClipPlayer::new(clip)?))
    }
}
