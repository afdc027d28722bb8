// src/engine/state.rs

use crate::clip::AudioClip;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Recording,
    Playing,
}

/// What the display reads each tick. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineSnapshot {
    pub state: EngineState,
    pub current_time: f64,
    /// Maximum recording length while recording, clip length while playing.
    pub duration: f64,
    pub can_stop_recording: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop_recording` after the minimum hold.
    Manual,
    /// Hit the maximum recording length.
    MaxDuration,
    /// Playback started, or the engine was dropped, mid-recording.
    Interrupted,
    /// The input stream broke; whatever was captured is kept.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingFinished {
    pub clip: Option<AudioClip>,
    pub reason: StopReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Tick(EngineSnapshot),
    RecordingFinished(RecordingFinished),
    PlaybackStopped { completed: bool },
}
