// src/lib.rs

pub mod audio;
pub mod clip;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod library;
pub mod memo_controller;
mod player;
pub mod recorder;
pub mod store;
pub mod waveform;

pub use clip::AudioClip;
pub use config::{AppConfig, EngineConfig, WaveformConfig};
pub use engine::{EngineEvent, EngineSnapshot, EngineState, MemoEngine, StopReason};
pub use error::{CoreError, CoreResult};
pub use library::MemoLibrary;
pub use player::ClipPlayer;
pub use recorder::Recorder;
pub use store::{Item, ItemId, ItemStore, JsonItemStore, MemoryItemStore};
pub use waveform::{WaveformPipeline, WaveformSummary, downsample};
