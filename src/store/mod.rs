// src/store/mod.rs

pub mod json;
pub mod memory;

pub use json::JsonItemStore;
pub use memory::MemoryItemStore;

use crate::clip::AudioClip;
use crate::waveform::WaveformSummary;
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type ItemId = Uuid;

/// One capture: the photo, its voice memo and (once known) the memo's summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub created_at: DateTime<Utc>,
    pub image: Vec<u8>,
    pub audio: AudioClip,
    pub waveform: Option<WaveformSummary>,
}

/// Persistence for captured items.
///
/// A stored summary is final: `set_waveform` only fills a missing one.
pub trait ItemStore: Send + Sync {
    fn save(
        &self,
        audio: AudioClip,
        waveform: Option<WaveformSummary>,
        image: Vec<u8>,
    ) -> Result<ItemId>;

    /// `false` when no such item exists.
    fn delete(&self, id: ItemId) -> Result<bool>;

    /// Newest first.
    fn list_all(&self) -> Result<Vec<Item>>;

    fn get(&self, id: ItemId) -> Result<Option<Item>>;

    /// Returns `true` only if the summary was stored now.
    fn set_waveform(&self, id: ItemId, summary: WaveformSummary) -> Result<bool>;
}
