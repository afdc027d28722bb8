// src/library.rs

use crate::clip::AudioClip;
use crate::store::{Item, ItemId, ItemStore};
use crate::waveform::{WaveformPipeline, WaveformReady};
use anyhow::Result;
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Saved captures plus their waveforms.
///
/// New captures get their summary before they are written. Items stored
/// without one are filled in lazily through [`MemoLibrary::request_missing_waveforms`]
/// and [`MemoLibrary::apply_waveform`].
#[derive(Clone)]
pub struct MemoLibrary {
    store: Arc<dyn ItemStore>,
    pipeline: WaveformPipeline<ItemId>,
}

impl MemoLibrary {
    pub fn new(store: impl ItemStore + 'static, pipeline: WaveformPipeline<ItemId>) -> Self {
        Self {
            store: Arc::new(store),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &WaveformPipeline<ItemId> {
        &self.pipeline
    }

    /// Summarize `clip`, then persist it with `image`.
    ///
    /// A clip that cannot be summarized is still saved, without a waveform.
    pub async fn save_capture(&self, image: Vec<u8>, clip: AudioClip) -> Result<ItemId> {
        let summary = self.pipeline.summarize(clip.clone()).await;
        if summary.is_none() {
            log::warn!("saving capture without a waveform");
        }
        self.store.save(clip, summary, image)
    }

    /// Queue extraction for every stored item lacking a summary.
    /// Returns how many requests were actually queued.
    pub fn request_missing_waveforms(
        &self,
        deliver: Sender<WaveformReady<ItemId>>,
    ) -> Result<usize> {
        let mut queued = 0;
        for item in self.store.list_all()? {
            if item.waveform.is_some() {
                continue;
            }
            if self.pipeline.request(item.id, item.audio, deliver.clone()) {
                queued += 1;
            }
        }
        if queued > 0 {
            log::debug!("queued {queued} waveform extractions");
        }
        Ok(queued)
    }

    /// Store a delivered summary. `false` if there was none, or the item
    /// already has one, or it was deleted meanwhile.
    pub fn apply_waveform(&self, ready: WaveformReady<ItemId>) -> Result<bool> {
        match ready.summary {
            Some(summary) => self.store.set_waveform(ready.key, summary),
            None => Ok(false),
        }
    }

    pub fn list_all(&self) -> Result<Vec<Item>> {
        self.store.list_all()
    }

    pub fn get(&self, id: ItemId) -> Result<Option<Item>> {
        self.store.get(id)
    }

    pub fn delete(&self, id: ItemId) -> Result<bool> {
        self.store.delete(id)
    }
}
