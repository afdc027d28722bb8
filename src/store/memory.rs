// src/store/memory.rs

use super::{Item, ItemId, ItemStore};
use crate::clip::AudioClip;
use crate::waveform::WaveformSummary;
use anyhow::Result;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Process-local store, oldest item first internally.
#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<Vec<Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, Vec<Item>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ItemStore for MemoryItemStore {
    fn save(
        &self,
        audio: AudioClip,
        waveform: Option<WaveformSummary>,
        image: Vec<u8>,
    ) -> Result<ItemId> {
        let id = Uuid::new_v4();
        self.items().push(Item {
            id,
            created_at: Utc::now(),
            image,
            audio,
            waveform,
        });
        Ok(id)
    }

    fn delete(&self, id: ItemId) -> Result<bool> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|item| item.id != id);
        Ok(items.len() != before)
    }

    fn list_all(&self) -> Result<Vec<Item>> {
        Ok(self.items().iter().rev().cloned().collect())
    }

    fn get(&self, id: ItemId) -> Result<Option<Item>> {
        Ok(self.items().iter().find(|item| item.id == id).cloned())
    }

    fn set_waveform(&self, id: ItemId, summary: WaveformSummary) -> Result<bool> {
        let mut items = self.items();
        match items.iter_mut().find(|item| item.id == id) {
            Some(item) if item.waveform.is_none() => {
                item.waveform = Some(summary);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(tag: &str) -> AudioClip {
        AudioClip::from_bytes(tag.as_bytes().to_vec())
    }

    #[test]
    fn lists_newest_first_and_deletes() {
        let store = MemoryItemStore::new();
        let first = store.save(clip("a"), None, vec![1]).unwrap();
        let second = store.save(clip("b"), None, vec![2]).unwrap();

        let ids: Vec<_> = store.list_all().unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second, first]);

        assert!(store.delete(first).unwrap());
        assert!(!store.delete(first).unwrap());
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert_eq!(store.get(first).unwrap(), None);
    }

    #[test]
    fn waveform_is_written_once() {
        let store = MemoryItemStore::new();
        let id = store.save(clip("a"), None, Vec::new()).unwrap();

        let first = WaveformSummary::from_values(vec![0.5; 4]);
        let second = WaveformSummary::from_values(vec![1.0; 4]);
        assert!(store.set_waveform(id, first.clone()).unwrap());
        assert!(!store.set_waveform(id, second).unwrap());
        assert_eq!(store.get(id).unwrap().unwrap().waveform, Some(first));
        assert!(!store.set_waveform(Uuid::new_v4(), WaveformSummary::default()).unwrap());
    }
}
