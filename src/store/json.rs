// src/store/json.rs

use super::{Item, ItemId, ItemStore};
use crate::clip::AudioClip;
use crate::waveform::WaveformSummary;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const MANIFEST: &str = "items.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ItemRecord {
    id: ItemId,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    waveform: Option<WaveformSummary>,
}

#[derive(Serialize, Deserialize, Default)]
struct StoreManifest {
    version: u32,
    /// Oldest first.
    items: Vec<ItemRecord>,
}

/// Directory-backed store: `items.json` plus `<id>.audio` / `<id>.image` blobs.
pub struct JsonItemStore {
    dir: PathBuf,
    manifest: Mutex<StoreManifest>,
}

impl JsonItemStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

        let manifest = match File::open(dir.join(MANIFEST)) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("reading {}", dir.join(MANIFEST).display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => StoreManifest {
                version: 1,
                items: Vec::new(),
            },
            Err(e) => return Err(e.into()),
        };

        log::debug!(
            "opened item store at {} ({} items)",
            dir.display(),
            manifest.items.len()
        );
        Ok(Self {
            dir,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest(&self) -> MutexGuard<'_, StoreManifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn blob_path(&self, id: ItemId, kind: &str) -> PathBuf {
        self.dir.join(format!("{id}.{kind}"))
    }

    /// Write-then-rename so a crash never leaves a half-written manifest.
    fn save_manifest(&self, manifest: &StoreManifest) -> Result<()> {
        let tmp = self.dir.join(format!("{MANIFEST}.tmp"));
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, manifest)?;
        }
        fs::rename(&tmp, self.dir.join(MANIFEST))?;
        Ok(())
    }

    fn load_item(&self, record: &ItemRecord) -> Result<Item> {
        let audio = fs::read(self.blob_path(record.id, "audio"))
            .with_context(|| format!("reading audio for {}", record.id))?;
        let image = match fs::read(self.blob_path(record.id, "image")) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Item {
            id: record.id,
            created_at: record.created_at,
            image,
            audio: AudioClip::from_bytes(audio),
            waveform: record.waveform.clone(),
        })
    }

    fn remove_blob(&self, id: ItemId, kind: &str) -> Result<()> {
        match fs::remove_file(self.blob_path(id, kind)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl ItemStore for JsonItemStore {
    fn save(
        &self,
        audio: AudioClip,
        waveform: Option<WaveformSummary>,
        image: Vec<u8>,
    ) -> Result<ItemId> {
        let id = Uuid::new_v4();
        fs::write(self.blob_path(id, "audio"), audio.as_bytes())?;
        fs::write(self.blob_path(id, "image"), &image)?;

        let mut manifest = self.manifest();
        manifest.items.push(ItemRecord {
            id,
            created_at: Utc::now(),
            waveform,
        });
        self.save_manifest(&manifest)?;
        log::info!("saved item {id} ({} audio bytes)", audio.len());
        Ok(id)
    }

    fn delete(&self, id: ItemId) -> Result<bool> {
        let mut manifest = self.manifest();
        let Some(pos) = manifest.items.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        manifest.items.remove(pos);
        self.save_manifest(&manifest)?;
        self.remove_blob(id, "audio")?;
        self.remove_blob(id, "image")?;
        Ok(true)
    }

    fn list_all(&self) -> Result<Vec<Item>> {
        let records = self.manifest().items.clone();
        records.iter().rev().map(|r| self.load_item(r)).collect()
    }

    fn get(&self, id: ItemId) -> Result<Option<Item>> {
        let record = self.manifest().items.iter().find(|r| r.id == id).cloned();
        record.map(|r| self.load_item(&r)).transpose()
    }

    fn set_waveform(&self, id: ItemId, summary: WaveformSummary) -> Result<bool> {
        let mut manifest = self.manifest();
        match manifest.items.iter_mut().find(|r| r.id == id) {
            Some(record) if record.waveform.is_none() => record.waveform = Some(summary),
            _ => return Ok(false),
        }
        self.save_manifest(&manifest)?;
        Ok(true)
    }
}
