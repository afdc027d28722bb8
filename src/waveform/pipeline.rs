// src/waveform/pipeline.rs

use crate::clip::AudioClip;
use crate::config::WaveformConfig;
use crate::waveform::{WaveformSummary, extract_amplitudes};
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;

/// Result of one `WaveformPipeline::request`, delivered exactly once.
#[derive(Debug, Clone)]
pub struct WaveformReady<K> {
    pub key: K,
    /// `None` when the clip could not be decoded; show a neutral waveform.
    pub summary: Option<WaveformSummary>,
}

/// Extract + downsample on the calling thread. Failures become `None`.
pub fn summarize_clip(clip: &AudioClip, config: &WaveformConfig) -> Option<WaveformSummary> {
    match extract_amplitudes(clip, config.block_frames) {
        Ok(amplitudes) => Some(WaveformSummary::from_amplitudes(
            &amplitudes,
            config.summary_len,
        )),
        Err(e) => {
            log::debug!("no waveform for clip ({} bytes): {e}", clip.len());
            None
        }
    }
}

/// Runs waveform extraction on tokio's blocking pool and hands results back
/// without ever blocking the caller.
#[derive(Clone)]
pub struct WaveformPipeline<K = uuid::Uuid> {
    runtime: Handle,
    config: WaveformConfig,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

/// Clears a key from the in-flight set on every exit path.
struct InFlightGuard<K: Eq + Hash> {
    set: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<K> WaveformPipeline<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(runtime: Handle, config: WaveformConfig) -> Self {
        Self {
            runtime,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &WaveformConfig {
        &self.config
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Summarize `clip` in the background and await the result.
    pub async fn summarize(&self, clip: AudioClip) -> Option<WaveformSummary> {
        let config = self.config.clone();
        match self
            .runtime
            .spawn_blocking(move || summarize_clip(&clip, &config))
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                log::warn!("waveform worker did not complete: {e}");
                None
            }
        }
    }

    /// Queue extraction for `key` and send the result on `deliver`.
    ///
    /// Returns `false` (and does nothing) if the same key is already in flight.
    /// The consumer drains `deliver` on whichever thread owns its visible state.
    pub fn request(&self, key: K, clip: AudioClip, deliver: Sender<WaveformReady<K>>) -> bool {
        {
            let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !set.insert(key.clone()) {
                return false;
            }
        }

        let guard = InFlightGuard {
            set: self.in_flight.clone(),
            key: key.clone(),
        };
        let config = self.config.clone();
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let summary = runtime
                .spawn_blocking(move || summarize_clip(&clip, &config))
                .await
                .unwrap_or_else(|e| {
                    log::warn!("waveform worker did not complete: {e}");
                    None
                });
            drop(guard);
            // A dropped receiver just means nobody needs the result any more.
            let _ = deliver.send(WaveformReady { key, summary });
        });
        true
    }
}
