// src/memo_controller.rs

use std::fmt::Write as FmtWrite;
use std::io::{Write, stdout};
use std::sync::mpsc::{Receiver, Sender, channel};

use crossterm::event::KeyCode;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate},
};
use tokio::runtime::Handle;

use crate::clip::AudioClip;
use crate::config::AppConfig;
use crate::engine::{EngineEvent, EngineSnapshot, EngineState, MemoEngine};
use crate::library::MemoLibrary;
use crate::store::{Item, ItemId, JsonItemStore};
use crate::waveform::{WaveformPipeline, WaveformReady, terminal::render_bars, threshold_index};

const COLUMNS: usize = 100;
const HEIGHT: usize = 12;

/// Terminal front-end: one photo, record a memo for it, play memos back.
pub struct MemoController {
    engine: MemoEngine,
    library: MemoLibrary,
    runtime: Handle,
    image: Vec<u8>,

    events: Receiver<EngineEvent>,
    saved_tx: Sender<ItemId>,
    saved_rx: Receiver<ItemId>,
    waveform_tx: Sender<WaveformReady<ItemId>>,
    waveform_rx: Receiver<WaveformReady<ItemId>>,

    /// Newest item; the one P plays.
    current: Option<Item>,
    item_count: usize,
    status: String,

    // Redraw only when something visible changed.
    cached_frame: Option<(EngineState, u64, Option<usize>)>,
    force_redraw: bool,
    draw_buffer: String,
}

impl MemoController {
    pub fn new(config: &AppConfig, image: Vec<u8>, runtime: Handle) -> anyhow::Result<Self> {
        let store = JsonItemStore::open(config.store_dir_or("memos"))?;
        let pipeline = WaveformPipeline::new(runtime.clone(), config.waveform.clone());
        let library = MemoLibrary::new(store, pipeline);
        let engine = MemoEngine::with_cpal(config.engine.clone());
        let events = engine.subscribe();

        let (saved_tx, saved_rx) = channel();
        let (waveform_tx, waveform_rx) = channel();

        // Older items may predate their summary; derive them in the background.
        library.request_missing_waveforms(waveform_tx.clone())?;

        let items = library.list_all()?;
        Ok(Self {
            engine,
            library,
            runtime,
            image,
            events,
            saved_tx,
            saved_rx,
            waveform_tx,
            waveform_rx,
            item_count: items.len(),
            current: items.into_iter().next(),
            status: String::from("ready"),
            cached_frame: None,
            force_redraw: true,
            draw_buffer: String::with_capacity(4096),
        })
    }

    pub fn run_tick(&mut self) -> anyhow::Result<()> {
        self.drain_channels()?;

        let snap = self.engine.snapshot();
        let threshold = self.threshold(&snap);
        let frame = (snap.state, (snap.current_time * 10.0) as u64, threshold);
        if self.cached_frame == Some(frame) && !self.force_redraw {
            return Ok(());
        }
        self.cached_frame = Some(frame);
        self.force_redraw = false;

        self.draw_buffer.clear();
        let _ = write!(self.draw_buffer, "{}", MoveTo(0, 0));

        let bars = self
            .current
            .as_ref()
            .and_then(|item| item.waveform.as_ref())
            .map(|w| w.resample_for_display(COLUMNS))
            .unwrap_or_default();
        let lines = if bars.is_empty() {
            vec![String::new(); HEIGHT]
        } else {
            render_bars(&bars, HEIGHT, threshold)
        };
        for line in &lines {
            let _ = write!(self.draw_buffer, "{line}\x1b[K\r\n");
        }

        let _ = write!(self.draw_buffer, "{}", Clear(ClearType::UntilNewLine));
        self.write_status_line(&snap);
        let _ = write!(
            self.draw_buffer,
            "\r\n{}{} | {} memos\r\n",
            Clear(ClearType::UntilNewLine),
            self.status,
            self.item_count
        );

        let mut stdout = stdout();
        execute!(stdout, BeginSynchronizedUpdate)?;
        stdout.write_all(self.draw_buffer.as_bytes())?;
        execute!(stdout, EndSynchronizedUpdate)?;
        stdout.flush()?;
        Ok(())
    }

    fn write_status_line(&mut self, snap: &EngineSnapshot) {
        let cur = snap.current_time as u64;
        let total = snap.duration as u64;
        match snap.state {
            EngineState::Recording => {
                let _ = write!(
                    self.draw_buffer,
                    "🔴 REC {:02}:{:02} / {:02}:{:02}",
                    cur / 60,
                    cur % 60,
                    total / 60,
                    total % 60
                );
                if !snap.can_stop_recording {
                    let left = (self.engine.config().min_hold_secs - snap.current_time).max(0.0);
                    let _ = write!(self.draw_buffer, "  (hold {left:.0}s more)");
                }
            }
            EngineState::Playing => {
                let _ = write!(
                    self.draw_buffer,
                    "▶️  {:02}:{:02} / {:02}:{:02}",
                    cur / 60,
                    cur % 60,
                    total / 60,
                    total % 60
                );
            }
            EngineState::Idle => {
                let _ = write!(self.draw_buffer, "⏹  idle");
            }
        }
    }

    fn threshold(&self, snap: &EngineSnapshot) -> Option<usize> {
        if snap.state != EngineState::Playing {
            return None;
        }
        threshold_index(snap.current_time, snap.duration, COLUMNS)
    }

    fn drain_channels(&mut self) -> anyhow::Result<()> {
        while let Ok(ev) = self.events.try_recv() {
            match ev {
                EngineEvent::RecordingFinished(done) => {
                    self.force_redraw = true;
                    match done.clip {
                        Some(clip) => {
                            self.status = format!("recorded ({:?}), saving...", done.reason);
                            self.save_in_background(clip);
                        }
                        None => self.status = format!("recording discarded ({:?})", done.reason),
                    }
                }
                EngineEvent::PlaybackStopped { completed } => {
                    self.force_redraw = true;
                    self.status = if completed { "played" } else { "stopped" }.to_string();
                }
                EngineEvent::Tick(_) => {}
            }
        }

        while let Ok(id) = self.saved_rx.try_recv() {
            self.force_redraw = true;
            self.item_count += 1;
            self.current = self.library.get(id)?;
            self.status = format!("saved {id}");
        }

        while let Ok(ready) = self.waveform_rx.try_recv() {
            let key = ready.key;
            if self.library.apply_waveform(ready)?
                && self.current.as_ref().is_some_and(|i| i.id == key)
            {
                self.current = self.library.get(key)?;
                self.force_redraw = true;
            }
        }
        Ok(())
    }

    fn save_in_background(&self, clip: AudioClip) {
        let library = self.library.clone();
        let image = self.image.clone();
        let saved_tx = self.saved_tx.clone();
        self.runtime.spawn(async move {
            match library.save_capture(image, clip).await {
                Ok(id) => {
                    let _ = saved_tx.send(id);
                }
                Err(e) => log::error!("failed to save capture: {e:#}"),
            }
        });
    }

    // -------------------------------------------------------------
    // Keys
    // -------------------------------------------------------------
    pub fn handle_key(&mut self, key: KeyCode) {
        self.force_redraw = true;
        match key {
            KeyCode::Char('r') | KeyCode::Char('R') => self.toggle_recording(),
            KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => self.toggle_playback(),
            KeyCode::Char('w') | KeyCode::Char('W') => {
                if let Err(e) = self.library.request_missing_waveforms(self.waveform_tx.clone()) {
                    self.status = format!("waveform refresh failed: {e}");
                }
            }
            _ => {}
        }
    }

    pub fn should_quit(&self, key: KeyCode) -> bool {
        matches!(key, KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc)
    }

    fn toggle_recording(&mut self) {
        if self.engine.state() == EngineState::Recording {
            // The finished event carries the clip; ignored stops are shown by the hold hint.
            let _ = self.engine.stop_recording();
            return;
        }
        if let Err(e) = self.engine.start_recording() {
            self.status = format!("cannot record: {e}");
        }
    }

    fn toggle_playback(&mut self) {
        if self.engine.state() == EngineState::Playing {
            self.engine.stop_playback();
            return;
        }
        let Some(item) = &self.current else {
            self.status = "nothing to play yet".to_string();
            return;
        };
        if let Err(e) = self.engine.start_playback(&item.audio) {
            self.status = format!("cannot play: {e}");
        }
    }
}
