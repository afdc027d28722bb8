// src/player.rs

use crate::audio::{PlaybackFlags, StreamHost, build_output_stream, setup_output_device};
use crate::clip::AudioClip;
use crate::decoder::{ClipDecoder, open_clip};
use crate::engine::backend::{PlaybackSession, PlaybackStatus};
use crate::error::{CoreError, CoreResult};
use ringbuf::{HeapRb, traits::Split};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;

/// One clip playing on the default output device.
pub struct ClipPlayer {
    host: StreamHost,
    decoder_handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    flags: PlaybackFlags,
    total_duration: Option<Duration>,
    output_sample_rate: u32,
    output_channels: usize,
}

impl ClipPlayer {
    /// Probe `clip` and start playing it immediately.
    pub fn new(clip: &AudioClip) -> CoreResult<Self> {
        // Probe first so a bad clip never touches the device.
        let opened = open_clip(clip)?;
        let total_duration = opened.duration();
        log::info!(
            "clip info: channels: {:?}, sample_rate: {:?}, duration: {:?}",
            opened.channels(),
            opened.sample_rate(),
            total_duration
        );

        // ~1.3 s of stereo at 48 kHz.
        let (producer, consumer) = HeapRb::<f32>::new(131_072).split();
        let flags = PlaybackFlags::default();

        let stream_flags = flags.clone();
        let (host, (output_channels, output_sample_rate)) = StreamHost::spawn(move || {
            let output = setup_output_device()?;
            let stream = build_output_stream(&output, consumer, stream_flags)?;
            Ok((stream, (output.channels, output.sample_rate)))
        })
        .map_err(|e| CoreError::session(format!("{e:#}")))?;

        let stop = Arc::new(AtomicBool::new(false));
        let decoder_handle = ClipDecoder::new(
            opened,
            producer,
            output_channels,
            output_sample_rate,
            stop.clone(),
            flags.decoder_done.clone(),
            flags.failed.clone(),
        )
        .spawn();

        Ok(Self {
            host,
            decoder_handle: Some(decoder_handle),
            stop,
            flags,
            total_duration,
            output_sample_rate,
            output_channels,
        })
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.decoder_handle.take() {
            h.thread().unpark();
            let _ = h.join();
        }
        self.host.shutdown();
    }
}

impl PlaybackSession for ClipPlayer {
    fn position(&self) -> Duration {
        let samples = self.flags.played_samples.load(Ordering::Relaxed) as f64;
        let frames = samples / self.output_channels.max(1) as f64;
        let secs = frames / self.output_sample_rate.max(1) as f64;
        match self.total_duration {
            Some(total) => Duration::from_secs_f64(secs).min(total),
            None => Duration::from_secs_f64(secs),
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.total_duration
    }

    fn status(&self) -> PlaybackStatus {
        if self.flags.failed.load(Ordering::Acquire) {
            PlaybackStatus::Failed
        } else if self.flags.drained.load(Ordering::Acquire) {
            PlaybackStatus::Completed
        } else {
            PlaybackStatus::Playing
        }
    }

    fn stop(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for ClipPlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
