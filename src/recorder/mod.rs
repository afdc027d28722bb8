// src/recorder/mod.rs

pub mod clip_writer;
pub mod input;

use crate::audio::{StreamHost, setup_input_device};
use crate::clip::AudioClip;
use crate::engine::backend::CaptureSession;
use crate::recorder::{
    clip_writer::ClipWriter,
    input::{InputFlags, build_input_stream},
};
use anyhow::Result;
use ringbuf::{HeapRb, traits::Split};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::thread;
use std::time::Duration;

/// Microphone capture into an in-memory mono WAV.
pub struct Recorder {
    host: StreamHost,
    writer_handle: Option<thread::JoinHandle<Result<Vec<u8>>>>,
    stop: Arc<AtomicBool>,
    flags: InputFlags,
    record_samples: Arc<AtomicU64>,
    sample_rate: u32,
}

impl Recorder {
    /// Open the default input device and start capturing.
    pub fn start() -> Result<Self> {
        // A few seconds of slack at 48 kHz mono.
        let (producer, consumer) = HeapRb::<f32>::new(192_000).split();
        let flags = InputFlags::default();

        let stream_flags = flags.clone();
        let (host, sample_rate) = StreamHost::spawn(move || {
            let input = setup_input_device()?;
            let stream = build_input_stream(&input, producer, stream_flags)?;
            Ok((stream, input.sample_rate))
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let record_samples = Arc::new(AtomicU64::new(0));
        let writer = ClipWriter::new(sample_rate);
        let writer_stop = stop.clone();
        let writer_samples = record_samples.clone();
        let writer_handle =
            thread::spawn(move || writer.run(consumer, writer_stop, writer_samples));

        log::info!("recording started at {sample_rate} Hz");

        Ok(Self {
            host,
            writer_handle: Some(writer_handle),
            stop,
            flags,
            record_samples,
            sample_rate,
        })
    }

    /// Recording time based on samples written and input sample rate.
    pub fn get_record_time(&self) -> Duration {
        let samples = self.record_samples.load(Ordering::Relaxed) as f64;
        Duration::from_secs_f64(samples / self.sample_rate.max(1) as f64)
    }

    /// Stop capture, flush the ring into the writer and return the WAV bytes.
    fn stop_and_collect(&mut self) -> Option<Vec<u8>> {
        // Silence the input first so the writer sees a ring that only drains.
        self.host.shutdown();
        self.stop.store(true, Ordering::Release);

        let handle = self.writer_handle.take()?;
        handle.thread().unpark();
        let dropped = self.flags.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            log::warn!("capture ring overflowed, {dropped} samples lost");
        }
        match handle.join() {
            Ok(Ok(bytes)) => Some(bytes),
            Ok(Err(e)) => {
                log::error!("recorder writer failed: {e:#}");
                None
            }
            Err(_) => {
                log::error!("recorder writer thread panicked");
                None
            }
        }
    }
}

impl CaptureSession for Recorder {
    fn elapsed(&self) -> Duration {
        self.get_record_time()
    }

    fn has_failed(&self) -> bool {
        self.flags.failed.load(Ordering::Acquire)
    }

    fn finish(mut self: Box<Self>) -> Option<AudioClip> {
        let bytes = self.stop_and_collect()?;
        if self.record_samples.load(Ordering::Relaxed) == 0 {
            log::debug!("recording captured no samples");
            return None;
        }
        Some(AudioClip::from_bytes(bytes))
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.writer_handle.is_some() {
            let _ = self.stop_and_collect();
        }
    }
}
