// src/audio.rs

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::consumer::Consumer;
use std::sync::{
    Arc, mpsc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Device plus the negotiated stream layout.
pub struct DeviceConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub channels: usize,
    pub sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> anyhow::Result<DeviceConfig> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;
    let supported = device
        .default_output_config()
        .context("querying output config")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    log::info!(
        "output device: channels: {}, sample_rate: {}",
        config.channels,
        config.sample_rate.0
    );

    Ok(DeviceConfig {
        channels: config.channels as usize,
        sample_rate: config.sample_rate.0,
        device,
        config,
        sample_format,
    })
}

/// Finds the default microphone and its config.
pub fn setup_input_device() -> anyhow::Result<DeviceConfig> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    let supported = device
        .default_input_config()
        .context("querying input config")?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    log::info!(
        "input device: channels: {}, sample_rate: {}",
        config.channels,
        config.sample_rate.0
    );

    Ok(DeviceConfig {
        channels: config.channels as usize,
        sample_rate: config.sample_rate.0,
        device,
        config,
        sample_format,
    })
}

/// Counters shared between the output callback and the player.
#[derive(Clone, Default)]
pub struct PlaybackFlags {
    /// Samples (not frames) actually handed to the device.
    pub played_samples: Arc<AtomicU64>,
    /// Raised by the decoder once it will push nothing more.
    pub decoder_done: Arc<AtomicBool>,
    /// Raised by the callback once the decoder is done and the ring is empty.
    pub drained: Arc<AtomicBool>,
    pub failed: Arc<AtomicBool>,
}

pub fn build_output_stream<C>(
    output: &DeviceConfig,
    consumer: C,
    flags: PlaybackFlags,
) -> anyhow::Result<Stream>
where
    C: Consumer<Item = f32> + Send + 'static,
{
    let DeviceConfig {
        device,
        config,
        sample_format,
        ..
    } = output;
    match sample_format {
        SampleFormat::F32 => build_stream::<f32, _>(device, config, consumer, flags),
        SampleFormat::I16 => build_stream::<i16, _>(device, config, consumer, flags),
        SampleFormat::U16 => build_stream::<u16, _>(device, config, consumer, flags),
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    }
}

fn build_stream<T, C>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: C,
    flags: PlaybackFlags,
) -> anyhow::Result<Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
    C: Consumer<Item = f32> + Send + 'static,
{
    let failed = flags.failed.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("output stream error: {err}");
        failed.store(true, Ordering::Release);
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut played = 0u64;
                for out in data.iter_mut() {
                    // Read `done` before popping: an empty pop after a done flag
                    // means nothing else is coming.
                    let done = flags.decoder_done.load(Ordering::Acquire);
                    let s = match consumer.try_pop() {
                        Some(s) => {
                            played += 1;
                            s
                        }
                        None => {
                            if done {
                                flags.drained.store(true, Ordering::Release);
                            }
                            0.0
                        }
                    };
                    *out = T::from_sample(s);
                }
                flags.played_samples.fetch_add(played, Ordering::Relaxed);
            },
            err_fn,
            None,
        )
        .map_err(Into::into)
}

/// Owns a running cpal stream on a dedicated thread.
///
/// Streams cannot cross threads on every platform, so the stream is built,
/// played and dropped on the host thread; only the stop flag is shared.
pub struct StreamHost {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamHost {
    /// Run `build` on a fresh thread and wait until the stream is playing.
    pub fn spawn<F, R>(build: F) -> anyhow::Result<(Self, R)>
    where
        F: FnOnce() -> anyhow::Result<(Stream, R)> + Send + 'static,
        R: Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<anyhow::Result<R>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let handle = thread::spawn(move || {
            let started = build().and_then(|(stream, info)| {
                stream.play()?;
                Ok((stream, info))
            });
            let stream = match started {
                Ok((stream, info)) => {
                    let _ = ready_tx.send(Ok(info));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            while !stop_thread.load(Ordering::Acquire) {
                thread::park_timeout(Duration::from_millis(50));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(info)) => Ok((
                Self {
                    stop,
                    handle: Some(handle),
                },
                info,
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("audio stream thread exited before starting"))
            }
        }
    }

    /// Stop and drop the stream. Blocks until the host thread is gone.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            h.thread().unpark();
            let _ = h.join();
        }
    }
}

impl Drop for StreamHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
