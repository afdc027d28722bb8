// src/recorder/input.rs

use crate::audio::DeviceConfig;
use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream};
use ringbuf::producer::Producer;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Shared between the input callback and the recorder.
#[derive(Clone, Default)]
pub struct InputFlags {
    pub failed: Arc<AtomicBool>,
    /// Mono samples lost because the ring was full.
    pub dropped: Arc<AtomicU64>,
}

/// Build a mono capture stream for whatever format the device delivers.
pub fn build_input_stream<P>(input: &DeviceConfig, producer: P, flags: InputFlags) -> Result<Stream>
where
    P: Producer<Item = f32> + Send + 'static,
{
    match input.sample_format {
        SampleFormat::F32 => build_stream::<f32, _>(input, producer, flags),
        SampleFormat::I16 => build_stream::<i16, _>(input, producer, flags),
        SampleFormat::U16 => build_stream::<u16, _>(input, producer, flags),
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    }
}

fn build_stream<T, P>(input: &DeviceConfig, mut producer: P, flags: InputFlags) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
    P: Producer<Item = f32> + Send + 'static,
{
    let channels = input.channels.max(1);
    let failed = flags.failed.clone();
    let err_fn = move |err: cpal::StreamError| {
        log::error!("input stream error: {err}");
        failed.store(true, Ordering::Release);
    };

    let mut mono: Vec<f32> = Vec::with_capacity(4096);
    let stream = input.device.build_input_stream(
        &input.config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            mono.clear();
            mono.extend(data.chunks_exact(channels).map(downmix::<T>));
            let n = producer.push_slice(&mono);
            if n < mono.len() {
                flags
                    .dropped
                    .fetch_add((mono.len() - n) as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn downmix<T>(frame: &[T]) -> f32
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
    sum / frame.len() as f32
}
