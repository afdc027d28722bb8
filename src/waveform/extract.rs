// src/waveform/extract.rs

use crate::clip::AudioClip;
use crate::decoder::open_clip;
use crate::error::{CoreError, CoreResult};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::errors::Error as SymphoniaError;

/// Per-block peak magnitudes of a decoded clip, each in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AmplitudeSequence(Vec<f32>);

impl AmplitudeSequence {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Running peak over one block of frames.
struct BlockPeak {
    block_frames: usize,
    in_block: usize,
    peak: f32,
    out: Vec<f32>,
}

impl BlockPeak {
    fn new(block_frames: usize) -> Self {
        Self {
            block_frames: block_frames.max(1),
            in_block: 0,
            peak: 0.0,
            out: Vec::new(),
        }
    }

    fn push_frame(&mut self, magnitude: f32) {
        if magnitude > self.peak {
            self.peak = magnitude;
        }
        self.in_block += 1;
        if self.in_block == self.block_frames {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.in_block > 0 {
            self.out.push(self.peak.clamp(0.0, 1.0));
            self.peak = 0.0;
            self.in_block = 0;
        }
    }

    fn finish(mut self) -> Vec<f32> {
        self.flush();
        self.out
    }
}

/// Decode `clip` and reduce it to one magnitude per `block_frames` frames.
///
/// A frame's magnitude is its loudest channel, full-scale normalized. This is a
/// full decode and must stay off latency-sensitive threads.
pub fn extract_amplitudes(clip: &AudioClip, block_frames: usize) -> CoreResult<AmplitudeSequence> {
    let mut opened = open_clip(clip)?;
    let mut decoder = opened.make_decoder()?;
    let track_id = opened.track_id;

    let mut blocks = BlockPeak::new(block_frames);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut frames_seen = 0u64;

    loop {
        let packet = match opened.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break, // end of stream
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(CoreError::decode(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) | Err(SymphoniaError::IoError(_)) => continue,
            Err(e) => return Err(CoreError::decode(e)),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let needs_alloc = sample_buf
            .as_ref()
            .is_none_or(|b| b.capacity() < decoded.capacity());
        if needs_alloc {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks(channels) {
            let magnitude = frame.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
            blocks.push_frame(magnitude);
            frames_seen += 1;
        }
    }

    if frames_seen == 0 {
        return Err(CoreError::EmptyInput);
    }
    Ok(AmplitudeSequence(blocks.finish()))
}
