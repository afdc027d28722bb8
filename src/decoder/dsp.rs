// src/decoder/dsp.rs

/// Per-channel staging area between decoded packets and the resampler, which
/// wants planar blocks of an exact size.
pub struct PlanarStage {
    channels: Vec<Vec<f32>>,
}

impl PlanarStage {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![Vec::with_capacity(4096); channels.max(1)],
        }
    }

    pub fn push_interleaved(&mut self, interleaved: &[f32]) {
        let n = self.channels.len();
        for frame in interleaved.chunks_exact(n) {
            for (ch, &s) in self.channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
    }

    /// Whole frames currently staged.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// Split off the first `frames` frames (fewer if not enough are staged).
    pub fn take(&mut self, frames: usize) -> Vec<Vec<f32>> {
        self.channels
            .iter_mut()
            .map(|ch| {
                let n = frames.min(ch.len());
                let tail = ch.split_off(n);
                std::mem::replace(ch, tail)
            })
            .collect()
    }

    pub fn take_all(&mut self) -> Option<Vec<Vec<f32>>> {
        match self.frames() {
            0 => None,
            n => Some(self.take(n)),
        }
    }
}

pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let channels = planar.len();
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels);
    for f in 0..frames {
        out.extend(planar.iter().map(|ch| ch[f]));
    }
    out
}

/// Convert interleaved audio between channel counts.
///
/// Mono fans out to every output channel; folding down averages neighbouring
/// input channels; anything else wraps input channels round-robin.
pub fn remix(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);

    for frame in input.chunks_exact(in_ch) {
        if in_ch == 1 {
            out.extend(std::iter::repeat_n(frame[0], out_ch));
        } else if out_ch < in_ch {
            let span = in_ch as f32 / out_ch as f32;
            for oc in 0..out_ch {
                let start = (oc as f32 * span).floor() as usize;
                let end = (((oc + 1) as f32 * span).ceil() as usize).min(in_ch);
                let group = &frame[start..end];
                out.push(group.iter().sum::<f32>() / group.len().max(1) as f32);
            }
        } else {
            out.extend((0..out_ch).map(|oc| frame[oc % in_ch]));
        }
    }
    out
}
