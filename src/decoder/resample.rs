// src/decoder/resample.rs

use crate::decoder::dsp::PlanarStage;
use anyhow::Result;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    calculate_cutoff,
};

/// Clip rate → device rate converter. `None` when the rates already match.
pub fn build_resampler(
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
) -> Result<Option<SincFixedIn<f32>>> {
    if src_rate == dst_rate || src_rate == 0 {
        return Ok(None);
    }
    // Speech memos: a shorter sinc than music playback is plenty.
    let sinc_len = 128usize;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window,
    };
    let ratio = dst_rate as f64 / src_rate as f64;
    Ok(Some(SincFixedIn::<f32>::new(ratio, 1.0, params, 1024, channels)?))
}

/// Run the resampler once if a full input block is staged.
pub fn process_ready(
    resampler: &mut SincFixedIn<f32>,
    stage: &mut PlanarStage,
) -> Result<Option<Vec<Vec<f32>>>> {
    let need = resampler.input_frames_next();
    if stage.frames() < need {
        return Ok(None);
    }
    let block = stage.take(need);
    Ok(Some(resampler.process(&block, None)?))
}

/// Push the staged tail and the filter delay out at end of stream.
pub fn flush(resampler: &mut SincFixedIn<f32>, stage: &mut PlanarStage) -> Result<Vec<Vec<f32>>> {
    let mut out: Vec<Vec<f32>> = Vec::new();
    if let Some(tail) = stage.take_all() {
        out = resampler.process_partial(Some(tail.as_slice()), None)?;
    }
    let delay = resampler.process_partial::<Vec<f32>>(None, None)?;
    if out.is_empty() {
        return Ok(delay);
    }
    for (ch, extra) in out.iter_mut().zip(delay) {
        ch.extend(extra);
    }
    Ok(out)
}
