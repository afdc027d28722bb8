// src/decoder/source.rs

use crate::clip::AudioClip;
use crate::error::{CoreError, CoreResult};
use std::time::Duration;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::default::{get_codecs, get_probe};

/// A probed clip: container reader plus the track we decode.
pub struct OpenedClip {
    pub format: Box<dyn FormatReader>,
    pub track_id: u32,
    pub codec_params: CodecParameters,
}

impl OpenedClip {
    pub fn make_decoder(&self) -> CoreResult<Box<dyn Decoder>> {
        get_codecs()
            .make(&self.codec_params, &DecoderOptions::default())
            .map_err(CoreError::decode)
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.codec_params.sample_rate
    }

    pub fn channels(&self) -> Option<usize> {
        self.codec_params.channels.map(|c| c.count())
    }

    /// Known only when the container declares its frame count.
    pub fn duration(&self) -> Option<Duration> {
        let frames = self.codec_params.n_frames?;
        let rate = self.codec_params.sample_rate?;
        if rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(frames as f64 / rate as f64))
    }
}

/// Probe an in-memory clip and pick its first decodable audio track.
pub fn open_clip(clip: &AudioClip) -> CoreResult<OpenedClip> {
    if clip.is_empty() {
        return Err(CoreError::EmptyInput);
    }

    let mss = MediaSourceStream::new(Box::new(clip.reader()), Default::default());
    let probed = get_probe()
        .format(
            &Default::default(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(CoreError::decode)?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CoreError::decode("no audio track"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    Ok(OpenedClip {
        format,
        track_id,
        codec_params,
    })
}
