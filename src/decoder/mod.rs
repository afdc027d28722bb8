// src/decoder/mod.rs

pub mod dsp;
pub mod output;
pub mod resample;
pub mod source;

use crate::decoder::dsp::PlanarStage;
use crate::decoder::source::OpenedClip;
use ringbuf::traits::Producer as RbProducer;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::errors::Error as SymphoniaError;

pub use source::open_clip;

/// Feeds one probed clip into the output ring at the device's rate and layout.
///
/// `done` is raised whenever the thread exits, whether the clip ran out, the
/// stream broke, or `stop` was requested. A decode or resample error also
/// raises `failed`, before `done`.
pub struct ClipDecoder<P>
where
    P: RbProducer<Item = f32> + Send + 'static,
{
    clip: OpenedClip,
    producer: P,
    output_channels: usize,
    output_sample_rate: u32,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

struct DoneOnDrop(Arc<AtomicBool>);

impl Drop for DoneOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl<P> ClipDecoder<P>
where
    P: RbProducer<Item = f32> + Send + 'static,
{
    pub fn new(
        clip: OpenedClip,
        producer: P,
        output_channels: usize,
        output_sample_rate: u32,
        stop: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
        failed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            clip,
            producer,
            output_channels: output_channels.max(1),
            output_sample_rate,
            stop,
            done,
            failed,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || {
            let _done = DoneOnDrop(self.done.clone());
            let failed = self.failed.clone();
            if let Err(e) = self.run() {
                log::warn!("clip decoder stopped early: {e:#}");
                failed.store(true, Ordering::Release);
            }
        })
    }

    fn run(mut self) -> anyhow::Result<()> {
        let mut decoder = self.clip.make_decoder()?;
        let src_rate = self.clip.sample_rate().unwrap_or(self.output_sample_rate);
        let out_ch = self.output_channels;

        let mut resampler = resample::build_resampler(src_rate, self.output_sample_rate, out_ch)?;
        let mut stage = PlanarStage::new(out_ch);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        log::debug!(
            "decoding clip: {src_rate} Hz -> {} Hz, {out_ch} ch",
            self.output_sample_rate
        );

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }

            let packet = match self.clip.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.clip.track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::debug!("skipping undecodable packet: {e}");
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(e.into()),
            };

            let decoded_ch = decoded.spec().channels.count();
            let too_small = sample_buf
                .as_ref()
                .is_none_or(|b| b.capacity() < decoded.capacity());
            if too_small {
                sample_buf = Some(SampleBuffer::<f32>::new(
                    decoded.capacity() as u64,
                    *decoded.spec(),
                ));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);
            let mixed = dsp::remix(buf.samples(), decoded_ch, out_ch);

            match resampler.as_mut() {
                Some(r) => {
                    stage.push_interleaved(&mixed);
                    while let Some(block) = resample::process_ready(r, &mut stage)? {
                        if !self.push(&dsp::interleave(&block)) {
                            return Ok(());
                        }
                    }
                }
                None => {
                    if !self.push(&mixed) {
                        return Ok(());
                    }
                }
            }
        }

        if let Some(r) = resampler.as_mut() {
            let tail = resample::flush(r, &mut stage)?;
            self.push(&dsp::interleave(&tail));
        }
        Ok(())
    }

    fn push(&mut self, samples: &[f32]) -> bool {
        output::push_until_stopped(&mut self.producer, samples, &self.stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::extract::tests::wav_clip;
    use ringbuf::HeapRb;
    use ringbuf::traits::{Consumer, Observer, Split};
    use std::time::{Duration, Instant};

    struct Flags {
        stop: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
        failed: Arc<AtomicBool>,
    }

    fn flags() -> Flags {
        Flags {
            stop: Arc::new(AtomicBool::new(false)),
            done: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn decoder<P>(
        samples: &[f32],
        rate: u32,
        producer: P,
        out_rate: u32,
        f: &Flags,
    ) -> ClipDecoder<P>
    where
        P: RbProducer<Item = f32> + Send + 'static,
    {
        let opened = open_clip(&wav_clip(samples, rate)).unwrap();
        ClipDecoder::new(
            opened,
            producer,
            2,
            out_rate,
            f.stop.clone(),
            f.done.clone(),
            f.failed.clone(),
        )
    }

    #[test]
    fn same_rate_clip_fans_out_to_stereo() {
        let (prod, mut cons) = HeapRb::<f32>::new(16_384).split();
        let f = flags();
        let samples = vec![0.5f32; 4_800];
        decoder(&samples, 48_000, prod, 48_000, &f).spawn().join().unwrap();

        assert!(f.done.load(Ordering::Acquire));
        assert!(!f.failed.load(Ordering::Acquire));
        assert_eq!(cons.occupied_len(), 9_600);
        let out: Vec<f32> = cons.pop_iter().collect();
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn resampled_clip_arrives_whole_with_filter_tail() {
        let (prod, cons) = HeapRb::<f32>::new(131_072).split();
        let f = flags();
        // One second at 16 kHz, played on a 48 kHz device.
        let samples: Vec<f32> = (0..16_000).map(|i| ((i % 40) as f32 / 40.0) - 0.5).collect();
        decoder(&samples, 16_000, prod, 48_000, &f).spawn().join().unwrap();

        assert!(f.done.load(Ordering::Acquire));
        assert!(!f.failed.load(Ordering::Acquire));
        let frames = cons.occupied_len() / 2;
        // Padding of the last block plus the flushed delay: two blocks at most.
        assert!(
            (48_000..=48_000 + 2 * 1024 * 3).contains(&frames),
            "got {frames} frames"
        );
    }

    #[test]
    fn stop_releases_a_decoder_blocked_on_a_full_ring() {
        let (prod, cons) = HeapRb::<f32>::new(1_024).split();
        let f = flags();
        let samples = vec![0.1f32; 48_000];
        let handle = decoder(&samples, 48_000, prod, 48_000, &f).spawn();

        let deadline = Instant::now() + Duration::from_secs(2);
        while cons.occupied_len() < 1_024 {
            assert!(Instant::now() < deadline, "ring never filled");
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!f.done.load(Ordering::Acquire));

        f.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        handle.join().unwrap();
        assert!(f.done.load(Ordering::Acquire));
        assert!(!f.failed.load(Ordering::Acquire));
    }

    #[test]
    fn rejected_resample_ratio_marks_the_decoder_failed() {
        let (prod, cons) = HeapRb::<f32>::new(1_024).split();
        let f = flags();
        decoder(&[0.25; 1_600], 16_000, prod, 0, &f).spawn().join().unwrap();

        assert!(f.failed.load(Ordering::Acquire));
        assert!(f.done.load(Ordering::Acquire));
        assert_eq!(cons.occupied_len(), 0);
    }
}
