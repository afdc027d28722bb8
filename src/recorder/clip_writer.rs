// src/recorder/clip_writer.rs

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::consumer::Consumer;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Encodes mono f32 samples from the capture ring into an in-memory 16-bit WAV.
pub struct ClipWriter {
    sample_rate: u32,
}

impl ClipWriter {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    /// Drain `consumer` until `stop` is raised and the ring is empty, then
    /// finalize the header and hand back the bytes.
    ///
    /// `written` counts samples as they land, so it doubles as the recording clock.
    pub fn run<C>(
        self,
        mut consumer: C,
        stop: Arc<AtomicBool>,
        written: Arc<AtomicU64>,
    ) -> Result<Vec<u8>>
    where
        C: Consumer<Item = f32>,
    {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec())?;
            let mut tmp = vec![0.0f32; 4096];

            loop {
                // Sample the flag before popping so samples pushed just before
                // the stop still get written.
                let stopping = stop.load(Ordering::Acquire);
                let popped = consumer.pop_slice(&mut tmp);

                if popped == 0 {
                    if stopping {
                        break;
                    }
                    thread::park_timeout(Duration::from_millis(5));
                    continue;
                }

                for &s in &tmp[..popped] {
                    writer.write_sample(to_i16(s))?;
                }
                written.fetch_add(popped as u64, Ordering::Relaxed);
            }

            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

fn to_i16(s: f32) -> i16 {
    if s.is_finite() {
        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::HeapRb;
    use ringbuf::traits::{Producer, Split};

    #[test]
    fn writes_everything_queued_before_stop() {
        let (mut prod, cons) = HeapRb::<f32>::new(64).split();
        prod.push_slice(&[0.0, 0.5, -0.5, 1.0, f32::NAN]);

        let stop = Arc::new(AtomicBool::new(true));
        let written = Arc::new(AtomicU64::new(0));
        let bytes = ClipWriter::new(16_000)
            .run(cons, stop, written.clone())
            .unwrap();

        assert_eq!(written.load(Ordering::Relaxed), 5);
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16_000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, i16::MAX / 2, -(i16::MAX / 2), i16::MAX, 0]);
    }

    #[test]
    fn stop_with_nothing_captured_yields_header_only() {
        let (_prod, cons) = HeapRb::<f32>::new(8).split();
        let written = Arc::new(AtomicU64::new(0));
        let bytes = ClipWriter::new(48_000)
            .run(cons, Arc::new(AtomicBool::new(true)), written.clone())
            .unwrap();
        assert_eq!(written.load(Ordering::Relaxed), 0);
        assert_eq!(hound::WavReader::new(Cursor::new(bytes)).unwrap().len(), 0);
    }
}
