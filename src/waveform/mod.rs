// src/waveform/mod.rs
pub mod downsample;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod terminal;

use serde::{Deserialize, Serialize};

pub use downsample::{bucket_ranges, downsample};
pub use extract::{AmplitudeSequence, extract_amplitudes};
pub use pipeline::{WaveformPipeline, WaveformReady, summarize_clip};
pub use progress::{BarState, bar_state, bar_states, threshold_index};

/// Fixed-length bar heights for one clip, each in `[0, 1]`.
///
/// Computed once per clip and stored next to it; never recomputed. Stored
/// as a plain array; loading clamps like [`WaveformSummary::from_values`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct WaveformSummary(Vec<f32>);

impl From<Vec<f32>> for WaveformSummary {
    fn from(values: Vec<f32>) -> Self {
        Self::from_values(values)
    }
}

impl From<WaveformSummary> for Vec<f32> {
    fn from(summary: WaveformSummary) -> Self {
        summary.0
    }
}

impl WaveformSummary {
    /// Peak-preserving fold of `amplitudes` into `target_count` bars.
    pub fn from_amplitudes(amplitudes: &AmplitudeSequence, target_count: usize) -> Self {
        Self::from_values(downsample(amplitudes.as_slice(), target_count))
    }

    /// Wrap precomputed bars, clamping anything outside `[0, 1]`.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(
            values
                .into_iter()
                .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
                .collect(),
        )
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

    /// Re-bucket for a display narrower or wider than the stored summary.
    pub fn resample_for_display(&self, columns: usize) -> Vec<f32> {
        downsample(&self.0, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_has_configured_length() {
        let seq = AmplitudeSequence::new((0..5_000).map(|i| (i % 7) as f32 / 7.0).collect());
        assert_eq!(WaveformSummary::from_amplitudes(&seq, 100).len(), 100);
        assert!(WaveformSummary::from_amplitudes(&AmplitudeSequence::default(), 100).is_empty());
    }

    #[test]
    fn serializes_as_plain_array() {
        let s = WaveformSummary::from_values(vec![0.0, 0.5, 1.0]);
        assert_eq!(serde_json::to_string(&s).unwrap(), "[0.0,0.5,1.0]");
        let back: WaveformSummary = serde_json::from_str("[0.25,2.0]").unwrap();
        assert_eq!(back.as_slice(), &[0.25, 1.0]);
    }

    #[test]
    fn loading_clamps_out_of_range_bars() {
        let back: WaveformSummary = serde_json::from_str("[2.0,-1.0,0.5]").unwrap();
        assert_eq!(back.as_slice(), &[1.0, 0.0, 0.5]);
    }

    #[test]
    fn from_values_clamps() {
        let s = WaveformSummary::from_values(vec![-0.5, 1.5, f32::NAN]);
        assert_eq!(s.as_slice(), &[0.0, 1.0, 0.0]);
    }
}
