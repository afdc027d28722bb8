// src/waveform/downsample.rs

use std::ops::Range;

/// Source range of every output bucket when folding `len` values into
/// `target_count` slots.
///
/// Ranges are contiguous, disjoint and cover `0..len` in order. When there are
/// fewer values than slots each value keeps its own slot and the tail slots get
/// empty ranges starting at `len`.
pub fn bucket_ranges(len: usize, target_count: usize) -> Vec<Range<usize>> {
    if len == 0 || target_count == 0 {
        return Vec::new();
    }
    let step = if len > target_count {
        len as f64 / target_count as f64
    } else {
        1.0
    };

    (0..target_count)
        .map(|i| {
            let start = ((i as f64 * step).floor() as usize).min(len);
            let end = (((i + 1) as f64 * step).floor() as usize).min(len);
            // The last bucket always closes at `len`, whatever the float error.
            let end = if i + 1 == target_count && len > target_count {
                len
            } else {
                end
            };
            start..end
        })
        .collect()
}

/// Max-pools `sequence` into exactly `target_count` values.
///
/// Empty input (or a zero target) yields an empty vector; a sequence that is
/// already the right length comes back unchanged.
pub fn downsample(sequence: &[f32], target_count: usize) -> Vec<f32> {
    if sequence.is_empty() || target_count == 0 {
        return Vec::new();
    }
    if sequence.len() == target_count {
        return sequence.to_vec();
    }

    bucket_ranges(sequence.len(), target_count)
        .into_iter()
        .map(|range| {
            if range.start < range.end {
                sequence[range].iter().copied().fold(f32::MIN, f32::max)
            } else {
                sequence.get(range.start).copied().unwrap_or(0.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| ((i * 37) % 101) as f32 / 100.0).collect()
    }

    #[test]
    fn pairs_fold_to_their_peaks() {
        assert_eq!(downsample(&[0.1, 0.9, 0.2, 0.8], 2), vec![0.9, 0.8]);
    }

    #[test]
    fn empty_input_or_zero_target_is_empty() {
        assert!(downsample(&[], 100).is_empty());
        assert!(downsample(&[0.3, 0.4], 0).is_empty());
    }

    #[test]
    fn short_input_pads_with_silence() {
        assert_eq!(downsample(&[0.5], 3), vec![0.5, 0.0, 0.0]);
        assert_eq!(downsample(&[0.2, 0.7], 4), vec![0.2, 0.7, 0.0, 0.0]);
    }

    #[test]
    fn same_length_is_identity() {
        let s = ramp(100);
        assert_eq!(downsample(&s, 100), s);
    }

    #[test]
    fn output_length_is_exact() {
        for len in [1usize, 2, 3, 7, 99, 100, 101, 250, 1_000, 4_097] {
            for n in [1usize, 2, 3, 64, 100, 333] {
                assert_eq!(downsample(&ramp(len), n).len(), n, "len={len} n={n}");
            }
        }
    }

    #[test]
    fn every_input_lands_in_exactly_one_bucket() {
        for len in [1usize, 5, 99, 101, 257, 1_000, 1_023] {
            for n in [1usize, 3, 100, 128] {
                let ranges = bucket_ranges(len, n);
                assert_eq!(ranges.len(), n);
                let mut hits = vec![0u32; len];
                for r in &ranges {
                    for j in r.clone() {
                        hits[j] += 1;
                    }
                }
                assert!(hits.iter().all(|&h| h == 1), "len={len} n={n}");
                assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
            }
        }
    }

    #[test]
    fn output_is_the_bucket_maximum() {
        let s = ramp(1_000);
        let out = downsample(&s, 100);
        for (value, range) in out.iter().zip(bucket_ranges(s.len(), 100)) {
            assert!(s[range.clone()].iter().all(|v| v <= value));
            assert!(s[range].contains(value));
        }
    }

    #[test]
    fn loud_transient_survives() {
        let mut s = vec![0.01f32; 10_000];
        s[4_321] = 1.0;
        let out = downsample(&s, 100);
        assert_eq!(out.iter().filter(|&&v| v == 1.0).count(), 1);
        assert_eq!(out[43], 1.0);
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let s = ramp(12_345);
        let a = downsample(&s, 100);
        let b = downsample(&s, 100);
        assert_eq!(
            a.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            b.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }
}
