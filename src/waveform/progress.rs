// src/waveform/progress.rs

/// How one bar of a summary is drawn during live playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarState {
    Played,
    Unplayed,
}

/// Index up to which bars count as played: `floor(current_time / duration * n)`.
///
/// `None` means nothing is playing (or the duration is unknown) and every bar
/// is unplayed.
pub fn threshold_index(current_time: f64, duration: f64, n: usize) -> Option<usize> {
    if !(duration.is_finite() && current_time.is_finite()) || duration <= 0.0 {
        return None;
    }
    let progress = (current_time / duration).max(0.0);
    Some((progress * n as f64).floor() as usize)
}

pub fn bar_state(index: usize, threshold: Option<usize>) -> BarState {
    match threshold {
        Some(t) if index <= t => BarState::Played,
        _ => BarState::Unplayed,
    }
}

/// State of every bar for one timer update.
pub fn bar_states(current_time: f64, duration: f64, n: usize) -> Vec<BarState> {
    let threshold = threshold_index(current_time, duration, n);
    (0..n).map(|i| bar_state(i, threshold)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halfway_through_ten_seconds() {
        assert_eq!(threshold_index(5.0, 10.0, 100), Some(50));
        let states = bar_states(5.0, 10.0, 100);
        assert_eq!(states.iter().filter(|s| **s == BarState::Played).count(), 51);
        assert_eq!(states[50], BarState::Played);
        assert_eq!(states[51], BarState::Unplayed);
    }

    #[test]
    fn unknown_duration_leaves_everything_unplayed() {
        for t in [0.0, 3.0, 1e9] {
            assert!(bar_states(t, 0.0, 100).iter().all(|s| *s == BarState::Unplayed));
            assert!(bar_states(t, -1.0, 100).iter().all(|s| *s == BarState::Unplayed));
        }
        assert_eq!(threshold_index(1.0, f64::NAN, 100), None);
    }

    #[test]
    fn start_and_end_of_clip() {
        assert_eq!(threshold_index(0.0, 4.0, 100), Some(0));
        assert_eq!(threshold_index(4.0, 4.0, 100), Some(100));
        assert!(bar_states(4.0, 4.0, 100).iter().all(|s| *s == BarState::Played));
    }

    #[test]
    fn negative_time_clamps_to_start() {
        assert_eq!(threshold_index(-2.0, 4.0, 10), Some(0));
    }
}
