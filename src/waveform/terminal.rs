// src/waveform/terminal.rs

use crate::waveform::progress::{BarState, bar_state};

const PLAYED: char = '█';
const UNPLAYED: char = '░';

/// Draw summary bars bottom-up, `height` rows tall.
///
/// Bars at or before `threshold` use the solid glyph. Every bar is at least one
/// row tall so silent stretches stay visible.
pub fn render_bars(values: &[f32], height: usize, threshold: Option<usize>) -> Vec<String> {
    let h = height.max(1);
    let mut rows = vec![vec![' '; values.len()]; h];

    for (x, &v) in values.iter().enumerate() {
        let filled = ((v.clamp(0.0, 1.0) * h as f32).round() as usize).clamp(1, h);
        let glyph = match bar_state(x, threshold) {
            BarState::Played => PLAYED,
            BarState::Unplayed => UNPLAYED,
        };
        for row in rows.iter_mut().rev().take(filled) {
            row[x] = glyph;
        }
    }

    rows.into_iter().map(|row| row.into_iter().collect()).collect()
}
