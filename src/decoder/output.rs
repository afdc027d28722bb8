// src/decoder/output.rs

use ringbuf::traits::Producer as RbProducer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Push all of `data`, parking while the ring is full.
///
/// Returns `false` as soon as `stop` is raised; the rest of `data` is dropped.
pub fn push_until_stopped<P: RbProducer<Item = f32>>(
    producer: &mut P,
    data: &[f32],
    stop: &AtomicBool,
) -> bool {
    let mut idx = 0usize;
    while idx < data.len() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let n = producer.push_slice(&data[idx..]);
        if n == 0 {
            std::thread::park_timeout(Duration::from_millis(2));
        }
        idx += n;
    }
    true
}
