// src/engine/ticker.rs

use super::Shared;
use std::sync::Weak;
use std::thread;
use std::time::Duration;

/// Periodic driver for one session.
///
/// Exits on its first wake-up after the engine is gone or the session
/// generation has moved on, without touching state.
pub(super) fn spawn(shared: Weak<Shared>, generation: u64, interval: Duration) {
    let spawned = thread::Builder::new()
        .name(format!("memo-ticker-{generation}"))
        .spawn(move || {
            loop {
                thread::sleep(interval);
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !shared.tick_generation(generation) {
                    break;
                }
            }
            log::trace!("ticker {generation} retired");
        });
    if let Err(e) = spawned {
        log::error!("failed to spawn ticker thread: {e}");
    }
}
