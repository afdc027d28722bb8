// src/engine/mod.rs

pub mod backend;
pub mod state;
mod ticker;

pub use backend::{AudioBackend, CaptureSession, CpalBackend, PlaybackSession, PlaybackStatus};
pub use state::{EngineEvent, EngineSnapshot, EngineState, RecordingFinished, StopReason};

use crate::clip::AudioClip;
use crate::config::EngineConfig;
use crate::error::CoreResult;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type FinishedCallback = Arc<dyn Fn(&RecordingFinished) + Send + Sync>;

enum Activity {
    Idle,
    Recording(Box<dyn CaptureSession>),
    Playing(Box<dyn PlaybackSession>),
}

struct Inner {
    backend: Box<dyn AudioBackend>,
    activity: Activity,
    current_time: f64,
    duration: f64,
    /// Bumped on every start and stop; a ticker only acts on its own value.
    generation: u64,
}

impl Inner {
    fn state(&self) -> EngineState {
        match self.activity {
            Activity::Idle => EngineState::Idle,
            Activity::Recording(_) => EngineState::Recording,
            Activity::Playing(_) => EngineState::Playing,
        }
    }

    fn snapshot(&self, config: &EngineConfig) -> EngineSnapshot {
        let state = self.state();
        EngineSnapshot {
            state,
            current_time: self.current_time,
            duration: self.duration,
            can_stop_recording: state == EngineState::Recording
                && config.can_stop_at(self.current_time),
        }
    }

    fn reset_to_idle(&mut self) {
        self.activity = Activity::Idle;
        self.current_time = 0.0;
        self.duration = 0.0;
        self.generation += 1;
    }

    fn begin(&mut self, activity: Activity, duration: f64) -> u64 {
        self.activity = activity;
        self.current_time = 0.0;
        self.duration = duration;
        self.generation += 1;
        self.generation
    }

    fn take_recording(&mut self, reason: StopReason, pending: &mut Vec<Pending>) {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Recording(session) => {
                let at = self.current_time;
                self.reset_to_idle();
                pending.push(Pending::Recording {
                    session,
                    reason,
                    at,
                });
            }
            other => self.activity = other,
        }
    }

    fn take_playback(&mut self, completed: bool, pending: &mut Vec<Pending>) {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Playing(session) => {
                self.reset_to_idle();
                pending.push(Pending::Playback { session, completed });
            }
            other => self.activity = other,
        }
    }

    /// One timer step: refresh the clock and apply automatic transitions.
    fn step(&mut self, config: &EngineConfig, pending: &mut Vec<Pending>) {
        match &self.activity {
            Activity::Idle => {}
            Activity::Recording(session) => {
                let t = session.elapsed().as_secs_f64();
                let failed = session.has_failed();
                self.current_time = t;
                if failed {
                    log::warn!("input stream failed at {t:.2}s, keeping captured audio");
                    self.take_recording(StopReason::Failed, pending);
                } else if config.reached_max_at(t) {
                    self.take_recording(StopReason::MaxDuration, pending);
                } else {
                    pending.push(Pending::Tick(self.snapshot(config)));
                }
            }
            Activity::Playing(session) => {
                let status = session.status();
                let position = session.position().as_secs_f64();
                let duration = session.duration().map(|d| d.as_secs_f64());
                match status {
                    PlaybackStatus::Completed => self.take_playback(true, pending),
                    PlaybackStatus::Failed => {
                        log::warn!("output stream failed at {position:.2}s");
                        self.take_playback(false, pending);
                    }
                    PlaybackStatus::Playing => {
                        self.current_time = position;
                        if let Some(d) = duration {
                            self.duration = d;
                        }
                        pending.push(Pending::Tick(self.snapshot(config)));
                    }
                }
            }
        }
    }
}

/// Work left over from a state change, in the order it happened.
///
/// Sessions are taken out of `Inner` already detached; closing them joins
/// device and worker threads, so it happens after the state lock is gone.
enum Pending {
    Tick(EngineSnapshot),
    Recording {
        session: Box<dyn CaptureSession>,
        reason: StopReason,
        at: f64,
    },
    Playback {
        session: Box<dyn PlaybackSession>,
        completed: bool,
    },
}

pub(crate) struct Shared {
    config: EngineConfig,
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<Sender<EngineEvent>>>,
    on_finished: Mutex<Option<FinishedCallback>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Sender<EngineEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the state lock, close taken sessions and deliver events.
    ///
    /// Lock order is `inner` then `listeners`. Taking `listeners` before
    /// `inner` is released keeps the event stream in state order across
    /// threads. The recording callback runs with no lock held, so it may call
    /// back into the engine.
    fn settle(&self, inner: MutexGuard<'_, Inner>, pending: Vec<Pending>) -> Option<AudioClip> {
        if pending.is_empty() {
            return None;
        }
        let mut listeners = self.listeners();
        drop(inner);

        let mut clip = None;
        let mut finished = Vec::new();
        for item in pending {
            let event = match item {
                Pending::Tick(snapshot) => EngineEvent::Tick(snapshot),
                Pending::Recording {
                    session,
                    reason,
                    at,
                } => {
                    let captured = session.finish();
                    log::info!(
                        "recording stopped ({reason:?}) at {at:.2}s, {} bytes",
                        captured.as_ref().map_or(0, AudioClip::len)
                    );
                    let done = RecordingFinished {
                        clip: captured.clone(),
                        reason,
                    };
                    clip = captured;
                    finished.push(done.clone());
                    EngineEvent::RecordingFinished(done)
                }
                Pending::Playback { session, completed } => {
                    session.stop();
                    log::info!("playback stopped (completed: {completed})");
                    EngineEvent::PlaybackStopped { completed }
                }
            };
            listeners.retain(|tx| tx.send(event.clone()).is_ok());
        }
        drop(listeners);

        if !finished.is_empty() {
            let callback = self
                .on_finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(cb) = callback {
                for done in &finished {
                    cb(done);
                }
            }
        }
        clip
    }

    /// Timer entry point. Returns `false` once `generation` is stale.
    pub(crate) fn tick_generation(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        let mut pending = Vec::new();
        inner.step(&self.config, &mut pending);
        let alive = inner.generation == generation;
        self.settle(inner, pending);
        alive
    }
}

/// Recording/playback state machine for voice memos.
///
/// Owns the audio backend. Recording and playback never overlap: starting one
/// ends the other. Time advances through a background ticker at
/// `EngineConfig::tick_hz`, or through explicit [`MemoEngine::tick`] calls.
pub struct MemoEngine {
    shared: Arc<Shared>,
}

impl MemoEngine {
    pub fn new(backend: impl AudioBackend + 'static, config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    backend: Box::new(backend),
                    activity: Activity::Idle,
                    current_time: 0.0,
                    duration: 0.0,
                    generation: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                on_finished: Mutex::new(None),
            }),
        }
    }

    /// Engine on the default cpal input and output devices.
    pub fn with_cpal(config: EngineConfig) -> Self {
        Self::new(CpalBackend, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn start_recording(&self) -> CoreResult<()> {
        let mut pending = Vec::new();
        let mut inner = self.shared.lock();
        if matches!(inner.activity, Activity::Recording(_)) {
            return Ok(());
        }
        inner.take_playback(false, &mut pending);
        let started = match inner.backend.open_capture() {
            Ok(session) => {
                let max = self.shared.config.max_recording_secs;
                log::info!("recording started");
                Ok(inner.begin(Activity::Recording(session), max))
            }
            Err(e) => {
                log::warn!("could not start recording: {e}");
                Err(e)
            }
        };
        self.shared.settle(inner, pending);
        self.spawn_ticker(started?);
        Ok(())
    }

    /// Finalize the recording and return its clip.
    ///
    /// Returns `None` without side effects when nothing is recording or the
    /// minimum hold has not elapsed yet; in the latter case recording goes on.
    pub fn stop_recording(&self) -> Option<AudioClip> {
        let mut inner = self.shared.lock();
        let t = match &inner.activity {
            Activity::Recording(session) => session.elapsed().as_secs_f64(),
            _ => return None,
        };
        inner.current_time = t;
        if !self.shared.config.can_stop_at(t) {
            log::debug!(
                "stop ignored at {t:.2}s, minimum hold is {}s",
                self.shared.config.min_hold_secs
            );
            return None;
        }
        let mut pending = Vec::new();
        inner.take_recording(StopReason::Manual, &mut pending);
        self.shared.settle(inner, pending)
    }

    pub fn can_stop_recording(&self) -> bool {
        self.snapshot().can_stop_recording
    }

    pub fn start_playback(&self, clip: &AudioClip) -> CoreResult<()> {
        let mut pending = Vec::new();
        let mut inner = self.shared.lock();
        inner.take_recording(StopReason::Interrupted, &mut pending);
        inner.take_playback(false, &mut pending);
        let started = match inner.backend.open_playback(clip) {
            Ok(session) => {
                let duration = session.duration().map_or(0.0, |d| d.as_secs_f64());
                log::info!("playback started, duration {duration:.2}s");
                Ok(inner.begin(Activity::Playing(session), duration))
            }
            Err(e) => {
                log::warn!("could not start playback: {e}");
                Err(e)
            }
        };
        self.shared.settle(inner, pending);
        self.spawn_ticker(started?);
        Ok(())
    }

    pub fn stop_playback(&self) {
        let mut pending = Vec::new();
        let mut inner = self.shared.lock();
        inner.take_playback(false, &mut pending);
        self.shared.settle(inner, pending);
    }

    /// Advance the clock once; the background ticker calls the same step.
    pub fn tick(&self) {
        let mut pending = Vec::new();
        let mut inner = self.shared.lock();
        inner.step(&self.shared.config, &mut pending);
        self.shared.settle(inner, pending);
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.shared.lock().snapshot(&self.shared.config)
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state()
    }

    /// New observer. Disconnected receivers are pruned on the next event.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        let (tx, rx) = channel();
        self.shared.listeners().push(tx);
        rx
    }

    /// Called once per recording session, whatever ended it.
    pub fn set_on_recording_finished<F>(&self, callback: F)
    where
        F: Fn(&RecordingFinished) + Send + Sync + 'static,
    {
        *self
            .shared
            .on_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    fn spawn_ticker(&self, generation: u64) {
        ticker::spawn(
            Arc::downgrade(&self.shared),
            generation,
            self.shared.config.tick_interval(),
        );
    }
}

impl Drop for MemoEngine {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        let mut inner = self.shared.lock();
        inner.take_recording(StopReason::Interrupted, &mut pending);
        inner.take_playback(false, &mut pending);
        self.shared.settle(inner, pending);
    }
}

#[cfg(test)]
mod tests {
    use super::backend::fake::{FakeBackend, FakeHandles};
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn engine(playback_secs: u64) -> (MemoEngine, FakeHandles) {
        let (backend, handles) = FakeBackend::new(Duration::from_secs(playback_secs));
        let config = EngineConfig::default().with_tick_hz(200.0);
        (MemoEngine::new(backend, config), handles)
    }

    fn recorded_reasons(engine: &MemoEngine) -> Arc<Mutex<Vec<StopReason>>> {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = reasons.clone();
        engine.set_on_recording_finished(move |done| sink.lock().unwrap().push(done.reason));
        reasons
    }

    fn wait_for(rx: &Receiver<EngineEvent>, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(ev) if pred(&ev) => return ev,
                Ok(_) => continue,
                Err(e) => panic!("no matching engine event: {e}"),
            }
        }
    }

    fn sample_clip() -> AudioClip {
        AudioClip::from_bytes(b"clip:1000ms".to_vec())
    }

    #[test]
    fn denied_microphone_leaves_engine_idle() {
        let (engine, handles) = engine(5);
        handles.fail_capture.store(true, Ordering::SeqCst);

        let err = engine.start_recording().unwrap_err();
        assert!(matches!(err, CoreError::SessionUnavailable(_)));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.stop_recording(), None);
        assert_eq!(handles.captures_finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_is_ignored_until_minimum_hold() {
        let (engine, handles) = engine(5);
        engine.start_recording().unwrap();

        handles.set_time(7.9);
        engine.tick();
        assert!(!engine.can_stop_recording());
        assert_eq!(engine.stop_recording(), None);
        assert_eq!(engine.state(), EngineState::Recording);

        handles.set_time(8.0);
        engine.tick();
        assert!(engine.can_stop_recording());
        let clip = engine.stop_recording().expect("clip after hold");
        assert!(!clip.is_empty());

        let snap = engine.snapshot();
        assert_eq!(snap.state, EngineState::Idle);
        assert_eq!(snap.current_time, 0.0);
        assert_eq!(snap.duration, 0.0);
    }

    #[test]
    fn stop_without_recording_is_a_no_op() {
        let (engine, handles) = engine(5);
        let reasons = recorded_reasons(&engine);
        assert_eq!(engine.stop_recording(), None);
        assert!(reasons.lock().unwrap().is_empty());
        assert_eq!(handles.captures_finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn recording_reports_elapsed_time_against_max_duration() {
        let (engine, handles) = engine(5);
        engine.start_recording().unwrap();
        handles.set_time(2.5);
        engine.tick();

        let snap = engine.snapshot();
        assert_eq!(snap.state, EngineState::Recording);
        assert_eq!(snap.current_time, 2.5);
        assert_eq!(snap.duration, 30.0);
        assert!(!snap.can_stop_recording);
    }

    #[test]
    fn ticker_stops_recording_at_max_duration_once() {
        let (engine, handles) = engine(5);
        let reasons = recorded_reasons(&engine);
        let rx = engine.subscribe();
        engine.start_recording().unwrap();

        handles.set_time(30.0);
        let ev = wait_for(&rx, |ev| matches!(ev, EngineEvent::RecordingFinished(_)));
        let EngineEvent::RecordingFinished(done) = ev else {
            unreachable!()
        };
        assert_eq!(done.reason, StopReason::MaxDuration);
        assert!(done.clip.is_some());

        // Give a stale ticker the chance to misbehave.
        std::thread::sleep(Duration::from_millis(50));
        handles.set_time(31.0);
        std::thread::sleep(Duration::from_millis(50));

        let snap = engine.snapshot();
        assert_eq!(snap.state, EngineState::Idle);
        assert_eq!(snap.current_time, 0.0);
        assert_eq!(*reasons.lock().unwrap(), vec![StopReason::MaxDuration]);
        assert!(
            rx.try_iter()
                .all(|ev| !matches!(ev, EngineEvent::RecordingFinished(_) | EngineEvent::Tick(_)))
        );
        assert_eq!(engine.stop_recording(), None);
    }

    #[test]
    fn starting_playback_interrupts_recording() {
        let (engine, handles) = engine(5);
        let reasons = recorded_reasons(&engine);
        engine.start_recording().unwrap();
        handles.set_time(3.0);

        engine.start_playback(&sample_clip()).unwrap();
        assert_eq!(engine.state(), EngineState::Playing);
        assert_eq!(*reasons.lock().unwrap(), vec![StopReason::Interrupted]);
        assert_eq!(handles.captures_finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn starting_recording_stops_playback() {
        let (engine, handles) = engine(5);
        let rx = engine.subscribe();
        engine.start_playback(&sample_clip()).unwrap();
        engine.start_recording().unwrap();

        assert_eq!(engine.state(), EngineState::Recording);
        assert_eq!(handles.playbacks_stopped.load(Ordering::SeqCst), 1);
        wait_for(&rx, |ev| *ev == EngineEvent::PlaybackStopped { completed: false });
    }

    #[test]
    fn playback_tracks_position_and_completes() {
        let (engine, handles) = engine(5);
        let rx = engine.subscribe();
        engine.start_playback(&sample_clip()).unwrap();
        assert_eq!(engine.snapshot().duration, 5.0);

        handles.set_time(2.0);
        engine.tick();
        let snap = engine.snapshot();
        assert_eq!(snap.state, EngineState::Playing);
        assert_eq!(snap.current_time, 2.0);

        handles.set_time(5.0);
        engine.tick();
        wait_for(&rx, |ev| *ev == EngineEvent::PlaybackStopped { completed: true });
        let snap = engine.snapshot();
        assert_eq!(snap.state, EngineState::Idle);
        assert_eq!(snap.current_time, 0.0);
        assert_eq!(handles.playbacks_stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_playback_is_idempotent() {
        let (engine, handles) = engine(5);
        engine.stop_playback();
        engine.start_playback(&sample_clip()).unwrap();
        engine.stop_playback();
        engine.stop_playback();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(handles.playbacks_stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn undecodable_clip_fails_playback() {
        let (engine, _handles) = engine(5);
        let err = engine
            .start_playback(&AudioClip::from_bytes(b"junk".to_vec()))
            .unwrap_err();
        assert!(matches!(err, CoreError::DecodeFailed(_)));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn broken_input_keeps_what_was_captured() {
        let (engine, handles) = engine(5);
        let rx = engine.subscribe();
        engine.start_recording().unwrap();
        handles.set_time(4.0);
        handles.capture_broken.store(true, Ordering::SeqCst);
        engine.tick();

        let ev = wait_for(&rx, |ev| matches!(ev, EngineEvent::RecordingFinished(_)));
        let EngineEvent::RecordingFinished(done) = ev else {
            unreachable!()
        };
        assert_eq!(done.reason, StopReason::Failed);
        assert!(done.clip.is_some());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn callback_may_reenter_the_engine() {
        let (backend, handles) = FakeBackend::new(Duration::from_secs(5));
        let engine = Arc::new(MemoEngine::new(backend, EngineConfig::default()));
        let seen = Arc::new(Mutex::new(None));
        let (weak, sink) = (Arc::downgrade(&engine), seen.clone());
        engine.set_on_recording_finished(move |_| {
            if let Some(engine) = weak.upgrade() {
                *sink.lock().unwrap() = Some(engine.snapshot().state);
            }
        });

        engine.start_recording().unwrap();
        handles.set_time(9.0);
        assert!(engine.stop_recording().is_some());
        assert_eq!(*seen.lock().unwrap(), Some(EngineState::Idle));
    }

    #[test]
    fn no_tick_follows_recording_finished() {
        for _ in 0..200 {
            let (engine, handles) = engine(5);
            let rx = engine.subscribe();
            engine.start_recording().unwrap();
            handles.set_time(9.0);

            let engine = &engine;
            std::thread::scope(|s| {
                s.spawn(move || {
                    for _ in 0..50 {
                        engine.tick();
                    }
                });
                s.spawn(move || assert!(engine.stop_recording().is_some()));
            });

            let events: Vec<EngineEvent> = rx.try_iter().collect();
            let finished = events
                .iter()
                .position(|ev| matches!(ev, EngineEvent::RecordingFinished(_)))
                .expect("recording finished event");
            assert!(
                events[finished + 1..]
                    .iter()
                    .all(|ev| !matches!(ev, EngineEvent::Tick(_))),
                "tick after finish: {events:?}"
            );
        }
    }

    #[test]
    fn snapshot_does_not_wait_for_session_teardown() {
        let (engine, handles) = engine(5);
        let rx = engine.subscribe();
        engine.start_recording().unwrap();
        handles.set_time(9.0);
        handles.hold_finish.store(true, Ordering::SeqCst);

        let engine = &engine;
        std::thread::scope(|s| {
            let stopper = s.spawn(move || engine.stop_recording());
            let deadline = Instant::now() + Duration::from_secs(2);
            while handles.captures_finished.load(Ordering::SeqCst) == 0 {
                assert!(Instant::now() < deadline, "finish never started");
                std::thread::sleep(Duration::from_millis(1));
            }

            let (tx, snap_rx) = channel();
            s.spawn(move || {
                let _ = tx.send(engine.snapshot());
            });
            let snap = snap_rx.recv_timeout(Duration::from_secs(1));
            handles.hold_finish.store(false, Ordering::SeqCst);

            assert_eq!(snap.expect("snapshot while finishing").state, EngineState::Idle);
            assert!(stopper.join().unwrap().is_some());
        });
        wait_for(&rx, |ev| matches!(ev, EngineEvent::RecordingFinished(_)));
    }

    #[test]
    fn dropping_the_engine_interrupts_recording() {
        let (engine, handles) = engine(5);
        let reasons = recorded_reasons(&engine);
        engine.start_recording().unwrap();
        handles.set_time(1.0);
        drop(engine);
        assert_eq!(*reasons.lock().unwrap(), vec![StopReason::Interrupted]);
        assert_eq!(handles.captures_finished.load(Ordering::SeqCst), 1);
    }
}
