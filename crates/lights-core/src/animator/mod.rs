//! Animator worker.
//!
//! One OS thread runs at most one animation at a time, frame by frame.
//! Requests reach it through a single-slot [`HandOff`] cell: a newer request
//! overwrites an unread older one, and the worker only looks at the cell
//! between frames, so an animation is never replaced mid-frame.
//!
//! ```text
//!            Start(name)                 frame ok
//!   Idle ───────────────────▶ Running ◀──────────┐
//!    ▲                          │  │              │
//!    │      Halt / frame error  │  └──────────────┘
//!    └──────────────────────────┘
//! ```

mod mailbox;

pub use mailbox::HandOff;

use crate::cancel::CancellationToken;
use crate::config::AnimatorConfig;
use crate::pixels::PixelSurface;
use crate::sandbox::{AnimationHandle, AnimationSandbox};
use crate::store::AnimationStore;
use crate::{LightsError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Request posted to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(String),
    Halt,
    Shutdown,
}

enum State {
    Idle,
    Running(AnimationHandle),
}

#[derive(Debug, Default)]
struct Status {
    /// Ticket of the last command the worker has acted on.
    consumed: u64,
    current: Option<String>,
    exited: bool,
}

struct Shared {
    handoff: HandOff<Command>,
    stop: CancellationToken,
    status: Mutex<Status>,
    progress: Condvar,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_current(&self, current: Option<String>) {
        self.status().current = current;
    }

    fn acknowledge(&self, ticket: u64) {
        let mut status = self.status();
        status.consumed = status.consumed.max(ticket);
        drop(status);
        self.progress.notify_all();
    }

    /// Block until the worker has acted on `ticket` (or a later one), or has exited.
    fn wait_consumed(&self, ticket: u64) {
        let mut status = self.status();
        while status.consumed < ticket && !status.exited {
            status = self
                .progress
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Marks the worker as exited however its loop ends, so waiters never hang.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let mut status = self.0.status();
        status.exited = true;
        status.current = None;
        drop(status);
        self.0.progress.notify_all();
    }
}

/// Handle to the animator worker thread.
pub struct Animator {
    shared: Arc<Shared>,
    store: AnimationStore,
    surface: PixelSurface,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Animator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Animator")
            .field("current", &self.current())
            .field("stopped", &self.shared.stop.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Animator {
    /// Start the worker thread in the `Idle` state.
    pub fn spawn(
        sandbox: Arc<AnimationSandbox>,
        store: AnimationStore,
        surface: PixelSurface,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            handoff: HandOff::new(),
            stop: CancellationToken::new(),
            status: Mutex::new(Status::default()),
            progress: Condvar::new(),
        });

        let worker = Worker {
            shared: Arc::clone(&shared),
            sandbox,
            store: store.clone(),
        };
        let handle = thread::Builder::new()
            .name(AnimatorConfig::THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(|e| LightsError::Io {
                message: format!("Failed to spawn animator thread: {}", e),
                path: None,
                source: Some(e),
            })?;

        Ok(Self {
            shared,
            store,
            surface,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Ask the worker to switch to `name` after its current frame.
    ///
    /// Overwrites any request the worker has not picked up yet.
    pub fn queue(&self, name: &str) -> Result<()> {
        if self.shared.stop.is_cancelled() {
            return Err(LightsError::AnimatorStopped);
        }
        if !self.store.exists(name)? {
            return Err(LightsError::UnknownAnimation {
                name: name.to_string(),
            });
        }

        let ticket = self.shared.handoff.put(Command::Start(name.to_string()));
        debug!(ticket, "Queued animation '{}'", name);
        Ok(())
    }

    /// Stop the running animation and leave the strip in instant mode.
    ///
    /// Returns once no frame is in flight. Calling it again is harmless.
    pub fn pause(&self) {
        if self.shared.stop.is_cancelled() {
            return;
        }

        let ticket = self.shared.handoff.put(Command::Halt);
        self.shared.wait_consumed(ticket);
        debug!(ticket, "Animator halted");

        for _ in 0..AnimatorConfig::BUSY_RETRY_ATTEMPTS {
            if self.surface.mode(true) {
                return;
            }
            thread::sleep(AnimatorConfig::BUSY_RETRY_DELAY);
        }
        warn!("Could not switch the strip to instant mode: surface stayed busy");
    }

    /// Stop the worker and join it. Terminal.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        self.shared.stop.cancel();
        self.shared.handoff.put(Command::Shutdown);
        if worker.join().is_err() {
            error!("Animator thread panicked");
        }
        info!("Animator stopped");
    }

    /// Name of the running animation, if any.
    pub fn current(&self) -> Option<String> {
        self.shared.status().current.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_cancelled()
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    shared: Arc<Shared>,
    sandbox: Arc<AnimationSandbox>,
    store: AnimationStore,
}

impl Worker {
    fn run(self) {
        let _exit = ExitGuard(Arc::clone(&self.shared));
        info!("Animator started");

        let mut state = State::Idle;
        while self.shared.stop.should_continue() {
            let next = match state {
                State::Idle => self.shared.handoff.take_timeout(AnimatorConfig::IDLE_WAIT),
                State::Running(mut handle) => {
                    state = match self.sandbox.run_frame(&mut handle) {
                        Ok(()) => State::Running(handle),
                        Err(e) => {
                            error!("{}; animator going idle", e);
                            self.shared.set_current(None);
                            State::Idle
                        }
                    };
                    self.shared.handoff.try_take()
                }
            };

            let Some((ticket, command)) = next else {
                continue;
            };

            match command {
                Command::Start(name) => state = self.start(name, state),
                Command::Halt => {
                    if let State::Running(handle) = &state {
                        info!("Halting animation '{}'", handle.name());
                    }
                    state = State::Idle;
                    self.shared.set_current(None);
                }
                Command::Shutdown => {
                    self.shared.acknowledge(ticket);
                    break;
                }
            }
            self.shared.acknowledge(ticket);
        }

        info!("Animator exiting");
    }

    /// Load `name`, keeping `current` if the artifact cannot be loaded.
    fn start(&self, name: String, current: State) -> State {
        let loaded = self
            .store
            .load(&name)
            .and_then(|artifact| {
                self.sandbox
                    .load(&name, &artifact)
                    .map_err(LightsError::from)
            });

        match loaded {
            Ok(handle) => {
                info!("Running animation '{}'", name);
                self.shared.set_current(Some(name));
                State::Running(handle)
            }
            Err(e) => {
                warn!("Failed to load animation '{}': {}", name, e);
                current
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::{Color, RecordingStrip, StripProbe, WriteMode};
    use crate::sandbox::SandboxProfile;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const RED: Color = Color::new(255, 0, 0);
    const BLUE: Color = Color::new(0, 0, 255);

    // Field order matters: the animator is joined before the directory goes away.
    struct Fixture {
        animator: Animator,
        store: AnimationStore,
        surface: PixelSurface,
        probe: StripProbe,
        _temp_dir: TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(SandboxProfile::default())
    }

    fn fixture_with(profile: SandboxProfile) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = AnimationStore::open(temp_dir.path()).unwrap();
        let strip = RecordingStrip::with_history(256);
        let probe = strip.probe();
        let surface = PixelSurface::new(4, strip);
        let sandbox =
            Arc::new(AnimationSandbox::new(surface.clone(), profile).unwrap());
        let animator = Animator::spawn(sandbox, store.clone(), surface.clone()).unwrap();

        Fixture {
            animator,
            store,
            surface,
            probe,
            _temp_dir: temp_dir,
        }
    }

    /// Fills the strip with one color per frame, then sleeps briefly.
    fn solid(r: u8, g: u8, b: u8) -> String {
        format!(
            r#"(module
                 (import "env" "fill" (func $fill (param i32 i32 i32)))
                 (import "env" "sleep" (func $sleep (param f64)))
                 (func (export "animate")
                   (call $fill (i32.const {r}) (i32.const {g}) (i32.const {b}))
                   (call $sleep (f64.const 0.005))))"#
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_queue_runs_frames() {
        let f = fixture();
        f.store.save("red", solid(255, 0, 0).as_bytes()).unwrap();

        f.animator.queue("red").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 3));
        assert_eq!(f.animator.current().as_deref(), Some("red"));
        assert_eq!(f.probe.last_frame().unwrap().pixels, vec![RED; 4]);
    }

    #[test]
    fn test_queue_unknown_animation() {
        let f = fixture();
        assert!(matches!(
            f.animator.queue("missing"),
            Err(LightsError::UnknownAnimation { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_handoff_allows_at_most_one_more_frame() {
        let f = fixture();
        f.store.save("red", solid(255, 0, 0).as_bytes()).unwrap();
        f.store.save("blue", solid(0, 0, 255).as_bytes()).unwrap();

        f.animator.queue("red").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 3));

        f.animator.queue("blue").unwrap();
        let queued_at = f.probe.writes();
        assert!(wait_until(|| f
            .probe
            .last_frame()
            .is_some_and(|frame| frame.pixels == vec![BLUE; 4])));

        let late_red = f
            .probe
            .history()
            .into_iter()
            .filter(|frame| frame.seq > queued_at && frame.pixels == vec![RED; 4])
            .count();
        assert!(late_red <= 1, "{late_red} frames of the old animation after hand-off");
        assert_eq!(f.animator.current().as_deref(), Some("blue"));
    }

    #[test]
    fn test_latest_request_wins() {
        let f = fixture();
        for name in ["a", "b", "c"] {
            f.store.save(name, solid(1, 2, 3).as_bytes()).unwrap();
        }

        for name in ["a", "b", "c"] {
            f.animator.queue(name).unwrap();
        }
        assert!(wait_until(|| f.animator.current().as_deref() == Some("c")));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(f.animator.current().as_deref(), Some("c"));
    }

    #[test]
    fn test_pause_is_idempotent_and_forces_instant_mode() {
        let f = fixture();
        let wat = r#"(module
            (import "env" "set_queued_mode" (func $queued))
            (import "env" "fill" (func $fill (param i32 i32 i32)))
            (import "env" "show" (func $show))
            (func (export "animate")
              (call $queued)
              (call $fill (i32.const 9) (i32.const 9) (i32.const 9))
              (call $show)))"#;
        f.store.save("queued", wat.as_bytes()).unwrap();

        f.animator.queue("queued").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 3));

        f.animator.pause();
        assert_eq!(f.animator.current(), None);
        assert_eq!(f.surface.snapshot().unwrap().mode, WriteMode::Instant);

        let settled = f.probe.writes();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(f.probe.writes(), settled, "no frames after pause");

        f.animator.pause();
        assert_eq!(f.animator.current(), None);
        assert_eq!(f.surface.snapshot().unwrap().mode, WriteMode::Instant);
    }

    #[test]
    fn test_pause_when_idle_returns() {
        let f = fixture();
        f.animator.pause();
        f.animator.pause();
        assert_eq!(f.animator.current(), None);
    }

    #[test]
    fn test_frame_failure_goes_idle() {
        let f = fixture();
        let wat = r#"(module
            (import "env" "fill" (func $fill (param i32 i32 i32)))
            (func (export "animate")
              (call $fill (i32.const 1) (i32.const 1) (i32.const 1))
              unreachable))"#;
        f.store.save("crash", wat.as_bytes()).unwrap();

        f.animator.queue("crash").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 1));
        assert!(wait_until(|| f.animator.current().is_none()));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(f.probe.writes(), 1, "failed animation is not retried");
    }

    #[test]
    fn test_load_failure_keeps_current_animation() {
        let f = fixture();
        f.store.save("red", solid(255, 0, 0).as_bytes()).unwrap();
        f.store.save("broken", b"not wasm").unwrap();

        f.animator.queue("red").unwrap();
        assert!(wait_until(|| f.animator.current().as_deref() == Some("red")));

        f.animator.queue("broken").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(f.animator.current().as_deref(), Some("red"));

        let writes = f.probe.writes();
        assert!(wait_until(|| f.probe.writes() > writes));
    }

    #[test]
    fn test_stop_is_terminal() {
        let f = fixture();
        f.store.save("red", solid(255, 0, 0).as_bytes()).unwrap();
        f.animator.queue("red").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 1));

        f.animator.stop();
        assert!(f.animator.is_stopped());
        assert_eq!(f.animator.current(), None);
        assert!(matches!(
            f.animator.queue("red"),
            Err(LightsError::AnimatorStopped)
        ));

        let settled = f.probe.writes();
        f.animator.pause();
        f.animator.stop();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(f.probe.writes(), settled);
    }

    #[test]
    fn test_pause_interrupts_runaway_frame() {
        let f = fixture_with(SandboxProfile {
            frame_budget: Duration::from_millis(200),
            ..SandboxProfile::default()
        });
        let wat = r#"(module
            (import "env" "fill" (func $fill (param i32 i32 i32)))
            (func (export "animate")
              (call $fill (i32.const 5) (i32.const 5) (i32.const 5))
              (loop $forever (br $forever))))"#;
        f.store.save("spin", wat.as_bytes()).unwrap();

        f.animator.queue("spin").unwrap();
        assert!(wait_until(|| f.probe.writes() >= 1));

        let started = Instant::now();
        f.animator.pause();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(f.animator.current(), None);
        assert_eq!(f.surface.snapshot().unwrap().mode, WriteMode::Instant);
    }
}
