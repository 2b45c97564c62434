//! Repeating background scheduler.
//!
//! Runs a callback on its own worker thread every `interval`, anchored to the
//! time `start` was called. The next deadline is armed before the callback is
//! invoked, so a slow, failing or panicking callback never stops the cadence.
//! The callback never overlaps with itself: if it overruns, the next fire
//! happens as soon as it returns and any further missed slots are skipped.

mod cadence;

pub use cadence::{Cadence, Phase};

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler '{0}' is already running")]
    AlreadyRunning(String),

    #[error("scheduler interval must be greater than zero")]
    ZeroInterval,

    #[error("scheduler interval {0:?} is too large")]
    IntervalTooLarge(Duration),

    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct State {
    phase: Phase,
    cadence: Option<Cadence>,
    /// Bumped on every `start`; a worker exits once its generation is stale.
    generation: u64,
    fired: u64,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A drift-corrected repeating timer with a single background worker.
pub struct RepeatingScheduler {
    name: String,
    shared: Arc<Shared>,
}

impl RepeatingScheduler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    phase: Phase::Stopped,
                    cadence: None,
                    generation: 0,
                    fired: 0,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts firing `task` every `interval`, first after one full interval.
    ///
    /// Errors returned by `task` and panics inside it are logged; the
    /// scheduler keeps going either way.
    pub fn start<F, E>(&self, interval: Duration, task: F) -> Result<(), SchedulerError>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: Display,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let Some(cadence) = Cadence::new(Instant::now(), interval) else {
            return Err(SchedulerError::IntervalTooLarge(interval));
        };
        let generation = {
            let mut state = self.shared.lock();
            if state.phase != Phase::Stopped {
                return Err(SchedulerError::AlreadyRunning(self.name.clone()));
            }
            state.generation += 1;
            state.cadence = Some(cadence);
            state.phase = Phase::Armed;
            state.generation
        };

        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("{}-scheduler", self.name))
            .spawn(move || run_worker(&shared, &name, generation, task));

        if let Err(err) = spawned {
            let mut state = self.shared.lock();
            if state.generation == generation {
                state.phase = Phase::Stopped;
                state.cadence = None;
            }
            return Err(SchedulerError::Spawn(err));
        }

        log::info!("Scheduler '{}' started with interval {:?}", self.name, interval);
        Ok(())
    }

    /// Cancels pending fires. Safe to call from any thread, any number of times.
    ///
    /// Once this returns no new invocation will begin. An invocation already
    /// running is left to finish on the worker; this call does not wait for it.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.shared.lock();
            let was_running = state.phase != Phase::Stopped;
            state.phase = Phase::Stopped;
            state.cadence = None;
            was_running
        };
        self.shared.wake.notify_all();

        if was_running {
            log::info!("Scheduler '{}' stopped", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() != Phase::Stopped
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Total number of invocations begun since creation.
    pub fn fired(&self) -> u64 {
        self.shared.lock().fired
    }
}

impl Drop for RepeatingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<F, E>(shared: &Shared, name: &str, generation: u64, mut task: F)
where
    F: FnMut() -> Result<(), E>,
    E: Display,
{
    loop {
        if !wait_for_deadline(shared, name, generation) {
            log::debug!("Scheduler '{}' worker exiting", name);
            return;
        }

        match panic::catch_unwind(AssertUnwindSafe(&mut task)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("Scheduler '{}' task failed: {}", name, err),
            Err(payload) => log::error!(
                "Scheduler '{}' task panicked: {}",
                name,
                panic_message(payload.as_ref())
            ),
        }

        let mut state = shared.lock();
        if state.generation == generation && state.phase == Phase::Firing {
            state.phase = Phase::Armed;
        }
    }
}

/// Blocks until the armed deadline passes, then re-arms and marks the task as
/// firing. Returns false once the scheduler was stopped or restarted, or when
/// the next deadline cannot be represented.
fn wait_for_deadline(shared: &Shared, name: &str, generation: u64) -> bool {
    let mut state = shared.lock();
    loop {
        if state.generation != generation || state.phase == Phase::Stopped {
            return false;
        }
        let now = Instant::now();
        let Some(cadence) = state.cadence.as_mut() else {
            return false;
        };

        if cadence.is_due(now) {
            let Some(skipped) = cadence.advance(now) else {
                log::error!(
                    "Scheduler '{}' cannot arm a deadline past {:?}, stopping",
                    name,
                    cadence.next_deadline() - cadence.origin()
                );
                state.phase = Phase::Stopped;
                state.cadence = None;
                return false;
            };
            if skipped > 0 {
                log::warn!(
                    "Scheduler '{}' overran its {:?} interval, skipped {} slot(s)",
                    name,
                    cadence.interval(),
                    skipped
                );
            }
            log::trace!(
                "Scheduler '{}' fire #{}, next slot at +{:?}",
                name,
                cadence.fired(),
                cadence.next_deadline() - cadence.origin()
            );
            state.phase = Phase::Firing;
            state.fired += 1;
            return true;
        }

        let delay = cadence.delay(now);
        state = match shared.wake.wait_timeout(state, delay) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
