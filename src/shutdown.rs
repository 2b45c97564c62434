//! Signal-driven, run-once shutdown.
//!
//! Termination signals are delivered on a dedicated thread (via
//! `signal-hook`), so cleanup runs as ordinary code rather than inside a
//! signal handler. `trigger` can also be called directly, which is how a
//! render failure shuts the process down and how the tests simulate signals.

use signal_hook::consts::{SIGABRT, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::scheduler::panic_message;

pub type StepError = Box<dyn Error + Send + Sync>;

type Step = Box<dyn FnOnce() -> Result<(), StepError> + Send>;
type ExitFn = Box<dyn Fn(i32) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("failed to register signal handlers: {0}")]
    Register(#[from] std::io::Error),
}

/// Termination signals the daemon reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Abort,
    Interrupt,
    Terminate,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [SignalKind::Abort, SignalKind::Interrupt, SignalKind::Terminate];

    pub fn as_raw(self) -> i32 {
        match self {
            SignalKind::Abort => SIGABRT,
            SignalKind::Interrupt => SIGINT,
            SignalKind::Terminate => SIGTERM,
        }
    }

    pub fn from_raw(signal: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_raw() == signal)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Abort => "SIGABRT",
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Why shutdown started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Signal(SignalKind),
    RenderFailure,
}

impl Trigger {
    pub fn exit_code(self) -> i32 {
        match self {
            Trigger::Signal(_) => 0,
            Trigger::RenderFailure => 1,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Signal(kind) => write!(f, "{}", kind),
            Trigger::RenderFailure => f.write_str("render failure"),
        }
    }
}

/// Ordered cleanup steps. A failing or panicking step is logged and the
/// remaining steps still run.
#[derive(Default)]
pub struct Cleanup {
    steps: Vec<(String, Step)>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step<F>(mut self, name: &str, step: F) -> Self
    where
        F: FnOnce() -> Result<(), StepError> + Send + 'static,
    {
        self.steps.push((name.to_string(), Box::new(step)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order; returns how many succeeded.
    pub fn run(self) -> usize {
        let mut succeeded = 0;
        for (name, step) in self.steps {
            match panic::catch_unwind(AssertUnwindSafe(step)) {
                Ok(Ok(())) => {
                    log::debug!("Cleanup step '{}' done", name);
                    succeeded += 1;
                }
                Ok(Err(err)) => log::error!("Cleanup step '{}' failed: {}", name, err),
                Err(payload) => log::error!(
                    "Cleanup step '{}' panicked: {}",
                    name,
                    panic_message(payload.as_ref())
                ),
            }
        }
        succeeded
    }
}

/// Runs cleanup exactly once, then ends the process.
pub struct ShutdownCoordinator {
    triggered: AtomicBool,
    cleanup: Mutex<Option<Cleanup>>,
    exit: ExitFn,
}

impl ShutdownCoordinator {
    /// A coordinator that exits the process after cleanup.
    pub fn new(cleanup: Cleanup) -> Self {
        Self::with_exit(cleanup, |code| std::process::exit(code))
    }

    /// A coordinator with a custom final action instead of `process::exit`.
    pub fn with_exit<F>(cleanup: Cleanup, exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        Self {
            triggered: AtomicBool::new(false),
            cleanup: Mutex::new(Some(cleanup)),
            exit: Box::new(exit),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Starts shutdown. Only the first call runs cleanup and the exit action;
    /// every later call (another signal, the same signal again, a signal
    /// arriving mid-cleanup) returns `false` without doing anything.
    pub fn trigger(&self, reason: Trigger) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            log::debug!("Ignoring {}: shutdown already in progress", reason);
            return false;
        }

        log::info!("{} received, cleaning up", reason);
        let cleanup = self
            .cleanup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(cleanup) = cleanup.filter(|steps| !steps.is_empty()) {
            let total = cleanup.len();
            let succeeded = cleanup.run();
            if succeeded < total {
                log::warn!("{} of {} cleanup steps failed", total - succeeded, total);
            }
        }

        log::info!("Shutdown complete, exiting with status {}", reason.exit_code());
        (self.exit)(reason.exit_code());
        true
    }

    /// Registers `signals` and routes them to `trigger` on a background thread.
    ///
    /// Signals that arrive before this returns get the default disposition.
    pub fn listen(self: &Arc<Self>, signals: &[SignalKind]) -> Result<SignalListener, ShutdownError> {
        let raw: Vec<i32> = signals.iter().map(|kind| kind.as_raw()).collect();
        let mut incoming = Signals::new(&raw)?;
        let handle = incoming.handle();

        let coordinator = Arc::clone(self);
        let thread = std::thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || {
                for signal in incoming.forever() {
                    match SignalKind::from_raw(signal) {
                        Some(kind) => {
                            coordinator.trigger(Trigger::Signal(kind));
                        }
                        None => log::warn!("Unexpected signal {}", signal),
                    }
                }
            })?;

        log::info!(
            "Listening for {}",
            signals.iter().map(|kind| kind.to_string()).collect::<Vec<_>>().join(", ")
        );
        Ok(SignalListener {
            handle,
            thread: Some(thread),
        })
    }
}

/// Background signal delivery; dropping it stops delivery.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Stops delivery and waits for the listener thread, including a shutdown
    /// it is in the middle of.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Coordinator whose exit action records the status instead of exiting.
    fn recording_coordinator(cleanup: Cleanup) -> (Arc<ShutdownCoordinator>, Arc<Mutex<Vec<i32>>>) {
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&exits);
        let coordinator = ShutdownCoordinator::with_exit(cleanup, move |code| {
            recorded.lock().unwrap().push(code);
        });
        (Arc::new(coordinator), exits)
    }

    fn counting_cleanup(counter: &Arc<AtomicUsize>) -> Cleanup {
        let counter = Arc::clone(counter);
        Cleanup::new().step("count", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    // -- trigger ------------------------------------------------------------

    #[test]
    fn trigger_runs_cleanup_then_exits_zero() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (coordinator, exits) = recording_coordinator(counting_cleanup(&counter));
        assert!(!coordinator.is_triggered());
        assert!(coordinator.trigger(Trigger::Signal(SignalKind::Interrupt)));
        assert!(coordinator.is_triggered());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*exits.lock().unwrap(), vec![0]);
    }

    #[test]
    fn second_trigger_is_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (coordinator, exits) = recording_coordinator(counting_cleanup(&counter));
        assert!(coordinator.trigger(Trigger::Signal(SignalKind::Terminate)));
        assert!(!coordinator.trigger(Trigger::Signal(SignalKind::Interrupt)));
        assert!(!coordinator.trigger(Trigger::Signal(SignalKind::Terminate)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(exits.lock().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_signals_clean_up_once() {
        for _ in 0..100 {
            let counter = Arc::new(AtomicUsize::new(0));
            let (coordinator, exits) = recording_coordinator(counting_cleanup(&counter));
            let threads: Vec<_> = [SignalKind::Interrupt, SignalKind::Terminate, SignalKind::Abort]
                .into_iter()
                .map(|kind| {
                    let coordinator = Arc::clone(&coordinator);
                    std::thread::spawn(move || coordinator.trigger(Trigger::Signal(kind)))
                })
                .collect();
            let winners = threads
                .into_iter()
                .map(|t| t.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
            assert_eq!(counter.load(Ordering::SeqCst), 1);
            assert_eq!(exits.lock().unwrap().len(), 1);
        }
    }

    #[test]
    fn signal_during_cleanup_is_ignored() {
        let counter = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<ShutdownCoordinator>>>> = Arc::new(Mutex::new(None));
        let reentrant = Arc::clone(&slot);
        let cleanup = counting_cleanup(&counter).step("re-trigger", move || {
            let coordinator = reentrant.lock().unwrap().clone().unwrap();
            assert!(!coordinator.trigger(Trigger::Signal(SignalKind::Interrupt)));
            Ok(())
        });
        let (coordinator, exits) = recording_coordinator(cleanup);
        *slot.lock().unwrap() = Some(Arc::clone(&coordinator));

        assert!(coordinator.trigger(Trigger::Signal(SignalKind::Terminate)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*exits.lock().unwrap(), vec![0]);
    }

    #[test]
    fn render_failure_exits_one() {
        let (coordinator, exits) = recording_coordinator(Cleanup::new());
        coordinator.trigger(Trigger::RenderFailure);
        assert_eq!(*exits.lock().unwrap(), vec![1]);
    }

    // -- cleanup steps ------------------------------------------------------

    #[test]
    fn failing_step_does_not_skip_later_steps() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second, third) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));
        let cleanup = Cleanup::new()
            .step("stop scheduler", move || {
                first.lock().unwrap().push("stop");
                Err("scheduler lock poisoned".into())
            })
            .step("panic", move || {
                second.lock().unwrap().push("panic");
                panic!("driver bug")
            })
            .step("blank display", move || {
                third.lock().unwrap().push("blank");
                Ok(())
            });

        assert_eq!(cleanup.run(), 1);
        assert_eq!(*order.lock().unwrap(), vec!["stop", "panic", "blank"]);
    }

    #[test]
    fn empty_cleanup() {
        let cleanup = Cleanup::new();
        assert!(cleanup.is_empty());
        assert_eq!(cleanup.run(), 0);
    }

    // -- signals ------------------------------------------------------------

    #[test]
    fn signal_kind_round_trip() {
        for kind in SignalKind::ALL {
            assert_eq!(SignalKind::from_raw(kind.as_raw()), Some(kind));
        }
        assert_eq!(SignalKind::from_raw(signal_hook::consts::SIGHUP), None);
        assert_eq!(SignalKind::Terminate.to_string(), "SIGTERM");
    }

    #[test]
    fn delivered_signal_triggers_shutdown() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (coordinator, exits) = recording_coordinator(counting_cleanup(&counter));
        let listener = coordinator.listen(&[SignalKind::Terminate]).unwrap();

        signal_hook::low_level::raise(SIGTERM).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !coordinator.is_triggered() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        listener.close();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(*exits.lock().unwrap(), vec![0]);
    }
}
