//! Start/stop lifecycle of the automation worker.
//!
//! ```text
//! Idle --start--> Starting --spawned--> Running --stop/fault--> Stopping --teardown--> Idle
//! ```
//!
//! The controller never touches the worker's cache or frames. It flips the
//! shared state, disconnects the stop channels and waits a bounded time for
//! the worker's exit signal; the worker's [`Teardown`] guard does the rest.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

use super::actions::{ActionExecutor, CLICK_HOLD};
use super::automation::{AutomationLoop, NccMatcher, Scorer};
use super::input::{EnigoInput, InputProvider};
use crate::cancel::{RunState, SharedRunState, StopSignal};
use crate::error::StartError;
use crate::events::{Diagnostics, RunEvent};
use crate::perf::ProcessMonitor;
use crate::task::RunConfig;
use crate::vision::WindowHandle;
use crate::vision::capture::{CaptureBackend, CaptureProvider};
use crate::vision::template_cache::{DiskSource, TemplateCache, TemplateSource};
use crate::vision::xcap_backend::XcapBackend;

/// How long `stop` waits for a cooperative exit.
pub const GRACEFUL_STOP: Duration = Duration::from_secs(2);
/// Extra wait after blocking calls were interrupted.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(1);
/// Events buffered for a listener that is not draining; older ones are dropped.
pub const EVENT_CAPACITY: usize = 256;

/// Builds the per-run collaborators of a worker.
pub trait Platform: Send {
    fn capture_backend(&self) -> Box<dyn CaptureBackend>;
    fn input_provider(&self) -> Box<dyn InputProvider>;

    fn template_source(&self) -> Box<dyn TemplateSource> {
        Box::new(DiskSource)
    }

    fn scorer(&self) -> Box<dyn Scorer> {
        Box::new(NccMatcher)
    }

    fn click_hold(&self) -> Duration {
        CLICK_HOLD
    }
}

/// xcap capture, enigo input, icons from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopPlatform;

impl Platform for DesktopPlatform {
    fn capture_backend(&self) -> Box<dyn CaptureBackend> {
        Box::new(XcapBackend::new())
    }

    fn input_provider(&self) -> Box<dyn InputProvider> {
        Box::new(EnigoInput::new())
    }
}

struct Worker {
    run_id: Uuid,
    signal: StopSignal,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Wait for the worker thread to finish. Returns `true` if it did.
    fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done_rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected) | Ok(())
        )
    }

    fn join(self) {
        if self.handle.join().is_err() {
            log::error!("Automation worker for run {} panicked", self.run_id);
        }
    }
}

/// Runs on the worker thread after the loop returns, however it returns.
struct Teardown {
    automation: AutomationLoop,
    state: SharedRunState,
    diag: Diagnostics,
    run_id: Uuid,
    monitor: Option<ProcessMonitor>,
    faulted: bool,
    // Dropped last: disconnecting it tells `stop` the worker is done.
    _done_tx: Sender<()>,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.state.transition(RunState::Running, RunState::Stopping);

        if thread::panicking() && !self.faulted {
            self.faulted = true;
            self.diag.error("Automation worker panicked");
            self.diag.send(RunEvent::Fault("automation worker panicked".into()));
        }

        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        let released = self.automation.release();
        self.diag.info(format!(
            "Automation run {} finished, released {released} cached templates",
            self.run_id
        ));
        self.diag.send(RunEvent::Finished(self.run_id));
        self.state.set(RunState::Idle);
    }
}

pub struct RunController {
    state: SharedRunState,
    events_tx: Sender<RunEvent>,
    events_rx: Receiver<RunEvent>,
    platform: Box<dyn Platform>,
    worker: Option<Worker>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    pub fn new() -> Self {
        Self::with_platform(Box::new(DesktopPlatform))
    }

    pub fn with_platform(platform: Box<dyn Platform>) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        Self {
            state: SharedRunState::new(),
            events_tx,
            events_rx,
            platform,
            worker: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == RunState::Running
    }

    /// Event stream shared by every run of this controller. Holds at most
    /// [`EVENT_CAPACITY`] events; when full the oldest are discarded.
    pub fn events(&self) -> Receiver<RunEvent> {
        self.events_rx.clone()
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::keep_latest(self.events_tx.clone(), self.events_rx.clone())
    }

    /// Start a run against `handle` with a frozen copy of `config`.
    pub fn start(&mut self, config: RunConfig, handle: WindowHandle) -> Result<(), StartError> {
        if !self.state.transition(RunState::Idle, RunState::Starting) {
            return Err(match self.state.get() {
                RunState::Stopping => StartError::Stopping,
                _ => StartError::AlreadyRunning,
            });
        }

        // Idle means the previous worker is past its teardown.
        if let Some(previous) = self.worker.take() {
            previous.join();
        }

        if let Err(e) = config.validate() {
            self.state.set(RunState::Idle);
            return Err(e.into());
        }

        let run_id = Uuid::new_v4();
        let diag = self.diagnostics();
        let (signal, cancel) = StopSignal::pair(self.state.clone());
        let (done_tx, done_rx) = bounded::<()>(0);

        let capture = CaptureProvider::new(self.platform.capture_backend(), diag.clone());
        let cache = TemplateCache::with_source(run_id, self.platform.template_source());
        let executor = ActionExecutor::new(self.platform.input_provider(), diag.clone())
            .with_click_hold(self.platform.click_hold());
        let monitor_interval = config.monitor_interval;
        let process_name = config.process_name.clone();
        let automation = AutomationLoop::new(
            config,
            handle,
            capture,
            cache,
            self.platform.scorer(),
            executor,
            cancel,
            diag.clone(),
        );

        // Running before spawn: the loop's first checkpoint must see it.
        self.state.set(RunState::Running);

        let state = self.state.clone();
        let spawned = thread::Builder::new()
            .name("automation".into())
            .spawn(move || {
                let monitor = monitor_interval.map(|interval| {
                    ProcessMonitor::start(std::process::id(), "autoclick", interval, diag.clone())
                });
                let mut teardown = Teardown {
                    automation,
                    state,
                    diag,
                    run_id,
                    monitor,
                    faulted: false,
                    _done_tx: done_tx,
                };

                teardown.diag.send(RunEvent::Started(run_id));
                teardown.diag.info(format!(
                    "Automation run {run_id} started for '{process_name}' (window {handle})"
                ));

                if let Err(fault) = teardown.automation.run() {
                    if teardown.state.transition(RunState::Running, RunState::Stopping) {
                        teardown.faulted = true;
                        teardown.diag.error(format!("Automation stopped: {fault}"));
                        teardown.diag.send(RunEvent::Fault(fault.to_string()));
                    } else {
                        // A stop was already under way and interrupted us.
                        teardown.diag.info(format!("Run {run_id} ended while stopping: {fault}"));
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    run_id,
                    signal,
                    done_rx,
                    handle,
                });
                Ok(())
            }
            Err(e) => {
                self.state.set(RunState::Idle);
                Err(StartError::Spawn(e))
            }
        }
    }

    /// Stop the current run, if any. Never blocks much longer than
    /// [`GRACEFUL_STOP`] + [`INTERRUPT_GRACE`].
    pub fn stop(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        self.state.transition(RunState::Running, RunState::Stopping);
        worker.signal.request_stop();
        if worker.wait(GRACEFUL_STOP) {
            worker.join();
            return;
        }

        log::warn!(
            "Run {} did not stop within {:?}, interrupting blocking calls",
            worker.run_id,
            GRACEFUL_STOP
        );
        worker.signal.interrupt();
        if worker.wait(INTERRUPT_GRACE) {
            worker.join();
            return;
        }

        // Detached: the thread still owns its teardown and will reach Idle.
        self.diagnostics().warn(format!(
            "Run {} is unresponsive, detaching its worker",
            worker.run_id
        ));
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        self.stop();
    }
}
