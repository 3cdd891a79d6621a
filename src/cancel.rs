//! Run state and cooperative cancellation.
//!
//! [`SharedRunState`] is the only datum shared between the controller and the
//! worker. Stop requests are additionally signalled by disconnecting
//! channels, which wakes any `recv_timeout` sleeping on them immediately.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl RunState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RunState::Starting,
            2 => RunState::Running,
            3 => RunState::Stopping,
            _ => RunState::Idle,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedRunState(Arc<AtomicU8>);

impl SharedRunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from` -> `to` atomically. Returns false if the state was not `from`.
    pub fn transition(&self, from: RunState, to: RunState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Controller side of a run's cancellation.
pub struct StopSignal {
    stop_tx: Option<Sender<()>>,
    interrupt_tx: Option<Sender<()>>,
}

impl StopSignal {
    /// Create a signal and the token the worker observes it through.
    pub fn pair(state: SharedRunState) -> (StopSignal, CancelToken) {
        let (stop_tx, stop_rx) = bounded(0);
        let (interrupt_tx, interrupt_rx) = bounded(0);
        (
            StopSignal {
                stop_tx: Some(stop_tx),
                interrupt_tx: Some(interrupt_tx),
            },
            CancelToken {
                state,
                stop_rx,
                interrupt_rx,
            },
        )
    }

    /// Wake the worker out of any cancellable sleep.
    pub fn request_stop(&mut self) {
        self.stop_tx.take();
    }

    /// Ask blocking backend calls to give up.
    pub fn interrupt(&mut self) {
        self.stop_tx.take();
        self.interrupt_tx.take();
    }
}

/// Worker side: checked at every phase boundary and passed into blocking calls.
#[derive(Clone)]
pub struct CancelToken {
    state: SharedRunState,
    stop_rx: Receiver<()>,
    interrupt_rx: Receiver<()>,
}

impl CancelToken {
    /// True once the run is no longer `Running`. Never cached.
    pub fn is_cancelled(&self) -> bool {
        self.state.get() != RunState::Running
    }

    /// Sleep up to `duration`, returning early on a stop request.
    ///
    /// Returns `true` if the run is still live afterwards.
    pub fn sleep(&self, duration: Duration) -> bool {
        if !duration.is_zero() {
            match self.stop_rx.recv_timeout(duration) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => return false,
            }
        }
        !self.is_cancelled()
    }

    /// End the run from the worker side: `Running` -> `Stopping`. Returns
    /// false if the run was already leaving `Running`.
    pub(crate) fn stop_run(&self) -> bool {
        self.state.transition(RunState::Running, RunState::Stopping)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.interrupt_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block up to `duration` or until interrupted. Returns `true` if interrupted.
    pub fn wait_interrupt(&self, duration: Duration) -> bool {
        matches!(
            self.interrupt_rx.recv_timeout(duration),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}
