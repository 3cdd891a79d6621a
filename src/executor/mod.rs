//! Automation execution.
//!
//! - [`RunController`]: owns the worker thread and its start/stop protocol
//! - [`AutomationLoop`]: the capture-match-act loop the worker runs
//! - [`ActionExecutor`]: performs a matched task's actions through an [`InputProvider`]

pub mod actions;
pub mod automation;
pub mod controller;
pub mod input;

pub use actions::{ANCHOR_OFFSET, ActionExecutor, CLICK_HOLD};
pub use automation::{AutomationLoop, NccMatcher, Scorer};
pub use controller::{
    DesktopPlatform, EVENT_CAPACITY, GRACEFUL_STOP, INTERRUPT_GRACE, Platform, RunController,
};
pub use input::{EnigoInput, InputProvider};

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod test_run_controller;
