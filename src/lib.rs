//! # autoclick
//!
//! Screen-perception automation: capture a target window, match icon
//! templates against it and drive the mouse when a configured icon group
//! matches.
//!
//! ```text
//! RunController ── spawns ──> AutomationLoop
//!                               ├─ CaptureProvider ── CaptureBackend (xcap)
//!                               ├─ TemplateCache ─── TemplateSource (disk)
//!                               ├─ Scorer (NCC)
//!                               └─ ActionExecutor ── InputProvider (enigo)
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod perf;
pub mod task;
pub mod vision;

pub use cancel::RunState;
pub use error::{ConfigError, RunFault, StartError};
pub use events::{RunEvent, Severity};
pub use executor::RunController;
pub use task::{ActionSpec, FocusPolicy, IconGroup, RunConfig, Task};
