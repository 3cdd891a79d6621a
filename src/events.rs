//! Diagnostic stream shared by the worker and whoever started it.
//!
//! Every message goes to the `log` facade and, when a listener is attached,
//! onto a channel so a front-end can present it. Senders never block: on a
//! full bounded channel the event is dropped, or the oldest queued event is
//! evicted when the handle holds the channel's receiver.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Performance,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
            Severity::Performance => "PERF",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started(Uuid),
    Diagnostic { severity: Severity, message: String },
    /// The run died. Sent once per run, before `Finished`.
    Fault(String),
    Finished(Uuid),
}

/// Cheap, cloneable handle for emitting diagnostics.
#[derive(Clone, Default)]
pub struct Diagnostics {
    tx: Option<Sender<RunEvent>>,
    evict: Option<Receiver<RunEvent>>,
}

impl Diagnostics {
    pub fn new(tx: Sender<RunEvent>) -> Self {
        Self {
            tx: Some(tx),
            evict: None,
        }
    }

    /// Handle for a bounded channel that keeps the newest events: when the
    /// channel is full the oldest event is taken off `rx` to make room.
    pub fn keep_latest(tx: Sender<RunEvent>, rx: Receiver<RunEvent>) -> Self {
        Self {
            tx: Some(tx),
            evict: Some(rx),
        }
    }

    /// Log-only handle with no listener attached.
    pub fn detached() -> Self {
        Self { tx: None, evict: None }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Severity::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(Severity::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(Severity::Error, message.into());
    }

    pub fn perf(&self, message: impl Into<String>) {
        self.emit(Severity::Performance, message.into());
    }

    pub fn send(&self, event: RunEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        // Listener may be gone or behind; the log line is what matters then.
        if let Err(TrySendError::Full(event)) = tx.try_send(event) {
            if let Some(rx) = &self.evict {
                let _ = rx.try_recv();
                let _ = tx.try_send(event);
            }
        }
    }

    fn emit(&self, severity: Severity, message: String) {
        match severity {
            Severity::Info => log::info!("{message}"),
            Severity::Warning => log::warn!("{message}"),
            Severity::Error => log::error!("{message}"),
            Severity::Performance => log::info!(target: "perf", "{message}"),
        }
        self.send(RunEvent::Diagnostic { severity, message });
    }
}
