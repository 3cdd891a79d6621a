//! Performance diagnostics.
//!
//! - [`PerfScope`]: times a scope and reports it when it runs long
//! - [`ProcessMonitor`]: background sampler of a process' CPU and memory

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::events::Diagnostics;

/// Reports `name` as a performance diagnostic on drop if it took at least `threshold`.
pub struct PerfScope<'a> {
    name: &'a str,
    threshold: Duration,
    started: Instant,
    diag: &'a Diagnostics,
}

impl<'a> PerfScope<'a> {
    pub fn track(name: &'a str, threshold: Duration, diag: &'a Diagnostics) -> Self {
        Self {
            name,
            threshold,
            started: Instant::now(),
            diag,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for PerfScope<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        if elapsed >= self.threshold {
            self.diag.perf(format!(
                "{} took {:.2} ms",
                self.name,
                elapsed.as_secs_f64() * 1000.0
            ));
        }
    }
}

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Samples CPU and resident memory of one process until dropped.
pub struct ProcessMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessMonitor {
    pub fn start(pid: u32, label: impl Into<String>, interval: Duration, diag: Diagnostics) -> Self {
        let interval = interval.max(MIN_SAMPLE_INTERVAL);
        let label = label.into();
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("perf-monitor".into())
            .spawn(move || {
                let pid = Pid::from_u32(pid);
                let mut system = System::new();
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                    match system.process(pid) {
                        Some(process) => diag.perf(format!(
                            "[{label}] CPU: {:.2}% | RAM: {:.2} MB",
                            process.cpu_usage(),
                            process.memory() as f64 / 1_048_576.0
                        )),
                        None => {
                            diag.warn(format!("[{label}] process {pid} is gone, monitor stopped"));
                            break;
                        }
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to start process monitor: {e}");
                None
            }
        };

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
