//! The capture-match-act loop.
//!
//! One [`AutomationLoop`] lives on the worker thread for the length of a run.
//! Each sweep walks every task's icon groups, captures a fresh frame per group
//! and fires the task's actions when the whole group matches.
//!
//! Before each group the target's focus is checked against the run's
//! [`FocusPolicy`]: clicks land on whatever is on screen, so an unfocused
//! target either pauses the loop or ends the run.

use std::sync::Arc;
use std::time::Instant;

use super::actions::ActionExecutor;
use crate::cancel::CancelToken;
use crate::error::{InvalidTemplate, RunFault};
use crate::events::Diagnostics;
use crate::perf::PerfScope;
use crate::task::{FocusPolicy, IconGroup, RunConfig, Task};
use crate::vision::capture::{CaptureProvider, SLOW_CAPTURE};
use crate::vision::matcher;
use crate::vision::template_cache::TemplateCache;
use crate::vision::{Frame, MatchResult, Rect, Template, WindowHandle};

/// Scores a frame against a template.
pub trait Scorer: Send {
    fn score(&mut self, frame: &Frame, template: &Template) -> Result<MatchResult, InvalidTemplate>;
}

/// Zero-mean normalized cross-correlation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NccMatcher;

impl Scorer for NccMatcher {
    fn score(&mut self, frame: &Frame, template: &Template) -> Result<MatchResult, InvalidTemplate> {
        matcher::match_template(frame, template)
    }
}

pub struct AutomationLoop {
    config: Arc<RunConfig>,
    handle: WindowHandle,
    capture: CaptureProvider,
    cache: TemplateCache,
    scorer: Box<dyn Scorer>,
    executor: ActionExecutor,
    cancel: CancelToken,
    diag: Diagnostics,
    focus_lost: bool,
    focus_query_failed: bool,
}

impl AutomationLoop {
    /// Assemble a loop. `cache` decides the run id; the capture provider is
    /// re-armed for it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RunConfig,
        handle: WindowHandle,
        mut capture: CaptureProvider,
        cache: TemplateCache,
        scorer: Box<dyn Scorer>,
        executor: ActionExecutor,
        cancel: CancelToken,
        diag: Diagnostics,
    ) -> Self {
        capture.begin_run(cache.run_id());
        Self {
            config: Arc::new(config),
            handle,
            capture,
            cache,
            scorer,
            executor,
            cancel,
            diag,
            focus_lost: false,
            focus_query_failed: false,
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Drop every cached template and return how many there were. Called
    /// once by the run's teardown.
    pub fn release(&mut self) -> usize {
        let count = self.cache.len();
        self.cache.clear();
        count
    }

    /// Sweep until the run leaves `Running` or a fault occurs.
    pub fn run(&mut self) -> Result<(), RunFault> {
        let poll_interval = self.config.poll_interval;

        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            let matched = self.sweep()?;
            if self.cancel.is_cancelled() {
                break;
            }

            if !matched {
                // Pace idle sweeps to the poll interval, counting backoff sleeps.
                let rest = poll_interval.saturating_sub(started.elapsed());
                if !self.cancel.sleep(rest) {
                    break;
                }
            }
        }

        log::debug!("Automation loop for window {} exited", self.handle);
        Ok(())
    }

    /// One pass over every task. Returns whether any icon group matched.
    pub fn sweep(&mut self) -> Result<bool, RunFault> {
        let config = Arc::clone(&self.config);
        let mut matched_any = false;

        for task in &config.tasks {
            if self.cancel.is_cancelled() {
                return Ok(matched_any);
            }
            if !self.run_task(task, &mut matched_any)? {
                return Ok(matched_any);
            }
        }

        Ok(matched_any)
    }

    /// Returns `false` when the sweep should end early: the run was cancelled
    /// mid-task or the target lost focus.
    fn run_task(&mut self, task: &Task, matched_any: &mut bool) -> Result<bool, RunFault> {
        for group in &task.icon_groups {
            if self.cancel.is_cancelled() || !self.target_has_focus() {
                return Ok(false);
            }

            match self.evaluate_group(group)? {
                Some((results, rect, scale)) => {
                    *matched_any = true;
                    let target = usize::try_from(task.target_index)
                        .ok()
                        .and_then(|idx| results.get(idx));
                    match target {
                        Some(target) => {
                            log::info!(
                                "Matched {} ({:.3}), running {} actions",
                                target.template.display(),
                                target.confidence,
                                task.actions.len()
                            );
                            let target = target.to_window_units(scale);
                            self.executor.execute(rect, &task.actions, &target)?;
                        }
                        None => self.diag.warn(format!(
                            "Target index {} out of range for a group of {}, actions skipped",
                            task.target_index,
                            results.len()
                        )),
                    }
                }
                None => {
                    let backoff = self.config.no_match_delay;
                    if !backoff.is_zero() && !self.cancel.sleep(backoff) {
                        return Ok(false);
                    }
                }
            }
        }

        if !task.delay.is_zero() && !self.cancel.sleep(task.delay) {
            return Ok(false);
        }
        Ok(true)
    }

    /// Apply the focus policy. Returns whether the loop may act on the window.
    fn target_has_focus(&mut self) -> bool {
        let policy = self.config.on_focus_loss;
        if policy == FocusPolicy::Ignore {
            return true;
        }

        let focused = match self.capture.is_foreground(self.handle) {
            Ok(focused) => focused,
            Err(e) => {
                if !self.focus_query_failed {
                    self.focus_query_failed = true;
                    self.diag.warn(format!(
                        "Cannot tell whether window {} has focus ({e}), carrying on",
                        self.handle
                    ));
                }
                true
            }
        };

        if focused {
            if self.focus_lost {
                self.focus_lost = false;
                self.diag.info(format!("Window {} has focus again, resuming", self.handle));
            }
            return true;
        }

        match policy {
            FocusPolicy::Stop => {
                if self.cancel.stop_run() {
                    self.diag.warn(format!("Window {} lost focus, stopping the run", self.handle));
                }
            }
            _ if !self.focus_lost => {
                self.focus_lost = true;
                self.diag.warn(format!(
                    "Window {} is not focused, pausing until it is",
                    self.handle
                ));
            }
            _ => {}
        }
        false
    }

    /// Capture once and match the group's templates in order, stopping at the
    /// first one below threshold. Also returns the frame's pixel scale
    /// relative to the window rectangle.
    fn evaluate_group(
        &mut self,
        group: &IconGroup,
    ) -> Result<Option<(Vec<MatchResult>, Rect, (f64, f64))>, RunFault> {
        let diag = self.diag.clone();
        let _scope = PerfScope::track(
            "capture and match",
            self.config.poll_interval.max(SLOW_CAPTURE),
            &diag,
        );

        let (frame, rect) = self.capture.capture_window(self.handle, &self.cancel)?;
        let threshold = self.config.match_threshold;
        let mut results = Vec::with_capacity(group.len());

        for icon in &group.icons {
            let template = self.cache.resolve(&self.config.icon_path(icon))?;
            let result = self.scorer.score(&frame, &template)?;
            if threshold <= 0.0 || result.confidence < threshold {
                log::debug!(
                    "{} scored {:.3} (threshold {:.3}), group not matched",
                    icon,
                    result.confidence,
                    threshold
                );
                return Ok(None);
            }
            results.push(result);
        }

        Ok(Some((results, rect, frame.pixel_scale(&rect))))
    }
}
