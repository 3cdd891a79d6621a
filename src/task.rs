use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// A single declarative input step executed after a group match.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionSpec {
    /// Move the pointer to the match anchor plus an offset.
    Move { offset_x: i32, offset_y: i32 },
    /// Press and release the primary button at the current pointer position.
    Click,
    /// Block the worker for `ms` milliseconds (negative values clamp to 0).
    Delay { ms: i64 },
    /// Anything the config named that we don't know how to perform.
    Unknown { type_name: String },
}

impl ActionSpec {
    pub fn name(&self) -> &str {
        match self {
            ActionSpec::Move { .. } => "move",
            ActionSpec::Click => "click",
            ActionSpec::Delay { .. } => "delay",
            ActionSpec::Unknown { type_name } => type_name,
        }
    }
}

/// Ordered template file names that must all match, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IconGroup {
    pub icons: Vec<String>,
}

impl IconGroup {
    pub fn new<I, S>(icons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            icons: icons.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

/// What the loop does while the target window is not the focused window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusPolicy {
    /// Keep capturing and clicking regardless of focus.
    Ignore,
    /// Skip sweeps until the window is focused again.
    #[default]
    Pause,
    /// End the run.
    Stop,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub icon_groups: Vec<IconGroup>,
    /// Which member of a matched group feeds the action sequence. Negative or
    /// out-of-range values skip the actions with a warning.
    pub target_index: i64,
    pub actions: Vec<ActionSpec>,
    /// Sleep after this task's groups have been processed.
    pub delay: Duration,
}

/// Resolved, validated settings for one automation run.
///
/// Frozen when the run starts; the worker owns its copy.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub process_name: String,
    /// Minimum confidence for a template to count as matched. `<= 0` disables matching.
    pub match_threshold: f32,
    /// Directory icon names are resolved against.
    pub resource_dir: PathBuf,
    /// Target sweep period when nothing matched.
    pub poll_interval: Duration,
    /// Backoff after an icon group fails to match.
    pub no_match_delay: Duration,
    /// Sample the host process' CPU / memory at this interval while running.
    pub monitor_interval: Option<Duration>,
    pub on_focus_loss: FocusPolicy,
    pub tasks: Vec<Task>,
}

impl RunConfig {
    pub fn icon_path(&self, icon: &str) -> PathBuf {
        self.resource_dir.join(icon)
    }

    /// Reject configurations the loop cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            process: self.process_name.clone(),
            reason,
        };
        if !self.match_threshold.is_finite() {
            return Err(invalid("match threshold must be finite".into()));
        }
        if self.tasks.is_empty() {
            return Err(invalid("no tasks defined".into()));
        }
        for (idx, task) in self.tasks.iter().enumerate() {
            if task.icon_groups.is_empty() {
                return Err(invalid(format!("task {idx} has no icon groups")));
            }
            if let Some(g) = task.icon_groups.iter().position(IconGroup::is_empty) {
                return Err(invalid(format!("task {idx} icon group {g} is empty")));
            }
        }
        Ok(())
    }
}
