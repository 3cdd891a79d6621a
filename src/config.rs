//! # Configuration file
//!
//! JSON layout shared by every target process:
//!
//! ```json
//! { "ProcessList": [ { "ProcessName": "game", "MatchValue": 0.8,
//!     "ResourcePath": "icons", "Tasks": [ ... ] } ] }
//! ```
//!
//! The raw serde types mirror the file one-to-one; [`ProcessProfile::resolve`]
//! validates a profile and turns it into the typed [`RunConfig`] the engine
//! runs on.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::task::{ActionSpec, FocusPolicy, IconGroup, RunConfig, Task};

const DEFAULT_MATCH_VALUE: f32 = 0.8;
const DEFAULT_RESOURCE_PATH: &str = "resources";
const DEFAULT_POLL_INTERVAL_MS: i64 = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigFile {
    pub process_list: Vec<ProcessProfile>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessProfile {
    pub process_name: String,
    #[serde(default = "default_match_value")]
    pub match_value: f32,
    #[serde(default = "default_resource_path")]
    pub resource_path: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: i64,
    #[serde(default)]
    pub no_match_delay_ms: i64,
    /// `"ignore"`, `"pause"` or `"stop"`.
    #[serde(default)]
    pub on_focus_loss: FocusPolicy,
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEntry {
    #[serde(default)]
    pub icon_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub target_index: i64,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub delay: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionEntry {
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Offset {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

fn default_match_value() -> f32 {
    DEFAULT_MATCH_VALUE
}

fn default_resource_path() -> String {
    DEFAULT_RESOURCE_PATH.to_string()
}

fn default_poll_interval() -> i64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl ConfigFile {
    /// Read and parse a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Profile for `process_name`, compared case-insensitively.
    pub fn for_process(&self, process_name: &str) -> Result<&ProcessProfile, ConfigError> {
        self.process_list
            .iter()
            .find(|p| p.process_name.eq_ignore_ascii_case(process_name))
            .ok_or_else(|| ConfigError::ProcessNotFound(process_name.to_string()))
    }
}

impl ActionEntry {
    /// Map the loosely typed entry onto the closed action set.
    pub fn to_action(&self) -> ActionSpec {
        match self.r#type.to_lowercase().as_str() {
            "move" => {
                let offset = self.offset.unwrap_or_default();
                ActionSpec::Move {
                    offset_x: offset.x,
                    offset_y: offset.y,
                }
            }
            "click" => ActionSpec::Click,
            "delay" => ActionSpec::Delay {
                ms: self.delay.unwrap_or(0),
            },
            _ => ActionSpec::Unknown {
                type_name: self.r#type.clone(),
            },
        }
    }
}

impl ProcessProfile {
    /// Validate this profile and produce the frozen run configuration.
    ///
    /// `config_dir` is the directory of the config file; `ResourcePath` is
    /// resolved relative to it unless absolute.
    pub fn resolve(&self, config_dir: &Path) -> Result<RunConfig, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            process: self.process_name.clone(),
            reason,
        };

        if !self.match_value.is_finite() {
            return Err(invalid("MatchValue must be a finite number".into()));
        }
        if self.poll_interval_ms < 0 {
            return Err(invalid("PollIntervalMs must not be negative".into()));
        }
        if self.no_match_delay_ms < 0 {
            return Err(invalid("NoMatchDelayMs must not be negative".into()));
        }
        if self.tasks.is_empty() {
            return Err(invalid("no Tasks defined".into()));
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for (idx, entry) in self.tasks.iter().enumerate() {
            if entry.icon_groups.is_empty() {
                return Err(invalid(format!("task {idx} has no IconGroups")));
            }
            if let Some(g) = entry.icon_groups.iter().position(|g| g.is_empty()) {
                return Err(invalid(format!("task {idx} icon group {g} is empty")));
            }
            if entry.delay < 0 {
                return Err(invalid(format!("task {idx} Delay is negative")));
            }
            tasks.push(Task {
                icon_groups: entry
                    .icon_groups
                    .iter()
                    .map(|icons| IconGroup::new(icons.iter().cloned()))
                    .collect(),
                target_index: entry.target_index,
                actions: entry.actions.iter().map(ActionEntry::to_action).collect(),
                delay: Duration::from_millis(entry.delay as u64),
            });
        }

        Ok(RunConfig {
            process_name: self.process_name.clone(),
            match_threshold: self.match_value,
            resource_dir: resolve_dir(config_dir, &self.resource_path),
            poll_interval: Duration::from_millis(self.poll_interval_ms as u64),
            no_match_delay: Duration::from_millis(self.no_match_delay_ms as u64),
            monitor_interval: None,
            on_focus_loss: self.on_focus_loss,
            tasks,
        })
    }
}

fn resolve_dir(base: &Path, relative: &str) -> PathBuf {
    let path = Path::new(relative);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Load `path` and resolve the profile for `process_name` in one step.
pub fn load_run_config(path: &Path, process_name: &str) -> Result<RunConfig, ConfigError> {
    let file = ConfigFile::load(path)?;
    let profile = file.for_process(process_name)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    profile.resolve(dir)
}
