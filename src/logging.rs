//! Logger setup for the binary.
//!
//! Lines look like `[2024-05-01 12:00:00.123] [INFO] message` and go to stderr
//! and to a per-session `AutoClick_<timestamp>.log` file.

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::{Env, Target};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes every line to stderr and to the session file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// `<local data dir>/autoclick/logs`, or `./logs` when there is none.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("autoclick").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Label printed for a record. Performance diagnostics get their own.
fn level_label(record: &log::Record<'_>) -> String {
    if record.target() == "perf" {
        "PERF".to_string()
    } else {
        record.level().to_string()
    }
}

/// Install the global logger. Returns the session log file path.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init(log_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    let path = dir.join(format!("AutoClick_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                level_label(record),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .context("logger already initialised")?;

    Ok(path)
}
