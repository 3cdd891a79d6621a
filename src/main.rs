use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use crossbeam_channel::{after, never, select, unbounded};
use std::path::{Path, PathBuf};
use std::time::Duration;

use autoclick::config::{ConfigFile, load_run_config};
use autoclick::events::RunEvent;
use autoclick::executor::RunController;
use autoclick::logging;
use autoclick::vision::template_cache::{DiskSource, TemplateSource};
use autoclick::vision::xcap_backend::XcapBackend;

/// Icon-driven click automation for a target window.
#[derive(Parser, Debug)]
#[command(name = "autoclick", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the automation against a process' window until Enter is pressed.
    Run {
        /// Config file (JSON).
        #[arg(long, short)]
        config: PathBuf,

        /// Process whose profile and window to use.
        #[arg(long, short)]
        process: String,

        /// Stop automatically after this many seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Where session log files go.
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Log CPU / memory of this process every N milliseconds.
        #[arg(long)]
        monitor_ms: Option<u64>,
    },

    /// List capturable windows.
    Windows,

    /// Validate a config file and decode every icon it references.
    Check {
        #[arg(long, short)]
        config: PathBuf,

        /// Only check this process' profile.
        #[arg(long, short)]
        process: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            process,
            duration,
            log_dir,
            monitor_ms,
        } => run(&config, &process, duration, log_dir.as_deref(), monitor_ms),
        Command::Windows => {
            env_logger::init();
            list_windows()
        }
        Command::Check { config, process } => {
            env_logger::init();
            check(&config, process.as_deref())
        }
    }
}

fn run(
    config_path: &Path,
    process: &str,
    duration: Option<u64>,
    log_dir: Option<&Path>,
    monitor_ms: Option<u64>,
) -> Result<()> {
    let log_file = logging::init(log_dir)?;
    log::info!("Logging to {}", log_file.display());

    let mut config = load_run_config(config_path, process)?;
    config.monitor_interval = monitor_ms.map(Duration::from_millis);

    let window = XcapBackend::find_window(process)
        .with_context(|| format!("no capturable window for '{process}'"))?;
    log::info!(
        "Target window {} '{}' at ({}, {}) {}x{}",
        window.handle,
        window.title,
        window.rect.left,
        window.rect.top,
        window.rect.width(),
        window.rect.height()
    );

    // Nothing here can raise the window; the user has to focus it.
    log::info!(
        "Focus the target window; on focus loss the run will {:?}",
        config.on_focus_loss
    );

    let mut controller = RunController::new();
    let events = controller.events();
    controller.start(config, window.handle)?;

    let (enter_tx, enter_rx) = unbounded();
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            let _ = enter_tx.send(());
        })
        .context("failed to spawn stdin reader")?;
    println!("Running. Press Enter to stop.");

    let deadline = match duration {
        Some(secs) => after(Duration::from_secs(secs)),
        None => never(),
    };

    let mut fault = None;
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(RunEvent::Fault(message)) => fault = Some(message),
                Ok(RunEvent::Finished(_)) | Err(_) => break,
                Ok(_) => {}
            },
            recv(enter_rx) -> _ => break,
            recv(deadline) -> _ => {
                log::info!("Run duration elapsed");
                break;
            }
        }
    }

    controller.stop();
    match fault {
        Some(message) => bail!("automation stopped: {message}"),
        None => Ok(()),
    }
}

fn list_windows() -> Result<()> {
    let windows = XcapBackend::list_windows().context("failed to enumerate windows")?;
    for w in windows {
        println!(
            "{:>10}  {:<24} {}{}",
            w.handle,
            w.app_name,
            w.title,
            if w.minimized { "  (minimized)" } else { "" }
        );
    }
    Ok(())
}

fn check(config_path: &Path, process: Option<&str>) -> Result<()> {
    let file = ConfigFile::load(config_path)?;
    let dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let profiles = match process {
        Some(name) => vec![file.for_process(name)?],
        None => file.process_list.iter().collect(),
    };

    let mut failures = 0usize;
    for profile in profiles {
        let config = profile.resolve(dir)?;
        let icons: Vec<&String> = config
            .tasks
            .iter()
            .flat_map(|t| t.icon_groups.iter())
            .flat_map(|g| g.icons.iter())
            .collect();

        for icon in &icons {
            if let Err(e) = DiskSource.load(&config.icon_path(icon)) {
                failures += 1;
                println!("  {e}");
            }
        }
        println!(
            "{}: {} tasks, {} icon references",
            config.process_name,
            config.tasks.len(),
            icons.len()
        );
    }

    if failures > 0 {
        bail!("{failures} icon(s) failed to load");
    }
    println!("OK");
    Ok(())
}
