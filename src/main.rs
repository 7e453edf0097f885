mod app_metadata;
mod config;
mod daemon;
mod error;
mod event_interpreter;
mod ipc;
mod keyboard_monitor;
mod keys;
mod model;
mod modifiers;
mod preferences;
mod ranking;
mod snapshot_store;
mod socket_client;
mod socket_server;
mod sway_client;
mod ui_commands;
mod ui_handler;
mod window_enumerator;
mod window_switcher;

use anyhow::{Context, Result};
use app_metadata::AppMetadataResolver;
use config::{Command, Config};
use daemon::{Daemon, DaemonInputs, DaemonSettings};
use ipc::IpcCommand;
use keyboard_monitor::KeyboardMonitor;
use snapshot_store::WindowSnapshotStore;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use sway_client::SwayBackend;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Get the path to the pidfile
fn get_pidfile_path() -> Result<PathBuf> {
    // Try to use XDG_RUNTIME_DIR, fall back to ~/.cache
    let runtime_dir = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine runtime directory")?;

    Ok(runtime_dir.join("tabswitch.pid"))
}

/// Check if another instance is already running
fn check_pidfile() -> Result<()> {
    let pidfile = get_pidfile_path()?;

    if pidfile.exists() {
        let pid_str = fs::read_to_string(&pidfile).context("Failed to read pidfile")?;
        let pid: u32 = pid_str.trim().parse().context("Invalid PID in pidfile")?;

        if process_exists(pid) {
            anyhow::bail!(
                "Another instance of tabswitch is already running (PID: {}). \
                 If this is incorrect, remove the pidfile at: {}",
                pid,
                pidfile.display()
            );
        } else {
            info!("Removing stale pidfile (PID {} not found)", pid);
            if let Err(e) = fs::remove_file(&pidfile) {
                warn!("Failed to remove stale pidfile: {}", e);
            }
        }
    }

    Ok(())
}

/// Check if a process with the given PID exists
fn process_exists(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs the existence and permission checks only
    let result = unsafe { libc::kill(pid, 0) };
    // EPERM: the process exists but belongs to someone else
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Create the pidfile
fn create_pidfile() -> Result<PidfileGuard> {
    let pidfile = get_pidfile_path()?;
    let pid = std::process::id();

    fs::write(&pidfile, pid.to_string()).context("Failed to write pidfile")?;

    info!("Created pidfile at {} with PID {}", pidfile.display(), pid);

    Ok(PidfileGuard { path: pidfile })
}

/// Guard that removes the pidfile when dropped
struct PidfileGuard {
    path: PathBuf,
}

impl Drop for PidfileGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            error!("Failed to remove pidfile: {}", e);
        } else {
            info!("Removed pidfile at {}", self.path.display());
        }
    }
}

/// Control-socket command for a client subcommand; `None` for the daemon itself
fn ipc_command(command: Command) -> Option<IpcCommand> {
    Some(match command {
        Command::Daemon => return None,
        Command::Show => IpcCommand::Show,
        Command::Next => IpcCommand::Next,
        Command::Prev => IpcCommand::Prev,
        Command::Select => IpcCommand::Select,
        Command::Cancel => IpcCommand::Cancel,
        Command::Status => IpcCommand::Status,
        Command::List => IpcCommand::List,
        Command::Search { query } => IpcCommand::Search(query),
        Command::Query { text } => IpcCommand::Query(text),
        Command::Reload => IpcCommand::Reload,
        Command::Shutdown => IpcCommand::Shutdown,
    })
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let config = Config::parse();

    // Initialize logging
    let log_level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Client mode: forward the command to the running daemon
    if let Some(command) = ipc_command(config.command()) {
        socket_client::send_command_and_exit(command);
    }

    info!("Starting tabswitch daemon");
    info!(
        "Quick-switch threshold: {} ms, cache TTL: {} ms",
        config.quick_switch_ms, config.cache_ttl_ms
    );

    // Check if another instance is already running
    check_pidfile()?;

    // Create pidfile (will be automatically removed when the guard is dropped)
    let _pidfile_guard = create_pidfile()?;

    // Check keyboard device permissions
    keyboard_monitor::check_permissions(config.device.as_deref())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(run_daemon(config))?;

    info!("Daemon exited normally");
    Ok(())
}

/// Wire up the input sources, the control socket and the UI, then run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let settings = DaemonSettings::from_config(&config)?;
    info!(
        "Activation modifier: {:?}",
        settings.interpreter.activation_modifier
    );

    let backend = SwayBackend::new(AppMetadataResolver::new())?;
    let store = Arc::new(WindowSnapshotStore::new(backend, config.store_config()));

    // Create and start keyboard monitor
    let (key_tx, key_rx) = mpsc::unbounded_channel();
    let keyboard_monitor = KeyboardMonitor::new(config.device.as_deref())?;

    // Spawn keyboard monitoring in a dedicated blocking thread
    std::thread::spawn(move || {
        if let Err(e) = keyboard_monitor.monitor_blocking(key_tx) {
            error!("Keyboard monitor error: {}", e);
        }
    });

    let (compositor_tx, compositor_rx) = mpsc::unbounded_channel();
    let sway_events = tokio::spawn(async move {
        if let Err(e) = daemon::monitor_sway_events(compositor_tx).await {
            error!("Sway event monitoring error: {}", e);
        }
    });

    let (ipc_rx, _socket_guard) = socket_server::start_server().await?;

    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let ui = tokio::spawn(ui_handler::handle_ui_commands(ui_rx));

    let daemon = Daemon::new(store, settings, Some(ui_tx));
    let result = daemon
        .run(DaemonInputs {
            keys: key_rx,
            ipc: ipc_rx,
            compositor: compositor_rx,
        })
        .await;

    sway_events.abort();
    if let Err(e) = ui.await {
        warn!("UI task ended abnormally: {}", e);
    }
    result
}
