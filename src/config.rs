use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::event_interpreter::InterpreterConfig;
use crate::modifiers::Modifier;
use crate::preferences::{self, Preferences};
use crate::snapshot_store::StoreConfig;
use crate::window_enumerator::AssembleOptions;
use crate::window_switcher::SessionOptions;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run as daemon (default if no command specified)
    Daemon,
    /// Show the switcher
    Show,
    /// Cycle to next application
    Next,
    /// Cycle to previous application
    Prev,
    /// Select current entry and close switcher
    Select,
    /// Cancel switching without selecting
    Cancel,
    /// Query daemon status
    Status,
    /// Print the cached applications in MRU order
    List,
    /// Rank the cached applications against a query
    Search { query: String },
    /// Set the search text of the visible switcher
    Query { text: String },
    /// Re-read the preferences file
    Reload,
    /// Shutdown the daemon
    Shutdown,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tabswitch")]
#[command(about = "Keyboard-driven application and window switcher", long_about = None)]
pub struct Config {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Keyboard device to monitor (e.g. /dev/input/event3)
    #[arg(short, long)]
    pub device: Option<PathBuf>,

    /// Activation modifier, overriding the preferences file (option|command)
    #[arg(short, long, value_parser = parse_activation_modifier)]
    pub modifier: Option<Modifier>,

    /// Hold time after which a pending chord shows the switcher
    #[arg(long, default_value_t = 120)]
    pub quick_switch_ms: u64,

    /// How long an enumeration stays fresh
    #[arg(long, default_value_t = 2000)]
    pub cache_ttl_ms: u64,

    /// Ignore activation notifications for our own switches for this long
    #[arg(long, default_value_t = 300)]
    pub suppression_ms: u64,

    /// Windows smaller than this in either dimension are ignored
    #[arg(long, default_value_t = 50.0)]
    pub min_window_size: f64,

    /// Grid width used by row navigation
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u16).range(1..))]
    pub columns: u16,

    /// Preferences file (default: $XDG_CONFIG_HOME/tabswitch/preferences.json)
    #[arg(long)]
    pub preferences: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    pub fn parse() -> Self {
        <Config as Parser>::parse()
    }

    /// Get the command, defaulting to Daemon if none specified
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Daemon)
    }

    pub fn preferences_path(&self) -> Result<PathBuf> {
        match &self.preferences {
            Some(path) => Ok(path.clone()),
            None => preferences::default_path(),
        }
    }

    /// The command-line modifier wins over the preferences file.
    pub fn activation_modifier(&self, prefs: &Preferences) -> Modifier {
        self.modifier.unwrap_or(prefs.activation_modifier)
    }

    pub fn interpreter_config(&self, prefs: &Preferences) -> InterpreterConfig {
        InterpreterConfig {
            activation_modifier: self.activation_modifier(prefs),
            quick_switch_threshold: Duration::from_millis(self.quick_switch_ms),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl: Duration::from_millis(self.cache_ttl_ms),
            suppression_window: Duration::from_millis(self.suppression_ms),
            assemble: AssembleOptions {
                min_window_size: self.min_window_size,
            },
        }
    }

    pub fn session_options(&self, prefs: &Preferences) -> SessionOptions {
        SessionOptions {
            start_at_next: true,
            columns: usize::from(self.columns),
            show_minimized: prefs.show_minimized,
        }
    }
}

/// Only Option (Alt) and Command (Super) can start a chord.
fn parse_activation_modifier(value: &str) -> Result<Modifier, String> {
    match value.trim().to_lowercase().as_str() {
        "option" | "alt" => Ok(Modifier::Option),
        "command" | "super" | "meta" => Ok(Modifier::Command),
        other => Err(format!(
            "invalid activation modifier '{}' (expected option or command)",
            other
        )),
    }
}
