use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::model::{Application, Pid};
use crate::ranking::{ResultKind, SearchResult};

/// Commands sent from CLI client to daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IpcCommand {
    /// Show the switcher (start switching mode)
    Show,
    /// Cycle to next application
    Next,
    /// Cycle to previous application
    Prev,
    /// Select current entry and close switcher
    Select,
    /// Cancel switching without selecting
    Cancel,
    /// Query daemon status (for debugging)
    Status,
    /// Cached applications in MRU order
    List,
    /// Rank the cached applications against a query
    Search(String),
    /// Set the search text of the visible switcher
    Query(String),
    /// Re-read the preferences file
    Reload,
    /// Shutdown the daemon gracefully
    Shutdown,
}

/// One application in a `list` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub pid: Pid,
    pub name: String,
    pub bundle_id: Option<String>,
    pub is_active: bool,
    pub windows: Vec<String>,
}

impl From<&Application> for ApplicationSummary {
    fn from(app: &Application) -> Self {
        ApplicationSummary {
            pid: app.pid,
            name: app.name.clone(),
            bundle_id: app.bundle_id.clone(),
            is_active: app.is_active,
            windows: app.windows.iter().map(|w| w.title.clone()).collect(),
        }
    }
}

/// One ranked entry in a `search` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub kind: ResultKind,
    pub pid: Pid,
    pub window_index: Option<usize>,
    pub score: i64,
    pub text: String,
}

impl From<&SearchResult> for ResultSummary {
    fn from(result: &SearchResult) -> Self {
        ResultSummary {
            kind: result.kind(),
            pid: result.pid,
            window_index: result.window_index,
            score: result.score,
            text: result.display_text.clone(),
        }
    }
}

/// Response from daemon to CLI client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcResponse {
    /// Command executed successfully
    Ok,
    /// Error occurred
    Error(String),
    /// Status response
    Status {
        state: String,
        switching: bool,
        searching: bool,
        application_count: usize,
        current_index: Option<usize>,
        cache_fresh: bool,
    },
    Applications(Vec<ApplicationSummary>),
    Results(Vec<ResultSummary>),
}

/// Get the path to the Unix socket
pub fn get_socket_path() -> Result<PathBuf> {
    let runtime_dir = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine runtime directory")?;

    Ok(runtime_dir.join("tabswitch.sock"))
}

/// Error returned when parsing an invalid IpcCommand string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIpcCommandError;

impl fmt::Display for ParseIpcCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid IPC command")
    }
}

impl std::error::Error for ParseIpcCommandError {}

impl FromStr for IpcCommand {
    type Err = ParseIpcCommandError;

    /// `verb [argument]`; the verb is case-insensitive, the argument is kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (verb, argument) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match (verb.to_lowercase().as_str(), argument.is_empty()) {
            ("show", true) => Ok(IpcCommand::Show),
            ("next", true) => Ok(IpcCommand::Next),
            ("prev", true) => Ok(IpcCommand::Prev),
            ("select", true) => Ok(IpcCommand::Select),
            ("cancel", true) => Ok(IpcCommand::Cancel),
            ("status", true) => Ok(IpcCommand::Status),
            ("list", true) => Ok(IpcCommand::List),
            ("search", _) => Ok(IpcCommand::Search(argument.to_string())),
            ("query", _) => Ok(IpcCommand::Query(argument.to_string())),
            ("reload", true) => Ok(IpcCommand::Reload),
            ("shutdown", true) => Ok(IpcCommand::Shutdown),
            _ => Err(ParseIpcCommandError),
        }
    }
}

impl fmt::Display for IpcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IpcCommand::Show => "show",
            IpcCommand::Next => "next",
            IpcCommand::Prev => "prev",
            IpcCommand::Select => "select",
            IpcCommand::Cancel => "cancel",
            IpcCommand::Status => "status",
            IpcCommand::List => "list",
            IpcCommand::Search(query) => return write!(f, "search {}", query),
            IpcCommand::Query(text) => return write!(f, "query {}", text),
            IpcCommand::Reload => "reload",
            IpcCommand::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}
