//! Sway backend for window enumeration and activation.
//!
//! Talks to the compositor over its IPC socket. One blocking connection is
//! kept and re-established when the socket breaks (e.g. after a Sway reload).

use std::collections::HashSet;
use std::fs;

use parking_lot::Mutex;
use swayipc::{Connection, Node, NodeType};
use tracing::{debug, warn};

use crate::app_metadata::AppMetadataResolver;
use crate::error::{BackendError, BackendResult};
use crate::model::{Pid, Rect, WindowId};
use crate::window_enumerator::{
    ProcessInfo, RawWindow, WindowActivator, WindowEnumerator, WindowListing,
};

/// Workspace Sway keeps scratchpad ("minimized") windows on.
const SCRATCHPAD_WORKSPACE: &str = "__i3_scratch";

pub struct SwayBackend {
    connection: Mutex<Option<Connection>>,
    metadata: AppMetadataResolver,
}

/// A window found in the tree along with the identifier of its application.
#[derive(Debug, Clone, PartialEq)]
struct TreeWindow {
    app_id: Option<String>,
    workspace: Option<String>,
    raw: RawWindow,
}

impl SwayBackend {
    /// Connect to Sway
    pub fn new(metadata: AppMetadataResolver) -> BackendResult<Self> {
        let connection = Connection::new().map_err(|e| BackendError::Unavailable {
            message: format!("cannot connect to Sway: {}", e),
        })?;
        Ok(SwayBackend {
            connection: Mutex::new(Some(connection)),
            metadata,
        })
    }

    /// Run `op` on the shared connection, reconnecting once if the socket broke.
    fn with_connection<T>(
        &self,
        mut op: impl FnMut(&mut Connection) -> swayipc::Fallible<T>,
    ) -> BackendResult<T> {
        let mut slot = self.connection.lock();
        let mut connection = match slot.take() {
            Some(connection) => connection,
            None => Connection::new()?,
        };

        let result = match op(&mut connection) {
            Err(swayipc::Error::Io(e)) => {
                warn!("Sway connection lost ({}), reconnecting", e);
                connection = Connection::new()?;
                op(&mut connection)
            }
            other => other,
        };

        *slot = Some(connection);
        Ok(result?)
    }

    /// Run a command and fail with an activation error if any part of it failed.
    fn run(&self, pid: Pid, command: &str) -> BackendResult<()> {
        debug!("Sway command: {}", command);
        let outcomes = self.with_connection(|c| c.run_command(command))?;
        if outcomes.is_empty() {
            return Err(BackendError::Activation {
                pid,
                message: format!("'{}' had no effect", command),
            });
        }
        for outcome in outcomes {
            outcome.map_err(|e| BackendError::Activation {
                pid,
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn tree_windows(&self) -> BackendResult<(Vec<TreeWindow>, Option<Pid>)> {
        let tree = self.with_connection(|c| c.get_tree())?;
        let mut windows = Vec::new();
        collect_windows(&tree, None, &mut windows);
        let frontmost = find_focused(&tree).and_then(|node| node.pid);
        Ok((windows, frontmost))
    }

    fn process_info(&self, pid: Pid, app_id: Option<&str>) -> ProcessInfo {
        match app_id {
            Some(app_id) => {
                let metadata = self.metadata.resolve(app_id);
                ProcessInfo {
                    pid,
                    bundle_id: Some(app_id.to_string()),
                    name: metadata
                        .name
                        .unwrap_or_else(|| crate::app_metadata::fallback_name(app_id)),
                    icon: metadata.icon,
                }
            }
            None => ProcessInfo {
                pid,
                bundle_id: None,
                name: process_name(pid).unwrap_or_default(),
                icon: None,
            },
        }
    }
}

impl WindowEnumerator for SwayBackend {
    fn list_windows(&self, pid: Option<Pid>) -> BackendResult<WindowListing> {
        let (found, frontmost) = self.tree_windows()?;

        let mut listing = WindowListing {
            frontmost,
            ..WindowListing::default()
        };
        let mut seen = HashSet::new();
        for window in found {
            if pid.is_some_and(|pid| pid != window.raw.pid) {
                continue;
            }
            if seen.insert(window.raw.pid) {
                listing
                    .processes
                    .push(self.process_info(window.raw.pid, window.app_id.as_deref()));
            }
            listing.windows.push(window.raw);
        }

        if let Some(pid) = pid
            && listing.processes.is_empty()
        {
            return Err(BackendError::Enumeration {
                pid,
                message: "process has no windows in the tree".to_string(),
            });
        }

        debug!(
            "Listed {} windows of {} processes (frontmost: {:?})",
            listing.windows.len(),
            listing.processes.len(),
            frontmost
        );
        Ok(listing)
    }
}

impl WindowActivator for SwayBackend {
    fn raise_window(&self, pid: Pid, window: WindowId) -> BackendResult<()> {
        self.run(pid, &focus_command(pid, Some(&window)))
    }

    /// Make sure one of the process's windows holds focus.
    fn activate_process(&self, pid: Pid) -> BackendResult<()> {
        let (_, frontmost) = self.tree_windows()?;
        if frontmost == Some(pid) {
            return Ok(());
        }
        self.run(pid, &focus_command(pid, None))
    }

    /// Switch to the workspace of the process's first window, then focus it.
    fn activate_process_alternate(&self, pid: Pid) -> BackendResult<()> {
        let (found, _) = self.tree_windows()?;
        let target = found
            .iter()
            .find(|w| w.raw.pid == pid && !w.raw.is_minimized)
            .or_else(|| found.iter().find(|w| w.raw.pid == pid))
            .ok_or_else(|| BackendError::Activation {
                pid,
                message: "no window left to activate".to_string(),
            })?;

        let focus = focus_command(pid, target.raw.id.map(WindowId::Platform).as_ref());
        let command = match &target.workspace {
            Some(workspace) if workspace != SCRATCHPAD_WORKSPACE => {
                format!("workspace \"{}\"; {}", escape(workspace), focus)
            }
            _ => focus,
        };
        self.run(pid, &command)
    }

    fn assign_focus(&self, pid: Pid, window: Option<WindowId>) -> BackendResult<()> {
        self.run(pid, &focus_command(pid, window.as_ref()))
    }
}

/// `[con_id=N] focus` for a known container, `[pid=N] focus` otherwise.
fn focus_command(pid: Pid, window: Option<&WindowId>) -> String {
    match window {
        Some(WindowId::Platform(id)) => format!("[con_id={}] focus", id),
        _ => format!("[pid={}] focus", pid),
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_view(node: &Node) -> bool {
    matches!(node.node_type, NodeType::Con | NodeType::FloatingCon)
        && node.pid.is_some()
        && node.nodes.is_empty()
}

/// Recursively collect all views from a Sway node tree, in tree order.
fn collect_windows(node: &Node, workspace: Option<&str>, out: &mut Vec<TreeWindow>) {
    let workspace = if node.node_type == NodeType::Workspace {
        node.name.as_deref().or(workspace)
    } else {
        workspace
    };

    if is_view(node)
        && let Some(pid) = node.pid
    {
        let minimized = workspace == Some(SCRATCHPAD_WORKSPACE);
        let properties = node.window_properties.as_ref();
        out.push(TreeWindow {
            app_id: node
                .app_id
                .clone()
                .or_else(|| properties.and_then(|p| p.class.clone())),
            workspace: workspace.map(str::to_string),
            raw: RawWindow {
                pid,
                id: Some(node.id),
                title: node.name.clone(),
                document: None,
                description: properties.and_then(|p| p.title.clone()),
                bounds: Rect::new(
                    f64::from(node.rect.x),
                    f64::from(node.rect.y),
                    f64::from(node.rect.width),
                    f64::from(node.rect.height),
                ),
                is_minimized: minimized,
                is_on_screen: !minimized && node.visible.unwrap_or(false),
            },
        });
    }

    for child in node.nodes.iter().chain(node.floating_nodes.iter()) {
        collect_windows(child, workspace, out);
    }
}

fn find_focused(node: &Node) -> Option<&Node> {
    if node.focused {
        return Some(node);
    }
    node.nodes
        .iter()
        .chain(node.floating_nodes.iter())
        .find_map(find_focused)
}

/// Process name from procfs, for views that report no application id.
fn process_name(pid: Pid) -> Option<String> {
    let comm = fs::read_to_string(format!("/proc/{}/comm", pid)).ok()?;
    let comm = comm.trim();
    (!comm.is_empty()).then(|| comm.to_string())
}
