//! OS-facing collaborator interfaces and the logic that turns a raw window
//! listing into the application model.
//!
//! Backends only report flat `(process, window)` facts. Grouping, title
//! fallback, the minimum-size filter and placeholder synthesis live here so
//! every backend produces applications with the same guarantees.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::BackendResult;
use crate::model::{Application, IconHandle, Pid, Rect, SubEntity, SubEntityKind, Window, WindowId};

pub const DEFAULT_MIN_WINDOW_SIZE: f64 = 50.0;
pub const DEFAULT_ACTIVATION_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A running application as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub bundle_id: Option<String>,
    pub name: String,
    pub icon: Option<IconHandle>,
}

/// One window as reported by the backend, before any normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawWindow {
    pub pid: Pid,
    pub id: Option<i64>,
    pub title: Option<String>,
    pub document: Option<String>,
    pub description: Option<String>,
    pub bounds: Rect,
    pub is_minimized: bool,
    pub is_on_screen: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowListing {
    pub processes: Vec<ProcessInfo>,
    pub windows: Vec<RawWindow>,
    pub frontmost: Option<Pid>,
}

/// Lists eligible windows. May take on the order of a hundred milliseconds.
pub trait WindowEnumerator: Send + Sync {
    /// List all windows, or only those owned by `pid`.
    fn list_windows(&self, pid: Option<Pid>) -> BackendResult<WindowListing>;
}

/// Raises and activates windows. Each primitive may fail independently.
pub trait WindowActivator: Send + Sync {
    fn raise_window(&self, pid: Pid, window: WindowId) -> BackendResult<()>;

    fn activate_process(&self, pid: Pid) -> BackendResult<()>;

    /// A second way of activating a process, tried when the first one failed.
    fn activate_process_alternate(&self, pid: Pid) -> BackendResult<()> {
        self.activate_process(pid)
    }

    /// Last resort: hand keyboard focus to the process directly.
    fn assign_focus(&self, pid: Pid, window: Option<WindowId>) -> BackendResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssembleOptions {
    pub min_window_size: f64,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        AssembleOptions {
            min_window_size: DEFAULT_MIN_WINDOW_SIZE,
        }
    }
}

type TitleSource = fn(&RawWindow) -> Option<&str>;

fn window_title(window: &RawWindow) -> Option<&str> {
    window.title.as_deref()
}

fn document_name(window: &RawWindow) -> Option<&str> {
    window.document.as_deref()
}

fn description(window: &RawWindow) -> Option<&str> {
    window.description.as_deref()
}

const TITLE_SOURCES: [TitleSource; 3] = [window_title, document_name, description];

/// Best-effort title: the first non-blank source, else the application name.
pub fn resolve_title(window: &RawWindow, app_name: &str) -> String {
    TITLE_SOURCES
        .iter()
        .find_map(|source| source(window).map(str::trim).filter(|t| !t.is_empty()))
        .unwrap_or(app_name)
        .to_string()
}

fn display_name(process: &ProcessInfo) -> String {
    let name = process.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    match process.bundle_id.as_deref().map(str::trim) {
        Some(bundle) if !bundle.is_empty() => bundle.to_string(),
        _ => format!("Process {}", process.pid),
    }
}

/// Group a raw listing into applications.
///
/// Applications keep the order the backend reported processes in; processes
/// that only show up through their windows are appended in window order.
/// Every returned application has at least one window.
pub fn assemble_applications(listing: WindowListing, options: AssembleOptions) -> Vec<Application> {
    let WindowListing {
        mut processes,
        windows,
        frontmost,
    } = listing;

    let mut by_pid: HashMap<Pid, Vec<RawWindow>> = HashMap::new();
    let mut known: HashSet<Pid> = processes.iter().map(|p| p.pid).collect();
    for window in windows {
        if known.insert(window.pid) {
            processes.push(ProcessInfo {
                pid: window.pid,
                bundle_id: None,
                name: String::new(),
                icon: None,
            });
        }
        by_pid.entry(window.pid).or_default().push(window);
    }

    let mut seen = HashSet::new();
    let mut applications = Vec::with_capacity(processes.len());
    for process in processes {
        if !seen.insert(process.pid) {
            continue;
        }
        let name = display_name(&process);
        let raw = by_pid.remove(&process.pid).unwrap_or_default();
        let total = raw.len();

        let mut windows: Vec<Window> = raw
            .into_iter()
            .filter(|w| {
                w.bounds.width >= options.min_window_size
                    && w.bounds.height >= options.min_window_size
            })
            .enumerate()
            .map(|(ordinal, w)| Window {
                id: w
                    .id
                    .map(WindowId::Platform)
                    .unwrap_or(WindowId::Synthetic {
                        pid: process.pid,
                        ordinal,
                    }),
                ordinal,
                title: resolve_title(&w, &name),
                bounds: w.bounds,
                is_minimized: w.is_minimized,
                is_on_screen: w.is_on_screen,
                is_placeholder: false,
            })
            .collect();

        if windows.is_empty() {
            debug!(
                "No usable windows for {} (pid {}, {} reported), adding placeholder",
                name, process.pid, total
            );
            windows.push(Window::placeholder(process.pid, &name));
        }

        let sub_entities = derive_sub_entities(process.bundle_id.as_deref(), &windows);
        applications.push(Application {
            pid: process.pid,
            bundle_id: process.bundle_id,
            name,
            icon: process.icon,
            windows,
            sub_entities,
            is_active: frontmost == Some(process.pid),
        });
    }

    applications
}

const BROWSERS: [&str; 7] = [
    "firefox",
    "librewolf",
    "chromium",
    "chrome",
    "brave",
    "vivaldi",
    "epiphany",
];
const EDITORS: [&str; 4] = ["code", "codium", "jetbrains", "zed"];

fn matches_any(bundle_id: &str, needles: &[&str]) -> bool {
    let bundle_id = bundle_id.to_lowercase();
    needles.iter().any(|n| bundle_id.contains(n))
}

/// Browsers put the active tab's title before a " - Browser Name" suffix.
fn tab_title(title: &str) -> Option<String> {
    let (tab, _) = title.rsplit_once(" — ").or_else(|| title.rsplit_once(" - "))?;
    let tab = tab.trim();
    (!tab.is_empty()).then(|| tab.to_string())
}

/// `file - project - Editor` (VS Code family) or `project – file` (JetBrains).
fn project_name(title: &str) -> Option<String> {
    let segments: Vec<&str> = title.split(" - ").map(str::trim).collect();
    let project = match segments.len() {
        0 | 1 => title.split(" – ").next().filter(|_| title.contains(" – ")),
        2 => Some(segments[0]),
        n => Some(segments[n - 2]),
    }?;
    let project = project.trim().trim_start_matches('●').trim();
    (!project.is_empty()).then(|| project.to_string())
}

/// Sub-entities an application exposes through its window titles.
pub fn derive_sub_entities(bundle_id: Option<&str>, windows: &[Window]) -> Vec<SubEntity> {
    let Some(bundle_id) = bundle_id else {
        return Vec::new();
    };
    let (kind, extract): (SubEntityKind, fn(&str) -> Option<String>) =
        if matches_any(bundle_id, &BROWSERS) {
            (SubEntityKind::BrowserTab, tab_title)
        } else if matches_any(bundle_id, &EDITORS) {
            (SubEntityKind::Project, project_name)
        } else {
            return Vec::new();
        };

    let mut seen = HashSet::new();
    windows
        .iter()
        .enumerate()
        .filter(|(_, w)| !w.is_placeholder)
        .filter_map(|(index, w)| extract(&w.title).map(|text| (index, text)))
        .filter(|(_, text)| seen.insert(text.clone()))
        .map(|(index, text)| SubEntity {
            kind,
            text,
            window_index: Some(index),
        })
        .collect()
}

/// Ways of bringing a window to the front, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStrategy {
    RaiseThenActivate,
    RetryAfterDelay,
    AlternateActivation,
    AssignFocus,
}

pub const ACTIVATION_CHAIN: [ActivationStrategy; 4] = [
    ActivationStrategy::RaiseThenActivate,
    ActivationStrategy::RetryAfterDelay,
    ActivationStrategy::AlternateActivation,
    ActivationStrategy::AssignFocus,
];

fn raise_then_activate<A: WindowActivator + ?Sized>(
    activator: &A,
    pid: Pid,
    window: Option<WindowId>,
) -> BackendResult<()> {
    if let Some(window) = window {
        activator.raise_window(pid, window)?;
    }
    activator.activate_process(pid)
}

/// Activate `window` of `pid`, escalating through [`ACTIVATION_CHAIN`].
///
/// Blocks for up to `retry_delay` plus the backend calls. Returns the strategy
/// that worked, or `None` when every strategy failed; a failed switch is not
/// an error the caller needs to surface.
pub fn activate_with_fallback<A: WindowActivator + ?Sized>(
    activator: &A,
    pid: Pid,
    window: Option<WindowId>,
    retry_delay: Duration,
) -> Option<ActivationStrategy> {
    for strategy in ACTIVATION_CHAIN {
        let result = match strategy {
            ActivationStrategy::RaiseThenActivate => raise_then_activate(activator, pid, window),
            ActivationStrategy::RetryAfterDelay => {
                std::thread::sleep(retry_delay);
                raise_then_activate(activator, pid, window)
            }
            ActivationStrategy::AlternateActivation => activator.activate_process_alternate(pid),
            ActivationStrategy::AssignFocus => activator.assign_focus(pid, window),
        };

        match result {
            Ok(()) => {
                debug!("Activated pid {} via {:?}", pid, strategy);
                return Some(strategy);
            }
            Err(e) if !e.is_transient() => {
                warn!("Giving up on activating pid {}: {}", pid, e);
                return None;
            }
            Err(e) => {
                debug!("{:?} failed for pid {}: {}", strategy, pid, e);
            }
        }
    }

    warn!("All activation strategies failed for pid {}", pid);
    None
}


#[cfg(test)]
mod tests {
    use super::fakes::{Call, FakeActivator};
    use super::*;

    fn process(pid: Pid, name: &str, bundle: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            bundle_id: Some(bundle.to_string()),
            name: name.to_string(),
            icon: None,
        }
    }

    fn raw(pid: Pid, id: Option<i64>, title: Option<&str>, w: f64, h: f64) -> RawWindow {
        RawWindow {
            pid,
            id,
            title: title.map(str::to_string),
            bounds: Rect::new(0.0, 0.0, w, h),
            is_on_screen: true,
            ..RawWindow::default()
        }
    }

    #[test]
    fn test_resolve_title_fallback_chain() {
        let mut window = raw(1, None, Some("Inbox"), 100.0, 100.0);
        assert_eq!(resolve_title(&window, "Mail"), "Inbox");

        window.title = Some("   ".to_string());
        window.document = Some("report.odt".to_string());
        assert_eq!(resolve_title(&window, "Mail"), "report.odt");

        window.document = None;
        window.description = Some("Compose".to_string());
        assert_eq!(resolve_title(&window, "Mail"), "Compose");

        window.description = None;
        assert_eq!(resolve_title(&window, "Mail"), "Mail");
    }

    #[test]
    fn test_placeholder_for_process_without_windows() {
        let listing = WindowListing {
            processes: vec![process(7, "Daemonish", "org.example.daemon")],
            windows: vec![],
            frontmost: None,
        };
        let apps = assemble_applications(listing, AssembleOptions::default());
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].windows.len(), 1);
        let placeholder = &apps[0].windows[0];
        assert!(placeholder.is_placeholder);
        assert_eq!(placeholder.title, "Daemonish");
        assert_eq!(placeholder.id, WindowId::Synthetic { pid: 7, ordinal: 0 });
        assert!(!apps[0].has_real_windows());
    }

    #[test]
    fn test_small_windows_filtered_and_replaced_by_placeholder() {
        let listing = WindowListing {
            processes: vec![process(1, "Tiny", "org.example.tiny")],
            windows: vec![
                raw(1, Some(10), Some("tooltip"), 20.0, 400.0),
                raw(1, Some(11), Some("strip"), 400.0, 49.0),
            ],
            frontmost: None,
        };
        let apps = assemble_applications(listing, AssembleOptions::default());
        assert_eq!(apps[0].windows.len(), 1);
        assert!(apps[0].windows[0].is_placeholder);
    }

    #[test]
    fn test_every_application_has_a_window() {
        let listing = WindowListing {
            processes: vec![
                process(1, "A", "a"),
                process(2, "B", "b"),
                process(3, "C", "c"),
            ],
            windows: vec![
                raw(1, Some(1), Some("a1"), 300.0, 300.0),
                raw(3, Some(3), None, 10.0, 10.0),
            ],
            frontmost: Some(1),
        };
        let apps = assemble_applications(listing, AssembleOptions::default());
        assert_eq!(apps.len(), 3);
        assert!(apps.iter().all(|a| !a.windows.is_empty()));
        assert!(apps[0].is_active);
        assert!(!apps[1].is_active);
    }

    #[test]
    fn test_grouping_order_ordinals_and_synthetic_ids() {
        let listing = WindowListing {
            processes: vec![process(2, "Second", "b"), process(1, "First", "a")],
            windows: vec![
                raw(1, Some(100), Some("one"), 300.0, 300.0),
                raw(2, None, Some("two"), 300.0, 300.0),
                raw(1, None, None, 300.0, 300.0),
                // Unlisted process, appended after listed ones
                raw(9, Some(900), Some("stray"), 300.0, 300.0),
            ],
            frontmost: None,
        };
        let apps = assemble_applications(listing, AssembleOptions::default());
        let pids: Vec<Pid> = apps.iter().map(|a| a.pid).collect();
        assert_eq!(pids, vec![2, 1, 9]);

        let first = &apps[1];
        assert_eq!(first.windows.len(), 2);
        assert_eq!(first.windows[0].id, WindowId::Platform(100));
        assert_eq!(first.windows[1].id, WindowId::Synthetic { pid: 1, ordinal: 1 });
        assert_eq!(first.windows[1].ordinal, 1);
        assert_eq!(first.windows[1].title, "First");

        assert_eq!(apps[2].name, "Process 9");
        assert_eq!(apps[0].windows[0].id, WindowId::Synthetic { pid: 2, ordinal: 0 });
    }

    #[test]
    fn test_browser_tabs_and_projects() {
        let windows = vec![
            Window {
                title: "Rust Book — Mozilla Firefox".to_string(),
                ..Window::placeholder(1, "x")
            },
            Window {
                title: "Docs - Mozilla Firefox".to_string(),
                ..Window::placeholder(1, "x")
            },
        ];
        let windows: Vec<Window> = windows
            .into_iter()
            .map(|w| Window {
                is_placeholder: false,
                ..w
            })
            .collect();
        let tabs = derive_sub_entities(Some("firefox"), &windows);
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs[0].kind, SubEntityKind::BrowserTab);
        assert_eq!(tabs[0].text, "Rust Book");
        assert_eq!(tabs[1].text, "Docs");
        assert_eq!(tabs[1].window_index, Some(1));

        assert_eq!(
            project_name("main.rs - tabswitch - Visual Studio Code"),
            Some("tabswitch".to_string())
        );
        assert_eq!(
            project_name("● tabswitch - Visual Studio Code"),
            Some("tabswitch".to_string())
        );
        assert_eq!(project_name("tabswitch – main.rs"), Some("tabswitch".to_string()));
        assert_eq!(project_name("Welcome"), None);

        assert!(derive_sub_entities(Some("org.gnome.Nautilus"), &windows).is_empty());
        assert!(derive_sub_entities(None, &windows).is_empty());
    }

    #[test]
    fn test_placeholders_have_no_sub_entities() {
        let windows = vec![Window::placeholder(1, "Firefox - Mozilla")];
        assert!(derive_sub_entities(Some("firefox"), &windows).is_empty());
    }

    #[test]
    fn test_activation_first_strategy_succeeds() {
        let activator = FakeActivator::default();
        let window = WindowId::Platform(5);
        let used = activate_with_fallback(&activator, 3, Some(window), Duration::ZERO);
        assert_eq!(used, Some(ActivationStrategy::RaiseThenActivate));
        assert_eq!(
            *activator.calls.lock(),
            vec![Call::Raise(3, window), Call::Activate(3)]
        );
    }

    #[test]
    fn test_activation_without_window_only_activates() {
        let activator = FakeActivator::default();
        activate_with_fallback(&activator, 3, None, Duration::ZERO);
        assert_eq!(*activator.calls.lock(), vec![Call::Activate(3)]);
    }

    #[test]
    fn test_activation_escalates() {
        // Raise fails, retried raise fails, alternate fails, focus works
        let activator = FakeActivator::failing(3);
        let used = activate_with_fallback(&activator, 3, Some(WindowId::Platform(5)), Duration::ZERO);
        assert_eq!(used, Some(ActivationStrategy::AssignFocus));
        let calls = activator.calls.lock();
        assert_eq!(calls.last(), Some(&Call::AssignFocus(3)));
        assert!(calls.contains(&Call::Alternate(3)));
    }

    #[test]
    fn test_activation_all_fail_is_silent() {
        let activator = FakeActivator::failing(100);
        assert_eq!(
            activate_with_fallback(&activator, 3, None, Duration::ZERO),
            None
        );
        assert_eq!(activator.calls.lock().len(), 4);
    }

    #[test]
    fn test_activation_stops_on_permission_denied() {
        let activator = FakeActivator::default();
        *activator.permission_denied.lock() = true;
        assert_eq!(
            activate_with_fallback(&activator, 3, None, Duration::ZERO),
            None
        );
        assert_eq!(activator.calls.lock().len(), 1);
    }
}
