//! Selection state for one switcher session.
//!
//! Created when the switcher is shown and dropped when it hides. Applications
//! are laid out as a grid `columns` wide; horizontal movement wraps across the
//! whole list, vertical movement jumps a row. In search mode the cursor moves
//! over the flat ranked result list instead.

use std::sync::Arc;

use crate::model::{Application, Pid, WindowId};
use crate::ranking::{self, SearchResult};
use crate::snapshot_store::Snapshot;

pub const DEFAULT_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Select the second entry initially (the previously used application)
    pub start_at_next: bool,
    pub columns: usize,
    pub show_minimized: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            start_at_next: true,
            columns: DEFAULT_COLUMNS,
            show_minimized: true,
        }
    }
}

/// What confirming the current selection should bring forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationTarget {
    pub pid: Pid,
    /// `None` for placeholder windows; the process is activated as a whole
    pub window: Option<WindowId>,
    pub name: String,
}

impl ActivationTarget {
    pub fn new(app: &Application, window_index: usize) -> Self {
        let window = app
            .windows
            .get(window_index)
            .filter(|w| !w.is_placeholder)
            .map(|w| w.id);
        ActivationTarget {
            pid: app.pid,
            window,
            name: app.name.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct SearchState {
    query: String,
    results: Vec<SearchResult>,
    selected: usize,
}

pub struct WindowSwitcher {
    applications: Snapshot,
    options: SessionOptions,
    current_index: usize,
    window_index: usize,
    search: Option<SearchState>,
}

/// Drop minimized windows, keeping at least one window per application.
fn without_minimized(applications: &Snapshot) -> Snapshot {
    if !applications
        .iter()
        .any(|app| app.windows.iter().any(|w| w.is_minimized))
    {
        return Arc::clone(applications);
    }
    let filtered = applications
        .iter()
        .map(|app| {
            let mut app = app.clone();
            if app.windows.iter().any(|w| !w.is_minimized) {
                app.windows.retain(|w| !w.is_minimized);
            }
            app
        })
        .collect();
    Arc::new(filtered)
}

impl WindowSwitcher {
    pub fn new(applications: Snapshot, options: SessionOptions) -> Self {
        let applications = if options.show_minimized {
            applications
        } else {
            without_minimized(&applications)
        };
        let current_index = if options.start_at_next && applications.len() > 1 {
            1
        } else {
            0
        };

        WindowSwitcher {
            applications,
            options: SessionOptions {
                columns: options.columns.max(1),
                ..options
            },
            current_index,
            window_index: 0,
            search: None,
        }
    }

    pub fn applications(&self) -> &[Application] {
        &self.applications
    }

    /// Shared handle to the applications this session shows.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.applications)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn window_index(&self) -> usize {
        self.window_index
    }

    pub fn current(&self) -> Option<&Application> {
        self.applications.get(self.current_index)
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    /// Swap in a newer snapshot, keeping the selected application if it survived.
    pub fn replace_applications(&mut self, applications: Snapshot) {
        let selected = self.current().map(|app| app.pid);
        let applications = if self.options.show_minimized {
            applications
        } else {
            without_minimized(&applications)
        };
        self.current_index = selected
            .and_then(|pid| applications.iter().position(|app| app.pid == pid))
            .unwrap_or(if self.options.start_at_next && applications.len() > 1 {
                1
            } else {
                0
            });
        self.applications = applications;
        self.window_index = 0;
        if let Some(query) = self.search.as_ref().map(|s| s.query.clone()) {
            self.set_query(&query);
        }
    }

    /// Move to the next or previous application, wrapping around.
    ///
    /// Returns the new current index.
    pub fn cycle(&mut self, forward: bool) -> usize {
        if self.applications.is_empty() {
            return 0;
        }

        let len = self.applications.len();
        self.current_index = if forward {
            (self.current_index + 1) % len
        } else if self.current_index == 0 {
            len - 1
        } else {
            self.current_index - 1
        };
        self.window_index = 0;

        self.current_index
    }

    /// Move to the next or previous window of the selected application.
    pub fn cycle_window(&mut self, forward: bool) -> usize {
        let Some(len) = self.current().map(|app| app.windows.len()) else {
            return 0;
        };
        if len == 0 {
            return 0;
        }
        self.window_index = if forward {
            (self.window_index + 1) % len
        } else if self.window_index == 0 {
            len - 1
        } else {
            self.window_index - 1
        };
        self.window_index
    }

    /// Jump one grid row up or down. Stays put at the edges.
    pub fn move_row(&mut self, up: bool) -> usize {
        let columns = self.options.columns;
        let len = self.applications.len();
        if up {
            if self.current_index >= columns {
                self.current_index -= columns;
                self.window_index = 0;
            }
        } else if self.current_index + columns < len {
            self.current_index += columns;
            self.window_index = 0;
        }
        self.current_index
    }

    pub fn begin_search(&mut self) {
        if self.search.is_none() {
            self.search = Some(SearchState {
                results: ranking::search(&self.applications, ""),
                ..SearchState::default()
            });
        }
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn query(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.query.as_str())
    }

    /// Re-rank for `query`, entering search mode if needed.
    pub fn set_query(&mut self, query: &str) {
        let results = ranking::search(&self.applications, query);
        let search = self.search.get_or_insert_with(SearchState::default);
        search.query = query.to_string();
        search.results = results;
        search.selected = 0;
    }

    pub fn results(&self) -> &[SearchResult] {
        self.search.as_ref().map(|s| s.results.as_slice()).unwrap_or(&[])
    }

    pub fn selected_result(&self) -> Option<usize> {
        self.search
            .as_ref()
            .filter(|s| !s.results.is_empty())
            .map(|s| s.selected)
    }

    /// Move through the ranked results, wrapping around.
    pub fn navigate_results(&mut self, down: bool) -> Option<usize> {
        let search = self.search.as_mut()?;
        let len = search.results.len();
        if len == 0 {
            return None;
        }
        search.selected = if down {
            (search.selected + 1) % len
        } else if search.selected == 0 {
            len - 1
        } else {
            search.selected - 1
        };
        Some(search.selected)
    }

    /// Target for the current selection.
    pub fn target(&self) -> Option<ActivationTarget> {
        match &self.search {
            Some(search) => {
                let result = search.results.get(search.selected)?;
                let app = self.applications.get(result.app_index)?;
                Some(ActivationTarget::new(app, result.window_index.unwrap_or(0)))
            }
            None => {
                let app = self.current()?;
                Some(ActivationTarget::new(app, self.window_index))
            }
        }
    }
}

/// Quick switch goes to the previously used application: index 1 of the MRU
/// order, since index 0 is the frontmost one.
pub fn quick_switch_target(applications: &[Application]) -> Option<ActivationTarget> {
    applications
        .get(1)
        .map(|app| ActivationTarget::new(app, 0))
}
