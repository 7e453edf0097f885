use crate::ranking::SearchResult;
use crate::snapshot_store::Snapshot;

/// Commands sent from daemon to UI
#[derive(Debug, Clone)]
pub enum UiCommand {
    /// Show the switcher over a snapshot of applications
    Show {
        applications: Snapshot,
        selected: usize,
        window_index: usize,
        show_window_titles: bool,
    },
    /// Update the selected entry
    /// (daemon owns the authoritative selection state)
    UpdateSelection { selected: usize, window_index: usize },
    /// Switch to the ranked result list for `query`
    ShowResults {
        query: String,
        results: Vec<SearchResult>,
        selected: Option<usize>,
    },
    /// Hide the switcher
    Hide,
}
