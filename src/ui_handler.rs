//! Text presentation of the switcher.
//!
//! Stands in for a graphical overlay: every command redraws a frame on stderr.

use crate::ranking::SearchResult;
use crate::snapshot_store::Snapshot;
use crate::ui_commands::UiCommand;
use tokio::sync::mpsc;
use tracing::{debug, info};

const MAX_TITLE_LENGTH: usize = 40;

#[derive(Default)]
pub struct TextSwitcher {
    applications: Option<Snapshot>,
    selected: usize,
    window_index: usize,
    show_window_titles: bool,
}

impl TextSwitcher {
    /// Apply a command and return the frame to draw, if any.
    pub fn apply(&mut self, command: UiCommand) -> Option<String> {
        match command {
            UiCommand::Show {
                applications,
                selected,
                window_index,
                show_window_titles,
            } => {
                self.applications = Some(applications);
                self.selected = selected;
                self.window_index = window_index;
                self.show_window_titles = show_window_titles;
                Some(self.render_grid())
            }
            UiCommand::UpdateSelection {
                selected,
                window_index,
            } => {
                self.applications.as_ref()?;
                self.selected = selected;
                self.window_index = window_index;
                Some(self.render_grid())
            }
            UiCommand::ShowResults {
                query,
                results,
                selected,
            } => {
                self.applications.as_ref()?;
                Some(render_results(&query, &results, selected))
            }
            UiCommand::Hide => {
                self.applications.take()?;
                Some("=== Switcher closed ===\n".to_string())
            }
        }
    }

    fn render_grid(&self) -> String {
        let mut out = String::from("=== Switcher ===\n");
        let Some(applications) = &self.applications else {
            return out;
        };

        for (i, app) in applications.iter().enumerate() {
            let marker = if i == self.selected { ">>>" } else { "   " };
            out.push_str(&format!("{} {}\n", marker, app.name));

            if self.show_window_titles && (i == self.selected || app.windows.len() > 1) {
                for (w, window) in app.windows.iter().enumerate() {
                    let cursor = if i == self.selected && w == self.window_index {
                        "*"
                    } else {
                        "-"
                    };
                    let minimized = if window.is_minimized { " (minimized)" } else { "" };
                    out.push_str(&format!(
                        "      {} {}{}\n",
                        cursor,
                        truncate(&window.title),
                        minimized
                    ));
                }
            }
        }
        out.push_str("================\n");
        out
    }
}

fn render_results(query: &str, results: &[SearchResult], selected: Option<usize>) -> String {
    let mut out = format!("=== Search: {} ===\n", query);
    if results.is_empty() {
        out.push_str("    (no matches)\n");
    }
    for (i, result) in results.iter().enumerate() {
        let marker = if Some(i) == selected { ">>>" } else { "   " };
        out.push_str(&format!(
            "{} {:?}: {}\n",
            marker,
            result.kind(),
            truncate(&result.display_text)
        ));
    }
    out
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_TITLE_LENGTH {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_TITLE_LENGTH - 1).collect();
    format!("{}…", cut)
}

/// Handles UI commands until the daemon drops its sender
pub async fn handle_ui_commands(mut ui_rx: mpsc::UnboundedReceiver<UiCommand>) {
    info!("UI command handler started");
    let mut switcher = TextSwitcher::default();

    while let Some(command) = ui_rx.recv().await {
        debug!("Received UI command: {:?}", command);
        if let Some(frame) = switcher.apply(command) {
            eprint!("{}", frame);
        }
    }

    info!("UI command handler stopped");
}
