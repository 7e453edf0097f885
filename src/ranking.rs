//! Fuzzy search over applications, their windows and sub-entities.
//!
//! Scoring is a single greedy forward sweep: leftmost subsequence placement,
//! not the best possible alignment. Scores only need to order candidates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::model::{Application, Pid, SubEntityKind};

pub const APP_NAME_BONUS: i64 = 200;
/// Windows of a name-matched application rank just under the application.
pub const WINDOW_UNDER_APP_PENALTY: i64 = 10;
pub const WINDOW_COMBINED_BONUS: i64 = 150;
pub const WINDOW_TITLE_BONUS: i64 = 140;
pub const PROJECT_COMBINED_BONUS: i64 = 125;
pub const PROJECT_BONUS: i64 = 115;
pub const TAB_COMBINED_BONUS: i64 = 75;
pub const TAB_BONUS: i64 = 65;

const MATCH_SCORE: i64 = 10;
const CONSECUTIVE_STEP: i64 = 5;
const FIRST_CHAR_BONUS: i64 = 25;
const BOUNDARY_BONUS: i64 = 15;
const SHORT_HAYSTACK_LIMIT: i64 = 50;

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '-' | '_' | '.')
}

/// Score `pattern` as an in-order subsequence of `haystack`.
///
/// Returns `None` unless every pattern character is found in order. Case is
/// compared exactly; callers lowercase both sides.
pub fn fuzzy_match(haystack: &str, pattern: &str) -> Option<i64> {
    let hay: Vec<char> = haystack.chars().collect();
    let mut pattern = pattern.chars().peekable();

    let mut score = 0;
    let mut consecutive = 0;
    let mut last_match: Option<usize> = None;

    for (index, &c) in hay.iter().enumerate() {
        let Some(&wanted) = pattern.peek() else {
            break;
        };
        if c != wanted {
            continue;
        }
        pattern.next();
        score += MATCH_SCORE;

        if index > 0 && last_match == Some(index - 1) {
            consecutive += CONSECUTIVE_STEP;
            score += consecutive;
        } else {
            consecutive = 0;
        }

        if index == 0 {
            score += FIRST_CHAR_BONUS;
        } else {
            let previous = hay[index - 1];
            if is_separator(previous) || (previous.is_lowercase() && c.is_uppercase()) {
                score += BOUNDARY_BONUS;
            }
        }
        last_match = Some(index);
    }

    if pattern.peek().is_some() {
        return None;
    }
    Some(score + (SHORT_HAYSTACK_LIMIT - hay.len() as i64).max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    App,
    Window,
    BrowserTab,
    Project,
}

/// De-duplication identity of a result: kind + application + sub-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKey {
    App(Pid),
    Window(Pid, usize),
    SubEntity(SubEntityKind, Pid, usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub key: ResultKey,
    /// Index of the target application in the searched slice
    pub app_index: usize,
    pub pid: Pid,
    pub window_index: Option<usize>,
    pub score: i64,
    pub display_text: String,
}

impl SearchResult {
    pub fn kind(&self) -> ResultKind {
        match self.key {
            ResultKey::App(_) => ResultKind::App,
            ResultKey::Window(..) => ResultKind::Window,
            ResultKey::SubEntity(SubEntityKind::BrowserTab, ..) => ResultKind::BrowserTab,
            ResultKey::SubEntity(SubEntityKind::Project, ..) => ResultKind::Project,
        }
    }
}

/// Best of a combined-text and an alone-text match, each with its bonus.
fn best_of(combined: Option<i64>, combined_bonus: i64, alone: Option<i64>, alone_bonus: i64) -> Option<i64> {
    let combined = combined.map(|s| s + combined_bonus);
    let alone = alone.map(|s| s + alone_bonus);
    combined.max(alone)
}

fn search_application(app_index: usize, app: &Application, query: &str, results: &mut Vec<SearchResult>) {
    let name = app.name.to_lowercase();
    let multi_window = app.windows.len() > 1;
    let contributed = results.len();
    let mut seen: HashSet<ResultKey> = HashSet::new();

    let result = |key: ResultKey, window_index: Option<usize>, score: i64, display_text: String| SearchResult {
        key,
        app_index,
        pid: app.pid,
        window_index,
        score,
        display_text,
    };

    if let Some(score) = fuzzy_match(&name, query) {
        let app_score = score + APP_NAME_BONUS;
        results.push(result(ResultKey::App(app.pid), None, app_score, app.name.clone()));
        if multi_window {
            for (index, window) in app.windows.iter().enumerate() {
                let key = ResultKey::Window(app.pid, index);
                seen.insert(key);
                results.push(result(
                    key,
                    Some(index),
                    app_score - WINDOW_UNDER_APP_PENALTY - index as i64,
                    format!("{} - {}", app.name, window.title),
                ));
            }
        }
    }

    if multi_window {
        for (index, window) in app.windows.iter().enumerate() {
            let key = ResultKey::Window(app.pid, index);
            if seen.contains(&key) {
                continue;
            }
            let title = window.title.to_lowercase();
            let combined = format!("{} - {}", name, title);
            if let Some(score) = best_of(
                fuzzy_match(&combined, query),
                WINDOW_COMBINED_BONUS,
                fuzzy_match(&title, query),
                WINDOW_TITLE_BONUS,
            ) {
                seen.insert(key);
                results.push(result(
                    key,
                    Some(index),
                    score,
                    format!("{} - {}", app.name, window.title),
                ));
            }
        }
    }

    for (index, entity) in app.sub_entities.iter().enumerate() {
        let (combined_bonus, alone_bonus) = match entity.kind {
            SubEntityKind::Project => (PROJECT_COMBINED_BONUS, PROJECT_BONUS),
            SubEntityKind::BrowserTab => (TAB_COMBINED_BONUS, TAB_BONUS),
        };
        let text = entity.text.to_lowercase();
        let combined = format!("{} - {}", name, text);
        if let Some(score) = best_of(
            fuzzy_match(&combined, query),
            combined_bonus,
            fuzzy_match(&text, query),
            alone_bonus,
        ) {
            results.push(result(
                ResultKey::SubEntity(entity.kind, app.pid, index),
                entity.window_index,
                score,
                format!("{} - {}", app.name, entity.text),
            ));
        }
    }

    if results.len() == contributed
        && let Some(bundle_id) = app.bundle_id.as_deref()
        && let Some(score) = fuzzy_match(&bundle_id.to_lowercase(), query)
    {
        results.push(result(ResultKey::App(app.pid), None, score, app.name.clone()));
    }
}

/// Rank every application, window and sub-entity against `query`.
///
/// An empty query returns one application-level result per input, in input
/// order. Otherwise results are sorted by descending score; equal scores keep
/// their discovery order.
pub fn search(applications: &[Application], query: &str) -> Vec<SearchResult> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        let count = applications.len() as i64;
        return applications
            .iter()
            .enumerate()
            .map(|(index, app)| SearchResult {
                key: ResultKey::App(app.pid),
                app_index: index,
                pid: app.pid,
                window_index: None,
                score: count - index as i64,
                display_text: app.name.clone(),
            })
            .collect();
    }

    let mut results = Vec::new();
    for (index, app) in applications.iter().enumerate() {
        search_application(index, app, &query, &mut results);
    }
    results.sort_by(|a, b| b.score.cmp(&a.score));
    results
}

/// Unique applications in the order of their best result.
pub fn filter(applications: &[Application], query: &str) -> Vec<Application> {
    let mut seen = HashSet::new();
    search(applications, query)
        .into_iter()
        .filter(|result| seen.insert(result.pid))
        .map(|result| applications[result.app_index].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SubEntity, Window, WindowId};

    fn window(pid: Pid, index: usize, title: &str) -> Window {
        Window {
            id: WindowId::Platform(i64::from(pid) * 100 + index as i64),
            ordinal: index,
            title: title.to_string(),
            is_placeholder: false,
            ..Window::placeholder(pid, title)
        }
    }

    fn app(pid: Pid, name: &str, titles: &[&str]) -> Application {
        Application {
            pid,
            bundle_id: Some(format!("org.example.{}", name.to_lowercase().replace(' ', ""))),
            name: name.to_string(),
            icon: None,
            windows: titles
                .iter()
                .enumerate()
                .map(|(i, t)| window(pid, i, t))
                .collect(),
            sub_entities: Vec::new(),
            is_active: false,
        }
    }

    // ==================== fuzzy_match tests ====================

    #[test]
    fn test_fuzzy_match_subsequence() {
        assert!(fuzzy_match("safari", "sa").is_some());
        assert!(fuzzy_match("safari", "sfi").is_some());
        assert_eq!(fuzzy_match("safari", "xyz"), None);
        assert_eq!(fuzzy_match("safari", "as s"), None);
        assert_eq!(fuzzy_match("sa", "saf"), None);
    }

    #[test]
    fn test_fuzzy_match_case_is_callers_job() {
        assert!(fuzzy_match(&"Safari".to_lowercase(), &"SA".to_lowercase()).is_some());
        assert_eq!(fuzzy_match("safari", "SA"), None);
    }

    #[test]
    fn test_fuzzy_match_scores() {
        // s: 10 + 25 first char; a: 10 + 5 run; length bonus 50 - 6
        assert_eq!(fuzzy_match("safari", "sa"), Some(35 + 15 + 44));
        // a after a gap: no run, no boundary
        assert_eq!(fuzzy_match("slack", "sa"), Some(35 + 10 + 45));
        // run bonus compounds: +5, +10, +15
        assert_eq!(fuzzy_match("abcd", "abcd"), Some(35 + 15 + 20 + 25 + 46));
        // and resets after a gap
        assert_eq!(fuzzy_match("abxab", "abab"), Some(35 + 15 + 10 + 15 + 45));
    }

    #[test]
    fn test_fuzzy_match_boundaries() {
        assert_eq!(fuzzy_match("foo bar", "b"), Some(10 + 15 + 43));
        assert_eq!(fuzzy_match("foo-bar", "b"), Some(10 + 15 + 43));
        assert_eq!(fuzzy_match("foo_bar", "b"), Some(10 + 15 + 43));
        assert_eq!(fuzzy_match("foo.bar", "b"), Some(10 + 15 + 43));
        assert_eq!(fuzzy_match("fooBar", "B"), Some(10 + 15 + 44));
        assert_eq!(fuzzy_match("foobar", "b"), Some(10 + 44));
    }

    #[test]
    fn test_fuzzy_match_length_bonus_floors_at_zero() {
        let long = "a".repeat(80);
        assert_eq!(fuzzy_match(&long, "b"), None);
        let long = format!("x{}", "y".repeat(79));
        assert_eq!(fuzzy_match(&long, "x"), Some(35));
    }

    #[test]
    fn test_fuzzy_match_greedy_placement() {
        // Leftmost "a" is taken even though "ab" appears contiguously later
        assert_eq!(fuzzy_match("axxab", "ab"), Some(35 + 10 + 45));
    }

    #[test]
    fn test_shorter_haystack_wins() {
        let short = fuzzy_match("mail", "ma").unwrap();
        let long = fuzzy_match("mail client for the desktop", "ma").unwrap();
        assert!(short > long);
    }

    // ==================== search tests ====================

    #[test]
    fn test_search_empty_query_preserves_order() {
        let apps = vec![app(3, "Zed", &["a"]), app(1, "Alacritty", &["b"]), app(2, "Mail", &["c"])];
        for query in ["", "   "] {
            let results = search(&apps, query);
            assert_eq!(results.len(), 3);
            let pids: Vec<Pid> = results.iter().map(|r| r.pid).collect();
            assert_eq!(pids, vec![3, 1, 2]);
            assert!(results.iter().all(|r| r.window_index.is_none()));
            assert!(results.iter().all(|r| r.kind() == ResultKind::App));
            assert!(results.windows(2).all(|w| w[0].score > w[1].score));
        }
    }

    #[test]
    fn test_search_ranks_matching_apps() {
        let apps = vec![
            app(1, "Safari", &["Start Page"]),
            app(2, "Slack", &["general"]),
            app(3, "System Preferences", &["General"]),
        ];
        let filtered = filter(&apps, "sa");
        let names: Vec<&str> = filtered.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"Safari"));
        assert!(names.contains(&"Slack"));
        assert_eq!(names[0], "Safari");
    }

    #[test]
    fn test_search_no_match() {
        let apps = vec![app(1, "Safari", &["Start Page"])];
        assert!(search(&apps, "xyz123").is_empty());
        assert!(filter(&apps, "xyz123").is_empty());
    }

    #[test]
    fn test_single_window_app_has_no_window_duplicate() {
        let apps = vec![app(1, "Safari", &["Safari"])];
        let results = search(&apps, "safari");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, ResultKey::App(1));
        assert_eq!(results[0].window_index, None);
    }

    #[test]
    fn test_matched_app_lists_windows_just_below() {
        let apps = vec![app(1, "Terminal", &["build", "logs", "vim"])];
        let results = search(&apps, "term");
        assert_eq!(results.len(), 4);
        let app_score = results[0].score;
        assert_eq!(results[0].key, ResultKey::App(1));
        for (index, result) in results[1..].iter().enumerate() {
            assert_eq!(result.window_index, Some(index));
            assert_eq!(result.score, app_score - 10 - index as i64);
        }
        assert_eq!(results[2].display_text, "Terminal - logs");
    }

    #[test]
    fn test_window_title_match_without_app_match() {
        let apps = vec![app(1, "Terminal", &["build", "logs", "vim"])];
        let results = search(&apps, "logs");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, ResultKey::Window(1, 1));
        assert_eq!(results[0].window_index, Some(1));

        let title_only = fuzzy_match("logs", "logs").unwrap() + WINDOW_TITLE_BONUS;
        let combined = fuzzy_match("terminal - logs", "logs").unwrap() + WINDOW_COMBINED_BONUS;
        assert_eq!(results[0].score, title_only.max(combined));
    }

    #[test]
    fn test_combined_text_spans_app_and_title() {
        let apps = vec![app(1, "Terminal", &["build", "logs"])];
        // Only the combined "terminal - logs" text contains t, -, l, o in order
        let results = search(&apps, "t-lo");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, ResultKey::Window(1, 1));
    }

    #[test]
    fn test_sub_entities_have_their_own_keys() {
        let mut browser = app(1, "Firefox", &["Rust Book — Mozilla Firefox", "Docs — Mozilla Firefox"]);
        browser.sub_entities = vec![
            SubEntity {
                kind: SubEntityKind::BrowserTab,
                text: "Rust Book".to_string(),
                window_index: Some(0),
            },
            SubEntity {
                kind: SubEntityKind::BrowserTab,
                text: "Docs".to_string(),
                window_index: Some(1),
            },
        ];
        let results = search(&[browser], "rust");
        let keys: Vec<ResultKey> = results.iter().map(|r| r.key).collect();
        assert!(keys.contains(&ResultKey::Window(1, 0)));
        assert!(keys.contains(&ResultKey::SubEntity(SubEntityKind::BrowserTab, 1, 0)));
        let tab = results
            .iter()
            .find(|r| r.kind() == ResultKind::BrowserTab)
            .unwrap();
        assert_eq!(tab.window_index, Some(0));
        assert_eq!(tab.display_text, "Firefox - Rust Book");
    }

    #[test]
    fn test_project_outranks_tab_for_same_text() {
        let mut editor = app(1, "Code", &["main.rs - tabswitch - Code"]);
        editor.sub_entities = vec![SubEntity {
            kind: SubEntityKind::Project,
            text: "tabswitch".to_string(),
            window_index: Some(0),
        }];
        let mut browser = app(2, "Firefox", &["tabswitch - Firefox"]);
        browser.sub_entities = vec![SubEntity {
            kind: SubEntityKind::BrowserTab,
            text: "tabswitch".to_string(),
            window_index: Some(0),
        }];
        let results = search(&[browser, editor], "tabswitch");
        assert_eq!(results[0].kind(), ResultKind::Project);
    }

    #[test]
    fn test_bundle_id_fallback_only_when_nothing_else_matched() {
        let mut code = app(1, "Code", &["main.rs"]);
        code.bundle_id = Some("com.visualstudio.code.oss".to_string());
        let results = search(std::slice::from_ref(&code), "visual");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, ResultKey::App(1));
        assert_eq!(
            results[0].score,
            fuzzy_match("com.visualstudio.code.oss", "visual").unwrap()
        );

        // Name match wins; bundle id is not consulted
        let results = search(std::slice::from_ref(&code), "code");
        assert_eq!(results.len(), 1);
        assert!(results[0].score > APP_NAME_BONUS);
    }

    #[test]
    fn test_app_match_outranks_window_title_match() {
        let apps = vec![
            app(1, "Notes", &["groceries", "ideas"]),
            app(2, "Files", &["notes", "downloads"]),
        ];
        let results = search(&apps, "notes");
        assert_eq!(results[0].key, ResultKey::App(1));
    }

    #[test]
    fn test_filter_dedupes_to_best_first_occurrence() {
        let apps = vec![
            app(1, "Files", &["music", "Mail archive"]),
            app(2, "Mail", &["Inbox"]),
        ];
        let filtered = filter(&apps, "mail");
        let pids: Vec<Pid> = filtered.iter().map(|a| a.pid).collect();
        assert_eq!(pids, vec![2, 1]);
    }
}
