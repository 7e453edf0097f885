//! Display names and icons for application ids, from freedesktop desktop entries.

use freedesktop_desktop_entry::DesktopEntry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::model::IconHandle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppMetadata {
    pub name: Option<String>,
    pub icon: Option<IconHandle>,
}

pub struct AppMetadataResolver {
    search_dirs: Vec<PathBuf>,
    cache: Mutex<HashMap<String, AppMetadata>>, // app_id -> metadata
}

impl AppMetadataResolver {
    pub fn new() -> Self {
        let mut search_dirs = Vec::new();
        if let Some(data_dir) = dirs::data_local_dir() {
            search_dirs.push(data_dir.join("applications"));
        }
        search_dirs.push(PathBuf::from("/usr/local/share/applications"));
        search_dirs.push(PathBuf::from("/usr/share/applications"));
        Self::with_dirs(search_dirs)
    }

    pub fn with_dirs(search_dirs: Vec<PathBuf>) -> Self {
        AppMetadataResolver {
            search_dirs,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve metadata for an application id, caching misses as well.
    pub fn resolve(&self, app_id: &str) -> AppMetadata {
        if let Some(cached) = self.cache.lock().get(app_id) {
            return cached.clone();
        }

        // File lookups happen outside the lock; a racing resolve just repeats them.
        let metadata = self.find_desktop_entry(app_id).unwrap_or_default();
        self.cache
            .lock()
            .insert(app_id.to_string(), metadata.clone());
        metadata
    }

    /// Name to show for `app_id`: the desktop entry's, else one derived from the id.
    pub fn display_name(&self, app_id: &str) -> String {
        self.resolve(app_id)
            .name
            .unwrap_or_else(|| fallback_name(app_id))
    }

    fn find_desktop_entry(&self, app_id: &str) -> Option<AppMetadata> {
        let file_name = format!("{}.desktop", app_id);

        // Exact match first: app_id.desktop
        for dir in &self.search_dirs {
            let path = dir.join(&file_name);
            if let Some(metadata) = parse_desktop_file(&path) {
                debug!("Found desktop entry for '{}' at {:?}", app_id, path);
                return Some(metadata);
            }
        }

        // Case-insensitive match
        let wanted = file_name.to_lowercase();
        for dir in &self.search_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let matches = path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().to_lowercase() == wanted);
                if matches && let Some(metadata) = parse_desktop_file(&path) {
                    debug!("Found desktop entry for '{}' (case-insensitive) at {:?}", app_id, path);
                    return Some(metadata);
                }
            }
        }

        debug!("No desktop entry for app_id: {}", app_id);
        None
    }
}

impl Default for AppMetadataResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_desktop_file(path: &Path) -> Option<AppMetadata> {
    let content = std::fs::read_to_string(path).ok()?;
    let entry = DesktopEntry::decode(path, &content).ok()?;
    Some(AppMetadata {
        name: entry.name(None).map(|name| name.to_string()),
        icon: entry.icon().map(|icon| IconHandle(icon.to_string())),
    })
}

/// `org.gnome.Nautilus` -> `Nautilus`, `firefox` -> `Firefox`.
pub fn fallback_name(app_id: &str) -> String {
    let last = app_id.rsplit('.').next().unwrap_or(app_id);
    let mut chars = last.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => app_id.to_string(),
    }
}
