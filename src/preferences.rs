use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::modifiers::Modifier;

/// User preferences persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub activation_modifier: Modifier,
    /// Include minimized windows in the switcher
    pub show_minimized: bool,
    /// Render window titles under each application
    pub show_window_titles: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            activation_modifier: Modifier::Option,
            show_minimized: true,
            show_window_titles: true,
        }
    }
}

impl Preferences {
    /// Load preferences from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No preferences at {}, using defaults", path.display());
            return Ok(Preferences::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences at {}", path.display()))?;
        let mut preferences: Preferences = serde_json::from_str(&content)
            .with_context(|| format!("Invalid preferences file {}", path.display()))?;

        if !preferences.activation_modifier.can_activate() {
            let fallback = Preferences::default().activation_modifier;
            warn!(
                "{:?} cannot be the activation modifier (expected option or command), using {:?}",
                preferences.activation_modifier, fallback
            );
            preferences.activation_modifier = fallback;
        }

        info!(
            "Loaded preferences from {}: modifier={:?}",
            path.display(),
            preferences.activation_modifier
        );
        Ok(preferences)
    }
}

/// Default location: `$XDG_CONFIG_HOME/tabswitch/preferences.json`
pub fn default_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("tabswitch").join("preferences.json"))
}
