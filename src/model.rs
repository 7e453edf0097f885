//! Domain model shared by the snapshot store, the ranking engine and the UI.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process identifier. Stable for the lifetime of the process.
pub type Pid = i32;

/// Window identity.
///
/// Platform ids are unique among on-screen windows. When the backend cannot
/// supply one, an id is synthesized from the owning process and the window's
/// position inside that application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowId {
    Platform(i64),
    Synthetic { pid: Pid, ordinal: usize },
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowId::Platform(id) => write!(f, "{}", id),
            WindowId::Synthetic { pid, ordinal } => write!(f, "{}#{}", pid, ordinal),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Opaque icon reference handed to the presentation layer (an icon theme
/// name or an absolute path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    /// Position within the owning application's window list
    pub ordinal: usize,
    pub title: String,
    pub bounds: Rect,
    pub is_minimized: bool,
    pub is_on_screen: bool,
    /// Synthesized so that an application without usable windows stays selectable
    pub is_placeholder: bool,
}

impl Window {
    pub fn placeholder(pid: Pid, title: &str) -> Self {
        Window {
            id: WindowId::Synthetic { pid, ordinal: 0 },
            ordinal: 0,
            title: title.to_string(),
            bounds: Rect::default(),
            is_minimized: false,
            is_on_screen: false,
            is_placeholder: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubEntityKind {
    BrowserTab,
    Project,
}

/// Something inside an application that can be searched for on its own,
/// such as a browser tab or an IDE project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubEntity {
    pub kind: SubEntityKind,
    pub text: String,
    /// Window that shows this entity, if known
    pub window_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub pid: Pid,
    pub bundle_id: Option<String>,
    pub name: String,
    pub icon: Option<IconHandle>,
    /// Never empty once assembled by the enumerator
    pub windows: Vec<Window>,
    pub sub_entities: Vec<SubEntity>,
    /// Frontmost application
    pub is_active: bool,
}

impl Application {
    /// Whether any window is a real window rather than a placeholder
    pub fn has_real_windows(&self) -> bool {
        self.windows.iter().any(|w| !w.is_placeholder)
    }
}
