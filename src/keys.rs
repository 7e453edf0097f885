//! Raw keyboard stream types consumed by the event interpreter.

use crate::modifiers::ModifierFlags;

/// Keys the shortcut grammar cares about. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Tab,
    Backtick,
    Return,
    Escape,
    Up,
    Down,
    Left,
    Right,
    W,
    A,
    S,
    D,
    Q,
    E,
    /// Any other key, by platform scan code
    Other(u16),
}

/// One event from the low-level keyboard source.
///
/// Every key event carries the modifier bitmask held at the time it was
/// produced, so the interpreter never has to reconstruct it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKeyEvent {
    KeyDown { key: KeyCode, flags: ModifierFlags },
    KeyUp { key: KeyCode, flags: ModifierFlags },
    FlagsChanged { flags: ModifierFlags },
    /// The interception source was lost out of band; it is being re-armed and
    /// any chord in progress is void.
    TapDisabled,
}
