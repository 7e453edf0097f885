//! Held-modifier tracking over a flag bitmask.
//!
//! On Linux keyboards `Command` is the Super/Meta key and `Option` is Alt.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Raw modifier bitmask as delivered alongside every key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u32 {
        const COMMAND = 1 << 0;
        const SHIFT = 1 << 1;
        const OPTION = 1 << 2;
        const CONTROL = 1 << 3;
    }
}

/// A single modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Command,
    Shift,
    Option,
    Control,
}

impl Modifier {
    pub const ALL: [Modifier; 4] = [
        Modifier::Command,
        Modifier::Shift,
        Modifier::Option,
        Modifier::Control,
    ];

    pub fn flag(self) -> ModifierFlags {
        match self {
            Modifier::Command => ModifierFlags::COMMAND,
            Modifier::Shift => ModifierFlags::SHIFT,
            Modifier::Option => ModifierFlags::OPTION,
            Modifier::Control => ModifierFlags::CONTROL,
        }
    }

    /// Whether this modifier may start the switcher. Shift and Control are
    /// part of the in-switcher key bindings.
    pub fn can_activate(self) -> bool {
        matches!(self, Modifier::Option | Modifier::Command)
    }
}

/// Currently held modifiers. Pure state, replaced wholesale on every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    current: ModifierFlags,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held set with the modifiers in `mask`. Unknown bits are dropped.
    pub fn update(&mut self, mask: u32) {
        self.current = ModifierFlags::from_bits_truncate(mask);
    }

    pub fn set_flags(&mut self, flags: ModifierFlags) {
        self.current = flags;
    }

    pub fn current_set(&self) -> ModifierFlags {
        self.current
    }

    /// Held modifiers as a list, in `Modifier::ALL` order.
    pub fn held(&self) -> Vec<Modifier> {
        Modifier::ALL
            .into_iter()
            .filter(|m| self.current.contains(m.flag()))
            .collect()
    }

    /// Exact equality with `set`.
    pub fn matches(&self, set: ModifierFlags) -> bool {
        self.current == set
    }

    /// True if every modifier in `subset` is held.
    pub fn contains(&self, subset: ModifierFlags) -> bool {
        self.current.contains(subset)
    }

    pub fn is_held(&self, modifier: Modifier) -> bool {
        self.current.contains(modifier.flag())
    }

    /// True iff `modifier` is present in `old` and absent in `new`.
    pub fn was_released(old: ModifierFlags, new: ModifierFlags, modifier: Modifier) -> bool {
        old.contains(modifier.flag()) && !new.contains(modifier.flag())
    }
}
