//! Shortcut state machine.
//!
//! Turns the raw key/modifier stream into [`ShortcutEvent`]s and decides, per
//! event, whether the event belongs to the shortcut grammar (consume) or to
//! the rest of the system (pass through). The interpreter never blocks and
//! never touches a clock or timer itself: arming and cancelling the
//! pending-activation timer is requested through [`TimerRequest`], and the
//! owner feeds the expiry back with [`ShortcutEventInterpreter::timer_fired`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::keys::{KeyCode, RawKeyEvent};
use crate::modifiers::{Modifier, ModifierFlags, ModifierState};

pub const DEFAULT_QUICK_SWITCH_THRESHOLD: Duration = Duration::from_millis(120);

/// High-level intents delivered to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortcutEvent {
    ActivationStarted,
    ShowSwitcher,
    CycleNext,
    CyclePrevious,
    CycleWindowNext,
    CycleWindowPrevious,
    ActivateSearch,
    Confirm,
    Dismiss,
    NavigateUp,
    NavigateDown,
    NavigateRowUp,
    NavigateRowDown,
    QuickSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterState {
    Idle,
    /// Chord held, timer running, UI not shown yet
    PendingActivation,
    SwitcherVisible,
    SwitcherVisibleSearching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Consume,
    PassThrough,
}

/// Timer work the owner must carry out after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    Arm { generation: u64, after: Duration },
    Cancel { generation: u64 },
}

/// Result of feeding one event to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub disposition: Disposition,
    pub events: Vec<ShortcutEvent>,
    pub timer: Option<TimerRequest>,
}

impl Outcome {
    fn pass() -> Self {
        Outcome {
            disposition: Disposition::PassThrough,
            events: Vec::new(),
            timer: None,
        }
    }

    fn consume() -> Self {
        Outcome {
            disposition: Disposition::Consume,
            events: Vec::new(),
            timer: None,
        }
    }

    fn emit(mut self, event: ShortcutEvent) -> Self {
        self.events.push(event);
        self
    }

    fn with_timer(mut self, timer: Option<TimerRequest>) -> Self {
        self.timer = timer;
        self
    }

    pub fn consumed(&self) -> bool {
        self.disposition == Disposition::Consume
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub activation_modifier: Modifier,
    pub quick_switch_threshold: Duration,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            activation_modifier: Modifier::Option,
            quick_switch_threshold: DEFAULT_QUICK_SWITCH_THRESHOLD,
        }
    }
}

/// The activation key is fixed; only the modifier is configurable.
const ACTIVATION_KEY: KeyCode = KeyCode::Tab;

pub struct ShortcutEventInterpreter {
    config: InterpreterConfig,
    modifiers: ModifierState,
    state: InterpreterState,
    /// Guard flag: a timer is armed and has not been resolved yet.
    pending: bool,
    generation: u64,
    armed_at: Option<Instant>,
    /// A non-grammar key was pressed while the chord was pending.
    interacted: bool,
    /// Keys whose key-down was consumed; their key-up is consumed too.
    swallowed: HashSet<KeyCode>,
}

impl ShortcutEventInterpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        ShortcutEventInterpreter {
            config,
            modifiers: ModifierState::new(),
            state: InterpreterState::Idle,
            pending: false,
            generation: 0,
            armed_at: None,
            interacted: false,
            swallowed: HashSet::new(),
        }
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    pub fn activation_modifier(&self) -> Modifier {
        self.config.activation_modifier
    }

    /// Change the activation modifier. Modifiers that cannot activate are
    /// refused and the current one is kept.
    pub fn set_activation_modifier(&mut self, modifier: Modifier) -> bool {
        if !modifier.can_activate() {
            warn!(
                "Refusing {:?} as activation modifier, keeping {:?}",
                modifier, self.config.activation_modifier
            );
            return false;
        }
        if modifier != self.config.activation_modifier {
            debug!(
                "Activation modifier changed: {:?} -> {:?}",
                self.config.activation_modifier, modifier
            );
            self.config.activation_modifier = modifier;
        }
        true
    }

    fn activation_flag(&self) -> ModifierFlags {
        self.config.activation_modifier.flag()
    }

    /// Feed one raw event.
    pub fn handle(&mut self, event: RawKeyEvent, now: Instant) -> Outcome {
        let outcome = match event {
            RawKeyEvent::TapDisabled => {
                // Keys went missing: abandon any chord without switching.
                warn!("Keyboard interception was disabled and re-armed");
                self.modifiers.set_flags(ModifierFlags::empty());
                self.swallowed.clear();
                self.dismiss()
            }
            RawKeyEvent::FlagsChanged { flags } => self.on_flags_changed(flags),
            RawKeyEvent::KeyDown { key, flags } => {
                self.modifiers.set_flags(flags);
                let outcome = self.on_key_down(key, now);
                if outcome.consumed() {
                    self.swallowed.insert(key);
                }
                outcome
            }
            RawKeyEvent::KeyUp { key, flags } => {
                self.modifiers.set_flags(flags);
                if self.swallowed.remove(&key) {
                    Outcome::consume()
                } else {
                    Outcome::pass()
                }
            }
        };

        if !outcome.events.is_empty() {
            debug!("{:?} -> {:?} (now {:?})", event, outcome.events, self.state);
        } else {
            trace!("{:?} -> {:?}", event, outcome.disposition);
        }
        outcome
    }

    /// The pending-activation timer for `generation` expired.
    ///
    /// A timer that was cancelled, superseded by a newer arm, or resolved by a
    /// release first is ignored here, so a stale expiry can never show the UI.
    pub fn timer_fired(&mut self, generation: u64, now: Instant) -> Outcome {
        if !self.pending
            || generation != self.generation
            || self.state != InterpreterState::PendingActivation
        {
            trace!("Ignoring stale activation timer {}", generation);
            return Outcome::pass();
        }

        self.pending = false;
        self.state = InterpreterState::SwitcherVisible;
        if let Some(armed_at) = self.armed_at.take() {
            debug!(
                "Activation timer fired after {:?}",
                now.saturating_duration_since(armed_at)
            );
        }
        Outcome::pass().emit(ShortcutEvent::ShowSwitcher)
    }

    /// External dismissal (click outside, IPC cancel). Valid from any state.
    pub fn dismiss(&mut self) -> Outcome {
        let was_idle = self.state == InterpreterState::Idle;
        let cancel = self.disarm();
        self.state = InterpreterState::Idle;
        let outcome = Outcome::pass().with_timer(cancel);
        if was_idle {
            outcome
        } else {
            outcome.emit(ShortcutEvent::Dismiss)
        }
    }

    fn arm(&mut self, now: Instant) -> Outcome {
        if self.pending {
            debug!("Activation already pending, not re-arming");
            return Outcome::consume();
        }
        self.pending = true;
        self.generation += 1;
        self.armed_at = Some(now);
        self.interacted = false;
        self.state = InterpreterState::PendingActivation;
        Outcome::consume()
            .emit(ShortcutEvent::ActivationStarted)
            .with_timer(Some(TimerRequest::Arm {
                generation: self.generation,
                after: self.config.quick_switch_threshold,
            }))
    }

    fn disarm(&mut self) -> Option<TimerRequest> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.armed_at = None;
        Some(TimerRequest::Cancel {
            generation: self.generation,
        })
    }

    fn on_flags_changed(&mut self, flags: ModifierFlags) -> Outcome {
        let old = self.modifiers.current_set();
        self.modifiers.set_flags(flags);

        // Modifier transitions always reach the rest of the system.
        if !ModifierState::was_released(old, flags, self.config.activation_modifier) {
            return Outcome::pass();
        }

        match self.state {
            InterpreterState::Idle => Outcome::pass(),
            InterpreterState::PendingActivation => {
                let cancel = self.disarm();
                self.state = InterpreterState::Idle;
                let event = if self.interacted {
                    ShortcutEvent::Dismiss
                } else {
                    ShortcutEvent::QuickSwitch
                };
                Outcome::pass().emit(event).with_timer(cancel)
            }
            InterpreterState::SwitcherVisible => {
                self.state = InterpreterState::Idle;
                Outcome::pass().emit(ShortcutEvent::Confirm)
            }
            // Searching suppresses confirm-on-release
            InterpreterState::SwitcherVisibleSearching => Outcome::pass(),
        }
    }

    fn on_key_down(&mut self, key: KeyCode, now: Instant) -> Outcome {
        let activation = self.activation_flag();
        match self.state {
            InterpreterState::Idle => {
                if key == ACTIVATION_KEY && self.modifiers.matches(activation) {
                    self.arm(now)
                } else {
                    Outcome::pass()
                }
            }
            InterpreterState::PendingActivation => {
                if key == ACTIVATION_KEY && self.modifiers.contains(activation) {
                    // Second tap: show without cycling on this press
                    let cancel = self.disarm();
                    self.state = InterpreterState::SwitcherVisible;
                    return Outcome::consume()
                        .emit(ShortcutEvent::ShowSwitcher)
                        .with_timer(cancel);
                }
                if key == KeyCode::Escape {
                    let cancel = self.disarm();
                    self.state = InterpreterState::Idle;
                    return Outcome::consume()
                        .emit(ShortcutEvent::Dismiss)
                        .with_timer(cancel);
                }
                if self.visible_binding(key).is_some() {
                    let cancel = self.disarm();
                    self.state = InterpreterState::SwitcherVisible;
                    let mut outcome = self.on_visible_key(key);
                    outcome.events.insert(0, ShortcutEvent::ShowSwitcher);
                    return outcome.with_timer(cancel);
                }
                self.interacted = true;
                Outcome::pass()
            }
            InterpreterState::SwitcherVisible => self.on_visible_key(key),
            InterpreterState::SwitcherVisibleSearching => self.on_search_key(key),
        }
    }

    fn visible_binding(&self, key: KeyCode) -> Option<ShortcutEvent> {
        let shift = self.modifiers.is_held(Modifier::Shift);
        let event = match key {
            KeyCode::Tab if shift => ShortcutEvent::CyclePrevious,
            KeyCode::Tab => ShortcutEvent::CycleNext,
            KeyCode::Backtick if shift => ShortcutEvent::CycleWindowPrevious,
            KeyCode::Backtick => ShortcutEvent::CycleWindowNext,
            KeyCode::E => ShortcutEvent::CycleWindowNext,
            KeyCode::Q => ShortcutEvent::CycleWindowPrevious,
            KeyCode::Return => ShortcutEvent::ActivateSearch,
            KeyCode::Escape => ShortcutEvent::Dismiss,
            KeyCode::Up | KeyCode::W => ShortcutEvent::NavigateRowUp,
            KeyCode::Down | KeyCode::S => ShortcutEvent::NavigateRowDown,
            KeyCode::Left | KeyCode::A => ShortcutEvent::CyclePrevious,
            KeyCode::Right | KeyCode::D => ShortcutEvent::CycleNext,
            KeyCode::Other(_) => return None,
        };
        Some(event)
    }

    fn on_visible_key(&mut self, key: KeyCode) -> Outcome {
        let Some(event) = self.visible_binding(key) else {
            return Outcome::pass();
        };
        match event {
            ShortcutEvent::ActivateSearch => {
                self.state = InterpreterState::SwitcherVisibleSearching;
            }
            ShortcutEvent::Dismiss => {
                self.state = InterpreterState::Idle;
            }
            _ => {}
        }
        Outcome::consume().emit(event)
    }

    fn on_search_key(&mut self, key: KeyCode) -> Outcome {
        let shift = self.modifiers.is_held(Modifier::Shift);
        let event = match key {
            KeyCode::Return => {
                self.state = InterpreterState::Idle;
                ShortcutEvent::Confirm
            }
            KeyCode::Escape => {
                self.state = InterpreterState::Idle;
                ShortcutEvent::Dismiss
            }
            KeyCode::Up | KeyCode::Left => ShortcutEvent::NavigateUp,
            KeyCode::Down | KeyCode::Right => ShortcutEvent::NavigateDown,
            KeyCode::Tab if shift => ShortcutEvent::NavigateUp,
            KeyCode::Tab => ShortcutEvent::NavigateDown,
            // Typing goes to the query field
            _ => return Outcome::pass(),
        };
        Outcome::consume().emit(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPT: ModifierFlags = ModifierFlags::OPTION;

    fn interpreter() -> ShortcutEventInterpreter {
        ShortcutEventInterpreter::new(InterpreterConfig::default())
    }

    fn flags(i: &mut ShortcutEventInterpreter, flags: ModifierFlags) -> Outcome {
        i.handle(RawKeyEvent::FlagsChanged { flags }, Instant::now())
    }

    fn down(i: &mut ShortcutEventInterpreter, key: KeyCode, flags: ModifierFlags) -> Outcome {
        i.handle(RawKeyEvent::KeyDown { key, flags }, Instant::now())
    }

    fn up(i: &mut ShortcutEventInterpreter, key: KeyCode, flags: ModifierFlags) -> Outcome {
        i.handle(RawKeyEvent::KeyUp { key, flags }, Instant::now())
    }

    /// Hold the modifier and press tab; returns the armed generation.
    fn start_chord(i: &mut ShortcutEventInterpreter) -> u64 {
        flags(i, OPT);
        let outcome = down(i, KeyCode::Tab, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::ActivationStarted]);
        assert!(outcome.consumed());
        match outcome.timer {
            Some(TimerRequest::Arm { generation, after }) => {
                assert_eq!(after, DEFAULT_QUICK_SWITCH_THRESHOLD);
                generation
            }
            other => panic!("expected timer arm, got {:?}", other),
        }
    }

    #[test]
    fn test_quick_switch_on_fast_release() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        assert_eq!(i.state(), InterpreterState::PendingActivation);

        let outcome = flags(&mut i, ModifierFlags::empty());
        assert_eq!(outcome.events, vec![ShortcutEvent::QuickSwitch]);
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));
        assert_eq!(i.state(), InterpreterState::Idle);

        // The timer message may still arrive; it must not show the UI.
        let late = i.timer_fired(generation, Instant::now());
        assert!(late.events.is_empty());
        assert_eq!(i.state(), InterpreterState::Idle);
    }

    #[test]
    fn test_timer_shows_switcher_then_release_confirms() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);

        let outcome = i.timer_fired(generation, Instant::now());
        assert_eq!(outcome.events, vec![ShortcutEvent::ShowSwitcher]);
        assert_eq!(i.state(), InterpreterState::SwitcherVisible);

        let outcome = flags(&mut i, ModifierFlags::empty());
        assert_eq!(outcome.events, vec![ShortcutEvent::Confirm]);
        assert!(!outcome.events.contains(&ShortcutEvent::QuickSwitch));
        assert_eq!(i.state(), InterpreterState::Idle);
    }

    #[test]
    fn test_second_tap_shows_without_cycling() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        up(&mut i, KeyCode::Tab, OPT);

        let outcome = down(&mut i, KeyCode::Tab, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::ShowSwitcher]);
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));

        let outcome = down(&mut i, KeyCode::Tab, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::CycleNext]);

        let shifted = OPT | ModifierFlags::SHIFT;
        flags(&mut i, shifted);
        let outcome = down(&mut i, KeyCode::Tab, shifted);
        assert_eq!(outcome.events, vec![ShortcutEvent::CyclePrevious]);
    }

    #[test]
    fn test_activation_requires_only_the_activation_modifier() {
        let mut i = interpreter();
        let chord = OPT | ModifierFlags::CONTROL;
        flags(&mut i, chord);
        let outcome = down(&mut i, KeyCode::Tab, chord);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.disposition, Disposition::PassThrough);
        assert_eq!(i.state(), InterpreterState::Idle);

        let outcome = down(&mut i, KeyCode::Tab, ModifierFlags::empty());
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_command_as_activation_modifier() {
        let mut i = ShortcutEventInterpreter::new(InterpreterConfig {
            activation_modifier: Modifier::Command,
            ..InterpreterConfig::default()
        });
        flags(&mut i, OPT);
        assert!(down(&mut i, KeyCode::Tab, OPT).events.is_empty());
        flags(&mut i, ModifierFlags::empty());

        flags(&mut i, ModifierFlags::COMMAND);
        let outcome = down(&mut i, KeyCode::Tab, ModifierFlags::COMMAND);
        assert_eq!(outcome.events, vec![ShortcutEvent::ActivationStarted]);
    }

    #[test]
    fn test_switcher_grammar() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        i.timer_fired(generation, Instant::now());

        let cases = [
            (KeyCode::Backtick, ShortcutEvent::CycleWindowNext),
            (KeyCode::E, ShortcutEvent::CycleWindowNext),
            (KeyCode::Q, ShortcutEvent::CycleWindowPrevious),
            (KeyCode::Up, ShortcutEvent::NavigateRowUp),
            (KeyCode::W, ShortcutEvent::NavigateRowUp),
            (KeyCode::Down, ShortcutEvent::NavigateRowDown),
            (KeyCode::S, ShortcutEvent::NavigateRowDown),
            (KeyCode::Left, ShortcutEvent::CyclePrevious),
            (KeyCode::A, ShortcutEvent::CyclePrevious),
            (KeyCode::Right, ShortcutEvent::CycleNext),
            (KeyCode::D, ShortcutEvent::CycleNext),
        ];
        for (key, expected) in cases {
            let outcome = down(&mut i, key, OPT);
            assert_eq!(outcome.events, vec![expected], "{:?}", key);
            assert!(outcome.consumed());
            assert_eq!(i.state(), InterpreterState::SwitcherVisible);
        }

        let shifted = OPT | ModifierFlags::SHIFT;
        flags(&mut i, shifted);
        let outcome = down(&mut i, KeyCode::Backtick, shifted);
        assert_eq!(outcome.events, vec![ShortcutEvent::CycleWindowPrevious]);

        let outcome = down(&mut i, KeyCode::Other(30), shifted);
        assert_eq!(outcome.disposition, Disposition::PassThrough);
    }

    #[test]
    fn test_escape_dismisses_visible_switcher() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        i.timer_fired(generation, Instant::now());

        let outcome = down(&mut i, KeyCode::Escape, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(i.state(), InterpreterState::Idle);

        // Releasing afterwards confirms nothing
        assert!(flags(&mut i, ModifierFlags::empty()).events.is_empty());
    }

    #[test]
    fn test_search_mode_suppresses_release_and_passes_typing() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        i.timer_fired(generation, Instant::now());

        let outcome = down(&mut i, KeyCode::Return, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::ActivateSearch]);
        assert_eq!(i.state(), InterpreterState::SwitcherVisibleSearching);

        let outcome = flags(&mut i, ModifierFlags::empty());
        assert!(outcome.events.is_empty());
        assert_eq!(i.state(), InterpreterState::SwitcherVisibleSearching);

        // WASD are plain letters while searching
        for key in [KeyCode::W, KeyCode::A, KeyCode::Other(46)] {
            let outcome = down(&mut i, key, ModifierFlags::empty());
            assert_eq!(outcome.disposition, Disposition::PassThrough);
            assert!(outcome.events.is_empty());
        }

        let nav = [
            (KeyCode::Down, ShortcutEvent::NavigateDown),
            (KeyCode::Right, ShortcutEvent::NavigateDown),
            (KeyCode::Tab, ShortcutEvent::NavigateDown),
            (KeyCode::Up, ShortcutEvent::NavigateUp),
            (KeyCode::Left, ShortcutEvent::NavigateUp),
        ];
        for (key, expected) in nav {
            assert_eq!(down(&mut i, key, ModifierFlags::empty()).events, vec![expected]);
        }
        let outcome = down(&mut i, KeyCode::Tab, ModifierFlags::SHIFT);
        assert_eq!(outcome.events, vec![ShortcutEvent::NavigateUp]);

        let outcome = down(&mut i, KeyCode::Return, ModifierFlags::empty());
        assert_eq!(outcome.events, vec![ShortcutEvent::Confirm]);
        assert_eq!(i.state(), InterpreterState::Idle);
    }

    #[test]
    fn test_escape_leaves_search() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        i.timer_fired(generation, Instant::now());
        down(&mut i, KeyCode::Return, OPT);

        let outcome = down(&mut i, KeyCode::Escape, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(i.state(), InterpreterState::Idle);
    }

    #[test]
    fn test_external_dismiss_cancels_pending_timer() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);

        let outcome = i.dismiss();
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));
        assert_eq!(i.state(), InterpreterState::Idle);
        assert!(i.timer_fired(generation, Instant::now()).events.is_empty());

        // Dismissing while idle is a no-op
        let outcome = i.dismiss();
        assert!(outcome.events.is_empty());
        assert!(outcome.timer.is_none());
    }

    #[test]
    fn test_stale_generation_ignored_after_rearm() {
        let mut i = interpreter();
        let first = start_chord(&mut i);
        flags(&mut i, ModifierFlags::empty());
        let second = start_chord(&mut i);
        assert_ne!(first, second);

        assert!(i.timer_fired(first, Instant::now()).events.is_empty());
        assert_eq!(i.state(), InterpreterState::PendingActivation);
        assert_eq!(
            i.timer_fired(second, Instant::now()).events,
            vec![ShortcutEvent::ShowSwitcher]
        );
    }

    #[test]
    fn test_timer_fires_once() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        assert_eq!(i.timer_fired(generation, Instant::now()).events.len(), 1);
        assert!(i.timer_fired(generation, Instant::now()).events.is_empty());
    }

    #[test]
    fn test_grammar_key_while_pending_promotes_to_switcher() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);

        let outcome = down(&mut i, KeyCode::Backtick, OPT);
        assert_eq!(
            outcome.events,
            vec![ShortcutEvent::ShowSwitcher, ShortcutEvent::CycleWindowNext]
        );
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));
        assert_eq!(i.state(), InterpreterState::SwitcherVisible);
    }

    #[test]
    fn test_other_key_while_pending_prevents_quick_switch() {
        let mut i = interpreter();
        start_chord(&mut i);

        let outcome = down(&mut i, KeyCode::Other(30), OPT);
        assert_eq!(outcome.disposition, Disposition::PassThrough);
        assert_eq!(i.state(), InterpreterState::PendingActivation);

        let outcome = flags(&mut i, ModifierFlags::empty());
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(i.state(), InterpreterState::Idle);
    }

    #[test]
    fn test_escape_while_pending_cancels() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        let outcome = down(&mut i, KeyCode::Escape, OPT);
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));
    }

    #[test]
    fn test_key_up_swallowed_only_after_swallowed_down() {
        let mut i = interpreter();
        start_chord(&mut i);
        flags(&mut i, ModifierFlags::empty());

        // Tab was consumed on the way down, so its release is consumed as well,
        // even though the interpreter is idle again.
        let outcome = up(&mut i, KeyCode::Tab, ModifierFlags::empty());
        assert_eq!(outcome.disposition, Disposition::Consume);

        let outcome = up(&mut i, KeyCode::Tab, ModifierFlags::empty());
        assert_eq!(outcome.disposition, Disposition::PassThrough);
    }

    #[test]
    fn test_tap_disabled_abandons_chord_without_switching() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);

        let outcome = i.handle(RawKeyEvent::TapDisabled, Instant::now());
        assert_eq!(outcome.events, vec![ShortcutEvent::Dismiss]);
        assert_eq!(outcome.timer, Some(TimerRequest::Cancel { generation }));
        assert_eq!(i.state(), InterpreterState::Idle);
        assert!(i.timer_fired(generation, Instant::now()).events.is_empty());

        // The modifier came up while the device was gone
        assert!(flags(&mut i, ModifierFlags::empty()).events.is_empty());

        // Loss while idle is silent, and the next chord works again
        assert!(i
            .handle(RawKeyEvent::TapDisabled, Instant::now())
            .events
            .is_empty());
        start_chord(&mut i);
        assert_eq!(
            flags(&mut i, ModifierFlags::empty()).events,
            vec![ShortcutEvent::QuickSwitch]
        );
    }

    #[test]
    fn test_tap_disabled_while_visible_dismisses() {
        let mut i = interpreter();
        let generation = start_chord(&mut i);
        i.timer_fired(generation, Instant::now());
        assert_eq!(
            i.handle(RawKeyEvent::TapDisabled, Instant::now()).events,
            vec![ShortcutEvent::Dismiss]
        );
        assert!(flags(&mut i, ModifierFlags::empty()).events.is_empty());
    }

    #[test]
    fn test_shift_and_control_are_refused_as_activation_modifier() {
        let mut i = interpreter();
        assert!(!i.set_activation_modifier(Modifier::Shift));
        assert!(!i.set_activation_modifier(Modifier::Control));
        assert_eq!(i.activation_modifier(), Modifier::Option);

        // Shift+Tab stays an ordinary key combination
        flags(&mut i, ModifierFlags::SHIFT);
        let outcome = down(&mut i, KeyCode::Tab, ModifierFlags::SHIFT);
        assert!(outcome.events.is_empty());
        assert_eq!(i.state(), InterpreterState::Idle);

        assert!(i.set_activation_modifier(Modifier::Command));
        assert_eq!(i.activation_modifier(), Modifier::Command);
    }

    #[test]
    fn test_modifier_changes_always_pass_through() {
        let mut i = interpreter();
        assert_eq!(flags(&mut i, OPT).disposition, Disposition::PassThrough);
        start_chord(&mut i);
        let outcome = flags(&mut i, ModifierFlags::empty());
        assert_eq!(outcome.disposition, Disposition::PassThrough);
    }
}
