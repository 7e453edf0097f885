use anyhow::{Context, Result};
use evdev::{Device, InputEventKind, Key};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::keys::{KeyCode, RawKeyEvent};
use crate::modifiers::ModifierFlags;

const REOPEN_INTERVAL: Duration = Duration::from_secs(1);

/// Turns evdev key transitions into `RawKeyEvent`s carrying the held modifiers.
#[derive(Debug, Default)]
pub struct KeyTranslator {
    /// Modifier keys currently down, by evdev code. Left and right keys are
    /// tracked apart so releasing one keeps the flag while the other is held.
    held: HashSet<u16>,
    flags: ModifierFlags,
}

impl KeyTranslator {
    pub fn flags(&self) -> ModifierFlags {
        self.flags
    }

    /// Forget held modifiers after the device went away. Emits nothing: the
    /// interpreter drops its own state on `TapDisabled`.
    pub fn reset(&mut self) {
        self.held.clear();
        self.flags = ModifierFlags::empty();
    }

    /// `value` is the evdev key state: 0 release, 1 press, 2 autorepeat.
    pub fn translate(&mut self, key: Key, value: i32) -> Option<RawKeyEvent> {
        if modifier_flag(key).is_some() {
            if value == 0 {
                self.held.remove(&key.code());
            } else {
                self.held.insert(key.code());
            }
            let before = self.flags;
            self.flags = self
                .held
                .iter()
                .filter_map(|&code| modifier_flag(Key::new(code)))
                .fold(ModifierFlags::empty(), |flags, flag| flags | flag);
            return (self.flags != before).then_some(RawKeyEvent::FlagsChanged { flags: self.flags });
        }

        let key = key_code(key);
        match value {
            0 => Some(RawKeyEvent::KeyUp {
                key,
                flags: self.flags,
            }),
            1 | 2 => Some(RawKeyEvent::KeyDown {
                key,
                flags: self.flags,
            }),
            _ => None,
        }
    }
}

fn modifier_flag(key: Key) -> Option<ModifierFlags> {
    match key {
        Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => Some(ModifierFlags::COMMAND),
        Key::KEY_LEFTALT | Key::KEY_RIGHTALT => Some(ModifierFlags::OPTION),
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => Some(ModifierFlags::SHIFT),
        Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => Some(ModifierFlags::CONTROL),
        _ => None,
    }
}

fn key_code(key: Key) -> KeyCode {
    match key {
        Key::KEY_TAB => KeyCode::Tab,
        Key::KEY_GRAVE => KeyCode::Backtick,
        Key::KEY_ENTER | Key::KEY_KPENTER => KeyCode::Return,
        Key::KEY_ESC => KeyCode::Escape,
        Key::KEY_UP => KeyCode::Up,
        Key::KEY_DOWN => KeyCode::Down,
        Key::KEY_LEFT => KeyCode::Left,
        Key::KEY_RIGHT => KeyCode::Right,
        Key::KEY_W => KeyCode::W,
        Key::KEY_A => KeyCode::A,
        Key::KEY_S => KeyCode::S,
        Key::KEY_D => KeyCode::D,
        Key::KEY_Q => KeyCode::Q,
        Key::KEY_E => KeyCode::E,
        other => KeyCode::Other(other.code()),
    }
}

pub struct KeyboardMonitor {
    device: Device,
    /// Explicitly requested device; `None` means pick the first suitable one
    requested: Option<PathBuf>,
    translator: KeyTranslator,
}

impl KeyboardMonitor {
    /// Open the given device, or find a keyboard device
    pub fn new(device_path: Option<&Path>) -> Result<Self> {
        let device = open_device(device_path)?;
        info!("Using keyboard device: {:?}", device.name());

        Ok(KeyboardMonitor {
            device,
            requested: device_path.map(Path::to_path_buf),
            translator: KeyTranslator::default(),
        })
    }

    /// Read keyboard events and send them through the channel.
    /// Runs on a dedicated thread until the receiver is dropped.
    pub fn monitor_blocking(mut self, tx: mpsc::UnboundedSender<RawKeyEvent>) -> Result<()> {
        info!("Starting keyboard monitoring");

        loop {
            let error = match self.device.fetch_events() {
                Ok(events) => {
                    let mut batch = Vec::new();
                    for event in events {
                        if let InputEventKind::Key(key) = event.kind()
                            && let Some(raw) = self.translator.translate(key, event.value())
                        {
                            batch.push(raw);
                        }
                    }
                    for raw in batch {
                        if tx.send(raw).is_err() {
                            debug!("Key event receiver dropped, stopping monitor");
                            return Ok(());
                        }
                    }
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                Err(e) => e,
            };

            warn!("Lost keyboard input: {}", error);
            self.translator.reset();
            if tx.send(RawKeyEvent::TapDisabled).is_err() {
                return Ok(());
            }
            self.reopen(&tx);
        }
    }

    /// Keep trying to get a device back until one opens or the daemon goes away.
    fn reopen(&mut self, tx: &mpsc::UnboundedSender<RawKeyEvent>) {
        loop {
            if tx.is_closed() {
                return;
            }
            std::thread::sleep(REOPEN_INTERVAL);
            match open_device(self.requested.as_deref()) {
                Ok(device) => {
                    info!("Re-opened keyboard device: {:?}", device.name());
                    self.device = device;
                    return;
                }
                Err(e) => debug!("Keyboard device not available yet: {}", e),
            }
        }
    }
}

fn open_device(path: Option<&Path>) -> Result<Device> {
    match path {
        Some(path) => Device::open(path)
            .with_context(|| format!("Failed to open keyboard device {}", path.display())),
        None => find_keyboard_device().context("Failed to find keyboard device"),
    }
}

/// Find a suitable keyboard device from /dev/input/event*
fn find_keyboard_device() -> Result<Device> {
    for (path, device) in evdev::enumerate() {
        if let Some(keys) = device.supported_keys()
            && keys.contains(Key::KEY_TAB)
            && keys.contains(Key::KEY_LEFTALT)
            && keys.contains(Key::KEY_LEFTMETA)
            && keys.contains(Key::KEY_ESC)
        {
            debug!("Found suitable keyboard {:?} at {}", device.name(), path.display());
            return Ok(device);
        }
    }

    anyhow::bail!("No suitable keyboard device found. Make sure you have permission to read /dev/input/event* devices.")
}

/// Check if the current user has permission to read keyboard devices
pub fn check_permissions(device_path: Option<&Path>) -> Result<()> {
    match open_device(device_path) {
        Ok(_) => {
            info!("Keyboard device access OK");
            Ok(())
        }
        Err(e) => {
            eprintln!("ERROR: Cannot access keyboard devices.");
            eprintln!("This daemon needs permission to read /dev/input/event* devices.");
            eprintln!("\nTo fix this, add your user to the 'input' group:");
            eprintln!("  sudo usermod -aG input $USER");
            eprintln!("  (then log out and log back in)");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_presses_update_flags() {
        let mut t = KeyTranslator::default();
        assert_eq!(
            t.translate(Key::KEY_LEFTALT, 1),
            Some(RawKeyEvent::FlagsChanged {
                flags: ModifierFlags::OPTION
            })
        );
        // Autorepeat of a held modifier changes nothing
        assert_eq!(t.translate(Key::KEY_LEFTALT, 2), None);
        assert_eq!(
            t.translate(Key::KEY_RIGHTSHIFT, 1),
            Some(RawKeyEvent::FlagsChanged {
                flags: ModifierFlags::OPTION | ModifierFlags::SHIFT
            })
        );
        assert_eq!(
            t.translate(Key::KEY_LEFTALT, 0),
            Some(RawKeyEvent::FlagsChanged {
                flags: ModifierFlags::SHIFT
            })
        );
    }

    #[test]
    fn test_keys_carry_held_flags() {
        let mut t = KeyTranslator::default();
        t.translate(Key::KEY_LEFTMETA, 1);
        assert_eq!(
            t.translate(Key::KEY_TAB, 1),
            Some(RawKeyEvent::KeyDown {
                key: KeyCode::Tab,
                flags: ModifierFlags::COMMAND
            })
        );
        assert_eq!(
            t.translate(Key::KEY_TAB, 2),
            Some(RawKeyEvent::KeyDown {
                key: KeyCode::Tab,
                flags: ModifierFlags::COMMAND
            })
        );
        assert_eq!(
            t.translate(Key::KEY_TAB, 0),
            Some(RawKeyEvent::KeyUp {
                key: KeyCode::Tab,
                flags: ModifierFlags::COMMAND
            })
        );
    }

    #[test]
    fn test_key_codes() {
        assert_eq!(key_code(Key::KEY_GRAVE), KeyCode::Backtick);
        assert_eq!(key_code(Key::KEY_KPENTER), KeyCode::Return);
        assert_eq!(key_code(Key::KEY_Z), KeyCode::Other(Key::KEY_Z.code()));
    }

    #[test]
    fn test_left_and_right_modifiers_are_tracked_apart() {
        let mut t = KeyTranslator::default();
        t.translate(Key::KEY_LEFTALT, 1);
        // The second Alt adds nothing new
        assert_eq!(t.translate(Key::KEY_RIGHTALT, 1), None);
        // Releasing it must not look like releasing Alt
        assert_eq!(t.translate(Key::KEY_RIGHTALT, 0), None);
        assert_eq!(t.flags(), ModifierFlags::OPTION);
        assert_eq!(
            t.translate(Key::KEY_TAB, 1),
            Some(RawKeyEvent::KeyDown {
                key: KeyCode::Tab,
                flags: ModifierFlags::OPTION
            })
        );
        assert_eq!(
            t.translate(Key::KEY_LEFTALT, 0),
            Some(RawKeyEvent::FlagsChanged {
                flags: ModifierFlags::empty()
            })
        );
    }

    #[test]
    fn test_reset_forgets_held_modifiers_silently() {
        let mut t = KeyTranslator::default();
        t.translate(Key::KEY_LEFTCTRL, 1);
        t.translate(Key::KEY_RIGHTMETA, 1);
        t.reset();
        assert!(t.flags().is_empty());
        // A release arriving from the re-opened device changes nothing
        assert_eq!(t.translate(Key::KEY_LEFTCTRL, 0), None);
        assert_eq!(
            t.translate(Key::KEY_LEFTMETA, 1),
            Some(RawKeyEvent::FlagsChanged {
                flags: ModifierFlags::COMMAND
            })
        );
    }
}
