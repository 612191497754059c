//! Maps raw device state from the presentation layer onto `InputState`.

use std::collections::HashSet;

use shared::player::InputState;
use shared::weapons::WeaponKind;

/// Keys the game reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    A,
    D,
    W,
    R,
    Left,
    Right,
    Up,
    Space,
    Shift,
    /// Number row `1`..=`9`.
    Digit(u8),
}

/// One frame of device state as the presentation layer sees it.
#[derive(Debug, Clone, Default)]
pub struct RawInput {
    pub keys_down: HashSet<Key>,
    /// Pointer position in screen pixels.
    pub pointer: (f32, f32),
    pub primary_button: bool,
}

impl RawInput {
    pub fn is_down(&self, key: Key) -> bool {
        self.keys_down.contains(&key)
    }
}

/// Turns raw frames into simulation input with edge detection for keys that
/// act once per press.
#[derive(Debug, Default)]
pub struct InputManager {
    /// World position of the screen's top-left corner.
    camera: (f32, f32),
    prev_reload: bool,
    prev_digits: [bool; WeaponKind::ALL.len()],
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_camera(&mut self, x: f32, y: f32) {
        self.camera = (x, y);
    }

    pub fn sample(&mut self, raw: &RawInput) -> InputState {
        let reload = raw.is_down(Key::R);
        let reload_pressed = reload && !self.prev_reload;
        self.prev_reload = reload;

        // Lowest newly pressed weapon key wins.
        let mut weapon_select = None;
        for (slot, kind) in WeaponKind::ALL.iter().enumerate() {
            let down = raw.is_down(Key::Digit(slot as u8 + 1));
            if down && !self.prev_digits[slot] && weapon_select.is_none() {
                weapon_select = Some(*kind);
            }
            self.prev_digits[slot] = down;
        }

        InputState {
            left: raw.is_down(Key::A) || raw.is_down(Key::Left),
            right: raw.is_down(Key::D) || raw.is_down(Key::Right),
            jump: raw.is_down(Key::W) || raw.is_down(Key::Up) || raw.is_down(Key::Space),
            jetpack: raw.is_down(Key::Shift),
            fire: raw.primary_button,
            reload: reload_pressed,
            aim_x: raw.pointer.0 + self.camera.0,
            aim_y: raw.pointer.1 + self.camera.1,
            weapon_select,
        }
    }
}
