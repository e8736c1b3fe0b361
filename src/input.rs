use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Parses DOM-style key names (`"ArrowUp"`, `"w"`, `"Escape"`).
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            Some(Self::Character(ch.to_ascii_uppercase()))
        } else if ch.is_ascii_digit() {
            Some(Self::Digit(ch as u8 - b'0'))
        } else if ch == ' ' {
            Some(Self::Named(NamedKey::Space))
        } else {
            None
        }
    }

    /// Keys a browser would also use to scroll the page.
    pub fn scrolls_page(self) -> bool {
        matches!(
            self,
            Self::Named(NamedKey::Up | NamedKey::Down | NamedKey::Left | NamedKey::Right | NamedKey::Space)
        )
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        "Shift" | "LeftShift" => LeftShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Whether an element with this tag takes typed text, so key presses aimed
/// at it are not camera input.
pub fn is_text_entry_element(tag_name: &str) -> bool {
    ["INPUT", "TEXTAREA", "SELECT"]
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(tag_name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Left,
    Right,
    Up,
    Down,
    Escape,
    LeftShift,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const PRIMARY: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Default)]
struct Held {
    keys: HashSet<KeyCode>,
    buttons: HashSet<MouseButton>,
    pointer: Option<Vec2>,
    drag: Vec2,
}

/// Input snapshot shared between host event callbacks and the camera.
#[derive(Debug, Default)]
pub struct InputState {
    held: RwLock<Held>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.held.write().keys.insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.held.write().keys.remove(&key);
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.held.write().buttons.insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.held.write().buttons.remove(&button);
    }

    /// Records the pointer position; movement with the primary button held
    /// accumulates into the drag delta.
    pub fn set_mouse_position(&self, position: Vec2) {
        let mut held = self.held.write();
        let dragging = held.buttons.contains(&MouseButton::PRIMARY);
        if let (Some(previous), true) = (held.pointer.replace(position), dragging) {
            held.drag += position - previous;
        }
    }

    /// Presses `button` at `position` without turning the jump from the last
    /// known position into drag. Touch contacts start wherever the finger lands.
    pub fn press_pointer(&self, button: MouseButton, position: Vec2) {
        let mut held = self.held.write();
        held.pointer = Some(position);
        held.buttons.insert(button);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.held.read().keys.contains(&key)
    }

    pub fn is_any_key_down(&self, keys: &[KeyCode]) -> bool {
        let held = self.held.read();
        keys.iter().any(|key| held.keys.contains(key))
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.held.read().buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Option<Vec2> {
        self.held.read().pointer
    }

    /// Returns the drag movement since the last call and resets it.
    pub fn take_drag_delta(&self) -> Vec2 {
        std::mem::take(&mut self.held.write().drag)
    }

    /// Drops every held key and button, e.g. when the surface loses focus.
    pub fn clear(&self) {
        let mut held = self.held.write();
        held.keys.clear();
        held.buttons.clear();
        held.drag = Vec2::ZERO;
    }
}
