// SPDX-License-Identifier: MIT OR Apache-2.0
//! ShaderToy keyboard texture encoding.
//!
//! The texture is 256x3 texels addressed by JavaScript key code. Row 0
//! holds keys currently down, row 1 keys that went down this frame and
//! row 2 flips on every press.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::DynamicTextureUpdate;

/// Keyboard texture width (one column per key code)
pub const KEYBOARD_TEXTURE_WIDTH: u32 = 256;
/// Keyboard texture height (held, pressed, toggled)
pub const KEYBOARD_TEXTURE_HEIGHT: u32 = 3;

const KEY_COUNT: usize = KEYBOARD_TEXTURE_WIDTH as usize;
const KEY_ON: u32 = 0xffff_ffff;

/// Keyboard state shared between the input source and the keyboard texture
pub type SharedKeyboard = Rc<RefCell<KeyboardState>>;

/// Key state by JavaScript key code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyboardState {
    held: [bool; KEY_COUNT],
    pressed: [bool; KEY_COUNT],
    toggled: [bool; KEY_COUNT],
}

impl KeyboardState {
    /// Create a state with every key up
    pub fn new() -> Self {
        Self {
            held: [false; KEY_COUNT],
            pressed: [false; KEY_COUNT],
            toggled: [false; KEY_COUNT],
        }
    }

    /// Record a key going down. Auto-repeat while held is ignored.
    pub fn press(&mut self, key_code: u8) {
        let key = usize::from(key_code);
        if !self.held[key] {
            self.held[key] = true;
            self.pressed[key] = true;
            self.toggled[key] = !self.toggled[key];
        }
    }

    /// Record a key going up
    pub fn release(&mut self, key_code: u8) {
        self.held[usize::from(key_code)] = false;
    }

    /// Whether the key is down
    pub fn is_held(&self, key_code: u8) -> bool {
        self.held[usize::from(key_code)]
    }

    /// Write the three rows into `texels` and end the frame, clearing the
    /// per-frame press flags.
    pub fn encode(&mut self, texels: &mut [u32]) {
        let rows = [&self.held, &self.pressed, &self.toggled];
        for (row, states) in texels.chunks_exact_mut(KEY_COUNT).zip(rows) {
            for (texel, on) in row.iter_mut().zip(states.iter()) {
                *texel = if *on { KEY_ON } else { 0 };
            }
        }
        self.pressed = [false; KEY_COUNT];
    }

    /// Per-frame texture update reading a shared state
    pub fn update_callback(state: SharedKeyboard) -> DynamicTextureUpdate {
        Box::new(move |texels| state.borrow_mut().encode(texels))
    }
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self::new()
    }
}

/// JavaScript key code for a key name such as `"A"`, `"Space"` or `"Left"`
pub fn key_code(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    if let [c] = upper.as_bytes() {
        if c.is_ascii_alphanumeric() {
            return Some(*c);
        }
    }
    let code = match upper.as_str() {
        "BACKSPACE" => 8,
        "TAB" => 9,
        "ENTER" => 13,
        "SHIFT" => 16,
        "CTRL" | "CONTROL" => 17,
        "PAUSE" => 19,
        "CAPSLOCK" => 20,
        "ESCAPE" | "ESC" => 27,
        "SPACE" => 32,
        "PAGEUP" => 33,
        "PAGEDOWN" => 34,
        "END" => 35,
        "HOME" => 36,
        "LEFT" => 37,
        "UP" => 38,
        "RIGHT" => 39,
        "DOWN" => 40,
        "INSERT" => 45,
        "DELETE" => 46,
        _ => {
            let function = upper.strip_prefix('F')?.parse::<u8>().ok()?;
            return (1..=12).contains(&function).then(|| 111 + function);
        }
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(texels: &[u32], key: u8, row: usize) -> u32 {
        texels[usize::from(key) + row * KEY_COUNT]
    }

    #[test]
    fn test_press_is_visible_for_one_frame() {
        let mut state = KeyboardState::new();
        let mut texels = vec![0; KEY_COUNT * 3];
        let space = key_code("space").unwrap();

        state.press(space);
        state.encode(&mut texels);
        assert_eq!(texel(&texels, space, 0), KEY_ON);
        assert_eq!(texel(&texels, space, 1), KEY_ON);
        assert_eq!(texel(&texels, space, 2), KEY_ON);

        state.press(space);
        state.encode(&mut texels);
        assert_eq!(texel(&texels, space, 0), KEY_ON);
        assert_eq!(texel(&texels, space, 1), 0);
        assert_eq!(texel(&texels, space, 2), KEY_ON);
    }

    #[test]
    fn test_toggle_flips_on_each_press() {
        let mut state = KeyboardState::new();
        let mut texels = vec![0; KEY_COUNT * 3];
        let a = key_code("a").unwrap();

        state.press(a);
        state.release(a);
        state.press(a);
        state.release(a);
        state.encode(&mut texels);
        assert_eq!(texel(&texels, a, 0), 0);
        assert_eq!(texel(&texels, a, 2), 0);
        assert!(!state.is_held(a));
    }

    #[test]
    fn test_shared_state_drives_the_callback() {
        let shared = Rc::new(RefCell::new(KeyboardState::new()));
        let mut update = KeyboardState::update_callback(Rc::clone(&shared));
        let mut texels = vec![0; KEY_COUNT * 3];

        shared.borrow_mut().press(37);
        update(&mut texels);
        assert_eq!(texel(&texels, 37, 1), KEY_ON);
        update(&mut texels);
        assert_eq!(texel(&texels, 37, 1), 0);
    }

    #[test]
    fn test_key_names_map_to_javascript_codes() {
        assert_eq!(key_code("A"), Some(65));
        assert_eq!(key_code("7"), Some(55));
        assert_eq!(key_code("Left"), Some(37));
        assert_eq!(key_code("F5"), Some(116));
        assert_eq!(key_code("F13"), None);
        assert_eq!(key_code("Hyper"), None);
    }
}
