//! Key name and character lookup for the US keyboard layout.
//!
//! Every token that can reach the keyboard resolves to a [`KeyStroke`]: one
//! HID key position plus the modifier byte that must be held with it.
//!
//! # Resolution rule
//!
//! - A token of exactly one character is looked up **verbatim**, so `"a"` and
//!   `"A"` resolve to the same key with different modifiers.
//! - Any longer token is a key *name* (`"UP"`, `"home"`, `"F5"`) and is
//!   uppercased before lookup.
//!
//! The tables are `match` expressions, so they are immutable and need no
//! start-up construction.

pub mod hid;

pub use hid::HidKeyCode;

use crate::report::Modifiers;

/// A resolved key: the key position and the modifiers held while it is pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub code: HidKeyCode,
    pub modifiers: Modifiers,
}

impl KeyStroke {
    /// A key pressed without modifiers.
    pub const fn plain(code: HidKeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
        }
    }

    /// A key pressed with Left Shift held.
    pub const fn shifted(code: HidKeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::SHIFT,
        }
    }
}

/// Static lookup from key names and literal characters to [`KeyStroke`]s.
pub struct KeyMap;

impl KeyMap {
    /// Resolves a key token.
    ///
    /// Returns `None` for the empty string and for anything outside the
    /// declared key set (non-ASCII characters, control characters other than
    /// newline and tab, unknown names).
    pub fn lookup(token: &str) -> Option<KeyStroke> {
        let mut chars = token.chars();
        match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(c), None) => Self::lookup_char(c),
            _ => Self::lookup_name(&token.to_ascii_uppercase()),
        }
    }

    /// Resolves a single literal character, case-sensitively.
    pub fn lookup_char(c: char) -> Option<KeyStroke> {
        use HidKeyCode::*;

        if c.is_ascii_lowercase() {
            return letter(c as u8 - b'a').map(KeyStroke::plain);
        }
        if c.is_ascii_uppercase() {
            return letter(c as u8 - b'A').map(KeyStroke::shifted);
        }

        let stroke = match c {
            '1' => KeyStroke::plain(Digit1),
            '2' => KeyStroke::plain(Digit2),
            '3' => KeyStroke::plain(Digit3),
            '4' => KeyStroke::plain(Digit4),
            '5' => KeyStroke::plain(Digit5),
            '6' => KeyStroke::plain(Digit6),
            '7' => KeyStroke::plain(Digit7),
            '8' => KeyStroke::plain(Digit8),
            '9' => KeyStroke::plain(Digit9),
            '0' => KeyStroke::plain(Digit0),

            ' ' => KeyStroke::plain(Space),
            '\n' => KeyStroke::plain(Enter),
            '\t' => KeyStroke::plain(Tab),
            '-' => KeyStroke::plain(Minus),
            '=' => KeyStroke::plain(Equal),
            '[' => KeyStroke::plain(BracketLeft),
            ']' => KeyStroke::plain(BracketRight),
            '\\' => KeyStroke::plain(Backslash),
            ';' => KeyStroke::plain(Semicolon),
            '\'' => KeyStroke::plain(Quote),
            '`' => KeyStroke::plain(Backquote),
            ',' => KeyStroke::plain(Comma),
            '.' => KeyStroke::plain(Period),
            '/' => KeyStroke::plain(Slash),

            // Shifted digit row
            '!' => KeyStroke::shifted(Digit1),
            '@' => KeyStroke::shifted(Digit2),
            '#' => KeyStroke::shifted(Digit3),
            '$' => KeyStroke::shifted(Digit4),
            '%' => KeyStroke::shifted(Digit5),
            '^' => KeyStroke::shifted(Digit6),
            '&' => KeyStroke::shifted(Digit7),
            '*' => KeyStroke::shifted(Digit8),
            '(' => KeyStroke::shifted(Digit9),
            ')' => KeyStroke::shifted(Digit0),

            // Shifted punctuation
            '_' => KeyStroke::shifted(Minus),
            '+' => KeyStroke::shifted(Equal),
            '{' => KeyStroke::shifted(BracketLeft),
            '}' => KeyStroke::shifted(BracketRight),
            '|' => KeyStroke::shifted(Backslash),
            ':' => KeyStroke::shifted(Semicolon),
            '"' => KeyStroke::shifted(Quote),
            '~' => KeyStroke::shifted(Backquote),
            '<' => KeyStroke::shifted(Comma),
            '>' => KeyStroke::shifted(Period),
            '?' => KeyStroke::shifted(Slash),

            _ => return None,
        };
        Some(stroke)
    }

    /// Resolves an already-uppercased key name.
    fn lookup_name(name: &str) -> Option<KeyStroke> {
        use HidKeyCode::*;

        let code = match name {
            "UP" => ArrowUp,
            "DOWN" => ArrowDown,
            "LEFT" => ArrowLeft,
            "RIGHT" => ArrowRight,

            "DELETE" | "DEL" => Delete,
            "BACKSPACE" => Backspace,
            "HOME" => Home,
            "END" => End,
            "PAGEUP" => PageUp,
            "PAGEDOWN" => PageDown,
            "INSERT" => Insert,
            "ESCAPE" | "ESC" => Escape,
            "ENTER" | "RETURN" => Enter,
            "TAB" => Tab,
            "SPACE" => Space,

            "F1" => F1,
            "F2" => F2,
            "F3" => F3,
            "F4" => F4,
            "F5" => F5,
            "F6" => F6,
            "F7" => F7,
            "F8" => F8,
            "F9" => F9,
            "F10" => F10,
            "F11" => F11,
            "F12" => F12,

            "CAPSLOCK" => CapsLock,
            "NUMLOCK" => NumLock,
            "SCROLLLOCK" => ScrollLock,

            _ => return None,
        };
        Some(KeyStroke::plain(code))
    }

    /// Inverse of [`KeyMap::lookup_char`]: the character a stroke types.
    ///
    /// Returns `None` for strokes that do not type a character (arrows,
    /// function keys, lock keys) or carry modifiers other than Left Shift.
    pub fn char_for(stroke: KeyStroke) -> Option<char> {
        use HidKeyCode::*;

        let shift = match stroke.modifiers {
            Modifiers::NONE => false,
            Modifiers::SHIFT => true,
            _ => return None,
        };

        let raw = stroke.code.as_u8();
        if (KeyA.as_u8()..=KeyZ.as_u8()).contains(&raw) {
            let base = if shift { b'A' } else { b'a' };
            return Some((base + raw - KeyA.as_u8()) as char);
        }

        let (plain, shifted) = match stroke.code {
            Digit1 => ('1', '!'),
            Digit2 => ('2', '@'),
            Digit3 => ('3', '#'),
            Digit4 => ('4', '$'),
            Digit5 => ('5', '%'),
            Digit6 => ('6', '^'),
            Digit7 => ('7', '&'),
            Digit8 => ('8', '*'),
            Digit9 => ('9', '('),
            Digit0 => ('0', ')'),
            Minus => ('-', '_'),
            Equal => ('=', '+'),
            BracketLeft => ('[', '{'),
            BracketRight => (']', '}'),
            Backslash => ('\\', '|'),
            Semicolon => (';', ':'),
            Quote => ('\'', '"'),
            Backquote => ('`', '~'),
            Comma => (',', '<'),
            Period => ('.', '>'),
            Slash => ('/', '?'),
            Space if !shift => return Some(' '),
            Enter if !shift => return Some('\n'),
            Tab if !shift => return Some('\t'),
            _ => return None,
        };
        Some(if shift { shifted } else { plain })
    }
}

/// Letter key at `offset` positions after `KeyA`.
fn letter(offset: u8) -> Option<HidKeyCode> {
    HidKeyCode::from_u8(HidKeyCode::KeyA.as_u8() + offset)
}
