//! Hardware keys.
//!
//! The global key order below is significant: when no declared default key
//! of a key action is free, the first free key in [`HardwareKey::ALL`] order
//! is bound.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! hardware_keys {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// A physical key or button of an input device.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum HardwareKey {
            $(
                #[allow(missing_docs)]
                $variant,
            )+
        }

        impl HardwareKey {
            /// Every key, in global search order.
            pub const ALL: &'static [HardwareKey] = &[$(HardwareKey::$variant),+];

            /// Canonical name, as used in configuration files.
            pub fn name(self) -> &'static str {
                match self {
                    $(HardwareKey::$variant => $name,)+
                }
            }
        }

        impl FromStr for HardwareKey {
            type Err = UnknownKey;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(HardwareKey::$variant),)+
                    _ => Err(UnknownKey(s.to_string())),
                }
            }
        }
    };
}

hardware_keys! {
    Esc => "ESC",
    Digit1 => "1", Digit2 => "2", Digit3 => "3", Digit4 => "4", Digit5 => "5",
    Digit6 => "6", Digit7 => "7", Digit8 => "8", Digit9 => "9", Digit0 => "0",
    Minus => "MINUS", Equal => "EQUAL", Backspace => "BACKSPACE", Tab => "TAB",
    Q => "Q", W => "W", E => "E", R => "R", T => "T", Y => "Y", U => "U", I => "I", O => "O", P => "P",
    LeftBrace => "LEFTBRACE", RightBrace => "RIGHTBRACE", Enter => "ENTER", LeftCtrl => "LEFTCTRL",
    A => "A", S => "S", D => "D", F => "F", G => "G", H => "H", J => "J", K => "K", L => "L",
    Semicolon => "SEMICOLON", Apostrophe => "APOSTROPHE", Grave => "GRAVE",
    LeftShift => "LEFTSHIFT", Backslash => "BACKSLASH",
    Z => "Z", X => "X", C => "C", V => "V", B => "B", N => "N", M => "M",
    Comma => "COMMA", Dot => "DOT", Slash => "SLASH", RightShift => "RIGHTSHIFT",
    KpAsterisk => "KPASTERISK", LeftAlt => "LEFTALT", Space => "SPACE",
    F1 => "F1", F2 => "F2", F3 => "F3", F4 => "F4", F5 => "F5", F6 => "F6",
    F7 => "F7", F8 => "F8", F9 => "F9", F10 => "F10", F11 => "F11", F12 => "F12",
    Kp7 => "KP7", Kp8 => "KP8", Kp9 => "KP9", KpMinus => "KPMINUS",
    Kp4 => "KP4", Kp5 => "KP5", Kp6 => "KP6", KpPlus => "KPPLUS",
    Kp1 => "KP1", Kp2 => "KP2", Kp3 => "KP3", Kp0 => "KP0", KpDot => "KPDOT",
    KpEnter => "KPENTER", RightCtrl => "RIGHTCTRL", KpSlash => "KPSLASH", RightAlt => "RIGHTALT",
    Home => "HOME", Up => "UP", PageUp => "PAGEUP", Left => "LEFT", Right => "RIGHT",
    End => "END", Down => "DOWN", PageDown => "PAGEDOWN", Insert => "INSERT", Delete => "DELETE",
    ScrollUp => "SCROLLUP", ScrollDown => "SCROLLDOWN",
    BtnLeft => "BTN_LEFT", BtnRight => "BTN_RIGHT", BtnMiddle => "BTN_MIDDLE",
    BtnA => "BTN_A", BtnB => "BTN_B", BtnX => "BTN_X", BtnY => "BTN_Y",
    BtnTl => "BTN_TL", BtnTr => "BTN_TR", BtnSelect => "BTN_SELECT", BtnStart => "BTN_START",
}

/// Unrecognized key name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown hardware key: {0}")]
pub struct UnknownKey(pub String);

impl TryFrom<String> for HardwareKey {
    type Error = UnknownKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareKey> for &'static str {
    fn from(key: HardwareKey) -> Self {
        key.name()
    }
}

impl fmt::Display for HardwareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for &key in HardwareKey::ALL {
            assert_eq!(key.name().parse::<HardwareKey>(), Ok(key), "key {:?}", key);
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!("NOPE".parse::<HardwareKey>(), Err(UnknownKey("NOPE".to_string())));
    }

    #[test]
    fn test_global_order_matches_declaration() {
        assert_eq!(HardwareKey::ALL[0], HardwareKey::Esc);
        let pos = |k: HardwareKey| HardwareKey::ALL.iter().position(|&x| x == k).unwrap();
        assert!(pos(HardwareKey::Digit1) < pos(HardwareKey::Q));
        assert!(pos(HardwareKey::Q) < pos(HardwareKey::Up));
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&HardwareKey::Up).unwrap();
        assert_eq!(json, "\"UP\"");
        let key: HardwareKey = serde_json::from_str("\"8\"").unwrap();
        assert_eq!(key, HardwareKey::Digit8);
    }
}
