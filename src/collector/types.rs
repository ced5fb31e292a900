//! Host input signal types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Keys with a symbolic name rather than a printable character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Tab,
    Escape,
    Enter,
    Space,
    Backspace,
}

impl NamedKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedKey::Tab => "Tab",
            NamedKey::Escape => "Escape",
            NamedKey::Enter => "Enter",
            NamedKey::Space => "Space",
            NamedKey::Backspace => "Backspace",
        }
    }
}

/// A pressed key as reported by a keyboard source.
///
/// Keys without a printable character or a recognized name never become a
/// `KeySymbol`; the sources drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeySymbol {
    Char(char),
    Named(NamedKey),
}

impl KeySymbol {
    pub const TAB: KeySymbol = KeySymbol::Named(NamedKey::Tab);
    pub const ESCAPE: KeySymbol = KeySymbol::Named(NamedKey::Escape);
}

impl std::fmt::Display for KeySymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySymbol::Char(c) => write!(f, "{c}"),
            KeySymbol::Named(k) => f.write_str(k.as_str()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized key symbol: {0:?}")]
pub struct KeyParseError(pub String);

impl FromStr for KeySymbol {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return Ok(KeySymbol::Char(c));
            }
        }

        let named = match s.to_ascii_lowercase().as_str() {
            "tab" => NamedKey::Tab,
            "esc" | "escape" => NamedKey::Escape,
            "enter" | "return" => NamedKey::Enter,
            "space" => NamedKey::Space,
            "backspace" => NamedKey::Backspace,
            _ => return Err(KeyParseError(s.to_string())),
        };
        Ok(KeySymbol::Named(named))
    }
}

impl TryFrom<String> for KeySymbol {
    type Error = KeyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<KeySymbol> for String {
    fn from(key: KeySymbol) -> Self {
        key.to_string()
    }
}

/// A key press delivered by a keyboard source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub timestamp: DateTime<Utc>,
    pub key: KeySymbol,
}

impl KeyEvent {
    pub fn new(key: KeySymbol) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
        }
    }
}

/// Reports which window currently has input focus.
pub trait FocusSource {
    /// Title of the focused window, or `None` when nothing is focused or the
    /// platform cannot tell.
    fn active_window_title(&mut self) -> Option<String>;
}

/// Configuration for key capture.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Capacity of the key event channel; presses beyond it are dropped
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
        }
    }
}

/// Errors that can occur during key capture.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,
    #[error("Input Monitoring permission not granted")]
    PermissionDenied,
    #[error("Failed to create CGEvent tap")]
    TapCreationFailed,
    #[error("Failed to create run loop source")]
    RunLoopSourceFailed,
    #[error("Failed to install Windows hook")]
    HookInstallationFailed,
}
