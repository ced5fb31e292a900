//! Host input sources for the proctoring monitor.
//!
//! Key capture runs on a background thread and delivers [`KeyEvent`]s over a
//! bounded channel. Focus polling is synchronous and owned by the fusion loop.

pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub mod noop;

// Re-export commonly used types
pub use types::{
    CollectorConfig, CollectorError, FocusSource, KeyEvent, KeyParseError, KeySymbol, NamedKey,
};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, MacOSCollector, MacOSFocusSource};

/// Platform key collector
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

/// Platform focus source
#[cfg(target_os = "macos")]
pub type PlatformFocusSource = MacOSFocusSource;

#[cfg(target_os = "windows")]
pub use self::windows::{check_permission, WindowsCollector, WindowsFocusSource};

/// Platform key collector
#[cfg(target_os = "windows")]
pub type Collector = WindowsCollector;

/// Platform focus source
#[cfg(target_os = "windows")]
pub type PlatformFocusSource = WindowsFocusSource;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub use noop::{check_permission, NoopCollector, NoopFocusSource};

/// Platform key collector
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub type Collector = NoopCollector;

/// Platform focus source
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub type PlatformFocusSource = NoopFocusSource;
