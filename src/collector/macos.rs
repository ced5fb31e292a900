//! macOS key capture using a CGEvent tap, and focus polling through the
//! CoreGraphics window list.
//!
//! Key capture requires Input Monitoring permission. Window titles other
//! than the owning application's name require Screen Recording permission;
//! without it the title falls back to the application name.

use crate::collector::types::{
    CollectorConfig, CollectorError, FocusSource, KeyEvent, KeySymbol, NamedKey,
};
use core_foundation::base::{CFType, ConcreteCFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_foundation::string::{CFString, CFStringRef};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    CallbackResult, EventField,
};
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowOwnerName,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::error;

/// The macOS key collector using a CGEvent tap.
pub struct MacOSCollector {
    sender: Sender<KeyEvent>,
    receiver: Receiver<KeyEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MacOSCollector {
    /// Create a new macOS collector with the given configuration.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity);

        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start capturing key presses in a background thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("key-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_event_loop(sender, running.clone()) {
                    error!("key capture stopped: {e}");
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|_| CollectorError::TapCreationFailed)?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing key presses.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            // The run loop wakes every 100ms and sees the flag
            let _ = handle.join();
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for key events.
    pub fn receiver(&self) -> &Receiver<KeyEvent> {
        &self.receiver
    }

    /// A sender into the collector's channel.
    pub fn sender(&self) -> Sender<KeyEvent> {
        self.sender.clone()
    }
}

impl Drop for MacOSCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the Core Graphics event loop until `running` clears.
fn run_event_loop(sender: Sender<KeyEvent>, running: Arc<AtomicBool>) -> Result<(), CollectorError> {
    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        move |_proxy, event_type, event: &CGEvent| {
            if let Some(key) = process_cg_event(event_type, event) {
                // Never block the tap; a full channel drops the press
                let _ = sender.try_send(KeyEvent::new(key));
            }
            CallbackResult::Keep
        },
    )
    .map_err(|_| CollectorError::TapCreationFailed)?;

    let source = tap
        .mach_port()
        .create_runloop_source(0)
        .map_err(|_| CollectorError::RunLoopSourceFailed)?;

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }

    tap.enable();

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            std::time::Duration::from_millis(100),
            false,
        );
    }

    Ok(())
}

fn process_cg_event(event_type: CGEventType, event: &CGEvent) -> Option<KeySymbol> {
    match event_type {
        CGEventType::KeyDown => {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            key_symbol_for_keycode(keycode)
        }
        _ => None,
    }
}

/// Map a virtual key code (ANSI layout) to a key symbol.
fn key_symbol_for_keycode(keycode: i64) -> Option<KeySymbol> {
    let c = match keycode {
        0 => 'a',
        1 => 's',
        2 => 'd',
        3 => 'f',
        4 => 'h',
        5 => 'g',
        6 => 'z',
        7 => 'x',
        8 => 'c',
        9 => 'v',
        11 => 'b',
        12 => 'q',
        13 => 'w',
        14 => 'e',
        15 => 'r',
        16 => 'y',
        17 => 't',
        18 => '1',
        19 => '2',
        20 => '3',
        21 => '4',
        22 => '6',
        23 => '5',
        24 => '=',
        25 => '9',
        26 => '7',
        27 => '-',
        28 => '8',
        29 => '0',
        30 => ']',
        31 => 'o',
        32 => 'u',
        33 => '[',
        34 => 'i',
        35 => 'p',
        37 => 'l',
        38 => 'j',
        39 => '\'',
        40 => 'k',
        41 => ';',
        42 => '\\',
        43 => ',',
        44 => '/',
        45 => 'n',
        46 => 'm',
        47 => '.',
        50 => '`',
        36 => return Some(KeySymbol::Named(NamedKey::Enter)),
        48 => return Some(KeySymbol::Named(NamedKey::Tab)),
        49 => return Some(KeySymbol::Named(NamedKey::Space)),
        51 => return Some(KeySymbol::Named(NamedKey::Backspace)),
        53 => return Some(KeySymbol::Named(NamedKey::Escape)),
        _ => return None,
    };
    Some(KeySymbol::Char(c))
}

/// Focus source backed by the on-screen window list.
#[derive(Debug, Default)]
pub struct MacOSFocusSource;

impl MacOSFocusSource {
    pub fn new() -> Self {
        Self
    }
}

impl FocusSource for MacOSFocusSource {
    fn active_window_title(&mut self) -> Option<String> {
        frontmost_window_title()
    }
}

/// Title of the frontmost normal-layer window as `"<owner> - <name>"`.
fn frontmost_window_title() -> Option<String> {
    let windows = copy_window_info(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    )?;

    // The list is ordered front to back.
    for raw in windows.iter() {
        // SAFETY: every entry of the window info array is a CFDictionary.
        let info: CFDictionary<CFString, CFType> =
            unsafe { CFDictionary::wrap_under_get_rule(*raw as CFDictionaryRef) };

        let layer = dict_value::<CFNumber>(&info, unsafe { kCGWindowLayer }).and_then(|n| n.to_i64());
        if layer != Some(0) {
            continue;
        }

        let owner = dict_value::<CFString>(&info, unsafe { kCGWindowOwnerName }).map(|s| s.to_string());
        let name = dict_value::<CFString>(&info, unsafe { kCGWindowName })
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        return match (owner, name) {
            (Some(owner), Some(name)) => Some(format!("{owner} - {name}")),
            (Some(owner), None) => Some(owner),
            (None, name) => name,
        };
    }

    None
}

fn dict_value<T: ConcreteCFType>(info: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<T> {
    // SAFETY: the window info keys are static CFStrings owned by CoreGraphics.
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    info.find(&key).and_then(|value| value.downcast::<T>())
}

/// Check if the application can install a key tap (Input Monitoring).
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keycode_mapping() {
        assert_eq!(key_symbol_for_keycode(12), Some(KeySymbol::Char('q')));
        assert_eq!(key_symbol_for_keycode(48), Some(KeySymbol::TAB));
        assert_eq!(key_symbol_for_keycode(53), Some(KeySymbol::ESCAPE));
        // F1 has no symbol
        assert_eq!(key_symbol_for_keycode(122), None);
    }

    #[test]
    fn test_collector_creation() {
        let collector = MacOSCollector::new(CollectorConfig::default());
        assert!(!collector.is_running());
    }
}
