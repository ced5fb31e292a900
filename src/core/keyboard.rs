//! Keyboard listener that runs beside the fusion loop.
//!
//! It consumes key presses from the collector channel on its own thread,
//! logs the quit and tab keys, and clears the shared running flag on quit.
//! Any other key is ignored. Stopping the listener drains keys that were
//! already queued before it exits.

use crate::collector::{KeyEvent, KeySymbol};
use crate::config::KeyConfig;
use crate::core::event::Event;
use crate::core::event_log::SharedEventLog;
use crate::transparency::SharedMonitorStats;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// How often the listener checks its stop flag while idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a key press means to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Log and end the session
    Quit,
    /// Log only
    Log,
    Ignore,
}

/// Classify a key against the configured quit and tab keys.
pub fn classify(key: KeySymbol, keys: &KeyConfig) -> KeyAction {
    if key == keys.quit {
        KeyAction::Quit
    } else if key == keys.tab {
        KeyAction::Log
    } else {
        KeyAction::Ignore
    }
}

/// What the listener did before it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    pub keys_seen: u64,
    pub events_logged: u64,
    pub quit_requested: bool,
}

/// Handle to the listener thread.
pub struct KeyboardConsumer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<KeyboardReport>>,
}

impl KeyboardConsumer {
    /// Start listening on `receiver`.
    ///
    /// `running` is the session-wide flag the fusion loop watches.
    pub fn spawn(
        receiver: Receiver<KeyEvent>,
        keys: KeyConfig,
        log: SharedEventLog,
        running: Arc<AtomicBool>,
        stats: SharedMonitorStats,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("keyboard-listener".to_string())
            .spawn(move || consume(receiver, keys, log, running, stats, stop_flag))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the listener thread has ended on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop the listener and wait for it. Returns `None` if it was already
    /// stopped or panicked.
    pub fn stop(&mut self) -> Option<KeyboardReport> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("keyboard listener panicked");
                None
            }
        }
    }
}

impl Drop for KeyboardConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn consume(
    receiver: Receiver<KeyEvent>,
    keys: KeyConfig,
    log: SharedEventLog,
    running: Arc<AtomicBool>,
    stats: SharedMonitorStats,
    stop: Arc<AtomicBool>,
) -> KeyboardReport {
    let mut report = KeyboardReport::default();

    loop {
        // Once stopped, only keys already queued are handled.
        let event = if stop.load(Ordering::SeqCst) {
            match receiver.try_recv() {
                Ok(event) => event,
                Err(_) => break,
            }
        } else {
            match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("key source disconnected");
                    break;
                }
            }
        };

        report.keys_seen += 1;
        let action = classify(event.key, &keys);
        if action == KeyAction::Ignore {
            continue;
        }

        let entry = Event::key_pressed(event.key.to_string()).at(event.timestamp);
        match log.append(entry) {
            Ok(_) => {
                report.events_logged += 1;
                stats.record_event_logged();
            }
            Err(e) => {
                stats.record_event_log_failure();
                error!(log = %log.path().display(), "AUDIT LOG WRITE FAILED: {e}");
            }
        }

        if action == KeyAction::Quit {
            info!(key = %event.key, "quit key pressed");
            report.quit_requested = true;
            running.store(false, Ordering::SeqCst);
            break;
        }
    }

    report
}
