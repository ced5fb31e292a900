//! Fallback key capture and focus polling for targets without a native
//! implementation.
//!
//! The collector never emits on its own, but its channel still accepts
//! injected presses through [`NoopCollector::sender`].

use crate::collector::types::{CollectorConfig, CollectorError, FocusSource, KeyEvent};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A collector that never captures system key presses.
pub struct NoopCollector {
    sender: Sender<KeyEvent>,
    receiver: Receiver<KeyEvent>,
    running: Arc<AtomicBool>,
}

impl NoopCollector {
    /// Create a new noop collector.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity);
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start capturing key presses.
    ///
    /// On these platforms, this simply marks the collector as running.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop capturing key presses.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
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

/// Focus source that never knows the focused window.
#[derive(Debug, Default)]
pub struct NoopFocusSource;

impl NoopFocusSource {
    pub fn new() -> Self {
        Self
    }
}

impl FocusSource for NoopFocusSource {
    fn active_window_title(&mut self) -> Option<String> {
        None
    }
}

/// There is no permission gate for the noop collector.
pub fn check_permission() -> bool {
    true
}
