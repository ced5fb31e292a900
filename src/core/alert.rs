//! Alert side effects for confirmed prohibited objects.
//!
//! Alerts are fire-and-forget: the fusion loop never looks at their outcome.

use crate::core::frame::{Detection, Frame};
use crate::core::overlay;
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Tone used for the audible cue.
pub const ALERT_TONE_HZ: u32 = 1000;
pub const ALERT_TONE_DURATION: Duration = Duration::from_millis(500);

/// Receives every confirmed prohibited object.
pub trait AlertDispatcher: Send {
    fn alert(&mut self, frame: &mut Frame, detection: &Detection);
}

/// Produces the audible part of an alert.
pub trait Beeper: Send {
    fn beep(&mut self, frequency_hz: u32, duration: Duration);
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl Beeper for TerminalBell {
    fn beep(&mut self, _frequency_hz: u32, _duration: Duration) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            debug!("terminal bell failed: {e}");
        }
    }
}

/// A beeper that stays quiet (headless runs, tests).
#[derive(Debug, Default)]
pub struct SilentBeeper;

impl Beeper for SilentBeeper {
    fn beep(&mut self, _frequency_hz: u32, _duration: Duration) {}
}

/// Draws a red box around the object and sounds the cue.
pub struct OverlayAlert<B: Beeper> {
    beeper: B,
    alerts: u64,
}

impl<B: Beeper> OverlayAlert<B> {
    pub fn new(beeper: B) -> Self {
        Self { beeper, alerts: 0 }
    }

    /// Number of alerts dispatched.
    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

impl<B: Beeper> AlertDispatcher for OverlayAlert<B> {
    fn alert(&mut self, frame: &mut Frame, detection: &Detection) {
        overlay::mark_alert(&mut frame.image, detection.bbox);
        self.beeper.beep(ALERT_TONE_HZ, ALERT_TONE_DURATION);
        self.alerts += 1;
        debug!(label = %detection.label, frame = frame.index, "alert dispatched");
    }
}

#[cfg(feature = "audio")]
pub use tone::ToneBeeper;

#[cfg(feature = "audio")]
mod tone {
    use super::Beeper;
    use rodio::source::{SineWave, Source};
    use rodio::{OutputStream, Sink};
    use std::sync::mpsc::{self, Sender};
    use std::thread;
    use std::time::Duration;
    use tracing::debug;

    /// Plays a sine tone on a dedicated audio thread.
    ///
    /// The output stream is not `Send`, so it lives on its own thread and
    /// beeps are posted to it. A beep requested while one is still playing is
    /// dropped.
    pub struct ToneBeeper {
        tx: Option<Sender<(u32, Duration)>>,
    }

    impl ToneBeeper {
        pub fn new() -> Self {
            let (tx, rx) = mpsc::channel::<(u32, Duration)>();

            let spawned = thread::Builder::new()
                .name("alert-audio".to_string())
                .spawn(move || {
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(pair) => pair,
                        Err(e) => {
                            debug!("audio output unavailable: {e}");
                            return;
                        }
                    };
                    let sink = match Sink::try_new(&handle) {
                        Ok(sink) => sink,
                        Err(e) => {
                            debug!("audio sink unavailable: {e}");
                            return;
                        }
                    };

                    while let Ok((freq, duration)) = rx.recv() {
                        if sink.empty() {
                            sink.append(
                                SineWave::new(freq as f32)
                                    .take_duration(duration)
                                    .amplify(0.25),
                            );
                        }
                    }
                });

            Self {
                tx: spawned.ok().map(|_| tx),
            }
        }
    }

    impl Default for ToneBeeper {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Beeper for ToneBeeper {
        fn beep(&mut self, frequency_hz: u32, duration: Duration) {
            if let Some(tx) = &self.tx {
                let _ = tx.send((frequency_hz, duration));
            }
        }
    }
}
