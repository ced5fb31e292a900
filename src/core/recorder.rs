//! Incident recorder: a latch that starts recording on the first prohibited
//! object and keeps every later frame until shutdown.

use crate::core::frame::{Frame, Resolution};
use crate::recording::{RecordingBackend, RecordingError, RecordingSink};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Recorder state. The only transition is `Idle -> Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Result of notifying the recorder of a trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This trigger latched the recorder
    Started,
    /// The recorder was already latched
    AlreadyRecording,
}

/// Where and how incident clips are written.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSettings {
    pub output_dir: PathBuf,
    pub resolution: Resolution,
    pub frame_rate: f64,
}

pub struct IncidentRecorder {
    state: RecorderState,
    settings: RecordingSettings,
    backend: Box<dyn RecordingBackend>,
    sink: Option<Box<dyn RecordingSink>>,
    clip: Option<PathBuf>,
    written: u64,
    triggered_at: Option<DateTime<Utc>>,
    trigger_label: Option<String>,
    disabled: bool,
}

impl IncidentRecorder {
    pub fn new(settings: RecordingSettings, backend: Box<dyn RecordingBackend>) -> Self {
        Self {
            state: RecorderState::Idle,
            settings,
            backend,
            sink: None,
            clip: None,
            written: 0,
            triggered_at: None,
            trigger_label: None,
            disabled: false,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// True once opening or writing the clip has failed. The latch stays set;
    /// only frame writes stop.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    /// Label of the detection that latched the recorder.
    pub fn trigger_label(&self) -> Option<&str> {
        self.trigger_label.as_deref()
    }

    /// Where the clip was opened. Kept after the clip is closed.
    pub fn clip_location(&self) -> Option<&Path> {
        self.clip.as_deref()
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    /// Notify the recorder that a prohibited object was confirmed.
    pub fn trigger(&mut self, label: &str) -> TriggerOutcome {
        if self.state == RecorderState::Recording {
            return TriggerOutcome::AlreadyRecording;
        }

        let now = Utc::now();
        self.state = RecorderState::Recording;
        self.triggered_at = Some(now);
        self.trigger_label = Some(label.to_string());

        let path = self.settings.output_dir.join(format!(
            "suspicious_activity_{}",
            now.format("%Y%m%d_%H%M%S")
        ));

        match self
            .backend
            .open(&path, self.settings.resolution, self.settings.frame_rate)
        {
            Ok(sink) => {
                info!(
                    trigger = label,
                    clip = %sink.location().display(),
                    resolution = %self.settings.resolution,
                    fps = self.settings.frame_rate,
                    "incident recording started"
                );
                self.clip = Some(sink.location().to_path_buf());
                self.sink = Some(sink);
            }
            Err(e) => {
                warn!(trigger = label, "incident recording unavailable: {e}");
                self.disabled = true;
            }
        }

        TriggerOutcome::Started
    }

    /// Hand a frame to the recorder. Returns true if it reached the clip.
    pub fn record(&mut self, frame: &Frame) -> bool {
        if self.state == RecorderState::Idle {
            return false;
        }
        let Some(sink) = self.sink.as_mut() else {
            return false;
        };

        match sink.write(frame) {
            Ok(()) => {
                self.written += 1;
                true
            }
            Err(e) => {
                warn!(frame = frame.index, "incident recording stopped: {e}");
                if let Some(mut sink) = self.sink.take() {
                    if let Err(e) = sink.close() {
                        warn!(
                            clip = %sink.location().display(),
                            "incident recording not closed cleanly: {e}"
                        );
                    }
                }
                self.disabled = true;
                false
            }
        }
    }

    /// Close the clip, if one is open. The state stays latched.
    pub fn close(&mut self) -> Result<(), RecordingError> {
        match self.sink.take() {
            Some(mut sink) => {
                let written = sink.frames_written();
                let location = sink.location().to_path_buf();
                sink.close()?;
                info!(frames = written, clip = %location.display(), "incident recording closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}
