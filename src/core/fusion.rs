//! The signal fusion loop.
//!
//! One iteration per acquired frame, always in this order:
//!
//! 1. acquire the frame (exhaustion ends the loop)
//! 2. every `sample_interval`th frame: object detection, prohibited-object
//!    events, alerts, recorder trigger, then the multiple-persons check
//! 3. head detection on the grayscale frame (overlay only, never logged)
//! 4. focus poll, logging a change of the focused window
//! 5. recording write, if the recorder is latched
//! 6. display
//!
//! Person count, focus state and the recorder are owned here and never
//! touched by the keyboard listener; the two only share the event log.

use crate::collector::FocusSource;
use crate::config::DEFAULT_PROHIBITED_LABELS;
use crate::core::alert::AlertDispatcher;
use crate::core::event::Event;
use crate::core::event_log::SharedEventLog;
use crate::core::frame::Frame;
use crate::core::overlay;
use crate::core::recorder::{IncidentRecorder, RecorderState, TriggerOutcome};
use crate::core::sources::{
    DetectorError, DisplaySink, FrameSource, HeadDetector, ObjectDetector, SourceError,
};
use crate::recording::RecordingError;
use crate::transparency::SharedMonitorStats;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Detection label counted as a person.
pub const PERSON_LABEL: &str = "person";

/// Fixed settings of one fusion loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionSettings {
    /// Object detection runs on every Nth frame (values below 1 act as 1)
    pub sample_interval: u64,
    pub prohibited_labels: BTreeSet<String>,
    /// Consecutive failures of one detector before an operator alert
    pub detector_failure_threshold: u32,
}

impl FusionSettings {
    pub fn is_prohibited(&self, label: &str) -> bool {
        self.prohibited_labels.contains(label)
    }
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            sample_interval: 5,
            prohibited_labels: DEFAULT_PROHIBITED_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            detector_failure_threshold: 3,
        }
    }
}

/// External collaborators of the loop.
pub struct Collaborators {
    pub frames: Box<dyn FrameSource>,
    pub objects: Box<dyn ObjectDetector>,
    pub heads: Box<dyn HeadDetector>,
    pub focus: Box<dyn FocusSource>,
    pub alerts: Box<dyn AlertDispatcher>,
    pub display: Box<dyn DisplaySink>,
}

/// What happened to one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub index: u64,
    pub sampled: bool,
    pub detections: usize,
    pub persons: usize,
    pub events_logged: usize,
    pub incident_started: bool,
    pub recorded: bool,
}

/// Result of a single loop step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Processed(FrameReport),
    /// The frame source has no more frames
    EndOfStream,
    /// The running flag was cleared (quit key or Ctrl+C)
    Stopped,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    EndOfStream,
    QuitRequested,
}

/// Counts consecutive failures of one detector.
#[derive(Debug)]
struct FailureTracker {
    detector: &'static str,
    consecutive: u32,
    threshold: u32,
}

impl FailureTracker {
    fn new(detector: &'static str, threshold: u32) -> Self {
        Self {
            detector,
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    fn succeeded(&mut self) {
        if self.consecutive >= self.threshold {
            info!(detector = self.detector, "detector recovered");
        }
        self.consecutive = 0;
    }

    fn failed(&mut self, frame: u64, err: &DetectorError) {
        self.consecutive += 1;
        warn!(frame, "{err}; skipping detection for this frame");
        if self.consecutive == self.threshold {
            error!(
                detector = self.detector,
                failures = self.consecutive,
                "detector keeps failing; detections are not being produced"
            );
        }
    }
}

/// Results of releasing the loop's resources.
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub frame_source: Option<SourceError>,
    pub recorder: Option<RecordingError>,
}

/// The fusion loop context.
pub struct FusionLoop {
    settings: FusionSettings,
    io: Collaborators,
    recorder: IncidentRecorder,
    log: SharedEventLog,
    stats: SharedMonitorStats,
    running: Arc<AtomicBool>,
    frame_count: u64,
    person_count: usize,
    focus_state: Option<String>,
    object_failures: FailureTracker,
    head_failures: FailureTracker,
}

impl FusionLoop {
    /// Build the loop. The focus source is polled once here so the window
    /// focused at startup is the baseline, not a change.
    pub fn new(
        settings: FusionSettings,
        mut io: Collaborators,
        recorder: IncidentRecorder,
        log: SharedEventLog,
        stats: SharedMonitorStats,
        running: Arc<AtomicBool>,
    ) -> Self {
        let focus_state = io.focus.active_window_title();
        let threshold = settings.detector_failure_threshold;

        Self {
            settings,
            io,
            recorder,
            log,
            stats,
            running,
            frame_count: 0,
            person_count: 0,
            focus_state,
            object_failures: FailureTracker::new("object", threshold),
            head_failures: FailureTracker::new("head", threshold),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Persons seen in the most recent sampled frame.
    pub fn person_count(&self) -> usize {
        self.person_count
    }

    pub fn focus_state(&self) -> Option<&str> {
        self.focus_state.as_deref()
    }

    pub fn recorder(&self) -> &IncidentRecorder {
        &self.recorder
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.recorder.state()
    }

    /// Run until the source is exhausted or the running flag clears.
    pub fn run(&mut self) -> TerminationReason {
        loop {
            match self.step() {
                StepOutcome::Processed(_) => {}
                StepOutcome::EndOfStream => {
                    info!(frames = self.frame_count, "frame source exhausted");
                    return TerminationReason::EndOfStream;
                }
                StepOutcome::Stopped => {
                    info!(frames = self.frame_count, "monitoring stopped");
                    return TerminationReason::QuitRequested;
                }
            }
        }
    }

    /// Process one frame.
    pub fn step(&mut self) -> StepOutcome {
        if !self.running.load(Ordering::SeqCst) {
            return StepOutcome::Stopped;
        }

        let Some(mut frame) = self.io.frames.next_frame() else {
            return StepOutcome::EndOfStream;
        };

        self.frame_count += 1;
        self.stats.record_frame();

        let mut report = FrameReport {
            index: frame.index,
            ..FrameReport::default()
        };

        if self.frame_count % self.settings.sample_interval.max(1) == 0 {
            report.sampled = true;
            self.stats.record_sampled_frame();
            self.process_objects(&mut frame, &mut report);
        }

        self.process_heads(&mut frame);
        self.poll_focus(&mut report);

        if self.recorder.is_recording() {
            report.recorded = self.recorder.record(&frame);
            if report.recorded {
                self.stats.record_frame_recorded();
            }
        }

        self.io.display.show(&frame);
        StepOutcome::Processed(report)
    }

    fn process_objects(&mut self, frame: &mut Frame, report: &mut FrameReport) {
        let detections = match self.io.objects.detect(frame) {
            Ok(detections) => {
                self.object_failures.succeeded();
                detections
            }
            Err(e) => {
                self.stats.record_detector_failure();
                self.object_failures.failed(frame.index, &e);
                return;
            }
        };

        report.detections = detections.len();
        self.stats.record_detections(detections.len() as u64);

        let mut persons = 0;
        for detection in &detections {
            if detection.label == PERSON_LABEL {
                persons += 1;
                overlay::mark_person(&mut frame.image, detection.bbox);
            }

            if self.settings.is_prohibited(&detection.label) {
                if self.emit(Event::prohibited_object(&detection.label)) {
                    report.events_logged += 1;
                }

                self.io.alerts.alert(frame, detection);
                self.stats.record_alert();

                if self.recorder.trigger(&detection.label) == TriggerOutcome::Started {
                    report.incident_started = true;
                }
            }
        }

        self.person_count = persons;
        report.persons = persons;

        if persons > 1 && self.emit(Event::multiple_persons()) {
            report.events_logged += 1;
        }
    }

    fn process_heads(&mut self, frame: &mut Frame) {
        let gray = frame.grayscale();
        match self.io.heads.detect(&gray) {
            Ok(heads) => {
                self.head_failures.succeeded();
                for head in heads {
                    overlay::mark_head(&mut frame.image, head);
                }
            }
            Err(e) => {
                self.stats.record_detector_failure();
                self.head_failures.failed(frame.index, &e);
            }
        }
    }

    fn poll_focus(&mut self, report: &mut FrameReport) {
        let Some(title) = self.io.focus.active_window_title() else {
            return;
        };
        if self.focus_state.as_deref() == Some(title.as_str()) {
            return;
        }

        if self.emit(Event::window_focus_change(&title)) {
            report.events_logged += 1;
        }
        self.focus_state = Some(title);
    }

    /// Append to the audit log. Failures are reported loudly and counted,
    /// and monitoring carries on.
    fn emit(&self, event: Event) -> bool {
        match self.log.append(event) {
            Ok(event) => {
                self.stats.record_event_logged();
                debug!(kind = event.kind.name(), value = event.kind.value(), "event logged");
                true
            }
            Err(e) => {
                self.stats.record_event_log_failure();
                error!(log = %self.log.path().display(), "AUDIT LOG WRITE FAILED: {e}");
                false
            }
        }
    }

    /// Release the frame source and close the recording. Both are attempted
    /// even if the other fails.
    pub fn shutdown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Err(e) = self.io.frames.release() {
            warn!("{e}");
            report.frame_source = Some(e);
        }

        if let Err(e) = self.recorder.close() {
            warn!("{e}");
            report.recorder = Some(e);
        }

        if let Err(e) = self.log.sync() {
            error!("AUDIT LOG SYNC FAILED: {e}");
        }

        report
    }
}
