//! The signal-fusion and incident-recording engine.
//!
//! This module contains:
//! - The per-frame fusion loop and the collaborator interfaces it drives
//! - The append-only audit event log
//! - The incident recorder latch
//! - The concurrent keyboard listener
//! - Alert dispatch and frame overlays

pub mod alert;
pub mod event;
pub mod event_log;
pub mod frame;
pub mod fusion;
pub mod keyboard;
pub mod overlay;
pub mod recorder;
pub mod session;
pub mod sources;

// Re-export commonly used types
pub use alert::{AlertDispatcher, Beeper, OverlayAlert, SilentBeeper, TerminalBell};
pub use event::{Event, EventKind, EventRow, LOG_COLUMNS};
pub use event_log::{open_shared_log, EventLog, EventLogError, SharedEventLog};
pub use frame::{BoundingBox, Detection, Frame, Resolution};
pub use fusion::{Collaborators, FusionLoop, FusionSettings, StepOutcome, TerminationReason};
pub use keyboard::{KeyboardConsumer, KeyboardReport};
pub use recorder::{IncidentRecorder, RecorderState, RecordingSettings};
pub use session::{MonitorSession, SessionReport};
pub use sources::{DetectorError, DisplaySink, FrameSource, HeadDetector, ObjectDetector};
