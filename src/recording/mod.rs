//! Recording sinks for incident clips.
//!
//! The incident recorder decides *when* frames are recorded; a backend only
//! knows how to open a clip and append frames to it.

pub mod image_sequence;
pub mod memory;

use crate::core::frame::{Frame, Resolution};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use image_sequence::ImageSequenceBackend;
pub use memory::{MemoryBackend, MemoryClip};

/// Errors raised by recording sinks.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to open recording at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write frame {index}: {reason}")]
    Write { index: u64, reason: String },
    #[error("failed to close recording: {0}")]
    Close(String),
}

/// Opens recording sinks.
pub trait RecordingBackend: Send {
    /// Open a clip rooted at `path` (the backend picks the final file or
    /// directory name from it) with a fixed target resolution and frame rate.
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Box<dyn RecordingSink>, RecordingError>;
}

/// An open clip.
pub trait RecordingSink: Send {
    /// Append a frame. Frames that do not match the target resolution are
    /// converted by the sink.
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError>;

    /// Finish the clip. Further writes are rejected.
    fn close(&mut self) -> Result<(), RecordingError>;

    /// Where the clip lives.
    fn location(&self) -> &Path;

    fn frames_written(&self) -> u64;
}
