//! In-memory recording sink, used for dry runs.

use super::{RecordingBackend, RecordingError, RecordingSink};
use crate::core::frame::{Frame, Resolution};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What a memory sink captured.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryClip {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub frame_rate: f64,
    /// Source indices of the recorded frames, in write order
    pub frames: Vec<u64>,
    pub closed: bool,
}

/// Records frame indices instead of pixels.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    clips: Arc<Mutex<Vec<MemoryClip>>>,
    fail_open: bool,
    fail_write_after: Option<u64>,
    fail_close: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `open` always fails.
    pub fn with_open_failure() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// A backend whose sinks fail every write after the first `n`.
    pub fn with_write_failure_after(n: u64) -> Self {
        Self {
            fail_write_after: Some(n),
            ..Self::default()
        }
    }

    /// Make every sink from this backend fail to close.
    pub fn with_close_failure(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Snapshot of every clip opened through this backend.
    pub fn clips(&self) -> Vec<MemoryClip> {
        self.clips
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl RecordingBackend for MemoryBackend {
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Box<dyn RecordingSink>, RecordingError> {
        if self.fail_open {
            return Err(RecordingError::Open {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "open refused"),
            });
        }

        let mut clips = self
            .clips
            .lock()
            .map_err(|e| RecordingError::Close(e.to_string()))?;
        clips.push(MemoryClip {
            path: path.to_path_buf(),
            resolution,
            frame_rate,
            frames: Vec::new(),
            closed: false,
        });

        Ok(Box::new(MemorySink {
            clips: Arc::clone(&self.clips),
            slot: clips.len() - 1,
            path: path.to_path_buf(),
            fail_write_after: self.fail_write_after,
            fail_close: self.fail_close,
            frames_written: 0,
        }))
    }
}

struct MemorySink {
    clips: Arc<Mutex<Vec<MemoryClip>>>,
    slot: usize,
    path: PathBuf,
    fail_write_after: Option<u64>,
    fail_close: bool,
    frames_written: u64,
}

impl RecordingSink for MemorySink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if self
            .fail_write_after
            .is_some_and(|limit| self.frames_written >= limit)
        {
            return Err(RecordingError::Write {
                index: frame.index,
                reason: "disk full".to_string(),
            });
        }

        let mut clips = self.clips.lock().map_err(|e| RecordingError::Write {
            index: frame.index,
            reason: e.to_string(),
        })?;
        let clip = &mut clips[self.slot];
        if clip.closed {
            return Err(RecordingError::Write {
                index: frame.index,
                reason: "clip already closed".to_string(),
            });
        }
        clip.frames.push(frame.index);
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecordingError> {
        if self.fail_close {
            return Err(RecordingError::Close("flush refused".to_string()));
        }
        let mut clips = self
            .clips
            .lock()
            .map_err(|e| RecordingError::Close(e.to_string()))?;
        clips[self.slot].closed = true;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}
