//! Clips stored as numbered PNG frames plus a JSON manifest.

use super::{RecordingBackend, RecordingError, RecordingSink};
use crate::core::frame::{Frame, Resolution};
use image::imageops::{self, FilterType};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the manifest written when a clip is closed.
pub const MANIFEST_FILE: &str = "clip.json";

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes each recorded frame as `frame_000001.png` inside a clip directory.
#[derive(Debug, Clone, Default)]
pub struct ImageSequenceBackend;

impl ImageSequenceBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RecordingBackend for ImageSequenceBackend {
    fn open(
        &self,
        path: &Path,
        resolution: Resolution,
        frame_rate: f64,
    ) -> Result<Box<dyn RecordingSink>, RecordingError> {
        let dir = create_clip_dir(path).map_err(|source| RecordingError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Box::new(ImageSequenceSink {
            dir,
            resolution,
            frame_rate,
            frames_written: 0,
            first_frame: None,
            last_frame: None,
            closed: false,
        }))
    }
}

/// Create a fresh clip directory at `path`, or at `path_2`, `path_3`, ...
/// when an earlier clip already owns the name.
fn create_clip_dir(path: &Path) -> io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "clip path has no name"))?;

    let mut candidate = path.to_path_buf();
    for attempt in 2..=MAX_NAME_ATTEMPTS {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = path.with_file_name(format!("{name}_{attempt}"));
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free clip directory name after {MAX_NAME_ATTEMPTS} attempts"),
    ))
}

#[derive(Debug, Serialize)]
struct ClipManifest {
    width: u32,
    height: u32,
    frame_rate: f64,
    frame_count: u64,
    first_source_frame: Option<u64>,
    last_source_frame: Option<u64>,
}

struct ImageSequenceSink {
    dir: PathBuf,
    resolution: Resolution,
    frame_rate: f64,
    frames_written: u64,
    first_frame: Option<u64>,
    last_frame: Option<u64>,
    closed: bool,
}

impl RecordingSink for ImageSequenceSink {
    fn write(&mut self, frame: &Frame) -> Result<(), RecordingError> {
        if self.closed {
            return Err(RecordingError::Write {
                index: frame.index,
                reason: "clip already closed".to_string(),
            });
        }

        let path = self
            .dir
            .join(format!("frame_{:06}.png", self.frames_written + 1));

        let result = if frame.resolution() == self.resolution {
            frame.image.save(&path)
        } else {
            imageops::resize(
                &frame.image,
                self.resolution.width,
                self.resolution.height,
                FilterType::Triangle,
            )
            .save(&path)
        };
        result.map_err(|e| RecordingError::Write {
            index: frame.index,
            reason: e.to_string(),
        })?;

        self.frames_written += 1;
        self.first_frame.get_or_insert(frame.index);
        self.last_frame = Some(frame.index);
        Ok(())
    }

    fn close(&mut self) -> Result<(), RecordingError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let manifest = ClipManifest {
            width: self.resolution.width,
            height: self.resolution.height,
            frame_rate: self.frame_rate,
            frame_count: self.frames_written,
            first_source_frame: self.first_frame,
            last_source_frame: self.last_frame,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| RecordingError::Close(e.to_string()))?;
        std::fs::write(self.dir.join(MANIFEST_FILE), json)
            .map_err(|e| RecordingError::Close(e.to_string()))
    }

    fn location(&self) -> &Path {
        &self.dir
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl Drop for ImageSequenceSink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_clip_dir() -> PathBuf {
        std::env::temp_dir()
            .join("gradeguard-test")
            .join(format!("clip_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_frames_resized_to_target() {
        let dir = temp_clip_dir();
        let backend = ImageSequenceBackend::new();
        let mut sink = backend.open(&dir, Resolution::new(32, 24), 20.0).unwrap();

        sink.write(&Frame::blank(4, Resolution::new(64, 48))).unwrap();
        sink.write(&Frame::blank(5, Resolution::new(32, 24))).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.frames_written(), 2);
        let first = image::open(dir.join("frame_000001.png")).unwrap();
        assert_eq!((first.width(), first.height()), (32, 24));

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest["frame_count"], 2);
        assert_eq!(manifest["first_source_frame"], 4);
        assert_eq!(manifest["last_source_frame"], 5);
    }

    #[test]
    fn test_write_after_close_fails() {
        let dir = temp_clip_dir();
        let mut sink = ImageSequenceBackend::new()
            .open(&dir, Resolution::new(8, 8), 20.0)
            .unwrap();
        sink.close().unwrap();

        assert!(sink.write(&Frame::blank(1, Resolution::new(8, 8))).is_err());
    }

    #[test]
    fn test_same_name_opens_a_new_directory() {
        let dir = temp_clip_dir();
        let backend = ImageSequenceBackend::new();

        let mut first = backend.open(&dir, Resolution::new(8, 8), 20.0).unwrap();
        first.write(&Frame::blank(1, Resolution::new(8, 8))).unwrap();
        first.close().unwrap();
        let first_frame = std::fs::read(dir.join("frame_000001.png")).unwrap();

        let mut second = backend.open(&dir, Resolution::new(16, 16), 20.0).unwrap();
        second.write(&Frame::blank(7, Resolution::new(16, 16))).unwrap();
        second.close().unwrap();

        assert_eq!(first.location(), dir.as_path());
        assert_ne!(second.location(), first.location());
        assert!(second
            .location()
            .to_string_lossy()
            .ends_with(&format!("{}_2", dir.file_name().unwrap().to_string_lossy())));
        assert_eq!(std::fs::read(dir.join("frame_000001.png")).unwrap(), first_frame);
        let reopened = image::open(second.location().join("frame_000001.png")).unwrap();
        assert_eq!((reopened.width(), reopened.height()), (16, 16));
    }
}
