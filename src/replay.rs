//! Scripted monitoring sessions.
//!
//! A replay script stands in for the camera, the detection models and the
//! host input sources, so a whole session can run headless and
//! deterministically:
//!
//! ```json
//! {
//!   "resolution": [640, 480],
//!   "initial_focus": "Exam",
//!   "frames": [
//!     { "detections": [{ "label": "cell phone", "bbox": [10, 10, 40, 80] }] },
//!     { "focus": "Browser", "keys": ["Tab"] },
//!     { "detector_error": true, "keys": ["q"] }
//!   ]
//! }
//! ```
//!
//! Every field is optional. A frame without `focus` keeps the previous title.

use crate::collector::{FocusSource, KeyEvent, KeySymbol};
use crate::core::frame::{BoundingBox, Detection, Frame, Resolution};
use crate::core::sources::{DetectorError, FrameSource, HeadDetector, ObjectDetector, SourceError};
use chrono::Utc;
use crossbeam_channel::Sender;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors loading a replay script or its frames.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid replay script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no PNG or JPEG frames in {0}")]
    NoFrames(PathBuf),
}

fn default_resolution() -> Resolution {
    Resolution::new(640, 480)
}

/// A whole scripted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Size of synthesized frames
    #[serde(default = "default_resolution")]
    pub resolution: Resolution,
    /// Window focused when monitoring starts
    #[serde(default)]
    pub initial_focus: Option<String>,
    #[serde(default)]
    pub frames: Vec<FrameScript>,
}

/// What happens on one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameScript {
    /// Object detector output, used only if the frame is sampled
    pub detections: Vec<Detection>,
    /// Head detector output
    pub heads: Vec<BoundingBox>,
    /// Focused window from this frame on
    pub focus: Option<String>,
    /// Keys pressed while this frame is captured
    pub keys: Vec<KeySymbol>,
    /// Make the object detector fail on this frame
    pub detector_error: bool,
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// What a focus source reports: the startup poll, then one poll per frame.
    pub fn focus_sequence(&self) -> Vec<Option<String>> {
        let mut current = self.initial_focus.clone();
        let mut sequence = Vec::with_capacity(self.frames.len() + 1);
        sequence.push(current.clone());
        for frame in &self.frames {
            if frame.focus.is_some() {
                current = frame.focus.clone();
            }
            sequence.push(current.clone());
        }
        sequence
    }

    /// Split the script into the collaborators of one session.
    ///
    /// With `frames_dir`, frames are read from its images instead of being
    /// synthesized. Keys go to `key_sender` when one is given.
    pub fn into_parts(
        self,
        frames_dir: Option<&Path>,
        key_sender: Option<Sender<KeyEvent>>,
    ) -> Result<ReplayParts, ReplayError> {
        let focus = ScriptedFocusSource::new(self.focus_sequence());

        let mut frames = ScriptedFrameSource::blank(self.frames.len() as u64, self.resolution);
        if let Some(dir) = frames_dir {
            frames = frames.with_images(dir)?;
        }
        if let Some(sender) = key_sender {
            let keys = self.frames.iter().map(|f| f.keys.clone()).collect();
            frames = frames.with_keys(keys, sender);
        }

        let failures = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.detector_error)
            .map(|(i, _)| i as u64 + 1)
            .collect();

        let mut detections = Vec::with_capacity(self.frames.len());
        let mut heads = Vec::with_capacity(self.frames.len());
        for frame in self.frames {
            detections.push(frame.detections);
            heads.push(frame.heads);
        }

        Ok(ReplayParts {
            frames,
            objects: ScriptedObjectDetector::new(detections).with_failures(failures),
            heads: ScriptedHeadDetector::new(heads),
            focus,
        })
    }
}

/// Collaborators produced from a script.
pub struct ReplayParts {
    pub frames: ScriptedFrameSource,
    pub objects: ScriptedObjectDetector,
    pub heads: ScriptedHeadDetector,
    pub focus: ScriptedFocusSource,
}

/// Frame source backed by a script, optionally with images from disk.
pub struct ScriptedFrameSource {
    resolution: Resolution,
    total: u64,
    delivered: u64,
    images: Vec<PathBuf>,
    keys: Vec<Vec<KeySymbol>>,
    key_sender: Option<Sender<KeyEvent>>,
    pace: Option<Duration>,
}

impl ScriptedFrameSource {
    /// `count` black frames.
    pub fn blank(count: u64, resolution: Resolution) -> Self {
        Self {
            resolution,
            total: count,
            delivered: 0,
            images: Vec::new(),
            keys: Vec::new(),
            key_sender: None,
            pace: None,
        }
    }

    /// Read frames from the PNG and JPEG files in `dir`, in name order. The
    /// stream is as long as the script or the image list, whichever is longer.
    pub fn with_images(mut self, dir: &Path) -> Result<Self, ReplayError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ReplayError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        if images.is_empty() {
            return Err(ReplayError::NoFrames(dir.to_path_buf()));
        }
        images.sort();

        info!(dir = %dir.display(), count = images.len(), "loaded frame list");
        self.total = self.total.max(images.len() as u64);
        self.images = images;
        Ok(self)
    }

    /// Deliver `keys[i]` into `sender` when frame `i + 1` is acquired.
    pub fn with_keys(mut self, keys: Vec<Vec<KeySymbol>>, sender: Sender<KeyEvent>) -> Self {
        self.keys = keys;
        self.key_sender = Some(sender);
        self
    }

    /// Wait this long before handing out each frame.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    fn press_keys(&self, position: usize) {
        let (Some(sender), Some(keys)) = (&self.key_sender, self.keys.get(position)) else {
            return;
        };
        for key in keys {
            if sender.send(KeyEvent::new(*key)).is_err() {
                debug!(%key, "key listener gone; dropping scripted key");
            }
        }
    }
}

impl FrameSource for ScriptedFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.delivered >= self.total {
            return None;
        }
        if let Some(pace) = self.pace {
            std::thread::sleep(pace);
        }

        let position = self.delivered as usize;
        let index = self.delivered + 1;

        let frame = match self.images.get(position) {
            Some(path) => match image::open(path) {
                Ok(img) => Frame::new(index, Utc::now(), img.to_rgb8()),
                Err(e) => {
                    warn!(path = %path.display(), "cannot read frame: {e}");
                    self.total = self.delivered;
                    return None;
                }
            },
            None => Frame::blank(index, self.resolution),
        };

        self.delivered = index;
        self.press_keys(position);
        Some(frame)
    }

    fn release(&mut self) -> Result<(), SourceError> {
        self.key_sender = None;
        self.total = self.delivered;
        Ok(())
    }
}

/// Object detector that answers from a per-frame table.
#[derive(Debug, Clone, Default)]
pub struct ScriptedObjectDetector {
    per_frame: Vec<Vec<Detection>>,
    failures: BTreeSet<u64>,
}

impl ScriptedObjectDetector {
    /// `per_frame[i]` is the result for frame `i + 1`; frames past the end
    /// have no detections.
    pub fn new(per_frame: Vec<Vec<Detection>>) -> Self {
        Self {
            per_frame,
            failures: BTreeSet::new(),
        }
    }

    /// Fail on these frame indices.
    pub fn with_failures(mut self, frames: BTreeSet<u64>) -> Self {
        self.failures = frames;
        self
    }
}

impl ObjectDetector for ScriptedObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        if self.failures.contains(&frame.index) {
            return Err(DetectorError::new("object", "scripted failure"));
        }
        let position = frame.index.saturating_sub(1) as usize;
        Ok(self.per_frame.get(position).cloned().unwrap_or_default())
    }
}

/// Head detector that plays back one entry per call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHeadDetector {
    per_frame: VecDeque<Vec<BoundingBox>>,
}

impl ScriptedHeadDetector {
    pub fn new(per_frame: Vec<Vec<BoundingBox>>) -> Self {
        Self {
            per_frame: per_frame.into(),
        }
    }
}

impl HeadDetector for ScriptedHeadDetector {
    fn detect(&mut self, _frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        Ok(self.per_frame.pop_front().unwrap_or_default())
    }
}

/// Focus source that plays back a list of poll results.
///
/// Once the list runs out, the last known title is repeated.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFocusSource {
    polls: VecDeque<Option<String>>,
    last: Option<String>,
}

impl ScriptedFocusSource {
    pub fn new(polls: Vec<Option<String>>) -> Self {
        Self {
            polls: polls.into(),
            last: None,
        }
    }

    pub fn from_titles<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(titles.into_iter().map(|t| Some(t.into())).collect())
    }
}

impl FocusSource for ScriptedFocusSource {
    fn active_window_title(&mut self) -> Option<String> {
        match self.polls.pop_front() {
            Some(poll) => {
                if poll.is_some() {
                    self.last = poll.clone();
                }
                poll
            }
            None => self.last.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use image::RgbImage;

    const SCRIPT: &str = r#"{
        "resolution": [64, 48],
        "initial_focus": "Exam",
        "frames": [
            { "detections": [{ "label": "cell phone", "bbox": [1, 2, 3, 4] }] },
            { "focus": "Browser", "keys": ["a", "Tab"] },
            { "detector_error": true },
            { "keys": ["q"] }
        ]
    }"#;

    #[test]
    fn test_parse_script() {
        let script = ReplayScript::from_json(SCRIPT).unwrap();
        assert_eq!(script.resolution, Resolution::new(64, 48));
        assert_eq!(script.frames.len(), 4);
        assert_eq!(
            script.frames[0].detections[0],
            Detection::new("cell phone", BoundingBox::new(1, 2, 3, 4))
        );
        assert_eq!(script.frames[1].keys, vec![KeySymbol::Char('a'), KeySymbol::TAB]);
        assert!(script.frames[2].detector_error);
    }

    #[test]
    fn test_defaults_and_bad_json() {
        let script = ReplayScript::from_json("{}").unwrap();
        assert_eq!(script.resolution, Resolution::new(640, 480));
        assert!(script.frames.is_empty());
        assert!(ReplayScript::from_json("{\"frames\": 3}").is_err());
    }

    #[test]
    fn test_focus_carries_forward() {
        let script = ReplayScript::from_json(SCRIPT).unwrap();
        let exam = Some("Exam".to_string());
        let browser = Some("Browser".to_string());
        assert_eq!(
            script.focus_sequence(),
            vec![exam.clone(), exam, browser.clone(), browser.clone(), browser]
        );
    }

    #[test]
    fn test_parts_deliver_keys_with_frames() {
        let (tx, rx) = unbounded();
        let script = ReplayScript::from_json(SCRIPT).unwrap();
        let mut parts = script.into_parts(None, Some(tx)).unwrap();

        let first = parts.frames.next_frame().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.resolution(), Resolution::new(64, 48));
        assert!(rx.try_recv().is_err());

        parts.frames.next_frame().unwrap();
        let keys: Vec<_> = rx.try_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![KeySymbol::Char('a'), KeySymbol::TAB]);

        let third = parts.frames.next_frame().unwrap();
        assert!(parts.objects.detect(&third).is_err());
        assert_eq!(parts.objects.detect(&first).unwrap().len(), 1);

        parts.frames.next_frame().unwrap();
        assert!(parts.frames.next_frame().is_none());
    }

    #[test]
    fn test_release_ends_stream() {
        let mut source = ScriptedFrameSource::blank(5, Resolution::new(4, 4));
        source.next_frame().unwrap();
        source.release().unwrap();
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_frames_from_directory() {
        let dir = std::env::temp_dir()
            .join("gradeguard-test")
            .join(format!("frames_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.png", "a.png"] {
            RgbImage::new(8, 6).save(dir.join(name)).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ScriptedFrameSource::blank(1, Resolution::new(4, 4))
            .with_images(&dir)
            .unwrap();
        assert_eq!(source.next_frame().unwrap().resolution(), Resolution::new(8, 6));
        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn test_empty_frames_directory() {
        let dir = std::env::temp_dir()
            .join("gradeguard-test")
            .join(format!("frames_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let result = ScriptedFrameSource::blank(1, Resolution::new(4, 4)).with_images(&dir);
        assert!(matches!(result, Err(ReplayError::NoFrames(_))));
    }

    #[test]
    fn test_focus_source_playback() {
        let mut focus = ScriptedFocusSource::new(vec![Some("A".into()), None]);
        assert_eq!(focus.active_window_title().as_deref(), Some("A"));
        assert_eq!(focus.active_window_title(), None);
        assert_eq!(focus.active_window_title().as_deref(), Some("A"));
        assert_eq!(ScriptedFocusSource::default().active_window_title(), None);
    }
}
