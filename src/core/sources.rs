//! Interfaces of the collaborators the fusion loop drives.
//!
//! Camera capture, model inference and on-screen display live outside the
//! engine; it only needs these narrow contracts.

use crate::core::frame::{BoundingBox, Detection, Frame};
use image::GrayImage;
use thiserror::Error;

/// A detector could not produce a result for a frame.
#[derive(Debug, Error)]
#[error("{detector} detector failed: {reason}")]
pub struct DetectorError {
    pub detector: &'static str,
    pub reason: String,
}

impl DetectorError {
    pub fn new(detector: &'static str, reason: impl Into<String>) -> Self {
        Self {
            detector,
            reason: reason.into(),
        }
    }
}

/// Releasing a frame source failed.
#[derive(Debug, Error)]
#[error("failed to release frame source: {0}")]
pub struct SourceError(pub String);

/// Supplies frames in capture order.
pub trait FrameSource {
    /// The next frame, or `None` once the source is exhausted or can no
    /// longer deliver.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Release the underlying device or files.
    fn release(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Finds labelled objects in a frame.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

/// Finds heads in a grayscale frame.
pub trait HeadDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Shows the annotated frame to the operator.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame);
}

/// Display for headless runs.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _frame: &Frame) {}
}
