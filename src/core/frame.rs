//! Frames and detection results flowing through the fusion loop.

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame or recording target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(r: Resolution) -> Self {
        (r.width, r.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned box in frame coordinates, `(x, y)` being the top-left corner.
///
/// Detectors may report boxes that extend past the frame edges; consumers
/// clamp when they touch pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, u32, u32)", into = "(i32, i32, u32, u32)")]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<(i32, i32, u32, u32)> for BoundingBox {
    fn from((x, y, width, height): (i32, i32, u32, u32)) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<BoundingBox> for (i32, i32, u32, u32) {
    fn from(b: BoundingBox) -> Self {
        (b.x, b.y, b.width, b.height)
    }
}

/// A labelled object reported by the object detector for one sampled frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
        }
    }
}

/// A single captured video frame.
///
/// Frames live for one loop iteration. Overlays are drawn in place, so the
/// copy handed to the recording sink and the display carries the markers.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based position in the stream
    pub index: u64,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// RGB pixel buffer
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, timestamp: DateTime<Utc>, image: RgbImage) -> Self {
        Self {
            index,
            timestamp,
            image,
        }
    }

    /// A black frame of the given size, stamped now.
    pub fn blank(index: u64, resolution: Resolution) -> Self {
        Self::new(
            index,
            Utc::now(),
            RgbImage::new(resolution.width, resolution.height),
        )
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    /// Luma copy used by the head detector.
    pub fn grayscale(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_serializes_as_array() {
        let bbox = BoundingBox::new(10, -4, 30, 40);
        let json = serde_json::to_string(&bbox).unwrap();
        assert_eq!(json, "[10,-4,30,40]");

        let parsed: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, bbox);
    }

    #[test]
    fn test_blank_frame_dimensions() {
        let frame = Frame::blank(7, Resolution::new(64, 48));
        assert_eq!(frame.index, 7);
        assert_eq!(frame.resolution(), Resolution::new(64, 48));

        let gray = frame.grayscale();
        assert_eq!(gray.dimensions(), (64, 48));
    }
}
