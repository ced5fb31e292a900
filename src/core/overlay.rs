//! Rectangle markers drawn onto frames.

use crate::core::frame::BoundingBox;
use image::{Rgb, RgbImage};

pub const ALERT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const HEAD_COLOR: Rgb<u8> = Rgb([0, 200, 0]);

/// Outline `bbox` with a border `thickness` pixels wide, clipped to the image.
pub fn draw_box(image: &mut RgbImage, bbox: BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    if img_w == 0 || img_h == 0 || bbox.width == 0 || bbox.height == 0 {
        return;
    }

    let x0 = bbox.x as i64;
    let y0 = bbox.y as i64;
    let x1 = x0 + bbox.width as i64 - 1;
    let y1 = y0 + bbox.height as i64 - 1;
    let t = thickness.max(1) as i64;

    let cx0 = x0.max(0);
    let cy0 = y0.max(0);
    let cx1 = x1.min(img_w - 1);
    let cy1 = y1.min(img_h - 1);
    if cx0 > cx1 || cy0 > cy1 {
        return;
    }

    for y in cy0..=cy1 {
        for x in cx0..=cx1 {
            let on_border = x - x0 < t || x1 - x < t || y - y0 < t || y1 - y < t;
            if on_border {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Marker for a prohibited object.
pub fn mark_alert(image: &mut RgbImage, bbox: BoundingBox) {
    draw_box(image, bbox, ALERT_COLOR, 2);
}

/// Marker for a detected person.
pub fn mark_person(image: &mut RgbImage, bbox: BoundingBox) {
    draw_box(image, bbox, PERSON_COLOR, 2);
}

/// Marker for a detected head.
pub fn mark_head(image: &mut RgbImage, bbox: BoundingBox) {
    draw_box(image, bbox, HEAD_COLOR, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_only() {
        let mut image = RgbImage::new(10, 10);
        draw_box(&mut image, BoundingBox::new(2, 2, 5, 5), ALERT_COLOR, 1);

        assert_eq!(*image.get_pixel(2, 2), ALERT_COLOR);
        assert_eq!(*image.get_pixel(6, 6), ALERT_COLOR);
        assert_eq!(*image.get_pixel(4, 4), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(7, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_clipped_to_frame() {
        let mut image = RgbImage::new(10, 10);
        draw_box(&mut image, BoundingBox::new(-5, -5, 30, 30), PERSON_COLOR, 1);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));

        draw_box(&mut image, BoundingBox::new(20, 20, 5, 5), PERSON_COLOR, 1);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
