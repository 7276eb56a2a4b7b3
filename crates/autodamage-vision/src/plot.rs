use std::io::Cursor;

use autodamage_core::{DetectionSet, VehicleClass};
use image::{DynamicImage, ImageFormat, ImageResult, Rgb, RgbImage};

const LINE_WIDTH: u32 = 3;
const TAG_HEIGHT: u32 = 8;

fn class_color(class: VehicleClass) -> Rgb<u8> {
    match class {
        VehicleClass::Car => Rgb([231, 76, 60]),
        VehicleClass::Motorcycle => Rgb([241, 196, 15]),
        VehicleClass::Bus => Rgb([46, 134, 193]),
        VehicleClass::Truck => Rgb([40, 180, 99]),
    }
}

/// Draw each detection's box over a copy of `image`. A solid tag along the
/// top edge of the box grows with confidence.
///
/// Has no bearing on the assessment; it only renders what was detected.
pub fn plot_detections(image: &DynamicImage, detections: &DetectionSet) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();
    for detection in detections {
        let color = class_color(detection.class);
        let (x, y, w, h) = detection.bounding_box.to_pixels(width, height);
        stroke_rect(&mut canvas, x, y, w, h, color);
        let tag_w = ((w as f32) * detection.confidence).round() as u32;
        fill_rect(&mut canvas, x, y, tag_w, TAG_HEIGHT.min(h), color);
    }
    canvas
}

pub fn encode_png(image: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn stroke_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let t = LINE_WIDTH.min(w).min(h).max(1);
    fill_rect(canvas, x, y, w, t, color);
    fill_rect(canvas, x, (y + h).saturating_sub(t), w, t, color);
    fill_rect(canvas, x, y, t, h, color);
    fill_rect(canvas, (x + w).saturating_sub(t), y, t, h, color);
}

fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let (cw, ch) = canvas.dimensions();
    for py in y..(y + h).min(ch) {
        for px in x..(x + w).min(cw) {
            canvas.put_pixel(px, py, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodamage_core::{BoundingBox, Detection};

    #[test]
    fn draws_box_edges_only() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let set: DetectionSet = vec![Detection::new(
            VehicleClass::Bus,
            0.5,
            BoundingBox::new(0.1, 0.1, 0.9, 0.9).unwrap(),
        )
        .unwrap()]
        .into_iter()
        .collect();
        let out = plot_detections(&img, &set);
        let blue = class_color(VehicleClass::Bus);
        assert_eq!(*out.get_pixel(10, 50), blue);
        assert_eq!(*out.get_pixel(89, 50), blue);
        assert_eq!(*out.get_pixel(50, 50), Rgb([0, 0, 0]));
        // tag covers half the width at 0.5 confidence
        assert_eq!(*out.get_pixel(45, 14), blue);
        assert_eq!(*out.get_pixel(55, 14), Rgb([0, 0, 0]));
    }

    #[test]
    fn empty_set_leaves_image_untouched() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([9, 9, 9])));
        let out = plot_detections(&img, &DetectionSet::new());
        assert_eq!(out, img.to_rgb8());
        assert!(encode_png(&out).unwrap().starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
