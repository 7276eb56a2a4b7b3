use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};
use tracing::debug;

use crate::DecodeError;

/// Images with a side longer than this are resized before inference.
pub const MAX_DIMENSION: u32 = 1024;
/// Fixed resize target. Aspect ratio is not preserved.
pub const TARGET_WIDTH: u32 = 1024;
pub const TARGET_HEIGHT: u32 = 768;

/// An image bounded to the inference size ceiling.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    image: DynamicImage,
    original: (u32, u32),
}

impl NormalizedImage {
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original
    }

    pub fn was_resized(&self) -> bool {
        self.original != self.dimensions()
    }

    /// 8-bit RGB pixels, the format handed to detectors.
    pub fn to_rgb8(&self) -> RgbImage {
        self.image.to_rgb8()
    }
}

pub fn decode_and_normalize(bytes: &[u8]) -> Result<NormalizedImage, DecodeError> {
    let image = image::load_from_memory(bytes)?;
    Ok(normalize(image))
}

pub fn normalize(image: DynamicImage) -> NormalizedImage {
    let original = image.dimensions();
    let (width, height) = original;
    if width.max(height) <= MAX_DIMENSION {
        return NormalizedImage { image, original };
    }

    debug!(width, height, "resizing upload to {}x{}", TARGET_WIDTH, TARGET_HEIGHT);
    NormalizedImage {
        image: image.resize_exact(TARGET_WIDTH, TARGET_HEIGHT, FilterType::CatmullRom),
        original,
    }
}
