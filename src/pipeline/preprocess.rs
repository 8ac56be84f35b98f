//! Frame normalization ahead of landmark extraction.

use image::RgbImage;
use image::imageops::{self, FilterType};

/// Normalize a decoded frame before it enters the pipeline.
///
/// Scales to `target_height` keeping the aspect ratio, then mirrors
/// horizontally when `mirror` is set so the signer sees themselves as in a
/// mirror and handedness matches the training data.
pub fn prepare(image: RgbImage, target_height: u32, mirror: bool) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut image = if height == 0 || width == 0 || height == target_height {
        image
    } else {
        let scale = target_height as f64 / height as f64;
        let target_width = ((width as f64 * scale).round() as u32).max(1);
        imageops::resize(&image, target_width, target_height, FilterType::Triangle)
    };
    if mirror {
        imageops::flip_horizontal_in_place(&mut image);
    }
    image
}
