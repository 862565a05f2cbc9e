use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

/// Binarize `delta`: pixels strictly above `threshold` become 255, the rest 0.
pub fn binarize(delta: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = delta.clone();
    for pixel in mask.pixels_mut() {
        *pixel = if pixel.0[0] > threshold { Luma([255]) } else { Luma([0]) };
    }
    mask
}

/// Grow foreground blobs with a square `(2r+1)x(2r+1)` kernel so fragments of
/// the same moving object merge into one region.
pub fn dilate_square(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    dilate(mask, Norm::LInf, radius)
}

/// Threshold then dilate: the binary mask the contour tracer runs on.
pub fn motion_mask(delta: &GrayImage, threshold: u8, dilate_radius: u8) -> GrayImage {
    dilate_square(&binarize(delta, threshold), dilate_radius)
}
