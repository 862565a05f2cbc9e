use image::RgbImage;

/// A raw RGB raster pulled from a [`FrameSource`](crate::source::FrameSource).
///
/// The detector draws its annotations directly into `image`.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub seq: u64,
    pub captured_at_ms: i64,
}

impl Frame {
    pub fn new(image: RgbImage, seq: u64, captured_at_ms: i64) -> Self {
        Self {
            image,
            seq,
            captured_at_ms,
        }
    }

    /// Stamp `image` with the current wall-clock time.
    pub fn captured_now(image: RgbImage, seq: u64) -> Self {
        Self::new(image, seq, chrono::Utc::now().timestamp_millis())
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// A frame with no pixels. Sources occasionally hand these out while a
    /// device warms up; the capture loop skips them.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}
