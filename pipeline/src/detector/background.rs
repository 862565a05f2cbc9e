use image::{GrayImage, Luma};
use motion_cam_common::config::DetectorConfig;
use tracing::{debug, warn};

/// Value written into the foreground delta for pixels that deviate from the model.
pub const FOREGROUND: u8 = 255;

/// Per-pixel running Gaussian estimate of the static scene.
///
/// Each pixel keeps a mean and a variance of its grayscale intensity. A pixel
/// is foreground when its squared distance from the mean exceeds
/// `var_threshold * variance`. The learning rate is `1 / min(frames, history)`,
/// so the model settles quickly at start-up and then adapts slowly.
pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
    history: u32,
    var_threshold: f32,
    var_init: f32,
    var_min: f32,
    var_max: f32,
}

impl BackgroundModel {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
            history: config.history.max(1),
            var_threshold: config.var_threshold,
            var_init: config.var_init,
            var_min: config.var_min,
            var_max: config.var_max.max(config.var_min),
        }
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Classify every pixel of `gray` against the model, then fold `gray` into it.
    ///
    /// Returns the foreground delta: [`FOREGROUND`] where the pixel deviates, 0
    /// elsewhere. The first frame seeds the model and reports no foreground.
    pub fn apply(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();

        if self.frames_seen == 0 || (width, height) != (self.width, self.height) {
            if self.frames_seen > 0 {
                warn!(
                    old_width = self.width,
                    old_height = self.height,
                    width,
                    height,
                    "frame size changed, re-seeding background statistics"
                );
            }
            self.seed(gray);
            return GrayImage::new(width, height);
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;

        let mut delta = GrayImage::new(width, height);
        for ((out, pixel), (mean, variance)) in delta
            .pixels_mut()
            .zip(gray.pixels())
            .zip(self.mean.iter_mut().zip(self.variance.iter_mut()))
        {
            let diff = pixel.0[0] as f32 - *mean;
            let dist2 = diff * diff;
            if dist2 > self.var_threshold * *variance {
                *out = Luma([FOREGROUND]);
            }
            *mean += alpha * diff;
            *variance = (*variance + alpha * (dist2 - *variance)).clamp(self.var_min, self.var_max);
        }

        delta
    }

    fn seed(&mut self, gray: &GrayImage) {
        let (width, height) = gray.dimensions();
        self.width = width;
        self.height = height;
        self.mean = gray.pixels().map(|p| p.0[0] as f32).collect();
        self.variance = vec![self.var_init; self.mean.len()];
        self.frames_seen = 1;
        debug!(width, height, "background model seeded");
    }
}
