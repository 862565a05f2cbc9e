use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use motion_cam_common::config::EncoderConfig;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("frame {width}x{height} scales to an empty image at ratio {scale}")]
    EmptyOutput { width: u32, height: u32, scale: f64 },
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Downscales annotated frames and compresses them to JPEG.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    scale: f64,
    quality: u8,
}

impl FrameEncoder {
    pub fn new(scale: f64, quality: u8) -> Self {
        Self {
            scale,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config.scale, config.quality)
    }

    /// Output dimensions for a `width`x`height` input: each axis multiplied by
    /// the scale ratio and floored.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            (width as f64 * self.scale).floor() as u32,
            (height as f64 * self.scale).floor() as u32,
        )
    }

    pub fn encode(&self, image: &RgbImage) -> Result<Bytes, EncodeError> {
        let (width, height) = image.dimensions();
        let (out_w, out_h) = self.output_size(width, height);
        if out_w == 0 || out_h == 0 {
            return Err(EncodeError::EmptyOutput {
                width,
                height,
                scale: self.scale,
            });
        }

        let mut jpeg = Vec::with_capacity(out_w as usize * out_h as usize / 4);
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
            if (out_w, out_h) == (width, height) {
                encoder.encode_image(image)?;
            } else {
                let scaled = imageops::resize(image, out_w, out_h, FilterType::Triangle);
                encoder.encode_image(&scaled)?;
            }
        }
        Ok(Bytes::from(jpeg))
    }
}
