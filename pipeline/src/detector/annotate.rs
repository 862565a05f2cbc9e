use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use motion_cam_common::config::OverlayConfig;
use tracing::{info, warn};

use super::contours::MotionRegion;

/// Draws the status line in the top-left corner of each frame.
///
/// Text rendering needs a TrueType font. Without one the overlay only draws
/// region outlines.
pub struct StatusOverlay {
    font: Option<FontVec>,
    x: i32,
    baseline: i32,
    scale: PxScale,
}

impl StatusOverlay {
    pub fn load(config: &OverlayConfig) -> Self {
        let font = config
            .font_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .and_then(|path| match std::fs::read(path) {
                Ok(bytes) => match FontVec::try_from_vec(bytes) {
                    Ok(font) => {
                        info!(path, "loaded overlay font");
                        Some(font)
                    }
                    Err(e) => {
                        warn!(path, error = %e, "invalid overlay font, status text disabled");
                        None
                    }
                },
                Err(e) => {
                    warn!(path, error = %e, "failed to read overlay font, status text disabled");
                    None
                }
            });

        Self {
            font,
            x: config.text_x,
            baseline: config.text_y,
            scale: PxScale::from(config.text_scale),
        }
    }

    pub fn without_text() -> Self {
        let config = OverlayConfig::default();
        Self {
            font: None,
            x: config.text_x,
            baseline: config.text_y,
            scale: PxScale::from(config.text_scale),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw_status(&self, image: &mut RgbImage, text: &str, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        // draw_text_mut anchors at the top of the glyph box.
        let top = (self.baseline - self.scale.y.round() as i32).max(0);
        draw_text_mut(image, color, self.x, top, self.scale, font, text);
    }
}

/// Outline the region's contour and its bounding rectangle.
pub fn draw_region(image: &mut RgbImage, region: &MotionRegion, color: Rgb<u8>) {
    let points = &region.contour;
    for (i, start) in points.iter().enumerate() {
        let end = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            image,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            color,
        );
    }
    draw_hollow_rect_mut(image, region.bounds, color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::point::Point;
    use imageproc::rect::Rect;

    #[test]
    fn region_outline_is_drawn() {
        let mut image = RgbImage::new(50, 50);
        let region = MotionRegion {
            contour: vec![
                Point::new(10, 10),
                Point::new(30, 10),
                Point::new(30, 30),
                Point::new(10, 30),
            ],
            area: 400.0,
            bounds: Rect::at(10, 10).of_size(21, 21),
        };
        let yellow = Rgb([255, 255, 0]);
        draw_region(&mut image, &region, yellow);
        assert_eq!(*image.get_pixel(20, 10), yellow);
        assert_eq!(*image.get_pixel(10, 20), yellow);
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn missing_font_disables_text_only() {
        let overlay = StatusOverlay::load(&OverlayConfig {
            font_path: Some("/nonexistent/motion-cam/font.ttf".into()),
            ..OverlayConfig::default()
        });
        assert!(!overlay.has_font());
        let mut image = RgbImage::new(40, 40);
        overlay.draw_status(&mut image, "Ready", Rgb([0, 255, 0]));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }
}
