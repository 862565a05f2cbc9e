//! Motion analysis: background subtraction, mask cleanup, contour filtering
//! and frame annotation.

pub mod annotate;
pub mod background;
pub mod contours;
pub mod mask;

use image::{imageops, Rgb};
use motion_cam_common::config::DetectorConfig;
use tracing::debug;

use crate::frame::Frame;
use annotate::{draw_region, StatusOverlay};
use background::BackgroundModel;
pub use contours::MotionRegion;

/// Per-frame verdict, derived from whether any region survived the area filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Ready,
    MotionDetected,
}

impl PipelineStatus {
    pub fn from_regions(regions: &[MotionRegion]) -> Self {
        if regions.is_empty() {
            PipelineStatus::Ready
        } else {
            PipelineStatus::MotionDetected
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelineStatus::Ready => "Ready",
            PipelineStatus::MotionDetected => "Motion detected",
        }
    }

    /// Highlight colour for outlines and the status text.
    pub fn color(self) -> Rgb<u8> {
        match self {
            PipelineStatus::Ready => Rgb([0, 255, 0]),
            PipelineStatus::MotionDetected => Rgb([255, 255, 0]),
        }
    }
}

/// Result of [`MotionDetector::analyze`]: the annotated frame plus what was found.
pub struct Analysis {
    pub frame: Frame,
    pub status: PipelineStatus,
    pub regions: Vec<MotionRegion>,
}

/// Stateful analyzer owning the pipeline's single background model.
pub struct MotionDetector {
    background: BackgroundModel,
    overlay: StatusOverlay,
    threshold: u8,
    dilate_radius: u8,
    minimum_area: f64,
}

impl MotionDetector {
    pub fn new(config: &DetectorConfig, overlay: StatusOverlay) -> Self {
        Self {
            background: BackgroundModel::new(config),
            overlay,
            threshold: config.threshold,
            dilate_radius: config.dilate_radius,
            minimum_area: config.minimum_area,
        }
    }

    /// Fold `frame` into the background model, find the moving regions and
    /// draw them onto the frame along with the status text.
    ///
    /// The caller is expected to have filtered out empty frames.
    pub fn analyze(&mut self, mut frame: Frame) -> Analysis {
        let gray = imageops::grayscale(&frame.image);
        let delta = self.background.apply(&gray);
        let mask = mask::motion_mask(&delta, self.threshold, self.dilate_radius);
        let regions = contours::extract_regions(&mask, self.minimum_area);

        let status = PipelineStatus::from_regions(&regions);
        let color = status.color();
        for region in &regions {
            draw_region(&mut frame.image, region, color);
        }
        self.overlay.draw_status(&mut frame.image, status.label(), color);

        debug!(
            seq = frame.seq,
            regions = regions.len(),
            status = status.label(),
            "frame analyzed"
        );

        Analysis {
            frame,
            status,
            regions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    const WIDTH: u32 = 320;
    const HEIGHT: u32 = 240;
    const BACKGROUND: Rgb<u8> = Rgb([50, 50, 50]);

    fn detector() -> MotionDetector {
        MotionDetector::new(&DetectorConfig::default(), StatusOverlay::without_text())
    }

    fn still(seq: u64) -> Frame {
        Frame::new(RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND), seq, 0)
    }

    fn with_square(seq: u64, x0: u32, y0: u32, side: u32) -> Frame {
        let mut frame = still(seq);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                frame.image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        frame
    }

    #[test]
    fn status_follows_region_presence() {
        assert_eq!(PipelineStatus::from_regions(&[]), PipelineStatus::Ready);
        assert_eq!(PipelineStatus::Ready.label(), "Ready");
        assert_eq!(PipelineStatus::Ready.color(), Rgb([0, 255, 0]));
        assert_eq!(PipelineStatus::MotionDetected.label(), "Motion detected");
        assert_eq!(PipelineStatus::MotionDetected.color(), Rgb([255, 255, 0]));
    }

    #[test]
    fn injected_square_is_detected_after_still_frames() {
        let mut detector = detector();
        for seq in 0..10 {
            let analysis = detector.analyze(still(seq));
            assert_eq!(analysis.status, PipelineStatus::Ready, "frame {seq}");
            assert!(analysis.regions.is_empty());
        }

        let analysis = detector.analyze(with_square(10, 100, 60, 80));
        assert_eq!(analysis.status, PipelineStatus::MotionDetected);
        assert_eq!(analysis.regions.len(), 1);

        // The 3x3 dilation grows the square by one pixel on each side.
        let bounds = analysis.regions[0].bounds;
        assert!((bounds.left() - 100).abs() <= 1, "left {}", bounds.left());
        assert!((bounds.top() - 60).abs() <= 1, "top {}", bounds.top());
        assert!(bounds.width().abs_diff(80) <= 2, "width {}", bounds.width());
        assert!(bounds.height().abs_diff(80) <= 2, "height {}", bounds.height());
        assert!(analysis.regions[0].area >= 3000.0);
    }

    #[test]
    fn small_change_stays_ready() {
        let mut detector = detector();
        for seq in 0..5 {
            detector.analyze(still(seq));
        }
        // 20x20 grows to 22x22, tracing a 21x21 polygon: well under 3000.
        let analysis = detector.analyze(with_square(5, 40, 40, 20));
        assert_eq!(analysis.status, PipelineStatus::Ready);
        assert!(analysis.regions.is_empty());
    }

    #[test]
    fn motion_frame_is_annotated_in_highlight_color() {
        let mut detector = detector();
        for seq in 0..3 {
            detector.analyze(still(seq));
        }
        let analysis = detector.analyze(with_square(3, 100, 60, 80));
        let yellow = PipelineStatus::MotionDetected.color();
        let b = analysis.regions[0].bounds;
        let edge = *analysis
            .frame
            .image
            .get_pixel(b.left() as u32 + 10, b.top() as u32);
        assert_eq!(edge, yellow);
    }

    #[test]
    fn still_frame_is_left_untouched_without_font() {
        let mut detector = detector();
        let analysis = detector.analyze(still(0));
        assert!(analysis.frame.image.pixels().all(|p| *p == BACKGROUND));
    }
}
