use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use imageproc::rect::Rect;

/// A connected area of motion that survived the minimum-area filter.
#[derive(Debug, Clone)]
pub struct MotionRegion {
    /// Outer boundary, with straight runs reduced to their end points.
    pub contour: Vec<Point<i32>>,
    pub area: f64,
    pub bounds: Rect,
}

/// Outer boundaries of the foreground blobs in `mask`. Holes and anything
/// nested inside them are ignored.
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| compress_straight_runs(c.points))
        .collect()
}

/// Drop every vertex that lies in the middle of a horizontal, vertical or
/// diagonal run, keeping only the corners of the closed polygon.
pub fn compress_straight_runs(points: Vec<Point<i32>>) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect()
}

/// Polygon area by the shoelace formula. Degenerate contours have area 0.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// Smallest axis-aligned rectangle covering every pixel of the contour.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}

/// Whether a contour of `area` counts as motion rather than noise.
pub fn is_significant(area: f64, minimum_area: f64) -> bool {
    area >= minimum_area
}

/// Trace `mask` and keep the contours whose area reaches `minimum_area`.
pub fn extract_regions(mask: &GrayImage, minimum_area: f64) -> Vec<MotionRegion> {
    external_contours(mask)
        .into_iter()
        .filter_map(|contour| {
            let area = contour_area(&contour);
            if !is_significant(area, minimum_area) {
                return None;
            }
            let bounds = bounding_rect(&contour)?;
            Some(MotionRegion {
                contour,
                area,
                bounds,
            })
        })
        .collect()
}
