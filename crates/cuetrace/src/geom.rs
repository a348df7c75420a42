//! Basic 2D geometry: left-top-width-height boxes and line intersection.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in left-top-width-height form, pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    pub fn center(&self) -> [f32; 2] {
        [
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        ]
    }

    /// Intersection box; zero-area when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        Rect::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    /// Intersection-over-union of two boxes. Zero when both are empty.
    pub fn iou(&self, other: &Rect) -> f64 {
        let inter = self.intersect(other).area();
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        inter as f64 / union as f64
    }

    /// Clip to an image of the given dimensions.
    pub fn clip(&self, w: u32, h: u32) -> Rect {
        let x0 = self.x.clamp(0, w as i32);
        let y0 = self.y.clamp(0, h as i32);
        let x1 = (self.x + self.width).clamp(0, w as i32);
        let y1 = (self.y + self.height).clamp(0, h as i32);
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Intersection of two infinite lines, each given by two points.
///
/// Returns `None` for (near-)parallel lines instead of dividing by a
/// vanishing denominator.
pub fn line_intersection(l1: ([f32; 2], [f32; 2]), l2: ([f32; 2], [f32; 2])) -> Option<[f32; 2]> {
    let ([x1, y1], [x2, y2]) = l1;
    let ([x3, y3], [x4, y4]) = l2;

    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-6 {
        return None;
    }

    let a = x1 * y2 - y1 * x2;
    let b = x3 * y4 - y3 * x4;
    let px = (a * (x3 - x4) - (x1 - x2) * b) / denom;
    let py = (a * (y3 - y4) - (y1 - y2) * b) / denom;
    Some([px, py])
}

/// Euclidean distance between two points.
pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identity() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.iou(&r), 1.0);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 0, 10, 10);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_line_intersection_perpendicular() {
        let h = ([0.0, 5.0], [10.0, 5.0]);
        let v = ([3.0, 0.0], [3.0, 10.0]);
        let p = line_intersection(h, v).unwrap();
        assert!((p[0] - 3.0).abs() < 1e-5 && (p[1] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_line_intersection_parallel() {
        let a = ([0.0, 0.0], [10.0, 0.0]);
        let b = ([0.0, 1.0], [10.0, 1.0]);
        assert!(line_intersection(a, b).is_none());
    }
}
