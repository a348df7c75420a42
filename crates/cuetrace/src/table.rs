//! Table surface segmentation and boundary geometry.
//!
//! The felt is assumed to be the single dominant-hue blob in the frame:
//! a hue histogram picks the dominant color, a hand-tuned HSV band around
//! it yields a binary mask, and the largest connected component after
//! morphological closing is taken as the table surface. Balls and cue
//! resting on the felt break the external contour, so the convex hull is
//! used to repair occlusions; the hull-filled mask is the ROI handed to
//! ball detection. Corners are recovered by intersecting Hough lines on
//! the blurred hull outline.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::color::{hsv_in_band, rgb_to_hsv};
use crate::error::PipelineError;
use crate::geom::{distance, line_intersection};

/// Corner-finding parameters (Hough stage on the hull outline).
#[derive(Debug, Clone)]
pub struct CornerConfig {
    /// Gaussian sigma applied to the hull mask before edge detection.
    pub blur_sigma: f32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough votes for a line.
    pub hough_votes: u32,
    /// Hough peak suppression radius (pixels).
    pub suppression_radius: u32,
    /// Intersections closer than this collapse to one representative.
    pub dedup_dist: f32,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 4.0,
            canny_low: 20.0,
            canny_high: 50.0,
            hough_votes: 80,
            suppression_radius: 8,
            dedup_dist: 20.0,
        }
    }
}

/// Configuration for table segmentation.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Number of hue histogram bins over [0, 180).
    pub hue_bins: usize,
    /// Half-width of the accepted hue band around the dominant hue.
    pub hue_band: f32,
    /// Saturation band (hand-tuned for felt under scene lighting).
    pub sat_lo: u8,
    pub sat_hi: u8,
    /// Value band.
    pub val_lo: u8,
    pub val_hi: u8,
    /// Gaussian sigma on the frame before thresholding.
    pub blur_sigma: f32,
    /// Whether to run the corner-finding stage.
    pub find_corners: bool,
    pub corner: CornerConfig,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            hue_bins: 64,
            hue_band: 10.0,
            sat_lo: 100,
            sat_hi: 250,
            val_lo: 60,
            val_hi: 250,
            blur_sigma: 1.1,
            find_corners: true,
            corner: CornerConfig::default(),
        }
    }
}

/// Geometry and color state of the detected table for one frame.
#[derive(Debug, Clone)]
pub struct TableModel {
    /// Dominant felt hue in [0, 180).
    pub dominant_hue: f32,
    /// Mean RGB color of the masked table surface.
    pub mean_rgb: [f32; 3],
    /// External contour of the largest dominant-hue component.
    pub contour: Vec<Point<i32>>,
    /// Convex hull of the contour (occlusion repair).
    pub hull: Vec<Point<i32>>,
    /// Hull-filled binary ROI mask (table pixels = 255).
    pub roi: GrayImage,
    /// Corner candidates from line intersections; empty if disabled or
    /// not recoverable this frame.
    pub corners: Vec<[f32; 2]>,
}

/// Finds the table surface region, boundary, and dominant color.
#[derive(Debug, Clone, Default)]
pub struct TableSegmenter {
    config: TableConfig,
}

impl TableSegmenter {
    pub fn new(config: TableConfig) -> Self {
        Self { config }
    }

    /// Segment the table in one frame.
    ///
    /// Fails with [`PipelineError::EmptyTableMask`] when thresholding finds
    /// no foreground, and with `DegenerateGeometry` when the contour is too
    /// small to form a polygon; the caller decides whether that aborts the
    /// run or just this frame.
    pub fn find_table(&self, frame: &RgbImage) -> Result<TableModel, PipelineError> {
        let dominant_hue = self.dominant_hue(frame);
        let thresholded = self.threshold_mask(frame, dominant_hue);
        let mask = largest_component(&thresholded).ok_or(PipelineError::EmptyTableMask)?;

        let mean_rgb = masked_mean(frame, &mask);

        let contour = external_contour(&mask).ok_or(PipelineError::EmptyTableMask)?;
        if contour.len() < 3 {
            return Err(PipelineError::DegenerateGeometry(format!(
                "table contour has only {} points",
                contour.len()
            )));
        }

        let hull = imageproc::geometry::convex_hull(contour.as_slice());
        if hull.len() < 3 {
            return Err(PipelineError::DegenerateGeometry(
                "table hull collapsed to fewer than 3 points".into(),
            ));
        }

        let roi = fill_polygon(frame.width(), frame.height(), &hull);

        let corners = if self.config.find_corners {
            self.find_corners(&roi)
        } else {
            Vec::new()
        };

        tracing::debug!(
            hue = dominant_hue,
            contour_points = contour.len(),
            hull_points = hull.len(),
            corners = corners.len(),
            "table segmented"
        );

        Ok(TableModel {
            dominant_hue,
            mean_rgb,
            contour,
            hull,
            roi,
            corners,
        })
    }

    /// Bin hue over the whole frame; the fullest bin is the felt hue.
    fn dominant_hue(&self, frame: &RgbImage) -> f32 {
        let bins = self.config.hue_bins;
        let mut hist = vec![0u32; bins];
        for p in frame.pixels() {
            let hsv = rgb_to_hsv(*p);
            let idx = ((hsv.h / 180.0 * bins as f32) as usize).min(bins - 1);
            hist[idx] += 1;
        }
        let max_idx = hist
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| **c)
            .map(|(i, _)| i)
            .unwrap_or(0);
        max_idx as f32 * 180.0 / bins as f32
    }

    /// Binary mask of pixels inside the HSV band around the dominant hue.
    fn threshold_mask(&self, frame: &RgbImage, hue: f32) -> GrayImage {
        let c = &self.config;
        let blurred = imageproc::filter::gaussian_blur_f32(frame, c.blur_sigma);

        let mut mask = GrayImage::new(frame.width(), frame.height());
        let h_lo = (hue - c.hue_band).rem_euclid(180.0);
        let h_hi = (hue + c.hue_band).rem_euclid(180.0);
        for (src, dst) in blurred.pixels().zip(mask.pixels_mut()) {
            let hsv = rgb_to_hsv(*src);
            if hsv_in_band(hsv, h_lo, h_hi, c.sat_lo, c.sat_hi, c.val_lo, c.val_hi) {
                dst[0] = 255;
            }
        }
        mask
    }

    /// Blur the hull mask, run Canny + Hough, intersect all line pairs
    /// inside the frame bounds and de-duplicate nearby intersections.
    fn find_corners(&self, roi: &GrayImage) -> Vec<[f32; 2]> {
        let c = &self.config.corner;
        let blurred = imageproc::filter::gaussian_blur_f32(roi, c.blur_sigma);
        let edges = imageproc::edges::canny(&blurred, c.canny_low, c.canny_high);

        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: c.hough_votes,
                suppression_radius: c.suppression_radius,
            },
        );

        let (w, h) = (roi.width() as f32, roi.height() as f32);
        let segments: Vec<([f32; 2], [f32; 2])> = lines.iter().map(polar_to_segment).collect();

        let mut corners: Vec<[f32; 2]> = Vec::new();
        for i in 0..segments.len() {
            for j in (i + 1)..segments.len() {
                let Some(p) = line_intersection(segments[i], segments[j]) else {
                    continue;
                };
                if p[0] < 0.0 || p[1] < 0.0 || p[0] >= w || p[1] >= h {
                    continue;
                }
                let too_close = corners.iter().any(|q| distance(p, *q) < c.dedup_dist);
                if !too_close {
                    corners.push(p);
                }
            }
        }
        corners
    }
}

/// Two points on a Hough polar line r = x·cosθ + y·sinθ.
fn polar_to_segment(line: &PolarLine) -> ([f32; 2], [f32; 2]) {
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    let p0 = [line.r * cos, line.r * sin];
    // Far endpoints along the line direction; only the infinite line matters.
    let ext = 4096.0;
    (
        [p0[0] - ext * sin, p0[1] + ext * cos],
        [p0[0] + ext * sin, p0[1] - ext * cos],
    )
}

/// Morphological closing, then keep only the largest foreground component.
fn largest_component(mask: &GrayImage) -> Option<GrayImage> {
    let closed = imageproc::morphology::close(mask, Norm::L1, 1);
    let labels = connected_components(&closed, Connectivity::Four, Luma([0u8]));

    let mut areas: std::collections::HashMap<u32, u64> = std::collections::HashMap::new();
    for p in labels.pixels() {
        if p[0] != 0 {
            *areas.entry(p[0]).or_insert(0) += 1;
        }
    }
    let (&best, _) = areas.iter().max_by_key(|(_, a)| **a)?;

    let mut out = GrayImage::new(mask.width(), mask.height());
    for (src, dst) in labels.pixels().zip(out.pixels_mut()) {
        if src[0] == best {
            dst[0] = 255;
        }
    }
    Some(out)
}

/// Outer border contour with the most points.
fn external_contour(mask: &GrayImage) -> Option<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .max_by_key(|c| c.points.len())
        .map(|c| c.points)
}

/// Fill a polygon into a fresh binary mask.
fn fill_polygon(w: u32, h: u32, poly: &[Point<i32>]) -> GrayImage {
    let mut out = GrayImage::new(w, h);
    // draw_polygon_mut rejects a closed point list
    let pts: &[Point<i32>] = if poly.len() > 1 && poly.first() == poly.last() {
        &poly[..poly.len() - 1]
    } else {
        poly
    };
    if pts.len() >= 3 {
        imageproc::drawing::draw_polygon_mut(&mut out, pts, Luma([255u8]));
    }
    out
}

/// Mean RGB over mask-on pixels.
fn masked_mean(frame: &RgbImage, mask: &GrayImage) -> [f32; 3] {
    let mut sum = [0f64; 3];
    let mut n = 0u64;
    for (p, m) in frame.pixels().zip(mask.pixels()) {
        if m[0] > 0 {
            for c in 0..3 {
                sum[c] += p[c] as f64;
            }
            n += 1;
        }
    }
    if n == 0 {
        return [0.0; 3];
    }
    [
        (sum[0] / n as f64) as f32,
        (sum[1] / n as f64) as f32,
        (sum[2] / n as f64) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Gray background with a green "table" rectangle and a few white
    /// "balls" breaking the felt area.
    fn make_table_frame(w: u32, h: u32, table: crate::geom::Rect) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([90, 90, 90]));
        for y in table.y..table.y + table.height {
            for x in table.x..table.x + table.width {
                img.put_pixel(x as u32, y as u32, Rgb([20, 160, 60]));
            }
        }
        // Balls on the felt
        for &(cx, cy) in &[(120i32, 100i32), (200, 130)] {
            imageproc::drawing::draw_filled_circle_mut(
                &mut img,
                (cx, cy),
                8,
                Rgb([240, 240, 240]),
            );
        }
        img
    }

    fn point_in_convex_polygon(p: [f32; 2], poly: &[Point<i32>]) -> bool {
        let n = poly.len();
        let mut sign = 0f32;
        for i in 0..n {
            let a = poly[i];
            let b = poly[(i + 1) % n];
            let cross = (b.x - a.x) as f32 * (p[1] - a.y as f32)
                - (b.y - a.y) as f32 * (p[0] - a.x as f32);
            if cross.abs() < 1e-6 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    #[test]
    fn test_find_table_hull_contains_component() {
        let table = crate::geom::Rect::new(40, 30, 240, 160);
        let frame = make_table_frame(320, 240, table);
        let seg = TableSegmenter::default();
        let model = seg.find_table(&frame).unwrap();

        assert!((model.dominant_hue - 60.0).abs() < 10.0, "felt should be green");

        // Every ROI pixel of the thresholded component must lie in the hull
        // (sampled on a grid to keep the test fast).
        for y in (0..240).step_by(7) {
            for x in (0..320).step_by(7) {
                if model.roi.get_pixel(x, y)[0] > 0 {
                    assert!(
                        point_in_convex_polygon([x as f32, y as f32], &model.hull),
                        "ROI pixel ({}, {}) outside hull",
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_roi_covers_occluding_balls() {
        let table = crate::geom::Rect::new(40, 30, 240, 160);
        let frame = make_table_frame(320, 240, table);
        let model = TableSegmenter::default().find_table(&frame).unwrap();

        // Ball centers sit on the felt; the hull-filled ROI must include them
        // even though the threshold mask has holes there.
        assert!(model.roi.get_pixel(120, 100)[0] > 0);
        assert!(model.roi.get_pixel(200, 130)[0] > 0);
    }

    #[test]
    fn test_corners_near_rect_corners() {
        let table = crate::geom::Rect::new(40, 30, 240, 160);
        let frame = make_table_frame(320, 240, table);
        let model = TableSegmenter::default().find_table(&frame).unwrap();

        let expected = [
            [40.0f32, 30.0],
            [280.0, 30.0],
            [280.0, 190.0],
            [40.0, 190.0],
        ];
        for e in expected {
            let best = model
                .corners
                .iter()
                .map(|c| distance(*c, e))
                .fold(f32::INFINITY, f32::min);
            assert!(best < 20.0, "no corner near {:?} (best {})", e, best);
        }
    }

    #[test]
    fn test_empty_frame_is_error() {
        // Uniform gray frame: zero saturation, nothing passes the band.
        let frame = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let err = TableSegmenter::default().find_table(&frame).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTableMask));
    }
}
