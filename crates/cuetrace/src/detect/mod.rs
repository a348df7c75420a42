//! Color-adaptive ball detection and classification inside the table ROI.
//!
//! The detector masks the frame with the ROI, equalizes lightness to fight
//! uneven lamps, samples the felt color from a central patch of the
//! enhanced table, and thresholds around it; balls show up as holes in the
//! felt mask. Circle candidates from the radial-symmetry transform are
//! validated with a two-mask cross-check (mostly inside the ROI, mostly
//! not felt) and a corner-distance gate before the white/black pattern
//! classifier assigns classes globally across the frame.

mod circles;
mod classify;
mod contrast;

pub use circles::{find_circles, CircleCandidate, CircleConfig};
pub use classify::{
    analyze_pattern, classify_patterns, BallClass, BallPattern, BLACK_THRESHOLD, STRIPED_CUTOFF,
    WHITE_THRESHOLD,
};
pub use contrast::enhance_contrast;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::color::{hsv_in_band, rgb_to_hsv, Hsv};
use crate::error::PipelineError;
use crate::geom::{distance, Rect};
use crate::metrics::BoxRecord;

/// Label raster value for table-surface pixels.
pub const LABEL_TABLE: u8 = 5;

/// Configuration for ball detection. Threshold constants are hand-tuned
/// for the scene's felt and lighting.
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// Side of the central patch sampled for the felt color.
    pub felt_patch: u32,
    /// Hue band around the sampled felt color (asymmetric: slightly wider
    /// on the high side, where felt highlights drift).
    pub felt_hue_below: f32,
    pub felt_hue_above: f32,
    /// Minimum saturation/value for a pixel to count as felt.
    pub felt_sat_lo: u8,
    pub felt_val_lo: u8,
    /// Circle transform settings; `min_dist` is overridden per frame to
    /// rows / `min_dist_divisor`.
    pub circle: CircleConfig,
    pub min_dist_divisor: f32,
    /// Candidate validation: minimum fraction of the disc inside the ROI.
    pub min_roi_overlap: f64,
    /// Minimum fraction of the disc outside the felt mask.
    pub min_nonfelt_overlap: f64,
    /// Minimum ratio non-felt/ROI disagreement.
    pub min_cross_ratio: f64,
    /// Candidates closer than this to a table corner are rejected
    /// (cushions and pockets produce spurious circular edges).
    pub corner_min_dist: f32,
    /// Circle transform for the final-frame re-detection pass (runs on the
    /// grayscale masked frame, looser than the felt-mask pass).
    pub final_circle: CircleConfig,
    /// A re-detected circle matches a tracked center within this many
    /// radii.
    pub final_match_radii: f32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            felt_patch: 50,
            felt_hue_below: 10.0,
            felt_hue_above: 14.0,
            felt_sat_lo: 80,
            felt_val_lo: 80,
            circle: CircleConfig::default(),
            min_dist_divisor: 26.0,
            min_roi_overlap: 0.8,
            min_nonfelt_overlap: 0.6,
            min_cross_ratio: 0.4,
            corner_min_dist: 60.0,
            final_circle: CircleConfig {
                r_min: 4.0,
                r_max: 15.0,
                min_dist: 30.0,
                min_vote_frac: 0.3,
                ..CircleConfig::default()
            },
            final_match_radii: 2.0,
        }
    }
}

/// One detected ball.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallObservation {
    /// Disc center in frame pixels.
    pub center: [f32; 2],
    pub radius: f32,
    /// Tight 2r×2r bounding box.
    pub bbox: Rect,
    pub class: BallClass,
    pub white_pct: f64,
    pub black_pct: f64,
}

/// Detector output for one frame: observations plus the two artifacts the
/// metrics stage consumes.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    pub observations: Vec<BallObservation>,
    /// One (x, y, w, h, class) row per ball.
    pub box_table: Vec<BoxRecord>,
    /// Per-pixel labels: 0 background, 1–4 ball classes, 5 table.
    pub labels: GrayImage,
}

/// Disc overlap fractions used for candidate validation; all in [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct OverlapRatios {
    /// Fraction of disc pixels inside the ROI.
    pub roi_frac: f64,
    /// Fraction of disc pixels outside the felt mask.
    pub nonfelt_frac: f64,
    /// Non-felt pixels over ROI pixels (disagreement ratio).
    pub cross_ratio: f64,
}

/// Detects and classifies balls inside the table ROI.
#[derive(Debug, Clone, Default)]
pub struct BallDetector {
    config: DetectConfig,
}

impl BallDetector {
    pub fn new(config: DetectConfig) -> Self {
        Self { config }
    }

    /// Full detection pass over one frame.
    pub fn detect_balls(
        &self,
        frame: &RgbImage,
        roi: &GrayImage,
        table_corners: &[[f32; 2]],
    ) -> Result<DetectionOutput, PipelineError> {
        check_dimensions(frame, roi)?;
        let c = &self.config;

        let masked = mask_frame(frame, roi);
        let enhanced = enhance_contrast(&masked);

        let felt = self.sample_felt_color(&enhanced);
        let felt_mask = self.felt_mask(&enhanced, felt);

        let mut circle_cfg = c.circle.clone();
        circle_cfg.min_dist = (frame.height() as f32 / c.min_dist_divisor).max(1.0);
        let candidates = find_circles(&felt_mask, &circle_cfg);

        let gray = crate::color::grayscale(frame);
        let mut accepted: Vec<CircleCandidate> = Vec::new();
        let mut patterns: Vec<BallPattern> = Vec::new();
        for cand in &candidates {
            let ratios = overlap_ratios(roi, &felt_mask, cand);
            if ratios.roi_frac <= c.min_roi_overlap
                || ratios.nonfelt_frac <= c.min_nonfelt_overlap
                || ratios.cross_ratio <= c.min_cross_ratio
            {
                continue;
            }
            let near_corner = table_corners
                .iter()
                .any(|corner| distance([cand.cx, cand.cy], *corner) < c.corner_min_dist);
            if near_corner {
                continue;
            }
            patterns.push(analyze_pattern(&gray, cand.cx, cand.cy, cand.radius));
            accepted.push(*cand);
        }

        let classes = classify_patterns(&patterns);
        let observations: Vec<BallObservation> = accepted
            .iter()
            .zip(patterns.iter())
            .zip(classes.iter())
            .map(|((cand, pattern), class)| BallObservation {
                center: [cand.cx, cand.cy],
                radius: cand.radius,
                bbox: disc_bbox(cand),
                class: *class,
                white_pct: pattern.white_pct,
                black_pct: pattern.black_pct,
            })
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            accepted = observations.len(),
            "ball detection pass"
        );

        Ok(assemble_output(roi, observations))
    }

    /// Final-frame re-detection.
    ///
    /// Circles come from the grayscale masked frame with looser settings;
    /// each is matched to the nearest still-tracked center within
    /// `final_match_radii`·radius and inherits that track's class, so
    /// identities are carried by distance rather than re-assigned.
    pub fn detect_balls_final(
        &self,
        frame: &RgbImage,
        roi: &GrayImage,
        tracked_centers: &[[f32; 2]],
        tracked_classes: &[BallClass],
    ) -> Result<DetectionOutput, PipelineError> {
        check_dimensions(frame, roi)?;
        let c = &self.config;

        let masked = mask_frame(frame, roi);
        let gray = crate::color::grayscale(&masked);
        let candidates = find_circles(&gray, &c.final_circle);

        let mut used = vec![false; tracked_centers.len()];
        let mut observations = Vec::new();
        for cand in &candidates {
            let gate = cand.radius * c.final_match_radii;
            let nearest = tracked_centers
                .iter()
                .enumerate()
                .filter(|(i, center)| {
                    !used[*i] && distance([cand.cx, cand.cy], **center) <= gate
                })
                .min_by(|(_, a), (_, b)| {
                    let da = distance([cand.cx, cand.cy], **a);
                    let db = distance([cand.cx, cand.cy], **b);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i);
            let Some(idx) = nearest else { continue };
            used[idx] = true;

            let pattern = analyze_pattern(&gray, cand.cx, cand.cy, cand.radius);
            observations.push(BallObservation {
                center: [cand.cx, cand.cy],
                radius: cand.radius,
                bbox: disc_bbox(cand),
                class: tracked_classes[idx],
                white_pct: pattern.white_pct,
                black_pct: pattern.black_pct,
            });
        }

        tracing::debug!(
            circles = candidates.len(),
            matched = observations.len(),
            "final-frame re-detection"
        );

        Ok(assemble_output(roi, observations))
    }

    /// Mean color of the central patch of the enhanced table, in HSV.
    fn sample_felt_color(&self, enhanced: &RgbImage) -> Hsv {
        let (w, h) = enhanced.dimensions();
        let side = self.config.felt_patch.min(w).min(h);
        let x0 = (w - side) / 2;
        let y0 = (h - side) / 2;

        let mut sum = [0f64; 3];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                let p = enhanced.get_pixel(x, y);
                for c in 0..3 {
                    sum[c] += p[c] as f64;
                }
            }
        }
        let n = (side * side) as f64;
        rgb_to_hsv(image::Rgb([
            (sum[0] / n).round() as u8,
            (sum[1] / n).round() as u8,
            (sum[2] / n).round() as u8,
        ]))
    }

    /// Threshold the enhanced image around the sampled felt color.
    fn felt_mask(&self, enhanced: &RgbImage, felt: Hsv) -> GrayImage {
        let c = &self.config;
        let h_lo = (felt.h - c.felt_hue_below).rem_euclid(180.0);
        let h_hi = (felt.h + c.felt_hue_above).rem_euclid(180.0);

        let mut mask = GrayImage::new(enhanced.width(), enhanced.height());
        for (src, dst) in enhanced.pixels().zip(mask.pixels_mut()) {
            let hsv = rgb_to_hsv(*src);
            if hsv_in_band(hsv, h_lo, h_hi, c.felt_sat_lo, 255, c.felt_val_lo, 255) {
                dst[0] = 255;
            }
        }
        mask
    }
}

/// Disc overlap fractions against the ROI and the felt mask.
pub fn overlap_ratios(roi: &GrayImage, felt_mask: &GrayImage, cand: &CircleCandidate) -> OverlapRatios {
    let (w, h) = roi.dimensions();
    let r = cand.radius;
    let r2 = r * r;
    let x0 = ((cand.cx - r).floor().max(0.0)) as u32;
    let y0 = ((cand.cy - r).floor().max(0.0)) as u32;
    let x1 = ((cand.cx + r).ceil() as u32).min(w.saturating_sub(1));
    let y1 = ((cand.cy + r).ceil() as u32).min(h.saturating_sub(1));

    let mut area = 0u32;
    let mut in_roi = 0u32;
    let mut nonfelt = 0u32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cand.cx;
            let dy = y as f32 - cand.cy;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            area += 1;
            if roi.get_pixel(x, y)[0] > 0 {
                in_roi += 1;
            }
            if felt_mask.get_pixel(x, y)[0] == 0 {
                nonfelt += 1;
            }
        }
    }

    if area == 0 {
        return OverlapRatios {
            roi_frac: 0.0,
            nonfelt_frac: 0.0,
            cross_ratio: 0.0,
        };
    }
    OverlapRatios {
        roi_frac: in_roi as f64 / area as f64,
        nonfelt_frac: nonfelt as f64 / area as f64,
        cross_ratio: if in_roi == 0 {
            0.0
        } else {
            nonfelt as f64 / in_roi as f64
        },
    }
}

fn check_dimensions(frame: &RgbImage, roi: &GrayImage) -> Result<(), PipelineError> {
    if frame.dimensions() != roi.dimensions() {
        return Err(PipelineError::DimensionMismatch {
            frame_w: frame.width(),
            frame_h: frame.height(),
            mask_w: roi.width(),
            mask_h: roi.height(),
        });
    }
    Ok(())
}

/// Zero out pixels outside the ROI.
fn mask_frame(frame: &RgbImage, roi: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(frame.width(), frame.height());
    for ((src, m), dst) in frame.pixels().zip(roi.pixels()).zip(out.pixels_mut()) {
        if m[0] > 0 {
            *dst = *src;
        }
    }
    out
}

fn disc_bbox(cand: &CircleCandidate) -> Rect {
    let r = cand.radius.round() as i32;
    Rect::new(
        cand.cx.round() as i32 - r,
        cand.cy.round() as i32 - r,
        2 * r,
        2 * r,
    )
}

/// Box table + label raster from accepted observations.
fn assemble_output(roi: &GrayImage, observations: Vec<BallObservation>) -> DetectionOutput {
    let box_table = observations
        .iter()
        .map(|o| BoxRecord {
            rect: o.bbox,
            class: o.class.id(),
        })
        .collect();

    let mut labels = GrayImage::new(roi.width(), roi.height());
    for (m, dst) in roi.pixels().zip(labels.pixels_mut()) {
        if m[0] > 0 {
            dst[0] = LABEL_TABLE;
        }
    }
    for o in &observations {
        stamp_disc(&mut labels, o.center, o.radius, o.class.id());
    }

    DetectionOutput {
        observations,
        box_table,
        labels,
    }
}

/// Stamp a filled disc of the given label, clipped to the raster.
fn stamp_disc(labels: &mut GrayImage, center: [f32; 2], radius: f32, label: u8) {
    let (w, h) = labels.dimensions();
    let r2 = radius * radius;
    let x0 = ((center[0] - radius).floor().max(0.0)) as u32;
    let y0 = ((center[1] - radius).floor().max(0.0)) as u32;
    let x1 = ((center[0] + radius).ceil() as u32).min(w.saturating_sub(1));
    let y1 = ((center[1] + radius).ceil() as u32).min(h.saturating_sub(1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - center[0];
            let dy = y as f32 - center[1];
            if dx * dx + dy * dy <= r2 {
                labels.put_pixel(x, y, image::Luma([label]));
            }
        }
    }
}
