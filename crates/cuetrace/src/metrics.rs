//! End-of-run accuracy metrics: 11-point interpolated mAP over the four
//! ball classes and pixel mIoU over the six label classes.
//!
//! Matching is deliberately simple and mirrors the evaluated system:
//! predictions are walked in detection order (no confidence scores exist),
//! and each is matched greedily to the first unmatched ground-truth box of
//! its class with IoU ≥ 0.5.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::geom::Rect;

/// Number of ball box classes (cue, eight, solid, striped).
pub const NUM_BOX_CLASSES: u8 = 4;
/// Number of pixel label classes (background, 4 ball classes, table).
pub const NUM_LABEL_CLASSES: u8 = 6;

/// IoU threshold for a prediction to match a ground-truth box.
const MATCH_IOU: f64 = 0.5;

/// One labeled bounding box, prediction or ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub rect: Rect,
    pub class: u8,
}

/// One point of a precision/recall curve; recall is quantized to 0.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub recall: f32,
    pub precision: f32,
}

/// Aggregated run metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Mean of first-frame and last-frame mAP.
    pub map: f64,
    /// Mean IoU over label classes, first/last frame averaged.
    pub miou: f64,
    /// Per-class AP, first frame then last frame.
    pub ap_first: [f64; NUM_BOX_CLASSES as usize],
    pub ap_last: [f64; NUM_BOX_CLASSES as usize],
    /// Per-class pixel IoU averaged over the two frames.
    pub class_iou: [f64; NUM_LABEL_CLASSES as usize],
}

// ── Box mAP ──────────────────────────────────────────────────────────────

/// Build the raw precision/recall table for one class.
///
/// Walks predictions in input order, matching each greedily against
/// ground-truth boxes of the class, and records a PR point after every
/// prediction. Boundary cases: no ground truth for the class resolves to
/// the solved-cost-free point (1, 1); ground truth present but no
/// predictions resolves to the worst-case point (1, 0).
pub fn pr_table(preds: &[BoxRecord], truths: &[BoxRecord], class: u8) -> Vec<PrPoint> {
    let total_gt = truths.iter().filter(|t| t.class == class).count();
    if total_gt == 0 {
        return vec![PrPoint {
            recall: 1.0,
            precision: 1.0,
        }];
    }

    let mut matched = vec![false; truths.len()];
    let mut tp = 0u32;
    let mut fp = 0u32;
    let mut points = Vec::new();

    for pred in preds.iter().filter(|p| p.class == class) {
        let mut is_tp = false;
        for (j, truth) in truths.iter().enumerate() {
            if truth.class != class || matched[j] {
                continue;
            }
            if pred.rect.iou(&truth.rect) >= MATCH_IOU {
                // First-found match, not best-IoU: greedy by design
                matched[j] = true;
                is_tp = true;
                break;
            }
        }
        if is_tp {
            tp += 1;
        } else {
            fp += 1;
        }

        let precision = tp as f32 / (tp + fp) as f32;
        let recall = tp as f32 / total_gt as f32;
        points.push(PrPoint {
            recall: (recall * 10.0).round() / 10.0,
            precision,
        });
    }

    if points.is_empty() {
        return vec![PrPoint {
            recall: 1.0,
            precision: 0.0,
        }];
    }
    points
}

/// Collapse duplicate quantized recalls (the earlier point carries the max
/// precision for that recall) and flatten the precision envelope right to
/// left so precision is non-increasing in recall.
pub fn refine_pr_table(points: &[PrPoint]) -> Vec<PrPoint> {
    if points.is_empty() {
        return Vec::new();
    }

    let mut unique: Vec<PrPoint> = vec![points[0]];
    let mut last_seen = points[0].recall;
    for p in &points[1..] {
        if p.recall == last_seen {
            continue;
        }
        unique.push(*p);
        last_seen = p.recall;
    }

    for i in (1..unique.len()).rev() {
        unique[i - 1].precision = unique[i - 1].precision.max(unique[i].precision);
    }
    unique
}

/// 11-point interpolated average precision from a refined PR table.
///
/// The first point is weighted for its recall interval from the origin,
/// subsequent points by consecutive recall deltas.
pub fn average_precision(points: &[PrPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let p0 = &points[0];
    let mut ap =
        1.0 / 11.0 * p0.precision as f64 + 10.0 / 11.0 * p0.recall as f64 * p0.precision as f64;
    for w in points.windows(2) {
        ap += 10.0 / 11.0 * (w[1].recall - w[0].recall) as f64 * w[1].precision as f64;
    }
    ap
}

/// AP per ball class for one frame's predictions.
pub fn per_class_ap(
    preds: &[BoxRecord],
    truths: &[BoxRecord],
) -> [f64; NUM_BOX_CLASSES as usize] {
    let mut ap = [0.0; NUM_BOX_CLASSES as usize];
    for class in 1..=NUM_BOX_CLASSES {
        let refined = refine_pr_table(&pr_table(preds, truths, class));
        ap[(class - 1) as usize] = average_precision(&refined);
    }
    ap
}

/// Mean average precision over the four ball classes.
pub fn compute_map(preds: &[BoxRecord], truths: &[BoxRecord]) -> f64 {
    per_class_ap(preds, truths).iter().sum::<f64>() / NUM_BOX_CLASSES as f64
}

// ── Pixel mIoU ───────────────────────────────────────────────────────────

/// Pixel IoU of one label class between two rasters.
///
/// Vacuous classes are defined, not divided by zero: both rasters empty of
/// the class gives 1.0, exactly one side empty gives 0.0.
pub fn class_pixel_iou(
    truth: &GrayImage,
    pred: &GrayImage,
    class: u8,
) -> Result<f64, PipelineError> {
    if truth.dimensions() != pred.dimensions() {
        return Err(PipelineError::DimensionMismatch {
            frame_w: truth.width(),
            frame_h: truth.height(),
            mask_w: pred.width(),
            mask_h: pred.height(),
        });
    }

    let mut intersection = 0u64;
    let mut union = 0u64;
    for (t, p) in truth.pixels().zip(pred.pixels()) {
        let in_t = t[0] == class;
        let in_p = p[0] == class;
        if in_t && in_p {
            intersection += 1;
        }
        if in_t || in_p {
            union += 1;
        }
    }
    if union == 0 {
        return Ok(1.0);
    }
    Ok(intersection as f64 / union as f64)
}

/// Per-class IoU averaged over (ground truth, prediction) raster pairs.
pub fn per_class_iou(
    pairs: &[(&GrayImage, &GrayImage)],
    num_classes: u8,
) -> Result<Vec<f64>, PipelineError> {
    if pairs.is_empty() || num_classes == 0 {
        return Err(PipelineError::DegenerateGeometry(
            "mIoU needs at least one raster pair and one class".into(),
        ));
    }
    let mut out = Vec::with_capacity(num_classes as usize);
    for class in 0..num_classes {
        let mut sum = 0.0;
        for (truth, pred) in pairs {
            sum += class_pixel_iou(truth, pred, class)?;
        }
        out.push(sum / pairs.len() as f64);
    }
    Ok(out)
}

/// Mean IoU across label classes over the given raster pairs
/// (first and last frame in the full pipeline).
pub fn compute_miou(
    pairs: &[(&GrayImage, &GrayImage)],
    num_classes: u8,
) -> Result<f64, PipelineError> {
    let per_class = per_class_iou(pairs, num_classes)?;
    Ok(per_class.iter().sum::<f64>() / per_class.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    fn boxes(rows: &[(i32, i32, i32, i32, u8)]) -> Vec<BoxRecord> {
        rows.iter()
            .map(|&(x, y, w, h, c)| BoxRecord {
                rect: Rect::new(x, y, w, h),
                class: c,
            })
            .collect()
    }

    #[test]
    fn test_perfect_predictions_map_is_one() {
        // One box per class, predicted exactly.
        let truth = boxes(&[
            (0, 0, 20, 20, 1),
            (40, 0, 20, 20, 2),
            (0, 40, 20, 20, 3),
            (40, 40, 20, 20, 4),
        ]);
        let preds = truth.clone();
        assert_relative_eq!(compute_map(&preds, &truth), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_all_wrong_predictions_map_is_zero() {
        let truth = boxes(&[(0, 0, 20, 20, 1)]);
        let preds = boxes(&[(100, 100, 20, 20, 1)]);
        let ap = per_class_ap(&preds, &truth);
        assert_eq!(ap[0], 0.0);
    }

    #[test]
    fn test_missing_class_is_cost_free() {
        // No ground truth and no predictions for classes 2..4.
        let truth = boxes(&[(0, 0, 20, 20, 1)]);
        let preds = truth.clone();
        assert_relative_eq!(compute_map(&preds, &truth), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_predictions_with_gt_is_zero() {
        let truth = boxes(&[(0, 0, 20, 20, 1)]);
        let table = pr_table(&[], &truth, 1);
        assert_eq!(
            table,
            vec![PrPoint {
                recall: 1.0,
                precision: 0.0
            }]
        );
        assert_eq!(average_precision(&refine_pr_table(&table)), 0.0);
    }

    #[test]
    fn test_greedy_match_consumes_ground_truth() {
        // Two identical predictions over one GT box: the second must be FP.
        let truth = boxes(&[(0, 0, 20, 20, 1)]);
        let preds = boxes(&[(0, 0, 20, 20, 1), (0, 0, 20, 20, 1)]);
        let table = pr_table(&preds, &truth, 1);
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table[1].precision, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_refined_envelope_is_monotone() {
        let raw = vec![
            PrPoint { recall: 0.2, precision: 1.0 },
            PrPoint { recall: 0.2, precision: 0.5 },
            PrPoint { recall: 0.4, precision: 0.66 },
            PrPoint { recall: 0.6, precision: 0.75 },
            PrPoint { recall: 0.8, precision: 0.6 },
        ];
        let refined = refine_pr_table(&raw);
        for w in refined.windows(2) {
            assert!(
                w[0].precision >= w[1].precision,
                "envelope not monotone: {:?}",
                refined
            );
        }
        // Duplicate recall collapsed to the earlier (max-precision) point
        assert_eq!(refined[0].precision, 1.0);
    }

    #[test]
    fn test_miou_identical_rasters() {
        let mut img = GrayImage::new(20, 20);
        for (i, p) in img.pixels_mut().enumerate() {
            p[0] = (i % NUM_LABEL_CLASSES as usize) as u8;
        }
        let pairs = [(&img, &img), (&img, &img)];
        let per_class = per_class_iou(&pairs, NUM_LABEL_CLASSES).unwrap();
        for (class, iou) in per_class.iter().enumerate() {
            assert_relative_eq!(*iou, 1.0, epsilon = 1e-12);
            let _ = class;
        }
        assert_relative_eq!(
            compute_miou(&pairs, NUM_LABEL_CLASSES).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_miou_vacuous_class_conventions() {
        let empty = GrayImage::new(10, 10);
        // Class 1 absent from both: vacuous match.
        assert_eq!(class_pixel_iou(&empty, &empty, 1).unwrap(), 1.0);

        // Class present on one side only: zero.
        let mut one_side = GrayImage::new(10, 10);
        one_side.put_pixel(5, 5, Luma([1u8]));
        assert_eq!(class_pixel_iou(&empty, &one_side, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_miou_dimension_mismatch() {
        let a = GrayImage::new(10, 10);
        let b = GrayImage::new(10, 11);
        assert!(class_pixel_iou(&a, &b, 0).is_err());
    }

    #[test]
    fn test_ap_partial_detection() {
        // Two GT boxes of class 1, one detected: recall 0.5, precision 1.
        let truth = boxes(&[(0, 0, 20, 20, 1), (50, 50, 20, 20, 1)]);
        let preds = boxes(&[(0, 0, 20, 20, 1)]);
        let refined = refine_pr_table(&pr_table(&preds, &truth, 1));
        // AP = 1/11 + 10/11 * 0.5
        assert_relative_eq!(
            average_precision(&refined),
            1.0 / 11.0 + 10.0 / 11.0 * 0.5,
            epsilon = 1e-9
        );
    }
}
