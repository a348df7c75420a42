//! Pipeline driver: per-frame orchestration and end-of-run scoring.

use image::RgbImage;

use crate::dataset::GroundTruth;
use crate::detect::{BallDetector, DetectionOutput};
use crate::error::PipelineError;
use crate::metrics::{per_class_ap, per_class_iou, NUM_BOX_CLASSES, NUM_LABEL_CLASSES, RunMetrics};
use crate::project::TrajectoryProjector;
use crate::table::{TableModel, TableSegmenter};
use crate::track::{MultiObjectTracker, TrackSnapshot};

use super::annotate;
use super::result::FrameAnalysis;
use super::PipelineConfig;

/// Drives the full analysis over a clip, one frame at a time.
///
/// Call [`process_frame`](Self::process_frame) for every frame in order,
/// then [`redetect_final`](Self::redetect_final) on the last frame and
/// [`score`](Self::score) against ground truth.
pub struct FramePipeline {
    config: PipelineConfig,
    segmenter: TableSegmenter,
    detector: BallDetector,
    tracker: MultiObjectTracker,
    projector: TrajectoryProjector,
    table: Option<TableModel>,
    first_detection: Option<DetectionOutput>,
    last_detection: Option<DetectionOutput>,
    last_snapshot: TrackSnapshot,
    frame_index: usize,
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let segmenter = TableSegmenter::new(config.table.clone());
        let detector = BallDetector::new(config.detect.clone());
        let tracker = MultiObjectTracker::new(config.track.clone());
        let projector = TrajectoryProjector::new(config.projector.clone());
        Self {
            config,
            segmenter,
            detector,
            tracker,
            projector,
            table: None,
            first_detection: None,
            last_detection: None,
            last_snapshot: TrackSnapshot::default(),
            frame_index: 0,
        }
    }

    /// Pipeline with a custom minimap background.
    pub fn with_minimap(config: PipelineConfig, background: &RgbImage) -> Self {
        let mut pipeline = Self::new(config.clone());
        pipeline.projector = TrajectoryProjector::with_background(config.projector, background);
        pipeline
    }

    /// First-pass detection artifacts (available after the first frame).
    pub fn first_detection(&self) -> Option<&DetectionOutput> {
        self.first_detection.as_ref()
    }

    /// Final re-detection artifacts (available after `redetect_final`).
    pub fn last_detection(&self) -> Option<&DetectionOutput> {
        self.last_detection.as_ref()
    }

    /// Process the next frame of the clip.
    ///
    /// The first frame must yield a table; segmentation failure there aborts
    /// the run. On later frames a failed re-segmentation (when enabled) is
    /// logged and the previous table model kept.
    pub fn process_frame(&mut self, frame: &RgbImage) -> Result<FrameAnalysis, PipelineError> {
        let index = self.frame_index;
        self.frame_index += 1;

        if self.table.is_none() {
            self.table = Some(self.segmenter.find_table(frame)?);
        } else if self.config.segment_every_frame {
            match self.segmenter.find_table(frame) {
                Ok(model) => self.table = Some(model),
                Err(err) => {
                    tracing::warn!(frame = index, %err, "re-segmentation failed, keeping previous table");
                }
            }
        }
        // Guarded above: the first branch either fills it or returns.
        let table = self.table.as_ref().ok_or(PipelineError::EmptyTableMask)?;
        let corners = table.corners.clone();

        let snapshot = if !self.tracker.is_initialized() {
            let detection = self.detector.detect_balls(frame, &table.roi, &corners)?;
            self.tracker.initialize(frame, &detection.observations);

            let mut snap = TrackSnapshot::default();
            for (id, obs) in detection.observations.iter().enumerate() {
                snap.ids.push(id);
                snap.classes.push(obs.class);
                snap.centers.push(obs.center);
                snap.trajectories.push(vec![obs.center]);
            }
            self.first_detection = Some(detection);
            snap
        } else {
            self.tracker.update(frame)
        };
        self.last_snapshot = snapshot.clone();

        let mut annotated = frame.clone();
        annotate::draw_outline(&mut annotated, &table.contour);
        annotate::draw_outline(&mut annotated, &table.hull);
        annotate::draw_corners(&mut annotated, &corners);
        for track in self.tracker.tracks() {
            if track.phase == crate::track::TrackPhase::Tracking {
                annotate::draw_ball_box(&mut annotated, track.bbox, track.class);
            }
        }

        match self.projector.project(&mut annotated, &snapshot, &corners) {
            Ok(()) => {}
            Err(err @ PipelineError::DegenerateGeometry(_))
            | Err(err @ PipelineError::OverlayDoesNotFit { .. }) => {
                tracing::warn!(frame = index, %err, "minimap skipped");
            }
            Err(err) => return Err(err),
        }

        Ok(FrameAnalysis {
            index,
            annotated,
            snapshot,
            corners,
        })
    }

    /// Re-detect balls on the last frame, carrying identities from the
    /// still-live tracks, and store the artifacts for scoring.
    pub fn redetect_final(&mut self, frame: &RgbImage) -> Result<&DetectionOutput, PipelineError> {
        let table = self.table.as_ref().ok_or_else(|| {
            PipelineError::DegenerateGeometry("final re-detection before any frame was processed".into())
        })?;
        let detection = self.detector.detect_balls_final(
            frame,
            &table.roi,
            &self.last_snapshot.centers,
            &self.last_snapshot.classes,
        )?;
        Ok(self.last_detection.insert(detection))
    }

    /// Score first- and last-frame artifacts against ground truth.
    pub fn score(&self, truth: &GroundTruth) -> Result<RunMetrics, PipelineError> {
        let first = self.first_detection.as_ref().ok_or_else(|| {
            PipelineError::DegenerateGeometry("scoring before any frame was processed".into())
        })?;
        let last = self.last_detection.as_ref().ok_or_else(|| {
            PipelineError::DegenerateGeometry("scoring before final re-detection".into())
        })?;

        let ap_first = per_class_ap(&first.box_table, &truth.first_boxes);
        let ap_last = per_class_ap(&last.box_table, &truth.last_boxes);
        let map_first = ap_first.iter().sum::<f64>() / NUM_BOX_CLASSES as f64;
        let map_last = ap_last.iter().sum::<f64>() / NUM_BOX_CLASSES as f64;

        let pairs = [
            (&truth.first_mask, &first.labels),
            (&truth.last_mask, &last.labels),
        ];
        let class_iou_vec = per_class_iou(&pairs, NUM_LABEL_CLASSES)?;
        let mut class_iou = [0.0; NUM_LABEL_CLASSES as usize];
        class_iou.copy_from_slice(&class_iou_vec);
        let miou = class_iou.iter().sum::<f64>() / NUM_LABEL_CLASSES as f64;

        Ok(RunMetrics {
            map: (map_first + map_last) / 2.0,
            miou,
            ap_first,
            ap_last,
            class_iou,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const FELT: Rgb<u8> = Rgb([10, 170, 40]);

    /// Whole-frame felt with one white ball; the table fills the frame so
    /// segmentation yields a full ROI and no corner geometry.
    fn felt_frame(ball: (i32, i32)) -> RgbImage {
        let mut img = RgbImage::from_pixel(200, 160, FELT);
        imageproc::drawing::draw_filled_circle_mut(&mut img, ball, 10, Rgb([245, 245, 245]));
        img
    }

    #[test]
    fn test_pipeline_tracks_across_frames() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default());

        let first = pipeline.process_frame(&felt_frame((60, 40))).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.snapshot.ids, vec![0]);
        assert_eq!(first.annotated.dimensions(), (200, 160));

        for (step, x) in [64, 68, 72].iter().enumerate() {
            let analysis = pipeline.process_frame(&felt_frame((*x, 40))).unwrap();
            assert_eq!(analysis.index, step + 1);
            assert_eq!(analysis.snapshot.ids, vec![0], "ball lost at frame {}", step + 1);
        }
    }

    #[test]
    fn test_pipeline_scores_own_artifacts_perfectly() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default());
        pipeline.process_frame(&felt_frame((60, 40))).unwrap();
        let last_frame = felt_frame((64, 40));
        pipeline.process_frame(&last_frame).unwrap();
        pipeline.redetect_final(&last_frame).unwrap();

        let first = pipeline.first_detection().unwrap().clone();
        let last = pipeline.last_detection().unwrap().clone();
        assert_eq!(first.observations.len(), 1);
        assert_eq!(last.observations.len(), 1);

        let truth = GroundTruth {
            first_boxes: first.box_table.clone(),
            last_boxes: last.box_table.clone(),
            first_mask: first.labels.clone(),
            last_mask: last.labels.clone(),
        };
        let metrics = pipeline.score(&truth).unwrap();
        assert!((metrics.map - 1.0).abs() < 1e-9, "map = {}", metrics.map);
        assert!((metrics.miou - 1.0).abs() < 1e-9, "miou = {}", metrics.miou);
    }

    #[test]
    fn test_score_requires_processed_frames() {
        let pipeline = FramePipeline::new(PipelineConfig::default());
        let truth = GroundTruth {
            first_boxes: Vec::new(),
            last_boxes: Vec::new(),
            first_mask: image::GrayImage::new(4, 4),
            last_mask: image::GrayImage::new(4, 4),
        };
        assert!(pipeline.score(&truth).is_err());
    }

    #[test]
    fn test_first_frame_without_table_aborts() {
        let mut pipeline = FramePipeline::new(PipelineConfig::default());
        let gray = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let err = pipeline.process_frame(&gray).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTableMask));
    }
}
