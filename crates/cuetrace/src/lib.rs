//! cuetrace — fixed-camera billiard video analysis.
//!
//! Per frame the pipeline produces the table boundary, the set of balls with
//! identity/class, tracked trajectories, and a bird's-eye minimap insert;
//! at the end of a run it scores detection and segmentation accuracy
//! against ground truth. The stages are:
//!
//! 1. **Table** – dominant-hue segmentation, largest-component extraction,
//!    convex-hull ROI, corner finding via line intersections.
//! 2. **Detect** – contrast-enhanced felt thresholding, radial-symmetry
//!    circle transform, two-mask candidate validation, global white/black
//!    pattern classification.
//! 3. **Track** – one persistent correlation tracker per ball, accumulating
//!    unbounded trajectories; a lost tracker is terminal.
//! 4. **Project** – clockwise corner ordering, perspective homography onto
//!    a canonical top-down canvas with 90°-ambiguity correction.
//! 5. **Metrics** – 11-point interpolated mAP over the four ball classes and
//!    pixel mIoU over the six label classes, first and last frame.
//!
//! # Public API
//! [`FramePipeline`] drives a whole clip; the stage modules are public so
//! each stage can also be exercised on its own.

pub mod color;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod geom;
pub mod homography;
pub mod metrics;
pub mod pipeline;
pub mod project;
pub mod table;
pub mod track;

pub use dataset::GroundTruth;
pub use detect::{BallClass, BallDetector, BallObservation, DetectConfig, DetectionOutput};
pub use error::PipelineError;
pub use geom::Rect;
pub use metrics::{BoxRecord, RunMetrics};
pub use pipeline::{FrameAnalysis, FramePipeline, PipelineConfig};
pub use project::{ProjectorConfig, TrajectoryProjector};
pub use table::{TableConfig, TableModel, TableSegmenter};
pub use track::{MultiObjectTracker, TrackConfig, TrackSnapshot};
