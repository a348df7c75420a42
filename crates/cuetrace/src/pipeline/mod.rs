//! Full per-clip analysis pipeline.
//!
//! [`FramePipeline`] ties the stages together: table segmentation on the
//! first frame (optionally every frame), ball detection + tracker seeding,
//! per-frame tracking and minimap projection, annotated-frame rendering,
//! final-frame re-detection, and end-of-run scoring against ground truth.

mod annotate;
mod result;
mod run;

pub use annotate::colorize_labels;
pub use result::FrameAnalysis;
pub use run::FramePipeline;

use crate::detect::DetectConfig;
use crate::project::ProjectorConfig;
use crate::table::TableConfig;
use crate::track::TrackConfig;

/// Top-level pipeline configuration, one section per stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Re-run table segmentation on every frame instead of reusing the
    /// first-frame model (the camera is fixed, so this is normally off).
    pub segment_every_frame: bool,
    pub table: TableConfig,
    pub detect: DetectConfig,
    pub track: TrackConfig,
    pub projector: ProjectorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_every_frame: false,
            table: TableConfig::default(),
            detect: DetectConfig::default(),
            track: TrackConfig::default(),
            projector: ProjectorConfig::default(),
        }
    }
}
