//! Pipeline error taxonomy.
//!
//! Input-validation and missing-resource failures abort the affected
//! operation; degenerate geometry suppresses the affected output for that
//! frame; tracking loss is not represented here at all (it is logged and the
//! ball is excluded from further output, never escalated).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Frame and mask sizes or channel layouts disagree.
    #[error("dimension mismatch: frame is {frame_w}x{frame_h}, mask is {mask_w}x{mask_h}")]
    DimensionMismatch {
        frame_w: u32,
        frame_h: u32,
        mask_w: u32,
        mask_h: u32,
    },

    /// Table thresholding produced no foreground component.
    #[error("empty table mask: no dominant-hue component found in frame")]
    EmptyTableMask,

    /// Geometry that would propagate NaN/garbage downstream.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Ground-truth file, mask, or overlay resource could not be read.
    #[error("missing resource {path}: {reason}")]
    MissingResource { path: PathBuf, reason: String },

    /// Ground-truth file exists but its contents are not usable.
    #[error("malformed ground truth {path}: {reason}")]
    MalformedGroundTruth { path: PathBuf, reason: String },

    /// The minimap placement rectangle does not fit inside the frame.
    #[error("projection overlay ({overlay_w}x{overlay_h}) does not fit frame ({frame_w}x{frame_h})")]
    OverlayDoesNotFit {
        overlay_w: u32,
        overlay_h: u32,
        frame_w: u32,
        frame_h: u32,
    },

    #[error(transparent)]
    Homography(#[from] crate::homography::HomographyError),
}
