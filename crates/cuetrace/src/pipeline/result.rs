//! Per-frame pipeline output.

use image::RgbImage;

use crate::track::TrackSnapshot;

/// Everything the pipeline produces for one frame.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// Zero-based frame index within the clip.
    pub index: usize,
    /// Input frame with table outline, corners, ball boxes, and the minimap
    /// insert rendered on top.
    pub annotated: RgbImage,
    /// Live tracks at this frame.
    pub snapshot: TrackSnapshot,
    /// Table corners in effect for this frame.
    pub corners: Vec<[f32; 2]>,
}
