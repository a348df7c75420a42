//! Clip dataset layout and ground-truth loading.
//!
//! A clip directory holds the frame sequence plus the two annotated frames
//! used for scoring:
//!
//! ```text
//! clip/
//!   frames/*.png                          (lexicographic frame order)
//!   masks/frame_first.png                 (8-bit label raster)
//!   masks/frame_last.png
//!   bounding_boxes/frame_first_bbox.txt   (x y w h class per row)
//!   bounding_boxes/frame_last_bbox.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::error::PipelineError;
use crate::geom::Rect;
use crate::metrics::{BoxRecord, NUM_BOX_CLASSES};

/// Ground-truth annotations for the first and last frame of a clip.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub first_boxes: Vec<BoxRecord>,
    pub last_boxes: Vec<BoxRecord>,
    pub first_mask: GrayImage,
    pub last_mask: GrayImage,
}

impl GroundTruth {
    /// Load both annotated frames from the clip directory.
    pub fn load(clip_dir: &Path) -> Result<Self, PipelineError> {
        let boxes_dir = clip_dir.join("bounding_boxes");
        let masks_dir = clip_dir.join("masks");
        Ok(Self {
            first_boxes: load_box_file(&boxes_dir.join("frame_first_bbox.txt"))?,
            last_boxes: load_box_file(&boxes_dir.join("frame_last_bbox.txt"))?,
            first_mask: load_label_mask(&masks_dir.join("frame_first.png"))?,
            last_mask: load_label_mask(&masks_dir.join("frame_last.png"))?,
        })
    }
}

/// Parse a whitespace-separated box table: five integers per non-empty row,
/// `x y w h class`.
pub fn load_box_file(path: &Path) -> Result<Vec<BoxRecord>, PipelineError> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::MissingResource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<i64> = line
            .split_whitespace()
            .map(|tok| tok.parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|e| malformed(path, lineno, &e.to_string()))?;
        if fields.len() != 5 {
            return Err(malformed(
                path,
                lineno,
                &format!("expected 5 fields, got {}", fields.len()),
            ));
        }
        let class = fields[4];
        if class < 1 || class > NUM_BOX_CLASSES as i64 {
            return Err(malformed(path, lineno, &format!("class {class} out of range")));
        }
        records.push(BoxRecord {
            rect: Rect::new(
                fields[0] as i32,
                fields[1] as i32,
                fields[2] as i32,
                fields[3] as i32,
            ),
            class: class as u8,
        });
    }
    Ok(records)
}

/// Load an 8-bit label raster; any color input collapses to its luma plane.
pub fn load_label_mask(path: &Path) -> Result<GrayImage, PipelineError> {
    let img = image::open(path).map_err(|e| PipelineError::MissingResource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(img.into_luma8())
}

fn malformed(path: &Path, lineno: usize, reason: &str) -> PipelineError {
    PipelineError::MalformedGroundTruth {
        path: path.to_path_buf(),
        reason: format!("line {}: {}", lineno + 1, reason),
    }
}

/// Frame paths of a clip, sorted lexicographically.
pub fn frame_paths(clip_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let frames_dir = clip_dir.join("frames");
    let entries = fs::read_dir(&frames_dir).map_err(|e| PipelineError::MissingResource {
        path: frames_dir.clone(),
        reason: e.to_string(),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(PipelineError::MissingResource {
            path: frames_dir,
            reason: "no .png frames found".into(),
        });
    }
    Ok(paths)
}
