//! Bird's-eye trajectory projection onto a canonical top-down table canvas.
//!
//! The four table corners, sorted clockwise by polar angle around their
//! centroid, are mapped by homography onto a fixed small rectangle inside
//! the minimap canvas. Clockwise sorting alone leaves a 90° ambiguity
//! (which physical corner is "first"); it is resolved by pushing the
//! destination rectangle's own corners through the transform and comparing
//! the diagonals of the resulting quadrilateral — a "vertical" table means
//! the corner ordering is cyclically rotated by one and the homography
//! recomputed. Ball dots and trajectory polylines are rendered onto the
//! minimap, which is composited into the bottom-left frame corner.

use image::{Rgb, RgbImage};
use nalgebra::Matrix3;

use crate::error::PipelineError;
use crate::geom::distance;
use crate::homography::{estimate_homography_dlt, project_points};
use crate::track::TrackSnapshot;

/// Configuration for the minimap projection.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Minimap canvas size on the output frame.
    pub canvas_w: u32,
    pub canvas_h: u32,
    /// Horizontal/vertical insets of the destination rectangle, matching
    /// the playing-surface border of the background art.
    pub inset_x: f32,
    pub inset_y: f32,
    /// Rendered ball dot radius.
    pub dot_radius: i32,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            canvas_w: 300,
            canvas_h: 150,
            inset_x: 10.0,
            inset_y: 15.0,
            dot_radius: 5,
        }
    }
}

/// Projects tracked balls and trajectories onto a minimap insert.
#[derive(Debug, Clone)]
pub struct TrajectoryProjector {
    config: ProjectorConfig,
    minimap: RgbImage,
    /// Homography cache keyed by the corner set it was computed from.
    cached: Option<([[f32; 2]; 4], Matrix3<f64>)>,
}

impl TrajectoryProjector {
    /// Projector with a synthesized plain-felt minimap background.
    pub fn new(config: ProjectorConfig) -> Self {
        let minimap = synth_minimap(config.canvas_w, config.canvas_h);
        Self {
            config,
            minimap,
            cached: None,
        }
    }

    /// Projector with a table background image, resized to the canvas.
    pub fn with_background(config: ProjectorConfig, background: &RgbImage) -> Self {
        let minimap = image::imageops::resize(
            background,
            config.canvas_w,
            config.canvas_h,
            image::imageops::FilterType::Triangle,
        );
        Self {
            config,
            minimap,
            cached: None,
        }
    }

    /// Destination rectangle corners inside the canvas, clockwise from
    /// top-left.
    fn destination_corners(&self) -> [[f32; 2]; 4] {
        let c = &self.config;
        let (w, h) = (c.canvas_w as f32, c.canvas_h as f32);
        [
            [c.inset_x, c.inset_y],
            [w - c.inset_x, c.inset_y],
            [w - c.inset_x, h - c.inset_y],
            [c.inset_x, h - c.inset_y],
        ]
    }

    /// Homography from frame coordinates onto the canvas, recomputed only
    /// when the corner set changes.
    pub fn homography_for(&mut self, corners: &[[f32; 2]]) -> Result<Matrix3<f64>, PipelineError> {
        if corners.len() != 4 {
            return Err(PipelineError::DegenerateGeometry(format!(
                "projection needs exactly 4 table corners, got {}",
                corners.len()
            )));
        }
        let mut sorted = sort_corners_clockwise(corners);
        let key = [sorted[0], sorted[1], sorted[2], sorted[3]];
        if let Some((cached_key, h)) = &self.cached {
            if *cached_key == key {
                return Ok(*h);
            }
        }

        let dst = self.destination_corners();
        let mut h = fit_corners(&sorted, &dst)?;

        // Disambiguate portrait vs landscape framing: push the destination
        // rectangle through the transform and compare the diagonals of the
        // resulting quadrilateral.
        let probe = project_points(&h, &dst);
        let d1 = distance(probe[2], probe[0]);
        let d2 = distance(probe[3], probe[1]);
        if d1 > d2 {
            sorted.rotate_left(1);
            h = fit_corners(&sorted, &dst)?;
        }

        self.cached = Some((key, h));
        Ok(h)
    }

    /// Render the minimap overlay for one frame's tracking snapshot and
    /// composite it onto the bottom-left corner of the frame.
    pub fn project(
        &mut self,
        frame: &mut RgbImage,
        snapshot: &TrackSnapshot,
        corners: &[[f32; 2]],
    ) -> Result<(), PipelineError> {
        let c = self.config.clone();
        if c.canvas_w > frame.width() || c.canvas_h > frame.height() {
            return Err(PipelineError::OverlayDoesNotFit {
                overlay_w: c.canvas_w,
                overlay_h: c.canvas_h,
                frame_w: frame.width(),
                frame_h: frame.height(),
            });
        }

        let h = self.homography_for(corners)?;
        let mut canvas = self.minimap.clone();

        // Trajectories first so dots draw on top; each trajectory is its
        // own point sequence, transformed as a unit.
        for trajectory in &snapshot.trajectories {
            let projected = project_points(&h, trajectory);
            for w in projected.windows(2) {
                imageproc::drawing::draw_line_segment_mut(
                    &mut canvas,
                    (w[0][0], w[0][1]),
                    (w[1][0], w[1][1]),
                    Rgb([255, 255, 0]),
                );
            }
        }

        let centers = project_points(&h, &snapshot.centers);
        for (pos, class) in centers.iter().zip(snapshot.classes.iter()) {
            imageproc::drawing::draw_filled_circle_mut(
                &mut canvas,
                (pos[0].round() as i32, pos[1].round() as i32),
                c.dot_radius,
                class.color(),
            );
        }

        let y0 = frame.height() - c.canvas_h;
        image::imageops::overlay(frame, &canvas, 0, y0 as i64);
        Ok(())
    }
}

/// Sort corner points clockwise by polar angle around their centroid.
pub fn sort_corners_clockwise(corners: &[[f32; 2]]) -> Vec<[f32; 2]> {
    let n = corners.len() as f32;
    let cx = corners.iter().map(|p| p[0]).sum::<f32>() / n;
    let cy = corners.iter().map(|p| p[1]).sum::<f32>() / n;

    let mut sorted = corners.to_vec();
    sorted.sort_by(|a, b| {
        let aa = (a[1] - cy).atan2(a[0] - cx);
        let ab = (b[1] - cy).atan2(b[0] - cx);
        aa.partial_cmp(&ab).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

fn fit_corners(src: &[[f32; 2]], dst: &[[f32; 2]; 4]) -> Result<Matrix3<f64>, PipelineError> {
    let src64: Vec<[f64; 2]> = src.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();
    let dst64: Vec<[f64; 2]> = dst.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();
    Ok(estimate_homography_dlt(&src64, &dst64)?)
}

/// Plain-felt minimap used when no background art is configured.
fn synth_minimap(w: u32, h: u32) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb([92, 61, 26]));
    for y in 0..h {
        for x in 0..w {
            if x >= 8 && x < w - 8 && y >= 8 && y < h - 8 {
                img.put_pixel(x, y, Rgb([22, 108, 54]));
            }
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BallClass;
    use crate::homography::{invert, project};

    fn skewed_corners() -> Vec<[f32; 2]> {
        // A convex quad wider than tall, in scrambled order
        vec![
            [580.0, 120.0],
            [90.0, 110.0],
            [60.0, 380.0],
            [620.0, 400.0],
        ]
    }

    #[test]
    fn test_sort_corners_is_clockwise() {
        let sorted = sort_corners_clockwise(&skewed_corners());
        // Polar angles around the centroid must be increasing
        let cx = sorted.iter().map(|p| p[0]).sum::<f32>() / 4.0;
        let cy = sorted.iter().map(|p| p[1]).sum::<f32>() / 4.0;
        let angles: Vec<f32> = sorted
            .iter()
            .map(|p| (p[1] - cy).atan2(p[0] - cx))
            .collect();
        for w in angles.windows(2) {
            assert!(w[0] < w[1], "angles not increasing: {:?}", angles);
        }
    }

    #[test]
    fn test_projection_round_trip() {
        let mut projector = TrajectoryProjector::new(ProjectorConfig::default());
        let corners = skewed_corners();
        let h = projector.homography_for(&corners).unwrap();
        let h_inv = invert(&h).unwrap();

        // The canonical destination corners must come back to the sorted
        // (possibly rotated) table corners through the inverse transform.
        let dst = projector.destination_corners();
        for d in dst {
            let back = project(&h_inv, d[0] as f64, d[1] as f64);
            let hit = corners.iter().any(|c| {
                ((back[0] - c[0] as f64).powi(2) + (back[1] - c[1] as f64).powi(2)).sqrt() < 1e-3
            });
            assert!(hit, "{:?} did not map back onto a table corner", back);
        }
    }

    #[test]
    fn test_homography_is_cached() {
        let mut projector = TrajectoryProjector::new(ProjectorConfig::default());
        let corners = skewed_corners();
        let h1 = projector.homography_for(&corners).unwrap();
        let h2 = projector.homography_for(&corners).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_wrong_corner_count_is_degenerate() {
        let mut projector = TrajectoryProjector::new(ProjectorConfig::default());
        let err = projector
            .homography_for(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]])
            .unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_overlay_must_fit_frame() {
        let mut projector = TrajectoryProjector::new(ProjectorConfig::default());
        let mut tiny = RgbImage::new(100, 100);
        let err = projector
            .project(&mut tiny, &TrackSnapshot::default(), &skewed_corners())
            .unwrap_err();
        assert!(matches!(err, PipelineError::OverlayDoesNotFit { .. }));
    }

    #[test]
    fn test_project_draws_overlay() {
        let mut projector = TrajectoryProjector::new(ProjectorConfig::default());
        let mut frame = RgbImage::new(640, 480);
        let snapshot = TrackSnapshot {
            ids: vec![0],
            classes: vec![BallClass::Cue],
            centers: vec![[300.0, 250.0]],
            trajectories: vec![vec![[280.0, 250.0], [300.0, 250.0]]],
        };
        projector
            .project(&mut frame, &snapshot, &skewed_corners())
            .unwrap();

        // Bottom-left corner now holds the minimap (no longer black)
        let p = frame.get_pixel(20, 480 - 75);
        assert_ne!(*p, Rgb([0, 0, 0]));
    }
}
