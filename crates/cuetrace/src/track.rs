//! Per-ball visual tracking with persistent correlation templates.
//!
//! One tracker is created per first-frame ball and never replaced. Each
//! update re-localizes the grayscale template inside a bounded search
//! window around the last position via normalized cross-correlation at a
//! few scales. A failed update transitions the track to `Lost`, which is
//! terminal: the ball is logged, excluded from further output, and never
//! re-seeded. Trajectories grow without bound on purpose — the projector
//! renders the full history.

use image::{GrayImage, RgbImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use crate::color::grayscale;
use crate::detect::{BallClass, BallObservation};
use crate::geom::Rect;

/// Configuration for the per-ball correlation trackers.
#[derive(Debug, Clone)]
pub struct TrackConfig {
    /// Search window margin around the last bounding box (pixels).
    pub search_radius: i32,
    /// Template scales tried on every update (multi-scale search).
    pub scales: Vec<f32>,
    /// Minimum correlation score for a successful update.
    pub min_score: f32,
    /// Template box inflation relative to the detection bounding box.
    pub template_inflate: f32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            search_radius: 25,
            scales: vec![0.95, 1.0, 1.05],
            min_score: 0.85,
            template_inflate: 1.5,
        }
    }
}

/// Tracker life cycle. `Lost` is terminal; there is no recovery
/// transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    Tracking,
    Lost,
}

/// One persistent ball track.
#[derive(Debug, Clone)]
pub struct TrackState {
    /// Stable ball id, fixed at initialization.
    pub id: usize,
    pub class: BallClass,
    pub bbox: Rect,
    pub phase: TrackPhase,
    /// Ordered center history since initialization.
    pub trajectory: Vec<[f32; 2]>,
    template: GrayImage,
}

/// Per-frame view of the still-tracked balls.
#[derive(Debug, Clone, Default)]
pub struct TrackSnapshot {
    pub ids: Vec<usize>,
    pub classes: Vec<BallClass>,
    pub centers: Vec<[f32; 2]>,
    pub trajectories: Vec<Vec<[f32; 2]>>,
}

/// Maintains the set of per-ball trackers across frames.
#[derive(Debug, Clone, Default)]
pub struct MultiObjectTracker {
    config: TrackConfig,
    tracks: Vec<TrackState>,
}

impl MultiObjectTracker {
    pub fn new(config: TrackConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
        }
    }

    /// Create one tracker per observation. The id set is fixed here for
    /// the rest of the run.
    pub fn initialize(&mut self, frame: &RgbImage, observations: &[BallObservation]) {
        let gray = grayscale(frame);
        self.tracks = observations
            .iter()
            .enumerate()
            .map(|(id, obs)| {
                let tmpl_box = inflate(obs.bbox, self.config.template_inflate)
                    .clip(frame.width(), frame.height());
                TrackState {
                    id,
                    class: obs.class,
                    bbox: tmpl_box,
                    phase: TrackPhase::Tracking,
                    trajectory: Vec::new(),
                    template: crop(&gray, tmpl_box),
                }
            })
            .collect();
        tracing::info!(tracks = self.tracks.len(), "trackers initialized");
    }

    pub fn is_initialized(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackState] {
        &self.tracks
    }

    /// Re-localize every live tracker in the new frame, appending centers
    /// to trajectories. Lost tracks stay lost and are excluded.
    pub fn update(&mut self, frame: &RgbImage) -> TrackSnapshot {
        let gray = grayscale(frame);
        let mut snapshot = TrackSnapshot::default();

        for track in &mut self.tracks {
            if track.phase == TrackPhase::Lost {
                continue;
            }
            match locate(&gray, track, &self.config) {
                Some(bbox) => {
                    track.bbox = bbox;
                    let center = bbox.center();
                    track.trajectory.push(center);

                    snapshot.ids.push(track.id);
                    snapshot.classes.push(track.class);
                    snapshot.centers.push(center);
                    snapshot.trajectories.push(track.trajectory.clone());
                }
                None => {
                    track.phase = TrackPhase::Lost;
                    tracing::warn!(id = track.id, "tracker lost its ball");
                }
            }
        }
        snapshot
    }
}

/// Correlation search over the window around the track's last box.
/// Returns the new bounding box, or `None` when no scale reaches the
/// minimum score.
fn locate(gray: &GrayImage, track: &TrackState, config: &TrackConfig) -> Option<Rect> {
    let window_box = inflate_by(track.bbox, config.search_radius).clip(gray.width(), gray.height());
    if window_box.width <= 0 || window_box.height <= 0 {
        return None;
    }
    let window = crop(gray, window_box);

    let mut best: Option<(f32, Rect)> = None;
    for &scale in &config.scales {
        let tw = (track.template.width() as f32 * scale).round() as u32;
        let th = (track.template.height() as f32 * scale).round() as u32;
        if tw < 2 || th < 2 || tw >= window.width() || th >= window.height() {
            continue;
        }
        let tmpl = image::imageops::resize(
            &track.template,
            tw,
            th,
            image::imageops::FilterType::Triangle,
        );

        let scores = match_template(
            &window,
            &tmpl,
            MatchTemplateMethod::CrossCorrelationNormalized,
        );
        let extremes = find_extremes(&scores);
        let score = extremes.max_value;
        if !score.is_finite() {
            continue;
        }
        let better = match &best {
            Some((s, _)) => score > *s,
            None => true,
        };
        if better {
            let (mx, my) = extremes.max_value_location;
            best = Some((
                score,
                Rect::new(
                    window_box.x + mx as i32,
                    window_box.y + my as i32,
                    tw as i32,
                    th as i32,
                ),
            ));
        }
    }

    match best {
        Some((score, bbox)) if score >= config.min_score => Some(bbox),
        _ => None,
    }
}

fn inflate(r: Rect, factor: f32) -> Rect {
    let w = (r.width as f32 * factor).round() as i32;
    let h = (r.height as f32 * factor).round() as i32;
    Rect::new(r.x - (w - r.width) / 2, r.y - (h - r.height) / 2, w, h)
}

fn inflate_by(r: Rect, margin: i32) -> Rect {
    Rect::new(
        r.x - margin,
        r.y - margin,
        r.width + 2 * margin,
        r.height + 2 * margin,
    )
}

fn crop(gray: &GrayImage, r: Rect) -> GrayImage {
    image::imageops::crop_imm(
        gray,
        r.x.max(0) as u32,
        r.y.max(0) as u32,
        r.width.max(0) as u32,
        r.height.max(0) as u32,
    )
    .to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn ball_frame(positions: &[(i32, i32)]) -> RgbImage {
        let mut img = RgbImage::from_pixel(160, 120, Rgb([30, 90, 45]));
        for &(x, y) in positions {
            imageproc::drawing::draw_filled_circle_mut(&mut img, (x, y), 8, Rgb([240, 240, 240]));
        }
        img
    }

    fn obs(cx: f32, cy: f32, class: BallClass) -> BallObservation {
        BallObservation {
            center: [cx, cy],
            radius: 8.0,
            bbox: Rect::new(cx as i32 - 8, cy as i32 - 8, 16, 16),
            class,
            white_pct: 0.0,
            black_pct: 0.0,
        }
    }

    #[test]
    fn test_tracks_follow_moving_ball() {
        let mut tracker = MultiObjectTracker::default();
        tracker.initialize(&ball_frame(&[(40, 60)]), &[obs(40.0, 60.0, BallClass::Cue)]);

        let mut x = 40;
        for step in 1..=4 {
            x += 4;
            let snap = tracker.update(&ball_frame(&[(x, 60)]));
            assert_eq!(snap.ids, vec![0], "ball lost at step {}", step);
            let c = snap.centers[0];
            let err = ((c[0] - x as f32).powi(2) + (c[1] - 60.0).powi(2)).sqrt();
            assert!(err < 4.0, "step {}: center {:?} vs x={} err={}", step, c, x, err);
            assert_eq!(snap.trajectories[0].len(), step);
        }
    }

    #[test]
    fn test_ids_stable_across_updates() {
        let mut tracker = MultiObjectTracker::default();
        tracker.initialize(
            &ball_frame(&[(40, 40), (110, 80)]),
            &[obs(40.0, 40.0, BallClass::Cue), obs(110.0, 80.0, BallClass::Eight)],
        );

        let snap = tracker.update(&ball_frame(&[(42, 40), (112, 80)]));
        assert_eq!(snap.ids, vec![0, 1]);
        assert_eq!(snap.classes, vec![BallClass::Cue, BallClass::Eight]);
        assert!(snap.centers[0][0] < snap.centers[1][0]);
    }

    #[test]
    fn test_lost_track_is_terminal() {
        let mut tracker = MultiObjectTracker::default();
        tracker.initialize(&ball_frame(&[(40, 60)]), &[obs(40.0, 60.0, BallClass::Cue)]);

        // Ball vanishes into a black frame: correlation has nothing to bind to.
        let black = RgbImage::new(160, 120);
        let snap = tracker.update(&black);
        assert!(snap.ids.is_empty());
        assert_eq!(tracker.tracks()[0].phase, TrackPhase::Lost);

        // No recovery even when the ball reappears where it was.
        let snap = tracker.update(&ball_frame(&[(40, 60)]));
        assert!(snap.ids.is_empty());
        assert_eq!(tracker.tracks()[0].phase, TrackPhase::Lost);
    }

    #[test]
    fn test_tracking_survives_pixel_noise() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut noisy = |positions: &[(i32, i32)]| {
            let mut img = ball_frame(positions);
            for p in img.pixels_mut() {
                for c in 0..3 {
                    let v = p[c] as i16 + rng.gen_range(-6..=6);
                    p[c] = v.clamp(0, 255) as u8;
                }
            }
            img
        };

        let mut tracker = MultiObjectTracker::default();
        tracker.initialize(&noisy(&[(40, 60)]), &[obs(40.0, 60.0, BallClass::Cue)]);

        for step in 1..=3 {
            let x = 40 + 3 * step;
            let snap = tracker.update(&noisy(&[(x, 60)]));
            assert_eq!(snap.ids, vec![0], "ball lost under noise at step {}", step);
            assert!((snap.centers[0][0] - x as f32).abs() < 5.0);
        }
    }

    #[test]
    fn test_trajectory_accumulates_full_history() {
        let mut tracker = MultiObjectTracker::default();
        tracker.initialize(&ball_frame(&[(40, 60)]), &[obs(40.0, 60.0, BallClass::Cue)]);

        for i in 0..6 {
            tracker.update(&ball_frame(&[(40 + i, 60)]));
        }
        assert_eq!(tracker.tracks()[0].trajectory.len(), 6);
    }
}
