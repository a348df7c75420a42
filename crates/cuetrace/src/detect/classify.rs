//! Ball classification from white/black pixel-percentage patterns.
//!
//! Classification is global across one frame's detections: the single ball
//! with the highest white fraction is the cue ball and the one with the
//! highest black fraction is the eight-ball; of the rest, a white fraction
//! above the striped cutoff means striped, otherwise solid.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Ball class ids as used in box tables and label rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BallClass {
    Cue,
    Eight,
    Solid,
    Striped,
}

impl BallClass {
    pub fn id(self) -> u8 {
        match self {
            BallClass::Cue => 1,
            BallClass::Eight => 2,
            BallClass::Solid => 3,
            BallClass::Striped => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(BallClass::Cue),
            2 => Some(BallClass::Eight),
            3 => Some(BallClass::Solid),
            4 => Some(BallClass::Striped),
            _ => None,
        }
    }

    /// Overlay color (RGB) keyed by class.
    pub fn color(self) -> image::Rgb<u8> {
        match self {
            BallClass::Cue => image::Rgb([255, 255, 255]),
            BallClass::Eight => image::Rgb([0, 0, 0]),
            BallClass::Solid => image::Rgb([255, 0, 0]),
            BallClass::Striped => image::Rgb([0, 0, 255]),
        }
    }
}

/// White/black pixel percentages inside one ball's disc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallPattern {
    pub white_pct: f64,
    pub black_pct: f64,
}

/// Gray threshold above which a pixel counts as white.
pub const WHITE_THRESHOLD: u8 = 170;
/// Gray threshold below which a pixel counts as black.
pub const BLACK_THRESHOLD: u8 = 50;
/// White percentage above which a non-extreme ball is striped.
pub const STRIPED_CUTOFF: f64 = 13.0;

/// Measure white/black percentages of the disc at (cx, cy) with radius r
/// in the grayscale frame.
pub fn analyze_pattern(gray: &GrayImage, cx: f32, cy: f32, radius: f32) -> BallPattern {
    let (w, h) = gray.dimensions();
    let r2 = radius * radius;
    let x0 = ((cx - radius).floor().max(0.0)) as u32;
    let y0 = ((cy - radius).floor().max(0.0)) as u32;
    let x1 = ((cx + radius).ceil() as u32).min(w.saturating_sub(1));
    let y1 = ((cy + radius).ceil() as u32).min(h.saturating_sub(1));

    let mut total = 0u32;
    let mut white = 0u32;
    let mut black = 0u32;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            total += 1;
            let v = gray.get_pixel(x, y)[0];
            if v > WHITE_THRESHOLD {
                white += 1;
            }
            if v < BLACK_THRESHOLD {
                black += 1;
            }
        }
    }
    if total == 0 {
        return BallPattern {
            white_pct: 0.0,
            black_pct: 0.0,
        };
    }
    BallPattern {
        white_pct: white as f64 / total as f64 * 100.0,
        black_pct: black as f64 / total as f64 * 100.0,
    }
}

/// Assign classes to a set of patterns.
///
/// The global maxima are picked out first (strictly-greater comparison, so
/// the assignment is stable under input reordering), then the striped
/// cutoff splits the remainder.
pub fn classify_patterns(patterns: &[BallPattern]) -> Vec<BallClass> {
    let mut white_idx = None;
    let mut black_idx = None;
    let mut max_white = 0.0f64;
    let mut max_black = 0.0f64;
    for (i, p) in patterns.iter().enumerate() {
        if p.white_pct > max_white {
            max_white = p.white_pct;
            white_idx = Some(i);
        }
        if p.black_pct > max_black {
            max_black = p.black_pct;
            black_idx = Some(i);
        }
    }

    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if Some(i) == white_idx {
                BallClass::Cue
            } else if Some(i) == black_idx {
                BallClass::Eight
            } else if p.white_pct > STRIPED_CUTOFF {
                BallClass::Striped
            } else {
                BallClass::Solid
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(white: f64, black: f64) -> BallPattern {
        BallPattern {
            white_pct: white,
            black_pct: black,
        }
    }

    #[test]
    fn test_classify_basic() {
        let patterns = vec![pat(80.0, 1.0), pat(2.0, 70.0), pat(20.0, 5.0), pat(5.0, 8.0)];
        let classes = classify_patterns(&patterns);
        assert_eq!(
            classes,
            vec![
                BallClass::Cue,
                BallClass::Eight,
                BallClass::Striped,
                BallClass::Solid
            ]
        );
    }

    #[test]
    fn test_classify_idempotent_under_reordering() {
        let patterns = vec![pat(80.0, 1.0), pat(2.0, 70.0), pat(20.0, 5.0), pat(5.0, 8.0)];
        let classes = classify_patterns(&patterns);

        let mut shuffled: Vec<(usize, BallPattern)> = patterns.iter().cloned().enumerate().collect();
        shuffled.rotate_left(2);
        let reclassified = classify_patterns(
            &shuffled.iter().map(|(_, p)| *p).collect::<Vec<_>>(),
        );
        for (slot, (orig_idx, _)) in shuffled.iter().enumerate() {
            assert_eq!(
                reclassified[slot], classes[*orig_idx],
                "class for original ball {} changed under reordering",
                orig_idx
            );
        }
    }

    #[test]
    fn test_single_ball_is_cue() {
        // One bright ball: it is both maxima; white wins.
        let classes = classify_patterns(&[pat(50.0, 10.0)]);
        assert_eq!(classes, vec![BallClass::Cue]);
    }

    #[test]
    fn test_class_ids_round_trip() {
        for class in [
            BallClass::Cue,
            BallClass::Eight,
            BallClass::Solid,
            BallClass::Striped,
        ] {
            assert_eq!(BallClass::from_id(class.id()), Some(class));
        }
        assert_eq!(BallClass::from_id(0), None);
        assert_eq!(BallClass::from_id(5), None);
    }
}
