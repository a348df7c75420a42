//! Circle-candidate transform via gradient-voting radial symmetry.
//!
//! For each strong-gradient pixel of the input mask, votes are cast along
//! the gradient direction at distances in [r_min, r_max]; circular blobs
//! produce accumulator peaks at their centers. Peaks are extracted with
//! non-maximum suppression at the configured minimum spacing, then a radius
//! is recovered per peak by scoring perimeter gradient support over the
//! radius range.

use image::GrayImage;

/// Configuration for the circle transform.
#[derive(Debug, Clone)]
pub struct CircleConfig {
    /// Minimum circle radius (pixels).
    pub r_min: f32,
    /// Maximum circle radius (pixels).
    pub r_max: f32,
    /// Minimum spacing between accepted centers (pixels).
    pub min_dist: f32,
    /// Gradient magnitude threshold (fraction of max gradient).
    pub grad_threshold: f32,
    /// Minimum accumulator value for a candidate (fraction of max).
    pub min_vote_frac: f32,
    /// Gaussian sigma for accumulator smoothing.
    pub accum_sigma: f32,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            r_min: 5.0,
            r_max: 15.0,
            min_dist: 18.0,
            grad_threshold: 0.05,
            min_vote_frac: 0.25,
            accum_sigma: 2.0,
        }
    }
}

/// A circle candidate: center, radius, and vote score.
#[derive(Debug, Clone, Copy)]
pub struct CircleCandidate {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
    pub score: f32,
}

/// Deposit a weighted vote into the accumulator using bilinear interpolation.
#[inline]
fn bilinear_add(accum: &mut [f32], w: u32, x: f32, y: f32, weight: f32) {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    if x0 + 1 >= w {
        return;
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let stride = w as usize;
    let base = y0 as usize * stride + x0 as usize;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

/// Detect circle candidates in a binary mask.
///
/// Returns candidates sorted by score (highest first).
pub fn find_circles(mask: &GrayImage, config: &CircleConfig) -> Vec<CircleCandidate> {
    let (w, h) = mask.dimensions();
    if w < 4 || h < 4 {
        return Vec::new();
    }

    let gx = imageproc::gradients::horizontal_scharr(mask);
    let gy = imageproc::gradients::vertical_scharr(mask);

    // Gradient magnitude plane, reused for radius scoring
    let n = (w * h) as usize;
    let mut mag = vec![0.0f32; n];
    let mut max_mag: f32 = 0.0;
    for y in 0..h {
        for x in 0..w {
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let m = (gxv * gxv + gyv * gyv).sqrt();
            mag[(y * w + x) as usize] = m;
            if m > max_mag {
                max_mag = m;
            }
        }
    }
    if max_mag < 1e-6 {
        return Vec::new();
    }
    let threshold = config.grad_threshold * max_mag;

    // Vote accumulation along ±gradient
    let mut accum = vec![0.0f32; n];
    for y in 0..h {
        for x in 0..w {
            let m = mag[(y * w + x) as usize];
            if m < threshold {
                continue;
            }
            let dx = gx.get_pixel(x, y)[0] as f32 / m;
            let dy = gy.get_pixel(x, y)[0] as f32 / m;

            for &sign in &[-1.0f32, 1.0] {
                let mut r = config.r_min;
                while r <= config.r_max {
                    let vx = x as f32 + sign * dx * r;
                    let vy = y as f32 + sign * dy * r;
                    if vx >= 0.0 && vx < (w - 1) as f32 && vy >= 0.0 && vy < (h - 1) as f32 {
                        bilinear_add(&mut accum, w, vx, vy, m);
                    }
                    r += 1.0;
                }
            }
        }
    }

    let Some(accum_img) = image::ImageBuffer::<image::Luma<f32>, Vec<f32>>::from_raw(w, h, accum)
    else {
        return Vec::new();
    };
    let smoothed = imageproc::filter::gaussian_blur_f32(&accum_img, config.accum_sigma);
    let smoothed = smoothed.as_raw();

    let max_val = smoothed.iter().cloned().fold(0.0f32, f32::max);
    if max_val < 1e-6 {
        return Vec::new();
    }
    let vote_threshold = config.min_vote_frac * max_val;
    let nms_r = config.min_dist.ceil().max(1.0) as i32;

    // Non-maximum suppression over the min-spacing window
    let mut candidates = Vec::new();
    for y in 0..h as i32 {
        for x in 0..w as i32 {
            let val = smoothed[(y as u32 * w + x as u32) as usize];
            if val < vote_threshold {
                continue;
            }
            let mut is_peak = true;
            'nms: for dy in -nms_r..=nms_r {
                for dx in -nms_r..=nms_r {
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                        continue;
                    }
                    let nv = smoothed[(ny as u32 * w + nx as u32) as usize];
                    if nv > val || (nv == val && (dy, dx) < (0, 0)) {
                        is_peak = false;
                        break 'nms;
                    }
                }
            }
            if !is_peak {
                continue;
            }
            let radius = estimate_radius(&mag, w, h, x as f32, y as f32, config);
            candidates.push(CircleCandidate {
                cx: x as f32,
                cy: y as f32,
                radius,
                score: val,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates
}

/// Pick the radius whose perimeter collects the most gradient support.
fn estimate_radius(mag: &[f32], w: u32, h: u32, cx: f32, cy: f32, config: &CircleConfig) -> f32 {
    const SAMPLES: usize = 32;
    let mut best_r = config.r_min;
    let mut best_score = f32::MIN;

    let mut r = config.r_min;
    while r <= config.r_max {
        let mut score = 0.0f32;
        for k in 0..SAMPLES {
            let theta = k as f32 / SAMPLES as f32 * std::f32::consts::TAU;
            let sx = cx + r * theta.cos();
            let sy = cy + r * theta.sin();
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                continue;
            }
            score += mag[(sy as u32 * w + sx as u32) as usize];
        }
        if score > best_score {
            best_score = score;
            best_r = r;
        }
        r += 1.0;
    }
    best_r
}
