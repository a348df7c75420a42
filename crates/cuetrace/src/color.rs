//! Pixel-level color space conversions.
//!
//! HSV follows the OpenCV 8-bit convention (hue in [0, 180), saturation and
//! value in [0, 255]) so the hand-tuned threshold bands from the scene
//! carry over unchanged. Lab is CIE L*a*b* under D65, with L scaled to
//! [0, 255] for histogram equalization.

use image::{GrayImage, Rgb, RgbImage};

/// Hue in degrees halved to [0, 180), saturation/value in [0, 255].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: u8,
    pub v: u8,
}

/// Convert one RGB pixel to HSV (OpenCV ranges).
pub fn rgb_to_hsv(p: Rgb<u8>) -> Hsv {
    let r = p[0] as f32;
    let g = p[1] as f32;
    let b = p[2] as f32;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let h_deg = if delta < f32::EPSILON {
        0.0
    } else if (max - r).abs() < f32::EPSILON {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < f32::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let h_deg = if h_deg < 0.0 { h_deg + 360.0 } else { h_deg };

    Hsv {
        h: h_deg / 2.0,
        s: s.round().clamp(0.0, 255.0) as u8,
        v: v.round() as u8,
    }
}

/// Test a pixel against an inclusive HSV band.
///
/// The hue band may extend past the [0, 180) wrap; bounds are compared
/// after wrapping so a band like 175..185 matches hues near zero.
pub fn hsv_in_band(hsv: Hsv, h_lo: f32, h_hi: f32, s_lo: u8, s_hi: u8, v_lo: u8, v_hi: u8) -> bool {
    if hsv.s < s_lo || hsv.s > s_hi || hsv.v < v_lo || hsv.v > v_hi {
        return false;
    }
    let h = hsv.h;
    if h_lo <= h_hi {
        h >= h_lo && h <= h_hi
    } else {
        // Wrapped band
        h >= h_lo || h <= h_hi
    }
}

// ── Lab ──────────────────────────────────────────────────────────────────

const XN: f32 = 0.950456;
const ZN: f32 = 1.088754;

fn srgb_to_linear(c: f32) -> f32 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c > 0.0031308 {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * c
    }
}

fn lab_f(t: f32) -> f32 {
    if t > 0.008856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let t3 = t * t * t;
    if t3 > 0.008856 {
        t3
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// One RGB pixel to (L, a, b) with L in [0, 100], a/b roughly [-128, 127].
pub fn rgb_to_lab(p: Rgb<u8>) -> (f32, f32, f32) {
    let r = srgb_to_linear(p[0] as f32 / 255.0);
    let g = srgb_to_linear(p[1] as f32 / 255.0);
    let b = srgb_to_linear(p[2] as f32 / 255.0);

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / XN;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / ZN;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    (116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

/// Inverse of [`rgb_to_lab`].
pub fn lab_to_rgb(l: f32, a: f32, b: f32) -> Rgb<u8> {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let x = lab_f_inv(fx) * XN;
    let y = lab_f_inv(fy);
    let z = lab_f_inv(fz) * ZN;

    let r = 3.240479 * x - 1.537150 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875992 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    let to8 = |c: f32| (linear_to_srgb(c).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([to8(r), to8(g), to8(bl)])
}

/// Luminance channel of an RGB image (BT.601 weights).
pub fn grayscale(img: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (src, dst) in img.pixels().zip(out.pixels_mut()) {
        let y = 0.299 * src[0] as f32 + 0.587 * src[1] as f32 + 0.114 * src[2] as f32;
        dst[0] = y.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        // OpenCV convention: green hue is 60, blue 120
        let g = rgb_to_hsv(Rgb([0, 255, 0]));
        assert!((g.h - 60.0).abs() < 0.5, "green hue = {}", g.h);
        assert_eq!(g.s, 255);
        assert_eq!(g.v, 255);

        let b = rgb_to_hsv(Rgb([0, 0, 255]));
        assert!((b.h - 120.0).abs() < 0.5, "blue hue = {}", b.h);

        let gray = rgb_to_hsv(Rgb([128, 128, 128]));
        assert_eq!(gray.s, 0);
    }

    #[test]
    fn test_hsv_band_wrap() {
        let red = rgb_to_hsv(Rgb([255, 10, 10]));
        assert!(hsv_in_band(red, 175.0, 5.0, 0, 255, 0, 255));
        let green = rgb_to_hsv(Rgb([10, 255, 10]));
        assert!(!hsv_in_band(green, 175.0, 5.0, 0, 255, 0, 255));
    }

    #[test]
    fn test_lab_round_trip() {
        for &p in &[
            Rgb([0u8, 0, 0]),
            Rgb([255, 255, 255]),
            Rgb([30, 120, 60]),
            Rgb([200, 40, 90]),
        ] {
            let (l, a, b) = rgb_to_lab(p);
            let back = lab_to_rgb(l, a, b);
            for c in 0..3 {
                let diff = (p[c] as i32 - back[c] as i32).abs();
                assert!(diff <= 2, "{:?} -> {:?} channel {}", p, back, c);
            }
        }
    }

    #[test]
    fn test_lab_white_is_bright() {
        let (l, a, b) = rgb_to_lab(Rgb([255, 255, 255]));
        assert!((l - 100.0).abs() < 0.5);
        assert!(a.abs() < 1.0 && b.abs() < 1.0);
    }
}
