//! Local contrast enhancement for uneven table lighting.
//!
//! The lightness channel is equalized in Lab space so chroma is untouched;
//! felt stays felt-colored while shadowed balls gain separation.

use image::{GrayImage, RgbImage};

use crate::color::{lab_to_rgb, rgb_to_lab};

/// Histogram-equalize the L channel of the image in Lab space.
pub fn enhance_contrast(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();

    let mut l_plane = GrayImage::new(w, h);
    let mut ab = vec![(0f32, 0f32); (w * h) as usize];
    for (i, (p, l)) in img.pixels().zip(l_plane.pixels_mut()).enumerate() {
        let (lv, a, b) = rgb_to_lab(*p);
        l[0] = (lv * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8;
        ab[i] = (a, b);
    }

    let equalized = imageproc::contrast::equalize_histogram(&l_plane);

    let mut out = RgbImage::new(w, h);
    for (i, (l, dst)) in equalized.pixels().zip(out.pixels_mut()).enumerate() {
        let lv = l[0] as f32 * 100.0 / 255.0;
        *dst = lab_to_rgb(lv, ab[i].0, ab[i].1);
    }
    out
}
