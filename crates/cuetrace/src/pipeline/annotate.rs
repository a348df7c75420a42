//! Frame annotation: table outline, corners, tracked boxes, label
//! colorization.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::point::Point;

use crate::detect::{BallClass, LABEL_TABLE};
use crate::geom::Rect;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 255]);
const CORNER: Rgb<u8> = Rgb([255, 0, 0]);

/// Closed polyline through the given contour points.
pub fn draw_outline(frame: &mut RgbImage, points: &[Point<i32>]) {
    if points.len() < 2 {
        return;
    }
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            frame,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            OUTLINE,
        );
    }
}

/// Red dots at each recovered corner.
pub fn draw_corners(frame: &mut RgbImage, corners: &[[f32; 2]]) {
    for c in corners {
        draw_filled_circle_mut(frame, (c[0].round() as i32, c[1].round() as i32), 4, CORNER);
    }
}

/// Class-colored hollow box for one tracked ball.
pub fn draw_ball_box(frame: &mut RgbImage, bbox: Rect, class: BallClass) {
    if bbox.width <= 0 || bbox.height <= 0 {
        return;
    }
    draw_hollow_rect_mut(
        frame,
        imageproc::rect::Rect::at(bbox.x, bbox.y).of_size(bbox.width as u32, bbox.height as u32),
        class.color(),
    );
}

/// Color-mapped view of a label raster: background gray, ball classes in
/// their overlay colors, table green.
pub fn colorize_labels(labels: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(labels.width(), labels.height());
    for (src, dst) in labels.pixels().zip(out.pixels_mut()) {
        *dst = match src[0] {
            0 => Rgb([128, 128, 128]),
            LABEL_TABLE => Rgb([0, 160, 60]),
            id => BallClass::from_id(id)
                .map(BallClass::color)
                .unwrap_or(Rgb([128, 128, 128])),
        };
    }
    out
}
