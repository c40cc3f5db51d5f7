//! Detection overlays.
//!
//! Each detection gets a two-pixel box, a filled label bar above it in the
//! class color and white `"<class> <conf>"` text drawn with a 5x7 bitmap font.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;
use crate::palette::{color_for_class, LABEL_TEXT};

const LINE_WIDTH: i32 = 2;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_SCALE: i32 = 2;
const GLYPH_ADVANCE: i32 = (GLYPH_WIDTH + 1) * GLYPH_SCALE;
const LABEL_PADDING: i32 = 3;
/// Label bar height.
pub const LABEL_HEIGHT: i32 = GLYPH_HEIGHT * GLYPH_SCALE + 2 * LABEL_PADDING;

/// Copy of the frame with every detection drawn on it.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> RgbImage {
    let mut image = frame.image().clone();
    draw_detections(&mut image, detections);
    image
}

pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        draw_detection(image, detection);
    }
}

fn draw_detection(image: &mut RgbImage, detection: &Detection) {
    let color = color_for_class(detection.class_id, Some(&detection.class_name));
    let b = detection.bbox.clamped(image.width(), image.height());
    let (x1, y1) = (b.x1.round() as i32, b.y1.round() as i32);
    let (x2, y2) = (b.x2.round() as i32, b.y2.round() as i32);

    for inset in 0..LINE_WIDTH {
        if let Some(rect) = rect_from_corners(x1 + inset, y1 + inset, x2 - inset, y2 - inset) {
            draw_hollow_rect_mut(image, rect, color);
        }
    }

    let label = detection.label();
    let bar_width = text_width(&label) + 2 * LABEL_PADDING;
    // Move the bar inside the box when there is no room above it.
    let bar_top = if y1 >= LABEL_HEIGHT { y1 - LABEL_HEIGHT } else { y1 };
    if let Some(bar) = rect_from_corners(x1, bar_top, x1 + bar_width, bar_top + LABEL_HEIGHT) {
        draw_filled_rect_mut(image, bar, color);
    }
    draw_text(
        image,
        &label,
        x1 + LABEL_PADDING,
        bar_top + LABEL_PADDING,
        LABEL_TEXT,
    );
}

fn rect_from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Rect> {
    let (w, h) = (x2 - x1, y2 - y1);
    if w <= 0 || h <= 0 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size(w as u32, h as u32))
}

/// Pixel width of `text` at label scale.
pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

/// Draw `text` with its top-left corner at `(x, y)`. Pixels off the image are skipped.
pub fn draw_text(image: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as i32 * GLYPH_ADVANCE;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        let px = origin_x + col * GLYPH_SCALE + dx;
                        let py = y + row as i32 * GLYPH_SCALE + dy;
                        if px >= 0 && py >= 0 && px < width && py < height {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// 5x7 glyph rows, most significant bit on the left. Letters render uppercase.
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '%' => [0x19, 0x1A, 0x02, 0x04, 0x08, 0x0B, 0x13],
        ' ' => [0x00; 7],
        _ => [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F],
    }
}
