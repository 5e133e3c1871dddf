// CPU rendering
// Rasterises the overlay into an ARGB8888 (little-endian BGRA, premultiplied) canvas

use crate::app::RESIZE_MARGIN;
use image::RgbaImage;

/// Prompt shown until an image is dropped
pub const PLACEHOLDER_TEXT: &str = "Drop an image here";

/// Placeholder panel: black at alpha 50
const PANEL_COLOR: [u8; 4] = [0, 0, 0, 50];
const BORDER_COLOR: [u8; 4] = [128, 128, 128, 255];
const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];
const GRIP_COLOR: [u8; 4] = [150, 150, 150, 100];

const BORDER_WIDTH: u32 = 2;
const DASH_LEN: u32 = 8;
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const TEXT_SCALE: u32 = 2;

/// Convert a straight RGBA colour to premultiplied BGRA
fn to_bgra_premul(rgba: [u8; 4]) -> [u8; 4] {
    let a = rgba[3] as u32;
    let mul = |c: u8| ((c as u32 * a + 127) / 255) as u8;
    [mul(rgba[2]), mul(rgba[1]), mul(rgba[0]), rgba[3]]
}

/// Fill the canvas with fully transparent pixels
pub fn clear(canvas: &mut [u8]) {
    canvas.fill(0);
}

/// Scale `src` to the canvas with bilinear interpolation
pub fn render_image(src: &RgbaImage, canvas: &mut [u8], width: u32, height: u32) {
    let (img_width, img_height) = src.dimensions();
    if img_width == 0 || img_height == 0 || width == 0 || height == 0 {
        clear(canvas);
        return;
    }
    let src_data = src.as_raw();

    let scale_x = img_width as f32 / width as f32;
    let scale_y = img_height as f32 / height as f32;

    let get_pixel = |px: u32, py: u32| -> [u8; 4] {
        let idx = ((py * img_width + px) * 4) as usize;
        [
            src_data[idx],
            src_data[idx + 1],
            src_data[idx + 2],
            src_data[idx + 3],
        ]
    };

    for y in 0..height {
        // sample at pixel centres so edges are not biased toward the top-left
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (src_y.floor() as u32).min(img_height - 1);
        let y1 = (y0 + 1).min(img_height - 1);
        let fy = src_y - y0 as f32;

        for x in 0..width {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (src_x.floor() as u32).min(img_width - 1);
            let x1 = (x0 + 1).min(img_width - 1);
            let fx = src_x - x0 as f32;

            let p00 = get_pixel(x0, y0);
            let p10 = get_pixel(x1, y0);
            let p01 = get_pixel(x0, y1);
            let p11 = get_pixel(x1, y1);

            let interpolate = |c: usize| -> u8 {
                let v0 = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
                let v1 = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
                (v0 * (1.0 - fy) + v1 * fy).round().clamp(0.0, 255.0) as u8
            };

            let dst_idx = ((y * width + x) * 4) as usize;
            if dst_idx + 3 < canvas.len() {
                let px = to_bgra_premul([
                    interpolate(0),
                    interpolate(1),
                    interpolate(2),
                    interpolate(3),
                ]);
                canvas[dst_idx..dst_idx + 4].copy_from_slice(&px);
            }
        }
    }
}

/// Nearest-neighbour scaling, used while a resize gesture is in progress
pub fn render_image_fast(src: &RgbaImage, canvas: &mut [u8], width: u32, height: u32) {
    let (img_width, img_height) = src.dimensions();
    if img_width == 0 || img_height == 0 || width == 0 || height == 0 {
        clear(canvas);
        return;
    }
    let src_data = src.as_raw();

    // 16.16 fixed point steps
    let scale_x_fp = ((img_width as u64) << 16) / width as u64;
    let scale_y_fp = ((img_height as u64) << 16) / height as u64;
    let img_stride = img_width * 4;

    let x_lut: Vec<u32> = (0..width)
        .map(|x| (((x as u64 * scale_x_fp) >> 16) as u32).min(img_width - 1))
        .collect();

    for y in 0..height {
        let src_y = ((((y as u64) * scale_y_fp) >> 16) as u32).min(img_height - 1);
        let src_row_offset = (src_y * img_stride) as usize;
        let dst_row_offset = (y * width * 4) as usize;

        for (x, &src_x) in x_lut.iter().enumerate() {
            let src_idx = src_row_offset + (src_x * 4) as usize;
            let dst_idx = dst_row_offset + x * 4;
            if dst_idx + 3 < canvas.len() {
                let px = to_bgra_premul([
                    src_data[src_idx],
                    src_data[src_idx + 1],
                    src_data[src_idx + 2],
                    src_data[src_idx + 3],
                ]);
                canvas[dst_idx..dst_idx + 4].copy_from_slice(&px);
            }
        }
    }
}

/// Draw the drop prompt: translucent panel, dashed border, centred text
pub fn render_placeholder(canvas: &mut [u8], width: u32, height: u32) {
    let panel = to_bgra_premul(PANEL_COLOR);
    for pixel in canvas.chunks_exact_mut(4) {
        pixel.copy_from_slice(&panel);
    }

    let border = to_bgra_premul(BORDER_COLOR);
    for x in 0..width {
        if (x / DASH_LEN) % 2 == 0 {
            for t in 0..BORDER_WIDTH {
                draw_pixel(canvas, width, height, x, t, border);
                draw_pixel(canvas, width, height, x, height.saturating_sub(1 + t), border);
            }
        }
    }
    for y in 0..height {
        if (y / DASH_LEN) % 2 == 0 {
            for t in 0..BORDER_WIDTH {
                draw_pixel(canvas, width, height, t, y, border);
                draw_pixel(canvas, width, height, width.saturating_sub(1 + t), y, border);
            }
        }
    }

    let (text_w, text_h) = text_size(PLACEHOLDER_TEXT);
    let x = width.saturating_sub(text_w) / 2;
    let y = height.saturating_sub(text_h) / 2;
    draw_text(canvas, width, height, x, y, PLACEHOLDER_TEXT, to_bgra_premul(TEXT_COLOR));
}

/// Mark the bottom-right corner where a left press resizes
pub fn render_resize_grip(canvas: &mut [u8], width: u32, height: u32) {
    let color = to_bgra_premul(GRIP_COLOR);
    let size = RESIZE_MARGIN as u32;
    let right = width.saturating_sub(1);
    let bottom = height.saturating_sub(1);

    // two diagonal strokes across the corner
    for (len, end) in [(size, size - 1), (size / 2, size / 2 - 1)] {
        for i in 0..len {
            let x = right - i.min(right);
            let y = bottom.saturating_sub(end - i);
            draw_pixel(canvas, width, height, x, y, color);
        }
    }
}

/// Pixel extent of `text` at the prompt scale
pub fn text_size(text: &str) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    let advance = (GLYPH_W + 1) * TEXT_SCALE;
    ((chars * advance).saturating_sub(TEXT_SCALE), GLYPH_H * TEXT_SCALE)
}

/// Draw text with the built-in 5x7 font; unknown characters leave a gap
fn draw_text(
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    x: u32,
    y: u32,
    text: &str,
    color: [u8; 4],
) {
    let mut cx = x;
    for ch in text.chars() {
        if let Some(glyph) = glyph(ch) {
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..TEXT_SCALE {
                        for sx in 0..TEXT_SCALE {
                            let px = cx + col * TEXT_SCALE + sx;
                            let py = y + row as u32 * TEXT_SCALE + sy;
                            draw_pixel(canvas, canvas_width, canvas_height, px, py, color);
                        }
                    }
                }
            }
        }
        cx += (GLYPH_W + 1) * TEXT_SCALE;
    }
}

fn draw_pixel(
    canvas: &mut [u8],
    canvas_width: u32,
    canvas_height: u32,
    x: u32,
    y: u32,
    color: [u8; 4],
) {
    if x < canvas_width && y < canvas_height {
        let idx = ((y * canvas_width + x) * 4) as usize;
        if idx + 3 < canvas.len() {
            canvas[idx..idx + 4].copy_from_slice(&color);
        }
    }
}

/// 5x7 glyphs, one byte per row, high bit on the left
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'a' => [0b00000, 0b00000, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'e' => [0b00000, 0b00000, 0b01100, 0b10010, 0b11110, 0b10000, 0b01110],
        'g' => [0b00000, 0b01111, 0b10001, 0b10001, 0b01111, 0b00001, 0b01110],
        'h' => [0b10000, 0b10000, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001],
        'i' => [0b01000, 0b00000, 0b11000, 0b01000, 0b01000, 0b01000, 0b11100],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10101, 0b10101],
        'n' => [0b00000, 0b00000, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001],
        'o' => [0b00000, 0b00000, 0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
        'p' => [0b00000, 0b00000, 0b11110, 0b10001, 0b11110, 0b10000, 0b10000],
        'r' => [0b00000, 0b00000, 0b10110, 0b11000, 0b10000, 0b10000, 0b10000],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}
