//! Alpha compositing and rotation for overlay layers.
//!
//! Blending uses the Porter-Duff "over" operator. Layers are applied in
//! document order; the guaranteed-visible mark layer is always composited
//! even when a decorative rendering path fails upstream.

use image::{Rgba, RgbaImage};

/// A rendered overlay positioned on the target image. Positions may be
/// negative or overhang the target; blending clips to the visible region.
#[derive(Clone)]
pub struct OverlayLayer {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

impl std::fmt::Debug for OverlayLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayLayer")
            .field("dimensions", &(self.image.width(), self.image.height()))
            .field("position", &(self.x, self.y))
            .finish()
    }
}

/// Blend a single overlay layer onto the target image, clipped to bounds.
pub fn blend_layer(target: &mut RgbaImage, layer: &OverlayLayer) {
    let target_w = target.width() as i64;
    let target_h = target.height() as i64;
    let layer_w = layer.image.width() as i64;
    let layer_h = layer.image.height() as i64;

    let x_start = layer.x.max(0);
    let y_start = layer.y.max(0);
    let x_end = (layer.x + layer_w).min(target_w);
    let y_end = (layer.y + layer_h).min(target_h);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let lx = (tx - layer.x) as u32;
            let ly = (ty - layer.y) as u32;

            let fg = *layer.image.get_pixel(lx, ly);
            if fg[3] == 0 {
                continue;
            }
            let bg = *target.get_pixel(tx as u32, ty as u32);
            target.put_pixel(tx as u32, ty as u32, blend_pixels(bg, fg));
        }
    }
}

/// Porter-Duff "over": result = fg + bg * (1 - fg.alpha).
pub fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
    let fg_alpha = foreground[3] as f32 / 255.0;
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);
    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0) as u8,
    ])
}

/// Rotate an RGBA layer by `degrees` (positive = clockwise) about its own
/// center, expanding the canvas to the rotated bounding box. Sampling is
/// bilinear; uncovered pixels stay fully transparent.
pub fn rotate_rgba(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let radians = -degrees.to_radians();
    let cos = radians.cos();
    let sin = radians.sin();

    let src_w = image.width() as f32;
    let src_h = image.height() as f32;
    let cx = src_w / 2.0;
    let cy = src_h / 2.0;

    let corners = [
        (-cx, -cy),
        (src_w - cx, -cy),
        (-cx, src_h - cy),
        (src_w - cx, src_h - cy),
    ];

    let mut min_x = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for (x, y) in corners {
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;
        min_x = min_x.min(rx);
        max_x = max_x.max(rx);
        min_y = min_y.min(ry);
        max_y = max_y.max(ry);
    }

    let dst_w = ((max_x - min_x).ceil() as u32).max(1);
    let dst_h = ((max_y - min_y).ceil() as u32).max(1);
    let mut rotated = RgbaImage::new(dst_w, dst_h);

    let dst_cx = dst_w as f32 / 2.0;
    let dst_cy = dst_h as f32 / 2.0;

    // Inverse rotation: sample the source for each destination pixel.
    let inv_cos = (-radians).cos();
    let inv_sin = (-radians).sin();

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let rx = dx as f32 - dst_cx;
            let ry = dy as f32 - dst_cy;

            let sx = rx * inv_cos - ry * inv_sin + cx;
            let sy = rx * inv_sin + ry * inv_cos + cy;

            if sx >= 0.0 && sx < src_w - 1.0 && sy >= 0.0 && sy < src_h - 1.0 {
                let x0 = sx.floor() as u32;
                let y0 = sy.floor() as u32;
                let fx = sx - x0 as f32;
                let fy = sy - y0 as f32;

                let p00 = image.get_pixel(x0, y0);
                let p10 = image.get_pixel(x0 + 1, y0);
                let p01 = image.get_pixel(x0, y0 + 1);
                let p11 = image.get_pixel(x0 + 1, y0 + 1);

                let interpolate = |c: usize| -> u8 {
                    let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
                        + p10[c] as f32 * fx * (1.0 - fy)
                        + p01[c] as f32 * (1.0 - fx) * fy
                        + p11[c] as f32 * fx * fy;
                    v.clamp(0.0, 255.0) as u8
                };

                rotated.put_pixel(
                    dx,
                    dy,
                    Rgba([
                        interpolate(0),
                        interpolate(1),
                        interpolate(2),
                        interpolate(3),
                    ]),
                );
            }
        }
    }

    rotated
}
