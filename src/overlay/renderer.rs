//! Mark rendering strategies.
//!
//! Turns the watermark phrase into an unrotated RGBA layer at a requested
//! pixel width. Two strategies are available; both compute their own exact
//! bounding geometry so placement never depends on a compositor's
//! text-anchoring semantics.
//!
//! The block-glyph strategy is the default and the fallback: it draws from a
//! baked-in bitmap grid and cannot fail for want of a font.

use super::glyphs::{
    glyph_rows, row_bit, total_columns, GLYPH_COLS, GLYPH_ROWS, LETTER_SPACING, WORD_SPACING,
};
use crate::config::RendererStrategy;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{anyhow, Context};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// Opacity pair for the mandatory dual-tone treatment: dark fill plus light
/// stroke, so the mark reads on both dark and light backgrounds.
#[derive(Debug, Clone, Copy)]
pub struct MarkStyle {
    pub fill_alpha: f32,
    pub stroke_alpha: f32,
}

impl MarkStyle {
    fn fill(&self) -> Rgba<u8> {
        Rgba([0, 0, 0, (self.fill_alpha.clamp(0.0, 1.0) * 255.0) as u8])
    }

    fn stroke(&self) -> Rgba<u8> {
        Rgba([
            255,
            255,
            255,
            (self.stroke_alpha.clamp(0.0, 1.0) * 255.0) as u8,
        ])
    }
}

/// Renders a phrase into an unrotated RGBA layer of roughly `target_width`
/// pixels. Implementations must treat a space as zero-ink with its own
/// advance and must uppercase consistently.
pub trait MarkRenderer: Send + Sync {
    fn render(
        &self,
        phrase: &str,
        target_width: u32,
        style: &MarkStyle,
    ) -> Result<RgbaImage, anyhow::Error>;
}

/// Select the renderer for the configured strategy. A font that fails to
/// load degrades to block glyphs at startup rather than at request time.
pub fn build_renderer(strategy: &RendererStrategy) -> Arc<dyn MarkRenderer> {
    match strategy {
        RendererStrategy::BlockGlyph => Arc::new(BlockGlyphRenderer),
        RendererStrategy::EmbeddedFont { path } => match FontMarkRenderer::from_path(path) {
            Ok(renderer) => Arc::new(renderer),
            Err(e) => {
                tracing::warn!(
                    font_path = %path,
                    error = %e,
                    "font unavailable, falling back to block glyphs"
                );
                Arc::new(BlockGlyphRenderer)
            }
        },
    }
}

/// Draws each character from the baked 5×7 bitmap grid. Cell size is the
/// target width divided by the phrase's total column count; each ink cell
/// becomes a dark dot over a light stroke ring.
pub struct BlockGlyphRenderer;

impl MarkRenderer for BlockGlyphRenderer {
    fn render(
        &self,
        phrase: &str,
        target_width: u32,
        style: &MarkStyle,
    ) -> Result<RgbaImage, anyhow::Error> {
        let chars: Vec<char> = phrase.chars().collect();
        if chars.is_empty() {
            return Err(anyhow!("cannot render empty phrase"));
        }

        let cols = total_columns(phrase);
        let cell = (target_width / cols).max(2);
        let dot = (((cell as f32) * 0.85).floor() as u32).max(2);
        let stroke_w = (((dot as f32) * 0.18).floor() as u32).max(1);

        let width = cols * cell;
        let height = GLYPH_ROWS * cell;
        let mut layer = RgbaImage::new(width, height);

        let fill = style.fill();
        let stroke = style.stroke();
        let inset = (cell - dot) / 2;

        let mut x_cursor = 0u32;
        for (i, c) in chars.iter().enumerate() {
            let rows = glyph_rows(*c);
            for (r, row) in rows.iter().enumerate() {
                for col in 0..GLYPH_COLS {
                    if !row_bit(*row, col) {
                        continue;
                    }
                    let x0 = x_cursor + col * cell + inset;
                    let y0 = r as u32 * cell + inset;
                    draw_dot(&mut layer, x0, y0, dot, stroke_w, fill, stroke);
                }
            }
            x_cursor += GLYPH_COLS * cell;
            if i < chars.len() - 1 {
                let gap = if *c == ' ' { WORD_SPACING } else { LETTER_SPACING };
                x_cursor += gap * cell;
            }
        }

        Ok(layer)
    }
}

/// Paint one ink cell: a light stroke square with the dark dot overwriting
/// its interior, leaving a visible ring.
fn draw_dot(
    layer: &mut RgbaImage,
    x0: u32,
    y0: u32,
    dot: u32,
    stroke_w: u32,
    fill: Rgba<u8>,
    stroke: Rgba<u8>,
) {
    let width = layer.width() as i64;
    let height = layer.height() as i64;

    let outer_x = x0 as i64 - stroke_w as i64;
    let outer_y = y0 as i64 - stroke_w as i64;
    let outer = dot as i64 + 2 * stroke_w as i64;

    for y in outer_y..outer_y + outer {
        for x in outer_x..outer_x + outer {
            if x < 0 || y < 0 || x >= width || y >= height {
                continue;
            }
            layer.put_pixel(x as u32, y as u32, stroke);
        }
    }

    for y in y0..y0 + dot {
        for x in x0..x0 + dot {
            if (x as i64) < width && (y as i64) < height {
                layer.put_pixel(x, y, fill);
            }
        }
    }
}

/// Renders the phrase with a bundled TTF via `ab_glyph`, scaled so the laid
/// out text fills the target width. The stroke is approximated by drawing a
/// light pass at eight sub-pixel offsets beneath the dark fill pass.
pub struct FontMarkRenderer {
    font: FontVec,
}

impl FontMarkRenderer {
    pub fn from_path(path: &str) -> Result<Self, anyhow::Error> {
        let bytes = std::fs::read(path).with_context(|| format!("reading font {path}"))?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("parsing font {path}: {e}"))?;
        Ok(Self { font })
    }

    /// Advance width of the phrase at the given scale, kerning included.
    fn measure(&self, text: &str, scale: PxScale) -> (f32, f32) {
        let scaled = self.font.as_scaled(scale);
        let mut width = 0.0f32;
        let mut prev: Option<ab_glyph::GlyphId> = None;

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }

        (width, scaled.height())
    }

    fn draw_pass(
        &self,
        layer: &mut RgbaImage,
        text: &str,
        scale: PxScale,
        origin_x: f32,
        origin_y: f32,
        color: Rgba<u8>,
    ) {
        let scaled = self.font.as_scaled(scale);
        let canvas_w = layer.width() as i32;
        let canvas_h = layer.height() as i32;

        let baseline = origin_y + scaled.ascent();
        let mut cursor = origin_x;
        let mut prev: Option<ab_glyph::GlyphId> = None;

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                cursor += scaled.kern(prev, id);
            }

            let glyph = id.with_scale_and_position(scale, ab_glyph::point(cursor, baseline));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|px, py, coverage| {
                    let x = px as i32 + bounds.min.x as i32;
                    let y = py as i32 + bounds.min.y as i32;
                    if x >= 0 && y >= 0 && x < canvas_w && y < canvas_h {
                        let alpha = (coverage * color[3] as f32) as u8;
                        let pixel = Rgba([color[0], color[1], color[2], alpha]);
                        let existing = *layer.get_pixel(x as u32, y as u32);
                        let blended = super::compositor::blend_pixels(existing, pixel);
                        layer.put_pixel(x as u32, y as u32, blended);
                    }
                });
            }

            cursor += scaled.h_advance(id);
            prev = Some(id);
        }
    }
}

impl MarkRenderer for FontMarkRenderer {
    fn render(
        &self,
        phrase: &str,
        target_width: u32,
        style: &MarkStyle,
    ) -> Result<RgbaImage, anyhow::Error> {
        let text = phrase.to_uppercase();
        if text.is_empty() {
            return Err(anyhow!("cannot render empty phrase"));
        }

        // Scale a reference measurement up to the target width.
        let reference = PxScale::from(100.0);
        let (ref_width, _) = self.measure(&text, reference);
        if ref_width <= 0.0 {
            return Err(anyhow!("font produced zero advance for phrase"));
        }
        let font_size = (100.0 * target_width as f32 / ref_width).max(4.0);
        let scale = PxScale::from(font_size);

        let (width, height) = self.measure(&text, scale);
        let stroke_w = (font_size * 0.03).max(1.0);
        let pad = stroke_w.ceil() as u32 + 2;

        let canvas_w = (width.ceil() as u32 + 2 * pad).max(1);
        let canvas_h = (height.ceil() as u32 + 2 * pad).max(1);
        let mut layer = RgbaImage::new(canvas_w, canvas_h);

        let origin = pad as f32;
        let stroke = style.stroke();
        for (dx, dy) in [
            (-1.0, 0.0),
            (1.0, 0.0),
            (0.0, -1.0),
            (0.0, 1.0),
            (-0.7, -0.7),
            (0.7, -0.7),
            (-0.7, 0.7),
            (0.7, 0.7),
        ] {
            self.draw_pass(
                &mut layer,
                &text,
                scale,
                origin + dx * stroke_w,
                origin + dy * stroke_w,
                stroke,
            );
        }
        self.draw_pass(&mut layer, &text, scale, origin, origin, style.fill());

        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLE: MarkStyle = MarkStyle {
        fill_alpha: 0.42,
        stroke_alpha: 0.45,
    };

    #[test]
    fn test_block_render_has_ink() {
        let layer = BlockGlyphRenderer.render("DO NOT USE", 480, &STYLE).unwrap();
        assert!(layer.width() > 0 && layer.height() > 0);
        let has_ink = layer.pixels().any(|p| p[3] > 0);
        assert!(has_ink, "mark must contain visible pixels");
    }

    #[test]
    fn test_block_render_width_tracks_target() {
        let layer = BlockGlyphRenderer.render("DO NOT USE", 480, &STYLE).unwrap();
        // Width is the target rounded down to a whole cell multiple.
        let cols = total_columns("DO NOT USE");
        let cell = (480 / cols).max(2);
        assert_eq!(layer.width(), cols * cell);
        assert_eq!(layer.height(), GLYPH_ROWS * cell);
        assert!(layer.width() <= 480 + cols);
    }

    #[test]
    fn test_block_render_dual_tone() {
        let layer = BlockGlyphRenderer.render("O", 200, &STYLE).unwrap();
        let has_dark = layer.pixels().any(|p| p[0] == 0 && p[3] > 0);
        let has_light = layer.pixels().any(|p| p[0] == 255 && p[3] > 0);
        assert!(has_dark, "fill pixels must be present");
        assert!(has_light, "stroke pixels must be present");
    }

    #[test]
    fn test_block_render_space_has_no_ink_column() {
        let spaced = BlockGlyphRenderer.render("A A", 300, &STYLE).unwrap();
        // The middle of the layer is the space advance: fully transparent.
        let mid_x = spaced.width() / 2;
        let all_clear = (0..spaced.height()).all(|y| spaced.get_pixel(mid_x, y)[3] == 0);
        assert!(all_clear, "space must render as zero ink");
    }

    #[test]
    fn test_block_render_tiny_target_clamps_cell() {
        // Far narrower than the phrase's column count: cell clamps to 2px.
        let layer = BlockGlyphRenderer.render("DO NOT USE", 10, &STYLE).unwrap();
        assert_eq!(layer.width(), total_columns("DO NOT USE") * 2);
    }

    #[test]
    fn test_block_render_empty_phrase_errors() {
        assert!(BlockGlyphRenderer.render("", 480, &STYLE).is_err());
    }

    #[test]
    fn test_block_render_is_deterministic() {
        let a = BlockGlyphRenderer.render("DO NOT USE", 480, &STYLE).unwrap();
        let b = BlockGlyphRenderer.render("DO NOT USE", 480, &STYLE).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_build_renderer_block_default() {
        let renderer = build_renderer(&RendererStrategy::BlockGlyph);
        assert!(renderer.render("X", 100, &STYLE).is_ok());
    }

    #[test]
    fn test_build_renderer_missing_font_falls_back() {
        let renderer = build_renderer(&RendererStrategy::EmbeddedFont {
            path: "/nonexistent/font.ttf".to_string(),
        });
        // Fallback still renders.
        assert!(renderer.render("X", 100, &STYLE).is_ok());
    }

    #[test]
    fn test_font_renderer_rejects_garbage_font() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(FontMarkRenderer::from_path(path.to_str().unwrap()).is_err());
    }
}
