//! The render pipeline: decode → geometry → mark → composite → encode.
//!
//! Strictly sequential per request, no shared mutable state and no caching
//! of decoded images or rendered marks. Any unexpected failure surfaces as
//! `RenderFailed` with the detail kept server-side; partially composited
//! bytes are never returned.

use crate::config::OverlayConfig;
use crate::error::WmError;
use crate::overlay::{
    blend_layer, build_renderer, center_position, mark_target_width, rotate_rgba, tile_cell_size,
    tile_origins, BlockGlyphRenderer, MarkRenderer, MarkStyle, OverlayLayer, RenderMode,
    SourceDims, ROTATION_DEGREES,
};
use fast_image_resize::{FilterType, Image, PixelType, ResizeAlg, Resizer};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Output encoding is always lossy JPEG at this quality; the re-encode also
/// strips whatever metadata the source format carried.
const JPEG_QUALITY: u8 = 90;

/// Stateless watermark render pipeline, built once at startup and shared
/// across requests.
pub struct RenderPipeline {
    renderer: Arc<dyn MarkRenderer>,
    overlay: OverlayConfig,
}

impl RenderPipeline {
    pub fn new(overlay: OverlayConfig) -> Self {
        let renderer = build_renderer(&overlay.renderer);
        Self { renderer, overlay }
    }

    /// Produce the watermarked JPEG for raw source bytes.
    pub fn render(&self, source: &[u8], mode: RenderMode) -> Result<Vec<u8>, WmError> {
        let decoded = decode_image(source)?;

        // Thumb mode downscales before geometry so the overlay is computed
        // from the post-resize dimensions.
        let decoded = if mode == RenderMode::Thumb {
            downscale_to_width(&decoded, self.overlay.thumb_max_width)?
        } else {
            decoded
        };

        let mut canvas = decoded.to_rgba8();
        let dims = SourceDims::normalized(canvas.width(), canvas.height());

        let style = MarkStyle {
            fill_alpha: self.overlay.fill_alpha,
            stroke_alpha: self.overlay.stroke_alpha,
        };

        match mode {
            RenderMode::Full | RenderMode::Thumb => {
                self.composite_centered(&mut canvas, dims, &style)?
            }
            RenderMode::Tile => self.composite_tiled(&mut canvas, dims, &style)?,
        }

        encode_jpeg(&canvas)
    }

    /// One mark, centered on the image, rotated about its own centroid.
    fn composite_centered(
        &self,
        canvas: &mut RgbaImage,
        dims: SourceDims,
        style: &MarkStyle,
    ) -> Result<(), WmError> {
        let target_w = mark_target_width(dims, self.overlay.mark_ratio);
        let mark = self.render_mark(target_w, style)?;
        let rotated = rotate_rgba(&mark, ROTATION_DEGREES);

        let (x, y) = center_position(dims, rotated.width(), rotated.height());
        blend_layer(canvas, &OverlayLayer { image: rotated, x, y });
        Ok(())
    }

    /// The mark repeated across a regular lattice, each instance rotated
    /// about its own cell center. Survives crops that would remove a
    /// single centered mark.
    fn composite_tiled(
        &self,
        canvas: &mut RgbaImage,
        dims: SourceDims,
        style: &MarkStyle,
    ) -> Result<(), WmError> {
        let cell = tile_cell_size(dims, self.overlay.tile_ratio);
        let mark = self.render_mark(cell, style)?;
        let rotated = rotate_rgba(&mark, ROTATION_DEGREES);

        let rw = rotated.width() as i64;
        let rh = rotated.height() as i64;
        for (ox, oy) in tile_origins(dims, cell) {
            let x = ox + (cell as i64 - rw) / 2;
            let y = oy + (cell as i64 - rh) / 2;
            blend_layer(
                canvas,
                &OverlayLayer {
                    image: rotated.clone(),
                    x,
                    y,
                },
            );
        }
        Ok(())
    }

    /// Render the configured phrase, falling back to the block-glyph
    /// strategy so the mark is never silently absent.
    fn render_mark(&self, target_width: u32, style: &MarkStyle) -> Result<RgbaImage, WmError> {
        match self.renderer.render(&self.overlay.phrase, target_width, style) {
            Ok(mark) => Ok(mark),
            Err(e) => {
                tracing::warn!(error = %e, "configured renderer failed, using block glyphs");
                BlockGlyphRenderer
                    .render(&self.overlay.phrase, target_width, style)
                    .map_err(WmError::render_failed)
            }
        }
    }
}

fn decode_image(data: &[u8]) -> Result<DynamicImage, WmError> {
    image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(WmError::render_failed)?
        .decode()
        .map_err(WmError::render_failed)
}

/// Lanczos3 downscale to at most `max_width`, preserving aspect ratio.
/// Images already narrow enough pass through untouched.
fn downscale_to_width(img: &DynamicImage, max_width: u32) -> Result<DynamicImage, WmError> {
    let src_w = img.width();
    let src_h = img.height();
    if src_w <= max_width || src_w == 0 || src_h == 0 {
        return Ok(img.clone());
    }

    let target_w = max_width;
    let target_h = ((src_h as u64 * max_width as u64) / src_w as u64).max(1) as u32;

    let src_width = NonZeroU32::new(src_w)
        .ok_or_else(|| WmError::render_failed(anyhow::anyhow!("source width is 0")))?;
    let src_height = NonZeroU32::new(src_h)
        .ok_or_else(|| WmError::render_failed(anyhow::anyhow!("source height is 0")))?;
    let dst_width = NonZeroU32::new(target_w)
        .ok_or_else(|| WmError::render_failed(anyhow::anyhow!("target width is 0")))?;
    let dst_height = NonZeroU32::new(target_h)
        .ok_or_else(|| WmError::render_failed(anyhow::anyhow!("target height is 0")))?;

    let src_image = Image::from_vec_u8(
        src_width,
        src_height,
        img.to_rgba8().into_raw(),
        PixelType::U8x4,
    )
    .map_err(|e| WmError::render_failed(anyhow::anyhow!("resize source: {e:?}")))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);
    let mut resizer = Resizer::new(ResizeAlg::Convolution(FilterType::Lanczos3));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| WmError::render_failed(anyhow::anyhow!("resize failed: {e:?}")))?;

    let rgba = RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| WmError::render_failed(anyhow::anyhow!("resize output buffer mismatch")))?;
    Ok(DynamicImage::ImageRgba8(rgba))
}

fn encode_jpeg(canvas: &RgbaImage) -> Result<Vec<u8>, WmError> {
    let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
        .map_err(WmError::render_failed)?;
    Ok(out.into_inner())
}
