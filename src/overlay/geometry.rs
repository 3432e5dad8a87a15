//! Deterministic overlay geometry.
//!
//! All placement math derives from the decoded source dimensions, never from
//! caller-supplied sizes. Sizing always keys off the shorter image axis so
//! the mark stays legible regardless of aspect ratio.

use serde::Deserialize;

/// Fixed rotation applied to every mark instance. A diagonal at this angle
/// survives common crop rectangles better than an axis-aligned mark.
pub const ROTATION_DEGREES: f32 = -30.0;

/// Fallback dimensions applied when decoded metadata is unreadable or zero.
/// A policy value, not an error: the pipeline never fails purely because
/// metadata is missing.
pub const FALLBACK_WIDTH: u32 = 1200;
pub const FALLBACK_HEIGHT: u32 = 800;

/// Requested render mode, from the `mode` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Full resolution, one centered mark, caching disabled.
    #[default]
    Full,
    /// Downscaled cacheable output for gallery grids.
    Thumb,
    /// Full resolution, repeating mark lattice that survives cropping.
    Tile,
}

impl RenderMode {
    /// Parse the raw query value. Absent or unrecognized values render full
    /// resolution; the mode only tunes output, it never gates access.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some("thumb") => RenderMode::Thumb,
            Some("tile") => RenderMode::Tile,
            _ => RenderMode::Full,
        }
    }
}

/// Decoded source dimensions after fallback normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDims {
    pub width: u32,
    pub height: u32,
}

impl SourceDims {
    /// Normalize possibly-zero decoded dimensions, substituting the fixed
    /// fallback per axis pair when either is unusable.
    pub fn normalized(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            Self {
                width: FALLBACK_WIDTH,
                height: FALLBACK_HEIGHT,
            }
        } else {
            Self { width, height }
        }
    }

    pub fn shorter_axis(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// Target width in pixels for a single centered mark:
/// `floor(min(width, height) * ratio)`.
pub fn mark_target_width(dims: SourceDims, ratio: f32) -> u32 {
    ((dims.shorter_axis() as f32) * ratio).floor().max(1.0) as u32
}

/// Cell edge in pixels for the tiled lattice.
pub fn tile_cell_size(dims: SourceDims, tile_ratio: f32) -> u32 {
    (((dims.shorter_axis() as f32) * tile_ratio).floor() as u32).max(8)
}

/// Top-left position that centers a layer of the given size on the image.
/// May be negative when the rotated layer overhangs the image.
pub fn center_position(dims: SourceDims, layer_w: u32, layer_h: u32) -> (i64, i64) {
    (
        (dims.width as i64 - layer_w as i64) / 2,
        (dims.height as i64 - layer_h as i64) / 2,
    )
}

/// Top-left origins of a regular lattice of `cell`-sized tiles covering the
/// whole image, edge cells included. Each tile's mark is rotated about its
/// own cell center by the caller.
pub fn tile_origins(dims: SourceDims, cell: u32) -> Vec<(i64, i64)> {
    let mut origins = Vec::new();
    let step = cell as i64;
    let mut y = 0i64;
    while y < dims.height as i64 {
        let mut x = 0i64;
        while x < dims.width as i64 {
            origins.push((x, y));
            x += step;
        }
        y += step;
    }
    origins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_param() {
        assert_eq!(RenderMode::from_param(None), RenderMode::Full);
        assert_eq!(RenderMode::from_param(Some("thumb")), RenderMode::Thumb);
        assert_eq!(RenderMode::from_param(Some("tile")), RenderMode::Tile);
        assert_eq!(RenderMode::from_param(Some("bogus")), RenderMode::Full);
    }

    #[test]
    fn test_normalized_passes_valid_dims() {
        let dims = SourceDims::normalized(1200, 800);
        assert_eq!(dims.width, 1200);
        assert_eq!(dims.height, 800);
    }

    #[test]
    fn test_normalized_substitutes_fallback() {
        let dims = SourceDims::normalized(0, 800);
        assert_eq!(dims.width, FALLBACK_WIDTH);
        assert_eq!(dims.height, FALLBACK_HEIGHT);

        let dims = SourceDims::normalized(1200, 0);
        assert_eq!(dims.width, FALLBACK_WIDTH);
        assert_eq!(dims.height, FALLBACK_HEIGHT);
    }

    #[test]
    fn test_mark_width_uses_shorter_axis() {
        // A wide panorama must size the mark from the 200px axis.
        let dims = SourceDims::normalized(4000, 200);
        assert_eq!(mark_target_width(dims, 0.6), 120);
    }

    #[test]
    fn test_mark_width_canonical_scenario() {
        // 1200x800 at the recommended ratio: 0.6 * 800 = 480.
        let dims = SourceDims::normalized(1200, 800);
        assert_eq!(mark_target_width(dims, 0.6), 480);
    }

    #[test]
    fn test_mark_width_floors() {
        let dims = SourceDims::normalized(1000, 333);
        // 333 * 0.6 = 199.8 -> 199
        assert_eq!(mark_target_width(dims, 0.6), 199);
    }

    #[test]
    fn test_center_position_exact() {
        let dims = SourceDims::normalized(800, 600);
        assert_eq!(center_position(dims, 100, 50), (350, 275));
    }

    #[test]
    fn test_center_position_oversized_layer_goes_negative() {
        let dims = SourceDims::normalized(100, 100);
        let (x, y) = center_position(dims, 300, 200);
        assert!(x < 0 && y < 0);
    }

    #[test]
    fn test_tile_origins_cover_image() {
        let dims = SourceDims::normalized(300, 200);
        let origins = tile_origins(dims, 100);
        // 3 columns x 2 rows
        assert_eq!(origins.len(), 6);
        assert!(origins.contains(&(0, 0)));
        assert!(origins.contains(&(200, 100)));
    }

    #[test]
    fn test_tile_origins_include_partial_edge_cells() {
        let dims = SourceDims::normalized(250, 150);
        let origins = tile_origins(dims, 100);
        // Columns at 0, 100, 200; rows at 0, 100.
        assert_eq!(origins.len(), 6);
        assert!(origins.contains(&(200, 100)));
    }

    #[test]
    fn test_tile_cell_from_shorter_axis() {
        let dims = SourceDims::normalized(4000, 200);
        assert_eq!(tile_cell_size(dims, 0.32), 64);
    }

    #[test]
    fn test_tile_cell_floor() {
        let dims = SourceDims::normalized(30, 20);
        // 20 * 0.32 = 6.4, clamped up to the 8px minimum.
        assert_eq!(tile_cell_size(dims, 0.32), 8);
    }
}
