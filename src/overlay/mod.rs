//! Overlay rendering for the "do not use" mark.
//!
//! This module turns a phrase into a rotated raster layer and composites it
//! onto a source image. Geometry is always computed from the decoded source
//! dimensions so a caller can never shrink the mark into invisibility, and
//! every glyph carries both a dark fill and a light stroke so the mark stays
//! legible on dark and light backgrounds alike.

pub mod compositor;
pub mod geometry;
pub mod glyphs;
pub mod renderer;

pub use compositor::{blend_layer, rotate_rgba, OverlayLayer};
pub use geometry::{
    center_position, mark_target_width, tile_cell_size, tile_origins, RenderMode, SourceDims,
    ROTATION_DEGREES,
};
pub use glyphs::total_columns;
pub use renderer::{build_renderer, BlockGlyphRenderer, FontMarkRenderer, MarkRenderer, MarkStyle};
