//! Sampling dimensions for aspect-ratio-correct glyph output.

use crate::error::{PlayerError, Result};

/// Ratio used to turn a glyph cell's width into its height (`height = width / aspect`).
/// Courier-style monospace fonts sit close to 0.5.
pub const DEFAULT_GLYPH_ASPECT: f64 = 0.5;

/// Columns × rows of glyphs a frame is sampled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub cols: u32,
    pub rows: u32,
}

impl GridSize {
    pub fn is_degenerate(&self) -> bool {
        self.rows == 0
    }
}

/// Compute the glyph grid for a `width` × `height` frame.
///
/// Frames taller than `max_scan_height` are scaled down to it first (never
/// up). Every cell is `width / columns` pixels wide and `cell_width / aspect`
/// pixels tall; the row count is how many whole cells fit vertically, which
/// may be zero for very wide frames.
pub fn grid_size(width: u32, height: u32, columns: u32, max_scan_height: u32, aspect: f64) -> Result<GridSize> {
    if width == 0 || height == 0 {
        return Err(PlayerError::config(format!("frame dimensions must be positive, got {}x{}", width, height)));
    }
    if columns == 0 || max_scan_height == 0 {
        return Err(PlayerError::config("columns and max scan height must be positive"));
    }
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(PlayerError::config(format!("glyph aspect must be positive, got {}", aspect)));
    }

    let (scan_w, scan_h) = if height > max_scan_height {
        let scale = max_scan_height as f64 / height as f64;
        let w = ((width as f64 * scale) as u32).max(1);
        (w as f64, max_scan_height as f64)
    } else {
        (width as f64, height as f64)
    };

    let cell_width = scan_w / columns as f64;
    let cell_height = cell_width / aspect;
    let rows = (scan_h / cell_height).floor();

    Ok(GridSize { cols: columns, rows: rows.min(u32::MAX as f64) as u32 })
}
