use image::imageops::{self, FilterType};

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::glyph::{GlyphFrame, Palette, SampleGrid};
use crate::scaler::{grid_size, GridSize};
use crate::source::RawFrame;

/// Scales raw frames to the glyph grid and maps them to text.
///
/// The grid is recomputed only when the incoming frame dimensions change.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    columns: u32,
    max_scan_height: u32,
    glyph_aspect: f64,
    palette: Palette,
    filter: FilterType,
    cached: Option<((u32, u32), GridSize)>,
}

impl FrameConverter {
    pub fn new(config: &PlaybackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            columns: config.columns,
            max_scan_height: config.max_scan_height,
            glyph_aspect: config.glyph_aspect,
            palette: Palette::new(&config.palette)?,
            filter: FilterType::Triangle,
            cached: None,
        })
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn grid_for(&mut self, width: u32, height: u32) -> Result<GridSize> {
        if let Some((dims, size)) = self.cached {
            if dims == (width, height) {
                return Ok(size);
            }
        }
        let size = grid_size(width, height, self.columns, self.max_scan_height, self.glyph_aspect)?;
        if self.cached.is_some() {
            tracing::debug!(width, height, cols = size.cols, rows = size.rows, "frame dimensions changed, grid recomputed");
        }
        self.cached = Some(((width, height), size));
        Ok(size)
    }

    /// Resize a raw frame to its glyph grid.
    pub fn sample(&mut self, frame: RawFrame) -> Result<SampleGrid> {
        let size = self.grid_for(frame.width(), frame.height())?;
        if size.is_degenerate() {
            return Ok(SampleGrid::empty(size.cols));
        }
        let gray = frame.into_gray_image();
        let resized = imageops::resize(&gray, size.cols, size.rows, self.filter);
        Ok(SampleGrid::new(size.cols, size.rows, resized.into_raw()))
    }

    pub fn convert(&mut self, frame: RawFrame) -> Result<GlyphFrame> {
        let grid = self.sample(frame)?;
        Ok(self.palette.map(&grid))
    }
}
