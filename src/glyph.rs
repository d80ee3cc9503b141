//! Brightness to glyph mapping.

use rayon::prelude::*;

use crate::error::{PlayerError, Result};

/// Glyphs from darkest to brightest.
pub const DEFAULT_PALETTE: &str = "@%#*+=-:. ";

/// Grids with at least this many cells are mapped row-parallel.
const PARALLEL_CELLS: usize = 16 * 1024;

/// A 2-D grid of 8-bit intensity samples at the target resolution, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGrid {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

impl SampleGrid {
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Self {
        debug_assert_eq!(samples.len(), width as usize * height as usize);
        Self { width, height, samples }
    }

    pub fn empty(width: u32) -> Self {
        Self { width, height: 0, samples: Vec::new() }
    }
}

/// Bucket for `sample` in a palette of `levels` glyphs.
#[inline]
pub fn bucket_index(sample: u8, levels: usize) -> usize {
    ((sample as usize * levels) / 256).min(levels.saturating_sub(1))
}

/// An ordered glyph set with its precomputed 256-entry lookup table.
#[derive(Debug, Clone)]
pub struct Palette {
    glyphs: Vec<u8>,
    lut: [u8; 256],
}

impl Palette {
    pub fn new(glyphs: &str) -> Result<Self> {
        if glyphs.is_empty() {
            return Err(PlayerError::config("palette is empty"));
        }
        if !glyphs.is_ascii() {
            return Err(PlayerError::config("palette contains non-ASCII characters"));
        }
        Ok(Self::from_bytes(glyphs.as_bytes().to_vec()))
    }

    fn from_bytes(glyphs: Vec<u8>) -> Self {
        let mut lut = [0u8; 256];
        for (sample, slot) in lut.iter_mut().enumerate() {
            *slot = glyphs[bucket_index(sample as u8, glyphs.len())];
        }
        Self { glyphs, lut }
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    #[inline]
    pub fn glyph(&self, sample: u8) -> char {
        self.lut[sample as usize] as char
    }

    fn map_row(&self, row: &[u8], out: &mut String) {
        out.extend(row.iter().map(|&s| self.lut[s as usize] as char));
        out.push('\n');
    }

    /// Map a sample grid to a frame of glyphs.
    pub fn map(&self, grid: &SampleGrid) -> GlyphFrame {
        let width = grid.width as usize;
        let height = grid.height as usize;
        if width == 0 || height == 0 {
            return GlyphFrame { columns: grid.width, rows: 0, text: String::new() };
        }

        let text = if width * height >= PARALLEL_CELLS {
            grid.samples
                .par_chunks(width)
                .map(|row| {
                    let mut line = String::with_capacity(width + 1);
                    self.map_row(row, &mut line);
                    line
                })
                .collect::<Vec<_>>()
                .concat()
        } else {
            let mut out = String::with_capacity((width + 1) * height);
            for row in grid.samples.chunks(width) {
                self.map_row(row, &mut out);
            }
            out
        };

        GlyphFrame { columns: grid.width, rows: grid.height, text }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_bytes(DEFAULT_PALETTE.as_bytes().to_vec())
    }
}

/// One rendered frame: `rows` lines of `columns` glyphs, each ending in `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphFrame {
    columns: u32,
    rows: u32,
    text: String,
}

impl GlyphFrame {
    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// True for the empty block produced by a zero-row scale.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for GlyphFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries_follow_floor_formula() {
        assert_eq!(bucket_index(0, 10), 0);
        assert_eq!(bucket_index(25, 10), 0);
        assert_eq!(bucket_index(26, 10), 1);
        assert_eq!(bucket_index(127, 10), 4);
        assert_eq!(bucket_index(128, 10), 5);
        assert_eq!(bucket_index(250, 10), 9);
        assert_eq!(bucket_index(255, 10), 9);
    }

    #[test]
    fn bucket_is_monotonic_and_in_range() {
        let mut prev = 0;
        for s in 0..=255u8 {
            let idx = bucket_index(s, 10);
            assert!(idx <= 9);
            assert!(idx >= prev, "bucket dropped at sample {}", s);
            prev = idx;
        }
    }

    #[test]
    fn clamp_holds_for_single_glyph_palette() {
        for s in [0u8, 128, 255] {
            assert_eq!(bucket_index(s, 1), 0);
        }
    }

    #[test]
    fn default_palette_maps_extremes() {
        let palette = Palette::default();
        assert_eq!(palette.len(), 10);
        assert_eq!(palette.glyph(0), '@');
        assert_eq!(palette.glyph(255), ' ');
        assert_eq!(palette.glyph(128), '=');
    }

    #[test]
    fn lookup_table_matches_formula_for_every_sample() {
        let palette = Palette::default();
        let glyphs: Vec<char> = DEFAULT_PALETTE.chars().collect();
        for s in 0..=255u8 {
            assert_eq!(palette.glyph(s), glyphs[bucket_index(s, 10)]);
        }
    }

    #[test]
    fn map_terminates_every_row() {
        let grid = SampleGrid::new(3, 2, vec![0, 128, 255, 255, 128, 0]);
        let frame = Palette::default().map(&grid);
        assert_eq!(frame.as_str(), "@= \n =@\n");
        assert_eq!(frame.columns(), 3);
        assert_eq!(frame.rows(), 2);
        assert_eq!(frame.lines().collect::<Vec<_>>(), vec!["@= ", " =@"]);
    }

    #[test]
    fn zero_row_grid_is_an_empty_block() {
        let frame = Palette::default().map(&SampleGrid::empty(40));
        assert!(frame.is_empty());
        assert_eq!(frame.as_str(), "");
        assert_eq!(frame.columns(), 40);
    }

    #[test]
    fn parallel_and_sequential_paths_agree() {
        let width = 256u32;
        let height = 80u32;
        let samples: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
        let grid = SampleGrid::new(width, height, samples.clone());
        let palette = Palette::default();
        let parallel = palette.map(&grid);

        let mut expected = String::new();
        for row in samples.chunks(width as usize) {
            palette.map_row(row, &mut expected);
        }
        assert_eq!(parallel.as_str(), expected);
    }

    #[test]
    fn rejects_bad_palettes() {
        assert!(Palette::new("").is_err());
        assert!(Palette::new("▓▒░").is_err());
        let custom = Palette::new("#.").unwrap();
        assert_eq!(custom.glyph(127), '#');
        assert_eq!(custom.glyph(128), '.');
    }
}
