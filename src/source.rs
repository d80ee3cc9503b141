//! Frame sources: anything that yields grayscale frames in order.

use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{PlayerError, Result};

/// Static description of a source, computed once when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub frame_rate: f64,
    /// 0 when the container does not say and no estimate was possible.
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl VideoMetadata {
    pub fn new(frame_rate: f64, frame_count: u64, width: u32, height: u32) -> Self {
        let duration_seconds = if frame_rate > 0.0 { frame_count as f64 / frame_rate } else { 0.0 };
        Self { frame_rate, frame_count, width, height, duration_seconds }
    }
}

/// A grayscale frame at the source's native resolution, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PlayerError::config(format!("frame dimensions must be positive, got {}x{}", width, height)));
        }
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(PlayerError::config(format!(
                "frame buffer holds {} samples, {}x{} needs {}",
                samples.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self { width, height, samples })
    }

    /// Reduce an RGB image to luma.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let samples = img.pixels().map(|px| luminance(*px)).collect();
        Self { width, height, samples }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub(crate) fn into_gray_image(self) -> GrayImage {
        // dimensions were checked on construction
        GrayImage::from_raw(self.width, self.height, self.samples)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

/// BT.601 luma, the same weights ffmpeg's `gray` conversion uses.
fn luminance(rgb: image::Rgb<u8>) -> u8 {
    let r = rgb[0] as f64;
    let g = rgb[1] as f64;
    let b = rgb[2] as f64;
    (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
}

/// A decodable sequence of frames.
///
/// `next_frame` returns `Ok(None)` at end of stream. `close` releases the
/// underlying decoder and may be called any number of times.
pub trait FrameSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn metadata(&self) -> &VideoMetadata {
        (**self).metadata()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Frames held in memory.
#[derive(Debug)]
pub struct MemorySource {
    metadata: VideoMetadata,
    frames: VecDeque<RawFrame>,
    fail_at: Option<u64>,
    read: u64,
}

impl MemorySource {
    /// Metadata is taken from the first frame; an empty list reports 1x1.
    pub fn new(frames: Vec<RawFrame>, frame_rate: f64) -> Self {
        let (width, height) = frames.first().map(|f| (f.width, f.height)).unwrap_or((1, 1));
        let metadata = VideoMetadata::new(frame_rate, frames.len() as u64, width, height);
        Self { metadata, frames: frames.into(), fail_at: None, read: 0 }
    }

    /// Report a decode error instead of returning frame `index` (0-based).
    pub fn fail_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// `count` identical frames filled with `sample`.
    pub fn uniform(width: u32, height: u32, sample: u8, count: usize, frame_rate: f64) -> Result<Self> {
        let frame = RawFrame::new(width, height, vec![sample; width as usize * height as usize])?;
        Ok(Self::new(vec![frame; count], frame_rate))
    }
}

impl FrameSource for MemorySource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.fail_at == Some(self.read) {
            return Err(PlayerError::decode(self.read, "injected failure"));
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.read += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

/// A directory of still images played back as frames, in file-name order.
#[derive(Debug)]
pub struct ImageSequenceSource {
    metadata: VideoMetadata,
    paths: VecDeque<PathBuf>,
    read: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, frame_rate: f64) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PlayerError::source_open(dir, "not a directory"));
        }
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(PlayerError::config(format!("sequence rate must be positive, got {}", frame_rate)));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
            })
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| PlayerError::source_open(dir, "no png or jpeg images found"))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| PlayerError::source_open(first, e.to_string()))?;

        tracing::debug!(dir = %dir.display(), frames = paths.len(), width, height, "opened image sequence");
        let metadata = VideoMetadata::new(frame_rate, paths.len() as u64, width, height);
        Ok(Self { metadata, paths: paths.into(), read: 0 })
    }
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let img = image::open(&path)
            .map_err(|e| PlayerError::decode(self.read, format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        self.read += 1;
        Ok(Some(RawFrame::from_rgb(&img)))
    }

    fn close(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_duration_is_count_over_rate() {
        let meta = VideoMetadata::new(24.0, 48, 320, 240);
        assert_eq!(meta.duration_seconds, 2.0);
    }

    #[test]
    fn raw_frame_checks_buffer_length() {
        assert!(RawFrame::new(2, 2, vec![0; 4]).is_ok());
        assert!(RawFrame::new(2, 2, vec![0; 3]).is_err());
        assert!(RawFrame::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn luminance_uses_bt601_weights() {
        assert_eq!(luminance(image::Rgb([255, 255, 255])), 255);
        assert_eq!(luminance(image::Rgb([0, 0, 0])), 0);
        assert_eq!(luminance(image::Rgb([0, 255, 0])), 150);
        assert_eq!(luminance(image::Rgb([255, 0, 0])), 76);
        assert_eq!(luminance(image::Rgb([0, 0, 255])), 29);
    }

    #[test]
    fn memory_source_yields_frames_then_end() {
        let mut src = MemorySource::uniform(4, 2, 100, 3, 10.0).unwrap();
        assert_eq!(src.metadata().frame_count, 3);
        assert_eq!(src.metadata().width, 4);
        for _ in 0..3 {
            assert!(src.next_frame().unwrap().is_some());
        }
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn memory_source_injects_failure() {
        let mut src = MemorySource::uniform(2, 2, 0, 5, 10.0).unwrap().fail_at(1);
        assert!(src.next_frame().unwrap().is_some());
        assert!(matches!(src.next_frame(), Err(PlayerError::Decode { frame: 1, .. })));
    }

    #[test]
    fn close_is_idempotent() {
        let mut src = MemorySource::uniform(2, 2, 0, 5, 10.0).unwrap();
        src.close();
        src.close();
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn image_sequence_reads_sorted_stills() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("frame_0002.png", 255u8), ("frame_0001.png", 0u8)] {
            let img = RgbImage::from_pixel(6, 3, image::Rgb([value, value, value]));
            img.save(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut src = ImageSequenceSource::open(dir.path(), 12.0).unwrap();
        let meta = *src.metadata();
        assert_eq!((meta.width, meta.height, meta.frame_count), (6, 3, 2));

        let first = src.next_frame().unwrap().unwrap();
        assert!(first.samples().iter().all(|&s| s == 0));
        let second = src.next_frame().unwrap().unwrap();
        assert!(second.samples().iter().all(|&s| s == 255));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn image_sequence_without_images_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 24.0),
            Err(PlayerError::SourceOpen { .. })
        ));
        assert!(matches!(
            ImageSequenceSource::open(&dir.path().join("missing"), 24.0),
            Err(PlayerError::SourceOpen { .. })
        ));
    }
}
