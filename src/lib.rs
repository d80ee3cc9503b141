//! # glyphreel - Video to Glyph Playback Library
//!
//! `glyphreel` decodes a video, converts every frame into a block of text
//! glyphs, and plays the result back at a steady rate.
//!
//! ## Features
//!
//! - Decode videos through ffmpeg, or play a directory of images as frames
//! - Aspect-correct scaling to a fixed column count
//! - Configurable glyph palettes and quality presets
//! - A bounded frame channel so conversion never runs far ahead of playback
//! - Blocking or externally ticked playback
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use glyphreel::{BlockingPlayer, ConsoleSurface, FfmpegConfig, Pipeline, PlaybackConfig};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PlaybackConfig::default().with_columns(120);
//! let (mut pipeline, mut frames) =
//!     Pipeline::open(Path::new("input.mp4"), &config, &FfmpegConfig::default())?;
//!
//! let player = BlockingPlayer::new(&config).with_cancel(pipeline.cancel_token());
//! player.run(&mut frames, &mut ConsoleSurface::stdout())?;
//! pipeline.join();
//! # Ok(())
//! # }
//! ```
//!
//! ## Progress Reporting
//!
//! The pipeline counts every frame it queues. Poll it from any thread:
//!
//! ```no_run
//! use glyphreel::{MemorySource, Pipeline, PlaybackConfig, ProgressPhase};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = MemorySource::uniform(640, 480, 128, 48, 24.0)?;
//! let (pipeline, frames) = Pipeline::start(source, &PlaybackConfig::default())?;
//!
//! let progress = pipeline.progress();
//! match progress.phase {
//!     ProgressPhase::Converting => println!("{}", progress.message),
//!     ProgressPhase::Complete => println!("done"),
//!     _ => {}
//! }
//! # drop(frames);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod ffmpeg;
pub mod glyph;
pub mod pipeline;
pub mod playback;
pub mod progress;
pub mod scaler;
pub mod source;

pub use config::{AppConfig, PlaybackConfig, Preset, CONFIG_FILE_NAME};
pub use convert::FrameConverter;
pub use error::{PlayerError, Result};
pub use ffmpeg::{probe, FfmpegConfig, FfmpegSource};
pub use glyph::{GlyphFrame, Palette, SampleGrid, DEFAULT_PALETTE};
pub use pipeline::{CancelToken, FrameReceiver, Message, Pipeline, PipelineState, RunOutcome};
pub use playback::{BlockingPlayer, ConsoleSurface, PlaybackStats, PolledPlayer, RenderSurface, Tick};
pub use progress::{Progress, ProgressPhase, ProgressReporter};
pub use scaler::{grid_size, GridSize, DEFAULT_GLYPH_ASPECT};
pub use source::{FrameSource, ImageSequenceSource, MemorySource, RawFrame, VideoMetadata};
