//! Example: play a video in the terminal using glyphreel as a library
//!
//! Run with: cargo run --example console_player -- path/to/video.mp4

use glyphreel::{BlockingPlayer, ConsoleSurface, FfmpegConfig, Pipeline, PlaybackConfig, RunOutcome};
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/video/input/test.mkv"));

    if !input.exists() {
        println!("Note: {} not found.", input.display());
        println!("To use this example, pass a video file or a directory of images.");
        return Ok(());
    }

    // 80 columns at 15 fps, a few frames of lookahead
    let config = PlaybackConfig::default()
        .with_columns(80)
        .with_target_rate(15.0)
        .with_channel_capacity(4);

    let (mut pipeline, mut frames) = Pipeline::open(&input, &config, &FfmpegConfig::default())?;
    let meta = *pipeline.metadata();
    println!("Playing {} ({}x{}, {} frames)", input.display(), meta.width, meta.height, meta.frame_count);

    let player = BlockingPlayer::new(&config).with_cancel(pipeline.cancel_token());
    let stats = player.run(&mut frames, &mut ConsoleSurface::stdout())?;

    match pipeline.join() {
        RunOutcome::Failed(msg) => println!("Conversion failed: {}", msg),
        outcome => println!("{:?} after {} rendered frames", outcome, stats.rendered),
    }

    Ok(())
}
