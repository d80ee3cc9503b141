use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use glyphreel::{
    probe, AppConfig, BlockingPlayer, ConsoleSurface, FrameReceiver, FrameSource, ImageSequenceSource, Pipeline, PlaybackConfig,
    PolledPlayer, RunOutcome, Tick, VideoMetadata,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const PROGRESS_POLL: Duration = Duration::from_millis(500);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Blocking playback on its own thread
    Console,
    /// Non-blocking playback driven by a fixed tick
    Polled,
}

#[derive(Parser, Debug)]
#[command(version, about = "Play videos as text in the terminal.")]
struct Args {
    /// Input video file or directory of images
    input: PathBuf,

    /// Glyph columns per row
    #[arg(long)]
    columns: Option<u32>,

    /// Playback rate in frames per second
    #[arg(long)]
    fps: Option<f64>,

    /// Tallest source height scanned before the width is truncated
    #[arg(long)]
    max_height: Option<u32>,

    /// Font aspect ratio (character width:height)
    #[arg(long)]
    font_ratio: Option<f64>,

    /// Frames buffered between conversion and playback
    #[arg(long)]
    capacity: Option<usize>,

    /// Quality preset from the config file
    #[arg(long, conflicts_with_all = &["small", "large"])]
    preset: Option<String>,

    /// Use the small preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["preset", "large"])]
    small: bool,

    /// Use the large preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["preset", "small"])]
    large: bool,

    /// Config file (TOML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How frames are pulled off the channel
    #[arg(long, value_enum, default_value_t = Mode::Console)]
    mode: Mode,

    /// Tick interval in polled mode, in milliseconds
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Frame rate assigned to image directories (defaults to the playback rate)
    #[arg(long)]
    sequence_fps: Option<f64>,

    /// Print the input's metadata and exit
    #[arg(long, default_value_t = false)]
    info: bool,

    /// Show a conversion progress bar on stderr
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// More log output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn playback_config(args: &Args, app: &AppConfig) -> Result<PlaybackConfig> {
    let preset = if args.small {
        Some("small")
    } else if args.large {
        Some("large")
    } else {
        args.preset.as_deref()
    };

    let mut cfg = app.playback_config(preset)?;
    if let Some(columns) = args.columns {
        cfg = cfg.with_columns(columns);
    }
    if let Some(fps) = args.fps {
        cfg = cfg.with_target_rate(fps);
    }
    if let Some(max_height) = args.max_height {
        cfg = cfg.with_max_scan_height(max_height);
    }
    if let Some(ratio) = args.font_ratio {
        cfg = cfg.with_glyph_aspect(ratio);
    }
    if let Some(capacity) = args.capacity {
        cfg = cfg.with_channel_capacity(capacity);
    }
    cfg.validate()?;
    Ok(cfg)
}

fn sequence_rate(args: &Args, cfg: &PlaybackConfig) -> f64 {
    args.sequence_fps.unwrap_or(cfg.target_rate)
}

fn print_info(input: &Path, meta: &VideoMetadata) {
    println!("Input: {}", input.display());
    println!("Resolution: {}x{}", meta.width, meta.height);
    println!("Frame rate: {:.3} fps", meta.frame_rate);
    if meta.frame_count > 0 {
        println!("Frames: {}", meta.frame_count);
    } else {
        println!("Frames: unknown");
    }
    println!("Duration: {:.2}s", meta.duration_seconds);
}

fn make_progress_bar(total: u64) -> ProgressBar {
    if total == 0 {
        let pb = ProgressBar::new_spinner();
        pb.set_message("Converting frames");
        return pb;
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message("Converting frames");
    pb
}

fn update_progress(bar: Option<&ProgressBar>, pipeline: &Pipeline) {
    if let Some(pb) = bar {
        let p = pipeline.progress();
        pb.set_position(p.completed);
        if p.total == 0 {
            pb.set_message(p.message);
        }
    }
}

fn play_console(frames: FrameReceiver, pipeline: &Pipeline, cfg: &PlaybackConfig, bar: Option<&ProgressBar>) -> Result<()> {
    let player = BlockingPlayer::new(cfg).with_cancel(pipeline.cancel_token());
    let handle = player.spawn(frames, ConsoleSurface::stdout()).context("starting playback thread")?;

    let mut last_report = Instant::now();
    while !handle.is_finished() {
        if last_report.elapsed() >= PROGRESS_POLL {
            update_progress(bar, pipeline);
            last_report = Instant::now();
        }
        thread::sleep(Duration::from_millis(20));
    }
    let stats = handle
        .join()
        .map_err(|_| anyhow!("playback thread panicked"))?
        .context("rendering frames")?;
    tracing::info!(rendered = stats.rendered, skipped = stats.skipped, "playback done");
    Ok(())
}

fn play_polled(frames: FrameReceiver, pipeline: &Pipeline, tick: Duration, bar: Option<&ProgressBar>) -> Result<()> {
    let mut player = PolledPlayer::new(frames).with_cancel(pipeline.cancel_token());
    let mut surface = ConsoleSurface::stdout();
    let mut last_report = Instant::now();

    loop {
        if player.tick(&mut surface).context("rendering frames")? == Tick::Finished {
            break;
        }
        if last_report.elapsed() >= PROGRESS_POLL {
            update_progress(bar, pipeline);
            last_report = Instant::now();
        }
        thread::sleep(tick);
    }
    let stats = player.stats();
    tracing::info!(rendered = stats.rendered, skipped = stats.skipped, "playback done");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let app = AppConfig::load(args.config.as_deref()).context("loading config")?;
    let cfg = playback_config(&args, &app).context("resolving playback settings")?;

    let input = args.input.as_path();
    if !input.exists() {
        bail!("Input path does not exist: {}", input.display());
    }

    if args.info {
        let meta = if input.is_dir() {
            *ImageSequenceSource::open(input, sequence_rate(&args, &cfg))
                .with_context(|| format!("opening {}", input.display()))?
                .metadata()
        } else {
            probe(input, &app.ffmpeg).with_context(|| format!("probing {}", input.display()))?
        };
        print_info(input, &meta);
        return Ok(());
    }

    let (mut pipeline, frames) = if input.is_dir() {
        let source = ImageSequenceSource::open(input, sequence_rate(&args, &cfg))
            .with_context(|| format!("opening {}", input.display()))?;
        Pipeline::start(source, &cfg)
    } else {
        Pipeline::open(input, &cfg, &app.ffmpeg)
    }
    .with_context(|| format!("starting conversion of {}", input.display()))?;

    let token = pipeline.cancel_token();
    ctrlc::set_handler(move || token.cancel()).context("installing Ctrl-C handler")?;

    let bar = args.progress.then(|| make_progress_bar(pipeline.metadata().frame_count));

    let played = match args.mode {
        Mode::Console => play_console(frames, &pipeline, &cfg, bar.as_ref()),
        Mode::Polled => play_polled(frames, &pipeline, Duration::from_millis(args.tick_ms), bar.as_ref()),
    };
    if played.is_err() {
        pipeline.stop();
    }
    let outcome = pipeline.join();

    if let Some(pb) = bar {
        update_progress(Some(&pb), &pipeline);
        pb.finish_with_message(pipeline.progress().message);
    }
    played?;

    match outcome {
        RunOutcome::Failed(msg) => {
            let state = pipeline.state();
            match state.take_error() {
                Some(err) => Err(err).context("conversion failed"),
                None => Err(anyhow!(msg)).context("conversion failed"),
            }
        }
        RunOutcome::Cancelled => {
            eprintln!("Stopped after {} frames", pipeline.state().processed_frames());
            Ok(())
        }
        _ => Ok(()),
    }
}
