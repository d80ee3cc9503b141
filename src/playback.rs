//! Consumers that pull rendered frames off the channel and hand them to a
//! display surface.
//!
//! [`BlockingPlayer`] owns its pacing: it blocks for each frame and sleeps
//! one frame interval after rendering. [`PolledPlayer`] is driven by an
//! external tick (a UI timer, an event loop) and never blocks.

use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::glyph::GlyphFrame;
use crate::pipeline::{CancelToken, FrameReceiver, Message};

/// Something that displays whole frames.
pub trait RenderSurface {
    /// Replace whatever is shown with `frame`.
    fn render(&mut self, frame: &GlyphFrame) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: RenderSurface + ?Sized> RenderSurface for &mut T {
    fn render(&mut self, frame: &GlyphFrame) -> Result<()> {
        (**self).render(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

impl<T: RenderSurface + ?Sized> RenderSurface for Box<T> {
    fn render(&mut self, frame: &GlyphFrame) -> Result<()> {
        (**self).render(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const HIDE_CURSOR: &str = "\x1b[?25l";
const SHOW_CURSOR: &str = "\x1b[?25h";

/// ANSI terminal output: clear, home, draw.
pub struct ConsoleSurface<W: Write> {
    out: W,
    started: bool,
}

impl ConsoleSurface<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out, started: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSurface for ConsoleSurface<W> {
    fn render(&mut self, frame: &GlyphFrame) -> Result<()> {
        if !self.started {
            self.out.write_all(HIDE_CURSOR.as_bytes())?;
            self.started = true;
        }
        self.out.write_all(CLEAR_SCREEN.as_bytes())?;
        self.out.write_all(frame.as_str().as_bytes())?;
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.write_all(SHOW_CURSOR.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Counters from a finished playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub rendered: u64,
    /// Frames drained without rendering after cancellation
    pub skipped: u64,
}

/// Blocking-pull consumer paced by a sleep after every rendered frame.
#[derive(Debug, Clone)]
pub struct BlockingPlayer {
    interval: Duration,
    cancel: Option<CancelToken>,
}

impl BlockingPlayer {
    pub fn new(config: &PlaybackConfig) -> Self {
        Self { interval: config.frame_interval(), cancel: None }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self { interval, cancel: None }
    }

    /// Once `token` fires, remaining frames are drained without rendering
    /// and a pending sleep is cut short.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    fn pause(&self) {
        match &self.cancel {
            // returns early when the token disconnects the signal
            Some(token) => {
                let _ = token.signal().recv_timeout(self.interval);
            }
            None => thread::sleep(self.interval),
        }
    }

    /// Play until the end of stream.
    pub fn run<R: RenderSurface>(&self, frames: &mut FrameReceiver, surface: &mut R) -> Result<PlaybackStats> {
        let mut stats = PlaybackStats::default();
        while let Some(msg) = frames.recv() {
            match msg {
                Message::EndOfStream => break,
                Message::Frame(frame) => {
                    if self.cancelled() {
                        stats.skipped += 1;
                        continue;
                    }
                    surface.render(&frame)?;
                    stats.rendered += 1;
                    self.pause();
                }
            }
        }
        surface.finish()?;
        tracing::debug!(rendered = stats.rendered, skipped = stats.skipped, "blocking playback finished");
        Ok(stats)
    }

    /// Run on a dedicated thread. The receiver is dropped when playback ends.
    pub fn spawn<R>(self, mut frames: FrameReceiver, mut surface: R) -> Result<JoinHandle<Result<PlaybackStats>>>
    where
        R: RenderSurface + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("glyphreel-playback".into())
            .spawn(move || self.run(&mut frames, &mut surface))?;
        Ok(handle)
    }
}

/// Result of one [`PolledPlayer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A frame was rendered.
    Rendered,
    /// Nothing was ready; try again next tick.
    Idle,
    /// The end of stream was reached, now or earlier.
    Finished,
}

/// Polled-pull consumer: one non-blocking dequeue per external tick.
#[derive(Debug)]
pub struct PolledPlayer {
    frames: FrameReceiver,
    cancel: Option<CancelToken>,
    stats: PlaybackStats,
    done: bool,
}

impl PolledPlayer {
    pub fn new(frames: FrameReceiver) -> Self {
        Self { frames, cancel: None, stats: PlaybackStats::default(), done: false }
    }

    /// Once `token` fires, each tick drains whatever is queued without rendering.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.done
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    fn end<R: RenderSurface>(&mut self, surface: &mut R) -> Result<Tick> {
        self.done = true;
        surface.finish()?;
        tracing::debug!(rendered = self.stats.rendered, skipped = self.stats.skipped, "polled playback finished");
        Ok(Tick::Finished)
    }

    pub fn tick<R: RenderSurface>(&mut self, surface: &mut R) -> Result<Tick> {
        if self.done {
            return Ok(Tick::Finished);
        }

        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            while let Some(msg) = self.frames.try_recv() {
                match msg {
                    Message::Frame(_) => self.stats.skipped += 1,
                    Message::EndOfStream => return self.end(surface),
                }
            }
            return Ok(Tick::Idle);
        }

        match self.frames.try_recv() {
            None => Ok(Tick::Idle),
            Some(Message::EndOfStream) => self.end(surface),
            Some(Message::Frame(frame)) => {
                surface.render(&frame)?;
                self.stats.rendered += 1;
                Ok(Tick::Rendered)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::Pipeline;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<String>,
        finished: u32,
    }

    impl RenderSurface for Recorder {
        fn render(&mut self, frame: &GlyphFrame) -> Result<()> {
            self.frames.push(frame.as_str().to_string());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished += 1;
            Ok(())
        }
    }

    fn config() -> PlaybackConfig {
        PlaybackConfig::default().with_columns(4).with_target_rate(1000.0)
    }

    #[test]
    fn console_surface_clears_before_each_frame() {
        let src = MemorySource::uniform(8, 4, 0, 2, 24.0).unwrap();
        let (_pipeline, mut frames) = Pipeline::start(src, &config()).unwrap();
        let mut surface = ConsoleSurface::new(Vec::new());
        BlockingPlayer::new(&config()).run(&mut frames, &mut surface).unwrap();

        let out = String::from_utf8(surface.into_inner()).unwrap();
        assert!(out.starts_with(HIDE_CURSOR));
        assert!(out.ends_with(SHOW_CURSOR));
        assert_eq!(out.matches(CLEAR_SCREEN).count(), 2);
        assert_eq!(out.matches("@@@@\n").count(), 2);
    }

    #[test]
    fn blocking_player_renders_all_frames_once() {
        let src = MemorySource::uniform(8, 4, 255, 5, 24.0).unwrap();
        let (_pipeline, mut frames) = Pipeline::start(src, &config()).unwrap();
        let mut rec = Recorder::default();
        let stats = BlockingPlayer::new(&config()).run(&mut frames, &mut rec).unwrap();
        assert_eq!(stats.rendered, 5);
        assert_eq!(rec.frames.len(), 5);
        assert_eq!(rec.finished, 1);
        assert!(frames.is_finished());
        assert!(frames.recv().is_none());
    }

    #[test]
    fn polled_player_idles_until_frames_arrive() {
        let src = MemorySource::uniform(8, 4, 0, 3, 24.0).unwrap();
        let (mut pipeline, frames) = Pipeline::start(src, &config()).unwrap();
        pipeline.join();

        let mut player = PolledPlayer::new(frames);
        let mut rec = Recorder::default();
        let mut ticks = Vec::new();
        loop {
            let t = player.tick(&mut rec).unwrap();
            ticks.push(t);
            if t == Tick::Finished {
                break;
            }
        }
        assert_eq!(ticks, vec![Tick::Rendered, Tick::Rendered, Tick::Rendered, Tick::Finished]);
        assert_eq!(player.tick(&mut rec).unwrap(), Tick::Finished);
        assert_eq!(rec.finished, 1);
        assert_eq!(player.stats().rendered, 3);
    }
}
