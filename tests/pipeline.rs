use crossbeam_channel::{unbounded, Receiver, Sender};
use glyphreel::{
    FrameSource, Message, MemorySource, Pipeline, PlaybackConfig, PlayerError, ProgressPhase, RawFrame, RunOutcome,
    VideoMetadata,
};
use std::thread;
use std::time::{Duration, Instant};

fn config(columns: u32) -> PlaybackConfig {
    PlaybackConfig::default().with_columns(columns)
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Counts every end-of-stream the receiver yields while draining it.
fn drain(frames: &mut glyphreel::FrameReceiver) -> (Vec<String>, usize) {
    let mut texts = Vec::new();
    let mut ends = 0;
    while let Some(msg) = frames.recv() {
        match msg {
            Message::Frame(f) => texts.push(f.into_string()),
            Message::EndOfStream => ends += 1,
        }
    }
    (texts, ends)
}

/// Hands out one frame per permit. Advertises `claimed` frames.
struct GatedSource {
    metadata: VideoMetadata,
    frame: RawFrame,
    remaining: u64,
    gate: Receiver<()>,
}

impl GatedSource {
    fn new(claimed: u64, available: u64) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        let frame = RawFrame::new(8, 4, vec![0; 32]).unwrap();
        let src = Self { metadata: VideoMetadata::new(24.0, claimed, 8, 4), frame, remaining: available, gate: rx };
        (src, tx)
    }
}

impl FrameSource for GatedSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> glyphreel::Result<Option<RawFrame>> {
        if self.remaining == 0 || self.gate.recv().is_err() {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(self.frame.clone()))
    }
}

/// Yields `good` frames, then panics inside `next_frame`.
struct PanickingSource {
    metadata: VideoMetadata,
    good: u64,
}

impl FrameSource for PanickingSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> glyphreel::Result<Option<RawFrame>> {
        if self.good == 0 {
            panic!("decoder blew up");
        }
        self.good -= 1;
        Ok(Some(RawFrame::new(8, 4, vec![0; 32]).unwrap()))
    }
}

#[test]
fn four_small_frames_play_through() {
    let src = MemorySource::uniform(8, 4, 0, 4, 24.0).unwrap();
    let (mut pipeline, mut frames) = Pipeline::start(src, &config(4)).unwrap();

    let (texts, ends) = drain(&mut frames);
    assert_eq!(ends, 1);
    assert_eq!(texts, vec!["@@@@\n".to_string(); 4]);

    assert_eq!(pipeline.join(), RunOutcome::Completed);
    let state = pipeline.state();
    assert_eq!(state.processed_frames(), 4);
    assert_eq!(state.total_frames(), 4);
    assert!(!state.is_running());

    let progress = pipeline.progress();
    assert_eq!(progress.phase, ProgressPhase::Complete);
    assert_eq!(progress.percentage, Some(100.0));
}

#[test]
fn stop_midway_keeps_the_count() {
    let (src, gate) = GatedSource::new(10, 10);
    let (mut pipeline, mut frames) = Pipeline::start(src, &config(4)).unwrap();
    let state = pipeline.state();

    gate.send(()).unwrap();
    gate.send(()).unwrap();
    wait_for("two frames", || state.processed_frames() == 2);

    // producer is now parked on the gate for frame three
    pipeline.cancel_token().cancel();
    gate.send(()).unwrap();
    assert_eq!(pipeline.stop(), RunOutcome::Cancelled);
    assert_eq!(state.processed_frames(), 2);

    let (texts, ends) = drain(&mut frames);
    assert_eq!(texts.len(), 2);
    assert_eq!(ends, 1);
    assert_eq!(pipeline.progress().phase, ProgressPhase::Cancelled);
}

#[test]
fn full_channel_blocks_the_producer() {
    let src = MemorySource::uniform(8, 4, 0, 30, 24.0).unwrap();
    let cfg = config(4).with_channel_capacity(10);
    let (mut pipeline, mut frames) = Pipeline::start(src, &cfg).unwrap();
    let state = pipeline.state();

    wait_for("a full channel", || state.processed_frames() == 10);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(state.processed_frames(), 10);
    assert_eq!(frames.pending(), 10);
    assert!(state.is_running());

    assert!(matches!(frames.recv(), Some(Message::Frame(_))));
    wait_for("one more frame", || state.processed_frames() == 11);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(state.processed_frames(), 11);
    assert_eq!(frames.pending(), 10);

    // cancelling with a full channel still produces exactly one end
    assert_eq!(pipeline.stop(), RunOutcome::Cancelled);
    let (texts, ends) = drain(&mut frames);
    assert_eq!(texts.len(), 10);
    assert_eq!(ends, 1);
}

#[test]
fn decode_error_ends_the_stream_once() {
    let src = MemorySource::uniform(8, 4, 0, 5, 24.0).unwrap().fail_at(2);
    let (mut pipeline, mut frames) = Pipeline::start(src, &config(4)).unwrap();

    let (texts, ends) = drain(&mut frames);
    assert_eq!(texts.len(), 2);
    assert_eq!(ends, 1);

    assert!(matches!(pipeline.join(), RunOutcome::Failed(_)));
    let state = pipeline.state();
    assert_eq!(state.processed_frames(), 2);
    assert!(matches!(state.take_error(), Some(PlayerError::Decode { frame: 2, .. })));
    assert_eq!(pipeline.progress().phase, ProgressPhase::Failed);
}

#[test]
fn advertised_total_caps_production() {
    let (src, gate) = GatedSource::new(2, 5);
    for _ in 0..5 {
        gate.send(()).unwrap();
    }
    let (mut pipeline, frames) = Pipeline::start(src, &config(4)).unwrap();
    assert_eq!(frames.count(), 2);
    assert_eq!(pipeline.join(), RunOutcome::Completed);
    assert_eq!(pipeline.state().processed_frames(), 2);
}

#[test]
fn unknown_total_reports_no_percentage() {
    let (src, gate) = GatedSource::new(0, 3);
    for _ in 0..3 {
        gate.send(()).unwrap();
    }
    let (mut pipeline, frames) = Pipeline::start(src, &config(4)).unwrap();
    assert_eq!(frames.count(), 3);
    assert_eq!(pipeline.join(), RunOutcome::Completed);

    let progress = pipeline.progress();
    assert_eq!(progress.total, 0);
    assert_eq!(progress.completed, 3);
    assert_eq!(progress.percentage, None);
}

#[test]
fn dropped_receiver_stops_the_producer() {
    let src = MemorySource::uniform(8, 4, 0, 50, 24.0).unwrap();
    let (mut pipeline, frames) = Pipeline::start(src, &config(4).with_channel_capacity(2)).unwrap();
    drop(frames);
    assert_eq!(pipeline.join(), RunOutcome::Cancelled);
    assert!(pipeline.state().processed_frames() <= 2);
}

#[test]
fn image_directory_plays_as_frames() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3u8 {
        let img = image::GrayImage::from_pixel(16, 8, image::Luma([i * 100]));
        img.save(dir.path().join(format!("still_{:03}.png", i))).unwrap();
    }

    let cfg = config(8).with_target_rate(30.0);
    let (mut pipeline, frames) =
        Pipeline::open(dir.path(), &cfg, &glyphreel::FfmpegConfig::default()).unwrap();
    assert_eq!(pipeline.metadata().frame_rate, 30.0);
    assert_eq!(pipeline.metadata().frame_count, 3);

    let all: Vec<_> = frames.collect();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|f| f.columns() == 8 && f.rows() == 2));
    assert!(all[0].as_str().chars().all(|c| c == '@' || c == '\n'));
    assert_eq!(pipeline.join(), RunOutcome::Completed);
}

#[test]
fn producer_panic_is_reported_as_decode_failure() {
    let src = PanickingSource { metadata: VideoMetadata::new(24.0, 5, 8, 4), good: 2 };
    let (mut pipeline, mut frames) = Pipeline::start(src, &config(4)).unwrap();

    let (texts, ends) = drain(&mut frames);
    assert_eq!(texts.len(), 2);
    assert_eq!(ends, 1);

    assert!(matches!(pipeline.join(), RunOutcome::Failed(msg) if msg.contains("panicked")));
    assert!(matches!(pipeline.state().take_error(), Some(PlayerError::Decode { frame: 2, .. })));
}
