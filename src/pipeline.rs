//! The conversion pipeline: a producer thread that decodes and converts
//! frames into a bounded channel, and the shared state it reports through.
//!
//! Every run ends with exactly one end-of-stream delivery on the receiver,
//! whether the source ran out, the run was cancelled, or decoding failed.
//! The cause is read from [`PipelineState`], never from the stream.

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError, TrySendError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::config::PlaybackConfig;
use crate::convert::FrameConverter;
use crate::error::{PlayerError, Result};
use crate::ffmpeg::{FfmpegConfig, FfmpegSource};
use crate::glyph::GlyphFrame;
use crate::progress::Progress;
use crate::source::{FrameSource, ImageSequenceSource, VideoMetadata};

/// An item on the frame channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Frame(GlyphFrame),
    /// No more frames will follow.
    EndOfStream,
}

/// How a run finished (or that it has not yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    NotStarted,
    Running,
    /// The source ran out of frames.
    Completed,
    /// Stopped through [`Pipeline::stop`] or a [`CancelToken`]. Not an error.
    Cancelled,
    /// Decoding or conversion failed; the message mirrors the stored error.
    Failed(String),
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Counters and outcome of a run. Written by the producer only.
#[derive(Debug)]
pub struct PipelineState {
    running: AtomicBool,
    total_frames: AtomicU64,
    processed_frames: AtomicU64,
    outcome: Mutex<RunOutcome>,
    error: Mutex<Option<PlayerError>>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            total_frames: AtomicU64::new(0),
            processed_frames: AtomicU64::new(0),
            outcome: Mutex::new(RunOutcome::NotStarted),
            error: Mutex::new(None),
        }
    }
}

impl PipelineState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 0 while unknown.
    pub fn total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Acquire)
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed_frames.load(Ordering::Acquire)
    }

    pub fn outcome(&self) -> RunOutcome {
        lock(&self.outcome).clone()
    }

    /// The error that ended a failed run, if it has not been taken yet.
    pub fn take_error(&self) -> Option<PlayerError> {
        lock(&self.error).take()
    }

    pub fn progress(&self) -> Progress {
        Progress::snapshot(self)
    }

    fn begin(&self, total: u64) {
        self.total_frames.store(total, Ordering::Release);
        self.processed_frames.store(0, Ordering::Release);
        *lock(&self.outcome) = RunOutcome::Running;
        self.running.store(true, Ordering::Release);
    }

    fn record_frame(&self) -> u64 {
        self.processed_frames.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn finish(&self, result: std::result::Result<RunOutcome, PlayerError>) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let outcome = RunOutcome::Failed(err.to_string());
                *lock(&self.error) = Some(err);
                outcome
            }
        };
        *lock(&self.outcome) = outcome;
        self.running.store(false, Ordering::Release);
    }
}

struct CancelInner {
    flag: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Cooperative cancellation shared between the pipeline and its consumers.
///
/// Cancelling sets a flag and disconnects a zero-capacity channel, so a
/// thread blocked in a `select!` on [`CancelToken::signal`] wakes up.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken").field("cancelled", &self.is_cancelled()).finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::Release);
        lock(&self.inner.trigger).take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Becomes ready (disconnected) once cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

/// Receiving end of the frame channel.
///
/// Yields exactly one [`Message::EndOfStream`] and nothing after it. If the
/// producer goes away without sending the marker, the disconnect is reported
/// as that one end-of-stream.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: Receiver<Message>,
    finished: bool,
}

impl FrameReceiver {
    fn new(rx: Receiver<Message>) -> Self {
        Self { rx, finished: false }
    }

    fn accept(&mut self, msg: Message) -> Message {
        if msg == Message::EndOfStream {
            self.finished = true;
        }
        msg
    }

    /// Block until a frame or the end of stream. `None` once the end was delivered.
    pub fn recv(&mut self) -> Option<Message> {
        if self.finished {
            return None;
        }
        let msg = self.rx.recv().unwrap_or(Message::EndOfStream);
        Some(self.accept(msg))
    }

    /// Non-blocking. `None` when nothing is ready or the end was delivered.
    pub fn try_recv(&mut self) -> Option<Message> {
        if self.finished {
            return None;
        }
        match self.rx.try_recv() {
            Ok(msg) => Some(self.accept(msg)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.accept(Message::EndOfStream)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Messages waiting in the channel.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Iterator for FrameReceiver {
    type Item = GlyphFrame;

    /// Frames in order; ends at the end-of-stream marker.
    fn next(&mut self) -> Option<GlyphFrame> {
        match self.recv()? {
            Message::Frame(frame) => Some(frame),
            Message::EndOfStream => None,
        }
    }
}

enum Sent {
    Delivered,
    Cancelled,
    Disconnected,
}

fn send_or_cancel(tx: &Sender<Message>, msg: Message, cancel: &CancelToken) -> Sent {
    select! {
        send(tx, msg) -> res => match res {
            Ok(()) => Sent::Delivered,
            Err(_) => Sent::Disconnected,
        },
        recv(cancel.signal()) -> _ => Sent::Cancelled,
    }
}

fn deliver_end(tx: &Sender<Message>, cancel: &CancelToken) {
    match tx.try_send(Message::EndOfStream) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(msg)) => {
            if cancel.is_cancelled() {
                // the receiver reports the disconnect as the end of stream
                tracing::debug!("channel full at cancellation, ending by disconnect");
                return;
            }
            let _ = send_or_cancel(tx, msg, cancel);
        }
    }
}

fn produce<S: FrameSource>(
    source: &mut S,
    converter: &mut FrameConverter,
    tx: &Sender<Message>,
    state: &PipelineState,
    cancel: &CancelToken,
) -> std::result::Result<RunOutcome, PlayerError> {
    let total = state.total_frames();
    loop {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        if total > 0 && state.processed_frames() >= total {
            tracing::debug!(total, "reached the advertised frame count");
            return Ok(RunOutcome::Completed);
        }

        let Some(raw) = source.next_frame()? else {
            return Ok(RunOutcome::Completed);
        };
        let frame = converter.convert(raw)?;

        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        match send_or_cancel(tx, Message::Frame(frame), cancel) {
            Sent::Delivered => {
                let n = state.record_frame();
                tracing::trace!(frame = n, "frame queued");
            }
            Sent::Cancelled => return Ok(RunOutcome::Cancelled),
            Sent::Disconnected => {
                tracing::debug!("frame receiver dropped, stopping production");
                return Ok(RunOutcome::Cancelled);
            }
        }
    }
}

/// A running (or finished) conversion run.
pub struct Pipeline {
    metadata: VideoMetadata,
    state: Arc<PipelineState>,
    cancel: CancelToken,
    producer: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Validate `config`, then convert `source` on a new thread.
    ///
    /// Returns immediately with the handle and the frame receiver.
    pub fn start<S>(mut source: S, config: &PlaybackConfig) -> Result<(Self, FrameReceiver)>
    where
        S: FrameSource + 'static,
    {
        let mut converter = FrameConverter::new(config)?;
        let metadata = *source.metadata();
        let state = Arc::new(PipelineState::default());
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(config.channel_capacity);

        state.begin(metadata.frame_count);
        tracing::info!(
            width = metadata.width,
            height = metadata.height,
            frames = metadata.frame_count,
            columns = config.columns,
            capacity = config.channel_capacity,
            "pipeline started"
        );

        let thread_state = Arc::clone(&state);
        let thread_cancel = cancel.clone();
        let producer = thread::Builder::new().name("glyphreel-producer".into()).spawn(move || {
            let result = produce(&mut source, &mut converter, &tx, &thread_state, &thread_cancel);
            source.close();
            match &result {
                Ok(outcome) => tracing::info!(
                    ?outcome,
                    processed = thread_state.processed_frames(),
                    "pipeline finished"
                ),
                Err(err) => tracing::warn!(error = %err, "pipeline failed"),
            }
            thread_state.finish(result);
            deliver_end(&tx, &thread_cancel);
        });

        let producer = producer?;

        Ok((Self { metadata, state, cancel, producer: Some(producer) }, FrameReceiver::new(rx)))
    }

    /// Open `path` and start converting it.
    ///
    /// Directories are played as image sequences at the configured rate;
    /// anything else is decoded with ffmpeg.
    pub fn open(path: &Path, config: &PlaybackConfig, ffmpeg: &FfmpegConfig) -> Result<(Self, FrameReceiver)> {
        config.validate()?;
        if path.is_dir() {
            Self::start(ImageSequenceSource::open(path, config.target_rate)?, config)
        } else {
            Self::start(FfmpegSource::open(path, ffmpeg)?, config)
        }
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn state(&self) -> Arc<PipelineState> {
        Arc::clone(&self.state)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> Progress {
        self.state.progress()
    }

    /// Cancel the run and wait for the producer. Safe to call repeatedly.
    pub fn stop(&mut self) -> RunOutcome {
        self.cancel.cancel();
        self.join()
    }

    /// Wait for the producer to finish on its own.
    pub fn join(&mut self) -> RunOutcome {
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                let frame = self.state.processed_frames();
                tracing::warn!(frame, "producer thread panicked");
                self.state.finish(Err(PlayerError::decode(frame, "producer thread panicked")));
            }
        }
        self.state.outcome()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.producer.is_some() {
            self.stop();
        }
    }
}
