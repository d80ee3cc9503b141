//! Video decoding through the `ffprobe` / `ffmpeg` executables.
//!
//! Metadata comes from `ffprobe` JSON output; frames are streamed from an
//! `ffmpeg` child process as raw 8-bit gray planes on stdout.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command as ProcCommand, Stdio};
use std::thread::{self, JoinHandle};

use crate::error::{PlayerError, Result};
use crate::source::{FrameSource, RawFrame, VideoMetadata};

/// Names (or paths) of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self { ffmpeg: "ffmpeg".to_string(), ffprobe: "ffprobe".to_string() }
    }
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &str {
        &self.ffmpeg
    }

    pub fn ffprobe_cmd(&self) -> &str {
        &self.ffprobe
    }
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
fn parse_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_probe_output(path: &Path, json: &[u8]) -> Result<VideoMetadata> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| PlayerError::source_open(path, format!("ffprobe json parse failed: {}", e)))?;
    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PlayerError::source_open(path, "no video stream found"))?;

    let width = stream.width.filter(|&w| w > 0);
    let height = stream.height.filter(|&h| h > 0);
    let (Some(width), Some(height)) = (width, height) else {
        return Err(PlayerError::source_open(path, "video stream has no dimensions"));
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| PlayerError::source_open(path, "video stream has no frame rate"))?;

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.trim().parse::<u64>().ok()) {
        Some(n) => n,
        None => {
            let duration = stream
                .duration
                .as_deref()
                .or_else(|| parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0);
            match duration {
                Some(d) => {
                    let estimate = (d * frame_rate).round() as u64;
                    tracing::warn!(path = %path.display(), estimate, "container has no frame count, estimating from duration");
                    estimate
                }
                None => 0,
            }
        }
    };

    Ok(VideoMetadata::new(frame_rate, frame_count, width, height))
}

/// Read a video's metadata without decoding any frame.
pub fn probe(path: &Path, config: &FfmpegConfig) -> Result<VideoMetadata> {
    if !path.is_file() {
        return Err(PlayerError::source_open(path, "no such file"));
    }

    let out = ProcCommand::new(config.ffprobe_cmd())
        .args(["-v", "error", "-select_streams", "v:0", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PlayerError::source_open(path, format!("{} not found; install ffmpeg", config.ffprobe_cmd()))
            } else {
                PlayerError::source_open(path, format!("running {}: {}", config.ffprobe_cmd(), e))
            }
        })?;

    if !out.status.success() {
        return Err(PlayerError::source_open(
            path,
            format!("ffprobe failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
        ));
    }

    let meta = parse_probe_output(path, &out.stdout)?;
    tracing::debug!(
        path = %path.display(),
        width = meta.width,
        height = meta.height,
        fps = meta.frame_rate,
        frames = meta.frame_count,
        "probed video"
    );
    Ok(meta)
}

/// Fill `buf` from `reader`, returning how many bytes arrived before EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

struct Decoder {
    child: Child,
    stdout: ChildStdout,
    stderr_thread: Option<JoinHandle<Vec<String>>>,
}

impl Decoder {
    fn spawn(path: &Path, meta: &VideoMetadata, config: &FfmpegConfig) -> Result<Self> {
        let mut cmd = ProcCommand::new(config.ffmpeg_cmd());
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-an", "-f", "rawvideo", "-pix_fmt", "gray"]);
        if meta.frame_count > 0 {
            cmd.arg("-frames:v").arg(meta.frame_count.to_string());
        }
        cmd.arg("-").stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PlayerError::source_open(path, format!("{} not found; install ffmpeg", config.ffmpeg_cmd()))
            } else {
                PlayerError::source_open(path, format!("spawning {}: {}", config.ffmpeg_cmd(), e))
            }
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PlayerError::source_open(path, "failed to capture ffmpeg stdout"));
            }
        };

        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut lines = Vec::new();
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(l) => {
                            tracing::debug!(target: "glyphreel::ffmpeg", "{}", l);
                            lines.push(l);
                        }
                        Err(_) => break,
                    }
                }
                lines
            })
        });

        Ok(Self { child, stdout, stderr_thread })
    }

    fn stderr_output(&mut self) -> String {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }

    fn shutdown(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = self.stderr_output();
    }
}

/// A video file decoded by an `ffmpeg` child process.
pub struct FfmpegSource {
    path: PathBuf,
    metadata: VideoMetadata,
    decoder: Option<Decoder>,
    buffer: Vec<u8>,
    read: u64,
}

impl FfmpegSource {
    pub fn open(path: &Path, config: &FfmpegConfig) -> Result<Self> {
        let metadata = probe(path, config)?;
        let decoder = Decoder::spawn(path, &metadata, config)?;
        let frame_bytes = metadata.width as usize * metadata.height as usize;
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            decoder: Some(decoder),
            buffer: vec![0u8; frame_bytes],
            read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FfmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        let filled = read_full(&mut decoder.stdout, &mut self.buffer)
            .map_err(|e| PlayerError::decode(self.read, e.to_string()))?;

        if filled == self.buffer.len() {
            self.read += 1;
            let frame = RawFrame::new(self.metadata.width, self.metadata.height, self.buffer.clone())?;
            return Ok(Some(frame));
        }

        // EOF: either a clean finish or a decoder failure
        let mut decoder = match self.decoder.take() {
            Some(d) => d,
            None => return Ok(None),
        };
        let status = decoder.child.wait().map_err(|e| PlayerError::decode(self.read, e.to_string()))?;
        let stderr = decoder.stderr_output();

        if !status.success() {
            return Err(PlayerError::decode(self.read, format!("ffmpeg exited with {}: {}", status, stderr.trim())));
        }
        if filled > 0 {
            return Err(PlayerError::decode(
                self.read,
                format!("truncated frame: {} of {} bytes", filled, self.buffer.len()),
            ));
        }
        tracing::debug!(path = %self.path.display(), frames = self.read, "decoder reached end of stream");
        Ok(None)
    }

    fn close(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            tracing::debug!(path = %self.path.display(), "closing decoder");
            decoder.shutdown();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}
