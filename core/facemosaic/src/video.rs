//! Video decode and encode through the `ffmpeg` and `ffprobe` binaries.
//!
//! Frames travel as raw `rgb24` over pipes, so they map one-to-one onto
//! [`Frame`] buffers without any channel reordering.

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info};

use crate::Frame;

/// Container extensions accepted as video input.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv"];

/// Frame rate assumed when ffprobe reports none.
const FALLBACK_FPS: f64 = 30.0;

/// Errors from the ffmpeg adapter.
#[derive(Debug, Error)]
pub enum VideoError {
    /// The ffmpeg or ffprobe binary could not be started.
    #[error("ffmpeg not found; install it or pass explicit binary paths")]
    NotFound,

    /// ffmpeg exited with an error; holds its exit status and stderr.
    #[error("ffmpeg execution failed: {0}")]
    ExecutionFailed(String),

    /// The input file is missing or the stream geometry is unusable.
    #[error("invalid video input: {0}")]
    InvalidInput(String),

    /// ffprobe failed or reported no usable video stream.
    #[error("ffprobe error: {0}")]
    ProbeError(String),

    /// ffprobe output or a decoded frame could not be interpreted.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A frame handed to the encoder does not match the stream size.
    #[error("frame is {got_width}x{got_height}, stream expects {width}x{height}")]
    FrameSize {
        /// Stream width.
        width: u32,
        /// Stream height.
        height: u32,
        /// Width of the rejected frame.
        got_width: u32,
        /// Height of the rejected frame.
        got_height: u32,
    },

    /// Spawning or talking to a child process failed.
    #[error("process error: {0}")]
    Process(#[from] io::Error),
}

/// Whether `path` has one of the [`VIDEO_EXTENSIONS`].
pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Stream geometry and timing reported by ffprobe.
///
/// `width` and `height` are the size of the decoded frames. For streams
/// tagged with a quarter-turn rotation they are the coded size swapped,
/// because ffmpeg turns the picture upright while decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Display rotation in degrees, normalised to `0`, `90`, `180` or `270`.
    pub rotation: u32,
    /// Frames per second.
    pub fps: f64,
    /// Rate as ffprobe wrote it (e.g. `30000/1001`), passed back to the encoder.
    pub frame_rate: String,
}

impl VideoInfo {
    /// Stream description with an integral rate.
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            rotation: 0,
            fps,
            frame_rate: format!("{fps}"),
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Locations of the ffmpeg binaries.
#[derive(Debug, Clone)]
pub struct FfmpegVideo {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl Default for FfmpegVideo {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegVideo {
    /// Use explicit binaries. Bare names are resolved through `PATH`.
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// First line of `ffmpeg -version`.
    pub fn version(&self) -> Result<String, VideoError> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .output()
            .map_err(spawn_error)?;
        if !output.status.success() {
            return Err(VideoError::ExecutionFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Read the first video stream's size and frame rate.
    pub fn probe(&self, input: &Path) -> Result<VideoInfo, VideoError> {
        if !input.is_file() {
            return Err(VideoError::InvalidInput(format!(
                "{} does not exist",
                input.display()
            )));
        }

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-select_streams", "v:0", "-show_streams"])
            .args(["-print_format", "json"])
            .arg(input)
            .output()
            .map_err(spawn_error)?;

        if !output.status.success() {
            return Err(VideoError::ProbeError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(input = %input.display(), ?info, "probed video");
        Ok(info)
    }

    /// Start decoding `input` to a stream of frames.
    pub fn open_reader(&self, input: &Path, info: &VideoInfo) -> Result<FrameReader, VideoError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-nostdin", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VideoError::ExecutionFailed("decoder stdout unavailable".into()))?;
        let stderr = child.stderr.take().map(drain_stderr);

        debug!(input = %input.display(), rotation = info.rotation, "started ffmpeg decoder");
        Ok(FrameReader {
            child: Some(ChildProcess { child, stderr }),
            stdout,
            info: info.clone(),
        })
    }

    /// Start encoding frames of `info`'s size to `output` with `codec`.
    ///
    /// The output carries video only; any audio of the source is dropped.
    pub fn open_writer(
        &self,
        output: &Path,
        info: &VideoInfo,
        codec: &str,
    ) -> Result<FrameWriter, VideoError> {
        if info.width == 0 || info.height == 0 {
            return Err(VideoError::InvalidInput("zero-sized video".into()));
        }

        let size = format!("{}x{}", info.width, info.height);
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-y", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s", &size])
            .args(["-r", &info.frame_rate, "-i", "-"])
            .args(["-an", "-c:v", codec, "-pix_fmt", "yuv420p"])
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VideoError::ExecutionFailed("encoder stdin unavailable".into()))?;
        let stderr = child.stderr.take().map(drain_stderr);

        debug!(output = %output.display(), codec, size = %size, "started ffmpeg encoder");
        Ok(FrameWriter {
            child: Some(ChildProcess { child, stderr }),
            stdin: Some(stdin),
            info: info.clone(),
            frames: 0,
        })
    }

    /// Decode a whole file into memory.
    pub fn read_video(&self, input: &Path) -> Result<(Vec<Frame>, VideoInfo), VideoError> {
        let info = self.probe(input)?;
        let frames = self
            .open_reader(input, &info)?
            .collect::<Result<Vec<_>, _>>()?;
        info!(input = %input.display(), frames = frames.len(), fps = info.fps, "decoded video");
        Ok((frames, info))
    }

    /// Encode in-memory frames. Returns the number of frames written.
    pub fn write_video(
        &self,
        frames: &[Frame],
        info: &VideoInfo,
        output: &Path,
        codec: &str,
    ) -> Result<usize, VideoError> {
        let mut writer = self.open_writer(output, info, codec)?;
        for frame in frames {
            writer.write_frame(frame)?;
        }
        writer.finish()
    }
}

fn spawn_error(e: io::Error) -> VideoError {
    if e.kind() == ErrorKind::NotFound {
        VideoError::NotFound
    } else {
        VideoError::Process(e)
    }
}

/// Read a child's stderr to the end on its own thread. ffmpeg stalls once
/// the pipe buffer is full, and frames are only read after it writes them.
fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// A running ffmpeg and the thread collecting its stderr.
struct ChildProcess {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl ChildProcess {
    fn wait(mut self) -> Result<(), VideoError> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            Ok(())
        } else {
            Err(VideoError::ExecutionFailed(format!(
                "{}: {}",
                status,
                stderr.trim()
            )))
        }
    }

    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}

/// Decoded frames, in presentation order.
pub struct FrameReader {
    child: Option<ChildProcess>,
    stdout: ChildStdout,
    info: VideoInfo,
}

impl FrameReader {
    /// Geometry of the frames produced.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let mut buffer = vec![0u8; self.info.frame_len()];
        let mut filled = 0;
        while filled < buffer.len() {
            match self.stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < buffer.len() {
            return Err(VideoError::ParseError(format!(
                "truncated frame: {filled} of {} bytes",
                buffer.len()
            )));
        }
        Frame::from_raw(self.info.width, self.info.height, buffer)
            .map(Some)
            .ok_or_else(|| VideoError::ParseError("frame buffer size mismatch".into()))
    }
}

impl Iterator for FrameReader {
    type Item = Result<Frame, VideoError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.child.as_ref()?;
        match self.read_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => self.child.take().and_then(|child| child.wait().err()).map(Err),
            Err(e) => {
                if let Some(child) = self.child.take() {
                    child.kill();
                }
                Some(Err(e))
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Some(child) = self.child.take() {
            child.kill();
        }
    }
}

/// Sink feeding frames to an ffmpeg encoder.
pub struct FrameWriter {
    child: Option<ChildProcess>,
    stdin: Option<ChildStdin>,
    info: VideoInfo,
    frames: usize,
}

impl FrameWriter {
    /// Append one frame. Its size must match the stream.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(VideoError::FrameSize {
                width: self.info.width,
                height: self.info.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| VideoError::ExecutionFailed("encoder already closed".into()))?;
        stdin.write_all(frame.as_raw())?;
        self.frames += 1;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Close the input and wait for the encoder. Returns the frame count.
    pub fn finish(mut self) -> Result<usize, VideoError> {
        drop(self.stdin.take());
        if let Some(child) = self.child.take() {
            child.wait()?;
        }
        Ok(self.frames)
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(child) = self.child.take() {
            child.kill();
        }
    }
}

/// Parse `ffprobe -show_streams -print_format json` output.
fn parse_probe_output(json_str: &str) -> Result<VideoInfo, VideoError> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| VideoError::ParseError(format!("failed to parse ffprobe output: {e}")))?;

    let stream = json
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| {
            streams.iter().find(|s| {
                s.get("codec_type")
                    .and_then(|c| c.as_str())
                    .map_or(true, |c| c == "video")
            })
        })
        .ok_or_else(|| VideoError::ProbeError("no video stream".to_string()))?;

    let dimension = |key: &str| {
        stream
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|&v| v > 0)
            .ok_or_else(|| VideoError::ProbeError(format!("missing stream {key}")))
    };
    let coded_width = dimension("width")?;
    let coded_height = dimension("height")?;
    let rotation = stream_rotation(stream);
    let (width, height) = if rotation % 180 == 90 {
        (coded_height, coded_width)
    } else {
        (coded_width, coded_height)
    };

    let rate = ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| stream.get(*key).and_then(|f| f.as_str()))
        .find_map(|s| parse_frame_rate(s).map(|fps| (s.to_string(), fps)));

    Ok(match rate {
        Some((frame_rate, fps)) => VideoInfo {
            width,
            height,
            rotation,
            fps,
            frame_rate,
        },
        None => VideoInfo {
            rotation,
            ..VideoInfo::new(width, height, FALLBACK_FPS)
        },
    })
}

/// Rotation from the display matrix side data, or the legacy `rotate` tag.
fn stream_rotation(stream: &serde_json::Value) -> u32 {
    let from_side_data = stream
        .get("side_data_list")
        .and_then(|list| list.as_array())
        .and_then(|list| {
            list.iter()
                .find_map(|entry| entry.get("rotation").and_then(|r| r.as_f64()))
        });
    let from_tag = || {
        stream
            .get("tags")
            .and_then(|tags| tags.get("rotate"))
            .and_then(|r| r.as_str())
            .and_then(|r| r.trim().parse::<f64>().ok())
    };
    from_side_data
        .or_else(from_tag)
        .map(|degrees| ((degrees.round() as i64).rem_euclid(360)) as u32)
        .unwrap_or(0)
}

/// Parse `30/1`, `30000/1001` or a plain number. Zero and non-finite rates are rejected.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den <= 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
