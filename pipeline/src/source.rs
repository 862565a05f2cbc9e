use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use motion_cam_common::config::CaptureConfig;
use tracing::{debug, info, warn};

use crate::frame::Frame;

/// Where frames come from. The CLI decides which variant applies: no argument
/// means the default local device, anything else is a file path or URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    DefaultDevice,
    Path(String),
}

impl SourceTarget {
    pub fn from_arg(arg: Option<String>) -> Self {
        match arg {
            Some(path) if !path.is_empty() => SourceTarget::Path(path),
            _ => SourceTarget::DefaultDevice,
        }
    }
}

/// Producer of raw frames.
///
/// `None` means the source is exhausted or the device went away. Callers must
/// not expect a source to recover after returning `None`.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Frame>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("capture source not found: {0}")]
    NotFound(String),
    #[error("failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not get stdout handle from {0}")]
    NoStdout(String),
    #[error("no frames could be read from {input}: {stderr}")]
    NoFrames { input: String, stderr: String },
}

/// Lines of ffmpeg stderr kept for the startup diagnostic.
const STDERR_TAIL_LINES: usize = 8;

/// Decodes a capture device, file or URL by running `ffmpeg` and reading
/// fixed-size `rgb24` frames from its stdout.
///
/// Dropping the source kills the child, which releases the device.
pub struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    input: String,
    width: u32,
    height: u32,
    next_seq: u64,
    finished: bool,
    pending: Option<Frame>,
}

impl FfmpegSource {
    pub fn open(target: &SourceTarget, config: &CaptureConfig) -> Result<Self, OpenError> {
        let (input, format) = match target {
            SourceTarget::DefaultDevice => {
                info!(device = config.device, "opening default capture device");
                (config.device.clone(), Some(config.device_format.as_str()))
            }
            SourceTarget::Path(path) => {
                info!(path, "opening capture file/url");
                if !is_url(path) && !Path::new(path).exists() {
                    return Err(OpenError::NotFound(path.clone()));
                }
                (path.clone(), None)
            }
        };

        let scale = format!("scale={}:{}", config.width, config.height);
        let mut cmd = Command::new(&config.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if config.realtime && matches!(target, SourceTarget::Path(_)) {
            cmd.arg("-re");
        }
        if let Some(format) = format {
            cmd.args(["-f", format]);
        }
        cmd.args([
            "-i", input.as_str(),
            "-an",
            "-vf", scale.as_str(),
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| OpenError::Spawn {
            bin: config.ffmpeg_bin.clone(),
            source,
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                return Err(OpenError::NoStdout(config.ffmpeg_bin.clone()));
            }
        };

        let stderr = child.stderr.take().map(|stderr| drain_stderr(stderr, input.clone()));

        debug!(
            input,
            width = config.width,
            height = config.height,
            "ffmpeg capture started"
        );

        let mut source = Self {
            child,
            stdout,
            input,
            width: config.width,
            height: config.height,
            next_seq: 0,
            finished: false,
            pending: None,
        };

        // A device that is busy or a file ffmpeg cannot decode only shows up
        // once the first read comes back empty.
        match source.read_frame() {
            Some(frame) => {
                source.pending = Some(frame);
                Ok(source)
            }
            None => {
                let input = source.input.clone();
                drop(source);
                let stderr = stderr
                    .and_then(|handle| handle.join().ok())
                    .map(|tail| tail.into_iter().collect::<Vec<_>>().join("; "))
                    .filter(|tail| !tail.is_empty())
                    .unwrap_or_else(|| "decoder exited without output".into());
                Err(OpenError::NoFrames { input, stderr })
            }
        }
    }

    fn read_frame(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }

        let mut raw = vec![0u8; self.frame_len()];
        if let Err(e) = self.stdout.read_exact(&mut raw) {
            if e.kind() == ErrorKind::UnexpectedEof {
                info!(input = self.input, "capture source reached end of stream");
            } else {
                warn!(input = self.input, error = %e, "capture read failed, closing source");
            }
            self.finished = true;
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        // A size mismatch can only come from a broken pipe contract; hand out an
        // empty frame so the loop skips it.
        let image = RgbImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| RgbImage::new(0, 0));
        Some(Frame::captured_now(image, seq))
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.pending.take().or_else(|| self.read_frame())
    }

    fn name(&self) -> &str {
        &self.input
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!(input = self.input, "capture source closed");
    }
}

fn is_url(input: &str) -> bool {
    input.contains("://")
}

/// Log ffmpeg's stderr as it arrives. The thread ends when the child closes
/// the pipe and hands back the last few lines.
fn drain_stderr(stderr: ChildStderr, input: String) -> JoinHandle<VecDeque<String>> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            warn!(input, stderr = %line, "ffmpeg");
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail
    })
}

/// Replays a fixed sequence of frames, then reports end of stream.
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Wrap bare images, numbering them in order.
    pub fn from_images(images: impl IntoIterator<Item = RgbImage>) -> Self {
        Self::new(
            images
                .into_iter()
                .enumerate()
                .map(|(seq, image)| Frame::captured_now(image, seq as u64)),
        )
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_argument_selects_default_device() {
        assert_eq!(SourceTarget::from_arg(None), SourceTarget::DefaultDevice);
        assert_eq!(SourceTarget::from_arg(Some(String::new())), SourceTarget::DefaultDevice);
        assert_eq!(
            SourceTarget::from_arg(Some("clip.mp4".into())),
            SourceTarget::Path("clip.mp4".into())
        );
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let target = SourceTarget::Path("/nonexistent/motion-cam/clip.mp4".into());
        let err = FfmpegSource::open(&target, &CaptureConfig::default())
            .err()
            .expect("open should fail");
        assert!(matches!(err, OpenError::NotFound(_)));
    }

    #[test]
    fn missing_ffmpeg_is_an_open_error() {
        let config = CaptureConfig {
            ffmpeg_bin: "/nonexistent/motion-cam/ffmpeg".into(),
            ..CaptureConfig::default()
        };
        let target = SourceTarget::Path("rtsp://127.0.0.1:1/stream".into());
        let err = FfmpegSource::open(&target, &config).err().expect("open should fail");
        assert!(matches!(err, OpenError::Spawn { .. }));
    }

    #[test]
    fn decoder_that_exits_immediately_fails_open() {
        let config = CaptureConfig {
            ffmpeg_bin: "false".into(),
            ..CaptureConfig::default()
        };
        let target = SourceTarget::Path("/etc/hostname".into());
        let err = FfmpegSource::open(&target, &config).err().expect("open should fail");
        match err {
            OpenError::NoFrames { input, stderr } => {
                assert_eq!(input, "/etc/hostname");
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn device_names_are_not_checked_on_disk() {
        let config = CaptureConfig {
            device: "testsrc".into(),
            device_format: "lavfi".into(),
            ffmpeg_bin: "false".into(),
            ..CaptureConfig::default()
        };
        let err = FfmpegSource::open(&SourceTarget::DefaultDevice, &config)
            .err()
            .expect("open should fail");
        assert!(matches!(err, OpenError::NoFrames { .. }), "got {err}");
    }

    #[test]
    fn first_frame_read_at_open_is_not_lost() {
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return;
        }
        let config = CaptureConfig {
            device: "testsrc=size=64x48:rate=25".into(),
            device_format: "lavfi".into(),
            width: 64,
            height: 48,
            ..CaptureConfig::default()
        };
        let mut source = FfmpegSource::open(&SourceTarget::DefaultDevice, &config).unwrap();
        let first = source.next_frame().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!((first.width(), first.height()), (64, 48));
        assert_eq!(source.next_frame().map(|f| f.seq), Some(1));
    }

    #[test]
    fn memory_source_ends_after_last_frame() {
        let mut source = MemorySource::from_images([RgbImage::new(4, 4), RgbImage::new(4, 4)]);
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.next_frame().map(|f| f.seq), Some(0));
        assert_eq!(source.next_frame().map(|f| f.seq), Some(1));
        assert!(source.next_frame().is_none());
        assert!(source.next_frame().is_none());
    }
}
