//! Camera access through `ffmpeg` child processes.
//!
//! Frames are read from a V4L2 device as raw BGR24 on ffmpeg's stdout, and
//! written back out through further ffmpeg processes that encode MP4 video
//! and JPEG stills from raw frames on stdin.
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use bytes::Bytes;
use tracing::{debug, warn};

use super::{Camera, Frame, VideoSink, VideoSource};
use crate::config::CaptureConfig;
use crate::error::CaptureError;

fn base_command(ffmpeg: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");
    cmd
}

/// Adds the arguments describing raw BGR24 frames on stdin.
fn raw_input(cmd: &mut Command, size: (u32, u32)) {
    cmd.arg("-f")
        .arg("rawvideo")
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-video_size")
        .arg(format!("{}x{}", size.0, size.1));
}

/// Kills and reaps a child that is still running.
fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        if let Err(error) = child.kill() {
            warn!(%error, "failed to kill ffmpeg");
        }
    }
    let _ = child.wait();
}

/// A V4L2 camera read via ffmpeg.
#[derive(Clone, Debug)]
pub struct FfmpegCamera {
    ffmpeg: PathBuf,
    device: String,
    size: (u32, u32),
    fps: f64,
}

impl FfmpegCamera {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            device: config.device.clone(),
            size: (config.width, config.height),
            fps: config.fps,
        }
    }

    fn open_error(&self) -> CaptureError {
        CaptureError::Open {
            source_name: self.device.clone(),
        }
    }
}

impl Camera for FfmpegCamera {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError> {
        let mut cmd = base_command(&self.ffmpeg);
        cmd.arg("-f")
            .arg("video4linux2")
            .arg("-framerate")
            .arg(self.fps.to_string())
            .arg("-video_size")
            .arg(format!("{}x{}", self.size.0, self.size.1))
            .arg("-i")
            .arg(&self.device)
            // The driver may ignore the requested size; scale so every frame
            // on stdout is exactly `size`.
            .arg("-vf")
            .arg(format!("scale={}:{}", self.size.0, self.size.1))
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|error| {
            warn!(%error, "failed to start ffmpeg");
            self.open_error()
        })?;
        let Some(stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(self.open_error());
        };

        let mut source = FfmpegSource {
            child,
            stdout,
            size: self.size,
            pending: None,
        };

        // ffmpeg starts even when the device is missing and only then exits,
        // so the first frame is what proves the camera is there.
        match source.read_raw() {
            Ok(Some(frame)) => source.pending = Some(frame),
            Ok(None) | Err(_) => return Err(self.open_error()),
        }

        debug!(device = %self.device, "camera open");

        Ok(Box::new(source))
    }

    fn video_sink(
        &self,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn VideoSink>, CaptureError> {
        let mut cmd = base_command(&self.ffmpeg);
        cmd.arg("-y");
        raw_input(&mut cmd, size);
        cmd.arg("-framerate")
            .arg(fps.to_string())
            .arg("-i")
            .arg("-")
            .arg("-c:v")
            .arg("mpeg4")
            .arg("-q:v")
            .arg("5")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let sink_error = |error: io::Error| CaptureError::Sink {
            path: path.display().to_string(),
            error,
        };

        let mut child = cmd.spawn().map_err(sink_error)?;
        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(sink_error(io::Error::other("no stdin on encoder")));
        };

        Ok(Box::new(FfmpegSink {
            child,
            stdin: Some(stdin),
            path: path.to_path_buf(),
        }))
    }

    fn write_still(
        &self,
        path: &Path,
        frame: &Frame,
    ) -> Result<(), CaptureError> {
        let mut cmd = base_command(&self.ffmpeg);
        cmd.arg("-y");
        raw_input(&mut cmd, (frame.width, frame.height));
        cmd.arg("-i")
            .arg("-")
            .arg("-frames:v")
            .arg("1")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut sink = FfmpegSink {
            child: cmd.spawn()?,
            stdin: None,
            path: path.to_path_buf(),
        };
        sink.stdin = sink.child.stdin.take();
        sink.write_frame(frame)?;

        Box::new(sink).finish()
    }
}

struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    size: (u32, u32),
    /// The frame read while probing the device in `open`.
    pending: Option<Frame>,
}

impl FfmpegSource {
    fn read_raw(&mut self) -> Result<Option<Frame>, CaptureError> {
        let (width, height) = self.size;
        let mut buf = vec![0u8; width as usize * height as usize * 3];

        match self.stdout.read_exact(&mut buf) {
            Ok(()) => Ok(Some(Frame {
                data: Bytes::from(buf),
                width,
                height,
            })),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl VideoSource for FfmpegSource {
    fn frame_size(&self) -> (u32, u32) {
        self.size
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        match self.pending.take() {
            Some(frame) => Ok(Some(frame)),
            None => self.read_raw(),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        reap(&mut self.child);
    }
}

struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
}

impl FfmpegSink {
    fn error(&self, error: io::Error) -> CaptureError {
        CaptureError::Sink {
            path: self.path.display().to_string(),
            error,
        }
    }
}

impl VideoSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&frame.data),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        };
        result.map_err(|e| self.error(e))
    }

    fn finish(mut self: Box<Self>) -> Result<(), CaptureError> {
        // Closing stdin is what tells the encoder to flush and exit.
        drop(self.stdin.take());

        let status = self.child.wait().map_err(|e| self.error(e))?;
        if !status.success() {
            return Err(self.error(io::Error::other(format!(
                "encoder exited with {status}"
            ))));
        }

        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        reap(&mut self.child);
    }
}
