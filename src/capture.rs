//! Video and still capture while the net is held at the surface.
//!
//! A capture window records every frame from the camera into a video file
//! and saves one frame part way through as a still. Both files are then
//! sent to the media ingest endpoint. Only failing to record is an error;
//! a failed upload is reported alongside an otherwise successful capture.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::types::outcome::{file_stamp, CapturedFiles};
use crate::types::unit::UnitId;

pub mod ffmpeg;
pub mod upload;

pub use upload::MediaUploader;

/// One BGR24 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

/// A live stream of frames. Releases the device when dropped.
pub trait VideoSource: Send {
    /// Frame size as reported by the device.
    fn frame_size(&self) -> (u32, u32);

    /// Blocks for the next frame. `None` means the stream has ended.
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// An encoder writing frames to a video file.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Flushes and closes the file.
    fn finish(self: Box<Self>) -> Result<(), CaptureError>;
}

/// A camera plus the encoders used to store what it sees.
pub trait Camera: Send + Sync {
    fn open(&self) -> Result<Box<dyn VideoSource>, CaptureError>;

    fn video_sink(
        &self,
        path: &Path,
        size: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn VideoSink>, CaptureError>;

    fn write_still(
        &self,
        path: &Path,
        frame: &Frame,
    ) -> Result<(), CaptureError>;
}

/// Timing of one capture window.
#[derive(Clone, Copy, Debug)]
pub struct CaptureWindow {
    pub length: Duration,
    pub still_offset: Duration,
    pub fps: f64,
}

/// Files written by [`record`].
#[derive(Clone, Debug, PartialEq)]
pub struct Recording {
    pub video: PathBuf,
    /// Absent if the stream ended before the still offset or the still
    /// could not be written.
    pub image: Option<PathBuf>,
    pub frames: usize,
}

/// Records one capture window. Blocks for the length of the window.
///
/// Fails if the camera cannot be opened or the video file cannot be
/// written. A frame read failure ends the window early but keeps what was
/// recorded so far.
pub fn record(
    camera: &dyn Camera,
    window: CaptureWindow,
    video_path: &Path,
    image_path: &Path,
) -> Result<Recording, CaptureError> {
    let mut source = camera.open()?;
    let size = source.frame_size();
    let mut sink = camera.video_sink(video_path, size, window.fps)?;

    info!(
        video = %video_path.display(),
        width = size.0,
        height = size.1,
        "recording"
    );

    let started = Instant::now();
    let mut still_taken = false;
    let mut image = None;
    let mut frames = 0;

    loop {
        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!(frames, "video source ended early");
                break;
            },
            Err(error) => {
                warn!(%error, frames, "failed to read frame");
                break;
            },
        };

        sink.write_frame(&frame)?;
        frames += 1;

        let elapsed = started.elapsed();

        // One attempt only: a later frame would no longer show the net as it
        // was at the offset.
        if !still_taken && elapsed >= window.still_offset {
            still_taken = true;
            match camera.write_still(image_path, &frame) {
                Ok(()) => {
                    info!(image = %image_path.display(), "still captured");
                    image = Some(image_path.to_path_buf());
                },
                Err(error) => warn!(%error, "failed to write still"),
            }
        }

        if elapsed >= window.length {
            break;
        }
    }

    sink.finish()?;
    drop(source);

    info!(frames, "recording finished");

    Ok(Recording {
        video: video_path.to_path_buf(),
        image,
        frames,
    })
}

/// What a capture produced, ready to be folded into a job outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureReport {
    pub files: CapturedFiles,
    pub backend_response: Option<Value>,
    pub backend_error: Option<String>,
}

/// Records a capture window for a unit and uploads the result.
pub struct CapturePipeline {
    camera: Arc<dyn Camera>,
    config: CaptureConfig,
    uploader: Option<MediaUploader>,
}

impl CapturePipeline {
    pub fn new(
        camera: Arc<dyn Camera>,
        config: CaptureConfig,
        uploader: Option<MediaUploader>,
    ) -> Self {
        Self {
            camera,
            config,
            uploader,
        }
    }

    fn window(&self) -> CaptureWindow {
        CaptureWindow {
            length: self.config.window(),
            still_offset: self.config.still_offset(),
            fps: self.config.fps,
        }
    }

    /// Runs the capture window on a blocking thread, then uploads.
    pub async fn run(
        &self,
        unit_id: UnitId,
    ) -> Result<CaptureReport, CaptureError> {
        let stamp = file_stamp();
        let video_name = format!("video_unit{unit_id}_{stamp}.mp4");
        let image_name = format!("still_unit{unit_id}_{stamp}.jpg");

        fs::create_dir_all(&self.config.media_dir)?;
        let video_path = self.config.media_dir.join(&video_name);
        let image_path = self.config.media_dir.join(&image_name);

        let camera = self.camera.clone();
        let window = self.window();
        let recording = tokio::task::spawn_blocking(move || {
            record(camera.as_ref(), window, &video_path, &image_path)
        })
        .await
        .map_err(|e| CaptureError::Worker(e.to_string()))??;

        let mut report = CaptureReport {
            files: CapturedFiles {
                image: image_name,
                video: video_name,
            },
            backend_response: None,
            backend_error: None,
        };

        let Some(image) = recording.image.as_deref() else {
            warn!("no still to upload");
            report.backend_error = Some("no still frame captured".to_string());
            return Ok(report);
        };
        let Some(uploader) = &self.uploader else {
            report.backend_error =
                Some("media ingest not configured".to_string());
            return Ok(report);
        };

        match uploader.upload(image, &recording.video).await {
            Ok(response) => report.backend_response = Some(response),
            Err(error) => {
                warn!(%error, "media upload failed");
                report.backend_error = Some(error.to_string());
            },
        }

        Ok(report)
    }
}
