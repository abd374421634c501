//! FrameSource - video frame acquisition
//!
//! ## Responsibilities
//!
//! - `Frame`: one decoded RGB frame with its resolution and capture time
//! - `FrameSource`: async contract the engine reads from (may block or fail)
//! - `FfmpegFrameSource`: RTSP/file decoding through an ffmpeg child process
//!
//! A read failure is never fatal here; the engine decides how to back off.
//! Dropping a source releases it (the ffmpeg child is killed on drop).

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// JPEG quality for snapshots and tracker uploads
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Decoded frame (packed RGB24)
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub captured_at: DateTime<Utc>,
    /// Monotonic per-source counter
    pub sequence: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            captured_at: Utc::now(),
            sequence,
        }
    }

    /// Encode as JPEG
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let image: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(self.width, self.height, &self.data[..]).ok_or_else(|| {
                Error::Internal(format!(
                    "frame buffer of {} bytes does not match {}x{} RGB",
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })?;

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality).encode_image(&image)?;
        Ok(out)
    }
}

/// Source of frames for one camera
pub trait FrameSource: Send + 'static {
    /// Read the next frame; errors are transient from the caller's view
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame>> + Send;
}

/// ffmpeg-backed decoder producing fixed-size RGB frames
pub struct FfmpegFrameSource {
    url: String,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    sequence: u64,
}

impl FfmpegFrameSource {
    /// Frames are scaled to `width` x `height`
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            child: None,
            stdout: None,
            sequence: 0,
        }
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);

        if self.url.starts_with("rtsp://") || self.url.starts_with("rtsps://") {
            cmd.args(["-rtsp_transport", "tcp"]);
        }

        cmd.args(["-i", &self.url])
            .arg("-an")
            .args(["-vf", &format!("scale={}:{}", self.width, self.height)])
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&mut self) -> Result<()> {
        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| Error::FrameSource(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::FrameSource("ffmpeg stdout unavailable".to_string()))?;

        tracing::debug!(
            url = %self.url,
            width = self.width,
            height = self.height,
            "ffmpeg decoder started"
        );

        self.child = Some(child);
        self.stdout = Some(stdout);
        Ok(())
    }

    /// Kill the decoder; the next read respawns it
    fn reset(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        if self.stdout.is_none() {
            self.spawn()?;
        }

        let mut buf = vec![0u8; self.frame_len()];
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::FrameSource("ffmpeg not running".to_string()))?;

        stdout
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::FrameSource(format!("stream read failed: {}", e)))?;

        self.sequence += 1;
        Ok(Frame::new(self.width, self.height, buf, self.sequence))
    }
}

impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> Result<Frame> {
        match self.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if self.child.is_some() {
            tracing::debug!(url = %self.url, "Frame source released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_jpeg() {
        let frame = Frame::new(4, 2, vec![128u8; 4 * 2 * 3], 1);
        let jpeg = frame.to_jpeg(DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_to_jpeg_size_mismatch() {
        let frame = Frame::new(4, 2, vec![0u8; 5], 1);
        assert!(matches!(frame.to_jpeg(80), Err(Error::Internal(_))));
    }

    #[test]
    fn test_rtsp_uses_tcp_transport() {
        let source = FfmpegFrameSource::new("rtsp://10.0.0.2/live", 640, 360);
        let cmd = source.build_command();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w[0] == "-rtsp_transport" && w[1] == "tcp"));
        assert!(args.contains(&"scale=640:360".to_string()));
        assert_eq!(source.frame_len(), 640 * 360 * 3);
    }

    #[tokio::test]
    async fn test_missing_binary_or_bad_source_is_error() {
        let mut source = FfmpegFrameSource::new("/nonexistent/video.mp4", 8, 8);
        assert!(source.next_frame().await.is_err());
        assert!(source.stdout.is_none());
    }
}
