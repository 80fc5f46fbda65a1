//! FrameSource - Still Image Capture from a Live Video Source
//!
//! ## Responsibilities
//!
//! - Device acquisition (`begin`) and release (`end`, idempotent)
//! - On-demand snapshot rendering to a `StillImage`
//! - Automatic release on external revocation, broadcast to dependents
//!
//! Capture backends mirror the snapshot source fallback chain: an ffmpeg
//! child-process grab for RTSP/desktop inputs, an HTTP snapshot URL, and a
//! synthetic generator for development and tests.

use crate::error::{Error, Result};
use crate::models::StillImage;
use std::io::Cursor;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::watch;

/// Capture device backends
#[derive(Debug, Clone)]
pub enum CaptureDevice {
    /// ffmpeg single-frame grab from any ffmpeg input (RTSP URL, x11grab, ...)
    Ffmpeg { input: String, timeout_secs: u64 },
    /// HTTP GET against a snapshot endpoint
    Http { snapshot_url: String },
    /// Generated test pattern; no external device required
    Synthetic { width: u32, height: u32 },
}

/// FrameSource instance
pub struct FrameSource {
    device: CaptureDevice,
    client: reqwest::Client,
    /// true while the device is acquired; observers use this to cancel
    active: watch::Sender<bool>,
}

impl FrameSource {
    /// Create a new source for the given device (not yet acquired)
    pub fn new(device: CaptureDevice) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        let (active, _) = watch::channel(false);
        Self {
            device,
            client,
            active,
        }
    }

    /// Request access to the capture device
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`. Calling `begin`
    /// while already active is a no-op.
    pub async fn begin(&self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        match &self.device {
            CaptureDevice::Ffmpeg { .. } => {
                let version = Self::check_ffmpeg().await?;
                tracing::debug!(ffmpeg = %version, "ffmpeg capture backend ready");
            }
            CaptureDevice::Http { snapshot_url } => {
                let resp = self
                    .client
                    .get(snapshot_url)
                    .send()
                    .await
                    .map_err(|e| Error::DeviceUnavailable(format!("{snapshot_url}: {e}")))?;
                let status = resp.status();
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    return Err(Error::PermissionDenied(format!(
                        "{snapshot_url} returned {status}"
                    )));
                }
                if !status.is_success() {
                    return Err(Error::DeviceUnavailable(format!(
                        "{snapshot_url} returned {status}"
                    )));
                }
            }
            CaptureDevice::Synthetic { .. } => {}
        }

        self.active.send_replace(true);
        tracing::info!(device = ?self.device_kind(), "Capture device acquired");
        Ok(())
    }

    /// Render the current frame to a still image
    ///
    /// A grab failure while active means the device was revoked externally;
    /// the source releases itself and reports `DeviceRevoked` so dependent
    /// schedulers stop.
    pub async fn snapshot(&self) -> Result<StillImage> {
        if !self.is_active() {
            return Err(Error::DeviceUnavailable("capture not active".to_string()));
        }

        let grab = match &self.device {
            CaptureDevice::Ffmpeg {
                input,
                timeout_secs,
            } => self.grab_ffmpeg(input, *timeout_secs).await,
            CaptureDevice::Http { snapshot_url } => self.grab_http(snapshot_url).await,
            CaptureDevice::Synthetic { width, height } => {
                return Self::synthetic_frame(*width, *height);
            }
        };

        match grab {
            Ok(data) => {
                let (width, height) = decode_dimensions(&data)?;
                Ok(StillImage::new(data, width, height))
            }
            Err(e) => {
                // Device went away underneath us; release exactly once
                tracing::warn!(error = %e, "Capture failed while active, treating as revocation");
                self.end();
                Err(Error::DeviceRevoked(e.to_string()))
            }
        }
    }

    /// Release the device; safe to call multiple times
    pub fn end(&self) {
        if self.active.send_replace(false) {
            tracing::info!(device = ?self.device_kind(), "Capture device released");
        }
    }

    /// Whether the device is currently acquired
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Watch handle for dependents (schedulers) to observe release
    pub fn active_watch(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    fn device_kind(&self) -> &'static str {
        match self.device {
            CaptureDevice::Ffmpeg { .. } => "ffmpeg",
            CaptureDevice::Http { .. } => "http",
            CaptureDevice::Synthetic { .. } => "synthetic",
        }
    }

    /// Grab one frame via ffmpeg
    ///
    /// kill_on_drop ensures the child is killed when the timeout cancels the
    /// future, so unresponsive inputs cannot accumulate zombie processes.
    async fn grab_ffmpeg(&self, input: &str, timeout_secs: u64) -> Result<Vec<u8>> {
        use std::process::Stdio;

        let child = Command::new("ffmpeg")
            .args([
                "-i",
                input,
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-y",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("ffmpeg spawn failed: {e}")))?;

        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Internal(format!("ffmpeg failed: {}", stderr.trim())));
                }
                if output.stdout.is_empty() {
                    return Err(Error::Internal("ffmpeg returned empty output".to_string()));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Internal(format!("ffmpeg execution failed: {e}"))),
            Err(_) => Err(Error::Internal(format!("ffmpeg timeout ({timeout_secs}s)"))),
        }
    }

    /// Grab one frame via HTTP snapshot URL
    async fn grab_http(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "snapshot endpoint returned {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// Generate a JPEG test pattern
    fn synthetic_frame(width: u32, height: u32) -> Result<StillImage> {
        let mut img = image::RgbImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = image::Rgb([(x % 256) as u8, (y % 256) as u8, 40]);
        }
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .map_err(|e| Error::Internal(format!("synthetic frame encode failed: {e}")))?;
        Ok(StillImage::new(buf, width, height))
    }

    /// Check that ffmpeg is on PATH
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("ffmpeg not found: {e}")))?;

        if !output.status.success() {
            return Err(Error::DeviceUnavailable(
                "ffmpeg version check failed".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }
}

/// Decode width/height from encoded image bytes (header only)
fn decode_dimensions(data: &[u8]) -> Result<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::Parse(format!("unrecognized image format: {e}")))?
        .into_dimensions()
        .map_err(|e| Error::Parse(format!("image header decode failed: {e}")))
}
