//! Application configuration and shared state

use crate::auto_detect::{AutoDetectGateway, DetectOptions};
use crate::dataset_sync::DatasetSyncClient;
use crate::frame_scheduler::FrameScheduler;
use crate::frame_source::{CaptureDevice, FrameSource};
use crate::layout::LayoutClient;
use crate::quick_label::QuickLabelComposer;
use crate::session::{CaptureMode, LabelingSessionController, SessionOptions};
use crate::streaming_client::StreamingClient;
use crate::training_monitor::TrainingJobMonitor;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration, environment-driven
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// host:port of the analysis stream endpoint
    pub stream_addr: String,
    /// Base URL of the training/dataset backend
    pub backend_url: String,
    /// ffmpeg capture input (RTSP URL, x11grab spec, ...)
    pub capture_input: Option<String>,
    /// HTTP snapshot URL fallback
    pub capture_snapshot_url: Option<String>,
    pub frame_rate: f64,
    pub reconnect_delay: Duration,
    pub quick_label_window: Duration,
    pub settle_delay: Duration,
    pub training_poll_interval: Duration,
    pub capture_mode: CaptureMode,
    /// Provenance tag on persisted dataset samples
    pub dataset_source: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stream_addr: std::env::var("ANALYSIS_STREAM_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8765".to_string()),
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string()),
            capture_input: std::env::var("CAPTURE_INPUT").ok(),
            capture_snapshot_url: std::env::var("CAPTURE_SNAPSHOT_URL").ok(),
            frame_rate: env_parsed("FRAME_RATE", 2.0),
            reconnect_delay: Duration::from_millis(env_parsed("RECONNECT_DELAY_MS", 3000)),
            quick_label_window: Duration::from_millis(env_parsed("QUICK_LABEL_WINDOW_MS", 1500)),
            settle_delay: Duration::from_millis(env_parsed("SETTLE_DELAY_MS", 400)),
            training_poll_interval: Duration::from_millis(env_parsed("TRAINING_POLL_MS", 2000)),
            capture_mode: match std::env::var("CAPTURE_MODE").as_deref() {
                Ok("automatic") => CaptureMode::Automatic,
                _ => CaptureMode::Manual,
            },
            dataset_source: std::env::var("DATASET_SOURCE")
                .unwrap_or_else(|_| "live_capture".to_string()),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Pick the capture backend from configuration
    ///
    /// ffmpeg input wins over a snapshot URL; with neither set, the
    /// synthetic generator keeps the pipeline runnable in development.
    pub fn capture_device(&self) -> CaptureDevice {
        if let Some(input) = &self.capture_input {
            CaptureDevice::Ffmpeg {
                input: input.clone(),
                timeout_secs: 10,
            }
        } else if let Some(url) = &self.capture_snapshot_url {
            CaptureDevice::Http {
                snapshot_url: url.clone(),
            }
        } else {
            tracing::warn!("No capture input configured, using synthetic frames");
            CaptureDevice::Synthetic {
                width: 1280,
                height: 720,
            }
        }
    }
}

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub source: Arc<FrameSource>,
    pub streaming: Arc<StreamingClient>,
    pub scheduler: Arc<FrameScheduler>,
    pub session: Arc<LabelingSessionController>,
    pub training: Arc<TrainingJobMonitor>,
    pub layout_client: LayoutClient,
}

impl AppState {
    /// Wire up all components from configuration
    pub fn build(config: AppConfig) -> Self {
        let http = reqwest::Client::new();
        let source = Arc::new(FrameSource::new(config.capture_device()));
        let streaming = Arc::new(StreamingClient::with_reconnect_delay(
            config.stream_addr.clone(),
            config.reconnect_delay,
        ));
        let scheduler = Arc::new(FrameScheduler::new(source.clone(), streaming.clone()));
        let session = LabelingSessionController::new(
            source.clone(),
            AutoDetectGateway::new(http.clone(), config.backend_url.clone()),
            DatasetSyncClient::new(
                http.clone(),
                config.backend_url.clone(),
                config.dataset_source.clone(),
            ),
            QuickLabelComposer::new(config.quick_label_window),
            SessionOptions {
                mode: config.capture_mode,
                settle_delay: config.settle_delay,
                detect_options: DetectOptions::default(),
            },
        );
        let training = Arc::new(TrainingJobMonitor::with_poll_interval(
            http.clone(),
            config.backend_url.clone(),
            config.training_poll_interval,
        ));
        let layout_client = LayoutClient::new(http, config.backend_url.clone());
        Self {
            config,
            source,
            streaming,
            scheduler,
            session,
            training,
            layout_client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_device_selection() {
        let mut config = AppConfig {
            stream_addr: "127.0.0.1:8765".to_string(),
            backend_url: "http://127.0.0.1:8000".to_string(),
            capture_input: Some("rtsp://cam/stream".to_string()),
            capture_snapshot_url: Some("http://cam/snap.jpg".to_string()),
            frame_rate: 2.0,
            reconnect_delay: Duration::from_secs(3),
            quick_label_window: Duration::from_millis(1500),
            settle_delay: Duration::from_millis(400),
            training_poll_interval: Duration::from_secs(2),
            capture_mode: CaptureMode::Manual,
            dataset_source: "live_capture".to_string(),
        };
        assert!(matches!(
            config.capture_device(),
            CaptureDevice::Ffmpeg { .. }
        ));

        config.capture_input = None;
        assert!(matches!(config.capture_device(), CaptureDevice::Http { .. }));

        config.capture_snapshot_url = None;
        assert!(matches!(
            config.capture_device(),
            CaptureDevice::Synthetic { .. }
        ));
    }
}
