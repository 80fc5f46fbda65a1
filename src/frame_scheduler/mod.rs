//! FrameScheduler - Periodic Frame Capture and Transmission
//!
//! ## Responsibilities
//!
//! - Manual trigger: one snapshot sent to the stream, gated on both the
//!   capture device being active and the stream being connected
//! - Periodic mode at a configurable rate; ticks that find the gate closed
//!   are skipped, nothing is queued
//! - Automatic stop when the capture device is released or revoked

use crate::error::Result;
use crate::frame_source::FrameSource;
use crate::streaming_client::StreamingClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// FrameScheduler instance
pub struct FrameScheduler {
    source: Arc<FrameSource>,
    client: Arc<StreamingClient>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl FrameScheduler {
    pub fn new(source: Arc<FrameSource>, client: Arc<StreamingClient>) -> Self {
        Self {
            source,
            client,
            timer: Mutex::new(None),
        }
    }

    /// Capture one frame and send it now
    ///
    /// Returns Ok(false) without capturing when the gate is closed (device
    /// inactive or stream not connected). Capture errors propagate.
    pub async fn trigger(&self) -> Result<bool> {
        if !self.source.is_active() || !self.client.is_connected().await {
            tracing::trace!("Frame trigger skipped (gate closed)");
            return Ok(false);
        }
        let frame = self.source.snapshot().await?;
        self.client.send_frame(&frame).await?;
        Ok(true)
    }

    /// Start (or restart) periodic capture at the given rate
    ///
    /// Replaces any running timer atomically, so two calls never leave two
    /// loops running.
    pub async fn start_periodic(self: &Arc<Self>, frames_per_second: f64) {
        let fps = if frames_per_second > 0.0 {
            frames_per_second
        } else {
            tracing::warn!(
                requested = frames_per_second,
                "Non-positive frame rate, using 1 fps"
            );
            1.0
        };
        let period = Duration::from_secs_f64(1.0 / fps);

        let scheduler = self.clone();
        let mut active = self.source.active_watch();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.trigger().await {
                            tracing::warn!(error = %e, "Periodic capture failed");
                        }
                    }
                    changed = active.changed() => {
                        // Stop when the device is released; a dropped sender
                        // means the source is gone entirely
                        if changed.is_err() || !*active.borrow_and_update() {
                            tracing::info!("Capture device released, stopping periodic frames");
                            break;
                        }
                    }
                }
            }
        });

        let mut timer = self.timer.lock().await;
        if let Some(old) = timer.replace(handle) {
            old.abort();
        }
        tracing::info!(fps, "Periodic frame capture started");
    }

    /// Change the periodic rate; no-op unless periodic mode is running
    pub async fn set_rate(self: &Arc<Self>, frames_per_second: f64) {
        if self.is_periodic().await {
            self.start_periodic(frames_per_second).await;
        }
    }

    /// Stop periodic capture; manual trigger stays available
    pub async fn stop(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.abort();
            tracing::info!("Periodic frame capture stopped");
        }
    }

    /// Whether the periodic loop is currently running
    ///
    /// A loop that exited on its own (device released) no longer counts.
    pub async fn is_periodic(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::CaptureDevice;

    fn synthetic_source() -> Arc<FrameSource> {
        Arc::new(FrameSource::new(CaptureDevice::Synthetic {
            width: 64,
            height: 64,
        }))
    }

    #[tokio::test]
    async fn test_trigger_gated_on_inactive_source() {
        let source = synthetic_source();
        let client = Arc::new(StreamingClient::new("127.0.0.1:1".to_string()));
        let scheduler = FrameScheduler::new(source, client);
        // Source never acquired: gate closed, no error
        assert!(!scheduler.trigger().await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_gated_on_disconnected_stream() {
        let source = synthetic_source();
        source.begin().await.unwrap();
        let client = Arc::new(StreamingClient::new("127.0.0.1:1".to_string()));
        let scheduler = FrameScheduler::new(source, client);
        assert!(!scheduler.trigger().await.unwrap());
    }

    #[tokio::test]
    async fn test_trigger_sends_when_gate_open() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let source = synthetic_source();
        source.begin().await.unwrap();
        let client = Arc::new(StreamingClient::new(addr.to_string()));
        client.connect().await;
        for _ in 0..100 {
            if client.is_connected().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let scheduler = FrameScheduler::new(source, client.clone());
        assert!(scheduler.trigger().await.unwrap());

        let line = server.await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "frame");
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_periodic_stops_on_device_release() {
        let source = synthetic_source();
        source.begin().await.unwrap();
        let client = Arc::new(StreamingClient::new("127.0.0.1:1".to_string()));
        let scheduler = Arc::new(FrameScheduler::new(source.clone(), client));

        scheduler.start_periodic(20.0).await;
        assert!(scheduler.is_periodic().await);

        source.end();
        // The select loop observes the watch flip and exits, and the dead
        // loop no longer reports as periodic
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!scheduler.is_periodic().await);
    }

    #[tokio::test]
    async fn test_start_periodic_replaces_previous_timer() {
        let source = synthetic_source();
        let client = Arc::new(StreamingClient::new("127.0.0.1:1".to_string()));
        let scheduler = Arc::new(FrameScheduler::new(source, client));

        scheduler.start_periodic(5.0).await;
        scheduler.start_periodic(10.0).await;
        assert!(scheduler.is_periodic().await);
        // The replaced timer was aborted, so a single stop() clears everything
        scheduler.stop().await;
        assert!(!scheduler.is_periodic().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!scheduler.is_periodic().await);
    }
}
