//! Session Orchestration - Capture/Detect/Label/Persist Loop
//!
//! ## Responsibilities
//!
//! - `LabelingSessionController` drives the labeling workflow: capture a
//!   still, run detection (layout fallback when nothing is found), populate
//!   the store, route quick-label keystrokes, and persist completed sessions
//! - Automatic mode: a fully labeled session auto-saves after a settle
//!   delay, then the next capture starts while the device stays active.
//!   Manual mode requires an explicit `save()`
//! - `AnalysisFeed` consumes the streaming observer channel and exposes the
//!   latest analysis snapshot to the view layer

use crate::auto_detect::{AutoDetectGateway, DetectOptions};
use crate::dataset_sync::{DatasetStats, DatasetSyncClient};
use crate::error::{Error, Result};
use crate::frame_source::FrameSource;
use crate::labeling_store::{LabelOutcome, LabelingStore};
use crate::layout::TableLayout;
use crate::quick_label::QuickLabelComposer;
use crate::streaming_client::StreamResponse;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Capture workflow mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Sessions persist only on explicit save()
    Manual,
    /// Completed sessions auto-save after the settle delay, then recapture
    Automatic,
}

/// Controller tuning, all timing comes from configuration
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: CaptureMode,
    pub settle_delay: Duration,
    pub detect_options: DetectOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Manual,
            settle_delay: Duration::from_millis(400),
            detect_options: DetectOptions::default(),
        }
    }
}

/// LabelingSessionController instance
pub struct LabelingSessionController {
    source: Arc<FrameSource>,
    detector: AutoDetectGateway,
    dataset: DatasetSyncClient,
    layout: RwLock<TableLayout>,
    store: Arc<RwLock<LabelingStore>>,
    composer: Mutex<QuickLabelComposer>,
    mode: RwLock<CaptureMode>,
    settle_delay: Duration,
    detect_options: DetectOptions,
    stats: RwLock<Option<DatasetStats>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl LabelingSessionController {
    pub fn new(
        source: Arc<FrameSource>,
        detector: AutoDetectGateway,
        dataset: DatasetSyncClient,
        composer: QuickLabelComposer,
        options: SessionOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            detector,
            dataset,
            layout: RwLock::new(TableLayout::default()),
            store: Arc::new(RwLock::new(LabelingStore::new())),
            composer: Mutex::new(composer),
            mode: RwLock::new(options.mode),
            settle_delay: options.settle_delay,
            detect_options: options.detect_options,
            stats: RwLock::new(None),
            autosave: Mutex::new(None),
        })
    }

    /// Shared store, for the view layer
    pub fn store(&self) -> Arc<RwLock<LabelingStore>> {
        self.store.clone()
    }

    /// Last fetched dataset statistics
    pub async fn stats(&self) -> Option<DatasetStats> {
        self.stats.read().await.clone()
    }

    pub async fn mode(&self) -> CaptureMode {
        *self.mode.read().await
    }

    /// Switch capture mode; leaving automatic cancels any pending auto-save
    pub async fn set_mode(&self, mode: CaptureMode) {
        *self.mode.write().await = mode;
        if mode == CaptureMode::Manual {
            self.cancel_autosave().await;
        }
        tracing::info!(?mode, "Capture mode changed");
    }

    /// Replace the layout used for detection fallback seeding
    pub async fn set_layout(&self, layout: TableLayout) {
        *self.layout.write().await = layout;
    }

    /// Capture a still, run detection, and start a fresh labeling session
    ///
    /// Replaces any active session; a pending auto-save for the old session
    /// is cancelled first. Detector unavailability degrades to layout
    /// seeding rather than failing the capture.
    pub async fn capture_and_detect(self: &Arc<Self>) -> Result<()> {
        self.cancel_autosave().await;

        let image = self.source.snapshot().await?;

        let seeds = match self.detector.detect(&image, self.detect_options).await {
            Ok(outcome) => outcome.seeds,
            Err(Error::DetectionUnavailable(reason)) => {
                tracing::warn!(%reason, "Detector unavailable, falling back to layout seeds");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        // Layout seeds are always unlabeled, so only a real detection pass
        // can produce a fully pre-labeled session
        let prelabeled = !seeds.is_empty() && seeds.iter().all(|s| s.label.is_some());
        let seeds = if seeds.is_empty() {
            self.layout.read().await.seeds_for(image.width, image.height)
        } else {
            seeds
        };

        {
            let mut store = self.store.write().await;
            let session = store.begin_session(image);
            session.replace_all(seeds);
            tracing::info!(
                session_id = %session.session_id,
                regions = session.regions().len(),
                prelabeled,
                "Labeling session populated"
            );
        }

        if prelabeled && self.mode().await == CaptureMode::Automatic {
            self.schedule_autosave().await;
        }
        Ok(())
    }

    /// Route one keystroke through the quick-label composer
    ///
    /// A completed composition labels the selected region. Returns the
    /// label outcome when a label was applied.
    pub async fn handle_key(self: &Arc<Self>, key: char) -> Result<Option<LabelOutcome>> {
        let Some(label) = self.composer.lock().await.press(key) else {
            return Ok(None);
        };

        let outcome = {
            let mut store = self.store.write().await;
            let Some(session) = store.session_mut() else {
                tracing::debug!("Quick label ignored: no active session");
                return Ok(None);
            };
            let Some(selected) = session.selected() else {
                tracing::debug!("Quick label ignored: no selected region");
                return Ok(None);
            };
            let outcome = session.assign_label(selected, label.clone());
            tracing::debug!(card = %label.name, ?outcome, "Quick label applied");
            outcome
        };

        if outcome == LabelOutcome::SessionComplete
            && self.mode().await == CaptureMode::Automatic
        {
            self.schedule_autosave().await;
        }
        Ok(Some(outcome))
    }

    /// Persist the active session, clear it, and refresh dataset stats
    ///
    /// In automatic mode a successful save starts the next capture while
    /// the device remains active.
    pub async fn save(self: &Arc<Self>) -> Result<()> {
        self.cancel_autosave().await;

        let (image, regions) = {
            let store = self.store.read().await;
            let session = store
                .session()
                .ok_or_else(|| Error::Validation("no active labeling session".to_string()))?;
            (session.image.clone(), session.regions().to_vec())
        };

        let receipt = self.dataset.persist(&image, &regions).await?;
        tracing::info!(image_id = ?receipt.image_id, "Session saved to dataset");
        self.store.write().await.clear();

        match self.dataset.fetch_stats().await {
            Ok(stats) => *self.stats.write().await = Some(stats),
            Err(e) => tracing::warn!(error = %e, "Dataset stats refresh failed"),
        }

        if self.mode().await == CaptureMode::Automatic && self.source.is_active() {
            if let Err(e) = self.capture_and_detect().await {
                tracing::warn!(error = %e, "Follow-up capture failed");
            }
        }
        Ok(())
    }

    /// Cancel any pending auto-save and release the session state
    pub async fn teardown(&self) {
        self.cancel_autosave().await;
        self.store.write().await.clear();
    }

    async fn cancel_autosave(&self) {
        if let Some(task) = self.autosave.lock().await.take() {
            task.abort();
            tracing::debug!("Pending auto-save cancelled");
        }
    }

    /// Type-erased save() for the auto-save task; save() leads back to
    /// capture_and_detect() and schedule_autosave(), so without boxing the
    /// spawned future would contain its own type
    fn save_boxed(controller: Arc<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
        Box::pin(async move { controller.save().await })
    }

    /// Arm the settle-delay auto-save, replacing any pending one
    async fn schedule_autosave(self: &Arc<Self>) {
        let controller = self.clone();
        let delay = self.settle_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Remove our own handle first so save() does not abort us
            controller.autosave.lock().await.take();
            if let Err(e) = Self::save_boxed(controller.clone()).await {
                tracing::warn!(error = %e, "Auto-save failed");
            }
        });
        let mut slot = self.autosave.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Auto-save scheduled");
    }
}

/// Latest analysis result kept for the view layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedStatus {
    #[default]
    Idle,
    Success,
    NoSignal,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisSnapshot {
    pub status: FeedStatus,
    pub game_state: Option<serde_json::Value>,
    pub recommendations: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// AnalysisFeed instance; pure consumer of the streaming observer channel
pub struct AnalysisFeed {
    snapshot: Arc<RwLock<AnalysisSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisFeed {
    /// Start consuming responses; stops when the channel closes
    pub fn start(mut rx: mpsc::UnboundedReceiver<StreamResponse>) -> Self {
        let snapshot = Arc::new(RwLock::new(AnalysisSnapshot::default()));
        let writer = snapshot.clone();
        let task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut snap = writer.write().await;
                snap.updated_at = Some(Utc::now());
                match response {
                    StreamResponse::Success {
                        game_state,
                        recommendations,
                    } => {
                        snap.status = FeedStatus::Success;
                        snap.game_state = game_state;
                        snap.recommendations = recommendations;
                        snap.last_error = None;
                    }
                    StreamResponse::NoSignal => {
                        // Keep the last game state visible while no table shows
                        snap.status = FeedStatus::NoSignal;
                    }
                    StreamResponse::Error { message } => {
                        snap.status = FeedStatus::Error;
                        snap.last_error = Some(message);
                    }
                }
            }
            tracing::debug!("Analysis feed channel closed");
        });
        Self {
            snapshot,
            task: Mutex::new(Some(task)),
        }
    }

    pub async fn snapshot(&self) -> AnalysisSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
    }
}
