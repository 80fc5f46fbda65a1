//! TrainingJobMonitor - Training Job Control and Status Polling
//!
//! ## Responsibilities
//!
//! - Start and cancel training jobs on the backend
//! - Poll job status on a fixed interval while a job is active, keeping a
//!   last-known-good mirror that poll failures never clobber
//! - Fetch and update the training configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default status poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Training job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    #[default]
    Idle,
    Preparing,
    /// The backend reports an in-progress job as "training"
    #[serde(rename = "training", alias = "running")]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TrainingStatus {
    /// Whether the job reached a final state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TrainingStatus::Completed | TrainingStatus::Failed | TrainingStatus::Cancelled
        )
    }

    /// Whether a job is underway (polling should continue)
    pub fn is_active(self) -> bool {
        matches!(self, TrainingStatus::Preparing | TrainingStatus::Running)
    }
}

/// Mirrored training job state
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingJobState {
    #[serde(default)]
    pub status: TrainingStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub current_epoch: u32,
    #[serde(default)]
    pub total_epochs: u32,
    #[serde(default)]
    pub loss: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: u32,
    pub batch_size: u32,
    pub img_size: u32,
    pub model_size: String,
    pub device: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 16,
            img_size: 640,
            model_size: "n".to_string(),
            device: "cpu".to_string(),
        }
    }
}

/// TrainingJobMonitor instance
pub struct TrainingJobMonitor {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    state: Arc<RwLock<TrainingJobState>>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl TrainingJobMonitor {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self::with_poll_interval(client, base_url, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        client: reqwest::Client,
        base_url: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            poll_interval,
            state: Arc::new(RwLock::new(TrainingJobState::default())),
            poll_task: Mutex::new(None),
        }
    }

    /// Last-known job state
    pub async fn job_state(&self) -> TrainingJobState {
        self.state.read().await.clone()
    }

    /// Ask the backend to start a training job, then begin polling
    pub async fn start(&self, config: &TrainingConfig) -> Result<()> {
        let url = format!("{}/api/training/start", self.base_url);
        let resp = self.client.post(&url).json(config).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "training start returned {}",
                resp.status()
            )));
        }
        {
            let mut state = self.state.write().await;
            state.status = TrainingStatus::Preparing;
            state.error = None;
        }
        tracing::info!(epochs = config.epochs, "Training job requested");
        self.ensure_polling().await;
        Ok(())
    }

    /// Ask the backend to cancel the running job
    ///
    /// The mirror keeps its current state until polling observes the
    /// cancellation.
    pub async fn cancel(&self) -> Result<()> {
        let url = format!("{}/api/training/cancel", self.base_url);
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "training cancel returned {}",
                resp.status()
            )));
        }
        tracing::info!("Training job cancel requested");
        self.ensure_polling().await;
        Ok(())
    }

    /// Fetch the backend's current status once, updating the mirror
    pub async fn refresh(&self) -> Result<TrainingJobState> {
        let fresh = fetch_status(&self.client, &self.base_url).await?;
        *self.state.write().await = fresh.clone();
        Ok(fresh)
    }

    /// Start the poll loop if none is running
    pub async fn ensure_polling(&self) {
        let mut task = self.poll_task.lock().await;
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let state = self.state.clone();
        let interval = self.poll_interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match fetch_status(&client, &base_url).await {
                    Ok(fresh) => {
                        let done = !fresh.status.is_active();
                        let status = fresh.status;
                        *state.write().await = fresh;
                        if done {
                            tracing::info!(status = ?status, "Training poll loop finished");
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient poll failure: keep the last-known state
                        tracing::debug!(error = %e, "Training status poll failed");
                    }
                }
            }
        }));
    }

    /// Fetch the training configuration
    pub async fn fetch_config(&self) -> Result<TrainingConfig> {
        let url = format!("{}/api/training/config", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "training config returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Push an updated training configuration
    pub async fn update_config(&self, config: &TrainingConfig) -> Result<()> {
        let url = format!("{}/api/training/config", self.base_url);
        let resp = self.client.post(&url).json(config).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "training config update returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Stop polling; the mirror keeps its last value
    pub async fn shutdown(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
        }
    }
}

async fn fetch_status(client: &reqwest::Client, base_url: &str) -> Result<TrainingJobState> {
    let url = format!("{base_url}/api/training/status");
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        return Err(Error::Network(format!(
            "training status returned {}",
            resp.status()
        )));
    }
    Ok(resp.json().await?)
}
