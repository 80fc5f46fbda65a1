//! DatasetSyncClient - Labeled Sample Upload and Dataset Statistics
//!
//! ## Responsibilities
//!
//! - Persist a labeled still to the training dataset in normalized
//!   center-format boxes, validating before any bytes leave the process
//! - Fetch dataset coverage statistics

use crate::error::{Error, Result};
use crate::models::{Region, StillImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Serialize)]
struct PersistRequest<'a> {
    image_data: &'a str,
    boxes: Vec<WireBox>,
    source: &'a str,
}

#[derive(Serialize)]
struct WireBox {
    class_id: u16,
    x_center: f64,
    y_center: f64,
    width: f64,
    height: f64,
}

/// Backend acknowledgement of a persisted sample
#[derive(Debug, Clone, Deserialize)]
pub struct PersistReceipt {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub boxes_count: Option<u32>,
}

/// Dataset coverage statistics
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetStats {
    #[serde(default)]
    pub total_images: u64,
    #[serde(default)]
    pub total_boxes: u64,
    /// Per-class sample counts keyed by card name
    #[serde(default)]
    pub cards_count: HashMap<String, u64>,
    /// Fraction of the 52-card vocabulary with at least one sample
    #[serde(default)]
    pub coverage: f64,
    #[serde(default)]
    pub missing_cards: Vec<String>,
    #[serde(default)]
    pub balanced: bool,
}

/// DatasetSyncClient instance
pub struct DatasetSyncClient {
    client: reqwest::Client,
    base_url: String,
    /// Provenance tag stored with every persisted sample
    source_tag: String,
}

impl DatasetSyncClient {
    pub fn new(client: reqwest::Client, base_url: String, source_tag: String) -> Self {
        Self {
            client,
            base_url,
            source_tag,
        }
    }

    /// Persist the labeled regions of a still to the dataset
    ///
    /// Unlabeled regions are skipped. An image with no labeled regions is a
    /// validation error, raised before any network traffic.
    pub async fn persist(&self, image: &StillImage, regions: &[Region]) -> Result<PersistReceipt> {
        let boxes: Vec<WireBox> = regions
            .iter()
            .filter_map(|r| {
                let label = r.label.as_ref()?;
                let n = r.geometry.normalized(image.width, image.height);
                Some(WireBox {
                    class_id: label.class_id,
                    x_center: n.x_center,
                    y_center: n.y_center,
                    width: n.width,
                    height: n.height,
                })
            })
            .collect();

        if boxes.is_empty() {
            return Err(Error::Validation(
                "nothing to persist: no labeled regions".to_string(),
            ));
        }

        let url = format!("{}/api/training/dataset/save", self.base_url);
        let image_data = image.encode_base64();
        let resp = self
            .client
            .post(&url)
            .json(&PersistRequest {
                image_data: &image_data,
                boxes,
                source: &self.source_tag,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "dataset save returned {}",
                resp.status()
            )));
        }
        let receipt: PersistReceipt = resp.json().await?;
        tracing::info!(
            image_id = ?receipt.image_id,
            boxes = ?receipt.boxes_count,
            "Labeled sample persisted"
        );
        Ok(receipt)
    }

    /// Fetch dataset coverage statistics
    pub async fn fetch_stats(&self) -> Result<DatasetStats> {
        let url = format!("{}/api/training/dataset/stats", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "dataset stats returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}
