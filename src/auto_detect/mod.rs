//! AutoDetectGateway - Card Region Detection via the Training Backend
//!
//! Sends a captured still to the backend detector and converts its raw
//! output into region seeds. The detector is best-effort: an unreachable
//! or failing backend surfaces as `DetectionUnavailable`, which callers
//! treat as zero detections.

use crate::error::{Error, Result};
use crate::models::{CardLabel, RegionGeometry, RegionRole, RegionSeed, StillImage};
use serde::{Deserialize, Serialize};

/// Detector toggles; all passes run by default
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DetectOptions {
    pub use_model: bool,
    pub use_heuristics: bool,
    pub use_positions: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            use_model: true,
            use_heuristics: true,
            use_positions: true,
        }
    }
}

/// Converted detector output
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub seeds: Vec<RegionSeed>,
    /// Whether a trained model contributed (false means heuristics only)
    pub model_available: bool,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    image_data: &'a str,
    use_model: bool,
    use_heuristics: bool,
    use_positions: bool,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    regions: Vec<RawRegion>,
    #[serde(default)]
    model_available: bool,
}

#[derive(Deserialize)]
struct RawRegion {
    x: i64,
    y: i64,
    pixel_width: i64,
    pixel_height: i64,
    #[serde(default)]
    suggested_class: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    region_type: Option<String>,
    #[serde(default)]
    position_index: Option<i32>,
}

/// AutoDetectGateway instance
pub struct AutoDetectGateway {
    client: reqwest::Client,
    base_url: String,
}

impl AutoDetectGateway {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Run detection over a captured still
    pub async fn detect(
        &self,
        image: &StillImage,
        options: DetectOptions,
    ) -> Result<DetectionOutcome> {
        let url = format!("{}/api/training/detect", self.base_url);
        let image_data = image.encode_base64();
        let resp = self
            .client
            .post(&url)
            .json(&DetectRequest {
                image_data: &image_data,
                use_model: options.use_model,
                use_heuristics: options.use_heuristics,
                use_positions: options.use_positions,
            })
            .send()
            .await
            .map_err(|e| Error::DetectionUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(Error::DetectionUnavailable(format!(
                "detector returned {}",
                resp.status()
            )));
        }

        let body: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::DetectionUnavailable(format!("bad detector payload: {e}")))?;

        let seeds: Vec<RegionSeed> = body
            .regions
            .into_iter()
            .filter_map(|raw| convert_region(raw, image.width, image.height))
            .collect();

        tracing::info!(
            regions = seeds.len(),
            model_available = body.model_available,
            "Detection complete"
        );
        Ok(DetectionOutcome {
            seeds,
            model_available: body.model_available,
        })
    }
}

/// Convert one raw detector region, clamping to the image bounds
///
/// Regions that start outside the image or collapse to zero size after
/// clamping are dropped.
fn convert_region(raw: RawRegion, img_width: u32, img_height: u32) -> Option<RegionSeed> {
    if raw.x < 0 || raw.y < 0 || raw.pixel_width <= 0 || raw.pixel_height <= 0 {
        tracing::debug!(x = raw.x, y = raw.y, "Dropping degenerate detector region");
        return None;
    }
    let x = raw.x as u32;
    let y = raw.y as u32;
    if x >= img_width || y >= img_height {
        return None;
    }
    let width = (raw.pixel_width as u32).min(img_width - x);
    let height = (raw.pixel_height as u32).min(img_height - y);
    if width == 0 || height == 0 {
        return None;
    }

    let label = raw
        .suggested_class
        .as_deref()
        .and_then(CardLabel::parse);
    let role = raw.region_type.as_deref().and_then(RegionRole::from_wire);
    let position_index = raw.position_index.filter(|&i| i >= 0);

    Some(RegionSeed {
        geometry: RegionGeometry {
            x,
            y,
            width,
            height,
        },
        label,
        confidence: raw.confidence,
        role,
        position_index,
    })
}
