//! TableLayout - Calibrated Card Slot Positions
//!
//! Normalized (0..1) slot rectangles for hero and board cards, used to seed
//! a labeling session when auto-detection finds nothing. The defaults match
//! the stock table calibration; presets and per-table calibrations live on
//! the backend.

use crate::error::{Error, Result};
use crate::models::{RegionGeometry, RegionRole, RegionSeed};
use serde::{Deserialize, Serialize};

/// One normalized card slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardSlot {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Positional index within the role (hero 0-1, board 0-4)
    pub index: i32,
}

/// Full table layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableLayout {
    pub name: String,
    pub hero_cards: Vec<CardSlot>,
    pub board_cards: Vec<CardSlot>,
}

const HERO_XS: [f64; 2] = [0.435, 0.485];
const HERO_Y: f64 = 0.68;
const HERO_W: f64 = 0.045;
const HERO_H: f64 = 0.10;

const BOARD_BASE_X: f64 = 0.315;
const BOARD_SPACING: f64 = 0.055;
const BOARD_Y: f64 = 0.38;
const BOARD_W: f64 = 0.045;
const BOARD_H: f64 = 0.095;

impl Default for TableLayout {
    /// Stock calibration
    fn default() -> Self {
        let hero_cards = HERO_XS
            .iter()
            .enumerate()
            .map(|(i, &x)| CardSlot {
                x,
                y: HERO_Y,
                width: HERO_W,
                height: HERO_H,
                index: i as i32,
            })
            .collect();
        let board_cards = (0..5)
            .map(|i| CardSlot {
                x: BOARD_BASE_X + BOARD_SPACING * i as f64,
                y: BOARD_Y,
                width: BOARD_W,
                height: BOARD_H,
                index: i,
            })
            .collect();
        Self {
            name: "default".to_string(),
            hero_cards,
            board_cards,
        }
    }
}

impl TableLayout {
    /// Scale every slot to pixel regions for an image of the given size
    ///
    /// Slots that fall outside the image after scaling are dropped. Seeds
    /// carry role and position but no label.
    pub fn seeds_for(&self, img_width: u32, img_height: u32) -> Vec<RegionSeed> {
        let mut seeds = Vec::with_capacity(self.hero_cards.len() + self.board_cards.len());
        for (role, slots) in [
            (RegionRole::Hero, &self.hero_cards),
            (RegionRole::Board, &self.board_cards),
        ] {
            for slot in slots {
                let Some(geometry) = scale_slot(slot, img_width, img_height) else {
                    tracing::warn!(?role, index = slot.index, "Layout slot outside image, skipped");
                    continue;
                };
                seeds.push(RegionSeed {
                    geometry,
                    label: None,
                    confidence: None,
                    role: Some(role),
                    position_index: Some(slot.index),
                });
            }
        }
        seeds
    }
}

fn scale_slot(slot: &CardSlot, img_width: u32, img_height: u32) -> Option<RegionGeometry> {
    if !(0.0..1.0).contains(&slot.x) || !(0.0..1.0).contains(&slot.y) {
        return None;
    }
    let geometry = RegionGeometry {
        x: (slot.x * img_width as f64).round() as u32,
        y: (slot.y * img_height as f64).round() as u32,
        width: (slot.width * img_width as f64).round().max(1.0) as u32,
        height: (slot.height * img_height as f64).round().max(1.0) as u32,
    };
    geometry.fits_within(img_width, img_height).then_some(geometry)
}

/// Client for backend layout storage
pub struct LayoutClient {
    client: reqwest::Client,
    base_url: String,
}

impl LayoutClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Fetch the active layout
    pub async fn fetch_layout(&self) -> Result<TableLayout> {
        let url = format!("{}/api/layout", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!("layout fetch returned {}", resp.status())));
        }
        Ok(resp.json().await?)
    }

    /// List available preset names
    pub async fn fetch_presets(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/layout/presets", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "layout presets returned {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct Presets {
            #[serde(default)]
            presets: Vec<String>,
        }
        let body: Presets = resp.json().await?;
        Ok(body.presets)
    }

    /// Activate a preset and return the resulting layout
    pub async fn apply_preset(&self, name: &str) -> Result<TableLayout> {
        let url = format!("{}/api/layout/presets/{name}/apply", self.base_url);
        let resp = self.client.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!(
                "layout preset apply returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    /// Push a calibration update
    pub async fn push_layout(&self, layout: &TableLayout) -> Result<()> {
        let url = format!("{}/api/layout", self.base_url);
        let resp = self.client.post(&url).json(layout).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Network(format!("layout push returned {}", resp.status())));
        }
        tracing::info!(layout = %layout.name, "Layout calibration pushed");
        Ok(())
    }
}
