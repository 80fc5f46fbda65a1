//! Shared data model: still images, card vocabulary, regions
//!
//! The card class table mirrors the dataset server exactly: 52 classes in
//! suit-major order (clubs, diamonds, hearts, spades), ranks 2..A within each
//! suit. `class_id` values must stay stable because persisted YOLO labels
//! reference them by index.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rank characters in ascending order
pub const RANKS: [char; 13] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K', 'A',
];

/// Suit characters: clubs, diamonds, hearts, spades
pub const SUITS: [char; 4] = ['c', 'd', 'h', 's'];

/// Total number of card classes
pub const CLASS_COUNT: usize = RANKS.len() * SUITS.len();

/// All class names in id order
pub fn card_classes() -> Vec<String> {
    let mut classes = Vec::with_capacity(CLASS_COUNT);
    for suit in SUITS {
        for rank in RANKS {
            classes.push(format!("{rank}{suit}"));
        }
    }
    classes
}

/// Look up the class id for a card name like "As" or "Th"
pub fn class_id(name: &str) -> Option<u16> {
    let mut chars = name.chars();
    let rank = chars.next()?;
    let suit = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let rank_idx = RANKS.iter().position(|&r| r == rank.to_ascii_uppercase())?;
    let suit_idx = SUITS.iter().position(|&s| s == suit.to_ascii_lowercase())?;
    Some((suit_idx * RANKS.len() + rank_idx) as u16)
}

/// Look up the card name for a class id
pub fn class_name(id: u16) -> Option<String> {
    let id = id as usize;
    if id >= CLASS_COUNT {
        return None;
    }
    let suit = SUITS[id / RANKS.len()];
    let rank = RANKS[id % RANKS.len()];
    Some(format!("{rank}{suit}"))
}

/// A concrete card label assigned to a region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLabel {
    pub class_id: u16,
    pub name: String,
}

impl CardLabel {
    /// Parse a card name into a label; None if it is not a known class
    pub fn parse(name: &str) -> Option<Self> {
        let id = class_id(name)?;
        // Normalize to canonical casing (uppercase rank, lowercase suit)
        let name = class_name(id)?;
        Some(Self {
            class_id: id,
            name,
        })
    }
}

/// Semantic role of a region on the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    /// Hero hole card
    Hero,
    /// Community board card
    Board,
}

impl RegionRole {
    /// Map the detector's region_type string; generic "card" carries no role
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "hero" => Some(RegionRole::Hero),
            "board" => Some(RegionRole::Board),
            _ => None,
        }
    }
}

/// Rectangular region geometry in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Normalized center-format box (fractions of image dimensions)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl RegionGeometry {
    /// Whether this geometry lies fully within an image of the given size
    pub fn fits_within(&self, img_width: u32, img_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= img_width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= img_height)
    }

    /// Convert to normalized center coordinates
    pub fn normalized(&self, img_width: u32, img_height: u32) -> NormalizedBox {
        let iw = img_width as f64;
        let ih = img_height as f64;
        NormalizedBox {
            x_center: (self.x as f64 + self.width as f64 / 2.0) / iw,
            y_center: (self.y as f64 + self.height as f64 / 2.0) / ih,
            width: self.width as f64 / iw,
            height: self.height as f64 / ih,
        }
    }
}

/// A detected or drawn region of interest, optionally labeled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Stable id, unique within the labeling session
    pub id: u64,
    pub geometry: RegionGeometry,
    /// Assigned card label, if any
    pub label: Option<CardLabel>,
    /// Detection confidence; present only when detector-assigned
    pub confidence: Option<f32>,
    /// Semantic role, if known
    pub role: Option<RegionRole>,
    /// Positional index within the role (e.g. board card 0-4)
    pub position_index: Option<i32>,
}

impl Region {
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Pre-id region state used to populate a session (detector output or layout seed)
#[derive(Debug, Clone)]
pub struct RegionSeed {
    pub geometry: RegionGeometry,
    pub label: Option<CardLabel>,
    pub confidence: Option<f32>,
    pub role: Option<RegionRole>,
    pub position_index: Option<i32>,
}

impl RegionSeed {
    /// Unlabeled seed with bare geometry
    pub fn bare(geometry: RegionGeometry) -> Self {
        Self {
            geometry,
            label: None,
            confidence: None,
            role: None,
            position_index: None,
        }
    }
}

/// A single rendered frame from the capture source
#[derive(Debug, Clone)]
pub struct StillImage {
    /// Encoded image bytes (JPEG or PNG)
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl StillImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Base64 payload for the wire formats
    pub fn encode_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_table_is_complete_and_stable() {
        let classes = card_classes();
        assert_eq!(classes.len(), 52);
        assert_eq!(classes[0], "2c");
        assert_eq!(classes[12], "Ac");
        assert_eq!(classes[51], "As");
        for (idx, name) in classes.iter().enumerate() {
            assert_eq!(class_id(name), Some(idx as u16));
            assert_eq!(class_name(idx as u16).as_deref(), Some(name.as_str()));
        }
    }

    #[test]
    fn test_class_id_known_cards() {
        assert_eq!(class_id("Ah"), Some(38));
        assert_eq!(class_id("2c"), Some(0));
        assert_eq!(class_id("As"), Some(51));
        assert_eq!(class_id("Xx"), None);
        assert_eq!(class_id("A"), None);
        assert_eq!(class_id("Ahh"), None);
    }

    #[test]
    fn test_card_label_parse_normalizes_case() {
        let label = CardLabel::parse("aH").unwrap();
        assert_eq!(label.name, "Ah");
        assert_eq!(label.class_id, 38);
    }

    #[test]
    fn test_geometry_bounds() {
        let g = RegionGeometry {
            x: 100,
            y: 100,
            width: 40,
            height: 60,
        };
        assert!(g.fits_within(800, 600));
        assert!(!g.fits_within(120, 600));
        let zero = RegionGeometry {
            x: 0,
            y: 0,
            width: 0,
            height: 10,
        };
        assert!(!zero.fits_within(800, 600));
    }

    #[test]
    fn test_normalized_center_format() {
        let g = RegionGeometry {
            x: 100,
            y: 100,
            width: 40,
            height: 60,
        };
        let n = g.normalized(800, 600);
        assert!((n.x_center - 0.15).abs() < 1e-9);
        assert!((n.y_center - 130.0 / 600.0).abs() < 1e-9);
        assert!((n.width - 0.05).abs() < 1e-9);
        assert!((n.height - 0.1).abs() < 1e-9);
    }
}
