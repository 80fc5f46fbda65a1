//! LabelingStore - Interactive Region Labeling Session State
//!
//! ## Responsibilities
//!
//! - One session at a time: a captured still plus its regions
//! - Region lifecycle: populate from seeds, create by hand, delete, label
//! - Cursor and selection management with auto-advance to the next
//!   unlabeled region after each label assignment
//!
//! The store is a plain state machine; callers wrap it in a lock. All
//! mutations keep the invariant that the cursor points at a valid region
//! whenever the session is non-empty, and the selection (when set) matches
//! an existing region id.

use crate::error::{Error, Result};
use crate::models::{CardLabel, Region, RegionGeometry, RegionSeed, StillImage};
use uuid::Uuid;

/// Result of assigning a label to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOutcome {
    /// No region with that id
    NotFound,
    /// Label stored; cursor advanced to the next unlabeled region
    Advanced { next_index: usize },
    /// Label stored and every region is now labeled
    SessionComplete,
}

/// One labeling session over a captured still
#[derive(Debug)]
pub struct LabelingSession {
    pub session_id: Uuid,
    pub image: StillImage,
    regions: Vec<Region>,
    selected: Option<u64>,
    cursor: usize,
    next_region_id: u64,
}

impl LabelingSession {
    fn new(image: StillImage) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            image,
            regions: Vec::new(),
            selected: None,
            cursor: 0,
            next_region_id: 1,
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Region currently under the cursor
    pub fn current(&self) -> Option<&Region> {
        self.regions.get(self.cursor)
    }

    /// Whether every region carries a label (vacuously true when empty)
    pub fn is_complete(&self) -> bool {
        self.regions.iter().all(Region::is_labeled)
    }

    /// Replace all regions from seeds, dropping seeds whose geometry does
    /// not fit the session image
    pub fn replace_all(&mut self, seeds: Vec<RegionSeed>) {
        self.regions.clear();
        for seed in seeds {
            if !seed.geometry.fits_within(self.image.width, self.image.height) {
                tracing::warn!(geometry = ?seed.geometry, "Dropping out-of-bounds region seed");
                continue;
            }
            let id = self.next_region_id;
            self.next_region_id += 1;
            self.regions.push(Region {
                id,
                geometry: seed.geometry,
                label: seed.label,
                confidence: seed.confidence,
                role: seed.role,
                position_index: seed.position_index,
            });
        }
        self.cursor = 0;
        self.selected = self.regions.first().map(|r| r.id);
    }

    /// Add a hand-drawn region and select it
    pub fn create(&mut self, geometry: RegionGeometry) -> Result<u64> {
        if !geometry.fits_within(self.image.width, self.image.height) {
            return Err(Error::Validation(format!(
                "region {geometry:?} exceeds image bounds {}x{}",
                self.image.width, self.image.height
            )));
        }
        let id = self.next_region_id;
        self.next_region_id += 1;
        self.regions.push(Region {
            id,
            geometry,
            label: None,
            confidence: None,
            role: None,
            position_index: None,
        });
        self.cursor = self.regions.len() - 1;
        self.selected = Some(id);
        Ok(id)
    }

    /// Delete a region by id; returns false if it does not exist
    pub fn delete(&mut self, id: u64) -> bool {
        let Some(idx) = self.regions.iter().position(|r| r.id == id) else {
            return false;
        };
        self.regions.remove(idx);
        if self.selected == Some(id) {
            // Deleting the selected region drops the selection and steps
            // the cursor back one, floored at 0
            self.selected = None;
            self.cursor = self.cursor.saturating_sub(1);
        } else if idx < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.regions.len() {
            self.cursor = self.regions.len().saturating_sub(1);
        }
        true
    }

    /// Select a region by id (or clear the selection)
    ///
    /// Selecting an existing region moves the cursor to it.
    pub fn select(&mut self, id: Option<u64>) -> bool {
        match id {
            None => {
                self.selected = None;
                true
            }
            Some(id) => match self.regions.iter().position(|r| r.id == id) {
                Some(idx) => {
                    self.selected = Some(id);
                    self.cursor = idx;
                    true
                }
                None => false,
            },
        }
    }

    /// Assign a label and auto-advance the cursor to the next unlabeled
    /// region, scanning forward then wrapping
    pub fn assign_label(&mut self, id: u64, label: CardLabel) -> LabelOutcome {
        let Some(idx) = self.regions.iter().position(|r| r.id == id) else {
            return LabelOutcome::NotFound;
        };
        self.regions[idx].label = Some(label);

        let len = self.regions.len();
        let next = (idx + 1..len)
            .chain(0..idx)
            .find(|&i| !self.regions[i].is_labeled());
        match next {
            Some(next_index) => {
                self.cursor = next_index;
                self.selected = Some(self.regions[next_index].id);
                LabelOutcome::Advanced { next_index }
            }
            None => LabelOutcome::SessionComplete,
        }
    }
}

/// LabelingStore instance
#[derive(Debug, Default)]
pub struct LabelingStore {
    session: Option<LabelingSession>,
}

impl LabelingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session over a captured still, replacing any prior one
    pub fn begin_session(&mut self, image: StillImage) -> &mut LabelingSession {
        let session = LabelingSession::new(image);
        tracing::debug!(session_id = %session.session_id, "Labeling session started");
        self.session.insert(session)
    }

    pub fn session(&self) -> Option<&LabelingSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut LabelingSession> {
        self.session.as_mut()
    }

    /// Discard the active session
    pub fn clear(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session_id = %session.session_id, "Labeling session cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> StillImage {
        StillImage::new(vec![0u8; 16], 800, 600)
    }

    fn geom(x: u32, y: u32) -> RegionGeometry {
        RegionGeometry {
            x,
            y,
            width: 40,
            height: 60,
        }
    }

    fn seeded_session(count: u32) -> LabelingStore {
        let mut store = LabelingStore::new();
        let session = store.begin_session(image());
        let seeds = (0..count)
            .map(|i| RegionSeed::bare(geom(i * 50, 10)))
            .collect();
        session.replace_all(seeds);
        store
    }

    #[test]
    fn test_replace_all_resets_cursor_and_selection() {
        let mut store = seeded_session(3);
        let s = store.session().unwrap();
        assert_eq!(s.regions().len(), 3);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.selected(), Some(s.regions()[0].id));
        assert!(!s.is_complete());

        // Out-of-bounds seeds are filtered out
        let s = store.session_mut().unwrap();
        s.replace_all(vec![
            RegionSeed::bare(geom(0, 0)),
            RegionSeed::bare(geom(790, 0)),
        ]);
        assert_eq!(s.regions().len(), 1);
    }

    #[test]
    fn test_create_validates_bounds_and_selects() {
        let mut store = seeded_session(2);
        let s = store.session_mut().unwrap();
        let err = s.create(geom(780, 0)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(s.regions().len(), 2);

        let id = s.create(geom(200, 200)).unwrap();
        assert_eq!(s.selected(), Some(id));
        assert_eq!(s.cursor(), 2);
    }

    #[test]
    fn test_delete_adjusts_cursor_and_selection() {
        let mut store = seeded_session(3);
        let s = store.session_mut().unwrap();
        let ids: Vec<u64> = s.regions().iter().map(|r| r.id).collect();

        s.select(Some(ids[2]));
        assert_eq!(s.cursor(), 2);
        assert!(s.delete(ids[2]));
        assert_eq!(s.selected(), None);
        assert_eq!(s.cursor(), 1);

        // Deleting before the cursor shifts it back
        s.select(Some(ids[1]));
        assert!(s.delete(ids[0]));
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.current().map(|r| r.id), Some(ids[1]));

        assert!(!s.delete(9999));
    }

    #[test]
    fn test_delete_selected_middle_region_steps_cursor_back() {
        let mut store = seeded_session(3);
        let s = store.session_mut().unwrap();
        let ids: Vec<u64> = s.regions().iter().map(|r| r.id).collect();

        s.select(Some(ids[1]));
        assert_eq!(s.cursor(), 1);
        assert!(s.delete(ids[1]));
        assert_eq!(s.selected(), None);
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.current().map(|r| r.id), Some(ids[0]));

        // Deleting the selected first region floors the cursor at 0
        s.select(Some(ids[0]));
        assert!(s.delete(ids[0]));
        assert_eq!(s.cursor(), 0);
        assert_eq!(s.current().map(|r| r.id), Some(ids[2]));
    }

    #[test]
    fn test_assign_label_auto_advances_and_wraps() {
        let mut store = seeded_session(3);
        let s = store.session_mut().unwrap();
        let ids: Vec<u64> = s.regions().iter().map(|r| r.id).collect();
        let label = |name: &str| CardLabel::parse(name).unwrap();

        // Label the middle region first: advance goes forward to index 2
        let outcome = s.assign_label(ids[1], label("Ah"));
        assert_eq!(outcome, LabelOutcome::Advanced { next_index: 2 });
        assert_eq!(s.selected(), Some(ids[2]));

        // Labeling the last region wraps around to index 0
        let outcome = s.assign_label(ids[2], label("Kd"));
        assert_eq!(outcome, LabelOutcome::Advanced { next_index: 0 });
        assert_eq!(s.selected(), Some(ids[0]));

        let outcome = s.assign_label(ids[0], label("2c"));
        assert_eq!(outcome, LabelOutcome::SessionComplete);
        assert!(s.is_complete());

        assert_eq!(s.assign_label(9999, label("As")), LabelOutcome::NotFound);
    }

    #[test]
    fn test_begin_session_replaces_previous() {
        let mut store = seeded_session(2);
        let first_id = store.session().unwrap().session_id;
        store.begin_session(image());
        let s = store.session().unwrap();
        assert_ne!(s.session_id, first_id);
        assert!(s.regions().is_empty());
        store.clear();
        assert!(store.session().is_none());
    }

    #[test]
    fn test_random_create_delete_keeps_cursor_valid() {
        let mut store = LabelingStore::new();
        let s = store.begin_session(image());
        // Deterministic LCG drives a mixed create/delete workload
        let mut state: u64 = 0x2545F4914F6CDD1D;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u32
        };

        for _ in 0..500 {
            if next() % 3 == 0 && !s.regions().is_empty() {
                let pick = (next() as usize) % s.regions().len();
                let id = s.regions()[pick].id;
                assert!(s.delete(id));
            } else {
                let x = next() % 700;
                let y = next() % 500;
                s.create(geom(x, y)).unwrap();
            }
            if s.regions().is_empty() {
                assert_eq!(s.cursor(), 0);
            } else {
                assert!(s.cursor() < s.regions().len());
                if let Some(sel) = s.selected() {
                    assert!(s.regions().iter().any(|r| r.id == sel));
                }
            }
        }
    }
}
