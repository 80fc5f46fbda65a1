//! QuickLabelComposer - Two-Keystroke Card Entry
//!
//! A rank key ("2".."9", "t", "j", "q", "k", "a") arms a pending rank; a
//! suit key ("c", "d", "h", "s") within the composition window completes a
//! card label. Rank keys always re-arm, so a typo is fixed by just typing
//! the intended rank.

use crate::models::{CardLabel, RANKS, SUITS};
use std::time::Duration;
use tokio::time::Instant;

/// Default composition window between rank and suit keystrokes
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1500);

/// QuickLabelComposer instance
#[derive(Debug)]
pub struct QuickLabelComposer {
    window: Duration,
    pending: Option<(char, Instant)>,
}

impl Default for QuickLabelComposer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl QuickLabelComposer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Feed one keystroke; returns a complete label when a suit key lands
    /// within the window of a pending rank
    pub fn press(&mut self, key: char) -> Option<CardLabel> {
        let now = Instant::now();

        let rank = key.to_ascii_uppercase();
        if RANKS.contains(&rank) {
            // Rank keys always (re-)arm, even while another rank is pending
            self.pending = Some((rank, now));
            return None;
        }

        let suit = key.to_ascii_lowercase();
        if SUITS.contains(&suit) {
            if let Some((pending_rank, armed_at)) = self.pending.take() {
                if now.duration_since(armed_at) <= self.window {
                    return CardLabel::parse(&format!("{pending_rank}{suit}"));
                }
                tracing::trace!(rank = %pending_rank, "Quick-label window expired");
            }
        }
        None
    }

    /// Drop any pending rank
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Whether a rank is armed (regardless of expiry)
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
