//! Stance transitions: free steps versus confirmed jumps.
//!
//! Distance is always measured from the turn's baseline stance. Moves of
//! distance ≤ 1 apply immediately. A distance-2 jump is shown optimistically
//! but must be confirmed, and cancelling falls back to `last_legal`, the
//! last stance that was itself legally reached. That may differ from the
//! baseline when the player chained free steps first.

use serde::Serialize;

use crate::game::model::Stance;
use crate::game::overrides::LocalOverrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanceMove {
    /// Already there; nothing to do.
    Unchanged,
    /// Applied as a free step.
    Free,
    /// Applied optimistically, awaiting confirmation.
    NeedsConfirm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StanceController {
    baseline: Option<Stance>,
    last_legal: Option<Stance>,
}

impl StanceController {
    pub fn is_open(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<Stance> {
        self.baseline
    }

    pub fn last_legal(&self) -> Option<Stance> {
        self.last_legal
    }

    /// Start tracking a turn. `current` is the authoritative stance right now.
    pub fn open(&mut self, baseline: Stance, current: Stance) {
        self.baseline = Some(baseline);
        self.last_legal = Some(current);
    }

    pub fn close(&mut self) {
        self.baseline = None;
        self.last_legal = None;
    }

    /// Apply `target` on top of `current` (the projected stance), writing the
    /// optimistic value into `overrides`. The controller must be open.
    pub fn request(
        &mut self,
        target: Stance,
        current: Stance,
        overrides: &mut LocalOverrides,
    ) -> StanceMove {
        let baseline = self.baseline.unwrap_or(current);
        if target == current && self.last_legal == Some(target) {
            return StanceMove::Unchanged;
        }
        overrides.set_stance(target);
        if baseline.distance(target) <= 1 {
            self.last_legal = Some(target);
            StanceMove::Free
        } else {
            StanceMove::NeedsConfirm
        }
    }

    /// A confirmed jump becomes the new legal fallback.
    pub fn commit(&mut self, stance: Stance) {
        self.last_legal = Some(stance);
    }

    /// Roll the optimistic stance back to the last legal one.
    pub fn revert(&self, overrides: &mut LocalOverrides) {
        if let Some(stance) = self.last_legal {
            overrides.set_stance(stance);
        }
    }
}
