//! Local override layer: optimistic client-side values laid over the
//! authoritative snapshot.
//!
//! The snapshot itself is never touched. Views call [`LocalOverrides::project`]
//! to get a player copy with the overrides applied, and the layer is cleared
//! on turn change, session close, or the first snapshot after a submission.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::game::model::{Player, Stance};

/// Player fields the client may override optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideField {
    Stance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OverrideValue {
    Stance(Stance),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocalOverrides {
    entries: BTreeMap<OverrideField, OverrideValue>,
}

impl LocalOverrides {
    pub fn set_stance(&mut self, stance: Stance) {
        self.entries
            .insert(OverrideField::Stance, OverrideValue::Stance(stance));
    }

    pub fn stance(&self) -> Option<Stance> {
        match self.entries.get(&OverrideField::Stance) {
            Some(OverrideValue::Stance(s)) => Some(*s),
            None => None,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return a copy of `player` with every override applied.
    pub fn project(&self, player: &Player) -> Player {
        let mut projected = player.clone();
        for value in self.entries.values() {
            match *value {
                OverrideValue::Stance(s) => projected.stance = s,
            }
        }
        projected
    }

    /// Drop overrides the authoritative player already agrees with.
    pub fn reconcile(&mut self, authoritative: &Player) {
        self.entries.retain(|_, value| match *value {
            OverrideValue::Stance(s) => s != authoritative.stance,
        });
    }
}
