//! Fight staging: attack tokens, wild-token allocation and played cards,
//! all bounded by what the ledger says the player currently holds.
//!
//! Nothing here spends anything. The allocation is a hypothesis that gets
//! previewed by the server and finally submitted; the authoritative counters
//! only change when the next snapshot arrives.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::game::ledger::LedgerView;
use crate::game::model::{CardKind, Color, ColorMap, FightRequest, Threat, TokenUse};

/// Token caps taken from the latest ledger projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCaps {
    pub attack: u32,
    pub wild: u32,
}

impl From<&LedgerView> for TokenCaps {
    fn from(ledger: &LedgerView) -> Self {
        Self {
            attack: ledger.tokens.attack,
            wild: ledger.tokens.wild,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FightStaging {
    pub threat_id: String,
    pub threat_name: String,
    pub row: usize,
    pub boss: bool,
    /// Unmodified threat cost; the fallback whenever no preview is held.
    pub base_cost: ColorMap,
    pub attack_used: u32,
    pub wild_allocation: ColorMap,
    pub played_upgrades: BTreeSet<String>,
    pub played_weapons: BTreeSet<String>,
    pub boss_threshold: Option<String>,
    pub stance_choice: Option<Color>,
    pub precision_choice: Option<String>,
}

impl FightStaging {
    pub fn new(threat: &Threat, row: usize) -> Self {
        Self {
            threat_id: threat.id.clone(),
            threat_name: threat.name.clone(),
            row,
            boss: threat.boss,
            base_cost: threat.cost,
            attack_used: 0,
            wild_allocation: ColorMap::default(),
            played_upgrades: BTreeSet::new(),
            played_weapons: BTreeSet::new(),
            boss_threshold: None,
            stance_choice: None,
            precision_choice: None,
        }
    }

    /// Set the attack-token count, clamped to `[0, caps.attack]`.
    /// Returns the value actually stored.
    pub fn set_attack_used(&mut self, n: u32, caps: TokenCaps) -> u32 {
        self.attack_used = n.min(caps.attack);
        self.attack_used
    }

    /// Put one more wild token on `color` if the cap allows it.
    pub fn add_wild(&mut self, color: Color, caps: TokenCaps) -> bool {
        if self.wild_allocation.total() >= caps.wild {
            return false;
        }
        *self.wild_allocation.get_mut(color) += 1;
        true
    }

    pub fn remove_wild(&mut self, color: Color) -> bool {
        let slot = self.wild_allocation.get_mut(color);
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    /// Move one wild token from `from` to `to`. If the cap has shrunk below
    /// the current allocation the token is dropped rather than re-added.
    pub fn move_wild(&mut self, from: Color, to: Color, caps: TokenCaps) -> bool {
        if from == to || !self.remove_wild(from) {
            return false;
        }
        self.add_wild(to, caps);
        true
    }

    /// Flip a card in or out of play. Returns whether it is now played.
    pub fn toggle_card(&mut self, id: &str, kind: CardKind) -> bool {
        let set = self.played_mut(kind);
        if set.remove(id) {
            false
        } else {
            set.insert(id.to_string());
            true
        }
    }

    pub fn is_played(&self, id: &str, kind: CardKind) -> bool {
        match kind {
            CardKind::Upgrade => self.played_upgrades.contains(id),
            CardKind::Weapon => self.played_weapons.contains(id),
        }
    }

    fn played_mut(&mut self, kind: CardKind) -> &mut BTreeSet<String> {
        match kind {
            CardKind::Upgrade => &mut self.played_upgrades,
            CardKind::Weapon => &mut self.played_weapons,
        }
    }

    /// Bring the allocation back inside the ledger's current caps: clamp
    /// attack tokens, shed wild tokens from the largest color until the sum
    /// fits, and un-play cards the player no longer owns. Returns whether
    /// anything changed.
    pub fn heal(&mut self, ledger: &LedgerView) -> bool {
        let caps = TokenCaps::from(ledger);
        let before = self.clone();

        self.attack_used = self.attack_used.min(caps.attack);
        while self.wild_allocation.total() > caps.wild {
            let largest = largest_color(&self.wild_allocation);
            *self.wild_allocation.get_mut(largest) -= 1;
        }
        self.played_upgrades
            .retain(|id| ledger.owns(CardKind::Upgrade, id));
        self.played_weapons
            .retain(|id| ledger.owns(CardKind::Weapon, id));

        *self != before
    }

    /// Wire payload for both the preview and the final submission.
    /// Card lists come out sorted, so the JSON is a stable change key.
    pub fn request(&self) -> FightRequest {
        FightRequest {
            row: self.row,
            threat_id: self.threat_id.clone(),
            use_tokens: TokenUse {
                attack: self.attack_used,
                wild_allocation: self.wild_allocation,
            },
            played_upgrades: self.played_upgrades.iter().cloned().collect(),
            played_weapons: self.played_weapons.iter().cloned().collect(),
            boss_threshold: self.boss_threshold.clone(),
            stance_choice: self.stance_choice,
            precision_choice: self.precision_choice.clone(),
        }
    }
}

/// Color holding the most tokens; ties resolve in R, B, G order.
fn largest_color(map: &ColorMap) -> Color {
    Color::ALL
        .into_iter()
        .fold(Color::R, |best, c| if map.get(c) > map.get(best) { c } else { best })
}

/// How a cost would be paid from the player's own resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentPlan {
    pub adjusted_cost: ColorMap,
    pub auto_payment: ColorMap,
    pub missing_cost: ColorMap,
    pub fully_paid: bool,
}

impl PaymentPlan {
    pub fn compute(adjusted_cost: ColorMap, resources: ColorMap) -> Self {
        let auto_payment =
            ColorMap::from_fn(|c| adjusted_cost.get(c).min(resources.get(c)));
        let missing_cost =
            ColorMap::from_fn(|c| adjusted_cost.get(c).saturating_sub(auto_payment.get(c)));
        Self {
            adjusted_cost,
            auto_payment,
            missing_cost,
            fully_paid: missing_cost.is_zero(),
        }
    }
}
