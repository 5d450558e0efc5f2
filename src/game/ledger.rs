//! Read-only projection of the viewed player's holdings.
//!
//! A `LedgerView` is rebuilt from the latest snapshot on every operation so
//! caps (token counts, slot capacities) always reflect the newest push.

use serde::Serialize;

use crate::game::model::{CardKind, ColorMap, GameSnapshot, Player, PlayerStatus, Stance, Tokens};
use crate::game::overrides::LocalOverrides;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerView {
    pub player_id: String,
    pub name: String,
    /// Stance with local overrides applied.
    pub stance: Stance,
    /// Stance as last pushed by the server.
    pub authoritative_stance: Stance,
    pub resources: ColorMap,
    pub tokens: Tokens,
    pub upgrade_ids: Vec<String>,
    pub weapon_ids: Vec<String>,
    pub upgrade_slots: u8,
    pub weapon_slots: u8,
    pub action_used: bool,
    pub buy_used: bool,
    pub surrendered: bool,
    /// The viewed player is the local client.
    pub is_self: bool,
    /// The viewed player holds the turn.
    pub is_their_turn: bool,
}

impl LedgerView {
    /// Project `player_id` out of `snapshot` with `overrides` applied.
    /// Overrides only ever apply to the local player.
    pub fn project(
        snapshot: &GameSnapshot,
        player_id: &str,
        overrides: &LocalOverrides,
    ) -> Option<LedgerView> {
        let auth = snapshot.player(player_id)?;
        let is_self = snapshot.you == player_id;
        let player = if is_self {
            overrides.project(auth)
        } else {
            auth.clone()
        };
        Some(Self::from_player(
            &player,
            auth.stance,
            is_self,
            snapshot.active_player_id == player_id,
        ))
    }

    fn from_player(p: &Player, authoritative_stance: Stance, is_self: bool, turn: bool) -> Self {
        Self {
            player_id: p.id.clone(),
            name: p.name.clone(),
            stance: p.stance,
            authoritative_stance,
            resources: p.resources,
            tokens: p.tokens,
            upgrade_ids: p.upgrades.iter().map(|c| c.id.clone()).collect(),
            weapon_ids: p.weapons.iter().map(|c| c.id.clone()).collect(),
            upgrade_slots: p.upgrade_slots,
            weapon_slots: p.weapon_slots,
            action_used: p.action_used,
            buy_used: p.buy_used,
            surrendered: p.status == PlayerStatus::Surrendered,
            is_self,
            is_their_turn: turn,
        }
    }

    /// True when the viewed player is the local client and it is their turn.
    pub fn is_my_turn(&self) -> bool {
        self.is_self && self.is_their_turn
    }

    pub fn owned(&self, kind: CardKind) -> &[String] {
        match kind {
            CardKind::Upgrade => &self.upgrade_ids,
            CardKind::Weapon => &self.weapon_ids,
        }
    }

    pub fn owns(&self, kind: CardKind, id: &str) -> bool {
        self.owned(kind).iter().any(|c| c == id)
    }

    pub fn slots(&self, kind: CardKind) -> u8 {
        match kind {
            CardKind::Upgrade => self.upgrade_slots,
            CardKind::Weapon => self.weapon_slots,
        }
    }

    /// Owned card count for `kind` is below its slot capacity.
    pub fn has_free_slot(&self, kind: CardKind) -> bool {
        self.owned(kind).len() < usize::from(self.slots(kind))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::game::model::*;

    pub fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            name: id.to_uppercase(),
            stance: Stance::Aggressive,
            resources: ColorMap::new(1, 0, 0),
            tokens: Tokens {
                attack: 2,
                wild: 2,
                mass: 0,
                conversion: 1,
            },
            upgrades: vec![OwnedCard {
                id: "u1".to_string(),
                name: "Plating".to_string(),
            }],
            weapons: vec![OwnedCard {
                id: "w1".to_string(),
                name: "Lance".to_string(),
            }],
            upgrade_slots: 2,
            weapon_slots: 1,
            action_used: false,
            buy_used: false,
            status: PlayerStatus::Active,
        }
    }

    /// Two-player snapshot on turn 1 with "me" active.
    pub fn snapshot() -> GameSnapshot {
        GameSnapshot {
            game_id: "g1".to_string(),
            turn: 1,
            active_player_id: "me".to_string(),
            you: "me".to_string(),
            baseline_stance: Some(Stance::Aggressive),
            players: vec![player("me"), player("rival")],
            threat_rows: vec![
                vec![Threat {
                    id: "t1".to_string(),
                    name: "Raider".to_string(),
                    cost: ColorMap::new(3, 0, 0),
                    boss: false,
                }],
                vec![Threat {
                    id: "boss".to_string(),
                    name: "Warlord".to_string(),
                    cost: ColorMap::new(2, 2, 2),
                    boss: true,
                }],
            ],
            market: vec![
                MarketCard {
                    id: "m1".to_string(),
                    name: "Shield".to_string(),
                    kind: CardKind::Upgrade,
                    cost: ColorMap::new(1, 0, 0),
                },
                MarketCard {
                    id: "m2".to_string(),
                    name: "Cannon".to_string(),
                    kind: CardKind::Weapon,
                    cost: ColorMap::new(0, 0, 1),
                },
            ],
        }
    }
}
