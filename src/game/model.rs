//! Authoritative game data as pushed by the server, plus the wire shapes the
//! staging subsystem sends back out.
//!
//! Everything here derives Serialize/Deserialize so snapshots arrive straight
//! from the worker bridge as JSON and outbound payloads leave the same way.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four player postures. `Balanced` is adjacent to every other stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stance {
    Aggressive,
    Balanced,
    Hunkered,
    Greedy,
}

impl Stance {
    pub const ALL: [Stance; 4] = [
        Stance::Aggressive,
        Stance::Balanced,
        Stance::Hunkered,
        Stance::Greedy,
    ];

    /// Steps between two stances: 0 if equal, 1 if either side is `Balanced`,
    /// 2 otherwise.
    pub fn distance(self, other: Stance) -> u8 {
        if self == other {
            0
        } else if self == Stance::Balanced || other == Stance::Balanced {
            1
        } else {
            2
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stance::Aggressive => "AGGRESSIVE",
            Stance::Balanced => "BALANCED",
            Stance::Hunkered => "HUNKERED",
            Stance::Greedy => "GREEDY",
        }
    }

    /// Case-insensitive parse of a form value.
    pub fn parse(s: &str) -> Option<Stance> {
        Stance::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    R,
    B,
    G,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::R, Color::B, Color::G];

    pub fn parse(s: &str) -> Option<Color> {
        match s.trim() {
            "R" | "r" => Some(Color::R),
            "B" | "b" => Some(Color::B),
            "G" | "g" => Some(Color::G),
            _ => None,
        }
    }
}

/// A count per resource color. Missing keys on the wire default to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorMap {
    #[serde(rename = "R", default)]
    pub r: u32,
    #[serde(rename = "B", default)]
    pub b: u32,
    #[serde(rename = "G", default)]
    pub g: u32,
}

impl ColorMap {
    pub const fn new(r: u32, b: u32, g: u32) -> Self {
        Self { r, b, g }
    }

    pub fn get(&self, color: Color) -> u32 {
        match color {
            Color::R => self.r,
            Color::B => self.b,
            Color::G => self.g,
        }
    }

    pub fn get_mut(&mut self, color: Color) -> &mut u32 {
        match color {
            Color::R => &mut self.r,
            Color::B => &mut self.b,
            Color::G => &mut self.g,
        }
    }

    /// Sum of all colors, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.r.saturating_add(self.b).saturating_add(self.g)
    }

    pub fn is_zero(&self) -> bool {
        Color::ALL.iter().all(|&c| self.get(c) == 0)
    }

    /// True when every color in `self` is at least the matching color in `cost`.
    pub fn covers(&self, cost: &ColorMap) -> bool {
        Color::ALL.iter().all(|&c| self.get(c) >= cost.get(c))
    }

    /// Build a map by evaluating `f` for every color.
    pub fn from_fn(mut f: impl FnMut(Color) -> u32) -> Self {
        Self {
            r: f(Color::R),
            b: f(Color::B),
            g: f(Color::G),
        }
    }
}

/// Named token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    #[serde(default)]
    pub attack: u32,
    #[serde(default)]
    pub wild: u32,
    #[serde(default)]
    pub mass: u32,
    #[serde(default)]
    pub conversion: u32,
}

/// Upgrade or weapon: the two owned-card kinds, each with its own slot track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Upgrade,
    Weapon,
}

impl CardKind {
    pub fn parse(s: &str) -> Option<CardKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upgrade" | "upgrades" => Some(CardKind::Upgrade),
            "weapon" | "weapons" => Some(CardKind::Weapon),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CardKind::Upgrade => "upgrade",
            CardKind::Weapon => "weapon",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedCard {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    #[default]
    Active,
    Surrendered,
}

fn default_slots() -> u8 {
    1
}

/// A player record as carried by the authoritative snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub stance: Stance,
    #[serde(default)]
    pub resources: ColorMap,
    #[serde(default)]
    pub tokens: Tokens,
    #[serde(default)]
    pub upgrades: Vec<OwnedCard>,
    #[serde(default)]
    pub weapons: Vec<OwnedCard>,
    #[serde(default = "default_slots")]
    pub upgrade_slots: u8,
    #[serde(default = "default_slots")]
    pub weapon_slots: u8,
    #[serde(rename = "actionUsed", default)]
    pub action_used: bool,
    #[serde(rename = "buyUsed", default)]
    pub buy_used: bool,
    #[serde(default)]
    pub status: PlayerStatus,
}

impl Player {
    pub fn cards(&self, kind: CardKind) -> &[OwnedCard] {
        match kind {
            CardKind::Upgrade => &self.upgrades,
            CardKind::Weapon => &self.weapons,
        }
    }

    pub fn slots(&self, kind: CardKind) -> u8 {
        match kind {
            CardKind::Upgrade => self.upgrade_slots,
            CardKind::Weapon => self.weapon_slots,
        }
    }
}

/// A threat card sitting in one of the threat rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threat {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: ColorMap,
    #[serde(default)]
    pub boss: bool,
}

/// A purchasable card on the market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCard {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub kind: CardKind,
    #[serde(default)]
    pub cost: ColorMap,
}

/// The full authoritative state pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub turn: u32,
    pub active_player_id: String,
    /// The local client's own player id.
    pub you: String,
    #[serde(default)]
    pub baseline_stance: Option<Stance>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub threat_rows: Vec<Vec<Threat>>,
    #[serde(default)]
    pub market: Vec<MarketCard>,
}

impl GameSnapshot {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn threat(&self, row: usize, threat_id: &str) -> Option<&Threat> {
        self.threat_rows.get(row)?.iter().find(|t| t.id == threat_id)
    }

    pub fn market_card(&self, card_id: &str) -> Option<&MarketCard> {
        self.market.iter().find(|c| c.id == card_id)
    }

    /// Whether `other` belongs to a different turn-action cycle than `self`.
    pub fn is_new_turn(&self, other: &GameSnapshot) -> bool {
        self.game_id != other.game_id
            || self.turn != other.turn
            || self.active_player_id != other.active_player_id
    }
}

// ── Wire payloads ──────────────────────────────────────────────────

/// Token usage block of a fight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUse {
    pub attack: u32,
    pub wild_allocation: ColorMap,
}

/// Fight payload, shared by preview requests and the final submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightRequest {
    pub row: usize,
    pub threat_id: String,
    pub use_tokens: TokenUse,
    pub played_upgrades: Vec<String>,
    pub played_weapons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boss_threshold: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stance_choice: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision_choice: Option<String>,
}

/// A submitted turn action, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    StanceChange { stance: Stance },
    ExtendSlot { slot: CardKind },
    Purchase { card_id: String, kind: CardKind },
    Fight(FightRequest),
}

/// One effect the server applied while computing a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEffect {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
}

/// Successful preview body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub adjusted_cost: ColorMap,
    #[serde(default)]
    pub applied_effects: Vec<AppliedEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What the server answers to a preview request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewReply {
    Failure { error: String },
    Success(Preview),
}
