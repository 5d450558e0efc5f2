//! Staging rejections. Every variant's `Display` doubles as the toast text
//! shown to the player.

use thiserror::Error;

use crate::game::model::{CardKind, ColorMap};
use crate::staging::notify::Severity;

pub type StagingResult<T> = Result<T, StagingError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StagingError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("You already used your main action this turn")]
    ActionUsed,

    #[error("You already bought a card this turn")]
    BuyUsed,

    #[error("No free {kind} slot")]
    SlotFull { kind: CardKind },

    #[error("{kind} slots are already at the maximum of {max}")]
    SlotsMaxed { kind: CardKind, max: u8 },

    #[error("Not enough resources (missing R{} B{} G{})", missing.r, missing.b, missing.g)]
    InsufficientResources { missing: ColorMap },

    #[error("Finish or cancel the current {staged} first")]
    ActionInProgress { staged: &'static str },

    #[error("Nothing is staged")]
    NothingStaged,

    #[error("No fight is staged")]
    NoFightStaged,

    #[error("Cannot confirm yet: {reason}")]
    NotConfirmable { reason: &'static str },

    #[error("Unknown threat {threat_id} in row {row}")]
    UnknownThreat { threat_id: String, row: usize },

    #[error("Unknown card {card_id}")]
    UnknownCard { card_id: String },

    #[error("Unknown player {player_id}")]
    UnknownPlayer { player_id: String },

    #[error("No game state received yet")]
    NoSnapshot,

    #[error("You can only stage actions on your own board")]
    NotViewingSelf,

    #[error("You have surrendered")]
    Surrendered,

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl StagingError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        StagingError::InvalidInput {
            reason: reason.into(),
        }
    }

    /// How loudly the rejection should be surfaced.
    pub fn severity(&self) -> Severity {
        match self {
            StagingError::InvalidInput { .. }
            | StagingError::UnknownPlayer { .. }
            | StagingError::NoSnapshot => Severity::Error,
            StagingError::NothingStaged => Severity::Info,
            _ => Severity::Warning,
        }
    }
}
