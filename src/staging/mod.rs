//! Turn-action staging: stance transitions, fight allocation, preview
//! reconciliation and the coordinator that enforces one staged action at a
//! time.

pub mod allocation;
pub mod coordinator;
pub mod notify;
pub mod preview;
pub mod stance;
