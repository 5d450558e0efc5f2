//! `/api/stage/*` routes: stage, adjust, confirm or cancel the turn action.
//!
//! Every handler replies with the current `StagingView`. Rejections never
//! fail the request; they surface as notices on the outbox.

use serde::Deserialize;

use crate::error::StagingError;
use crate::game::model::{CardKind, Color, PreviewReply, Stance};
use crate::routes::util::{Params, respond};
use crate::staging::coordinator::FightOptions;

// ── Opening an action ──────────────────────────────────────────────

/// Handle POST /api/stage/stance
/// Body params: target={stance}
pub fn handle_stance_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let target = p.require_with("target", Stance::parse)?;
        s.stage(|c, ctx| c.request_stance(target, ctx));
        Ok(())
    })
}

/// Handle POST /api/stage/extend
/// Body params: slot={upgrade|weapon}
pub fn handle_extend_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let slot = p.require_with("slot", CardKind::parse)?;
        s.stage(|c, ctx| c.open_extend(slot, ctx));
        Ok(())
    })
}

/// Handle POST /api/stage/purchase
/// Body params: card={market card id}
pub fn handle_purchase_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let card = p.require("card")?;
        s.stage(|c, ctx| c.open_purchase(card, ctx));
        Ok(())
    })
}

/// Handle POST /api/stage/fight
/// Body params: threat={id}&row={n}
pub fn handle_fight_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let threat = p.require("threat")?;
        let row: usize = p.require_as("row")?;
        s.stage(|c, ctx| c.open_fight(row, threat, ctx));
        Ok(())
    })
}

// ── Fight allocation ───────────────────────────────────────────────

/// Handle POST /api/stage/fight/attack
/// Body params: count={n}. Clamped to the attack tokens held.
pub fn handle_attack_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let count: u32 = p.require_as("count")?;
        s.stage(|c, ctx| c.set_attack_used(count, ctx));
        Ok(())
    })
}

/// Handle POST /api/stage/fight/wild
/// Body params:
///   - action=add&color={R|B|G}
///   - action=remove&color={R|B|G}
///   - action=move&from={color}&to={color}
pub fn handle_wild_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        match p.require("action")? {
            "add" => {
                let color = p.require_with("color", Color::parse)?;
                s.stage(|c, ctx| c.add_wild(color, ctx));
            }
            "remove" => {
                let color = p.require_with("color", Color::parse)?;
                s.stage(|c, ctx| c.remove_wild(color, ctx));
            }
            "move" => {
                let from = p.require_with("from", Color::parse)?;
                let to = p.require_with("to", Color::parse)?;
                s.stage(|c, ctx| c.move_wild(from, to, ctx));
            }
            other => {
                return Err(StagingError::invalid(format!("unknown wild action: {}", other)));
            }
        }
        Ok(())
    })
}

/// Handle POST /api/stage/fight/card
/// Body params: id={card id}&kind={upgrade|weapon}. Toggles the card.
pub fn handle_card_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let id = p.require("id")?;
        let kind = p.require_with("kind", CardKind::parse)?;
        s.stage(|c, ctx| c.toggle_card(id, kind, ctx));
        Ok(())
    })
}

/// Handle POST /api/stage/fight/options
/// Body params (all optional, empty clears):
/// boss_threshold={tag}&stance_choice={color}&precision={tag}
pub fn handle_options_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let options = FightOptions {
            boss_threshold: p.non_empty("boss_threshold").map(str::to_string),
            stance_choice: p.optional_with("stance_choice", Color::parse)?,
            precision_choice: p.non_empty("precision").map(str::to_string),
        };
        s.stage(|c, ctx| c.set_options(options, ctx));
        Ok(())
    })
}

// ── Preview delivery ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PreviewDelivery {
    generation: u64,
    reply: PreviewReply,
}

/// Handle POST /api/stage/preview
/// Body is `{"generation": n, "reply": {...}}`. Stale replies are dropped.
pub fn handle_preview_post(query: &str, body: &str) -> String {
    respond(&Params::parse(query), |s, _| {
        let delivery: PreviewDelivery = serde_json::from_str(body)
            .map_err(|e| StagingError::invalid(format!("preview JSON: {}", e)))?;
        s.apply_preview(delivery.generation, delivery.reply);
        Ok(())
    })
}

// ── Confirm / cancel ───────────────────────────────────────────────

pub fn handle_confirm_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, _| {
        s.stage(|c, ctx| c.confirm(ctx));
        Ok(())
    })
}

pub fn handle_cancel_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, _| {
        s.stage(|c, ctx| c.cancel(ctx));
        Ok(())
    })
}
