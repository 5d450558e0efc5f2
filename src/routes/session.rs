//! `/api/session/*` and `/api/hover` routes: authoritative state in,
//! queued messages out.

use crate::config::StagingConfig;
use crate::error::StagingError;
use crate::game::model::CardKind;
use crate::game::session::{export_view_json, with_session_mut};
use crate::routes::util::{Params, json, respond};
use crate::staging::notify::HoverTarget;

// ── POST /api/session/snapshot ─────────────────────────────────────

/// Handle POST /api/session/snapshot
/// Body is the server's `GameSnapshot` JSON; `now=` may ride on the query.
pub fn handle_snapshot_post(query: &str, body: &str) -> String {
    respond(&Params::parse(query), |s, _| s.push_snapshot_json(body))
}

// ── POST /api/session/view ─────────────────────────────────────────

/// Handle POST /api/session/view
/// Body params: player={id}
pub fn handle_view_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let player = p.require("player")?;
        s.set_viewed(player)
    })
}

// ── POST /api/session/config ───────────────────────────────────────

/// Handle POST /api/session/config
/// Body is `StagingConfig` JSON. On error the previous config stays.
pub fn handle_config_post(query: &str, body: &str) -> String {
    respond(&Params::parse(query), |s, _| {
        let config = StagingConfig::from_json(body).map_err(StagingError::invalid)?;
        s.set_config(config);
        Ok(())
    })
}

// ── GET /api/session/state ─────────────────────────────────────────

pub fn handle_state_get(_query: &str) -> String {
    export_view_json()
}

// ── GET /api/session/outbox ────────────────────────────────────────

/// Handle GET /api/session/outbox
/// Drains the queue; each message is returned exactly once.
pub fn handle_outbox_get(_query: &str) -> String {
    let messages = with_session_mut(|s| s.drain_outbox());
    json(&messages)
}

// ── POST /api/session/tick ─────────────────────────────────────────

/// Handle POST /api/session/tick
/// Body params: now={ms}
pub fn handle_tick_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, _| {
        s.tick(None);
        Ok(())
    })
}

// ── POST /api/hover ────────────────────────────────────────────────

/// Handle POST /api/hover
/// Body params: card={id}&kind={upgrade|weapon}. An empty `card` clears.
pub fn handle_hover_post(query: &str, body: &str) -> String {
    respond(&Params::merged(query, body), |s, p| {
        let target = match p.non_empty("card") {
            None => None,
            Some(card_id) => Some(HoverTarget {
                card_id: card_id.to_string(),
                kind: p.optional_with("kind", CardKind::parse)?,
            }),
        };
        s.set_hover(target);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ledger::fixtures;
    use crate::game::session::{reset_session, with_session};

    fn push_fixture() {
        reset_session();
        let body = serde_json::to_string(&fixtures::snapshot()).unwrap();
        handle_snapshot_post("", &body);
        with_session_mut(|s| s.drain_outbox());
    }

    #[test]
    fn snapshot_push_returns_view() {
        reset_session();
        let body = serde_json::to_string(&fixtures::snapshot()).unwrap();
        let view = handle_snapshot_post("?now=5", &body);
        assert!(view.contains("\"player_id\":\"me\""));
        assert_eq!(with_session(|s| s.now()), 5);
        reset_session();
    }

    #[test]
    fn malformed_snapshot_is_a_notice() {
        reset_session();
        handle_snapshot_post("", "{not json");
        let out = handle_outbox_get("");
        assert!(out.contains("\"type\":\"notice\""));
        assert!(out.contains("snapshot JSON"));
        assert!(with_session(|s| s.snapshot().is_none()));
        reset_session();
    }

    #[test]
    fn bad_config_keeps_previous() {
        push_fixture();
        handle_config_post("", r#"{"preview_debounce_ms":0}"#);
        handle_config_post("", r#"{"max_slots":0}"#);
        assert_eq!(with_session(|s| s.config().preview_debounce_ms), 0);
        assert_eq!(with_session(|s| s.config().max_slots), 4);
        assert!(handle_outbox_get("").contains("Invalid slot cap"));
        reset_session();
    }

    #[test]
    fn outbox_drains_once() {
        push_fixture();
        handle_view_post("", "player=ghost");
        assert!(handle_outbox_get("").contains("Unknown player ghost"));
        assert_eq!(handle_outbox_get(""), "[]");
        reset_session();
    }

    #[test]
    fn view_switch_to_rival() {
        push_fixture();
        let view = handle_view_post("", "player=rival");
        assert!(view.contains("\"player_id\":\"rival\""));
        assert!(view.contains("\"is_self\":false"));
        reset_session();
    }

    #[test]
    fn tick_advances_clock() {
        push_fixture();
        handle_tick_post("", "now=900");
        handle_tick_post("", "now=100");
        assert_eq!(with_session(|s| s.now()), 900);
        reset_session();
    }

    #[test]
    fn hover_set_and_clear() {
        push_fixture();
        let view = handle_hover_post("", "card=w1&kind=weapon");
        assert!(view.contains("\"card_id\":\"w1\""));
        let view = handle_hover_post("", "card=");
        assert!(view.contains("\"hover\":null"));
        let out = handle_outbox_get("");
        assert_eq!(out.matches("\"type\":\"hover\"").count(), 2);
        reset_session();
    }
}
