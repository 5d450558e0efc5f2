//! Skirmish in-browser staging client.
//!
//! Exports `handle_request(method, path, query, body)` for the page's Web
//! Worker bridge to call. Uses `matchit` for URL routing, the same router
//! engine that powers Axum.
//!
//! The module never talks to the game server itself. Snapshots and preview
//! replies are pushed in through routes; preview requests, submissions and
//! toasts queue on the outbox that the bridge drains from
//! `/api/session/outbox`.

use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod game;
pub mod logging;
pub mod routes;
pub mod staging;

/// Process an HTTP-like request and return a JSON body.
///
/// # Arguments
/// * `method`: HTTP method ("GET" or "POST")
/// * `path`: URL path (e.g., "/api/stage/fight")
/// * `query`: Query string (e.g., "?now=1200")
/// * `body`: Form data or JSON, depending on the route. Empty for GET.
#[wasm_bindgen]
pub fn handle_request(method: &str, path: &str, query: &str, body: &str) -> String {
    let mut router = matchit::Router::new();

    // Session plumbing
    router.insert("/api/session/snapshot", "snapshot").ok();
    router.insert("/api/session/view", "view").ok();
    router.insert("/api/session/config", "config").ok();
    router.insert("/api/session/state", "state").ok();
    router.insert("/api/session/outbox", "outbox").ok();
    router.insert("/api/session/tick", "tick").ok();
    router.insert("/api/hover", "hover").ok();

    // Staging
    router.insert("/api/stage/stance", "stance").ok();
    router.insert("/api/stage/extend", "extend").ok();
    router.insert("/api/stage/purchase", "purchase").ok();
    router.insert("/api/stage/fight", "fight").ok();
    router.insert("/api/stage/fight/attack", "fight_attack").ok();
    router.insert("/api/stage/fight/wild", "fight_wild").ok();
    router.insert("/api/stage/fight/card", "fight_card").ok();
    router.insert("/api/stage/fight/options", "fight_options").ok();
    router.insert("/api/stage/preview", "preview").ok();
    router.insert("/api/stage/confirm", "confirm").ok();
    router.insert("/api/stage/cancel", "cancel").ok();

    use routes::{session, stage};
    match router.at(path) {
        Ok(matched) => match (*matched.value, method) {
            ("state", "GET") => session::handle_state_get(query),
            ("outbox", "GET") => session::handle_outbox_get(query),
            ("snapshot", "POST") => session::handle_snapshot_post(query, body),
            ("view", "POST") => session::handle_view_post(query, body),
            ("config", "POST") => session::handle_config_post(query, body),
            ("tick", "POST") => session::handle_tick_post(query, body),
            ("hover", "POST") => session::handle_hover_post(query, body),

            ("stance", "POST") => stage::handle_stance_post(query, body),
            ("extend", "POST") => stage::handle_extend_post(query, body),
            ("purchase", "POST") => stage::handle_purchase_post(query, body),
            ("fight", "POST") => stage::handle_fight_post(query, body),
            ("fight_attack", "POST") => stage::handle_attack_post(query, body),
            ("fight_wild", "POST") => stage::handle_wild_post(query, body),
            ("fight_card", "POST") => stage::handle_card_post(query, body),
            ("fight_options", "POST") => stage::handle_options_post(query, body),
            ("preview", "POST") => stage::handle_preview_post(query, body),
            ("confirm", "POST") => stage::handle_confirm_post(query, body),
            ("cancel", "POST") => stage::handle_cancel_post(query, body),

            _ => method_not_allowed(),
        },
        Err(_) => not_found(),
    }
}

fn not_found() -> String {
    routes::util::error_body("404: route not found")
}

fn method_not_allowed() -> String {
    routes::util::error_body("405: method not allowed")
}
