//! Global staging session.
//!
//! Uses `thread_local!` + `RefCell` for safe mutable access in single-threaded
//! WASM. The Web Worker keeps the module alive, so the session persists across
//! `handle_request` calls for as long as the game view is open.
//!
//! The session is the only place a `Result` from the staging layer is turned
//! into something user-visible: every `Err` becomes a toast on the outbox.

use log::{debug, warn};
use serde::Serialize;
use std::cell::RefCell;

use crate::config::StagingConfig;
use crate::error::{StagingError, StagingResult};
use crate::game::ledger::LedgerView;
use crate::game::model::{GameSnapshot, Preview, PreviewReply, Stance};
use crate::game::overrides::LocalOverrides;
use crate::staging::allocation::{FightStaging, PaymentPlan};
use crate::staging::coordinator::{Coordinator, Phase, StageContext, StagedAction};
use crate::staging::notify::{HoverTarget, Observable, Outbound, Outbox};
use crate::staging::preview::ApplyOutcome;

/// Everything the page needs to draw the staging UI.
#[derive(Debug, Clone, Serialize)]
pub struct StagingView {
    pub phase: Phase,
    pub staged: Option<StagedAction>,
    pub prompt: Option<String>,
    pub ledger: Option<LedgerView>,
    pub baseline_stance: Option<Stance>,
    pub overrides: LocalOverrides,
    pub fight: Option<FightStaging>,
    pub preview: Option<Preview>,
    pub preview_error: Option<String>,
    pub preview_pending: bool,
    pub payment: Option<PaymentPlan>,
    pub can_confirm: bool,
    pub hover: Option<HoverTarget>,
}

#[derive(Debug)]
pub struct Session {
    config: StagingConfig,
    snapshot: Option<GameSnapshot>,
    /// Player whose board is on screen; defaults to the local player.
    viewed: Option<String>,
    coordinator: Coordinator,
    outbox: Outbox,
    payment: Observable<Option<PaymentPlan>>,
    hover: Observable<Option<HoverTarget>>,
    /// Logical clock in ms, supplied by the host. Never moves backwards.
    now: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(StagingConfig::default())
    }
}

impl Session {
    pub fn new(config: StagingConfig) -> Self {
        let outbox = Outbox::default();

        let mut payment = Observable::new(None);
        let sink = outbox.clone();
        payment.subscribe(move |plan: &Option<PaymentPlan>| {
            sink.push(Outbound::PaymentChanged { plan: *plan });
        });

        let mut hover = Observable::new(None);
        let sink = outbox.clone();
        hover.subscribe(move |target: &Option<HoverTarget>| {
            sink.push(Outbound::Hover {
                target: target.clone(),
            });
        });

        Self {
            config,
            snapshot: None,
            viewed: None,
            coordinator: Coordinator::default(),
            outbox,
            payment,
            hover,
            now: 0,
        }
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn set_config(&mut self, config: StagingConfig) {
        debug!("staging config replaced: {:?}", config);
        self.config = config;
    }

    pub fn advance_clock(&mut self, now: Option<u64>) {
        if let Some(now) = now {
            self.now = self.now.max(now);
        }
    }

    /// Turn a rejection into a toast.
    pub fn report(&self, err: &StagingError) {
        warn!("rejected: {}", err);
        self.outbox.notice(err.to_string(), err.severity());
    }

    /// Run `op` against the coordinator with a freshly built context.
    fn run<T>(
        &mut self,
        op: impl FnOnce(&mut Coordinator, &StageContext<'_>) -> StagingResult<T>,
    ) -> StagingResult<T> {
        let snapshot = self.snapshot.as_ref().ok_or(StagingError::NoSnapshot)?;
        let viewer = self.viewed.as_deref().unwrap_or(snapshot.you.as_str());
        let ctx = StageContext {
            snapshot,
            viewer,
            config: &self.config,
            now: self.now,
            outbox: &self.outbox,
        };
        op(&mut self.coordinator, &ctx)
    }

    /// Run a staging operation; rejections are reported, never propagated.
    pub fn stage<T>(
        &mut self,
        op: impl FnOnce(&mut Coordinator, &StageContext<'_>) -> StagingResult<T>,
    ) -> Option<T> {
        let result = self.run(op);
        self.refresh_payment();
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    fn ledger(&self) -> Option<LedgerView> {
        let snapshot = self.snapshot.as_ref()?;
        let viewer = self.viewed.as_deref().unwrap_or(snapshot.you.as_str());
        LedgerView::project(snapshot, viewer, self.coordinator.overrides())
    }

    /// Republish the payment plan; subscribers only hear about real changes.
    fn refresh_payment(&mut self) {
        let plan = self
            .ledger()
            .and_then(|ledger| self.coordinator.payment(&ledger));
        self.payment.set(plan);
    }

    // ── Authoritative state ────────────────────────────────────────

    pub fn push_snapshot(&mut self, snapshot: GameSnapshot) {
        if let Some(prev) = &self.snapshot {
            if prev.game_id != snapshot.game_id {
                self.viewed = None;
            }
            if prev.is_new_turn(&snapshot) {
                debug!("turn {} began; closing staging session", snapshot.turn);
                self.coordinator.close_session();
            }
        }
        if let Some(viewed) = self.viewed.take() {
            if snapshot.player(&viewed).is_some() {
                self.viewed = Some(viewed);
            } else {
                // The viewed board is gone; fall back to our own.
                self.coordinator.close_session();
                self.report(&StagingError::UnknownPlayer { player_id: viewed });
            }
        }
        self.snapshot = Some(snapshot);
        if let Err(e) = self.run(|c, ctx| {
            c.on_snapshot(ctx);
            Ok(())
        }) {
            self.report(&e);
        }
        self.refresh_payment();
    }

    pub fn push_snapshot_json(&mut self, json: &str) -> StagingResult<()> {
        let snapshot: GameSnapshot = serde_json::from_str(json)
            .map_err(|e| StagingError::invalid(format!("snapshot JSON: {}", e)))?;
        self.push_snapshot(snapshot);
        Ok(())
    }

    /// Switch the board on screen. Changing players closes the staging session.
    pub fn set_viewed(&mut self, player_id: &str) -> StagingResult<()> {
        let snapshot = self.snapshot.as_ref().ok_or(StagingError::NoSnapshot)?;
        if snapshot.player(player_id).is_none() {
            return Err(StagingError::UnknownPlayer {
                player_id: player_id.to_string(),
            });
        }
        let current = self.viewed.as_deref().unwrap_or(snapshot.you.as_str());
        if current != player_id {
            debug!("viewing {}; closing staging session", player_id);
            self.coordinator.close_session();
            self.viewed = Some(player_id.to_string());
            self.run(|c, ctx| {
                c.on_snapshot(ctx);
                Ok(())
            })?;
        }
        self.refresh_payment();
        Ok(())
    }

    // ── Preview plumbing ───────────────────────────────────────────

    /// Advance the clock and issue any preview whose debounce has elapsed.
    pub fn tick(&mut self, now: Option<u64>) {
        self.advance_clock(now);
        if self.snapshot.is_some() {
            self.stage(|c, ctx| {
                c.poll_preview(ctx);
                Ok(())
            });
        }
    }

    pub fn apply_preview(&mut self, generation: u64, reply: PreviewReply) -> ApplyOutcome {
        let outcome = self.coordinator.apply_preview(generation, reply);
        self.refresh_payment();
        outcome
    }

    pub fn set_hover(&mut self, target: Option<HoverTarget>) {
        self.hover.set(target);
    }

    pub fn drain_outbox(&self) -> Vec<Outbound> {
        self.outbox.drain()
    }

    pub fn view(&self) -> StagingView {
        let ledger = self.ledger();
        let c = &self.coordinator;
        let can_confirm = match (&ledger, &self.snapshot) {
            (Some(l), Some(snapshot)) => c.can_confirm(l, snapshot, &self.config),
            _ => false,
        };
        StagingView {
            phase: c.phase(),
            staged: c.staged().cloned(),
            prompt: c.staged().and_then(StagedAction::prompt),
            payment: ledger.as_ref().and_then(|l| c.payment(l)),
            ledger,
            baseline_stance: c.stance().baseline(),
            overrides: c.overrides().clone(),
            fight: c.fight().cloned(),
            preview: c.reconciler().preview().cloned(),
            preview_error: c.reconciler().error().map(str::to_string),
            preview_pending: c.reconciler().is_pending(),
            can_confirm,
            hover: self.hover.get().clone(),
        }
    }
}

thread_local! {
    static SESSION: RefCell<Session> = RefCell::new(Session::default());
}

/// Execute a closure with read access to the session.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&Session) -> R,
{
    SESSION.with(|s| f(&s.borrow()))
}

/// Execute a closure with mutable access to the session.
pub fn with_session_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut Session) -> R,
{
    SESSION.with(|s| f(&mut s.borrow_mut()))
}

/// Drop all session state (new game view, or between tests).
pub fn reset_session() {
    SESSION.with(|s| {
        *s.borrow_mut() = Session::default();
    });
}

/// Current view as JSON.
pub fn export_view_json() -> String {
    with_session(|s| serde_json::to_string(&s.view()).unwrap_or_else(|_| "{}".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ledger::fixtures;
    use crate::game::model::{CardKind, Color, ColorMap};
    use crate::staging::notify::Severity;

    fn session() -> Session {
        let mut s = Session::new(StagingConfig::default().with_debounce(100));
        s.push_snapshot(fixtures::snapshot());
        s.drain_outbox();
        s
    }

    fn previews(out: &[Outbound]) -> Vec<u64> {
        out.iter()
            .filter_map(|m| match m {
                Outbound::Preview { generation, .. } => Some(*generation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejection_becomes_notice() {
        let mut s = session();
        assert!(s.stage(|c, ctx| c.cancel(ctx)).is_none());
        assert_eq!(
            s.drain_outbox(),
            vec![Outbound::Notice {
                message: "Nothing is staged".to_string(),
                severity: Severity::Info
            }]
        );
    }

    #[test]
    fn no_snapshot_is_reported() {
        let mut s = Session::default();
        assert!(s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).is_none());
        let out = s.drain_outbox();
        assert!(matches!(&out[0], Outbound::Notice { severity: Severity::Error, .. }));
    }

    #[test]
    fn debounced_preview_issues_on_tick() {
        let mut s = session();
        s.advance_clock(Some(1_000));
        s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).unwrap();
        assert!(previews(&s.outbox().pending()).is_empty());

        s.tick(Some(1_050));
        assert!(previews(&s.outbox().pending()).is_empty());
        s.tick(Some(1_100));
        assert_eq!(previews(&s.drain_outbox()), vec![1]);
        assert!(s.view().preview_pending);
    }

    #[test]
    fn rapid_changes_collapse_into_one_request() {
        let mut s = session();
        s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).unwrap();
        s.stage(|c, ctx| c.add_wild(Color::R, ctx)).unwrap();
        s.advance_clock(Some(40));
        s.stage(|c, ctx| c.add_wild(Color::G, ctx)).unwrap();
        s.tick(Some(139));
        assert!(previews(&s.outbox().pending()).is_empty());
        s.tick(Some(140));
        let out = s.drain_outbox();
        assert_eq!(previews(&out), vec![1]);
        match out.iter().find(|m| matches!(m, Outbound::Preview { .. })) {
            Some(Outbound::Preview { request, .. }) => {
                assert_eq!(request.use_tokens.wild_allocation, ColorMap::new(1, 0, 1));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn payment_changes_are_published_once() {
        let mut s = session();
        s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).unwrap();
        let changes = s
            .drain_outbox()
            .into_iter()
            .filter(|m| matches!(m, Outbound::PaymentChanged { .. }))
            .count();
        assert_eq!(changes, 1);

        // Allocation changes alone do not move the base-cost plan.
        s.stage(|c, ctx| c.set_attack_used(1, ctx)).unwrap();
        assert!(
            !s.drain_outbox()
                .iter()
                .any(|m| matches!(m, Outbound::PaymentChanged { .. }))
        );
    }

    #[test]
    fn new_turn_closes_staging() {
        let mut s = session();
        s.stage(|c, ctx| c.request_stance(Stance::Hunkered, ctx)).unwrap();
        assert_eq!(s.view().phase, Phase::StanceStaging);

        let mut next = fixtures::snapshot();
        next.turn = 2;
        s.push_snapshot(next);
        let v = s.view();
        assert_eq!(v.phase, Phase::Idle);
        assert_eq!(v.ledger.unwrap().stance, Stance::Aggressive);
        assert!(v.overrides.is_empty());
    }

    #[test]
    fn switching_view_closes_staging_and_blocks_actions() {
        let mut s = session();
        s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).unwrap();
        s.set_viewed("rival").unwrap();
        assert_eq!(s.view().phase, Phase::Idle);

        assert!(s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).is_none());
        assert!(s.drain_outbox().iter().any(|m| matches!(
            m,
            Outbound::Notice { message, .. } if message == "You can only stage actions on your own board"
        )));

        s.set_viewed("me").unwrap();
        assert!(s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).is_some());
    }

    #[test]
    fn vanished_viewed_player_falls_back_to_self() {
        let mut s = session();
        s.set_viewed("rival").unwrap();
        let mut next = fixtures::snapshot();
        next.players.retain(|p| p.id != "rival");
        s.push_snapshot(next);

        assert!(s.drain_outbox().contains(&Outbound::Notice {
            message: "Unknown player rival".to_string(),
            severity: Severity::Error
        }));
        let v = s.view();
        assert_eq!(v.ledger.unwrap().player_id, "me");
        assert!(s.stage(|c, ctx| c.open_fight(0, "t1", ctx)).is_some());
    }

    #[test]
    fn can_confirm_reflects_submit_preconditions() {
        let mut s = session();
        assert!(!s.view().can_confirm);

        // Upgrade slots are at 2; a cap of 2 blocks the extension.
        s.set_config(StagingConfig {
            max_slots: 2,
            ..StagingConfig::default()
        });
        s.stage(|c, ctx| c.open_extend(CardKind::Upgrade, ctx)).unwrap();
        assert!(!s.view().can_confirm);
        s.set_config(StagingConfig::default());
        assert!(s.view().can_confirm);
        s.stage(|c, ctx| c.cancel(ctx)).unwrap();

        // Cannon costs G1 and the weapon slot is taken.
        s.stage(|c, ctx| c.open_purchase("m2", ctx)).unwrap();
        assert!(!s.view().can_confirm);
        s.stage(|c, ctx| c.cancel(ctx)).unwrap();

        s.stage(|c, ctx| c.open_purchase("m1", ctx)).unwrap();
        assert!(s.view().can_confirm);
    }

    #[test]
    fn staged_purchase_serializes_with_action_tag_and_kind() {
        let mut s = session();
        s.stage(|c, ctx| c.open_purchase("m1", ctx)).unwrap();
        let json = serde_json::to_string(&s.view()).unwrap();
        assert!(json.contains("\"action\":\"purchase\""));
        assert!(json.contains("\"kind\":\"upgrade\""));
        assert!(json.contains("\"card_id\":\"m1\""));
    }

    #[test]
    fn unknown_viewed_player_is_rejected() {
        let mut s = session();
        assert_eq!(
            s.set_viewed("ghost"),
            Err(StagingError::UnknownPlayer {
                player_id: "ghost".to_string()
            })
        );
    }

    #[test]
    fn hover_is_published_through_outbox() {
        let mut s = session();
        let target = HoverTarget {
            card_id: "w1".to_string(),
            kind: None,
        };
        s.set_hover(Some(target.clone()));
        s.set_hover(Some(target.clone()));
        assert_eq!(
            s.drain_outbox(),
            vec![Outbound::Hover {
                target: Some(target)
            }]
        );
        assert!(s.view().hover.is_some());
    }

    #[test]
    fn thread_local_session_reset() {
        reset_session();
        with_session_mut(|s| s.push_snapshot(fixtures::snapshot()));
        assert!(with_session(|s| s.snapshot().is_some()));
        assert!(export_view_json().contains("\"phase\":\"idle\""));
        reset_session();
        assert!(with_session(|s| s.snapshot().is_none()));
    }
}
