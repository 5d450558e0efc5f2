//! Action staging coordinator: at most one staged turn action at a time.
//!
//! ```text
//!            open_*                    confirm (precondition ok)
//!   Idle ───────────────▶ Staged(X) ─────────────────────────▶ Idle  + Submit
//!     ▲                      │
//!     └──────────────────────┘ cancel (revert optimistic state)
//! ```
//!
//! Opening anything while a stance confirmation is pending first reverts the
//! stance. Opening a non-stance action while another non-stance action is
//! staged is rejected. Every rejection is a `StagingError`; nothing panics
//! and nothing reaches the outbox on a rejected call.

use log::{debug, info};
use serde::Serialize;

use crate::config::StagingConfig;
use crate::error::{StagingError, StagingResult};
use crate::game::ledger::LedgerView;
use crate::game::model::{
    ActionPayload, CardKind, Color, ColorMap, GameSnapshot, PreviewReply, Stance,
};
use crate::game::overrides::LocalOverrides;
use crate::staging::allocation::{FightStaging, PaymentPlan, TokenCaps};
use crate::staging::notify::{Outbound, Outbox, Severity};
use crate::staging::preview::{ApplyOutcome, PreviewReconciler};
use crate::staging::stance::{StanceController, StanceMove};

/// A locally-held, not yet submitted, turn action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StagedAction {
    StanceChange {
        target: Stance,
        requires_confirm: bool,
    },
    ExtendSlot {
        slot: CardKind,
    },
    Purchase {
        card_id: String,
        card_name: String,
        kind: CardKind,
    },
    Fight(FightStaging),
}

impl StagedAction {
    pub fn label(&self) -> &'static str {
        match self {
            StagedAction::StanceChange { .. } => "stance change",
            StagedAction::ExtendSlot { .. } => "slot extension",
            StagedAction::Purchase { .. } => "purchase",
            StagedAction::Fight(_) => "fight",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            StagedAction::StanceChange { .. } => Phase::StanceStaging,
            StagedAction::ExtendSlot { .. } => Phase::ExtendStaging,
            StagedAction::Purchase { .. } => Phase::PurchaseStaging,
            StagedAction::Fight(_) => Phase::FightStaging,
        }
    }

    /// Wire form sent on confirm.
    pub fn payload(&self) -> ActionPayload {
        match self {
            StagedAction::StanceChange { target, .. } => {
                ActionPayload::StanceChange { stance: *target }
            }
            StagedAction::ExtendSlot { slot } => ActionPayload::ExtendSlot { slot: *slot },
            StagedAction::Purchase { card_id, kind, .. } => ActionPayload::Purchase {
                card_id: card_id.clone(),
                kind: *kind,
            },
            StagedAction::Fight(fight) => ActionPayload::Fight(fight.request()),
        }
    }

    /// Text of the confirm/cancel prompt, if this kind shows one.
    pub fn prompt(&self) -> Option<String> {
        match self {
            StagedAction::StanceChange { target, .. } => {
                Some(format!("Change stance to {}?", target))
            }
            StagedAction::ExtendSlot { slot } => Some(format!("Extend your {} slots?", slot)),
            StagedAction::Purchase { card_name, card_id, .. } => {
                let name = if card_name.is_empty() { card_id } else { card_name };
                Some(format!("Buy {}?", name))
            }
            StagedAction::Fight(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    StanceStaging,
    ExtendStaging,
    PurchaseStaging,
    FightStaging,
}

/// Everything an operation needs from its surroundings.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub snapshot: &'a GameSnapshot,
    pub viewer: &'a str,
    pub config: &'a StagingConfig,
    pub now: u64,
    pub outbox: &'a Outbox,
}

/// Optional fight modifiers forwarded with every preview and submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FightOptions {
    pub boss_threshold: Option<String>,
    pub stance_choice: Option<Color>,
    pub precision_choice: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    staged: Option<StagedAction>,
    stance: StanceController,
    overrides: LocalOverrides,
    reconciler: PreviewReconciler,
    /// A submission went out and no snapshot has answered it yet.
    awaiting_authority: bool,
}

impl Coordinator {
    // ── Accessors ──────────────────────────────────────────────────

    pub fn staged(&self) -> Option<&StagedAction> {
        self.staged.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.staged.as_ref().map_or(Phase::Idle, StagedAction::phase)
    }

    pub fn fight(&self) -> Option<&FightStaging> {
        match &self.staged {
            Some(StagedAction::Fight(f)) => Some(f),
            _ => None,
        }
    }

    pub fn overrides(&self) -> &LocalOverrides {
        &self.overrides
    }

    pub fn stance(&self) -> &StanceController {
        &self.stance
    }

    pub fn reconciler(&self) -> &PreviewReconciler {
        &self.reconciler
    }

    pub fn awaiting_authority(&self) -> bool {
        self.awaiting_authority
    }

    /// Project the viewed player through the override layer.
    pub fn ledger(&self, ctx: &StageContext<'_>) -> StagingResult<LedgerView> {
        LedgerView::project(ctx.snapshot, ctx.viewer, &self.overrides).ok_or_else(|| {
            StagingError::UnknownPlayer {
                player_id: ctx.viewer.to_string(),
            }
        })
    }

    /// Cost currently in force: the preview's if one is held, else the threat's.
    pub fn adjusted_cost(&self) -> Option<ColorMap> {
        let fight = self.fight()?;
        Some(
            self.reconciler
                .preview()
                .map_or(fight.base_cost, |p| p.adjusted_cost),
        )
    }

    pub fn payment(&self, ledger: &LedgerView) -> Option<PaymentPlan> {
        self.adjusted_cost()
            .map(|cost| PaymentPlan::compute(cost, ledger.resources))
    }

    /// The staged action would pass `confirm` right now.
    pub fn can_confirm(
        &self,
        ledger: &LedgerView,
        snapshot: &GameSnapshot,
        config: &StagingConfig,
    ) -> bool {
        self.submit_blocker(ledger, snapshot, config).is_none()
    }

    /// First submit precondition the staged action fails, if any.
    pub fn submit_blocker(
        &self,
        ledger: &LedgerView,
        snapshot: &GameSnapshot,
        config: &StagingConfig,
    ) -> Option<StagingError> {
        let Some(staged) = &self.staged else {
            return Some(StagingError::NothingStaged);
        };
        if let Err(e) = require_turn(ledger) {
            return Some(e);
        }
        match staged {
            StagedAction::StanceChange { .. } => None,
            StagedAction::ExtendSlot { slot } => {
                (ledger.slots(*slot) >= config.max_slots).then(|| StagingError::SlotsMaxed {
                    kind: *slot,
                    max: config.max_slots,
                })
            }
            StagedAction::Purchase { card_id, kind, .. } => {
                if ledger.buy_used {
                    return Some(StagingError::BuyUsed);
                }
                let Some(card) = snapshot.market_card(card_id) else {
                    return Some(StagingError::UnknownCard {
                        card_id: card_id.clone(),
                    });
                };
                if !ledger.resources.covers(&card.cost) {
                    return Some(StagingError::InsufficientResources {
                        missing: PaymentPlan::compute(card.cost, ledger.resources).missing_cost,
                    });
                }
                if !ledger.has_free_slot(*kind) {
                    return Some(StagingError::SlotFull { kind: *kind });
                }
                None
            }
            StagedAction::Fight(_) => self.fight_blocker(ledger),
        }
    }

    fn fight_blocker(&self, ledger: &LedgerView) -> Option<StagingError> {
        if self.reconciler.error().is_some() {
            return Some(StagingError::NotConfirmable {
                reason: "the preview failed",
            });
        }
        if self.reconciler.is_pending() {
            return Some(StagingError::NotConfirmable {
                reason: "the preview is still updating",
            });
        }
        match self.payment(ledger) {
            Some(plan) if plan.fully_paid => None,
            Some(plan) => Some(StagingError::InsufficientResources {
                missing: plan.missing_cost,
            }),
            None => Some(StagingError::NoFightStaged),
        }
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Turn ended or the viewed player changed: drop everything local.
    pub fn close_session(&mut self) {
        if let Some(staged) = &self.staged {
            debug!("closing session with staged {}", staged.label());
        }
        self.staged = None;
        self.stance.close();
        self.overrides.clear();
        self.reconciler.reset();
        self.awaiting_authority = false;
    }

    /// React to a fresh authoritative snapshot within the same turn.
    pub fn on_snapshot(&mut self, ctx: &StageContext<'_>) {
        if self.awaiting_authority {
            self.overrides.clear();
            self.awaiting_authority = false;
            // A jump staged after the submission is still on screen.
            if let Some(StagedAction::StanceChange { target, .. }) = &self.staged {
                self.overrides.set_stance(*target);
            }
        } else if let Some(me) = ctx.snapshot.player(&ctx.snapshot.you) {
            self.overrides.reconcile(me);
        }

        let Ok(ledger) = self.ledger(ctx) else {
            self.close_session();
            return;
        };
        if !ledger.is_my_turn() || ledger.surrendered {
            if self.staged.is_some() || self.stance.is_open() {
                self.close_session();
            }
            return;
        }
        self.ensure_stance_open(ctx, &ledger);

        let vanished = match &mut self.staged {
            Some(StagedAction::Fight(fight)) => {
                match ctx.snapshot.threat(fight.row, &fight.threat_id) {
                    Some(threat) => {
                        fight.base_cost = threat.cost;
                        if fight.heal(&ledger) {
                            debug!("fight allocation clamped to new caps");
                        }
                        None
                    }
                    None => Some(fight.threat_name.clone()),
                }
            }
            Some(StagedAction::Purchase {
                card_id, card_name, ..
            }) if ctx.snapshot.market_card(card_id.as_str()).is_none() => {
                Some(card_name.clone())
            }
            _ => None,
        };

        if let Some(name) = vanished {
            self.staged = None;
            self.reconciler.reset();
            ctx.outbox.notice(
                format!("{} is no longer available", name),
                Severity::Warning,
            );
            return;
        }
        self.refresh_preview(ctx);
    }

    fn ensure_stance_open(&mut self, ctx: &StageContext<'_>, ledger: &LedgerView) {
        if !self.stance.is_open() {
            let baseline = ctx
                .snapshot
                .baseline_stance
                .unwrap_or(ledger.authoritative_stance);
            self.stance.open(baseline, ledger.stance);
            debug!("stance session opened at baseline {}", baseline);
        }
    }

    // ── Stance ─────────────────────────────────────────────────────

    pub fn request_stance(
        &mut self,
        target: Stance,
        ctx: &StageContext<'_>,
    ) -> StagingResult<StanceMove> {
        let ledger = self.ledger(ctx)?;
        require_turn(&ledger)?;
        match &self.staged {
            Some(StagedAction::StanceChange { .. }) | None => {}
            Some(other) => {
                return Err(StagingError::ActionInProgress {
                    staged: other.label(),
                });
            }
        }
        self.ensure_stance_open(ctx, &ledger);
        let baseline = self.stance.baseline().unwrap_or(ledger.authoritative_stance);
        if baseline.distance(target) > 1 && ledger.action_used {
            return Err(StagingError::ActionUsed);
        }

        self.displace_stance(ctx);
        let current = self.overrides.stance().unwrap_or(ledger.authoritative_stance);
        let mv = self.stance.request(target, current, &mut self.overrides);
        match mv {
            StanceMove::Unchanged => {}
            StanceMove::Free => {
                debug!("free stance step to {}", target);
                ctx.outbox.push(Outbound::StanceStep { stance: target });
            }
            StanceMove::NeedsConfirm => {
                debug!("stance jump to {} awaiting confirmation", target);
                self.staged = Some(StagedAction::StanceChange {
                    target,
                    requires_confirm: true,
                });
            }
        }
        Ok(mv)
    }

    /// Revert a pending stance confirmation, if any.
    fn displace_stance(&mut self, ctx: &StageContext<'_>) {
        if let Some(StagedAction::StanceChange { target, .. }) = &self.staged {
            debug!("reverting unconfirmed stance {}", target);
            self.staged = None;
            self.stance.revert(&mut self.overrides);
            self.reconcile_overrides(ctx);
        }
    }

    fn reconcile_overrides(&mut self, ctx: &StageContext<'_>) {
        if let Some(me) = ctx.snapshot.player(&ctx.snapshot.you) {
            self.overrides.reconcile(me);
        }
    }

    // ── Opening non-stance actions ─────────────────────────────────

    /// Common gate: own turn, nothing but a stance pending.
    fn guard_open(&self, ctx: &StageContext<'_>) -> StagingResult<LedgerView> {
        let ledger = self.ledger(ctx)?;
        require_turn(&ledger)?;
        match &self.staged {
            None | Some(StagedAction::StanceChange { .. }) => Ok(ledger),
            Some(other) => Err(StagingError::ActionInProgress {
                staged: other.label(),
            }),
        }
    }

    pub fn open_extend(&mut self, slot: CardKind, ctx: &StageContext<'_>) -> StagingResult<()> {
        let ledger = self.guard_open(ctx)?;
        if ledger.action_used {
            return Err(StagingError::ActionUsed);
        }
        self.displace_stance(ctx);
        self.staged = Some(StagedAction::ExtendSlot { slot });
        debug!("staged {} slot extension", slot);
        Ok(())
    }

    pub fn open_purchase(&mut self, card_id: &str, ctx: &StageContext<'_>) -> StagingResult<()> {
        let ledger = self.guard_open(ctx)?;
        if ledger.buy_used {
            return Err(StagingError::BuyUsed);
        }
        let card = ctx
            .snapshot
            .market_card(card_id)
            .ok_or_else(|| StagingError::UnknownCard {
                card_id: card_id.to_string(),
            })?;
        let staged = StagedAction::Purchase {
            card_id: card.id.clone(),
            card_name: card.name.clone(),
            kind: card.kind,
        };
        self.displace_stance(ctx);
        self.staged = Some(staged);
        debug!("staged purchase of {}", card_id);
        Ok(())
    }

    pub fn open_fight(
        &mut self,
        row: usize,
        threat_id: &str,
        ctx: &StageContext<'_>,
    ) -> StagingResult<()> {
        let ledger = self.guard_open(ctx)?;
        if ledger.action_used {
            return Err(StagingError::ActionUsed);
        }
        let threat =
            ctx.snapshot
                .threat(row, threat_id)
                .ok_or_else(|| StagingError::UnknownThreat {
                    threat_id: threat_id.to_string(),
                    row,
                })?;
        let fight = FightStaging::new(threat, row);
        self.displace_stance(ctx);
        self.reconciler.reset();
        self.staged = Some(StagedAction::Fight(fight));
        debug!("staged fight against {} in row {}", threat_id, row);
        self.refresh_preview(ctx);
        Ok(())
    }

    // ── Fight allocation ───────────────────────────────────────────

    fn fight_mut(&mut self) -> StagingResult<&mut FightStaging> {
        match &mut self.staged {
            Some(StagedAction::Fight(f)) => Ok(f),
            _ => Err(StagingError::NoFightStaged),
        }
    }

    pub fn set_attack_used(&mut self, n: u32, ctx: &StageContext<'_>) -> StagingResult<u32> {
        let caps = TokenCaps::from(&self.ledger(ctx)?);
        let stored = self.fight_mut()?.set_attack_used(n, caps);
        self.refresh_preview(ctx);
        Ok(stored)
    }

    pub fn add_wild(&mut self, color: Color, ctx: &StageContext<'_>) -> StagingResult<bool> {
        let caps = TokenCaps::from(&self.ledger(ctx)?);
        let added = self.fight_mut()?.add_wild(color, caps);
        self.refresh_preview(ctx);
        Ok(added)
    }

    pub fn remove_wild(&mut self, color: Color, ctx: &StageContext<'_>) -> StagingResult<bool> {
        let removed = self.fight_mut()?.remove_wild(color);
        self.refresh_preview(ctx);
        Ok(removed)
    }

    pub fn move_wild(
        &mut self,
        from: Color,
        to: Color,
        ctx: &StageContext<'_>,
    ) -> StagingResult<bool> {
        let caps = TokenCaps::from(&self.ledger(ctx)?);
        let moved = self.fight_mut()?.move_wild(from, to, caps);
        self.refresh_preview(ctx);
        Ok(moved)
    }

    pub fn toggle_card(
        &mut self,
        id: &str,
        kind: CardKind,
        ctx: &StageContext<'_>,
    ) -> StagingResult<bool> {
        let ledger = self.ledger(ctx)?;
        let fight = self.fight_mut()?;
        // Un-playing a card the player no longer owns is always allowed.
        if !ledger.owns(kind, id) && !fight.is_played(id, kind) {
            return Err(StagingError::UnknownCard {
                card_id: id.to_string(),
            });
        }
        let played = fight.toggle_card(id, kind);
        self.refresh_preview(ctx);
        Ok(played)
    }

    pub fn set_options(&mut self, options: FightOptions, ctx: &StageContext<'_>) -> StagingResult<()> {
        let fight = self.fight_mut()?;
        fight.boss_threshold = options.boss_threshold;
        fight.stance_choice = options.stance_choice;
        fight.precision_choice = options.precision_choice;
        self.refresh_preview(ctx);
        Ok(())
    }

    // ── Preview ────────────────────────────────────────────────────

    /// Note the current fight request and issue it if the debounce allows.
    fn refresh_preview(&mut self, ctx: &StageContext<'_>) {
        if let Some(StagedAction::Fight(fight)) = &self.staged {
            let request = fight.request();
            self.reconciler.note(&request, ctx.now);
        }
        self.poll_preview(ctx);
    }

    /// Issue a due preview request onto the outbox.
    pub fn poll_preview(&mut self, ctx: &StageContext<'_>) {
        let Some(StagedAction::Fight(fight)) = &self.staged else {
            return;
        };
        let request = fight.request();
        if let Some(ticket) =
            self.reconciler
                .poll(&request, ctx.now, ctx.config.preview_debounce_ms)
        {
            ctx.outbox.push(Outbound::Preview {
                generation: ticket.generation,
                request: ticket.request,
            });
        }
    }

    pub fn apply_preview(&mut self, generation: u64, reply: PreviewReply) -> ApplyOutcome {
        if self.fight().is_none() {
            return ApplyOutcome::Stale;
        }
        self.reconciler.apply(generation, reply)
    }

    // ── Confirm / cancel ───────────────────────────────────────────

    /// Validate the staged action's precondition and hand it to the outbox.
    pub fn confirm(&mut self, ctx: &StageContext<'_>) -> StagingResult<ActionPayload> {
        let ledger = self.ledger(ctx)?;
        if let Some(blocker) = self.submit_blocker(&ledger, ctx.snapshot, ctx.config) {
            return Err(blocker);
        }
        let action = self
            .staged
            .as_ref()
            .map(StagedAction::payload)
            .ok_or(StagingError::NothingStaged)?;

        if let Some(StagedAction::StanceChange { target, .. }) = &self.staged {
            self.stance.commit(*target);
        }
        self.staged = None;
        self.reconciler.reset();
        self.awaiting_authority = true;
        info!("submitting {:?}", action);
        ctx.outbox.push(Outbound::Submit {
            action: action.clone(),
        });
        Ok(action)
    }

    /// Drop the staged action and roll back whatever it changed locally.
    pub fn cancel(&mut self, ctx: &StageContext<'_>) -> StagingResult<()> {
        let staged = self.staged.take().ok_or(StagingError::NothingStaged)?;
        match staged {
            StagedAction::StanceChange { .. } => {
                self.stance.revert(&mut self.overrides);
                self.reconcile_overrides(ctx);
            }
            StagedAction::Fight(_) => self.reconciler.reset(),
            StagedAction::ExtendSlot { .. } | StagedAction::Purchase { .. } => {}
        }
        debug!("cancelled staged {}", staged.label());
        Ok(())
    }
}

fn require_turn(ledger: &LedgerView) -> StagingResult<()> {
    if !ledger.is_self {
        return Err(StagingError::NotViewingSelf);
    }
    if ledger.surrendered {
        return Err(StagingError::Surrendered);
    }
    if !ledger.is_their_turn {
        return Err(StagingError::NotYourTurn);
    }
    Ok(())
}
