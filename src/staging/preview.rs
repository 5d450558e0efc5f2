//! Preview reconciliation.
//!
//! Each staged-fight change is keyed by its serialized request. A change
//! arms a debounce window; once the window elapses a request is issued under
//! a fresh generation number. Replies are applied only if their generation
//! is still the one in flight, so a slow reply for an older allocation can
//! never overwrite a newer one. Resetting drops in-flight tracking without
//! rewinding the counter, which makes every outstanding reply stale.

use log::{debug, warn};
use serde::Serialize;

use crate::game::model::{FightRequest, Preview, PreviewReply};

/// An issued request, to be handed to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTicket {
    pub generation: u64,
    pub request: FightRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Failed,
    Stale,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PreviewReconciler {
    /// Last generation issued. Never rewinds.
    generation: u64,
    /// Generation currently awaiting a reply.
    awaiting: Option<u64>,
    /// Serialized form of the last request noted.
    #[serde(skip)]
    last_key: Option<String>,
    /// Logical time of the pending, not yet issued, change.
    dirty_since: Option<u64>,
    preview: Option<Preview>,
    error: Option<String>,
}

impl PreviewReconciler {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// A change is waiting out its debounce or a reply is outstanding.
    pub fn is_pending(&self) -> bool {
        self.dirty_since.is_some() || self.awaiting.is_some()
    }

    /// Record the current staged request. Returns false when it serializes
    /// identically to the last one noted.
    pub fn note(&mut self, request: &FightRequest, now: u64) -> bool {
        let key = serde_json::to_string(request).unwrap_or_default();
        if self.last_key.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.last_key = Some(key);
        self.dirty_since = Some(now);
        true
    }

    /// Issue a request if a noted change has sat for at least `debounce_ms`.
    pub fn poll(
        &mut self,
        request: &FightRequest,
        now: u64,
        debounce_ms: u64,
    ) -> Option<PreviewTicket> {
        let since = self.dirty_since?;
        if now.saturating_sub(since) < debounce_ms {
            return None;
        }
        self.dirty_since = None;
        self.generation += 1;
        self.awaiting = Some(self.generation);
        debug!("preview generation {} issued", self.generation);
        Some(PreviewTicket {
            generation: self.generation,
            request: request.clone(),
        })
    }

    /// Apply a reply tagged with `generation`.
    pub fn apply(&mut self, generation: u64, reply: PreviewReply) -> ApplyOutcome {
        if self.awaiting != Some(generation) {
            warn!(
                "dropping stale preview generation {} (current {})",
                generation, self.generation
            );
            return ApplyOutcome::Stale;
        }
        self.awaiting = None;
        match reply {
            PreviewReply::Success(preview) => {
                self.preview = Some(preview);
                self.error = None;
                ApplyOutcome::Applied
            }
            PreviewReply::Failure { error } => {
                self.preview = None;
                self.error = Some(error);
                ApplyOutcome::Failed
            }
        }
    }

    /// Forget everything about the current fight. Outstanding replies become stale.
    pub fn reset(&mut self) {
        self.awaiting = None;
        self.last_key = None;
        self.dirty_since = None;
        self.preview = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::model::{ColorMap, TokenUse};
    use proptest::prelude::*;

    fn request(attack: u32) -> FightRequest {
        FightRequest {
            row: 0,
            threat_id: "t1".to_string(),
            use_tokens: TokenUse {
                attack,
                wild_allocation: ColorMap::default(),
            },
            played_upgrades: Vec::new(),
            played_weapons: Vec::new(),
            boss_threshold: None,
            stance_choice: None,
            precision_choice: None,
        }
    }

    fn success(r: u32) -> PreviewReply {
        PreviewReply::Success(Preview {
            adjusted_cost: ColorMap::new(r, 0, 0),
            applied_effects: Vec::new(),
            message: None,
        })
    }

    #[test]
    fn identical_request_is_not_renoted() {
        let mut rec = PreviewReconciler::default();
        assert!(rec.note(&request(1), 0));
        assert!(!rec.note(&request(1), 5));
        assert!(rec.note(&request(2), 5));
    }

    #[test]
    fn debounce_window_delays_issue() {
        let mut rec = PreviewReconciler::default();
        rec.note(&request(1), 100);
        assert!(rec.poll(&request(1), 200, 150).is_none());
        assert!(rec.is_pending());
        let ticket = rec.poll(&request(1), 250, 150).unwrap();
        assert_eq!(ticket.generation, 1);
        assert!(rec.poll(&request(1), 999, 150).is_none());
    }

    #[test]
    fn success_then_failure() {
        let mut rec = PreviewReconciler::default();
        rec.note(&request(1), 0);
        let t = rec.poll(&request(1), 0, 0).unwrap();
        assert_eq!(rec.apply(t.generation, success(2)), ApplyOutcome::Applied);
        assert_eq!(rec.preview().unwrap().adjusted_cost.r, 2);
        assert!(!rec.is_pending());

        rec.note(&request(2), 1);
        let t = rec.poll(&request(2), 1, 0).unwrap();
        let outcome = rec.apply(
            t.generation,
            PreviewReply::Failure {
                error: "nope".to_string(),
            },
        );
        assert_eq!(outcome, ApplyOutcome::Failed);
        assert!(rec.preview().is_none());
        assert_eq!(rec.error(), Some("nope"));
    }

    #[test]
    fn older_generation_is_discarded() {
        let mut rec = PreviewReconciler::default();
        rec.note(&request(1), 0);
        let g1 = rec.poll(&request(1), 0, 0).unwrap();
        rec.note(&request(2), 0);
        let g2 = rec.poll(&request(2), 0, 0).unwrap();

        assert_eq!(rec.apply(g1.generation, success(9)), ApplyOutcome::Stale);
        assert!(rec.preview().is_none());
        assert_eq!(rec.apply(g2.generation, success(1)), ApplyOutcome::Applied);
        assert_eq!(rec.preview().unwrap().adjusted_cost.r, 1);
    }

    #[test]
    fn reset_makes_outstanding_reply_stale() {
        let mut rec = PreviewReconciler::default();
        rec.note(&request(1), 0);
        let t = rec.poll(&request(1), 0, 0).unwrap();
        rec.reset();
        assert_eq!(rec.apply(t.generation, success(1)), ApplyOutcome::Stale);
        assert_eq!(rec.generation(), 1);
        // The same allocation is noted again after a reset.
        assert!(rec.note(&request(1), 0));
    }

    proptest! {
        #[test]
        fn prop_only_latest_generation_applies(issued in 2u64..12, late in 0u64..10) {
            let mut rec = PreviewReconciler::default();
            let mut tickets = Vec::new();
            for i in 0..issued {
                rec.note(&request(i as u32), i);
                tickets.push(rec.poll(&request(i as u32), i, 0).unwrap());
            }
            let stale = tickets[(late % (issued - 1)) as usize].generation;
            prop_assert_eq!(rec.apply(stale, success(7)), ApplyOutcome::Stale);
            prop_assert!(rec.preview().is_none());
            let last = tickets.last().unwrap().generation;
            prop_assert_eq!(rec.apply(last, success(1)), ApplyOutcome::Applied);
        }
    }
}
