//! Outbound messages and change notification.
//!
//! The WASM side never calls the network itself. Anything that has to leave
//! the module (preview requests, submissions, stance steps, toasts, change
//! notifications) is queued on the [`Outbox`] and drained by the page bridge.
//!
//! [`Observable`] replaces module-level "setter" callbacks: the owner holds the
//! value, subscribers register closures, and a publish only fires when the
//! value actually changed.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::game::model::{ActionPayload, CardKind, FightRequest, Stance};
use crate::staging::allocation::PaymentPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Card currently under the pointer, shown in the hover overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoverTarget {
    pub card_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<CardKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Ask the server for a preview; the reply must echo `generation`.
    Preview {
        generation: u64,
        request: FightRequest,
    },
    /// Fire-and-forget turn action.
    Submit { action: ActionPayload },
    /// Free stance move.
    StanceStep { stance: Stance },
    /// User-visible toast.
    Notice { message: String, severity: Severity },
    PaymentChanged { plan: Option<PaymentPlan> },
    Hover { target: Option<HoverTarget> },
}

/// Shared FIFO of outbound messages. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Rc<RefCell<VecDeque<Outbound>>>,
}

impl Outbox {
    pub fn push(&self, msg: Outbound) {
        self.queue.borrow_mut().push_back(msg);
    }

    pub fn notice(&self, message: impl Into<String>, severity: Severity) {
        self.push(Outbound::Notice {
            message: message.into(),
            severity,
        });
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<Outbound> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Copy of the queue without consuming it.
    pub fn pending(&self) -> Vec<Outbound> {
        self.queue.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Box<dyn FnMut(&T)>;

/// A value with change-suppressed publish/subscribe.
pub struct Observable<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
}

impl<T: PartialEq> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Store `value` and notify subscribers. Returns false (and notifies no
    /// one) when it equals the current value.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&self.value);
        }
        true
    }

    pub fn subscribe(&mut self, f: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_clones_share_queue() {
        let a = Outbox::default();
        let b = a.clone();
        a.notice("hello", Severity::Info);
        assert_eq!(b.len(), 1);
        let drained = b.drain();
        assert!(a.is_empty());
        assert_eq!(
            drained[0],
            Outbound::Notice {
                message: "hello".to_string(),
                severity: Severity::Info
            }
        );
    }

    #[test]
    fn observable_suppresses_unchanged_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut obs = Observable::new(0u32);
        obs.subscribe(move |v| sink.borrow_mut().push(*v));

        assert!(obs.set(1));
        assert!(!obs.set(1));
        assert!(obs.set(2));
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let mut obs = Observable::new(None::<String>);
        let id = obs.subscribe(move |_| *c.borrow_mut() += 1);

        obs.set(Some("card".to_string()));
        assert!(obs.unsubscribe(id));
        assert!(!obs.unsubscribe(id));
        obs.set(None);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn outbound_serializes_with_type_tag() {
        let json = serde_json::to_string(&Outbound::StanceStep {
            stance: Stance::Balanced,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"stance_step","stance":"BALANCED"}"#);
    }
}
