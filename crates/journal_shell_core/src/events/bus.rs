//! In-process event bus.
//!
//! # Invariants
//! - Delivery is synchronous, on the publishing thread, in subscription order.
//! - Handlers see only events of the topic and kind they subscribed to.
//! - Handlers may publish or subscribe re-entrantly; a subscription added
//!   during a publish does not receive that event.

use super::{EventKind, ShellEvent, Topic};
use log::trace;
use std::cell::RefCell;
use std::rc::Rc;

/// Identifier returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<dyn FnMut(&ShellEvent)>>;

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Cloneable handle; clones share one subscription table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind` published on `topic`.
    pub fn subscribe(
        &self,
        topic: Topic,
        kind: EventKind,
        handler: impl FnMut(&ShellEvent) + 'static,
    ) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscriptions.push(Subscription {
            id,
            topic,
            kind,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    /// Returns true when the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|subscription| subscription.id != id);
        inner.subscriptions.len() != before
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.topic == topic)
            .count()
    }

    /// Delivers `event` to matching subscribers; returns how many received it.
    pub fn publish(&self, topic: Topic, event: &ShellEvent) -> usize {
        let kind = event.kind();
        let targets: Vec<Handler> = self
            .inner
            .borrow()
            .subscriptions
            .iter()
            .filter(|subscription| subscription.topic == topic && subscription.kind == kind)
            .map(|subscription| Rc::clone(&subscription.handler))
            .collect();

        let mut delivered = 0;
        for handler in targets {
            // Skip handlers already running further up the stack.
            if let Ok(mut handler) = handler.try_borrow_mut() {
                (&mut *handler)(event);
                delivered += 1;
            }
        }
        trace!("event=bus_publish module=events topic={topic:?} kind={kind:?} delivered={delivered}");
        delivered
    }
}
