//! Change notification: per-key subscriptions and the propagation walk
//! that signals them.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use tokio::sync::oneshot;

use crate::key::KeyNode;

bitflags! {
    /// Kinds of change a subscription can filter on (spec §4.6).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ChangeFilter: u32 {
        /// Child added, removed or renamed.
        const NAME = 1 << 0;
        /// A value on the key changed.
        const LAST_SET = 1 << 1;
        /// Attributes changed. Forwarded, never generated by the engine itself.
        const ATTRIBUTES = 1 << 2;
        /// Security descriptor changed. Forwarded, never generated by the engine itself.
        const SECURITY = 1 << 3;
        /// Thread-agnostic notification delivery. Forwarded, never generated by the engine itself.
        const THREAD_AGNOSTIC = 1 << 4;
    }
}

/// Identity of a subscription: which client connection and which local
/// handle within it. A notification belongs to at most one per
/// (process, handle) pair (spec §3 Notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    pub process: u64,
    pub handle: u64,
}

/// A single armed (or already-fired) subscription.
pub struct Notification {
    pub subscriber: SubscriberId,
    pub filter: ChangeFilter,
    pub subtree: bool,
    event: Option<oneshot::Sender<()>>,
}

impl Notification {
    pub fn new(subscriber: SubscriberId, filter: ChangeFilter, subtree: bool, event: oneshot::Sender<()>) -> Self {
        Self { subscriber, filter, subtree, event: Some(event) }
    }

    /// Arms (or re-arms, after replacing the event) a subscription.
    pub fn rearm(&mut self, event: oneshot::Sender<()>) {
        self.event = Some(event);
    }

    fn fire(&mut self) {
        if let Some(event) = self.event.take() {
            let _ = event.send(());
        }
    }

    pub fn is_armed(&self) -> bool {
        self.event.is_some()
    }
}

/// Arms or replaces the subscription for `subscriber` on `key`.
///
/// Replacing an existing subscription (same process+handle) swaps the
/// event under the existing record rather than duplicating it (spec §4.6).
pub fn arm(
    key: &crate::key::KeyRef,
    subscriber: SubscriberId,
    filter: ChangeFilter,
    subtree: bool,
    event: oneshot::Sender<()>,
) {
    let mut node = key.borrow_mut();
    if let Some(existing) = node.notify_list.iter_mut().find(|n| n.subscriber == subscriber) {
        existing.filter = filter;
        existing.subtree = subtree;
        existing.rearm(event);
    } else {
        node.notify_list.push(Notification::new(subscriber, filter, subtree, event));
    }
}

/// Removes every subscription owned by `subscriber` from `key`'s notify
/// list (used when a handle is closed).
pub fn remove_subscriber(key: &crate::key::KeyRef, subscriber: SubscriberId) {
    key.borrow_mut().notify_list.retain(|n| n.subscriber != subscriber);
}

/// Walks from the mutated key `origin` up to the root, firing matching
/// subscriptions (spec §4.6).
///
/// At `origin` itself, every subscription whose filter intersects `kind`
/// fires, regardless of its `subtree` flag. At each ancestor, only
/// `subtree` subscriptions fire, and only for `kind` values other than
/// `LAST_SET` (value changes do not bubble).
pub fn propagate(origin: &crate::key::KeyRef, kind: ChangeFilter) {
    fire_matching(origin, kind, true);

    let mut parent = origin.borrow().parent.as_ref().and_then(Weak::upgrade);
    let bubbling_kind = kind - ChangeFilter::LAST_SET;
    while let Some(ancestor) = parent {
        if !bubbling_kind.is_empty() {
            fire_matching(&ancestor, bubbling_kind, false);
        }
        parent = ancestor.borrow().parent.as_ref().and_then(Weak::upgrade);
    }
}

fn fire_matching(key: &Rc<RefCell<KeyNode>>, kind: ChangeFilter, at_origin: bool) {
    let mut node = key.borrow_mut();
    for sub in node.notify_list.iter_mut() {
        if !at_origin && !sub.subtree {
            continue;
        }
        if sub.filter.intersects(kind) {
            sub.fire();
        }
    }
}
