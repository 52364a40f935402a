//! The key node: a single tree entry holding its class, children, values,
//! flags and pending notifications.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::notify::Notification;
use crate::path::name_cmp;
use crate::value::ValueStore;

bitflags! {
    /// Per-key flags (spec §3 Key).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct KeyFlags: u8 {
        /// Not persisted.
        const VOLATILE = 1 << 0;
        /// Tombstone: still reachable via outstanding handles.
        const DELETED  = 1 << 1;
        /// Needs save.
        const DIRTY    = 1 << 2;
        /// A `SymbolicLinkValue`/`REG_LINK` value on this key redirects lookups.
        const SYMLINK  = 1 << 3;
        /// Owns a `Wow6432Node` child mirroring a 32-bit subspace.
        const WOW64    = 1 << 4;
        /// Children are shared between the 32- and 64-bit views.
        const WOWSHARE = 1 << 5;
    }
}

/// 100-nanosecond ticks since 1601-01-01, matching the source timestamp epoch.
pub type Ticks = u64;

/// Shared, reference-counted handle to a key node.
pub type KeyRef = Rc<RefCell<KeyNode>>;

/// A single tree node: class string, ordered children, value store, flags,
/// modification time, a non-owning parent back-reference, and pending
/// notification subscriptions (spec §3 Key).
pub struct KeyNode {
    pub name: String,
    pub class: Option<String>,
    pub parent: Option<Weak<RefCell<KeyNode>>>,
    pub children: Vec<KeyRef>,
    pub values: ValueStore,
    pub flags: KeyFlags,
    pub modif: Ticks,
    pub notify_list: Vec<Notification>,
}

impl KeyNode {
    pub fn new_root(now: Ticks) -> KeyRef {
        Rc::new(RefCell::new(KeyNode {
            name: String::new(),
            class: None,
            parent: None,
            children: Vec::new(),
            values: ValueStore::new(),
            flags: KeyFlags::empty(),
            modif: now,
            notify_list: Vec::new(),
        }))
    }

    pub fn new_child(name: String, parent: &KeyRef, flags: KeyFlags, now: Ticks) -> KeyRef {
        Rc::new(RefCell::new(KeyNode {
            name,
            class: None,
            parent: Some(Rc::downgrade(parent)),
            children: Vec::new(),
            values: ValueStore::new(),
            flags,
            modif: now,
            notify_list: Vec::new(),
        }))
    }

    pub fn is_volatile(&self) -> bool {
        self.flags.contains(KeyFlags::VOLATILE)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(KeyFlags::DELETED)
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(KeyFlags::DIRTY)
    }

    pub fn is_symlink(&self) -> bool {
        self.flags.contains(KeyFlags::SYMLINK)
    }

    /// Binary-searches `children` for `name`, returning the matching key or
    /// `Err(insertion point)` on miss.
    pub fn find_child(&self, name: &str) -> std::result::Result<usize, usize> {
        self.children.binary_search_by(|c| name_cmp(&c.borrow().name, name))
    }

    pub fn child(&self, name: &str) -> Option<KeyRef> {
        self.find_child(name).ok().map(|i| self.children[i].clone())
    }

    pub fn insert_child(&mut self, key: KeyRef) {
        let idx = self.find_child(&key.borrow().name).expect_err("duplicate child name");
        self.children.insert(idx, key);
    }

    pub fn remove_child(&mut self, name: &str) -> Option<KeyRef> {
        let idx = self.find_child(name).ok()?;
        Some(self.children.remove(idx))
    }
}

/// Marks `key` dirty along with every ancestor up to the root, enforcing
/// the dirty-propagation invariant (spec §3 Invariants). Volatile keys are
/// never marked dirty.
pub fn touch_dirty(key: &KeyRef, now: Ticks) {
    let mut current = Some(key.clone());
    while let Some(node) = current {
        let mut node_mut = node.borrow_mut();
        node_mut.modif = now;
        if node_mut.is_volatile() {
            break;
        }
        node_mut.flags.insert(KeyFlags::DIRTY);
        let parent = node_mut.parent.as_ref().and_then(Weak::upgrade);
        drop(node_mut);
        current = parent;
    }
}

/// Clears the `DIRTY` flag on `key` and its entire (non-volatile) subtree,
/// as performed after a successful save (spec §4.8).
pub fn clear_dirty_subtree(key: &KeyRef) {
    let mut node = key.borrow_mut();
    node.flags.remove(KeyFlags::DIRTY);
    let children: Vec<_> = node.children.clone();
    drop(node);
    for child in children {
        clear_dirty_subtree(&child);
    }
}

/// Reconstructs the fully-qualified path of `key` by walking its parent chain,
/// used by the `Name` enum-key info class (spec §6.1).
pub fn full_path(key: &KeyRef) -> String {
    let mut segments = Vec::new();
    let mut current = Some(key.clone());
    while let Some(node) = current {
        let node_ref = node.borrow();
        let parent = node_ref.parent.as_ref().and_then(Weak::upgrade);
        if parent.is_some() {
            segments.push(node_ref.name.clone());
        }
        drop(node_ref);
        current = parent;
    }
    segments.reverse();
    format!("\\{}", segments.join("\\"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_propagates_to_root() {
        let root = KeyNode::new_root(0);
        let a = KeyNode::new_child("A".into(), &root, KeyFlags::empty(), 0);
        root.borrow_mut().insert_child(a.clone());
        let b = KeyNode::new_child("B".into(), &a, KeyFlags::empty(), 0);
        a.borrow_mut().insert_child(b.clone());

        touch_dirty(&b, 1);
        assert!(b.borrow().is_dirty());
        assert!(a.borrow().is_dirty());
        assert!(root.borrow().is_dirty());
    }

    #[test]
    fn volatile_subtree_never_dirty() {
        let root = KeyNode::new_root(0);
        let v = KeyNode::new_child("V".into(), &root, KeyFlags::VOLATILE, 0);
        root.borrow_mut().insert_child(v.clone());

        touch_dirty(&v, 1);
        assert!(!v.borrow().is_dirty());
        assert!(!root.borrow().is_dirty());
    }

    #[test]
    fn full_path_walks_to_root() {
        let root = KeyNode::new_root(0);
        let a = KeyNode::new_child("Machine".into(), &root, KeyFlags::empty(), 0);
        root.borrow_mut().insert_child(a.clone());
        let b = KeyNode::new_child("SOFTWARE".into(), &a, KeyFlags::empty(), 0);
        a.borrow_mut().insert_child(b.clone());

        assert_eq!(full_path(&b), "\\Machine\\SOFTWARE");
        assert_eq!(full_path(&root), "\\");
    }
}
