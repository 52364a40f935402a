//! The handle table: the in-process stand-in for spec.md's external
//! "handle table collaborator" (§4.12).
//!
//! Maps an opaque handle to the key it was opened on plus the access mask
//! granted at open/create time. An unlinked key stays resolvable through
//! handles already open on it (spec §3 Lifecycle): the table holds a
//! strong [`KeyRef`], not a weak one, so a tombstoned key is kept alive
//! until every handle referencing it is closed.

use std::collections::HashMap;

use crate::key::KeyRef;
use crate::notify::SubscriberId;
use crate::StatusCode;

#[derive(Clone)]
pub struct HandleEntry {
    pub key: KeyRef,
    pub access: u32,
}

#[derive(Default)]
pub struct HandleTable {
    next: u64,
    entries: HashMap<u64, HandleEntry>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self { next: 1, entries: HashMap::new() }
    }

    pub fn open(&mut self, key: KeyRef, access: u32) -> u64 {
        let handle = self.next;
        self.next += 1;
        self.entries.insert(handle, HandleEntry { key, access });
        handle
    }

    pub fn resolve(&self, handle: u64) -> crate::error::Result<&HandleEntry> {
        self.entries.get(&handle).ok_or(StatusCode::ObjectNameNotFound)
    }

    pub fn close(&mut self, handle: u64) -> Option<HandleEntry> {
        self.entries.remove(&handle)
    }

    /// A `SubscriberId` usable for notifications armed through `handle`,
    /// identifying this process (there is exactly one, this engine) and
    /// the handle within it.
    pub fn subscriber_id(&self, handle: u64) -> SubscriberId {
        SubscriberId { process: 0, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyNode;

    #[test]
    fn open_then_resolve() {
        let mut table = HandleTable::new();
        let root = KeyNode::new_root(0);
        let h = table.open(root.clone(), 0xFFFF);
        assert!(table.resolve(h).is_ok());
        table.close(h);
        assert_eq!(table.resolve(h).unwrap_err(), StatusCode::ObjectNameNotFound);
    }
}
