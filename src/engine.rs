//! Tree operations: lookup with symlink/WoW64 resolution, create, open,
//! delete, and value access (spec §4.1–§4.5).

use std::cell::{OnceCell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::access::{self, SecurityDescriptor};
use crate::key::{clear_dirty_subtree, touch_dirty, KeyFlags, KeyNode, KeyRef, Ticks};
use crate::notify::{propagate, ChangeFilter};
use crate::path::{name_eq, Segments, MAX_OPEN_PATH_LEN, MAX_SEGMENT_LEN};
use crate::persist;
use crate::time::now_ticks;
use crate::value::{ValueType, SYMLINK_VALUE_NAME};
use crate::StatusCode;

type Result<T> = std::result::Result<T, StatusCode>;

/// Cap on the number of symlink hops a single lookup may chase before
/// giving up (spec §4.1, Design Notes: "keep this as a named constant").
pub const SYMLINK_HOP_CAP: u32 = 16;

/// Lookup modifiers derived from the requester's open flags and bitness
/// (spec §4.1, §4.3, §4.9).
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupAttr {
    /// Do not follow a terminal symlink; return the link key itself.
    pub open_link: bool,
    /// The requester wants the 32-bit (WoW64) view of redirected subtrees.
    pub wow64: bool,
}

/// Architecture tag of a loaded prefix (spec §4.7, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Win32,
    Win64,
}

/// Result of a non-recursive or recursive key enumeration (spec §4.5, §6.1).
pub struct EnumKeyEntry {
    pub name: String,
    pub class: Option<String>,
    pub n_subkeys: usize,
    pub n_values: usize,
    pub modif: Ticks,
}

/// Result of a value enumeration entry (spec §4.5, §6.1).
pub struct EnumValueEntry {
    pub name: String,
    pub value_type: ValueType,
    pub data: Vec<u8>,
}

/// The in-memory tree plus the bookkeeping spec §1 treats as external:
/// a handle table is layered on top by [`crate::dispatcher`], not here.
pub struct Engine {
    pub root: KeyRef,
    pub arch: Arch,
    default_sd: OnceCell<SecurityDescriptor>,
    /// Keys mounted from an on-disk file via `LoadRegistry`, paired with
    /// the path they save back to. Walked by the periodic save tick
    /// (spec §5) and by an explicit `SaveRegistry`/`UnloadRegistry`.
    save_branches: RefCell<Vec<(KeyRef, PathBuf)>>,
}

impl Engine {
    /// Creates a fresh engine with only the static root key (spec §3 Lifecycle).
    pub fn new(arch: Arch) -> Self {
        Self {
            root: KeyNode::new_root(now_ticks()),
            arch,
            default_sd: OnceCell::new(),
            save_branches: RefCell::new(Vec::new()),
        }
    }

    /// Returns the shared default security descriptor, synthesizing it on
    /// first use (spec §4.11).
    pub fn default_security_descriptor(&self) -> &SecurityDescriptor {
        self.default_sd.get_or_init(access::default_security_descriptor)
    }

    /// Resolves `path` starting from `start`, following symlinks and
    /// applying WoW64 redirection (spec §4.1).
    pub fn lookup(&self, start: &KeyRef, path: &str, attr: LookupAttr) -> Result<Option<KeyRef>> {
        if Segments::has_leading_backslash(path) {
            return Err(StatusCode::ObjectPathInvalid);
        }
        let mut hops = 0u32;
        self.lookup_inner(start, path, attr, &mut hops)
    }

    fn lookup_inner(
        &self,
        start: &KeyRef,
        path: &str,
        attr: LookupAttr,
        hops: &mut u32,
    ) -> Result<Option<KeyRef>> {
        if path.is_empty() {
            return Ok(Some(start.clone()));
        }

        let mut current = start.clone();
        let mut iter = Segments::new(path).peekable();

        while let Some(seg) = iter.next() {
            if seg.chars().count() > MAX_SEGMENT_LEN {
                return Err(StatusCode::InvalidParameter);
            }

            let search_in = self.wow64_share_redirect(&current, attr);

            let found = {
                let node = search_in.borrow();
                match node.find_child(seg) {
                    Ok(i) => node.children[i].clone(),
                    Err(_) => {
                        return if iter.peek().is_some() {
                            Err(StatusCode::ObjectNameNotFound)
                        } else {
                            Ok(None)
                        };
                    }
                }
            };

            let resolved = self.maybe_chase_symlink(found, attr, hops)?;
            let rewritten = self.maybe_wow64_rewrite(resolved, attr);
            current = rewritten;
        }

        Ok(Some(current))
    }

    /// Implements the "Wow6432Node child of a WOWSHARE parent" short
    /// circuit (spec §4.1 step 3, §4.3): redirects the *search* onto the
    /// parent's child set, without changing what gets returned.
    fn wow64_share_redirect(&self, current: &KeyRef, attr: LookupAttr) -> KeyRef {
        if !attr.wow64 {
            return current.clone();
        }
        let node = current.borrow();
        if !name_eq(&node.name, "Wow6432Node") {
            return current.clone();
        }
        match node.parent.as_ref().and_then(Weak::upgrade) {
            Some(parent) if parent.borrow().flags.contains(KeyFlags::WOWSHARE) => parent,
            _ => current.clone(),
        }
    }

    fn maybe_chase_symlink(&self, found: KeyRef, attr: LookupAttr, hops: &mut u32) -> Result<KeyRef> {
        if attr.open_link || !found.borrow().is_symlink() {
            return Ok(found);
        }
        *hops += 1;
        if *hops > SYMLINK_HOP_CAP {
            return Err(StatusCode::NameTooLong);
        }
        let target = read_symlink_target(&found)?;
        let base = if target.starts_with('\\') {
            self.root.clone()
        } else {
            found.borrow().parent.as_ref().and_then(Weak::upgrade).ok_or(StatusCode::ObjectNameNotFound)?
        };
        self.lookup_inner(&base, &target, attr, hops)?.ok_or(StatusCode::ObjectNameNotFound)
    }

    fn maybe_wow64_rewrite(&self, found: KeyRef, attr: LookupAttr) -> KeyRef {
        if !attr.wow64 || !found.borrow().flags.contains(KeyFlags::WOW64) {
            return found;
        }
        found.borrow().child("Wow6432Node").unwrap_or(found.clone())
    }

    /// Creates (recursively) the key named by `path` under `parent`
    /// (spec §4.4 Create).
    #[allow(clippy::too_many_arguments)]
    pub fn create_key(
        &self,
        parent: &KeyRef,
        path: &str,
        class: Option<String>,
        volatile: bool,
        create_link: bool,
        attr: LookupAttr,
    ) -> Result<(KeyRef, bool)> {
        if Segments::has_leading_backslash(path) {
            return Err(StatusCode::ObjectPathInvalid);
        }
        if path.is_empty() {
            return Ok((parent.clone(), false));
        }

        let mut current = parent.clone();
        let mut iter = Segments::new(path).peekable();
        let mut created_any = false;

        while let Some(seg) = iter.next() {
            if seg.chars().count() > MAX_SEGMENT_LEN {
                return Err(StatusCode::InvalidParameter);
            }
            let is_last = iter.peek().is_none();
            let search_in = self.wow64_share_redirect(&current, attr);

            let existing = search_in.borrow().child(seg);
            let next = if let Some(existing) = existing {
                existing
            } else {
                if search_in.borrow().is_volatile() && !volatile {
                    return Err(StatusCode::ChildMustBeVolatile);
                }
                let mut flags = KeyFlags::empty();
                if volatile {
                    flags.insert(KeyFlags::VOLATILE);
                }
                if is_last && create_link {
                    flags.insert(KeyFlags::SYMLINK);
                }
                let now = now_ticks();
                let child = KeyNode::new_child(seg.to_owned(), &search_in, flags, now);
                search_in.borrow_mut().insert_child(child.clone());
                created_any = true;
                touch_dirty(&search_in, now);
                propagate(&search_in, ChangeFilter::NAME);
                child
            };

            current = if is_last {
                next
            } else {
                let resolved = self.maybe_chase_symlink(next, attr, &mut 0)?;
                self.maybe_wow64_rewrite(resolved, attr)
            };
        }

        if let Some(class) = class {
            let changed = current.borrow().class.as_deref() != Some(class.as_str());
            if changed {
                current.borrow_mut().class = Some(class);
                let now = now_ticks();
                touch_dirty(&current, now);
                propagate(&current, ChangeFilter::NAME);
            }
        }

        Ok((current, created_any))
    }

    /// Opens (without mutation) the key named by `path` under `parent`
    /// (spec §4.4 Open).
    pub fn open_key(&self, parent: &KeyRef, path: &str, attr: LookupAttr) -> Result<KeyRef> {
        if path.chars().count() > MAX_OPEN_PATH_LEN {
            return Err(StatusCode::ObjectNameInvalid);
        }
        self.lookup(parent, path, attr)?.ok_or(StatusCode::ObjectNameNotFound)
    }

    /// Deletes `key`. Non-recursive form refuses a key with children;
    /// recursive form walks bottom-up (spec §4.4 Delete).
    pub fn delete_key(&self, key: &KeyRef, recursive: bool) -> Result<()> {
        if Rc::ptr_eq(key, &self.root) {
            return Err(StatusCode::AccessDenied);
        }
        if key.borrow().is_deleted() {
            return Err(StatusCode::KeyDeleted);
        }
        if !key.borrow().children.is_empty() {
            if !recursive {
                return Err(StatusCode::AccessDenied);
            }
            let children: Vec<_> = key.borrow().children.clone();
            for child in children {
                self.delete_key(&child, true)?;
            }
        }

        let parent = key.borrow().parent.as_ref().and_then(Weak::upgrade);
        let name = key.borrow().name.clone();
        if let Some(parent) = &parent {
            parent.borrow_mut().remove_child(&name);
            let now = now_ticks();
            touch_dirty(parent, now);
            propagate(parent, ChangeFilter::NAME);
        }
        let mut node = key.borrow_mut();
        node.flags.insert(KeyFlags::DELETED);
        node.parent = None;
        Ok(())
    }

    /// Enumerates a single child by index, in one of the basic/node/full/
    /// cached/name info classes' underlying data (spec §4.5 Enum, §6.1).
    pub fn enum_key(&self, key: &KeyRef, index: usize) -> Result<EnumKeyEntry> {
        let node = key.borrow();
        let child = node.children.get(index).ok_or(StatusCode::NoMoreEntries)?;
        let child = child.borrow();
        Ok(EnumKeyEntry {
            name: child.name.clone(),
            class: child.class.clone(),
            n_subkeys: child.children.len(),
            n_values: child.values.len(),
            modif: child.modif,
        })
    }

    /// Sets a value on `key` (spec §4.5 Set). Enforces the symlink-key
    /// value restriction: only `SymbolicLinkValue`/`REG_LINK` may be
    /// written on a key with the `SYMLINK` flag.
    pub fn set_key_value(
        &self,
        key: &KeyRef,
        name: &str,
        value_type: ValueType,
        data: Vec<u8>,
    ) -> Result<()> {
        let is_symlink = key.borrow().is_symlink();
        if is_symlink && !(name == SYMLINK_VALUE_NAME && value_type == ValueType::Link) {
            return Err(StatusCode::AccessDenied);
        }
        let dirtied = key.borrow_mut().values.set(name, value_type, data)?;
        if dirtied {
            let now = now_ticks();
            touch_dirty(key, now);
            propagate(key, ChangeFilter::LAST_SET);
        }
        Ok(())
    }

    /// Reads a value from `key` (spec §4.5 Get).
    pub fn get_key_value(&self, key: &KeyRef, name: &str) -> Result<(ValueType, Vec<u8>)> {
        let node = key.borrow();
        let value = node.values.get(name).ok_or(StatusCode::ObjectNameNotFound)?;
        Ok((value.value_type, value.data.clone()))
    }

    /// Enumerates a single value by index (spec §4.5 Enum, §6.1).
    pub fn enum_key_value(&self, key: &KeyRef, index: usize) -> Result<EnumValueEntry> {
        let node = key.borrow();
        let value = node.values.at(index).ok_or(StatusCode::NoMoreEntries)?;
        Ok(EnumValueEntry { name: value.name.clone(), value_type: value.value_type, data: value.data.clone() })
    }

    /// Deletes a value from `key` (spec §4.5 Delete-value).
    pub fn delete_key_value(&self, key: &KeyRef, name: &str) -> Result<()> {
        key.borrow_mut().values.remove(name)?;
        let now = now_ticks();
        touch_dirty(key, now);
        propagate(key, ChangeFilter::LAST_SET);
        Ok(())
    }

    /// Mounts the file at `file_path` under `parent\path`, creating the
    /// mount key if needed, and registers it so later saves (explicit or
    /// periodic) write back to the same file (spec §4.7, §4.8, §5).
    ///
    /// The file's declared architecture must match the engine's; a prefix
    /// never mixes win32 and win64 persistence files (spec §6.3).
    pub fn load_registry(&self, parent: &KeyRef, path: &str, file_path: PathBuf) -> Result<KeyRef> {
        let (mount, _) = self.create_key(parent, path, None, false, false, LookupAttr::default())?;
        let text = std::fs::read_to_string(&file_path).map_err(|_| StatusCode::ObjectNameNotFound)?;
        let arch = persist::load(&text, &mount)?;
        if arch != self.arch {
            return Err(StatusCode::NotRegistryFile);
        }
        self.save_branches.borrow_mut().push((mount.clone(), file_path));
        Ok(mount)
    }

    /// Creates `parent\path` and, if `file_path` already exists, seeds it
    /// from that file; registers the branch for future saves either way.
    ///
    /// Unlike [`Engine::load_registry`], a missing file is not an error:
    /// this is the bootstrap path used at startup for a prefix's standard
    /// hives, which do not exist yet on a fresh data directory.
    pub fn mount_branch(&self, parent: &KeyRef, path: &str, file_path: PathBuf) -> Result<KeyRef> {
        let (mount, _) = self.create_key(parent, path, None, false, false, LookupAttr::default())?;
        if file_path.exists() {
            let text = std::fs::read_to_string(&file_path).map_err(|_| StatusCode::ObjectNameNotFound)?;
            let arch = persist::load(&text, &mount)?;
            if arch != self.arch {
                return Err(StatusCode::NotRegistryFile);
            }
        }
        self.save_branches.borrow_mut().push((mount.clone(), file_path));
        Ok(mount)
    }

    /// Writes `key`'s subtree out to `file_path` and clears its dirty flag
    /// (spec §4.7, §4.8).
    pub fn save_registry(&self, key: &KeyRef, file_path: &Path) -> Result<()> {
        let text = persist::save_to_string(key, &file_path.display().to_string(), self.arch);
        persist::atomic::write_file(file_path, &text)?;
        clear_dirty_subtree(key);
        Ok(())
    }

    /// Detaches a mounted branch. Unlike a plain `DeleteKey`, this also
    /// drops the branch's save registration; the branch's in-memory
    /// contents are discarded, not flushed, matching the reading that an
    /// unload abandons unsaved changes rather than implicitly saving them
    /// (spec §4.7, Open Questions).
    pub fn unload_registry(&self, key: &KeyRef) -> Result<()> {
        self.save_branches.borrow_mut().retain(|(branch, _)| !Rc::ptr_eq(branch, key));
        self.delete_key(key, true)
    }

    /// Saves every dirty mounted branch, called by the periodic save timer
    /// (spec §5). Per-branch failures are not fatal to the sweep.
    pub fn save_dirty_branches(&self) {
        for (key, path) in self.save_branches.borrow().iter() {
            if key.borrow().is_dirty() {
                let _ = self.save_registry(key, path);
            }
        }
    }
}

/// Reads and decodes the `SymbolicLinkValue` target path off a symlink key.
fn read_symlink_target(key: &KeyRef) -> Result<String> {
    let node = key.borrow();
    let value = node.values.get(SYMLINK_VALUE_NAME).ok_or(StatusCode::ObjectNameNotFound)?;
    if value.value_type != ValueType::Link {
        return Err(StatusCode::ObjectNameNotFound);
    }
    String::from_utf8(value.data.clone()).map_err(|_| StatusCode::ObjectNameNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk() -> Engine {
        Engine::new(Arch::Win64)
    }

    #[test]
    fn create_then_open_reports_created_flag() {
        let engine = mk();
        let (key1, created1) =
            engine.create_key(&engine.root.clone(), "Machine\\SOFTWARE\\Acme", None, false, false, LookupAttr::default()).unwrap();
        assert!(created1);
        let (key2, created2) =
            engine.create_key(&engine.root.clone(), "Machine\\SOFTWARE\\Acme", None, false, false, LookupAttr::default()).unwrap();
        assert!(!created2);
        assert!(std::rc::Rc::ptr_eq(&key1, &key2));
    }

    #[test]
    fn enum_finds_created_child() {
        let engine = mk();
        let (software, _) =
            engine.create_key(&engine.root.clone(), "Machine\\SOFTWARE", None, false, false, LookupAttr::default()).unwrap();
        engine.create_key(&software, "Acme", None, false, false, LookupAttr::default()).unwrap();
        let entry = engine.enum_key(&software, 0).unwrap();
        assert_eq!(entry.name, "Acme");
        assert_eq!(engine.enum_key(&software, 1).unwrap_err(), StatusCode::NoMoreEntries);
    }

    #[test]
    fn value_round_trips() {
        let engine = mk();
        let (acme, _) =
            engine.create_key(&engine.root.clone(), "Machine\\SOFTWARE\\Acme", None, false, false, LookupAttr::default()).unwrap();
        engine.set_key_value(&acme, "Name", ValueType::Sz, b"Widget".to_vec()).unwrap();
        let (value_type, data) = engine.get_key_value(&acme, "Name").unwrap();
        assert_eq!(value_type, ValueType::Sz);
        assert_eq!(data, b"Widget");
    }

    #[test]
    fn symlink_follows_to_target_unless_open_link() {
        let engine = mk();
        let (a, _) = engine.create_key(&engine.root.clone(), "A", None, false, false, LookupAttr::default()).unwrap();
        let (b, _) = engine.create_key(&a, "B", None, false, false, LookupAttr::default()).unwrap();
        engine.set_key_value(&b, "v", ValueType::Sz, b"hi".to_vec()).unwrap();

        let (link, _) = engine.create_key(&engine.root.clone(), "L", None, false, true, LookupAttr::default()).unwrap();
        engine.set_key_value(&link, SYMLINK_VALUE_NAME, ValueType::Link, b"\\A\\B".to_vec()).unwrap();

        let followed = engine.open_key(&engine.root.clone(), "L", LookupAttr::default()).unwrap();
        assert!(std::rc::Rc::ptr_eq(&followed, &b));

        let unfollowed =
            engine.open_key(&engine.root.clone(), "L", LookupAttr { open_link: true, wow64: false }).unwrap();
        assert!(std::rc::Rc::ptr_eq(&unfollowed, &link));
        assert_eq!(
            engine.get_key_value(&unfollowed, "v").unwrap_err(),
            StatusCode::ObjectNameNotFound
        );
    }

    /// Builds a chain of `hops` symlink keys named `L0`..`L{hops-1}` under
    /// the root, each redirecting to the next, with the last redirecting to
    /// `final_target`.
    fn build_symlink_chain(engine: &Engine, hops: u32, final_target: &str) {
        for i in 0..hops {
            let (link, _) = engine
                .create_key(&engine.root.clone(), &format!("L{i}"), None, false, true, LookupAttr::default())
                .unwrap();
            let target =
                if i + 1 < hops { format!("\\L{}", i + 1) } else { format!("\\{final_target}") };
            engine.set_key_value(&link, SYMLINK_VALUE_NAME, ValueType::Link, target.into_bytes()).unwrap();
        }
    }

    #[test]
    fn symlink_chain_at_the_hop_cap_resolves() {
        let engine = mk();
        let (end, _) = engine.create_key(&engine.root.clone(), "End", None, false, false, LookupAttr::default()).unwrap();
        engine.set_key_value(&end, "v", ValueType::Sz, b"final".to_vec()).unwrap();

        build_symlink_chain(&engine, SYMLINK_HOP_CAP, "End");

        let resolved = engine.open_key(&engine.root.clone(), "L0", LookupAttr::default()).unwrap();
        assert!(std::rc::Rc::ptr_eq(&resolved, &end));
    }

    #[test]
    fn symlink_chain_past_the_hop_cap_is_rejected() {
        let engine = mk();
        let (end, _) = engine.create_key(&engine.root.clone(), "End", None, false, false, LookupAttr::default()).unwrap();
        engine.set_key_value(&end, "v", ValueType::Sz, b"final".to_vec()).unwrap();

        build_symlink_chain(&engine, SYMLINK_HOP_CAP + 1, "End");

        assert_eq!(
            engine.open_key(&engine.root.clone(), "L0", LookupAttr::default()).unwrap_err(),
            StatusCode::NameTooLong
        );
    }

    #[test]
    fn path_segment_of_256_is_accepted_257_is_rejected() {
        let engine = mk();
        let ok_segment = "a".repeat(256);
        assert!(engine
            .create_key(&engine.root.clone(), &ok_segment, None, false, false, LookupAttr::default())
            .is_ok());

        let too_long_segment = "a".repeat(257);
        assert_eq!(
            engine
                .create_key(&engine.root.clone(), &too_long_segment, None, false, false, LookupAttr::default())
                .unwrap_err(),
            StatusCode::InvalidParameter
        );
        assert_eq!(
            engine.open_key(&engine.root.clone(), &too_long_segment, LookupAttr::default()).unwrap_err(),
            StatusCode::InvalidParameter
        );
    }

    #[test]
    fn volatile_containment_rejects_non_volatile_child() {
        let engine = mk();
        let (v, _) = engine.create_key(&engine.root.clone(), "V", None, true, false, LookupAttr::default()).unwrap();
        assert_eq!(
            engine.create_key(&v, "P", None, false, false, LookupAttr::default()).unwrap_err(),
            StatusCode::ChildMustBeVolatile
        );
        assert!(engine.create_key(&v, "P", None, true, false, LookupAttr::default()).is_ok());
    }

    #[test]
    fn delete_non_empty_requires_recursive() {
        let engine = mk();
        let (a, _) = engine.create_key(&engine.root.clone(), "A", None, false, false, LookupAttr::default()).unwrap();
        engine.create_key(&a, "B", None, false, false, LookupAttr::default()).unwrap();
        assert_eq!(engine.delete_key(&a, false).unwrap_err(), StatusCode::AccessDenied);
        assert!(engine.delete_key(&a, true).is_ok());
        assert!(a.borrow().is_deleted());
    }

    #[test]
    fn symlink_value_restriction() {
        let engine = mk();
        let (link, _) = engine.create_key(&engine.root.clone(), "L", None, false, true, LookupAttr::default()).unwrap();
        engine.set_key_value(&link, SYMLINK_VALUE_NAME, ValueType::Link, b"\\A".to_vec()).unwrap();
        assert_eq!(
            engine.set_key_value(&link, "other", ValueType::Sz, b"x".to_vec()).unwrap_err(),
            StatusCode::AccessDenied
        );
    }

    #[test]
    fn load_save_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.reg");
        std::fs::write(&path, "WINE REGISTRY Version 2\n#arch=win64\n[SOFTWARE\\Acme] 1700000000\n\"Name\"=\"Widget\"\n").unwrap();

        let engine = mk();
        let mount = engine.load_registry(&engine.root.clone(), "Machine", path.clone()).unwrap();
        let acme = mount.borrow().child("SOFTWARE").unwrap().borrow().child("Acme").unwrap();
        assert_eq!(engine.get_key_value(&acme, "Name").unwrap().1, b"Widget\0");

        engine.set_key_value(&acme, "New", ValueType::Sz, b"x\0".to_vec()).unwrap();
        engine.save_dirty_branches();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"New\"=\"x\""));
    }

    #[test]
    fn load_rejects_mismatched_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.reg");
        std::fs::write(&path, "WINE REGISTRY Version 2\n#arch=win32\n[A]\n").unwrap();

        let engine = Engine::new(Arch::Win64);
        assert_eq!(
            engine.load_registry(&engine.root.clone(), "Machine", path).unwrap_err(),
            StatusCode::NotRegistryFile
        );
    }

    #[test]
    fn mount_branch_tolerates_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.reg");
        let engine = mk();
        let mount = engine.mount_branch(&engine.root.clone(), "Machine", path.clone()).unwrap();
        assert!(mount.borrow().children.is_empty());

        engine.set_key_value(&mount, "v", ValueType::Sz, b"x\0".to_vec()).unwrap();
        engine.save_dirty_branches();
        assert!(path.exists());
    }

    #[test]
    fn unload_drops_save_registration_and_deletes_branch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.reg");
        std::fs::write(&path, "WINE REGISTRY Version 2\n#arch=win64\n[A]\n").unwrap();

        let engine = mk();
        let mount = engine.load_registry(&engine.root.clone(), "Machine", path).unwrap();
        engine.unload_registry(&mount).unwrap();
        assert!(mount.borrow().is_deleted());
        assert!(engine.save_branches.borrow().is_empty());
    }
}
