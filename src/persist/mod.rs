//! Textual persistence: loading a branch from disk into the tree, and
//! writing it back out (spec §4.7, §4.8).

pub mod atomic;
pub mod parser;
pub mod quoting;
pub mod writer;

use crate::engine::Arch;
use crate::key::{KeyFlags, KeyNode, KeyRef};
use crate::time::now_ticks;
use crate::StatusCode;

/// Applies a parsed file onto `dest`, treating `dest` as the mount point
/// for the file's (relative) section paths. Returns the file's declared
/// architecture so the caller can reconcile it against the prefix's
/// established arch (spec §6.3; a mismatch is the caller's concern, not
/// this function's, since a fresh load has nothing to reconcile against).
///
/// Keys created here start clean: loading does not mark anything dirty or
/// fire notifications, since it reproduces exactly what is already on disk.
pub fn load(text: &str, dest: &KeyRef) -> Result<Arch, StatusCode> {
    let (arch, events) = parser::parse(text)?;
    let mut current: Option<KeyRef> = None;

    for event in events {
        match event {
            parser::Event::Section { path, epoch_seconds } => {
                let key = ensure_path(dest, &path);
                if let Some(seconds) = epoch_seconds {
                    key.borrow_mut().modif = crate::time::unix_seconds_to_ticks(seconds);
                }
                current = Some(key);
            }
            parser::Event::Time(ticks) => {
                if let Some(key) = &current {
                    key.borrow_mut().modif = ticks;
                }
            }
            parser::Event::Class(class) => {
                if let Some(key) = &current {
                    key.borrow_mut().class = Some(class);
                }
            }
            parser::Event::Link => {
                if let Some(key) = &current {
                    key.borrow_mut().flags.insert(KeyFlags::SYMLINK);
                }
            }
            parser::Event::Value { name, value_type, data } => {
                if let Some(key) = &current {
                    let name = name.unwrap_or_default();
                    let _ = key.borrow_mut().values.set(&name, value_type, data);
                }
            }
            parser::Event::Error { .. } => {}
        }
    }

    Ok(arch)
}

/// Creates (without marking dirty) any missing keys along `path`, starting
/// from `root`, returning the terminal key. Re-opening an existing section
/// (a file may describe the same key twice) reuses it rather than erroring.
fn ensure_path(root: &KeyRef, path: &[String]) -> KeyRef {
    let mut current = root.clone();
    for segment in path {
        let next = current.borrow().child(segment);
        current = match next {
            Some(existing) => existing,
            None => {
                let child = KeyNode::new_child(segment.clone(), &current, KeyFlags::empty(), now_ticks());
                current.borrow_mut().insert_child(child.clone());
                child
            }
        };
    }
    current
}

/// Renders `branch`'s subtree to its textual form, for callers that then
/// hand the bytes to [`atomic::write_file`].
pub fn save_to_string(branch: &KeyRef, base_path: &str, arch: Arch) -> String {
    let mut buf = Vec::new();
    writer::write(&mut buf, branch, base_path, arch).expect("writing to an in-memory buffer cannot fail");
    String::from_utf8(buf).expect("writer only emits valid UTF-8")
}
