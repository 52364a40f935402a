//! Text-format emission: the inverse of [`crate::persist::parser`] (spec §4.7).
//!
//! A key is emitted if it has any values, no subkeys, a class, or is a
//! symlink; a key with none of those is implied by its descendants and
//! contributes only to their paths.

use std::io::{self, Write};

use crate::engine::Arch;
use crate::key::KeyRef;
use crate::persist::parser::HEADER_LINE;
use crate::persist::quoting::{escape, join_qpath};
use crate::value::{Value, ValueType};

/// Writes `branch`'s subtree in the text format, rooted at an empty qpath.
/// `base_path` is recorded only as a human-readable comment; it plays no
/// role in parsing.
pub fn write<W: Write>(out: &mut W, branch: &KeyRef, base_path: &str, arch: Arch) -> io::Result<()> {
    writeln!(out, "{HEADER_LINE}")?;
    writeln!(out, "; base path: {base_path}")?;
    writeln!(out, "#arch={}", match arch { Arch::Win32 => "win32", Arch::Win64 => "win64" })?;
    writeln!(out)?;
    write_key(out, branch, &mut Vec::new())
}

fn write_key<W: Write>(out: &mut W, key: &KeyRef, path: &mut Vec<String>) -> io::Result<()> {
    let node = key.borrow();
    if node.is_volatile() {
        return Ok(());
    }

    let emit = !node.values.is_empty() || node.children.is_empty() || node.class.is_some() || node.is_symlink();
    if emit {
        writeln!(out, "[{}] {}", join_qpath(path), crate::time::ticks_to_unix_seconds(node.modif))?;
        if let Some(class) = &node.class {
            writeln!(out, "#class=\"{}\"", escape(class))?;
        }
        if node.is_symlink() {
            writeln!(out, "#link")?;
        }
        writeln!(out, "#time={:x}", node.modif)?;
        for value in node.values.iter() {
            write_value(out, value)?;
        }
        writeln!(out)?;
    }

    let children: Vec<_> = node.children.clone();
    drop(node);
    for child in children {
        let name = child.borrow().name.clone();
        path.push(name);
        write_key(out, &child, path)?;
        path.pop();
    }
    Ok(())
}

fn write_value<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
    let name_field = if value.name.is_empty() { "@".to_string() } else { format!("\"{}\"", escape(&value.name)) };
    match value.value_type {
        ValueType::Sz => match quoted_sz_body(&value.data) {
            Some(s) => writeln!(out, "{name_field}=\"{}\"", escape(&s)),
            None => writeln!(out, "{name_field}=hex(1):{}", hex_join(&value.data)),
        },
        ValueType::ExpandSz => match quoted_sz_body(&value.data) {
            Some(s) => writeln!(out, "{name_field}=str(2):\"{}\"", escape(&s)),
            None => writeln!(out, "{name_field}=hex(2):{}", hex_join(&value.data)),
        },
        ValueType::Dword => match <[u8; 4]>::try_from(value.data.as_slice()) {
            Ok(bytes) => writeln!(out, "{name_field}=dword:{:08x}", u32::from_le_bytes(bytes)),
            Err(_) => writeln!(out, "{name_field}=hex(4):{}", hex_join(&value.data)),
        },
        ValueType::Binary => writeln!(out, "{name_field}=hex:{}", hex_join(&value.data)),
        ValueType::MultiSz => writeln!(out, "{name_field}=hex(7):{}", hex_join(&value.data)),
        ValueType::Link => writeln!(out, "{name_field}=hex(6):{}", hex_join(&value.data)),
        ValueType::None => writeln!(out, "{name_field}=hex(0):{}", hex_join(&value.data)),
    }
}

/// A value round-trips through the plain quoted form only when its bytes
/// are UTF-8 text with exactly one trailing NUL and no NUL before it;
/// anything else falls back to typed hex so no byte is lost.
fn quoted_sz_body(data: &[u8]) -> Option<String> {
    let (last, body) = data.split_last()?;
    if *last != 0 || body.contains(&0) {
        return None;
    }
    std::str::from_utf8(body).ok().map(str::to_owned)
}

fn hex_join(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyFlags, KeyNode};

    #[test]
    fn emits_header_and_leaf_section() {
        let root = KeyNode::new_root(0);
        let acme = KeyNode::new_child("Acme".into(), &root, KeyFlags::empty(), 0);
        root.borrow_mut().insert_child(acme.clone());
        acme.borrow_mut().values.set("Name", ValueType::Sz, b"Widget\0".to_vec()).unwrap();

        let mut buf = Vec::new();
        write(&mut buf, &root, "/var/lib/regtree/machine.reg", Arch::Win64).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with(HEADER_LINE));
        assert!(text.contains("#arch=win64"));
        assert!(text.contains("[Acme]"));
        assert!(text.contains("\"Name\"=\"Widget\""));
    }

    #[test]
    fn leafless_intermediate_key_is_not_emitted() {
        let root = KeyNode::new_root(0);
        let software = KeyNode::new_child("SOFTWARE".into(), &root, KeyFlags::empty(), 0);
        root.borrow_mut().insert_child(software.clone());
        let acme = KeyNode::new_child("Acme".into(), &software, KeyFlags::empty(), 0);
        software.borrow_mut().insert_child(acme.clone());
        acme.borrow_mut().values.set("", ValueType::Sz, b"x\0".to_vec()).unwrap();

        let mut buf = Vec::new();
        write(&mut buf, &root, "base", Arch::Win32).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(!text.contains("[SOFTWARE]"));
        assert!(text.contains("[SOFTWARE\\Acme]"));
    }

    #[test]
    fn volatile_subtree_is_skipped() {
        let root = KeyNode::new_root(0);
        let v = KeyNode::new_child("V".into(), &root, KeyFlags::VOLATILE, 0);
        root.borrow_mut().insert_child(v.clone());
        v.borrow_mut().values.set("", ValueType::Sz, b"x\0".to_vec()).unwrap();

        let mut buf = Vec::new();
        write(&mut buf, &root, "base", Arch::Win32).unwrap();
        assert!(!String::from_utf8(buf).unwrap().contains('V'));
    }

    #[test]
    fn binary_with_embedded_nul_falls_back_to_hex() {
        let root = KeyNode::new_root(0);
        root.borrow_mut().values.set("Odd", ValueType::Sz, vec![b'a', 0, b'b', 0]).unwrap();

        let mut buf = Vec::new();
        write(&mut buf, &root, "base", Arch::Win32).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("hex(1):61,00,62,00"));
    }
}
