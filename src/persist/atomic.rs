//! On-disk write protocol for persistence files (spec §4.8).
//!
//! A destination that is an ordinary, singly-linked regular file is
//! replaced by writing a sibling temp file and renaming it into place, so
//! a concurrent reader never observes a half-written file. A destination
//! that is a symlink, or a regular file with more than one hard link, is
//! truncated and rewritten in place instead: renaming over it would
//! silently swap in a new inode, breaking whatever hard link or symlink
//! target depended on the old one.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::StatusCode;

/// Writes `contents` to `path` using whichever of the two protocols above
/// fits the destination's current link structure.
pub fn write_file(path: &Path, contents: &str) -> Result<(), StatusCode> {
    if needs_in_place_write(path) {
        write_in_place(path, contents)
    } else {
        write_via_rename(path, contents)
    }
}

fn needs_in_place_write(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.file_type().is_symlink() || meta.nlink() > 1,
        Err(_) => false,
    }
}

fn write_in_place(path: &Path, contents: &str) -> Result<(), StatusCode> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(path)
        .map_err(|_| StatusCode::NoMemory)?;
    file.write_all(contents.as_bytes()).map_err(|_| StatusCode::NoMemory)?;
    file.sync_all().map_err(|_| StatusCode::NoMemory)
}

fn write_via_rename(path: &Path, contents: &str) -> Result<(), StatusCode> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|_| StatusCode::NoMemory)?;
    temp.write_all(contents.as_bytes()).map_err(|_| StatusCode::NoMemory)?;
    temp.as_file().sync_all().map_err(|_| StatusCode::NoMemory)?;
    temp.persist(path).map_err(|_| StatusCode::NoMemory)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn plain_file_round_trips_via_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine.reg");
        write_file(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        write_file(&path, "world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "world");
    }

    #[test]
    fn symlinked_destination_is_rewritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.reg");
        fs::write(&real, "hello").unwrap();
        let link = dir.path().join("link.reg");
        symlink(&real, &link).unwrap();

        write_file(&link, "world").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "world");
    }

    #[test]
    fn hardlinked_destination_is_rewritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.reg");
        let b = dir.path().join("b.reg");
        fs::write(&a, "hello").unwrap();
        fs::hard_link(&a, &b).unwrap();

        write_file(&a, "world").unwrap();

        assert_eq!(fs::read_to_string(&b).unwrap(), "world");
    }
}
