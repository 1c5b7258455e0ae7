//! Ordered, symlink-preserving view of a staging tree
//!
//! Every consumer of the staged filesystem (archive writer, dependency
//! scanners, installed-size accounting) walks the same enumeration so the
//! emitted archives are byte-deterministic: entries come back in
//! lexicographic path order, depth-first, with symlinks reported as
//! symlinks.

use crucible_errors::{Error, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Node kind within the staging view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEntryKind {
    Directory,
    File,
    Symlink { target: PathBuf },
}

/// One staged filesystem node
#[derive(Debug, Clone)]
pub struct FsEntry {
    /// Path relative to the staging root, `/`-separated, no leading slash
    pub rel_path: String,
    /// Absolute path on the build host
    pub abs_path: PathBuf,
    pub kind: FsEntryKind,
    /// Permission bits (`st_mode & 0o7777`); symlinks report `0o777`
    pub mode: u32,
    /// Content size for regular files, zero otherwise
    pub size: u64,
}

impl FsEntry {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, FsEntryKind::Directory)
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self.kind, FsEntryKind::File)
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, FsEntryKind::Symlink { .. })
    }

    /// Regular file with owner, group, and world execute bits set
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.is_file() && self.mode & 0o555 == 0o555
    }

    /// Final path component
    #[must_use]
    pub fn basename(&self) -> &str {
        self.rel_path
            .rsplit_once('/')
            .map_or(self.rel_path.as_str(), |(_, base)| base)
    }
}

/// Enumerate a staging tree in deterministic order
///
/// # Errors
///
/// Returns an error if a directory cannot be read or an entry cannot be
/// stat'ed; an absent root yields an empty enumeration so empty packages
/// can still be emitted.
pub fn walk(root: &Path) -> Result<Vec<FsEntry>> {
    let mut entries = Vec::new();
    if root.is_dir() {
        walk_into(root, root, &mut entries)?;
    }
    Ok(entries)
}

fn walk_into(root: &Path, dir: &Path, out: &mut Vec<FsEntry>) -> Result<()> {
    let mut dirents = std::fs::read_dir(dir)
        .map_err(|e| Error::io_with_path(&e, dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io_with_path(&e, dir))?;

    // OS string comparison keeps the ordering locale-independent.
    dirents.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    for dirent in dirents {
        let path = dirent.path();
        let meta =
            std::fs::symlink_metadata(&path).map_err(|e| Error::io_with_path(&e, &path))?;
        let rel_path = path
            .strip_prefix(root)
            .map_err(|e| Error::internal(format!("path outside staging root: {e}")))?
            .to_string_lossy()
            .into_owned();

        let file_type = meta.file_type();
        if file_type.is_dir() {
            out.push(FsEntry {
                rel_path,
                abs_path: path.clone(),
                kind: FsEntryKind::Directory,
                mode: meta.permissions().mode() & 0o7777,
                size: 0,
            });
            walk_into(root, &path, out)?;
        } else if file_type.is_symlink() {
            let target =
                std::fs::read_link(&path).map_err(|e| Error::io_with_path(&e, &path))?;
            out.push(FsEntry {
                rel_path,
                abs_path: path,
                kind: FsEntryKind::Symlink { target },
                mode: 0o777,
                size: 0,
            });
        } else if file_type.is_file() {
            out.push(FsEntry {
                rel_path,
                abs_path: path,
                kind: FsEntryKind::File,
                mode: meta.permissions().mode() & 0o7777,
                size: meta.len(),
            });
        }
        // Device nodes and fifos are never packaged.
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &[u8], mode: u32) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn walk_orders_depth_first() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "usr/bin/zsh", b"#!", 0o755);
        write(root, "usr/bin/ash", b"#!", 0o755);
        write(root, "etc/motd", b"hi", 0o644);

        let paths: Vec<String> = walk(root)
            .unwrap()
            .into_iter()
            .map(|e| e.rel_path)
            .collect();
        assert_eq!(
            paths,
            vec!["etc", "etc/motd", "usr", "usr/bin", "usr/bin/ash", "usr/bin/zsh"]
        );
    }

    #[test]
    fn walk_preserves_symlinks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "usr/lib/libz.so.1.3", b"\x7fELF", 0o755);
        symlink("libz.so.1.3", root.join("usr/lib/libz.so.1")).unwrap();

        let entries = walk(root).unwrap();
        let link = entries
            .iter()
            .find(|e| e.rel_path == "usr/lib/libz.so.1")
            .unwrap();
        match &link.kind {
            FsEntryKind::Symlink { target } => {
                assert_eq!(target, &PathBuf::from("libz.so.1.3"));
            }
            other => panic!("expected symlink, got {other:?}"),
        }
        assert_eq!(link.size, 0);
    }

    #[test]
    fn executable_needs_all_three_bits() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "bin/tool", b"x", 0o755);
        write(root, "bin/private", b"x", 0o700);

        let entries = walk(root).unwrap();
        let by_name = |name: &str| entries.iter().find(|e| e.rel_path == name).unwrap();
        assert!(by_name("bin/tool").is_executable());
        assert!(!by_name("bin/private").is_executable());
    }

    #[test]
    fn missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let entries = walk(&temp.path().join("nope")).unwrap();
        assert!(entries.is_empty());
    }
}
