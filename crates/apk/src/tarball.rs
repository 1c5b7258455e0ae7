//! Deterministic tar/gzip stream writer
//!
//! Every section of an APKv2 package is a gzip-wrapped tar stream with
//! normalized metadata: fixed ownership, fixed mtime, entries in
//! lexicographic depth-first order. The signature and control sections are
//! written without the tar end-of-archive marker (`skip_close`) so that the
//! concatenated sections still decode as one continuous tar stream, while
//! each gzip member remains individually valid.

use crate::fsview::{FsEntry, FsEntryKind};
use crucible_errors::{Error, Result};
use crucible_hash::{HashAlgorithm, HashValue};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::PathBuf;

/// PAX record carrying the per-file checksum in the data section
const PAX_CHECKSUM_KEY: &str = "APK-TOOLS.checksum.SHA1";

/// Content source for one archive entry
#[derive(Debug, Clone)]
pub enum TarEntryData {
    Directory,
    /// Regular file streamed from disk; size is taken from the staging view
    File { path: PathBuf, size: u64 },
    /// Regular file held in memory (control and signature sections)
    Inline(Vec<u8>),
    Symlink(PathBuf),
}

/// One archive entry, already in emission order
#[derive(Debug, Clone)]
pub struct TarEntry {
    pub name: String,
    pub mode: u32,
    pub data: TarEntryData,
}

impl TarEntry {
    /// Convert a staging enumeration into archive entries, preserving its
    /// order and mode bits
    #[must_use]
    pub fn from_fs_entries(entries: &[FsEntry]) -> Vec<Self> {
        entries
            .iter()
            .map(|entry| Self {
                name: entry.rel_path.clone(),
                mode: entry.mode,
                data: match &entry.kind {
                    FsEntryKind::Directory => TarEntryData::Directory,
                    FsEntryKind::File => TarEntryData::File {
                        path: entry.abs_path.clone(),
                        size: entry.size,
                    },
                    FsEntryKind::Symlink { target } => TarEntryData::Symlink(target.clone()),
                },
            })
            .collect()
    }
}

/// In-memory file set for the control and signature sections
#[derive(Debug, Default)]
pub struct MemFs {
    files: Vec<(String, Vec<u8>, u32)>,
}

impl MemFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; emission order is name order regardless of insertion
    pub fn write_file(&mut self, name: impl Into<String>, contents: Vec<u8>, mode: u32) {
        self.files.push((name.into(), contents, mode));
    }

    /// Archive entries in lexicographic order
    #[must_use]
    pub fn entries(&self) -> Vec<TarEntry> {
        let mut entries: Vec<TarEntry> = self
            .files
            .iter()
            .map(|(name, contents, mode)| TarEntry {
                name: name.clone(),
                mode: *mode,
                data: TarEntryData::Inline(contents.clone()),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

/// Writer configuration for one archive stream
#[derive(Debug, Clone)]
pub struct TarballContext {
    source_date_epoch: u64,
    override_uid: u64,
    override_gid: u64,
    override_uname: String,
    override_gname: String,
    use_checksums: bool,
    skip_close: bool,
}

impl Default for TarballContext {
    fn default() -> Self {
        Self {
            source_date_epoch: 0,
            override_uid: 0,
            override_gid: 0,
            override_uname: "root".to_string(),
            override_gname: "root".to_string(),
            use_checksums: false,
            skip_close: false,
        }
    }
}

impl TarballContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed mtime applied to every entry
    #[must_use]
    pub fn with_source_date_epoch(mut self, epoch: u64) -> Self {
        self.source_date_epoch = epoch;
        self
    }

    /// Numeric ownership applied to every entry
    #[must_use]
    pub fn with_override_uid_gid(mut self, uid: u64, gid: u64) -> Self {
        self.override_uid = uid;
        self.override_gid = gid;
        self
    }

    /// Textual owner applied to every entry
    #[must_use]
    pub fn with_override_uname(mut self, uname: impl Into<String>) -> Self {
        self.override_uname = uname.into();
        self
    }

    /// Textual group applied to every entry
    #[must_use]
    pub fn with_override_gname(mut self, gname: impl Into<String>) -> Self {
        self.override_gname = gname.into();
        self
    }

    /// Record a SHA-1 PAX checksum record before each regular file
    #[must_use]
    pub fn with_use_checksums(mut self, use_checksums: bool) -> Self {
        self.use_checksums = use_checksums;
        self
    }

    /// Suppress the tar end-of-archive marker so another stream can follow
    #[must_use]
    pub fn with_skip_close(mut self, skip_close: bool) -> Self {
        self.skip_close = skip_close;
        self
    }

    /// Write entries as one gzip member
    ///
    /// The caller supplies entries in their final order and tees `dst`
    /// through a digest when the stream must be hashed.
    ///
    /// # Errors
    ///
    /// Returns an error on any read or write failure; partial output may
    /// have reached `dst`.
    pub fn write_targz<W: Write>(&self, dst: W, entries: &[TarEntry]) -> Result<()> {
        let mut encoder = GzEncoder::new(dst, Compression::default());
        self.write_tar(&mut encoder, entries)?;
        // The gzip member is always terminated; only the tar end-of-archive
        // marker is subject to skip_close.
        encoder.try_finish()?;
        Ok(())
    }

    fn write_tar<W: Write>(&self, dst: &mut W, entries: &[TarEntry]) -> Result<()> {
        let mut builder = tar::Builder::new(dst);
        builder.follow_symlinks(false);

        for entry in entries {
            let mut header = tar::Header::new_ustar();
            header.set_mtime(self.source_date_epoch);
            header.set_uid(self.override_uid);
            header.set_gid(self.override_gid);
            header
                .set_username(&self.override_uname)
                .map_err(|e| Error::io_with_path(&e, &entry.name))?;
            header
                .set_groupname(&self.override_gname)
                .map_err(|e| Error::io_with_path(&e, &entry.name))?;
            header.set_mode(entry.mode);

            match &entry.data {
                TarEntryData::Directory => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, format!("{}/", entry.name), std::io::empty())
                        .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                }
                TarEntryData::File { path, size } => {
                    if self.use_checksums {
                        let file = std::fs::File::open(path)
                            .map_err(|e| Error::io_with_path(&e, path))?;
                        let checksum = HashValue::from_reader(file, HashAlgorithm::Sha1)?;
                        builder
                            .append_pax_extensions([(
                                PAX_CHECKSUM_KEY,
                                checksum.to_hex().as_bytes(),
                            )])
                            .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                    }
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(*size);
                    header.set_cksum();
                    let mut file =
                        std::fs::File::open(path).map_err(|e| Error::io_with_path(&e, path))?;
                    builder
                        .append_data(&mut header, &entry.name, &mut file)
                        .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                }
                TarEntryData::Inline(contents) => {
                    if self.use_checksums {
                        let checksum = HashValue::from_data(contents, HashAlgorithm::Sha1);
                        builder
                            .append_pax_extensions([(
                                PAX_CHECKSUM_KEY,
                                checksum.to_hex().as_bytes(),
                            )])
                            .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                    }
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(contents.len() as u64);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, &entry.name, contents.as_slice())
                        .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                }
                TarEntryData::Symlink(target) => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_cksum();
                    builder
                        .append_link(&mut header, &entry.name, target)
                        .map_err(|e| Error::io_with_path(&e, &entry.name))?;
                }
            }
        }

        if self.skip_close {
            // tar::Builder writes the 1024-byte end-of-archive marker from
            // both finish() and Drop; leaking the builder is the only way to
            // suppress it. The builder only borrows `dst`, so nothing that
            // owns resources is leaked.
            std::mem::forget(builder);
        } else {
            builder.finish()?;
        }

        Ok(())
    }
}
