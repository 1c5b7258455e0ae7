//! Package emission orchestration
//!
//! One [`PackageContext`] exists per subpackage emission. The pipeline is
//! strictly ordered: dependency generation, installed-size accounting, data
//! section (fixing `datahash`), control section (embedding it), optional
//! signature section (binding the control digest), then concatenation of
//! the sections into the final `.apk`.

use crate::fsview::{self, FsEntry};
use crate::scan;
use crate::tarball::{TarEntry, TarballContext};
use crate::types::{Dependencies, Origin, PackageOptions, Scriptlets, SigningConfig};
use crucible_errors::{BuildError, Error, Result};
use crucible_events::{Event, EventSender, EventSenderExt, Section};
use crucible_hash::{HashAlgorithm, HashingWriter};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Staging directory name under the workspace root
const MELANGE_OUT: &str = "melange-out";

/// Build-wide inputs shared by every subpackage emission
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub origin: Origin,
    /// Architecture tag in package-manager-canonical form
    pub arch: String,
    pub workspace_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Unix seconds applied to all archive metadata; zero means unset
    pub source_date_epoch: u64,
    pub signing: Option<SigningConfig>,
    /// Names of all declared subpackages, for cross-package symlink
    /// resolution
    pub subpackages: Vec<String>,
    /// Stem of the dependency log; the arch tag is appended
    pub dependency_log: Option<PathBuf>,
    /// Append a line to `packages.log` after each successful emission
    pub create_build_log: bool,
    pub events: Option<EventSender>,
}

/// Per-subpackage emission inputs
///
/// The origin package emits itself the same way, as a subpackage named
/// after the origin and carrying the origin's own dependency set, options,
/// and scriptlets.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Subpackage {
    pub name: String,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub options: PackageOptions,
    #[serde(default)]
    pub scriptlets: Scriptlets,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub commit: String,
}

/// State for one package emission
#[derive(Debug, Clone)]
pub struct PackageContext {
    pub origin: Origin,
    pub name: String,
    pub origin_name: String,
    pub arch: String,
    pub description: String,
    pub url: String,
    pub commit: String,
    pub dependencies: Dependencies,
    pub options: PackageOptions,
    pub scriptlets: Scriptlets,
    pub source_date_epoch: u64,
    pub workspace_dir: PathBuf,
    pub out_dir: PathBuf,
    pub signing: Option<SigningConfig>,
    pub subpackages: Vec<String>,
    pub dependency_log: Option<PathBuf>,
    pub create_build_log: bool,
    pub events: Option<EventSender>,

    /// Sum of staged regular-file sizes, computed during emission
    pub installed_size: u64,
    /// Hex SHA-256 of the data section, computed during emission
    pub data_hash: String,
}

impl PackageContext {
    /// Assemble the emission context for one subpackage
    #[must_use]
    pub fn new(build: &BuildContext, subpackage: &Subpackage) -> Self {
        let origin_name = if subpackage.options.strip_origin_name {
            subpackage.name.clone()
        } else {
            build.origin.name.clone()
        };

        Self {
            origin: build.origin.clone(),
            name: subpackage.name.clone(),
            origin_name,
            arch: build.arch.clone(),
            description: subpackage.description.clone(),
            url: subpackage.url.clone(),
            commit: subpackage.commit.clone(),
            dependencies: subpackage.dependencies.clone(),
            options: subpackage.options,
            scriptlets: subpackage.scriptlets.clone(),
            source_date_epoch: build.source_date_epoch,
            workspace_dir: build.workspace_dir.clone(),
            out_dir: build.out_dir.clone(),
            signing: build.signing.clone(),
            subpackages: build.subpackages.clone(),
            dependency_log: build.dependency_log.clone(),
            create_build_log: build.create_build_log,
            events: build.events.clone(),
            installed_size: 0,
            data_hash: String::new(),
        }
    }

    /// `<name>-<version>-r<epoch>`
    #[must_use]
    pub fn identity(&self) -> String {
        format!(
            "{}-{}-r{}",
            self.name, self.origin.version, self.origin.epoch
        )
    }

    /// Path of the emitted `.apk`
    #[must_use]
    pub fn filename(&self) -> PathBuf {
        self.out_dir.join(format!("{}.apk", self.identity()))
    }

    /// Root of all sibling staging trees
    #[must_use]
    pub fn melange_out_dir(&self) -> PathBuf {
        self.workspace_dir.join(MELANGE_OUT)
    }

    /// This subpackage's staging tree
    #[must_use]
    pub fn workspace_subdir(&self) -> PathBuf {
        self.melange_out_dir().join(&self.name)
    }

    pub(crate) fn emit_event(&self, event: Event) {
        self.events.as_ref().emit(event);
    }

    /// Synthesize `so:`/`cmd:` relations and finish the dependency set
    ///
    /// # Errors
    ///
    /// Returns an error if the staging tree cannot be scanned.
    pub fn generate_dependencies(&mut self) -> Result<()> {
        self.dependencies = scan::generate_dependencies(self)?;
        self.dependencies.summarize(self.events.as_ref());
        Ok(())
    }

    fn calculate_installed_size(&mut self, entries: &[FsEntry]) {
        // Raw file sizes only; directories and symlinks contribute zero.
        self.installed_size = entries
            .iter()
            .filter(|e| e.is_file())
            .map(|e| e.size)
            .sum();
        self.emit_event(Event::InstalledSizeComputed {
            package: self.name.clone(),
            bytes: self.installed_size,
        });
    }

    /// Emit the data section and fix `data_hash`
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written or rewound.
    fn emit_data_section(
        &mut self,
        entries: &[FsEntry],
        dst: &mut (impl Write + Seek),
    ) -> Result<()> {
        let tarctx = TarballContext::new()
            .with_source_date_epoch(self.source_date_epoch)
            .with_override_uid_gid(0, 0)
            .with_override_uname("root")
            .with_override_gname("root")
            .with_use_checksums(true);

        let mut writer = HashingWriter::new(&mut *dst, HashAlgorithm::Sha256);
        tarctx
            .write_targz(&mut writer, &TarEntry::from_fs_entries(entries))
            .map_err(|e| BuildError::TarballFailed {
                section: "data".to_string(),
                message: e.to_string(),
            })?;
        let (digest, _) = writer.finalize();
        self.data_hash = digest.to_hex();

        self.emit_event(Event::SectionWritten {
            section: Section::Data,
            digest: Some(self.data_hash.clone()),
        });

        dst.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Append one pipe-delimited line to `packages.log` in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be opened or written.
    pub fn append_build_log(&self, dir: &Path) -> std::io::Result<()> {
        if !self.create_build_log {
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.join("packages.log"))?;
        writeln!(
            file,
            "{}|{}|{}|{}-r{}",
            self.arch, self.origin_name, self.name, self.origin.version, self.origin.epoch
        )
    }

    /// Emit the package: the full blocking pipeline
    ///
    /// # Errors
    ///
    /// Returns an error on any fatal pipeline failure; temporary section
    /// files are removed on every path.
    pub fn emit(&mut self) -> Result<PathBuf> {
        std::fs::create_dir_all(self.workspace_subdir()).map_err(|e| {
            Error::from(crucible_errors::PackageError::StagingUnavailable {
                path: self.workspace_subdir().display().to_string(),
                message: e.to_string(),
            })
        })?;

        self.emit_event(Event::EmitStarting {
            package: self.name.clone(),
            identity: self.identity(),
        });

        // Generate so:/cmd: virtuals for the staged filesystem.
        self.generate_dependencies()?;

        let entries = fsview::walk(&self.workspace_subdir())?;
        self.calculate_installed_size(&entries);

        let mut data_file = NamedTempFile::new()?;
        self.emit_data_section(&entries, data_file.as_file_mut())?;

        // The v2 signature chain hashes the control section with SHA-1;
        // unsigned packages keep SHA-256.
        let control_algorithm = if self.signing.is_some() {
            HashAlgorithm::Sha1
        } else {
            HashAlgorithm::Sha256
        };

        let mut control_file = NamedTempFile::new()?;
        let control_digest =
            self.emit_control_section(control_algorithm, control_file.as_file_mut())?;

        let mut signature_file = None;
        if let Some(signing) = self.signing.clone() {
            let mut file = NamedTempFile::new()?;
            self.emit_signature_section(&signing, &control_digest, file.as_file_mut())?;
            signature_file = Some(file);
        }

        std::fs::create_dir_all(&self.out_dir).map_err(|e| BuildError::OutputDirFailed {
            path: self.out_dir.display().to_string(),
            message: e.to_string(),
        })?;

        let out_path = self.filename();
        let mut out =
            std::fs::File::create(&out_path).map_err(|e| Error::io_with_path(&e, &out_path))?;

        let mut parts: Vec<&mut std::fs::File> = Vec::new();
        if let Some(file) = signature_file.as_mut() {
            parts.push(file.as_file_mut());
        }
        parts.push(control_file.as_file_mut());
        parts.push(data_file.as_file_mut());
        for part in parts {
            std::io::copy(part, &mut out).map_err(|e| Error::io_with_path(&e, &out_path))?;
        }

        self.emit_event(Event::EmitCompleted {
            package: self.name.clone(),
            path: out_path.clone(),
        });

        if let Err(e) = self.append_build_log(Path::new("")) {
            self.emit_event(Event::warning(format!(
                "unable to append package log: {e}"
            )));
        }

        Ok(out_path)
    }

    /// Emit on the blocking thread pool; the pipeline itself stays
    /// single-threaded
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline fails or the blocking task dies.
    pub async fn emit_async(mut self) -> Result<(Self, PathBuf)> {
        tokio::task::spawn_blocking(move || -> Result<(Self, PathBuf)> {
            let path = self.emit()?;
            Ok((self, path))
        })
        .await
        .map_err(|e| {
            Error::from(BuildError::Failed {
                message: format!("emit task failed: {e}"),
            })
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> BuildContext {
        BuildContext {
            origin: Origin {
                name: "zlib".to_string(),
                version: "1.3.1".to_string(),
                epoch: 2,
                licenses: vec!["Zlib".to_string()],
            },
            arch: "aarch64".to_string(),
            workspace_dir: PathBuf::from("/work"),
            out_dir: PathBuf::from("/out/aarch64"),
            ..BuildContext::default()
        }
    }

    #[test]
    fn identity_and_paths() {
        let pc = PackageContext::new(
            &build(),
            &Subpackage {
                name: "zlib-dev".to_string(),
                ..Subpackage::default()
            },
        );
        assert_eq!(pc.identity(), "zlib-dev-1.3.1-r2");
        assert_eq!(pc.filename(), PathBuf::from("/out/aarch64/zlib-dev-1.3.1-r2.apk"));
        assert_eq!(
            pc.workspace_subdir(),
            PathBuf::from("/work/melange-out/zlib-dev")
        );
    }

    #[test]
    fn origin_name_follows_strip_option() {
        let subpackage = Subpackage {
            name: "zlib-doc".to_string(),
            ..Subpackage::default()
        };
        let pc = PackageContext::new(&build(), &subpackage);
        assert_eq!(pc.origin_name, "zlib");

        let stripped = Subpackage {
            options: PackageOptions {
                strip_origin_name: true,
                ..PackageOptions::default()
            },
            ..subpackage
        };
        let pc = PackageContext::new(&build(), &stripped);
        assert_eq!(pc.origin_name, "zlib-doc");
    }
}
