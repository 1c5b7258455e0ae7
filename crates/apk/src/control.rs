//! Control section: `.PKGINFO` rendering plus scriptlet packaging
//!
//! The control archive is a gzip member without a tar end-of-archive
//! marker, streamed through a digest chosen by the packager: SHA-1 when
//! the package will be signed, SHA-256 otherwise.

use crate::package::PackageContext;
use crate::tarball::{MemFs, TarballContext};
use crucible_errors::{BuildError, Result};
use crucible_events::{Event, Section};
use crucible_hash::{HashAlgorithm, HashValue, HashingWriter};
use std::fmt::Write as _;
use std::io::{Seek, SeekFrom, Write};

impl PackageContext {
    /// Render the `.PKGINFO` control manifest
    #[must_use]
    pub fn generate_control_data(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Generated by melange.");
        let _ = writeln!(out, "pkgname = {}", self.name);
        let _ = writeln!(
            out,
            "pkgver = {}-r{}",
            self.origin.version, self.origin.epoch
        );
        let _ = writeln!(out, "arch = {}", self.arch);
        let _ = writeln!(out, "size = {}", self.installed_size);
        let _ = writeln!(out, "origin = {}", self.origin_name);
        let _ = writeln!(out, "pkgdesc = {}", self.description);
        let _ = writeln!(out, "url = {}", self.url);
        let _ = writeln!(out, "commit = {}", self.commit);
        if self.source_date_epoch != 0 {
            let _ = writeln!(out, "builddate = {}", self.source_date_epoch);
        }
        for license in &self.origin.licenses {
            let _ = writeln!(out, "license = {license}");
        }
        for dep in &self.dependencies.runtime {
            let _ = writeln!(out, "depend = {dep}");
        }
        for dep in &self.dependencies.provides {
            let _ = writeln!(out, "provides = {dep}");
        }
        for dep in &self.dependencies.replaces {
            let _ = writeln!(out, "replaces = {dep}");
        }
        if let Some(priority) = self.dependencies.provider_priority {
            let _ = writeln!(out, "provider_priority = {priority}");
        }
        if !self.scriptlets.trigger.paths.is_empty() {
            let mut line = String::from("triggers = ");
            for path in &self.scriptlets.trigger.paths {
                let _ = write!(line, "{path} ");
            }
            let _ = writeln!(out, "{line}");
        }
        let _ = writeln!(out, "datahash = {}", self.data_hash);
        out
    }

    /// Emit the control section, returning the finalized digest
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written or rewound.
    pub(crate) fn emit_control_section(
        &self,
        algorithm: HashAlgorithm,
        dst: &mut (impl Write + Seek),
    ) -> Result<HashValue> {
        let tarctx = TarballContext::new()
            .with_source_date_epoch(self.source_date_epoch)
            .with_override_uid_gid(0, 0)
            .with_override_uname("root")
            .with_override_gname("root")
            .with_skip_close(true);

        let mut fsys = MemFs::new();
        fsys.write_file(".PKGINFO", self.generate_control_data().into_bytes(), 0o644);
        for (name, script) in self.scriptlets.files() {
            // Scriptlets must be executable.
            fsys.write_file(name, script.as_bytes().to_vec(), 0o755);
        }

        let mut writer = HashingWriter::new(&mut *dst, algorithm);
        tarctx
            .write_targz(&mut writer, &fsys.entries())
            .map_err(|e| BuildError::TarballFailed {
                section: "control".to_string(),
                message: e.to_string(),
            })?;
        let (digest, _) = writer.finalize();

        self.emit_event(Event::SectionWritten {
            section: Section::Control,
            digest: Some(digest.to_hex()),
        });

        dst.seek(SeekFrom::Start(0))?;
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use crate::package::{BuildContext, PackageContext, Subpackage};
    use crate::types::{Dependencies, Origin, Scriptlets, Trigger};
    use std::path::PathBuf;

    fn context() -> PackageContext {
        let build = BuildContext {
            origin: Origin {
                name: "hello".to_string(),
                version: "2.12".to_string(),
                epoch: 1,
                licenses: vec!["GPL-3.0-or-later".to_string()],
            },
            arch: "x86_64".to_string(),
            workspace_dir: PathBuf::from("/tmp/ws"),
            out_dir: PathBuf::from("/tmp/out"),
            source_date_epoch: 1_700_000_000,
            signing: None,
            subpackages: Vec::new(),
            dependency_log: None,
            create_build_log: false,
            events: None,
        };
        let subpackage = Subpackage {
            name: "hello".to_string(),
            description: "the GNU hello program".to_string(),
            url: "https://www.gnu.org/software/hello/".to_string(),
            commit: "0123abcd".to_string(),
            dependencies: Dependencies {
                runtime: vec!["so:libc.musl-x86_64.so.1".to_string()],
                provides: vec!["cmd:hello=2.12-r1".to_string()],
                ..Dependencies::default()
            },
            ..Subpackage::default()
        };
        let mut pc = PackageContext::new(&build, &subpackage);
        pc.installed_size = 4096;
        pc.data_hash = "ab".repeat(32);
        pc
    }

    #[test]
    fn renders_full_manifest() {
        let pc = context();
        let control = pc.generate_control_data();
        let expected = format!(
            "# Generated by melange.\n\
             pkgname = hello\n\
             pkgver = 2.12-r1\n\
             arch = x86_64\n\
             size = 4096\n\
             origin = hello\n\
             pkgdesc = the GNU hello program\n\
             url = https://www.gnu.org/software/hello/\n\
             commit = 0123abcd\n\
             builddate = 1700000000\n\
             license = GPL-3.0-or-later\n\
             depend = so:libc.musl-x86_64.so.1\n\
             provides = cmd:hello=2.12-r1\n\
             datahash = {}\n",
            "ab".repeat(32)
        );
        assert_eq!(control, expected);
    }

    #[test]
    fn zero_build_date_suppressed() {
        let mut pc = context();
        pc.source_date_epoch = 0;
        let control = pc.generate_control_data();
        assert!(!control.contains("builddate"));
    }

    #[test]
    fn trigger_paths_join_with_trailing_space() {
        let mut pc = context();
        pc.scriptlets = Scriptlets {
            trigger: Trigger {
                paths: vec![
                    "/usr/share/fonts/*".to_string(),
                    "/usr/share/icons/*".to_string(),
                ],
                script: "#!/bin/sh\n".to_string(),
            },
            ..Scriptlets::default()
        };
        let control = pc.generate_control_data();
        assert!(control
            .contains("triggers = /usr/share/fonts/* /usr/share/icons/* \n"));
    }

    #[test]
    fn provider_priority_rendered_when_set() {
        let mut pc = context();
        pc.dependencies.provider_priority = Some(10);
        assert!(pc
            .generate_control_data()
            .contains("provider_priority = 10\n"));
    }
}
