//! Automatic dependency synthesis from the staging tree
//!
//! Two generators run in fixed order over a shared accumulator: the
//! shared-object scanner (PT_INTERP, DT_NEEDED, DT_SONAME) and the command
//! scanner (executables under the bin directories). Their output is merged
//! with the declared dependency lists, sorted, deduplicated, and stripped
//! of self-provided entries.

pub(crate) mod elf;

use crate::fsview::{self, FsEntry, FsEntryKind};
use crate::package::PackageContext;
use crate::types::Dependencies;
use crucible_errors::{BuildError, Result};
use crucible_events::Event;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Bin-directory prefixes that turn an executable into a `cmd:` provider
const CMD_PREFIXES: &[&str] = &["bin/", "sbin/", "usr/bin/", "usr/sbin/"];

/// Library directories searched during cross-package symlink resolution
const LIB_DIRS: &[&str] = &["lib", "usr/lib", "lib64", "usr/lib64"];

/// Run all generators and finish the dependency set
///
/// # Errors
///
/// Returns an error if the staging tree cannot be walked or a staged file
/// cannot be read. ELF parse failures are not errors; they mark the file
/// as non-ELF.
pub(crate) fn generate_dependencies(pc: &PackageContext) -> Result<Dependencies> {
    let mut generated = Dependencies::default();

    generate_shared_object_deps(pc, &mut generated)?;
    generate_cmd_providers(pc, &mut generated)?;

    let mut runtime = pc.dependencies.runtime.clone();
    runtime.append(&mut generated.runtime);
    let mut provides = pc.dependencies.provides.clone();
    provides.append(&mut generated.provides);

    let mut finished = Dependencies {
        runtime: dedup(runtime),
        provides: dedup(provides),
        replaces: pc.dependencies.replaces.clone(),
        provider_priority: pc.dependencies.provider_priority,
    };
    finished.runtime = remove_self_provided(finished.runtime, &finished.provides);

    Ok(finished)
}

/// Sort and drop adjacent duplicates
fn dedup(mut input: Vec<String>) -> Vec<String> {
    input.sort();
    input.dedup();
    input
}

/// Remove runtime entries the package provides itself
///
/// A package that ships `so:libfoo.so.1=1` must not also depend on
/// `so:libfoo.so.1`.
fn remove_self_provided(runtime: Vec<String>, provides: &[String]) -> Vec<String> {
    let provided: HashSet<&str> = provides
        .iter()
        .map(|p| p.split_once('=').map_or(p.as_str(), |(name, _)| name))
        .collect();

    runtime
        .into_iter()
        .filter(|dep| !provided.contains(dep.as_str()))
        .collect()
}

fn allowed_prefix(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|pfx| path.starts_with(pfx))
}

fn generate_cmd_providers(pc: &PackageContext, generated: &mut Dependencies) -> Result<()> {
    if pc.options.no_commands {
        return Ok(());
    }

    pc.emit_event(Event::ScanningCommands {
        package: pc.name.clone(),
    });

    for entry in fsview::walk(&pc.workspace_subdir())? {
        if !entry.is_executable() {
            continue;
        }
        if allowed_prefix(&entry.rel_path, CMD_PREFIXES) {
            generated.provides.push(format!(
                "cmd:{}={}-r{}",
                entry.basename(),
                pc.origin.version,
                pc.origin.epoch
            ));
        }
    }

    Ok(())
}

fn generate_shared_object_deps(pc: &PackageContext, generated: &mut Dependencies) -> Result<()> {
    pc.emit_event(Event::ScanningSharedObjects {
        package: pc.name.clone(),
    });

    // Immutable search-root set for cross-package symlink resolution,
    // computed once per emission.
    let search_roots = sibling_staging_roots(pc);

    let mut depends: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in fsview::walk(&pc.workspace_subdir())? {
        match &entry.kind {
            FsEntryKind::Symlink { .. } => {
                scan_library_symlink(pc, &entry, &search_roots, generated);
            }
            FsEntryKind::File => {
                scan_regular_file(pc, &entry, generated, &mut depends)?;
            }
            FsEntryKind::Directory => {}
        }
    }

    if let Some(stem) = &pc.dependency_log {
        pc.emit_event(Event::debug("writing dependency log"));
        let log_path = format!("{}.{}", stem.display(), pc.arch);
        match std::fs::File::create(&log_path) {
            Err(e) => {
                pc.emit_event(Event::warning(format!(
                    "unable to open dependency log: {e}"
                )));
            }
            Ok(file) => {
                serde_json::to_writer(file, &depends).map_err(|e| {
                    BuildError::DependencyLogFailed {
                        path: log_path,
                        message: e.to_string(),
                    }
                })?;
            }
        }
    }

    Ok(())
}

/// Versioned library symlinks surface dependencies on libraries staged in
/// sibling packages; resolution failures are non-fatal.
fn scan_library_symlink(
    pc: &PackageContext,
    entry: &FsEntry,
    search_roots: &[PathBuf],
    generated: &mut Dependencies,
) {
    if !entry.rel_path.contains(".so") {
        return;
    }

    let Some(real_path) = resolve_cross_package_symlink(entry, search_roots) else {
        return;
    };
    let Ok(data) = std::fs::read(&real_path) else {
        return;
    };
    let Some(info) = elf::parse(&data) else {
        return;
    };

    if !info.has_dynamic {
        pc.emit_event(Event::warning(format!(
            "library {} lacks SONAME",
            entry.rel_path
        )));
        return;
    }

    if let Some(soname) = info.soname {
        generated.runtime.push(format!("so:{soname}"));
    }
}

fn scan_regular_file(
    pc: &PackageContext,
    entry: &FsEntry,
    generated: &mut Dependencies,
    depends: &mut BTreeMap<String, Vec<String>>,
) -> Result<()> {
    if !entry.is_executable() {
        return Ok(());
    }

    let data = std::fs::read(&entry.abs_path).map_err(|e| BuildError::ScanFailed {
        path: entry.rel_path.clone(),
        message: e.to_string(),
    })?;

    // Most likely a shell script instead of an ELF.
    let Some(info) = elf::parse(&data) else {
        return Ok(());
    };

    if let Some(interp) = info.interpreter.as_deref() {
        if !pc.options.no_depends {
            pc.emit_event(Event::InterpreterFound {
                binary: entry.basename().to_string(),
                interpreter: interp.to_string(),
            });

            // The musl loader is a symlink back to libc, so the dependency
            // must name the library rather than the loader path.
            let interp_base = Path::new(interp)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let interp_name =
                format!("so:{interp_base}").replace("so:ld-musl", "so:libc.musl");
            generated.runtime.push(interp_name);
        }
    }

    if !pc.options.no_depends {
        for lib in &info.needed {
            if lib.contains(".so.") {
                generated.runtime.push(format!("so:{lib}"));
                depends
                    .entry(lib.clone())
                    .or_default()
                    .push(entry.rel_path.clone());
            }
        }
    }

    // Executables should never carry a SONAME, but some jlink-built
    // binaries do; anything with an interpreter is not treated as a
    // provider.
    if !pc.options.no_provides && info.interpreter.is_none() {
        if !info.has_dynamic {
            pc.emit_event(Event::warning(format!(
                "library {} lacks SONAME",
                entry.rel_path
            )));
            return Ok(());
        }
        if let Some(soname) = &info.soname {
            let libver = soname.split(".so.").nth(1).unwrap_or("0");
            generated.provides.push(format!("so:{soname}={libver}"));
        }
    }

    Ok(())
}

/// Staging roots considered during symlink resolution: the current
/// subpackage, the origin package, then every declared subpackage.
fn sibling_staging_roots(pc: &PackageContext) -> Vec<PathBuf> {
    let mut names = vec![pc.name.clone(), pc.origin.name.clone()];
    names.extend(pc.subpackages.iter().cloned());

    names
        .iter()
        .map(|name| pc.melange_out_dir().join(name))
        .collect()
}

/// Resolve a staged symlink to a real file in any sibling staging tree
///
/// Only the link target's basename participates; the first existing
/// candidate under a known library directory wins.
fn resolve_cross_package_symlink(entry: &FsEntry, search_roots: &[PathBuf]) -> Option<PathBuf> {
    let FsEntryKind::Symlink { target } = &entry.kind else {
        return None;
    };
    let basename = target.file_name()?;

    for root in search_roots {
        for lib_dir in LIB_DIRS {
            let candidate = root.join(lib_dir).join(basename);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
