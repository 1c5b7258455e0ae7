//! Package metadata supplied by the build pipeline
//!
//! These types mirror what the configuration layer hands the emission core:
//! origin identity, declared dependency lists, per-package option flags, and
//! install-time scriptlets. All of them deserialize from the pipeline's
//! configuration documents, hence the serde derives.

use crucible_events::{Event, EventSender, EventSenderExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of the package family a subpackage belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Origin {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
}

/// Declared and generated dependency relations
///
/// Strings follow the package manager's relation grammar, e.g.
/// `so:libc.musl-x86_64.so.1`, `cmd:ls=1.2.3-r0`, `foo>=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtime: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_priority: Option<u64>,
}

impl Dependencies {
    /// Report the final dependency set through the event channel
    pub fn summarize(&self, events: Option<&EventSender>) {
        if self.runtime.is_empty() && self.provides.is_empty() {
            return;
        }
        events.emit(Event::DependencySummary {
            runtime: self.runtime.clone(),
            provides: self.provides.clone(),
        });
    }
}

/// Per-package behavior flags
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PackageOptions {
    /// Skip `cmd:` provider generation
    pub no_commands: bool,
    /// Skip `so:` provider generation
    pub no_provides: bool,
    /// Skip `so:` runtime dependency generation
    pub no_depends: bool,
    /// Emit the subpackage's own name as `origin` instead of the family name
    pub strip_origin_name: bool,
}

/// Install trigger: a script plus the path prefixes that fire it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl Trigger {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.script.is_empty()
    }
}

/// Install-lifecycle scriptlets embedded in the control section
///
/// An empty string means the hook is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Scriptlets {
    #[serde(skip_serializing_if = "Trigger::is_empty")]
    pub trigger: Trigger,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pre_install: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub post_install: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pre_deinstall: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub post_deinstall: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pre_upgrade: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub post_upgrade: String,
}

impl Scriptlets {
    /// Control-archive file name and body for every non-empty scriptlet
    #[must_use]
    pub fn files(&self) -> Vec<(&'static str, &str)> {
        let hooks = [
            (".trigger", self.trigger.script.as_str()),
            (".pre-install", self.pre_install.as_str()),
            (".post-install", self.post_install.as_str()),
            (".pre-deinstall", self.pre_deinstall.as_str()),
            (".post-deinstall", self.post_deinstall.as_str()),
            (".pre-upgrade", self.pre_upgrade.as_str()),
            (".post-upgrade", self.post_upgrade.as_str()),
        ];
        hooks.into_iter().filter(|(_, s)| !s.is_empty()).collect()
    }
}

/// RSA signing material for the legacy v2 signature section
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Path to the PEM private key; its basename also names the signature
    /// file inside the package.
    pub key_path: PathBuf,
    /// Passphrase for encrypted PKCS#8 keys
    pub passphrase: Option<String>,
}
