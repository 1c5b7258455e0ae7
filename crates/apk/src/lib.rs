#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! APKv2 package emission for crucible
//!
//! Given a populated staging tree and package metadata, this crate
//! synthesizes `so:`/`cmd:` dependency relations from ELF metadata, renders
//! the `.PKGINFO` control manifest, and emits the signature, control, and
//! data sections as separately terminated gzip streams concatenated into a
//! single `.apk`.
//!
//! The build pipeline that populates the staging tree, configuration
//! parsing, and the CLI all live upstream; they hand this crate a
//! [`BuildContext`] plus one [`Subpackage`] per emission.

mod control;
pub mod fsview;
mod package;
mod scan;
mod sign;
pub mod tarball;
mod types;

pub use package::{BuildContext, PackageContext, Subpackage};
pub use sign::PackageSigner;
pub use types::{Dependencies, Origin, PackageOptions, Scriptlets, SigningConfig, Trigger};
