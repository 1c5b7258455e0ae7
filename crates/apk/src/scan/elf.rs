//! Thin extraction layer over goblin's ELF parser
//!
//! The dependency scanner only needs four facts about a binary: its
//! dynamic loader, its DT_NEEDED list, its DT_SONAME, and whether a
//! dynamic section exists at all. Parse failures are reported as `None`
//! because staged executables are frequently shell scripts with the
//! execute bit set.

use goblin::elf::Elf;

/// Dynamic-linking facts extracted from one ELF object
#[derive(Debug, Clone, Default)]
pub struct ElfInfo {
    /// PT_INTERP contents, absent when empty
    pub interpreter: Option<String>,
    /// DT_NEEDED entries in file order
    pub needed: Vec<String>,
    /// DT_SONAME, when the object declares one
    pub soname: Option<String>,
    /// Whether the object carries a dynamic section at all
    pub has_dynamic: bool,
}

/// Parse an ELF object; `None` means "not an ELF"
#[must_use]
pub fn parse(data: &[u8]) -> Option<ElfInfo> {
    let elf = Elf::parse(data).ok()?;
    Some(ElfInfo {
        interpreter: elf
            .interpreter
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        needed: elf.libraries.iter().map(ToString::to_string).collect(),
        soname: elf.soname.map(ToString::to_string),
        has_dynamic: elf.dynamic.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_elf() {
        assert!(parse(b"#!/bin/sh\nexit 0\n").is_none());
        assert!(parse(b"").is_none());
    }
}
