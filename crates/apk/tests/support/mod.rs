//! Test fixtures: minimal ELF64 objects and staging-tree helpers
//!
//! The ELF builder produces the smallest object the scanners care about: an
//! ELF header, a PT_LOAD covering the file, an optional PT_INTERP, and an
//! optional PT_DYNAMIC with DT_NEEDED/DT_SONAME entries backed by a real
//! dynamic string table. File offsets equal virtual addresses, so no
//! translation is involved and no toolchain is needed.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const EM_X86_64: u16 = 62;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;

const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;
const DT_STRTAB: u64 = 5;
const DT_STRSZ: u64 = 10;
const DT_SONAME: u64 = 14;

/// What the generated object should declare
#[derive(Default)]
pub struct ElfSpec<'a> {
    pub interp: Option<&'a str>,
    pub needed: &'a [&'a str],
    pub soname: Option<&'a str>,
}

/// Build a complete ELF64 object from the spec
pub fn build_elf(spec: &ElfSpec<'_>) -> Vec<u8> {
    let has_dynamic = !spec.needed.is_empty() || spec.soname.is_some();
    let phnum = 1 + usize::from(spec.interp.is_some()) + usize::from(has_dynamic);

    let mut cursor = EHDR_SIZE + PHDR_SIZE * phnum;

    let interp_off = cursor;
    let interp_size = spec.interp.map_or(0, |s| s.len() + 1);
    cursor += interp_size;

    // Dynamic string table: entry 0 is the empty string.
    let dynstr_off = cursor;
    let mut dynstr = vec![0u8];
    let needed_offsets: Vec<u64> = spec
        .needed
        .iter()
        .map(|lib| {
            let off = dynstr.len() as u64;
            dynstr.extend_from_slice(lib.as_bytes());
            dynstr.push(0);
            off
        })
        .collect();
    let soname_offset = spec.soname.map(|soname| {
        let off = dynstr.len() as u64;
        dynstr.extend_from_slice(soname.as_bytes());
        dynstr.push(0);
        off
    });
    cursor += dynstr.len();

    cursor = (cursor + 7) & !7;
    let dyn_off = cursor;
    let dyn_count = if has_dynamic {
        spec.needed.len() + usize::from(soname_offset.is_some()) + 3
    } else {
        0
    };
    let dyn_size = dyn_count * 16;
    let total = dyn_off + dyn_size;

    let mut out = Vec::with_capacity(total);

    // ---- ELF64 header ----
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
    out.push(2); // ELFCLASS64
    out.push(1); // little-endian
    out.push(1); // EV_CURRENT
    out.push(0); // ELFOSABI_NONE
    out.extend_from_slice(&[0u8; 8]);
    let e_type = if spec.interp.is_some() { ET_EXEC } else { ET_DYN };
    out.extend_from_slice(&e_type.to_le_bytes());
    out.extend_from_slice(&EM_X86_64.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    out.extend_from_slice(&(EHDR_SIZE as u64).to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    out.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    out.extend_from_slice(&(phnum as u16).to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(out.len(), EHDR_SIZE);

    // File offsets equal vaddrs throughout.
    push_phdr(
        &mut out,
        PT_LOAD,
        PF_R | PF_X,
        0,
        total as u64,
        0x1000,
    );
    if let Some(interp) = spec.interp {
        push_phdr(
            &mut out,
            PT_INTERP,
            PF_R,
            interp_off as u64,
            (interp.len() + 1) as u64,
            1,
        );
    }
    if has_dynamic {
        push_phdr(
            &mut out,
            PT_DYNAMIC,
            PF_R | PF_W,
            dyn_off as u64,
            dyn_size as u64,
            8,
        );
    }
    assert_eq!(out.len(), EHDR_SIZE + PHDR_SIZE * phnum);

    if let Some(interp) = spec.interp {
        out.extend_from_slice(interp.as_bytes());
        out.push(0);
    }
    out.extend_from_slice(&dynstr);
    out.resize(dyn_off, 0);

    if has_dynamic {
        for off in &needed_offsets {
            push_dyn(&mut out, DT_NEEDED, *off);
        }
        if let Some(off) = soname_offset {
            push_dyn(&mut out, DT_SONAME, off);
        }
        push_dyn(&mut out, DT_STRTAB, dynstr_off as u64);
        push_dyn(&mut out, DT_STRSZ, dynstr.len() as u64);
        push_dyn(&mut out, DT_NULL, 0);
    }
    assert_eq!(out.len(), total);

    out
}

fn push_phdr(out: &mut Vec<u8>, p_type: u32, flags: u32, offset: u64, size: u64, align: u64) {
    out.extend_from_slice(&p_type.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes()); // p_offset
    out.extend_from_slice(&offset.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&offset.to_le_bytes()); // p_paddr
    out.extend_from_slice(&size.to_le_bytes()); // p_filesz
    out.extend_from_slice(&size.to_le_bytes()); // p_memsz
    out.extend_from_slice(&align.to_le_bytes());
}

fn push_dyn(out: &mut Vec<u8>, tag: u64, val: u64) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&val.to_le_bytes());
}

/// Write a staged file, creating parent directories
pub fn stage_file(root: &Path, rel: &str, contents: &[u8], mode: u32) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
}

/// Stage a symlink
pub fn stage_symlink(root: &Path, rel: &str, target: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::os::unix::fs::symlink(target, path).unwrap();
}
