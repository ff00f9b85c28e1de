//! ELF executable loading
//!
//! Parses a statically-linked 64-bit little-endian RISC-V ELF of
//! type EXEC into an [`Executable`]: a list of loadable region
//! descriptors plus the entry point. In compliance (riscof) mode the
//! loader additionally resolves the `begin_signature`,
//! `end_signature` and `tohost` symbols that the test framework
//! uses to delimit its output and signal termination.
//!
//! Dynamic linking, TLS and interpreters are rejected outright by
//! the e_type check (such images are not EXEC or carry segment
//! types we report as unsupported).

use std::path::Path;

use elf::abi::{
    EM_RISCV, ET_EXEC, PF_R, PF_W, PF_X, PT_GNU_STACK, PT_LOAD, PT_NOTE, PT_NULL, PT_PHDR,
};
use elf::endian::AnyEndian;
use elf::ElfBytes;
use log::{debug, info, warn};
use thiserror::Error;

/// Count-of-defined-types marker some toolchains emit; carries no data
const PT_NUM: u32 = 8;

/// RISC-V attributes segment (Tag_RISCV_arch and friends)
const PT_RISCV_ATTRIBUTES: u32 = 0x7000_0003;

#[derive(Debug, Error)]
pub enum ElfLoadError {
    #[error("could not read executable: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse executable: {0}")]
    Parse(#[from] elf::ParseError),
    #[error("executable is not 64-bit")]
    NotElf64,
    #[error("executable is not little-endian")]
    NotLittleEndian,
    #[error("executable is not RISC-V (e_machine = {0})")]
    NotRiscv(u16),
    #[error("executable is not of type EXEC (e_type = {0}); dynamic images are not supported")]
    NotExec(u16),
    #[error("unsupported program header type 0x{0:x}")]
    UnsupportedSegment(u32),
    #[error("segment at 0x{0:x} has file size larger than memory size")]
    MalformedSegment(u64),
    #[error("executable has no symbol table")]
    MissingSymbolTable,
    #[error("could not resolve symbol {0}")]
    MissingSymbol(&'static str),
}

/// Read/write/execute permissions of a loadable region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionFlags {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// One loadable region of the executable image
///
/// The source bytes cover the first file_size bytes of the region;
/// the remainder up to memory_size is zero-filled at load time.
#[derive(Debug, Clone)]
pub struct Region {
    pub load_address: u64,
    pub file_size: u64,
    pub memory_size: u64,
    pub data: Vec<u8>,
    pub flags: RegionFlags,
}

/// Addresses of the well-known compliance-framework symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceSymbols {
    pub begin_signature: u64,
    pub end_signature: u64,
    pub tohost: u64,
}

/// A loaded program image, ready to be projected into memory
#[derive(Debug)]
pub struct Executable {
    pub regions: Vec<Region>,
    pub entry: u64,
    pub symbols: Option<ComplianceSymbols>,
}

impl Executable {
    /// The tohost trap address, if the image was loaded in
    /// compliance mode
    pub fn tohost(&self) -> Option<u64> {
        self.symbols.map(|symbols| symbols.tohost)
    }
}

fn check_header(file: &ElfBytes<AnyEndian>) -> Result<(), ElfLoadError> {
    if file.ehdr.class != elf::file::Class::ELF64 {
        return Err(ElfLoadError::NotElf64);
    }
    if file.ehdr.endianness != AnyEndian::Little {
        return Err(ElfLoadError::NotLittleEndian);
    }
    if file.ehdr.e_machine != EM_RISCV {
        return Err(ElfLoadError::NotRiscv(file.ehdr.e_machine));
    }
    if file.ehdr.e_type != ET_EXEC {
        return Err(ElfLoadError::NotExec(file.ehdr.e_type));
    }
    Ok(())
}

fn read_regions(file: &ElfBytes<AnyEndian>) -> Result<Vec<Region>, ElfLoadError> {
    let mut regions = Vec::new();
    let Some(segments) = file.segments() else {
        return Ok(regions);
    };
    for phdr in segments.iter() {
        match phdr.p_type {
            PT_LOAD => {
                if phdr.p_filesz > phdr.p_memsz {
                    return Err(ElfLoadError::MalformedSegment(phdr.p_vaddr));
                }
                let data = file.segment_data(&phdr)?;
                let data = data[..phdr.p_filesz as usize].to_vec();
                let flags = RegionFlags {
                    read: phdr.p_flags & PF_R != 0,
                    write: phdr.p_flags & PF_W != 0,
                    execute: phdr.p_flags & PF_X != 0,
                };
                debug!(
                    "loadable region at 0x{:x}: 0x{:x} file bytes, 0x{:x} in memory, {:?}",
                    phdr.p_vaddr, phdr.p_filesz, phdr.p_memsz, flags
                );
                regions.push(Region {
                    load_address: phdr.p_vaddr,
                    file_size: phdr.p_filesz,
                    memory_size: phdr.p_memsz,
                    data,
                    flags,
                });
            }
            PT_NULL | PT_NOTE | PT_PHDR | PT_NUM | PT_GNU_STACK | PT_RISCV_ATTRIBUTES => {
                warn!("ignoring program header of type 0x{:x}", phdr.p_type);
            }
            other => return Err(ElfLoadError::UnsupportedSegment(other)),
        }
    }
    Ok(regions)
}

fn resolve_compliance_symbols(
    file: &ElfBytes<AnyEndian>,
) -> Result<ComplianceSymbols, ElfLoadError> {
    let (symtab, strtab) = file
        .symbol_table()?
        .ok_or(ElfLoadError::MissingSymbolTable)?;

    let mut begin_signature = None;
    let mut end_signature = None;
    let mut tohost = None;
    for symbol in symtab.iter() {
        let Ok(name) = strtab.get(symbol.st_name as usize) else {
            continue;
        };
        match name {
            "begin_signature" => begin_signature = Some(symbol.st_value),
            "end_signature" => end_signature = Some(symbol.st_value),
            "tohost" => tohost = Some(symbol.st_value),
            _ => {}
        }
    }

    Ok(ComplianceSymbols {
        begin_signature: begin_signature.ok_or(ElfLoadError::MissingSymbol("begin_signature"))?,
        end_signature: end_signature.ok_or(ElfLoadError::MissingSymbol("end_signature"))?,
        tohost: tohost.ok_or(ElfLoadError::MissingSymbol("tohost"))?,
    })
}

/// Read an ELF file from disk and produce the executable image.
///
/// When riscof is set the compliance symbols must all resolve;
/// otherwise the symbol table is not consulted at all.
pub fn load_executable(path: &Path, riscof: bool) -> Result<Executable, ElfLoadError> {
    let file_data = std::fs::read(path)?;
    let file = ElfBytes::<AnyEndian>::minimal_parse(&file_data)?;
    check_header(&file)?;

    let regions = read_regions(&file)?;
    let entry = file.ehdr.e_entry;
    let symbols = if riscof {
        let symbols = resolve_compliance_symbols(&file)?;
        info!(
            "compliance symbols: begin_signature=0x{:x} end_signature=0x{:x} tohost=0x{:x}",
            symbols.begin_signature, symbols.end_signature, symbols.tohost
        );
        Some(symbols)
    } else {
        None
    };
    info!(
        "loaded {} region(s) from {}, entry 0x{:x}",
        regions.len(),
        path.display(),
        entry
    );

    Ok(Executable {
        regions,
        entry,
        symbols,
    })
}
