//! Compliance signature output
//!
//! After a compliance run halts on the tohost write, the memory
//! range [begin_signature, end_signature) is dumped as 32-bit
//! little-endian words, one word per line as 8 lowercase hex
//! digits. The riscof framework compares this file against the
//! reference signature bit for bit.

use std::io::Write;

use itertools::Itertools;
use thiserror::Error;

use crate::memory::{Memory, MemoryError};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature range [0x{begin:x}, 0x{end:x}) is not word-aligned")]
    MisalignedRange { begin: u64, end: u64 },
    #[error("signature range is outside memory: {0}")]
    OutOfRange(#[from] MemoryError),
    #[error("could not write signature: {0}")]
    Io(#[from] std::io::Error),
}

/// Dump [begin, end) as one 8-digit hex word per line. The range
/// must be 4-byte aligned and a multiple of 4 bytes long.
pub fn write_signature<W: Write>(
    memory: &Memory,
    begin: u64,
    end: u64,
    out: &mut W,
) -> Result<(), SignatureError> {
    if begin % 4 != 0 || end % 4 != 0 || begin > end {
        return Err(SignatureError::MisalignedRange { begin, end });
    }
    let bytes = memory.range(begin, end)?;
    for (b0, b1, b2, b3) in bytes.iter().tuples() {
        let word = u32::from_le_bytes([*b0, *b1, *b2, *b3]);
        writeln!(out, "{word:08x}")?;
    }
    Ok(())
}
