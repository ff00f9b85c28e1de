//! Control and status registers
//!
//! "RISC-V defines a separate address space of 4096 Control and
//! Status registers associated with each hart" (privileged spec,
//! chapter 2). The CSR address itself encodes access rules: bits
//! [9:8] give the lowest privilege level allowed to touch the
//! register, and bits [11:10] equal to 0b11 mark it read-only.
//!
//! The recognised set of this core is small: the user-mode cycle
//! counter and mhartid, both read-only projections over hart state.
//! Zicsr instructions naming any other address raise the
//! unknown-CSR condition in the executor.

use crate::hart::{Hart, PrivilegeLevel};
use crate::utils::extract_field;

/// User-mode cycle counter
pub const CSR_CYCLE: u16 = 0xc00;

/// Machine-mode hart id
pub const CSR_MHARTID: u16 = 0xf14;

/// The CSRs this core recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Csr {
    Cycle,
    Mhartid,
}

/// The lowest privilege level allowed to access the CSR, from bits
/// [9:8] of its address
pub fn lowest_privilege_level(csr: u16) -> PrivilegeLevel {
    match extract_field(csr, 9, 8) {
        0b00 => PrivilegeLevel::User,
        0b01 => PrivilegeLevel::Supervisor,
        // 0b10 is reserved (hypervisor); treat as machine-only
        _ => PrivilegeLevel::Machine,
    }
}

/// Whether bits [11:10] of the address mark the CSR read-only
pub fn is_read_only(csr: u16) -> bool {
    extract_field(csr, 11, 10) == 0b11
}

/// A hart at the given level may read the CSR
pub fn can_read(csr: u16, level: PrivilegeLevel) -> bool {
    level >= lowest_privilege_level(csr)
}

/// A hart at the given level may write the CSR
pub fn can_write(csr: u16, level: PrivilegeLevel) -> bool {
    can_read(csr, level) && !is_read_only(csr)
}

impl Csr {
    /// Look up a CSR address in the recognised set
    pub fn from_number(csr: u16) -> Option<Self> {
        match csr {
            CSR_CYCLE => Some(Self::Cycle),
            CSR_MHARTID => Some(Self::Mhartid),
            _ => None,
        }
    }

    pub fn number(self) -> u16 {
        match self {
            Self::Cycle => CSR_CYCLE,
            Self::Mhartid => CSR_MHARTID,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Mhartid => "mhartid",
        }
    }

    /// Read the CSR's live projection over the hart state
    pub fn read(self, hart: &Hart) -> u64 {
        match self {
            Self::Cycle => hart.cycle,
            Self::Mhartid => hart.hart_id(),
        }
    }

    /// Write the CSR. Both recognised CSRs are read-only, so this
    /// is a no-op; the executor has already checked permissions.
    pub fn write(self, _hart: &mut Hart, _value: u64) {
        match self {
            Self::Cycle | Self::Mhartid => {}
        }
    }
}
