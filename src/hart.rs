//! RISC-V hardware thread
//!
//! A [`Hart`] is one set of architectural register state: program
//! counter, the 32 integer registers, the retired-instruction
//! counter, a privilege level and an address-translation mode. It
//! owns no memory; the executor borrows a hart and the machine's
//! memory together for the duration of a step.
//!
//! Memory accesses made on behalf of executing instructions go
//! through [`Hart::load_memory`] and [`Hart::store_memory`], which
//! translate the virtual address first. Only Bare translation is
//! modelled; entering Sv39 or Sv48 surfaces as an execution error.

use std::fmt;

use crate::exec::ExecutionError;
use crate::memory::{Memory, MemoryError, Wordsize};
use crate::registers::XRegister;

/// Privilege levels, ordered so that comparison means authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrivilegeLevel {
    User,
    Supervisor,
    Machine,
}

impl PrivilegeLevel {
    /// The two-bit encoding used in CSR addresses and mstatus
    pub fn encoding(self) -> u8 {
        match self {
            Self::User => 0b00,
            Self::Supervisor => 0b01,
            Self::Machine => 0b11,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Supervisor => "supervisor",
            Self::Machine => "machine",
        }
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Virtual-address translation schemes of the satp register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTranslationMode {
    Bare,
    Sv39,
    Sv48,
}

impl AddressTranslationMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bare => "bare",
            Self::Sv39 => "sv39",
            Self::Sv48 => "sv48",
        }
    }
}

/// One hardware thread's architectural state
#[derive(Debug)]
pub struct Hart {
    /// Program counter
    pub pc: u64,
    /// Integer registers; index 0 is never written
    registers: [u64; 32],
    /// Retired-instruction counter
    pub cycle: u64,
    /// Immutable identity, readable through the mhartid CSR
    hart_id: u64,
    /// Current privilege level; reset state is machine mode
    pub privilege_level: PrivilegeLevel,
    /// Current address-translation mode; reset state is Bare
    pub translation_mode: AddressTranslationMode,
    /// LR reservation, held until the next SC or conflicting store
    pub(crate) reservation: Option<u64>,
}

impl Hart {
    pub fn new(hart_id: u64) -> Self {
        Self {
            pc: 0,
            registers: [0; 32],
            cycle: 0,
            hart_id,
            privilege_level: PrivilegeLevel::Machine,
            translation_mode: AddressTranslationMode::Bare,
            reservation: None,
        }
    }

    pub fn hart_id(&self) -> u64 {
        self.hart_id
    }

    /// Read the register xn. Register zero always reads as zero.
    pub fn x(&self, register: XRegister) -> u64 {
        if register == XRegister::Zero {
            0
        } else {
            self.registers[register.index()]
        }
    }

    /// Write the register xn. Writes to register zero are discarded.
    pub fn set_x(&mut self, register: XRegister, value: u64) {
        if register != XRegister::Zero {
            self.registers[register.index()] = value;
        }
    }

    /// Return the hart to its power-on state with the given entry
    /// point, keeping its identity
    pub fn reset(&mut self, entry: u64) {
        self.pc = entry;
        self.registers = [0; 32];
        self.cycle = 0;
        self.privilege_level = PrivilegeLevel::Machine;
        self.translation_mode = AddressTranslationMode::Bare;
        self.reservation = None;
    }

    /// Translate a virtual address to a physical one
    pub fn translate(&self, virtual_address: u64) -> Result<u64, ExecutionError> {
        match self.translation_mode {
            AddressTranslationMode::Bare => Ok(virtual_address),
            mode => Err(ExecutionError::UnimplementedTranslation {
                mode,
                addr: virtual_address,
            }),
        }
    }

    /// Load a word from the virtual address
    pub fn load_memory(
        &self,
        memory: &Memory,
        virtual_address: u64,
        word_size: Wordsize,
    ) -> Result<u64, ExecutionError> {
        let physical_address = self.translate(virtual_address)?;
        memory
            .read(physical_address, word_size)
            .map_err(|error| match error {
                MemoryError::ExecutionOutOfBounds { addr, .. } => {
                    ExecutionError::LoadOutOfBounds { addr }
                }
                MemoryError::OutOfBoundsWrite { addr, .. } => {
                    ExecutionError::LoadOutOfBounds { addr }
                }
            })
    }

    /// Store a word to the virtual address
    pub fn store_memory(
        &self,
        memory: &mut Memory,
        virtual_address: u64,
        value: u64,
        word_size: Wordsize,
    ) -> Result<(), ExecutionError> {
        let physical_address = self.translate(virtual_address)?;
        memory
            .write(physical_address, value, word_size)
            .map_err(|error| match error {
                MemoryError::ExecutionOutOfBounds { addr, .. } => {
                    ExecutionError::StoreOutOfBounds { addr }
                }
                MemoryError::OutOfBoundsWrite { addr, .. } => {
                    ExecutionError::StoreOutOfBounds { addr }
                }
            })
    }
}
