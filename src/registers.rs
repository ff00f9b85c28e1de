//! Integer register names
//!
//! The 32 integer registers of RV64 are referred to throughout by
//! their ABI names (table 25.1 of the unprivileged spec), which is
//! also how the tracer prints them.

use std::fmt;

/// An integer register, named per the standard calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRegister {
    Zero,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
}

/// All registers in index order, so that X_REGISTERS[n] is xn
pub const X_REGISTERS: [XRegister; 32] = [
    XRegister::Zero,
    XRegister::Ra,
    XRegister::Sp,
    XRegister::Gp,
    XRegister::Tp,
    XRegister::T0,
    XRegister::T1,
    XRegister::T2,
    XRegister::S0,
    XRegister::S1,
    XRegister::A0,
    XRegister::A1,
    XRegister::A2,
    XRegister::A3,
    XRegister::A4,
    XRegister::A5,
    XRegister::A6,
    XRegister::A7,
    XRegister::S2,
    XRegister::S3,
    XRegister::S4,
    XRegister::S5,
    XRegister::S6,
    XRegister::S7,
    XRegister::S8,
    XRegister::S9,
    XRegister::S10,
    XRegister::S11,
    XRegister::T3,
    XRegister::T4,
    XRegister::T5,
    XRegister::T6,
];

impl XRegister {
    /// Map a 5-bit register field to its register. Only the low five
    /// bits of the index are used, so any u8 maps to some register.
    pub fn from_index(index: u8) -> Self {
        X_REGISTERS[usize::from(index & 0x1f)]
    }

    /// The integer index n of this register xn
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Ra => "ra",
            Self::Sp => "sp",
            Self::Gp => "gp",
            Self::Tp => "tp",
            Self::T0 => "t0",
            Self::T1 => "t1",
            Self::T2 => "t2",
            Self::S0 => "s0",
            Self::S1 => "s1",
            Self::A0 => "a0",
            Self::A1 => "a1",
            Self::A2 => "a2",
            Self::A3 => "a3",
            Self::A4 => "a4",
            Self::A5 => "a5",
            Self::A6 => "a6",
            Self::A7 => "a7",
            Self::S2 => "s2",
            Self::S3 => "s3",
            Self::S4 => "s4",
            Self::S5 => "s5",
            Self::S6 => "s6",
            Self::S7 => "s7",
            Self::S8 => "s8",
            Self::S9 => "s9",
            Self::S10 => "s10",
            Self::S11 => "s11",
            Self::T3 => "t3",
            Self::T4 => "t4",
            Self::T5 => "t5",
            Self::T6 => "t6",
        }
    }
}

impl fmt::Display for XRegister {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
