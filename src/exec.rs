//! Instruction execution
//!
//! The executor drives a hart through fetch, decode and execute.
//! Execution of one instruction is split into two halves:
//!
//! * [`preview`] computes the complete effect of the instruction at
//!   the current program counter — register writeback, next program
//!   counter, an optional store, an optional CSR write — without
//!   mutating any state, and (when observed) the trace block that
//!   describes the computation.
//! * [`apply`] commits a previously-computed effect and retires the
//!   instruction by incrementing the cycle counter.
//!
//! [`step`] composes the two; the REPL's whatif command calls
//! [`preview`] alone, so its trace output is identical to a real
//! step by construction.
//!
//! Errors do not retire: a step that returns an error leaves the
//! hart and memory exactly as they were.

pub mod rv64a;
pub mod rv64c;
pub mod rv64i;
pub mod rv64m;
pub mod zicsr;

use std::io::Write;

use thiserror::Error;

use crate::decode::{decode, Kind};
use crate::fields::Instruction;
use crate::hart::{AddressTranslationMode, Hart, PrivilegeLevel};
use crate::memory::{Memory, Wordsize};
use crate::registers::XRegister;

/// Architectural exceptions, with the cause codes used by mcause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    InstructionAddressMisaligned,
    InstructionAccessFault,
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreAddressMisaligned,
    StoreAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
}

impl Exception {
    /// The exception code for the mcause register
    pub fn cause(&self) -> u64 {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreAddressMisaligned => 6,
            Self::StoreAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
        }
    }
}

/// Error conditions raised while executing one instruction
///
/// Full trap delegation (redirecting the guest program counter and
/// updating mcause/mtval) is not implemented; every condition is
/// returned up the call chain to the outer loop instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("instruction fetch at 0x{addr:x} is outside memory")]
    FetchOutOfBounds { addr: u64 },
    #[error("load from 0x{addr:x} is outside memory")]
    LoadOutOfBounds { addr: u64 },
    #[error("store to 0x{addr:x} is outside memory")]
    StoreOutOfBounds { addr: u64 },
    #[error("instruction 0x{encoding:08x} at 0x{pc:x} is not implemented")]
    UnimplementedInstruction { pc: u64, encoding: u32 },
    #[error("illegal instruction 0x{encoding:08x} at 0x{pc:x}")]
    IllegalInstruction { pc: u64, encoding: u32 },
    #[error("unknown CSR 0x{csr:03x} at 0x{pc:x}")]
    UnknownCsr { pc: u64, csr: u16 },
    #[error("breakpoint at 0x{pc:x}")]
    Breakpoint { pc: u64 },
    #[error("environment call from {privilege} mode at 0x{pc:x}")]
    EnvironmentCall { pc: u64, privilege: PrivilegeLevel },
    #[error("{} address translation is not implemented (virtual address 0x{addr:x})", .mode.name())]
    UnimplementedTranslation {
        mode: AddressTranslationMode,
        addr: u64,
    },
}

impl ExecutionError {
    /// The architectural exception this condition raises when it is
    /// not treated as fatal
    pub fn exception(&self) -> Exception {
        match self {
            Self::FetchOutOfBounds { .. } => Exception::InstructionAccessFault,
            Self::LoadOutOfBounds { .. } => Exception::LoadAccessFault,
            Self::StoreOutOfBounds { .. } => Exception::StoreAccessFault,
            Self::UnimplementedInstruction { .. } => Exception::IllegalInstruction,
            Self::IllegalInstruction { .. } => Exception::IllegalInstruction,
            Self::UnknownCsr { .. } => Exception::IllegalInstruction,
            Self::Breakpoint { .. } => Exception::Breakpoint,
            Self::EnvironmentCall { privilege, .. } => match privilege {
                PrivilegeLevel::User => Exception::EnvironmentCallFromUMode,
                PrivilegeLevel::Supervisor => Exception::EnvironmentCallFromSMode,
                PrivilegeLevel::Machine => Exception::EnvironmentCallFromMMode,
            },
            // Translation is not modelled; surfaces as an access fault
            Self::UnimplementedTranslation { .. } => Exception::LoadAccessFault,
        }
    }

    /// The 64-bit side-channel carried with the exception: the
    /// faulting address or the offending encoding
    pub fn value(&self) -> u64 {
        match self {
            Self::FetchOutOfBounds { addr }
            | Self::LoadOutOfBounds { addr }
            | Self::StoreOutOfBounds { addr }
            | Self::UnimplementedTranslation { addr, .. } => *addr,
            Self::UnimplementedInstruction { encoding, .. }
            | Self::IllegalInstruction { encoding, .. } => u64::from(*encoding),
            Self::UnknownCsr { csr, .. } => u64::from(*csr),
            Self::Breakpoint { pc } | Self::EnvironmentCall { pc, .. } => *pc,
        }
    }
}

/// What the outer loop should do after a successful step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// The compliance-mode tohost trap fired
    Halt,
}

/// Why [`run`] stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Halted,
    Breakpoint { addr: u64 },
}

/// Knobs threaded through every step
#[derive(Debug, Clone, Copy)]
pub struct ExecOptions {
    /// Emit a `pc: <16-hex>` line before each traced instruction
    pub always_print_pc: bool,
    /// Report an unrecognised CSR address as the unknown-CSR
    /// condition rather than folding it into illegal-instruction
    pub unrecognised_csr_is_fatal: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            always_print_pc: false,
            unrecognised_csr_is_fatal: true,
        }
    }
}

/// Where trace output goes; all formatting is skipped when silent
pub enum Observer<'a> {
    Silent,
    Trace(&'a mut dyn Write),
}

impl Observer<'_> {
    pub fn observing(&self) -> bool {
        matches!(self, Self::Trace(_))
    }

    fn emit(&mut self, effect: &StepEffect) {
        if let Self::Trace(writer) = self {
            if let Some(line) = &effect.pc_line {
                let _ = writeln!(writer, "{line}");
            }
            if let Some(trace) = &effect.trace {
                let _ = writeln!(writer, "{}", trace.head);
                for note in &trace.notes {
                    let _ = writeln!(writer, "    {note}");
                }
            }
        }
    }
}

/// The trace block for one instruction: the mnemonic line and the
/// indented prose describing the computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub head: String,
    pub notes: Vec<String>,
}

/// A pending store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryWrite {
    pub addr: u64,
    pub value: u64,
    pub word_size: Wordsize,
}

/// What an instruction does to the per-hart LR reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReservationEffect {
    #[default]
    Keep,
    Acquire(u64),
    Clear,
}

/// The complete effect of one instruction, computed by [`preview`]
/// and committed by [`apply`]
#[derive(Debug)]
pub struct StepEffect {
    pub next_pc: u64,
    pub reg_write: Option<(XRegister, u64)>,
    pub store: Option<MemoryWrite>,
    pub csr_write: Option<(crate::csr::Csr, u64)>,
    pub reservation: ReservationEffect,
    /// Issue a full host memory fence on commit (FENCE/FENCE_I)
    pub fence: bool,
    /// The compliance-mode tohost trap fired; commit retires the
    /// instruction but applies nothing else
    pub halt: bool,
    pub pc_line: Option<String>,
    pub trace: Option<Trace>,
}

/// Everything an instruction body may consult while computing its
/// effect. Immutable: preview never writes through this.
pub struct Ctx<'a> {
    pub hart: &'a Hart,
    pub memory: &'a Memory,
    pub tohost: Option<u64>,
    pub options: &'a ExecOptions,
    pub observing: bool,
    pub instr: Instruction,
    pub pc: u64,
    /// Encoding length in bytes: 2 for compressed, 4 otherwise
    pub len: u64,
}

impl Ctx<'_> {
    /// An effect that just falls through to the next instruction
    pub(crate) fn advance(&self) -> StepEffect {
        StepEffect {
            next_pc: self.pc.wrapping_add(self.len),
            reg_write: None,
            store: None,
            csr_write: None,
            reservation: ReservationEffect::Keep,
            fence: false,
            halt: false,
            pc_line: None,
            trace: None,
        }
    }

    pub(crate) fn x(&self, register: XRegister) -> u64 {
        self.hart.x(register)
    }

    /// `name<0xvalue>` operand rendering used throughout the trace
    /// prose
    pub(crate) fn reg_note(&self, register: XRegister) -> String {
        format!("{register}<0x{:x}>", self.x(register))
    }

    /// Build the trace block only when someone is watching
    pub(crate) fn trace(&self, build: impl FnOnce() -> Trace) -> Option<Trace> {
        self.observing.then(build)
    }

    /// Fill in the store half of an effect, halting instead when the
    /// address is the compliance-mode tohost word. Bounds are probed
    /// here so that apply cannot fail after a clean preview.
    pub(crate) fn store_effect(
        &self,
        effect: &mut StepEffect,
        addr: u64,
        value: u64,
        word_size: Wordsize,
    ) -> Result<(), ExecutionError> {
        if self.tohost == Some(addr) {
            effect.halt = true;
            return Ok(());
        }
        let physical = self.hart.translate(addr)?;
        self.memory
            .check_access(physical, word_size)
            .map_err(|_| ExecutionError::StoreOutOfBounds { addr: physical })?;
        effect.store = Some(MemoryWrite {
            addr,
            value,
            word_size,
        });
        Ok(())
    }
}

/// Fetch the instruction at the program counter.
///
/// A 32-bit load is attempted first. If it runs off the end of
/// memory, a 16-bit load is attempted instead; if that halfword is
/// the prefix of a 32-bit encoding (low bits 0b11) the fetch is a
/// genuine out-of-bounds access, otherwise it is a complete
/// compressed instruction.
fn fetch(hart: &Hart, memory: &Memory) -> Result<(Instruction, u64), ExecutionError> {
    let physical = hart.translate(hart.pc)?;
    match memory.read(physical, Wordsize::Word) {
        Ok(word) => {
            let word = word as u32;
            if word & 0b11 == 0b11 {
                Ok((Instruction(word), 4))
            } else {
                Ok((Instruction(word & 0xffff), 2))
            }
        }
        Err(_) => match memory.read(physical, Wordsize::Halfword) {
            Ok(half) if half & 0b11 != 0b11 => Ok((Instruction(half as u32), 2)),
            _ => Err(ExecutionError::FetchOutOfBounds { addr: hart.pc }),
        },
    }
}

fn dispatch(kind: Kind, ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    use Kind::*;
    match kind {
        Lui => rv64i::lui(ctx),
        Auipc => rv64i::auipc(ctx),
        Jal => rv64i::jal(ctx),
        Jalr => rv64i::jalr(ctx),
        Beq | Bne | Blt | Bge | Bltu | Bgeu => rv64i::branch(ctx, kind),
        Lb | Lh | Lw | Ld | Lbu | Lhu | Lwu => rv64i::load(ctx, kind),
        Sb | Sh | Sw | Sd => rv64i::store(ctx, kind),
        Addi | Slti | Sltiu | Xori | Ori | Andi | Slli | Srli | Srai => {
            rv64i::reg_imm(ctx, kind)
        }
        Add | Sub | Sll | Slt | Sltu | Xor | Srl | Sra | Or | And => rv64i::reg_reg(ctx, kind),
        Addiw | Slliw | Srliw | Sraiw => rv64i::reg_imm_32(ctx, kind),
        Addw | Subw | Sllw | Srlw | Sraw => rv64i::reg_reg_32(ctx, kind),
        Fence | FenceI => rv64i::fence(ctx, kind),
        Ecall => rv64i::ecall(ctx),
        Ebreak => rv64i::ebreak(ctx),
        Csrrw | Csrrs | Csrrc | Csrrwi | Csrrsi | Csrrci => zicsr::csr_op(ctx, kind),
        Mul | Mulh | Mulhsu | Mulhu | Div | Divu | Rem | Remu | Mulw | Divw | Divuw | Remw
        | Remuw => rv64m::mul_div(ctx, kind),
        LrW | LrD => rv64a::lr(ctx, kind),
        ScW | ScD => rv64a::sc(ctx, kind),
        AmoswapW | AmoaddW | AmoxorW | AmoandW | AmoorW | AmominW | AmomaxW | AmominuW
        | AmomaxuW | AmoswapD | AmoaddD | AmoxorD | AmoandD | AmoorD | AmominD | AmomaxD
        | AmominuD | AmomaxuD => rv64a::amo(ctx, kind),
        CAddi4spn => rv64c::addi4spn(ctx),
        CLw | CLd => rv64c::load(ctx, kind),
        CSw | CSd => rv64c::store(ctx, kind),
        CNop => rv64c::nop(ctx),
        CAddi => rv64c::addi(ctx),
        CAddiw => rv64c::addiw(ctx),
        CLi => rv64c::li(ctx),
        CAddi16sp => rv64c::addi16sp(ctx),
        CLui => rv64c::lui(ctx),
        CSrli | CSrai | CAndi => rv64c::alu_imm(ctx, kind),
        CSub | CXor | COr | CAnd | CSubw | CAddw => rv64c::alu(ctx, kind),
        CJ => rv64c::j(ctx),
        CBeqz | CBnez => rv64c::branch(ctx, kind),
        CSlli => rv64c::slli(ctx),
        CLwsp | CLdsp => rv64c::load_sp(ctx, kind),
        CSwsp | CSdsp => rv64c::store_sp(ctx, kind),
        CJr => rv64c::jr(ctx),
        CJalr => rv64c::jalr(ctx),
        CMv => rv64c::mv(ctx),
        CAdd => rv64c::add(ctx),
        CEbreak => rv64i::ebreak(ctx),
        Illegal => Err(ExecutionError::IllegalInstruction {
            pc: ctx.pc,
            encoding: ctx.instr.0,
        }),
        // The floating-point extensions decode but the hart carries
        // no floating-point state, so none of them can retire
        _ => Err(ExecutionError::UnimplementedInstruction {
            pc: ctx.pc,
            encoding: ctx.instr.0,
        }),
    }
}

/// Compute the effect of the instruction at the program counter
/// without changing any state
pub fn preview(
    hart: &Hart,
    memory: &Memory,
    tohost: Option<u64>,
    options: &ExecOptions,
    observing: bool,
) -> Result<StepEffect, ExecutionError> {
    let (instr, len) = fetch(hart, memory)?;
    let kind = decode(instr);
    let ctx = Ctx {
        hart,
        memory,
        tohost,
        options,
        observing,
        instr,
        pc: hart.pc,
        len,
    };
    let mut effect = dispatch(kind, &ctx)?;
    if observing && options.always_print_pc {
        effect.pc_line = Some(format!("pc: {:016x}", hart.pc));
    }
    Ok(effect)
}

/// Commit an effect computed by [`preview`] on the same state and
/// retire the instruction.
///
/// The store was bounds-probed during preview, so this cannot fail
/// unless the effect is applied to different state than it was
/// computed on.
pub fn apply(
    hart: &mut Hart,
    memory: &mut Memory,
    effect: &StepEffect,
) -> Result<(), ExecutionError> {
    hart.cycle = hart.cycle.wrapping_add(1);
    if effect.halt {
        return Ok(());
    }
    if let Some((register, value)) = effect.reg_write {
        hart.set_x(register, value);
    }
    if let Some(write) = &effect.store {
        hart.store_memory(memory, write.addr, write.value, write.word_size)?;
        if hart.reservation == Some(write.addr) {
            hart.reservation = None;
        }
    }
    if let Some((csr, value)) = effect.csr_write {
        csr.write(hart, value);
    }
    match effect.reservation {
        ReservationEffect::Keep => {}
        ReservationEffect::Acquire(addr) => hart.reservation = Some(addr),
        ReservationEffect::Clear => hart.reservation = None,
    }
    if effect.fence {
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
    hart.pc = effect.next_pc;
    Ok(())
}

/// Execute one instruction: fetch, decode, trace, commit
pub fn step(
    hart: &mut Hart,
    memory: &mut Memory,
    tohost: Option<u64>,
    observer: &mut Observer,
    options: &ExecOptions,
) -> Result<Control, ExecutionError> {
    let effect = preview(hart, memory, tohost, options, observer.observing())?;
    observer.emit(&effect);
    let halt = effect.halt;
    apply(hart, memory, &effect)?;
    Ok(if halt { Control::Halt } else { Control::Continue })
}

/// Compute and trace the instruction at the program counter without
/// committing anything (the REPL's whatif command)
pub fn whatif(
    hart: &Hart,
    memory: &Memory,
    tohost: Option<u64>,
    observer: &mut Observer,
    options: &ExecOptions,
) -> Result<(), ExecutionError> {
    let effect = preview(hart, memory, tohost, options, observer.observing())?;
    observer.emit(&effect);
    Ok(())
}

/// Step repeatedly until the tohost trap fires, the breakpoint is
/// reached, or an error propagates out
pub fn run(
    hart: &mut Hart,
    memory: &mut Memory,
    tohost: Option<u64>,
    breakpoint: Option<u64>,
    observer: &mut Observer,
    options: &ExecOptions,
) -> Result<RunOutcome, ExecutionError> {
    loop {
        if step(hart, memory, tohost, observer, options)? == Control::Halt {
            return Ok(RunOutcome::Halted);
        }
        if breakpoint == Some(hart.pc) {
            return Ok(RunOutcome::Breakpoint { addr: hart.pc });
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::csr::CSR_MHARTID;
    use crate::memory::Memory;
    use crate::opcodes::*;

    // Instruction encoders for building test programs

    fn rtype(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn itype(imm: i32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
    }

    fn stype(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32 & 0xfff;
        ((imm >> 5) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | ((imm & 0x1f) << 7)
            | OP_STORE
    }

    fn btype(imm: i32, rs2: u32, rs1: u32, funct3: u32) -> u32 {
        let imm = imm as u32 & 0x1fff;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (funct3 << 12)
            | (((imm >> 1) & 0xf) << 8)
            | (((imm >> 11) & 1) << 7)
            | OP_BRANCH
    }

    fn utype(imm20: u32, rd: u32, opcode: u32) -> u32 {
        (imm20 << 12) | (rd << 7) | opcode
    }

    fn jtype(imm: i32, rd: u32) -> u32 {
        let imm = imm as u32 & 0x1f_ffff;
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3ff) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xff) << 12)
            | (rd << 7)
            | OP_JAL
    }

    fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        itype(imm, rs1, FUNCT3_ADDI, rd, OP_IMM)
    }

    fn reg(n: u32) -> XRegister {
        XRegister::from_index(n as u8)
    }

    /// A fresh hart and memory with the program placed at address 0
    fn machine(words: &[u32]) -> (Hart, Memory) {
        let mut memory = Memory::new(0x10000);
        for (n, word) in words.iter().enumerate() {
            memory
                .write(4 * n as u64, u64::from(*word), Wordsize::Word)
                .unwrap();
        }
        (Hart::new(0), memory)
    }

    /// A fresh hart and memory with 16-bit encodings at address 0
    fn machine_compressed(halfwords: &[u16]) -> (Hart, Memory) {
        let mut memory = Memory::new(0x10000);
        for (n, half) in halfwords.iter().enumerate() {
            memory
                .write(2 * n as u64, u64::from(*half), Wordsize::Halfword)
                .unwrap();
        }
        (Hart::new(0), memory)
    }

    fn step_silent(hart: &mut Hart, memory: &mut Memory) -> Result<Control, ExecutionError> {
        step(
            hart,
            memory,
            None,
            &mut Observer::Silent,
            &ExecOptions::default(),
        )
    }

    #[test]
    fn check_lui() {
        let (mut hart, mut memory) = machine(&[utype(53, 2, OP_LUI)]);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(2)), 53 << 12);
        assert_eq!(hart.pc, 4);
        assert_eq!(hart.cycle, 1);
    }

    #[test]
    fn check_lui_sign_extends() {
        let (mut hart, mut memory) = machine(&[utype(0xfffff, 2, OP_LUI)]);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(2)), (-4096i64) as u64);
    }

    #[test]
    fn check_auipc() {
        let (mut hart, mut memory) = machine(&[0, 0, utype(53, 4, OP_AUIPC)]);
        hart.pc = 8;
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 8 + (53 << 12));
        assert_eq!(hart.pc, 12);
    }

    #[test]
    fn check_jal() {
        let (mut hart, mut memory) = machine(&[0, 0, jtype(-4, 4)]);
        hart.pc = 8;
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 12);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_jalr() {
        let (mut hart, mut memory) = machine(&[itype(-4, 6, 0b000, 4, OP_JALR)]);
        hart.set_x(reg(6), 21);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 4);
        // Target has bit 0 cleared: (21 - 4) & ~1
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_jalr_link_computed_before_target() {
        // jalr x6, 0(x6): the link value must not clobber the base
        let (mut hart, mut memory) = machine(&[itype(0, 6, 0b000, 6, OP_JALR)]);
        hart.set_x(reg(6), 0x100);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 0x100);
        assert_eq!(hart.x(reg(6)), 4);
    }

    #[test]
    fn check_beq_taken_and_not_taken() {
        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BEQ)]);
        hart.set_x(reg(1), 2);
        hart.set_x(reg(2), 2);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 16);

        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BEQ)]);
        hart.set_x(reg(1), 1);
        hart.set_x(reg(2), 2);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_blt_is_signed_64_bit() {
        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BLT)]);
        hart.set_x(reg(1), (-1i64) as u64);
        hart.set_x(reg(2), 10);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_bltu_is_unsigned() {
        // -1 as unsigned is the largest value, so the branch is not
        // taken
        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BLTU)]);
        hart.set_x(reg(1), (-1i64) as u64);
        hart.set_x(reg(2), 10);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_bge_and_bgeu() {
        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BGE)]);
        hart.set_x(reg(1), 10);
        hart.set_x(reg(2), (-1i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 16);

        let (mut hart, mut memory) = machine(&[btype(16, 2, 1, FUNCT3_BGEU)]);
        hart.set_x(reg(1), 10);
        hart.set_x(reg(2), (-1i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_bne() {
        let (mut hart, mut memory) = machine(&[btype(-8, 2, 1, FUNCT3_BNE)]);
        hart.pc = 0;
        hart.set_x(reg(1), 1);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, (-8i64) as u64);
    }

    #[test]
    fn check_lb_sign_extends_to_64_bits() {
        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_B, 1, OP_LOAD)]);
        hart.set_x(reg(2), 4);
        memory.write(20, 0xff, Wordsize::Byte).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), u64::MAX);
    }

    #[test]
    fn check_lbu_zero_extends() {
        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_BU, 1, OP_LOAD)]);
        hart.set_x(reg(2), 4);
        memory.write(20, 0xff, Wordsize::Byte).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xff);
    }

    #[test]
    fn check_lh_lhu() {
        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_H, 1, OP_LOAD)]);
        hart.set_x(reg(2), 5);
        memory.write(21, 0xff92, Wordsize::Halfword).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xffff_ffff_ffff_ff92);

        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_HU, 1, OP_LOAD)]);
        hart.set_x(reg(2), 5);
        memory.write(21, 0xff92, Wordsize::Halfword).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xff92);
    }

    #[test]
    fn check_lw_sign_extends_lwu_does_not() {
        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_W, 1, OP_LOAD)]);
        hart.set_x(reg(2), 4);
        memory.write(20, 0x8000_0000, Wordsize::Word).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xffff_ffff_8000_0000);

        let (mut hart, mut memory) = machine(&[itype(16, 2, FUNCT3_WU, 1, OP_LOAD)]);
        hart.set_x(reg(2), 4);
        memory.write(20, 0x8000_0000, Wordsize::Word).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0x8000_0000);
    }

    #[test]
    fn check_ld_sd_round_trip() {
        let value = 0x1122_3344_5566_7788u64;
        let (mut hart, mut memory) = machine(&[
            stype(-16, 1, 2, FUNCT3_D),
            itype(-16, 2, FUNCT3_D, 3, OP_LOAD),
        ]);
        hart.set_x(reg(1), value);
        hart.set_x(reg(2), 0x120);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x110, Wordsize::Doubleword).unwrap(), value);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(3)), value);
    }

    #[test]
    fn check_sb_sh_sw() {
        let (mut hart, mut memory) = machine(&[
            stype(0, 1, 2, FUNCT3_B),
            stype(2, 1, 2, FUNCT3_H),
            stype(6, 1, 2, FUNCT3_W),
        ]);
        hart.set_x(reg(1), 0x1234_5678_9abc_def0);
        hart.set_x(reg(2), 0x200);
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x200, Wordsize::Byte).unwrap(), 0xf0);
        assert_eq!(memory.read(0x202, Wordsize::Halfword).unwrap(), 0xdef0);
        assert_eq!(memory.read(0x206, Wordsize::Word).unwrap(), 0x9abc_def0);
    }

    #[test]
    fn check_addi_wraps() {
        let (mut hart, mut memory) = machine(&[addi(1, 2, -23)]);
        hart.set_x(reg(2), 22);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), u64::MAX);
    }

    #[test]
    fn check_slti_sltiu() {
        let (mut hart, mut memory) = machine(&[itype(5, 2, FUNCT3_SLTI, 1, OP_IMM)]);
        hart.set_x(reg(2), (-24i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 1);

        // Unsigned comparison sees -24 as enormous
        let (mut hart, mut memory) = machine(&[itype(5, 2, FUNCT3_SLTIU, 1, OP_IMM)]);
        hart.set_x(reg(2), (-24i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0);
    }

    #[test]
    fn check_logic_immediates() {
        let (mut hart, mut memory) = machine(&[
            itype(0xff0u32 as i32 - 0x1000, 2, FUNCT3_ANDI, 1, OP_IMM),
            itype(0x0f0, 2, FUNCT3_ORI, 3, OP_IMM),
            itype(0x0f0, 2, FUNCT3_XORI, 4, OP_IMM),
        ]);
        hart.set_x(reg(2), 0x00ff_ff00);
        step_silent(&mut hart, &mut memory).unwrap();
        // andi with sign-extended 0xff0
        assert_eq!(hart.x(reg(1)), 0x00ff_ff00);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(3)), 0x00ff_fff0);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0x00ff_f0f0);
    }

    #[test]
    fn check_shift_immediates_use_six_bits() {
        let (mut hart, mut memory) = machine(&[
            itype(40, 2, FUNCT3_SLLI, 1, OP_IMM),
            itype(40, 2, FUNCT3_SRLI_SRAI, 3, OP_IMM),
            itype(40 | 0x400, 2, FUNCT3_SRLI_SRAI, 4, OP_IMM),
        ]);
        hart.set_x(reg(2), 0x8000_0000_0000_00ff);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xff << 40);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(3)), 0x80_0000);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0xffff_ffff_ff80_0000);
    }

    #[test]
    fn check_add_sub_wrap() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_BASE, 3, 2, FUNCT3_ADD_SUB, 1, OP),
            rtype(FUNCT7_SUB_SRA, 3, 2, FUNCT3_ADD_SUB, 4, OP),
        ]);
        hart.set_x(reg(2), u64::MAX - 1);
        hart.set_x(reg(3), 5);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 3);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), u64::MAX - 6);
    }

    #[test]
    fn check_reg_reg_shifts_use_low_six_bits() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_BASE, 3, 2, FUNCT3_SLL, 1, OP),
            rtype(FUNCT7_SUB_SRA, 3, 2, FUNCT3_SRL_SRA, 4, OP),
        ]);
        hart.set_x(reg(2), 0x8000_0000_0000_0001);
        // Shift amount 65 & 0x3f = 1
        hart.set_x(reg(3), 65);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 2);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0xc000_0000_0000_0000);
    }

    #[test]
    fn check_addiw_sign_extends() {
        let (mut hart, mut memory) = machine(&[itype(1, 2, FUNCT3_ADDI, 1, OP_IMM_32)]);
        hart.set_x(reg(2), 0x7fff_ffff);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn check_slliw_sraiw() {
        let (mut hart, mut memory) = machine(&[
            itype(4, 2, FUNCT3_SLLI, 1, OP_IMM_32),
            itype(4 | 0x400, 2, FUNCT3_SRLI_SRAI, 3, OP_IMM_32),
        ]);
        hart.set_x(reg(2), 0x0800_0000);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xffff_ffff_8000_0000);
        hart.set_x(reg(2), 0xf000_0000);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(3)), 0xffff_ffff_ff00_0000);
    }

    #[test]
    fn check_word_shift_with_bit5_is_illegal() {
        let (mut hart, mut memory) = machine(&[itype(33, 2, FUNCT3_SLLI, 1, OP_IMM_32)]);
        let result = step_silent(&mut hart, &mut memory);
        assert!(matches!(
            result,
            Err(ExecutionError::IllegalInstruction { pc: 0, .. })
        ));
        assert_eq!(hart.cycle, 0);
    }

    #[test]
    fn check_addw_subw() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_BASE, 3, 2, FUNCT3_ADD_SUB, 1, OP_32),
            rtype(FUNCT7_SUB_SRA, 3, 2, FUNCT3_ADD_SUB, 4, OP_32),
        ]);
        hart.set_x(reg(2), 0x7fff_ffff);
        hart.set_x(reg(3), 1);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 0xffff_ffff_8000_0000);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0x7fff_fffe);
    }

    #[test]
    fn check_sllw_uses_low_five_bits() {
        let (mut hart, mut memory) = machine(&[rtype(FUNCT7_BASE, 3, 2, FUNCT3_SLL, 1, OP_32)]);
        hart.set_x(reg(2), 1);
        hart.set_x(reg(3), 33);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 2);
    }

    #[test]
    fn check_mul_and_high_multiplies() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_MUL, 1, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_MULH, 4, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_MULHU, 5, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_MULHSU, 6, OP),
        ]);
        hart.set_x(reg(2), (-1i64) as u64);
        hart.set_x(reg(3), (-1i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), 1);
        // (-1) * (-1) has a zero high half
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0);
        // Unsigned: (2^64-1)^2 high half is 2^64 - 2
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), u64::MAX - 1);
        // Signed x unsigned: -1 * (2^64-1) = -(2^64-1), high half -1
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(6)), u64::MAX);
    }

    #[test]
    fn check_division_by_zero() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_DIV, 1, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_REM, 4, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_DIVU, 5, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_REMU, 6, OP),
        ]);
        hart.set_x(reg(2), 42);
        hart.set_x(reg(3), 0);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), u64::MAX);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 42);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), u64::MAX);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(6)), 42);
    }

    #[test]
    fn check_signed_overflow_division() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_DIV, 1, OP),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_REM, 4, OP),
        ]);
        hart.set_x(reg(2), i64::MIN as u64);
        hart.set_x(reg(3), (-1i64) as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), i64::MIN as u64);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0);
    }

    #[test]
    fn check_word_division() {
        let (mut hart, mut memory) = machine(&[
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_DIV, 1, OP_32),
            rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_DIVU, 4, OP_32),
        ]);
        hart.set_x(reg(2), (-8i64) as u64);
        hart.set_x(reg(3), 2);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(1)), (-4i64) as u64);
        // divuw sees the low word 0xfffffff8 and sign-extends the
        // 32-bit quotient
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(4)), 0x7fff_fffc);
    }

    #[test]
    fn check_mulw() {
        let (mut hart, mut memory) = machine(&[rtype(FUNCT7_MULDIV, 3, 2, FUNCT3_MUL, 1, OP_32)]);
        hart.set_x(reg(2), 0x10000);
        hart.set_x(reg(3), 0x10000);
        step_silent(&mut hart, &mut memory).unwrap();
        // Low 32 bits of 2^32 are zero
        assert_eq!(hart.x(reg(1)), 0);
    }

    #[test]
    fn check_lr_sc_success() {
        let lr = rtype(FUNCT5_LR << 2, 0, 6, FUNCT3_D, 5, OP_AMO);
        let sc = rtype(FUNCT5_SC << 2, 7, 6, FUNCT3_D, 5, OP_AMO);
        let (mut hart, mut memory) = machine(&[lr, sc]);
        hart.set_x(reg(6), 0x200);
        hart.set_x(reg(7), 0xabcd);
        memory.write(0x200, 0x1111, Wordsize::Doubleword).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), 0x1111);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), 0);
        assert_eq!(memory.read(0x200, Wordsize::Doubleword).unwrap(), 0xabcd);
    }

    #[test]
    fn check_sc_without_reservation_fails() {
        let sc = rtype(FUNCT5_SC << 2, 7, 6, FUNCT3_D, 5, OP_AMO);
        let (mut hart, mut memory) = machine(&[sc]);
        hart.set_x(reg(6), 0x200);
        hart.set_x(reg(7), 0xabcd);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), 1);
        assert_eq!(memory.read(0x200, Wordsize::Doubleword).unwrap(), 0);
    }

    #[test]
    fn check_store_drops_reservation() {
        let lr = rtype(FUNCT5_LR << 2, 0, 6, FUNCT3_D, 5, OP_AMO);
        let sd = stype(0, 7, 6, FUNCT3_D);
        let sc = rtype(FUNCT5_SC << 2, 7, 6, FUNCT3_D, 5, OP_AMO);
        let (mut hart, mut memory) = machine(&[lr, sd, sc]);
        hart.set_x(reg(6), 0x200);
        hart.set_x(reg(7), 0xabcd);
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), 1);
    }

    #[test]
    fn check_amoadd_w_sign_extends_old_value() {
        let amo = rtype(FUNCT5_AMOADD << 2, 7, 6, FUNCT3_W, 5, OP_AMO);
        let (mut hart, mut memory) = machine(&[amo]);
        hart.set_x(reg(6), 0x200);
        hart.set_x(reg(7), 1);
        memory.write(0x200, 0x8000_0000, Wordsize::Word).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), 0xffff_ffff_8000_0000);
        assert_eq!(memory.read(0x200, Wordsize::Word).unwrap(), 0x8000_0001);
    }

    #[test]
    fn check_amoswap_and_amomax() {
        let swap = rtype(FUNCT5_AMOSWAP << 2, 7, 6, FUNCT3_D, 5, OP_AMO);
        let max = rtype(FUNCT5_AMOMAX << 2, 7, 6, FUNCT3_D, 8, OP_AMO);
        let (mut hart, mut memory) = machine(&[swap, max]);
        hart.set_x(reg(6), 0x200);
        hart.set_x(reg(7), 10);
        memory
            .write(0x200, (-5i64) as u64, Wordsize::Doubleword)
            .unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(5)), (-5i64) as u64);
        assert_eq!(memory.read(0x200, Wordsize::Doubleword).unwrap(), 10);
        // amomax(10, 10) = 10
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x200, Wordsize::Doubleword).unwrap(), 10);
    }

    #[test]
    fn check_fence_and_fence_i_retire() {
        let (mut hart, mut memory) = machine(&[0x0ff0_000f, 0x0000_100f]);
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 8);
        assert_eq!(hart.cycle, 2);
    }

    #[test]
    fn check_ecall_reports_privilege() {
        let (mut hart, mut memory) = machine(&[0x0000_0073]);
        let result = step_silent(&mut hart, &mut memory);
        assert_eq!(
            result,
            Err(ExecutionError::EnvironmentCall {
                pc: 0,
                privilege: PrivilegeLevel::Machine,
            })
        );
        assert_eq!(hart.cycle, 0);
        assert_eq!(hart.pc, 0);
    }

    #[test]
    fn check_ebreak_is_breakpoint() {
        let (mut hart, mut memory) = machine(&[0x0010_0073]);
        let result = step_silent(&mut hart, &mut memory);
        assert_eq!(result, Err(ExecutionError::Breakpoint { pc: 0 }));
        assert_eq!(result.unwrap_err().exception(), Exception::Breakpoint);
    }

    #[test]
    fn check_csrrw_mhartid_round_trip() {
        // csrrw a0, mhartid, zero on hart 7: a0 reads 7, the write
        // to the read-only CSR is silently discarded
        let csrrw = itype(CSR_MHARTID as i32, 0, FUNCT3_CSRRW, 10, OP_SYSTEM);
        let csrrs = itype(CSR_MHARTID as i32, 0, FUNCT3_CSRRS, 11, OP_SYSTEM);
        let mut memory = Memory::new(0x10000);
        memory.write(0, u64::from(csrrw), Wordsize::Word).unwrap();
        memory.write(4, u64::from(csrrs), Wordsize::Word).unwrap();
        let mut hart = Hart::new(7);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 7);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(11)), 7);
    }

    #[test]
    fn check_csr_cycle_reads_counter() {
        let nop = addi(0, 0, 0);
        let csrrs = itype(0xc00, 0, FUNCT3_CSRRS, 10, OP_SYSTEM);
        let (mut hart, mut memory) = machine(&[nop, nop, csrrs]);
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        // The read happens before this instruction retires
        assert_eq!(hart.x(reg(10)), 2);
        assert_eq!(hart.cycle, 3);
    }

    #[test]
    fn check_csrrwi_write_discarded_but_read_works() {
        let csrrwi = itype(CSR_MHARTID as i32, 0b101_01, FUNCT3_CSRRWI, 10, OP_SYSTEM);
        let mut memory = Memory::new(0x10000);
        memory.write(0, u64::from(csrrwi), Wordsize::Word).unwrap();
        let mut hart = Hart::new(3);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 3);
        assert_eq!(hart.hart_id(), 3);
    }

    #[test]
    fn check_unknown_csr() {
        let instr = itype(0x300, 1, FUNCT3_CSRRW, 10, OP_SYSTEM);
        let (mut hart, mut memory) = machine(&[instr]);
        let result = step_silent(&mut hart, &mut memory);
        assert_eq!(result, Err(ExecutionError::UnknownCsr { pc: 0, csr: 0x300 }));

        // With the knob off it degrades to illegal-instruction
        let (mut hart, mut memory) = machine(&[instr]);
        let options = ExecOptions {
            unrecognised_csr_is_fatal: false,
            ..Default::default()
        };
        let result = step(&mut hart, &mut memory, None, &mut Observer::Silent, &options);
        assert!(matches!(
            result,
            Err(ExecutionError::IllegalInstruction { .. })
        ));
    }

    #[test]
    fn check_csr_privilege_enforced() {
        let instr = itype(CSR_MHARTID as i32, 0, FUNCT3_CSRRS, 10, OP_SYSTEM);
        let (mut hart, mut memory) = machine(&[instr]);
        hart.privilege_level = PrivilegeLevel::User;
        let result = step_silent(&mut hart, &mut memory);
        assert!(matches!(
            result,
            Err(ExecutionError::IllegalInstruction { .. })
        ));
    }

    #[test]
    fn check_writes_to_x0_are_discarded() {
        let (mut hart, mut memory) = machine(&[addi(0, 2, 5)]);
        hart.set_x(reg(2), 10);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(0)), 0);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_illegal_instruction_all_ones() {
        let (mut hart, mut memory) = machine(&[0xffff_ffff]);
        let result = step_silent(&mut hart, &mut memory);
        assert_eq!(
            result,
            Err(ExecutionError::IllegalInstruction {
                pc: 0,
                encoding: 0xffff_ffff,
            })
        );
        assert_eq!(result.unwrap_err().value(), 0xffff_ffff);
    }

    #[test]
    fn check_unimplemented_float_instruction() {
        // fadd.s f1, f2, f3
        let (mut hart, mut memory) = machine(&[0x0031_00d3]);
        let result = step_silent(&mut hart, &mut memory);
        assert!(matches!(
            result,
            Err(ExecutionError::UnimplementedInstruction { pc: 0, .. })
        ));
        assert_eq!(
            result.unwrap_err().exception(),
            Exception::IllegalInstruction
        );
    }

    #[test]
    fn check_fetch_out_of_bounds() {
        let mut memory = Memory::new(0x10000);
        let mut hart = Hart::new(0);
        hart.pc = 0xffff_0000;
        let result = step_silent(&mut hart, &mut memory);
        assert_eq!(
            result,
            Err(ExecutionError::FetchOutOfBounds { addr: 0xffff_0000 })
        );
        assert_eq!(hart.cycle, 0);
        assert_eq!(
            result.unwrap_err().exception(),
            Exception::InstructionAccessFault
        );
    }

    #[test]
    fn check_fetch_compressed_at_end_of_memory() {
        // A word fetch at len-4 runs off the end (the bounds check
        // is addr + width >= len), but the halfword there is a
        // complete compressed instruction
        let mut memory = Memory::new(0x1000);
        let len = memory.size();
        // c.li x10, 1
        memory.write(len - 4, 0x4505, Wordsize::Halfword).unwrap();
        let mut hart = Hart::new(0);
        hart.pc = len - 4;
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 1);
        assert_eq!(hart.pc, len - 2);
    }

    #[test]
    fn check_fetch_wide_prefix_at_end_of_memory() {
        // The halfword at len-4 has low bits 0b11, so it is the
        // prefix of a 32-bit instruction that cannot be fetched
        let mut memory = Memory::new(0x1000);
        let len = memory.size();
        memory.write(len - 4, 0x0013, Wordsize::Halfword).unwrap();
        let mut hart = Hart::new(0);
        hart.pc = len - 4;
        assert_eq!(
            step_silent(&mut hart, &mut memory),
            Err(ExecutionError::FetchOutOfBounds { addr: len - 4 })
        );
    }

    #[test]
    fn check_compressed_addi_li_lui() {
        let (mut hart, mut memory) = machine_compressed(&[0x147d, 0x4505, 0x6785]);
        hart.set_x(reg(8), 10);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 9);
        assert_eq!(hart.pc, 2);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 1);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(15)), 0x1000);
        assert_eq!(hart.cycle, 3);
    }

    #[test]
    fn check_compressed_addi16sp_addi4spn() {
        let (mut hart, mut memory) = machine_compressed(&[0x713d, 0x0800]);
        hart.set_x(reg(2), 0x1000);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(2)), 0x1000 - 32);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 0x1000 - 32 + 16);
    }

    #[test]
    fn check_compressed_loads_and_stores() {
        // c.sw x10, 4(x11); c.lw x10, 4(x11); c.sd x8, 8(x9);
        // c.ld x8, 8(x9)
        let (mut hart, mut memory) = machine_compressed(&[0xc1c8, 0x41c8, 0xe480, 0x6480]);
        hart.set_x(reg(10), 0x8765_4321);
        hart.set_x(reg(11), 0x300);
        hart.set_x(reg(8), 0x1111_2222_3333_4444);
        hart.set_x(reg(9), 0x400);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x304, Wordsize::Word).unwrap(), 0x8765_4321);
        step_silent(&mut hart, &mut memory).unwrap();
        // c.lw sign-extends
        assert_eq!(hart.x(reg(10)), 0xffff_ffff_8765_4321);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(
            memory.read(0x408, Wordsize::Doubleword).unwrap(),
            0x1111_2222_3333_4444
        );
        hart.set_x(reg(8), 0);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 0x1111_2222_3333_4444);
    }

    #[test]
    fn check_compressed_jumps() {
        // c.j 10
        let (mut hart, mut memory) = machine_compressed(&[0xa029]);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 10);

        // c.jr x1
        let (mut hart, mut memory) = machine_compressed(&[0x8082]);
        hart.set_x(reg(1), 0x101);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 0x100);

        // c.jalr x1 links pc + 2 into ra
        let (mut hart, mut memory) = machine_compressed(&[0x9082]);
        hart.set_x(reg(1), 0x200);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 0x200);
        assert_eq!(hart.x(reg(1)), 2);
    }

    #[test]
    fn check_compressed_branches() {
        // c.beqz x8, 16 taken
        let (mut hart, mut memory) = machine_compressed(&[0xc841]);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 16);

        // not taken
        let (mut hart, mut memory) = machine_compressed(&[0xc841]);
        hart.set_x(reg(8), 1);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.pc, 2);
    }

    #[test]
    fn check_compressed_mv_add_slli() {
        // c.mv x10, x11; c.add x10, x11; c.slli x10, 63
        let (mut hart, mut memory) = machine_compressed(&[0x852e, 0x952e, 0x157e]);
        hart.set_x(reg(11), 3);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 3);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 6);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 0);
    }

    #[test]
    fn check_compressed_alu() {
        // c.sub x8, x10; c.xor x8, x10; c.addw x8, x10
        let (mut hart, mut memory) = machine_compressed(&[0x8c09, 0x8c29, 0x9c29]);
        hart.set_x(reg(8), 10);
        hart.set_x(reg(10), 4);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 6);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 2);
        hart.set_x(reg(8), 0x7fff_ffff);
        hart.set_x(reg(10), 1);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(8)), 0xffff_ffff_8000_0000);
    }

    #[test]
    fn check_compressed_sp_loads_and_stores() {
        // c.swsp x10, 12(sp); c.lwsp x10, 8(sp); c.sdsp x10,
        // 24(sp); c.ldsp x10, 16(sp)
        let (mut hart, mut memory) = machine_compressed(&[0xc62a, 0x4522, 0xec2a, 0x6542]);
        hart.set_x(reg(2), 0x500);
        hart.set_x(reg(10), 0xaabb_ccdd);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x50c, Wordsize::Word).unwrap(), 0xaabb_ccdd);
        memory.write(0x508, 0x42, Wordsize::Word).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 0x42);
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(memory.read(0x518, Wordsize::Doubleword).unwrap(), 0x42);
        memory.write(0x510, 0x99, Wordsize::Doubleword).unwrap();
        step_silent(&mut hart, &mut memory).unwrap();
        assert_eq!(hart.x(reg(10)), 0x99);
    }

    #[test]
    fn check_compressed_ebreak() {
        let (mut hart, mut memory) = machine_compressed(&[0x9002]);
        assert_eq!(
            step_silent(&mut hart, &mut memory),
            Err(ExecutionError::Breakpoint { pc: 0 })
        );
    }

    #[test]
    fn check_store_to_tohost_halts_before_store() {
        // li a0, 7; li a1, 0x800; sd a0, 0(a1) with tohost = 0x800
        let program = [
            addi(10, 0, 7),
            addi(11, 0, 0x7f8),
            stype(0, 10, 11, FUNCT3_D),
        ];
        let (mut hart, mut memory) = machine(&program);
        let options = ExecOptions::default();
        let mut observer = Observer::Silent;
        let tohost = Some(0x7f8);
        assert_eq!(
            step(&mut hart, &mut memory, tohost, &mut observer, &options).unwrap(),
            Control::Continue
        );
        assert_eq!(
            step(&mut hart, &mut memory, tohost, &mut observer, &options).unwrap(),
            Control::Continue
        );
        assert_eq!(
            step(&mut hart, &mut memory, tohost, &mut observer, &options).unwrap(),
            Control::Halt
        );
        assert_eq!(hart.cycle, 3);
        // The store must not have taken effect
        assert_eq!(memory.read(0x7f8, Wordsize::Doubleword).unwrap(), 0);
    }

    #[test]
    fn check_run_until_halt() {
        let program = [
            addi(10, 0, 7),
            addi(11, 0, 0x7f8),
            stype(0, 10, 11, FUNCT3_D),
        ];
        let (mut hart, mut memory) = machine(&program);
        let outcome = run(
            &mut hart,
            &mut memory,
            Some(0x7f8),
            None,
            &mut Observer::Silent,
            &ExecOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Halted);
        assert_eq!(hart.cycle, 3);
    }

    #[test]
    fn check_run_stops_at_breakpoint() {
        let program = [addi(10, 0, 1), addi(10, 10, 1), addi(10, 10, 1)];
        let (mut hart, mut memory) = machine(&program);
        let outcome = run(
            &mut hart,
            &mut memory,
            None,
            Some(8),
            &mut Observer::Silent,
            &ExecOptions::default(),
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Breakpoint { addr: 8 });
        assert_eq!(hart.cycle, 2);
        assert_eq!(hart.x(reg(10)), 2);
    }

    #[test]
    fn check_whatif_mutates_nothing() {
        let (mut hart, mut memory) = machine(&[addi(1, 2, 5)]);
        hart.set_x(reg(2), 10);
        let mut out = Vec::new();
        whatif(
            &hart,
            &memory,
            None,
            &mut Observer::Trace(&mut out),
            &ExecOptions::default(),
        )
        .unwrap();
        assert!(!out.is_empty());
        assert_eq!(hart.pc, 0);
        assert_eq!(hart.cycle, 0);
        assert_eq!(hart.x(reg(1)), 0);
        let _ = step_silent(&mut hart, &mut memory);
        assert_eq!(hart.x(reg(1)), 15);
    }

    #[test]
    fn check_whatif_trace_matches_step_trace() {
        let (mut hart, mut memory) = machine(&[addi(1, 2, 5)]);
        hart.set_x(reg(2), 10);
        let options = ExecOptions {
            always_print_pc: true,
            ..Default::default()
        };
        let mut preview_out = Vec::new();
        whatif(
            &hart,
            &memory,
            None,
            &mut Observer::Trace(&mut preview_out),
            &options,
        )
        .unwrap();
        let mut step_out = Vec::new();
        step(
            &mut hart,
            &mut memory,
            None,
            &mut Observer::Trace(&mut step_out),
            &options,
        )
        .unwrap();
        assert_eq!(preview_out, step_out);
    }

    #[test]
    fn check_trace_output_shape() {
        let (mut hart, mut memory) = machine(&[addi(10, 0, 42)]);
        let options = ExecOptions {
            always_print_pc: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        step(
            &mut hart,
            &mut memory,
            None,
            &mut Observer::Trace(&mut out),
            &options,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("pc: 0000000000000000"));
        assert_eq!(lines.next(), Some("addi a0, zero, 0x2a"));
        assert_eq!(
            lines.next(),
            Some("    setting a0 to addi(zero<0x0>, 0x2a) = 0x2a")
        );
    }

    #[test]
    fn check_error_value_side_channel() {
        assert_eq!(
            ExecutionError::LoadOutOfBounds { addr: 0x1234 }.value(),
            0x1234
        );
        assert_eq!(
            ExecutionError::UnknownCsr { pc: 0, csr: 0x300 }.value(),
            0x300
        );
        assert_eq!(
            ExecutionError::EnvironmentCall {
                pc: 0x88,
                privilege: PrivilegeLevel::Machine,
            }
            .exception()
            .cause(),
            11
        );
    }

    #[test]
    fn check_load_out_of_bounds_reports_address() {
        let (mut hart, mut memory) = machine(&[itype(0, 2, FUNCT3_D, 1, OP_LOAD)]);
        hart.set_x(reg(2), 0xdead_0000);
        assert_eq!(
            step_silent(&mut hart, &mut memory),
            Err(ExecutionError::LoadOutOfBounds { addr: 0xdead_0000 })
        );
        assert_eq!(hart.cycle, 0);
    }

    #[test]
    fn check_store_out_of_bounds_reports_address() {
        let (mut hart, mut memory) = machine(&[stype(0, 1, 2, FUNCT3_W)]);
        hart.set_x(reg(2), 0xdead_0000);
        assert_eq!(
            step_silent(&mut hart, &mut memory),
            Err(ExecutionError::StoreOutOfBounds { addr: 0xdead_0000 })
        );
    }
}
