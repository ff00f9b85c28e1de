//! Base integer instruction set (RV64I)
//!
//! One function per instruction family. Each computes the complete
//! [`StepEffect`] of the instruction from the read-only context;
//! nothing here mutates hart or memory state.
//!
//! Every register writeback is guarded by a branch on the
//! destination being x0, so a discarded write never appears in the
//! trace as if it happened.

use crate::decode::Kind;
use crate::exec::{Ctx, ExecutionError, StepEffect, Trace};
use crate::memory::Wordsize;
use crate::registers::XRegister;

/// Load upper immediate
///
/// Load the U-immediate into bits 31:12 of dest, filling the low 12
/// bits with zeros and sign-extending into the upper half.
pub(super) fn lui(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let value = ctx.instr.imm_u() as u64;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("lui {dest}, 0x{:x}", ctx.instr.0 >> 12),
        notes: vec![format!("setting {dest} to 0x{value:x}")],
    });
    Ok(effect)
}

/// Add upper immediate to pc
pub(super) fn auipc(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let offset = ctx.instr.imm_u() as u64;
    let value = ctx.pc.wrapping_add(offset);
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("auipc {dest}, 0x{:x}", ctx.instr.0 >> 12),
        notes: vec![format!(
            "setting {dest} to pc<0x{:x}> + 0x{offset:x} = 0x{value:x}",
            ctx.pc
        )],
    });
    Ok(effect)
}

/// Jump and link
pub(super) fn jal(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let offset = ctx.instr.imm_j();
    let target = ctx.pc.wrapping_add(offset as u64);
    let link = ctx.pc.wrapping_add(4);
    let mut effect = ctx.advance();
    effect.next_pc = target;
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, link));
    }
    effect.trace = ctx.trace(|| {
        let mut notes = Vec::new();
        if dest != XRegister::Zero {
            notes.push(format!(
                "setting {dest} to pc<0x{:x}> + 0x4 = 0x{link:x}",
                ctx.pc
            ));
        }
        notes.push(format!(
            "jumping to pc<0x{:x}> + 0x{:x} = 0x{target:x}",
            ctx.pc, offset as u64
        ));
        Trace {
            head: format!("jal {dest}, 0x{:x}", offset as u64),
            notes,
        }
    });
    Ok(effect)
}

/// Jump and link register
///
/// The link address is computed before the branch target so that
/// the common rd == rs1 case behaves per the ISA.
pub(super) fn jalr(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let base = ctx.instr.rs1();
    let offset = ctx.instr.imm_i();
    let link = ctx.pc.wrapping_add(4);
    let target = ctx.x(base).wrapping_add(offset as u64) & !1;
    let mut effect = ctx.advance();
    effect.next_pc = target;
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, link));
    }
    effect.trace = ctx.trace(|| {
        let mut notes = Vec::new();
        if dest != XRegister::Zero {
            notes.push(format!(
                "setting {dest} to pc<0x{:x}> + 0x4 = 0x{link:x}",
                ctx.pc
            ));
        }
        notes.push(format!(
            "jumping to ({} + 0x{:x}) & ~1 = 0x{target:x}",
            ctx.reg_note(base),
            offset as u64
        ));
        Trace {
            head: format!("jalr {dest}, 0x{:x}({base})", offset as u64),
            notes,
        }
    });
    Ok(effect)
}

fn branch_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Beq => "beq",
        Kind::Bne => "bne",
        Kind::Blt => "blt",
        Kind::Bge => "bge",
        Kind::Bltu => "bltu",
        _ => "bgeu",
    }
}

/// Conditional branches; signed comparison for blt/bge, unsigned
/// for bltu/bgeu
pub(super) fn branch(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let src1 = ctx.instr.rs1();
    let src2 = ctx.instr.rs2();
    let offset = ctx.instr.imm_b();
    let v1 = ctx.x(src1);
    let v2 = ctx.x(src2);
    let (taken, relation) = match kind {
        Kind::Beq => (v1 == v2, "=="),
        Kind::Bne => (v1 != v2, "!="),
        Kind::Blt => ((v1 as i64) < (v2 as i64), "<"),
        Kind::Bge => ((v1 as i64) >= (v2 as i64), ">="),
        Kind::Bltu => (v1 < v2, "<u"),
        _ => (v1 >= v2, ">=u"),
    };
    let target = ctx.pc.wrapping_add(offset as u64);
    let mut effect = ctx.advance();
    if taken {
        effect.next_pc = target;
    }
    effect.trace = ctx.trace(|| {
        let note = if taken {
            format!(
                "{} {relation} {} is true, jumping to pc<0x{:x}> + 0x{:x} = 0x{target:x}",
                ctx.reg_note(src1),
                ctx.reg_note(src2),
                ctx.pc,
                offset as u64
            )
        } else {
            format!(
                "{} {relation} {} is false, not branching",
                ctx.reg_note(src1),
                ctx.reg_note(src2)
            )
        };
        Trace {
            head: format!(
                "{} {src1}, {src2}, 0x{:x}",
                branch_mnemonic(kind),
                offset as u64
            ),
            notes: vec![note],
        }
    });
    Ok(effect)
}

fn load_parts(kind: Kind) -> (&'static str, Wordsize, bool) {
    match kind {
        Kind::Lb => ("lb", Wordsize::Byte, true),
        Kind::Lh => ("lh", Wordsize::Halfword, true),
        Kind::Lw => ("lw", Wordsize::Word, true),
        Kind::Ld => ("ld", Wordsize::Doubleword, false),
        Kind::Lbu => ("lbu", Wordsize::Byte, false),
        Kind::Lhu => ("lhu", Wordsize::Halfword, false),
        _ => ("lwu", Wordsize::Word, false),
    }
}

/// Loads; signed variants sign-extend the loaded word to 64 bits
pub(super) fn load(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let base = ctx.instr.rs1();
    let offset = ctx.instr.imm_i();
    let addr = ctx.x(base).wrapping_add(offset as u64);
    let (mnemonic, word_size, sign_extend) = load_parts(kind);
    let raw = ctx.hart.load_memory(ctx.memory, addr, word_size)?;
    let value = if sign_extend {
        match word_size {
            Wordsize::Byte => raw as i8 as i64 as u64,
            Wordsize::Halfword => raw as i16 as i64 as u64,
            _ => raw as i32 as i64 as u64,
        }
    } else {
        raw
    };
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("{mnemonic} {dest}, 0x{:x}({base})", offset as u64),
        notes: vec![
            format!(
                "loading {} byte(s) from {} + 0x{:x} = 0x{addr:x}",
                word_size.width(),
                ctx.reg_note(base),
                offset as u64
            ),
            format!("setting {dest} to 0x{value:x}"),
        ],
    });
    Ok(effect)
}

fn store_parts(kind: Kind) -> (&'static str, Wordsize) {
    match kind {
        Kind::Sb => ("sb", Wordsize::Byte),
        Kind::Sh => ("sh", Wordsize::Halfword),
        Kind::Sw => ("sw", Wordsize::Word),
        _ => ("sd", Wordsize::Doubleword),
    }
}

/// Stores. In compliance mode a store that resolves to the tohost
/// word halts the machine instead of writing.
pub(super) fn store(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let src = ctx.instr.rs2();
    let base = ctx.instr.rs1();
    let offset = ctx.instr.imm_s();
    let addr = ctx.x(base).wrapping_add(offset as u64);
    let (mnemonic, word_size) = store_parts(kind);
    let mut effect = ctx.advance();
    ctx.store_effect(&mut effect, addr, ctx.x(src), word_size)?;
    let halted = effect.halt;
    effect.trace = ctx.trace(|| {
        let note = if halted {
            format!("store to tohost<0x{addr:x}>, halting")
        } else {
            format!(
                "storing {} ({} byte(s)) to {} + 0x{:x} = 0x{addr:x}",
                ctx.reg_note(src),
                word_size.width(),
                ctx.reg_note(base),
                offset as u64
            )
        };
        Trace {
            head: format!("{mnemonic} {src}, 0x{:x}({base})", offset as u64),
            notes: vec![note],
        }
    });
    Ok(effect)
}

fn reg_imm_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Addi => "addi",
        Kind::Slti => "slti",
        Kind::Sltiu => "sltiu",
        Kind::Xori => "xori",
        Kind::Ori => "ori",
        Kind::Andi => "andi",
        Kind::Slli => "slli",
        Kind::Srli => "srli",
        _ => "srai",
    }
}

/// Register-immediate operations, including the RV64 6-bit shift
/// immediates
pub(super) fn reg_imm(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let src = ctx.instr.rs1();
    let imm = ctx.instr.imm_i();
    let shamt = ctx.instr.shamt();
    let v = ctx.x(src);
    let (value, operand) = match kind {
        Kind::Addi => (v.wrapping_add(imm as u64), imm as u64),
        Kind::Slti => (u64::from((v as i64) < imm), imm as u64),
        Kind::Sltiu => (u64::from(v < imm as u64), imm as u64),
        Kind::Xori => (v ^ imm as u64, imm as u64),
        Kind::Ori => (v | imm as u64, imm as u64),
        Kind::Andi => (v & imm as u64, imm as u64),
        Kind::Slli => (v << shamt, u64::from(shamt)),
        Kind::Srli => (v >> shamt, u64::from(shamt)),
        _ => (((v as i64) >> shamt) as u64, u64::from(shamt)),
    };
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = reg_imm_mnemonic(kind);
        Trace {
            head: format!("{mnemonic} {dest}, {src}, 0x{operand:x}"),
            notes: vec![format!(
                "setting {dest} to {mnemonic}({}, 0x{operand:x}) = 0x{value:x}",
                ctx.reg_note(src)
            )],
        }
    });
    Ok(effect)
}

fn reg_reg_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Add => "add",
        Kind::Sub => "sub",
        Kind::Sll => "sll",
        Kind::Slt => "slt",
        Kind::Sltu => "sltu",
        Kind::Xor => "xor",
        Kind::Srl => "srl",
        Kind::Sra => "sra",
        Kind::Or => "or",
        _ => "and",
    }
}

/// Register-register operations; shifts use the low 6 bits of the
/// second operand
pub(super) fn reg_reg(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let src1 = ctx.instr.rs1();
    let src2 = ctx.instr.rs2();
    let v1 = ctx.x(src1);
    let v2 = ctx.x(src2);
    let value = match kind {
        Kind::Add => v1.wrapping_add(v2),
        Kind::Sub => v1.wrapping_sub(v2),
        Kind::Sll => v1 << (v2 & 0x3f),
        Kind::Slt => u64::from((v1 as i64) < (v2 as i64)),
        Kind::Sltu => u64::from(v1 < v2),
        Kind::Xor => v1 ^ v2,
        Kind::Srl => v1 >> (v2 & 0x3f),
        Kind::Sra => ((v1 as i64) >> (v2 & 0x3f)) as u64,
        Kind::Or => v1 | v2,
        _ => v1 & v2,
    };
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = reg_reg_mnemonic(kind);
        Trace {
            head: format!("{mnemonic} {dest}, {src1}, {src2}"),
            notes: vec![format!(
                "setting {dest} to {mnemonic}({}, {}) = 0x{value:x}",
                ctx.reg_note(src1),
                ctx.reg_note(src2)
            )],
        }
    });
    Ok(effect)
}

fn reg_imm_32_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Addiw => "addiw",
        Kind::Slliw => "slliw",
        Kind::Srliw => "srliw",
        _ => "sraiw",
    }
}

/// Word-width register-immediate operations: operate on the low 32
/// bits and sign-extend the 32-bit result
pub(super) fn reg_imm_32(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let src = ctx.instr.rs1();
    // The word-width shifts only have a 5-bit shift amount; bit 5
    // set is an illegal encoding
    if kind != Kind::Addiw && ctx.instr.shamt_word_bit5() {
        return Err(ExecutionError::IllegalInstruction {
            pc: ctx.pc,
            encoding: ctx.instr.0,
        });
    }
    let imm = ctx.instr.imm_i();
    let shamt = ctx.instr.shamt_word();
    let v = ctx.x(src) as u32;
    let (narrow, operand) = match kind {
        Kind::Addiw => (v.wrapping_add(imm as u32), imm as u64),
        Kind::Slliw => (v << shamt, u64::from(shamt)),
        Kind::Srliw => (v >> shamt, u64::from(shamt)),
        _ => (((v as i32) >> shamt) as u32, u64::from(shamt)),
    };
    let value = narrow as i32 as i64 as u64;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = reg_imm_32_mnemonic(kind);
        Trace {
            head: format!("{mnemonic} {dest}, {src}, 0x{operand:x}"),
            notes: vec![format!(
                "setting {dest} to {mnemonic}({}, 0x{operand:x}) = 0x{value:x}",
                ctx.reg_note(src)
            )],
        }
    });
    Ok(effect)
}

fn reg_reg_32_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Addw => "addw",
        Kind::Subw => "subw",
        Kind::Sllw => "sllw",
        Kind::Srlw => "srlw",
        _ => "sraw",
    }
}

/// Word-width register-register operations; shifts use the low 5
/// bits of the second operand
pub(super) fn reg_reg_32(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let src1 = ctx.instr.rs1();
    let src2 = ctx.instr.rs2();
    let v1 = ctx.x(src1) as u32;
    let v2 = ctx.x(src2);
    let narrow = match kind {
        Kind::Addw => v1.wrapping_add(v2 as u32),
        Kind::Subw => v1.wrapping_sub(v2 as u32),
        Kind::Sllw => v1 << (v2 & 0x1f),
        Kind::Srlw => v1 >> (v2 & 0x1f),
        _ => ((v1 as i32) >> (v2 & 0x1f)) as u32,
    };
    let value = narrow as i32 as i64 as u64;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = reg_reg_32_mnemonic(kind);
        Trace {
            head: format!("{mnemonic} {dest}, {src1}, {src2}"),
            notes: vec![format!(
                "setting {dest} to {mnemonic}({}, {}) = 0x{value:x}",
                ctx.reg_note(src1),
                ctx.reg_note(src2)
            )],
        }
    });
    Ok(effect)
}

/// FENCE and FENCE.I act as a full fence relative to host memory.
/// Nothing is cached, so FENCE.I needs no extra invalidation.
pub(super) fn fence(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let mut effect = ctx.advance();
    effect.fence = true;
    effect.trace = ctx.trace(|| Trace {
        head: match kind {
            Kind::Fence => "fence".to_string(),
            _ => "fence.i".to_string(),
        },
        notes: vec!["full host memory fence".to_string()],
    });
    Ok(effect)
}

/// ECALL raises the environment-call exception for the current
/// privilege level
pub(super) fn ecall(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    Err(ExecutionError::EnvironmentCall {
        pc: ctx.pc,
        privilege: ctx.hart.privilege_level,
    })
}

/// EBREAK raises the breakpoint exception, which the outer loop may
/// treat as a debugger stop rather than a fatal error
pub(super) fn ebreak(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    Err(ExecutionError::Breakpoint { pc: ctx.pc })
}
