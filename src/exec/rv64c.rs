//! Compressed instructions (RV64C)
//!
//! Each compressed form carries the semantics of its 32-bit
//! expansion (chapter 16 of the unprivileged spec) but advances the
//! program counter by two bytes. The bodies are written directly
//! against the compressed fields rather than re-encoding into the
//! wide form first.

use crate::decode::Kind;
use crate::exec::{Ctx, ExecutionError, StepEffect, Trace};
use crate::memory::Wordsize;
use crate::registers::XRegister;

/// C.ADDI4SPN: rd′ = sp + nzuimm
pub(super) fn addi4spn(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd_prime();
    let offset = ctx.instr.uimm_caddi4spn();
    let value = ctx.x(XRegister::Sp).wrapping_add(offset);
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.addi4spn {dest}, sp, 0x{offset:x}"),
        notes: vec![format!(
            "setting {dest} to {} + 0x{offset:x} = 0x{value:x}",
            ctx.reg_note(XRegister::Sp)
        )],
    });
    Ok(effect)
}

/// C.LW / C.LD
pub(super) fn load(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd_prime();
    let base = ctx.instr.c_rs1_prime();
    let (mnemonic, offset, word_size) = match kind {
        Kind::CLw => ("c.lw", ctx.instr.uimm_cw(), Wordsize::Word),
        _ => ("c.ld", ctx.instr.uimm_cd(), Wordsize::Doubleword),
    };
    let addr = ctx.x(base).wrapping_add(offset);
    let raw = ctx.hart.load_memory(ctx.memory, addr, word_size)?;
    let value = match word_size {
        Wordsize::Word => raw as i32 as i64 as u64,
        _ => raw,
    };
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("{mnemonic} {dest}, 0x{offset:x}({base})"),
        notes: vec![
            format!(
                "loading {} byte(s) from {} + 0x{offset:x} = 0x{addr:x}",
                word_size.width(),
                ctx.reg_note(base)
            ),
            format!("setting {dest} to 0x{value:x}"),
        ],
    });
    Ok(effect)
}

/// C.SW / C.SD
pub(super) fn store(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let src = ctx.instr.c_rs2_prime();
    let base = ctx.instr.c_rs1_prime();
    let (mnemonic, offset, word_size) = match kind {
        Kind::CSw => ("c.sw", ctx.instr.uimm_cw(), Wordsize::Word),
        _ => ("c.sd", ctx.instr.uimm_cd(), Wordsize::Doubleword),
    };
    let addr = ctx.x(base).wrapping_add(offset);
    let mut effect = ctx.advance();
    ctx.store_effect(&mut effect, addr, ctx.x(src), word_size)?;
    let halted = effect.halt;
    effect.trace = ctx.trace(|| {
        let note = if halted {
            format!("store to tohost<0x{addr:x}>, halting")
        } else {
            format!(
                "storing {} ({} byte(s)) to {} + 0x{offset:x} = 0x{addr:x}",
                ctx.reg_note(src),
                word_size.width(),
                ctx.reg_note(base)
            )
        };
        Trace {
            head: format!("{mnemonic} {src}, 0x{offset:x}({base})"),
            notes: vec![note],
        }
    });
    Ok(effect)
}

/// C.NOP
pub(super) fn nop(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let mut effect = ctx.advance();
    effect.trace = ctx.trace(|| Trace {
        head: "c.nop".to_string(),
        notes: Vec::new(),
    });
    Ok(effect)
}

/// C.ADDI: rd = rd + imm
pub(super) fn addi(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let imm = ctx.instr.imm_ci();
    let value = ctx.x(dest).wrapping_add(imm as u64);
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.addi {dest}, 0x{:x}", imm as u64),
        notes: vec![format!(
            "setting {dest} to {} + 0x{:x} = 0x{value:x}",
            ctx.reg_note(dest),
            imm as u64
        )],
    });
    Ok(effect)
}

/// C.ADDIW: rd = sext32(rd + imm)
pub(super) fn addiw(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let imm = ctx.instr.imm_ci();
    let value = (ctx.x(dest) as u32).wrapping_add(imm as u32) as i32 as i64 as u64;
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.addiw {dest}, 0x{:x}", imm as u64),
        notes: vec![format!(
            "setting {dest} to addiw({}, 0x{:x}) = 0x{value:x}",
            ctx.reg_note(dest),
            imm as u64
        )],
    });
    Ok(effect)
}

/// C.LI: rd = imm
pub(super) fn li(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let value = ctx.instr.imm_ci() as u64;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.li {dest}, 0x{value:x}"),
        notes: vec![format!("setting {dest} to 0x{value:x}")],
    });
    Ok(effect)
}

/// C.ADDI16SP: sp = sp + imm (scaled by 16)
pub(super) fn addi16sp(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let imm = ctx.instr.imm_caddi16sp();
    let value = ctx.x(XRegister::Sp).wrapping_add(imm as u64);
    let mut effect = ctx.advance();
    effect.reg_write = Some((XRegister::Sp, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.addi16sp sp, 0x{:x}", imm as u64),
        notes: vec![format!(
            "setting sp to {} + 0x{:x} = 0x{value:x}",
            ctx.reg_note(XRegister::Sp),
            imm as u64
        )],
    });
    Ok(effect)
}

/// C.LUI: rd = sext(imm << 12)
pub(super) fn lui(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let value = ctx.instr.imm_clui() as u64;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.lui {dest}, 0x{:x}", (value >> 12) & 0xfffff),
        notes: vec![format!("setting {dest} to 0x{value:x}")],
    });
    Ok(effect)
}

/// C.SRLI / C.SRAI / C.ANDI: rd′ op= operand
pub(super) fn alu_imm(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rs1_prime();
    let v = ctx.x(dest);
    let shamt = ctx.instr.c_shamt();
    let imm = ctx.instr.imm_ci();
    let (mnemonic, value, operand) = match kind {
        Kind::CSrli => ("c.srli", v >> shamt, u64::from(shamt)),
        Kind::CSrai => ("c.srai", ((v as i64) >> shamt) as u64, u64::from(shamt)),
        _ => ("c.andi", v & imm as u64, imm as u64),
    };
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("{mnemonic} {dest}, 0x{operand:x}"),
        notes: vec![format!(
            "setting {dest} to {mnemonic}({}, 0x{operand:x}) = 0x{value:x}",
            ctx.reg_note(dest)
        )],
    });
    Ok(effect)
}

/// C.SUB / C.XOR / C.OR / C.AND / C.SUBW / C.ADDW: rd′ op= rs2′
pub(super) fn alu(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rs1_prime();
    let src = ctx.instr.c_rs2_prime();
    let v1 = ctx.x(dest);
    let v2 = ctx.x(src);
    let (mnemonic, value) = match kind {
        Kind::CSub => ("c.sub", v1.wrapping_sub(v2)),
        Kind::CXor => ("c.xor", v1 ^ v2),
        Kind::COr => ("c.or", v1 | v2),
        Kind::CAnd => ("c.and", v1 & v2),
        Kind::CSubw => (
            "c.subw",
            (v1 as u32).wrapping_sub(v2 as u32) as i32 as i64 as u64,
        ),
        _ => (
            "c.addw",
            (v1 as u32).wrapping_add(v2 as u32) as i32 as i64 as u64,
        ),
    };
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("{mnemonic} {dest}, {src}"),
        notes: vec![format!(
            "setting {dest} to {mnemonic}({}, {}) = 0x{value:x}",
            ctx.reg_note(dest),
            ctx.reg_note(src)
        )],
    });
    Ok(effect)
}

/// C.J: pc-relative jump, no link
pub(super) fn j(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let offset = ctx.instr.imm_cj();
    let target = ctx.pc.wrapping_add(offset as u64);
    let mut effect = ctx.advance();
    effect.next_pc = target;
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.j 0x{:x}", offset as u64),
        notes: vec![format!(
            "jumping to pc<0x{:x}> + 0x{:x} = 0x{target:x}",
            ctx.pc, offset as u64
        )],
    });
    Ok(effect)
}

/// C.BEQZ / C.BNEZ: branch comparing rs1′ against zero
pub(super) fn branch(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let src = ctx.instr.c_rs1_prime();
    let offset = ctx.instr.imm_cb();
    let v = ctx.x(src);
    let (mnemonic, taken, relation) = match kind {
        Kind::CBeqz => ("c.beqz", v == 0, "=="),
        _ => ("c.bnez", v != 0, "!="),
    };
    let target = ctx.pc.wrapping_add(offset as u64);
    let mut effect = ctx.advance();
    if taken {
        effect.next_pc = target;
    }
    effect.trace = ctx.trace(|| {
        let note = if taken {
            format!(
                "{} {relation} 0 is true, jumping to pc<0x{:x}> + 0x{:x} = 0x{target:x}",
                ctx.reg_note(src),
                ctx.pc,
                offset as u64
            )
        } else {
            format!("{} {relation} 0 is false, not branching", ctx.reg_note(src))
        };
        Trace {
            head: format!("{mnemonic} {src}, 0x{:x}", offset as u64),
            notes: vec![note],
        }
    });
    Ok(effect)
}

/// C.SLLI: rd <<= shamt (full register name space)
pub(super) fn slli(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let shamt = ctx.instr.c_shamt();
    let value = ctx.x(dest) << shamt;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.slli {dest}, 0x{shamt:x}"),
        notes: vec![format!(
            "setting {dest} to {} << {shamt} = 0x{value:x}",
            ctx.reg_note(dest)
        )],
    });
    Ok(effect)
}

/// C.LWSP / C.LDSP: stack-pointer-relative loads
pub(super) fn load_sp(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let (mnemonic, offset, word_size) = match kind {
        Kind::CLwsp => ("c.lwsp", ctx.instr.uimm_clwsp(), Wordsize::Word),
        _ => ("c.ldsp", ctx.instr.uimm_cldsp(), Wordsize::Doubleword),
    };
    let addr = ctx.x(XRegister::Sp).wrapping_add(offset);
    let raw = ctx.hart.load_memory(ctx.memory, addr, word_size)?;
    let value = match word_size {
        Wordsize::Word => raw as i32 as i64 as u64,
        _ => raw,
    };
    let mut effect = ctx.advance();
    effect.reg_write = Some((dest, value));
    effect.trace = ctx.trace(|| Trace {
        head: format!("{mnemonic} {dest}, 0x{offset:x}(sp)"),
        notes: vec![
            format!(
                "loading {} byte(s) from {} + 0x{offset:x} = 0x{addr:x}",
                word_size.width(),
                ctx.reg_note(XRegister::Sp)
            ),
            format!("setting {dest} to 0x{value:x}"),
        ],
    });
    Ok(effect)
}

/// C.SWSP / C.SDSP: stack-pointer-relative stores
pub(super) fn store_sp(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let src = ctx.instr.c_rs2();
    let (mnemonic, offset, word_size) = match kind {
        Kind::CSwsp => ("c.swsp", ctx.instr.uimm_cswsp(), Wordsize::Word),
        _ => ("c.sdsp", ctx.instr.uimm_csdsp(), Wordsize::Doubleword),
    };
    let addr = ctx.x(XRegister::Sp).wrapping_add(offset);
    let mut effect = ctx.advance();
    ctx.store_effect(&mut effect, addr, ctx.x(src), word_size)?;
    let halted = effect.halt;
    effect.trace = ctx.trace(|| {
        let note = if halted {
            format!("store to tohost<0x{addr:x}>, halting")
        } else {
            format!(
                "storing {} ({} byte(s)) to {} + 0x{offset:x} = 0x{addr:x}",
                ctx.reg_note(src),
                word_size.width(),
                ctx.reg_note(XRegister::Sp)
            )
        };
        Trace {
            head: format!("{mnemonic} {src}, 0x{offset:x}(sp)"),
            notes: vec![note],
        }
    });
    Ok(effect)
}

/// C.JR: pc = rs1 & ~1
pub(super) fn jr(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let base = ctx.instr.c_rd();
    let target = ctx.x(base) & !1;
    let mut effect = ctx.advance();
    effect.next_pc = target;
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.jr {base}"),
        notes: vec![format!(
            "jumping to {} & ~1 = 0x{target:x}",
            ctx.reg_note(base)
        )],
    });
    Ok(effect)
}

/// C.JALR: ra = pc + 2; pc = rs1 & ~1
pub(super) fn jalr(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let base = ctx.instr.c_rd();
    let link = ctx.pc.wrapping_add(2);
    let target = ctx.x(base) & !1;
    let mut effect = ctx.advance();
    effect.next_pc = target;
    effect.reg_write = Some((XRegister::Ra, link));
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.jalr {base}"),
        notes: vec![
            format!("setting ra to pc<0x{:x}> + 0x2 = 0x{link:x}", ctx.pc),
            format!("jumping to {} & ~1 = 0x{target:x}", ctx.reg_note(base)),
        ],
    });
    Ok(effect)
}

/// C.MV: rd = rs2
pub(super) fn mv(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let src = ctx.instr.c_rs2();
    let value = ctx.x(src);
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.mv {dest}, {src}"),
        notes: vec![format!("setting {dest} to {}", ctx.reg_note(src))],
    });
    Ok(effect)
}

/// C.ADD: rd = rd + rs2
pub(super) fn add(ctx: &Ctx) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.c_rd();
    let src = ctx.instr.c_rs2();
    let value = ctx.x(dest).wrapping_add(ctx.x(src));
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| Trace {
        head: format!("c.add {dest}, {src}"),
        notes: vec![format!(
            "setting {dest} to {} + {} = 0x{value:x}",
            ctx.reg_note(dest),
            ctx.reg_note(src)
        )],
    });
    Ok(effect)
}
