//! Atomics (RV64A)
//!
//! With a single hart stepping cooperatively, every instruction is
//! indivisible from the guest's point of view, so the atomic
//! read-modify-write sequences are computed as one effect. The LR
//! reservation is per-hart state: SC succeeds only against a live
//! reservation on the same address, and any store through the
//! reserved address drops it.
//!
//! The aq/rl bits carry no extra meaning here because every step is
//! already sequentially consistent with respect to the only hart.

use crate::decode::Kind;
use crate::exec::{Ctx, ExecutionError, MemoryWrite, ReservationEffect, StepEffect, Trace};
use crate::memory::Wordsize;
use crate::registers::XRegister;

fn word_size(kind: Kind) -> Wordsize {
    match kind {
        Kind::LrW | Kind::ScW | Kind::AmoswapW | Kind::AmoaddW | Kind::AmoxorW
        | Kind::AmoandW | Kind::AmoorW | Kind::AmominW | Kind::AmomaxW | Kind::AmominuW
        | Kind::AmomaxuW => Wordsize::Word,
        _ => Wordsize::Doubleword,
    }
}

/// Sign-extend a loaded value when operating at word width
fn extend(value: u64, word_size: Wordsize) -> u64 {
    match word_size {
        Wordsize::Word => value as i32 as i64 as u64,
        _ => value,
    }
}

/// Load-reserved: load the word and acquire a reservation on its
/// address
pub(super) fn lr(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let base = ctx.instr.rs1();
    let addr = ctx.x(base);
    let size = word_size(kind);
    let value = extend(ctx.hart.load_memory(ctx.memory, addr, size)?, size);
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.reservation = ReservationEffect::Acquire(addr);
    effect.trace = ctx.trace(|| {
        let mnemonic = match kind {
            Kind::LrW => "lr.w",
            _ => "lr.d",
        };
        Trace {
            head: format!("{mnemonic} {dest}, ({base})"),
            notes: vec![
                format!("loading 0x{value:x} from {}", ctx.reg_note(base)),
                format!("reserving 0x{addr:x}"),
            ],
        }
    });
    Ok(effect)
}

/// Store-conditional: store only against a live reservation on the
/// same address; rd reports 0 for success, 1 for failure. The
/// reservation is consumed either way.
pub(super) fn sc(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let base = ctx.instr.rs1();
    let src = ctx.instr.rs2();
    let addr = ctx.x(base);
    let size = word_size(kind);
    let succeeds = ctx.hart.reservation == Some(addr);
    let mut effect = ctx.advance();
    if succeeds {
        let physical = ctx.hart.translate(addr)?;
        ctx.memory
            .check_access(physical, size)
            .map_err(|_| ExecutionError::StoreOutOfBounds { addr: physical })?;
        effect.store = Some(MemoryWrite {
            addr,
            value: ctx.x(src),
            word_size: size,
        });
    }
    effect.reservation = ReservationEffect::Clear;
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, u64::from(!succeeds)));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = match kind {
            Kind::ScW => "sc.w",
            _ => "sc.d",
        };
        let note = if succeeds {
            format!(
                "reservation held, storing {} to 0x{addr:x}",
                ctx.reg_note(src)
            )
        } else {
            format!("no reservation on 0x{addr:x}, store fails")
        };
        Trace {
            head: format!("{mnemonic} {dest}, {src}, ({base})"),
            notes: vec![note, format!("setting {dest} to {}", u64::from(!succeeds))],
        }
    });
    Ok(effect)
}

fn amo_mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::AmoswapW => "amoswap.w",
        Kind::AmoaddW => "amoadd.w",
        Kind::AmoxorW => "amoxor.w",
        Kind::AmoandW => "amoand.w",
        Kind::AmoorW => "amoor.w",
        Kind::AmominW => "amomin.w",
        Kind::AmomaxW => "amomax.w",
        Kind::AmominuW => "amominu.w",
        Kind::AmomaxuW => "amomaxu.w",
        Kind::AmoswapD => "amoswap.d",
        Kind::AmoaddD => "amoadd.d",
        Kind::AmoxorD => "amoxor.d",
        Kind::AmoandD => "amoand.d",
        Kind::AmoorD => "amoor.d",
        Kind::AmominD => "amomin.d",
        Kind::AmomaxD => "amomax.d",
        Kind::AmominuD => "amominu.d",
        _ => "amomaxu.d",
    }
}

fn amo_op(kind: Kind, loaded: u64, operand: u64, size: Wordsize) -> u64 {
    let wide = matches!(size, Wordsize::Doubleword);
    match kind {
        Kind::AmoswapW | Kind::AmoswapD => operand,
        Kind::AmoaddW | Kind::AmoaddD => loaded.wrapping_add(operand),
        Kind::AmoxorW | Kind::AmoxorD => loaded ^ operand,
        Kind::AmoandW | Kind::AmoandD => loaded & operand,
        Kind::AmoorW | Kind::AmoorD => loaded | operand,
        Kind::AmominW | Kind::AmominD => {
            if wide {
                (loaded as i64).min(operand as i64) as u64
            } else {
                (loaded as i32).min(operand as i32) as u64
            }
        }
        Kind::AmomaxW | Kind::AmomaxD => {
            if wide {
                (loaded as i64).max(operand as i64) as u64
            } else {
                (loaded as i32).max(operand as i32) as u64
            }
        }
        Kind::AmominuW | Kind::AmominuD => {
            if wide {
                loaded.min(operand)
            } else {
                (loaded as u32).min(operand as u32).into()
            }
        }
        _ => {
            if wide {
                loaded.max(operand)
            } else {
                (loaded as u32).max(operand as u32).into()
            }
        }
    }
}

/// Atomic read-modify-write: rd receives the old memory value, the
/// combined value is stored back
pub(super) fn amo(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let base = ctx.instr.rs1();
    let src = ctx.instr.rs2();
    let addr = ctx.x(base);
    let size = word_size(kind);
    let raw = ctx.hart.load_memory(ctx.memory, addr, size)?;
    let loaded = extend(raw, size);
    let new = amo_op(kind, raw, ctx.x(src), size);
    let physical = ctx.hart.translate(addr)?;
    ctx.memory
        .check_access(physical, size)
        .map_err(|_| ExecutionError::StoreOutOfBounds { addr: physical })?;
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, loaded));
    }
    effect.store = Some(MemoryWrite {
        addr,
        value: new,
        word_size: size,
    });
    effect.trace = ctx.trace(|| {
        let mnemonic = amo_mnemonic(kind);
        Trace {
            head: format!("{mnemonic} {dest}, {src}, ({base})"),
            notes: vec![
                format!("loading 0x{loaded:x} from {}", ctx.reg_note(base)),
                format!(
                    "storing {mnemonic}(0x{loaded:x}, {}) = 0x{new:x} to 0x{addr:x}",
                    ctx.reg_note(src)
                ),
                format!("setting {dest} to 0x{loaded:x}"),
            ],
        }
    });
    Ok(effect)
}
