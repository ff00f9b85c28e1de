//! Control and status register instructions (Zicsr)
//!
//! All six forms share one body: read the old value, compute the
//! candidate new value, and apply the ISA's side-effect rules. The
//! set/clear forms skip the write entirely when the mask operand is
//! x0 or a zero immediate; the write forms always write. A write
//! aimed at a read-only register in the recognised set is discarded
//! (the recognised CSRs are projections of hart state that cannot
//! be changed from guest code).
//!
//! Naming a CSR outside the recognised set raises the unknown-CSR
//! condition, or plain illegal-instruction when
//! `unrecognised_csr_is_fatal` is off. Insufficient privilege is
//! always illegal-instruction.

use crate::csr::{self, Csr};
use crate::decode::Kind;
use crate::exec::{Ctx, ExecutionError, StepEffect, Trace};
use crate::registers::XRegister;

fn mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Csrrw => "csrrw",
        Kind::Csrrs => "csrrs",
        Kind::Csrrc => "csrrc",
        Kind::Csrrwi => "csrrwi",
        Kind::Csrrsi => "csrrsi",
        _ => "csrrci",
    }
}

pub(super) fn csr_op(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let number = ctx.instr.csr();
    let dest = ctx.instr.rd();

    let Some(target) = Csr::from_number(number) else {
        return Err(if ctx.options.unrecognised_csr_is_fatal {
            ExecutionError::UnknownCsr {
                pc: ctx.pc,
                csr: number,
            }
        } else {
            ExecutionError::IllegalInstruction {
                pc: ctx.pc,
                encoding: ctx.instr.0,
            }
        });
    };
    if !csr::can_read(number, ctx.hart.privilege_level) {
        return Err(ExecutionError::IllegalInstruction {
            pc: ctx.pc,
            encoding: ctx.instr.0,
        });
    }

    let old = target.read(ctx.hart);

    // The register forms use rs1, the immediate forms reuse the rs1
    // field as a zero-extended 5-bit value
    let immediate_form = matches!(kind, Kind::Csrrwi | Kind::Csrrsi | Kind::Csrrci);
    let source = ctx.instr.rs1();
    let mask = if immediate_form {
        ctx.instr.csr_uimm()
    } else {
        ctx.x(source)
    };
    let mask_is_zero = if immediate_form {
        mask == 0
    } else {
        source == XRegister::Zero
    };

    let new_value = match kind {
        Kind::Csrrw | Kind::Csrrwi => Some(mask),
        Kind::Csrrs | Kind::Csrrsi => (!mask_is_zero).then_some(old | mask),
        _ => (!mask_is_zero).then_some(old & !mask),
    };

    let writable = csr::can_write(number, ctx.hart.privilege_level);
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, old));
    }
    if let Some(value) = new_value {
        if writable {
            effect.csr_write = Some((target, value));
        }
    }
    effect.trace = ctx.trace(|| {
        let name = target.name();
        let operand = if immediate_form {
            format!("0x{mask:x}")
        } else {
            source.to_string()
        };
        let mut notes = vec![format!("reading {name} = 0x{old:x}")];
        if dest != XRegister::Zero {
            notes.push(format!("setting {dest} to 0x{old:x}"));
        }
        match new_value {
            Some(value) if writable => notes.push(format!("writing 0x{value:x} to {name}")),
            Some(_) => notes.push(format!("write to read-only {name} discarded")),
            None => {}
        }
        Trace {
            head: format!("{} {dest}, {name}, {operand}", mnemonic(kind)),
            notes,
        }
    });
    Ok(effect)
}
