//! Integer multiply/divide (RV64M)
//!
//! The full multiplies go through 128-bit intermediates. Division
//! follows the ISA's totalised semantics: division by zero yields
//! all-ones for the quotient and the dividend for the remainder;
//! signed overflow (MIN / -1) yields the dividend and a zero
//! remainder.

use crate::decode::Kind;
use crate::exec::{Ctx, ExecutionError, StepEffect, Trace};
use crate::registers::XRegister;

fn mnemonic(kind: Kind) -> &'static str {
    match kind {
        Kind::Mul => "mul",
        Kind::Mulh => "mulh",
        Kind::Mulhsu => "mulhsu",
        Kind::Mulhu => "mulhu",
        Kind::Div => "div",
        Kind::Divu => "divu",
        Kind::Rem => "rem",
        Kind::Remu => "remu",
        Kind::Mulw => "mulw",
        Kind::Divw => "divw",
        Kind::Divuw => "divuw",
        Kind::Remw => "remw",
        _ => "remuw",
    }
}

fn div_signed(dividend: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        -1
    } else {
        // MIN / -1 wraps back to MIN, as the ISA requires
        dividend.wrapping_div(divisor)
    }
}

fn rem_signed(dividend: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        dividend
    } else {
        dividend.wrapping_rem(divisor)
    }
}

fn div_unsigned(dividend: u64, divisor: u64) -> u64 {
    if divisor == 0 {
        u64::MAX
    } else {
        dividend / divisor
    }
}

fn rem_unsigned(dividend: u64, divisor: u64) -> u64 {
    if divisor == 0 {
        dividend
    } else {
        dividend % divisor
    }
}

fn div_signed_32(dividend: i32, divisor: i32) -> i32 {
    if divisor == 0 {
        -1
    } else {
        dividend.wrapping_div(divisor)
    }
}

fn rem_signed_32(dividend: i32, divisor: i32) -> i32 {
    if divisor == 0 {
        dividend
    } else {
        dividend.wrapping_rem(divisor)
    }
}

fn div_unsigned_32(dividend: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        u32::MAX
    } else {
        dividend / divisor
    }
}

fn rem_unsigned_32(dividend: u32, divisor: u32) -> u32 {
    if divisor == 0 {
        dividend
    } else {
        dividend % divisor
    }
}

/// All thirteen multiply/divide instructions
pub(super) fn mul_div(ctx: &Ctx, kind: Kind) -> Result<StepEffect, ExecutionError> {
    let dest = ctx.instr.rd();
    let src1 = ctx.instr.rs1();
    let src2 = ctx.instr.rs2();
    let v1 = ctx.x(src1);
    let v2 = ctx.x(src2);
    let value = match kind {
        Kind::Mul => v1.wrapping_mul(v2),
        Kind::Mulh => {
            let product = i128::from(v1 as i64) * i128::from(v2 as i64);
            (product >> 64) as u64
        }
        Kind::Mulhsu => {
            let product = i128::from(v1 as i64) * v2 as i128;
            (product >> 64) as u64
        }
        Kind::Mulhu => {
            let product = u128::from(v1) * u128::from(v2);
            (product >> 64) as u64
        }
        Kind::Div => div_signed(v1 as i64, v2 as i64) as u64,
        Kind::Divu => div_unsigned(v1, v2),
        Kind::Rem => rem_signed(v1 as i64, v2 as i64) as u64,
        Kind::Remu => rem_unsigned(v1, v2),
        Kind::Mulw => (v1 as i32).wrapping_mul(v2 as i32) as i64 as u64,
        Kind::Divw => div_signed_32(v1 as i32, v2 as i32) as i64 as u64,
        Kind::Divuw => div_unsigned_32(v1 as u32, v2 as u32) as i32 as i64 as u64,
        Kind::Remw => rem_signed_32(v1 as i32, v2 as i32) as i64 as u64,
        _ => rem_unsigned_32(v1 as u32, v2 as u32) as i32 as i64 as u64,
    };
    let mut effect = ctx.advance();
    if dest != XRegister::Zero {
        effect.reg_write = Some((dest, value));
    }
    effect.trace = ctx.trace(|| {
        let mnemonic = mnemonic(kind);
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
