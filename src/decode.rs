//! Instruction decoder
//!
//! [`decode`] is a pure, total function from an instruction word to
//! one tag of the closed [`Kind`] enumeration. Dispatch is
//! two-stage: first on the quadrant (bits 1:0, where 0b11 marks a
//! 32-bit encoding), then on the opcode/funct fields within the
//! quadrant, following the listings of chapters 16 and 24 of the
//! unprivileged spec.
//!
//! Every word decodes to exactly one kind. Canonically-illegal and
//! reserved encodings map to [`Kind::Illegal`]; encodings whose
//! shape is recognised but which fall outside the modelled set map
//! to [`Kind::Unimplemented`].

use crate::fields::Instruction;
use crate::opcodes::*;

/// One tag per RV64GC + Zicsr instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    // RV32I base
    Lui,
    Auipc,
    Jal,
    Jalr,
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
    Fence,
    FenceI,
    Ecall,
    Ebreak,
    // RV64I additions
    Lwu,
    Ld,
    Sd,
    Addiw,
    Slliw,
    Srliw,
    Sraiw,
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
    // Zicsr
    Csrrw,
    Csrrs,
    Csrrc,
    Csrrwi,
    Csrrsi,
    Csrrci,
    // M extension
    Mul,
    Mulh,
    Mulhsu,
    Mulhu,
    Div,
    Divu,
    Rem,
    Remu,
    Mulw,
    Divw,
    Divuw,
    Remw,
    Remuw,
    // A extension
    LrW,
    ScW,
    AmoswapW,
    AmoaddW,
    AmoxorW,
    AmoandW,
    AmoorW,
    AmominW,
    AmomaxW,
    AmominuW,
    AmomaxuW,
    LrD,
    ScD,
    AmoswapD,
    AmoaddD,
    AmoxorD,
    AmoandD,
    AmoorD,
    AmominD,
    AmomaxD,
    AmominuD,
    AmomaxuD,
    // F extension
    Flw,
    Fsw,
    FmaddS,
    FmsubS,
    FnmsubS,
    FnmaddS,
    FaddS,
    FsubS,
    FmulS,
    FdivS,
    FsqrtS,
    FsgnjS,
    FsgnjnS,
    FsgnjxS,
    FminS,
    FmaxS,
    FcvtWS,
    FcvtWuS,
    FcvtLS,
    FcvtLuS,
    FmvXW,
    FeqS,
    FltS,
    FleS,
    FclassS,
    FcvtSW,
    FcvtSWu,
    FcvtSL,
    FcvtSLu,
    FmvWX,
    // D extension
    Fld,
    Fsd,
    FmaddD,
    FmsubD,
    FnmsubD,
    FnmaddD,
    FaddD,
    FsubD,
    FmulD,
    FdivD,
    FsqrtD,
    FsgnjD,
    FsgnjnD,
    FsgnjxD,
    FminD,
    FmaxD,
    FcvtSD,
    FcvtDS,
    FeqD,
    FltD,
    FleD,
    FclassD,
    FcvtWD,
    FcvtWuD,
    FcvtLD,
    FcvtLuD,
    FmvXD,
    FcvtDW,
    FcvtDWu,
    FcvtDL,
    FcvtDLu,
    FmvDX,
    // C extension, quadrant 0
    CAddi4spn,
    CFld,
    CLw,
    CLd,
    CFsd,
    CSw,
    CSd,
    // C extension, quadrant 1
    CNop,
    CAddi,
    CAddiw,
    CLi,
    CAddi16sp,
    CLui,
    CSrli,
    CSrai,
    CAndi,
    CSub,
    CXor,
    COr,
    CAnd,
    CSubw,
    CAddw,
    CJ,
    CBeqz,
    CBnez,
    // C extension, quadrant 2
    CSlli,
    CFldsp,
    CLwsp,
    CLdsp,
    CJr,
    CMv,
    CEbreak,
    CJalr,
    CAdd,
    CFsdsp,
    CSwsp,
    CSdsp,
    /// Canonically-illegal or reserved encoding
    Illegal,
    /// Recognised by shape but not modelled
    Unimplemented,
}

/// Classify an instruction word
pub fn decode(instr: Instruction) -> Kind {
    match instr.quadrant() {
        QUADRANT_C0 => decode_c0(instr),
        QUADRANT_C1 => decode_c1(instr),
        QUADRANT_C2 => decode_c2(instr),
        _ => decode_wide(instr),
    }
}

fn decode_c0(instr: Instruction) -> Kind {
    match instr.funct3() {
        C0_FUNCT3_ADDI4SPN => {
            // The all-zero halfword is the canonical illegal
            // instruction, and a zero nzuimm is reserved
            if instr.uimm_caddi4spn() == 0 {
                Kind::Illegal
            } else {
                Kind::CAddi4spn
            }
        }
        C0_FUNCT3_FLD => Kind::CFld,
        C0_FUNCT3_LW => Kind::CLw,
        C0_FUNCT3_LD => Kind::CLd,
        C0_FUNCT3_FSD => Kind::CFsd,
        C0_FUNCT3_SW => Kind::CSw,
        C0_FUNCT3_SD => Kind::CSd,
        _ => Kind::Illegal,
    }
}

fn decode_c1(instr: Instruction) -> Kind {
    use crate::registers::XRegister;
    match instr.funct3() {
        C1_FUNCT3_ADDI => {
            if instr.c_rd() == XRegister::Zero {
                Kind::CNop
            } else {
                Kind::CAddi
            }
        }
        C1_FUNCT3_ADDIW => {
            if instr.c_rd() == XRegister::Zero {
                Kind::Illegal
            } else {
                Kind::CAddiw
            }
        }
        C1_FUNCT3_LI => Kind::CLi,
        C1_FUNCT3_LUI_ADDI16SP => match instr.c_rd() {
            XRegister::Sp => {
                if instr.imm_caddi16sp() == 0 {
                    Kind::Illegal
                } else {
                    Kind::CAddi16sp
                }
            }
            _ => {
                if instr.imm_clui() == 0 {
                    Kind::Illegal
                } else {
                    Kind::CLui
                }
            }
        },
        C1_FUNCT3_MISC_ALU => decode_c1_misc_alu(instr),
        C1_FUNCT3_J => Kind::CJ,
        C1_FUNCT3_BEQZ => Kind::CBeqz,
        C1_FUNCT3_BNEZ => Kind::CBnez,
        _ => Kind::Illegal,
    }
}

fn decode_c1_misc_alu(instr: Instruction) -> Kind {
    let word = instr.0;
    match (word >> 10) & 0b11 {
        0b00 => Kind::CSrli,
        0b01 => Kind::CSrai,
        0b10 => Kind::CAndi,
        _ => {
            let op = (word >> 5) & 0b11;
            if (word >> 12) & 1 == 0 {
                match op {
                    0b00 => Kind::CSub,
                    0b01 => Kind::CXor,
                    0b10 => Kind::COr,
                    _ => Kind::CAnd,
                }
            } else {
                match op {
                    0b00 => Kind::CSubw,
                    0b01 => Kind::CAddw,
                    _ => Kind::Illegal,
                }
            }
        }
    }
}

fn decode_c2(instr: Instruction) -> Kind {
    use crate::registers::XRegister;
    match instr.funct3() {
        C2_FUNCT3_SLLI => Kind::CSlli,
        C2_FUNCT3_FLDSP => Kind::CFldsp,
        C2_FUNCT3_LWSP => {
            if instr.c_rd() == XRegister::Zero {
                Kind::Illegal
            } else {
                Kind::CLwsp
            }
        }
        C2_FUNCT3_LDSP => {
            if instr.c_rd() == XRegister::Zero {
                Kind::Illegal
            } else {
                Kind::CLdsp
            }
        }
        C2_FUNCT3_JR_MV_ADD => {
            let rd_is_zero = instr.c_rd() == XRegister::Zero;
            let rs2_is_zero = instr.c_rs2() == XRegister::Zero;
            if (instr.0 >> 12) & 1 == 0 {
                match (rs2_is_zero, rd_is_zero) {
                    (true, true) => Kind::Illegal,
                    (true, false) => Kind::CJr,
                    (false, _) => Kind::CMv,
                }
            } else {
                match (rs2_is_zero, rd_is_zero) {
                    (true, true) => Kind::CEbreak,
                    (true, false) => Kind::CJalr,
                    (false, _) => Kind::CAdd,
                }
            }
        }
        C2_FUNCT3_FSDSP => Kind::CFsdsp,
        C2_FUNCT3_SWSP => Kind::CSwsp,
        C2_FUNCT3_SDSP => Kind::CSdsp,
        _ => Kind::Illegal,
    }
}

fn decode_wide(instr: Instruction) -> Kind {
    if instr.0 == u32::MAX {
        return Kind::Illegal;
    }
    match instr.opcode() {
        OP_LUI => Kind::Lui,
        OP_AUIPC => Kind::Auipc,
        OP_JAL => Kind::Jal,
        OP_JALR => match instr.funct3() {
            0b000 => Kind::Jalr,
            _ => Kind::Unimplemented,
        },
        OP_BRANCH => match instr.funct3() {
            FUNCT3_BEQ => Kind::Beq,
            FUNCT3_BNE => Kind::Bne,
            FUNCT3_BLT => Kind::Blt,
            FUNCT3_BGE => Kind::Bge,
            FUNCT3_BLTU => Kind::Bltu,
            FUNCT3_BGEU => Kind::Bgeu,
            _ => Kind::Unimplemented,
        },
        OP_LOAD => match instr.funct3() {
            FUNCT3_B => Kind::Lb,
            FUNCT3_H => Kind::Lh,
            FUNCT3_W => Kind::Lw,
            FUNCT3_D => Kind::Ld,
            FUNCT3_BU => Kind::Lbu,
            FUNCT3_HU => Kind::Lhu,
            FUNCT3_WU => Kind::Lwu,
            _ => Kind::Unimplemented,
        },
        OP_STORE => match instr.funct3() {
            FUNCT3_B => Kind::Sb,
            FUNCT3_H => Kind::Sh,
            FUNCT3_W => Kind::Sw,
            FUNCT3_D => Kind::Sd,
            _ => Kind::Unimplemented,
        },
        OP_IMM => decode_op_imm(instr),
        OP_IMM_32 => decode_op_imm_32(instr),
        OP => decode_op(instr),
        OP_32 => decode_op_32(instr),
        OP_MISC_MEM => match instr.funct3() {
            FUNCT3_FENCE => Kind::Fence,
            FUNCT3_FENCE_I => Kind::FenceI,
            _ => Kind::Unimplemented,
        },
        OP_SYSTEM => decode_system(instr),
        OP_AMO => decode_amo(instr),
        OP_LOAD_FP => match instr.funct3() {
            FUNCT3_W => Kind::Flw,
            FUNCT3_D => Kind::Fld,
            _ => Kind::Unimplemented,
        },
        OP_STORE_FP => match instr.funct3() {
            FUNCT3_W => Kind::Fsw,
            FUNCT3_D => Kind::Fsd,
            _ => Kind::Unimplemented,
        },
        OP_MADD => match fp_fmt(instr) {
            FpFmt::Single => Kind::FmaddS,
            FpFmt::Double => Kind::FmaddD,
            FpFmt::Other => Kind::Unimplemented,
        },
        OP_MSUB => match fp_fmt(instr) {
            FpFmt::Single => Kind::FmsubS,
            FpFmt::Double => Kind::FmsubD,
            FpFmt::Other => Kind::Unimplemented,
        },
        OP_NMSUB => match fp_fmt(instr) {
            FpFmt::Single => Kind::FnmsubS,
            FpFmt::Double => Kind::FnmsubD,
            FpFmt::Other => Kind::Unimplemented,
        },
        OP_NMADD => match fp_fmt(instr) {
            FpFmt::Single => Kind::FnmaddS,
            FpFmt::Double => Kind::FnmaddD,
            FpFmt::Other => Kind::Unimplemented,
        },
        OP_FP => decode_op_fp(instr),
        _ => Kind::Unimplemented,
    }
}

fn decode_op_imm(instr: Instruction) -> Kind {
    match instr.funct3() {
        FUNCT3_ADDI => Kind::Addi,
        FUNCT3_SLTI => Kind::Slti,
        FUNCT3_SLTIU => Kind::Sltiu,
        FUNCT3_XORI => Kind::Xori,
        FUNCT3_ORI => Kind::Ori,
        FUNCT3_ANDI => Kind::Andi,
        FUNCT3_SLLI => match instr.funct6() {
            FUNCT6_SLLI_SRLI => Kind::Slli,
            _ => Kind::Unimplemented,
        },
        FUNCT3_SRLI_SRAI => match instr.funct6() {
            FUNCT6_SLLI_SRLI => Kind::Srli,
            FUNCT6_SRAI => Kind::Srai,
            _ => Kind::Unimplemented,
        },
        _ => Kind::Unimplemented,
    }
}

fn decode_op_imm_32(instr: Instruction) -> Kind {
    // The word-width shifts are decoded on funct6 so that an
    // encoding with bit 5 of the shift amount set still reaches the
    // executor, which reports it as an illegal instruction
    match instr.funct3() {
        FUNCT3_ADDI => Kind::Addiw,
        FUNCT3_SLLI => match instr.funct6() {
            FUNCT6_SLLI_SRLI => Kind::Slliw,
            _ => Kind::Unimplemented,
        },
        FUNCT3_SRLI_SRAI => match instr.funct6() {
            FUNCT6_SLLI_SRLI => Kind::Srliw,
            FUNCT6_SRAI => Kind::Sraiw,
            _ => Kind::Unimplemented,
        },
        _ => Kind::Unimplemented,
    }
}

fn decode_op(instr: Instruction) -> Kind {
    match instr.funct7() {
        FUNCT7_BASE => match instr.funct3() {
            FUNCT3_ADD_SUB => Kind::Add,
            FUNCT3_SLL => Kind::Sll,
            FUNCT3_SLT => Kind::Slt,
            FUNCT3_SLTU => Kind::Sltu,
            FUNCT3_XOR => Kind::Xor,
            FUNCT3_SRL_SRA => Kind::Srl,
            FUNCT3_OR => Kind::Or,
            FUNCT3_AND => Kind::And,
            _ => Kind::Unimplemented,
        },
        FUNCT7_SUB_SRA => match instr.funct3() {
            FUNCT3_ADD_SUB => Kind::Sub,
            FUNCT3_SRL_SRA => Kind::Sra,
            _ => Kind::Unimplemented,
        },
        FUNCT7_MULDIV => match instr.funct3() {
            FUNCT3_MUL => Kind::Mul,
            FUNCT3_MULH => Kind::Mulh,
            FUNCT3_MULHSU => Kind::Mulhsu,
            FUNCT3_MULHU => Kind::Mulhu,
            FUNCT3_DIV => Kind::Div,
            FUNCT3_DIVU => Kind::Divu,
            FUNCT3_REM => Kind::Rem,
            _ => Kind::Remu,
        },
        _ => Kind::Unimplemented,
    }
}

fn decode_op_32(instr: Instruction) -> Kind {
    match instr.funct7() {
        FUNCT7_BASE => match instr.funct3() {
            FUNCT3_ADD_SUB => Kind::Addw,
            FUNCT3_SLL => Kind::Sllw,
            FUNCT3_SRL_SRA => Kind::Srlw,
            _ => Kind::Unimplemented,
        },
        FUNCT7_SUB_SRA => match instr.funct3() {
            FUNCT3_ADD_SUB => Kind::Subw,
            FUNCT3_SRL_SRA => Kind::Sraw,
            _ => Kind::Unimplemented,
        },
        FUNCT7_MULDIV => match instr.funct3() {
            FUNCT3_MUL => Kind::Mulw,
            FUNCT3_DIV => Kind::Divw,
            FUNCT3_DIVU => Kind::Divuw,
            FUNCT3_REM => Kind::Remw,
            FUNCT3_REMU => Kind::Remuw,
            _ => Kind::Unimplemented,
        },
        _ => Kind::Unimplemented,
    }
}

fn decode_system(instr: Instruction) -> Kind {
    match instr.funct3() {
        FUNCT3_PRIV => {
            // The whole I-type immediate field selects the operation
            let imm12 = (instr.0 >> 20) & 0xfff;
            match imm12 {
                IMM12_ECALL => Kind::Ecall,
                IMM12_EBREAK => Kind::Ebreak,
                // mret, sret, wfi, sfence.vma and friends
                _ => Kind::Unimplemented,
            }
        }
        FUNCT3_CSRRW => Kind::Csrrw,
        FUNCT3_CSRRS => Kind::Csrrs,
        FUNCT3_CSRRC => Kind::Csrrc,
        FUNCT3_CSRRWI => Kind::Csrrwi,
        FUNCT3_CSRRSI => Kind::Csrrsi,
        FUNCT3_CSRRCI => Kind::Csrrci,
        _ => Kind::Unimplemented,
    }
}

fn decode_amo(instr: Instruction) -> Kind {
    let funct5 = instr.funct5();
    match instr.funct3() {
        FUNCT3_W => match funct5 {
            FUNCT5_LR => Kind::LrW,
            FUNCT5_SC => Kind::ScW,
            FUNCT5_AMOSWAP => Kind::AmoswapW,
            FUNCT5_AMOADD => Kind::AmoaddW,
            FUNCT5_AMOXOR => Kind::AmoxorW,
            FUNCT5_AMOAND => Kind::AmoandW,
            FUNCT5_AMOOR => Kind::AmoorW,
            FUNCT5_AMOMIN => Kind::AmominW,
            FUNCT5_AMOMAX => Kind::AmomaxW,
            FUNCT5_AMOMINU => Kind::AmominuW,
            FUNCT5_AMOMAXU => Kind::AmomaxuW,
            _ => Kind::Unimplemented,
        },
        FUNCT3_D => match funct5 {
            FUNCT5_LR => Kind::LrD,
            FUNCT5_SC => Kind::ScD,
            FUNCT5_AMOSWAP => Kind::AmoswapD,
            FUNCT5_AMOADD => Kind::AmoaddD,
            FUNCT5_AMOXOR => Kind::AmoxorD,
            FUNCT5_AMOAND => Kind::AmoandD,
            FUNCT5_AMOOR => Kind::AmoorD,
            FUNCT5_AMOMIN => Kind::AmominD,
            FUNCT5_AMOMAX => Kind::AmomaxD,
            FUNCT5_AMOMINU => Kind::AmominuD,
            FUNCT5_AMOMAXU => Kind::AmomaxuD,
            _ => Kind::Unimplemented,
        },
        _ => Kind::Unimplemented,
    }
}

enum FpFmt {
    Single,
    Double,
    Other,
}

/// The fmt field (bits 26:25) of the fused multiply-add opcodes
fn fp_fmt(instr: Instruction) -> FpFmt {
    match (instr.0 >> 25) & 0b11 {
        0b00 => FpFmt::Single,
        0b01 => FpFmt::Double,
        _ => FpFmt::Other,
    }
}

fn decode_op_fp(instr: Instruction) -> Kind {
    let rs2_field = (instr.0 >> 20) & 0x1f;
    match instr.funct7() {
        FUNCT7_FADD_S => Kind::FaddS,
        FUNCT7_FADD_D => Kind::FaddD,
        FUNCT7_FSUB_S => Kind::FsubS,
        FUNCT7_FSUB_D => Kind::FsubD,
        FUNCT7_FMUL_S => Kind::FmulS,
        FUNCT7_FMUL_D => Kind::FmulD,
        FUNCT7_FDIV_S => Kind::FdivS,
        FUNCT7_FDIV_D => Kind::FdivD,
        FUNCT7_FSQRT_S => Kind::FsqrtS,
        FUNCT7_FSQRT_D => Kind::FsqrtD,
        FUNCT7_FSGNJ_S => match instr.funct3() {
            0b000 => Kind::FsgnjS,
            0b001 => Kind::FsgnjnS,
            0b010 => Kind::FsgnjxS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FSGNJ_D => match instr.funct3() {
            0b000 => Kind::FsgnjD,
            0b001 => Kind::FsgnjnD,
            0b010 => Kind::FsgnjxD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FMINMAX_S => match instr.funct3() {
            0b000 => Kind::FminS,
            0b001 => Kind::FmaxS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FMINMAX_D => match instr.funct3() {
            0b000 => Kind::FminD,
            0b001 => Kind::FmaxD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_W_S => match rs2_field {
            0b00000 => Kind::FcvtWS,
            0b00001 => Kind::FcvtWuS,
            0b00010 => Kind::FcvtLS,
            0b00011 => Kind::FcvtLuS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_W_D => match rs2_field {
            0b00000 => Kind::FcvtWD,
            0b00001 => Kind::FcvtWuD,
            0b00010 => Kind::FcvtLD,
            0b00011 => Kind::FcvtLuD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_S_W => match rs2_field {
            0b00000 => Kind::FcvtSW,
            0b00001 => Kind::FcvtSWu,
            0b00010 => Kind::FcvtSL,
            0b00011 => Kind::FcvtSLu,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_D_W => match rs2_field {
            0b00000 => Kind::FcvtDW,
            0b00001 => Kind::FcvtDWu,
            0b00010 => Kind::FcvtDL,
            0b00011 => Kind::FcvtDLu,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_S_D => match rs2_field {
            0b00001 => Kind::FcvtSD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCVT_D_S => match rs2_field {
            0b00000 => Kind::FcvtDS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCMP_S => match instr.funct3() {
            0b010 => Kind::FeqS,
            0b001 => Kind::FltS,
            0b000 => Kind::FleS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FCMP_D => match instr.funct3() {
            0b010 => Kind::FeqD,
            0b001 => Kind::FltD,
            0b000 => Kind::FleD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FMV_X_W_FCLASS_S => match instr.funct3() {
            0b000 => Kind::FmvXW,
            0b001 => Kind::FclassS,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FMV_X_D_FCLASS_D => match instr.funct3() {
            0b000 => Kind::FmvXD,
            0b001 => Kind::FclassD,
            _ => Kind::Unimplemented,
        },
        FUNCT7_FMV_W_X => Kind::FmvWX,
        FUNCT7_FMV_D_X => Kind::FmvDX,
        _ => Kind::Unimplemented,
    }
}
