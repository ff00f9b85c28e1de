//! Instruction word field accessors
//!
//! An [`Instruction`] wraps a raw 32-bit encoding (a compressed
//! instruction sits in the low 16 bits with the high 16 bits zero)
//! and exposes the fields of every format as methods. Bit layouts
//! follow chapters 2, 16 and 24 of the unprivileged spec. All
//! immediates are returned sign-extended to i64 (or as u64 for the
//! zero-extended compressed offsets), so the execution code never
//! needs to know the source bit positions.

use crate::registers::XRegister;
use crate::utils::{extract_field, sign_extend};

/// A single RISC-V instruction encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    fn bits(&self, end: u32, start: u32) -> u64 {
        u64::from(extract_field(self.0, end, start))
    }

    /// Quadrant bits 1:0; 0b11 means a 32-bit encoding
    pub fn quadrant(&self) -> u32 {
        extract_field(self.0, 1, 0)
    }

    pub fn opcode(&self) -> u32 {
        extract_field(self.0, 6, 0)
    }

    pub fn funct3(&self) -> u32 {
        extract_field(self.0, 14, 12)
    }

    pub fn funct7(&self) -> u32 {
        extract_field(self.0, 31, 25)
    }

    /// funct6 (bits 31:26), which identifies the RV64 shift-immediate
    /// instructions (the shift amount has grown into bit 25)
    pub fn funct6(&self) -> u32 {
        extract_field(self.0, 31, 26)
    }

    /// funct5 (bits 31:27), the operation field of the A extension
    pub fn funct5(&self) -> u32 {
        extract_field(self.0, 31, 27)
    }

    pub fn rd(&self) -> XRegister {
        XRegister::from_index(extract_field(self.0, 11, 7) as u8)
    }

    pub fn rs1(&self) -> XRegister {
        XRegister::from_index(extract_field(self.0, 19, 15) as u8)
    }

    pub fn rs2(&self) -> XRegister {
        XRegister::from_index(extract_field(self.0, 24, 20) as u8)
    }

    /// The CSR address field (bits 31:20) of a Zicsr instruction
    pub fn csr(&self) -> u16 {
        extract_field(self.0, 31, 20) as u16
    }

    /// The zero-extended 5-bit immediate of CSRRWI/CSRRSI/CSRRCI,
    /// which reuses the rs1 field
    pub fn csr_uimm(&self) -> u64 {
        self.bits(19, 15)
    }

    /// 6-bit shift amount of SLLI/SRLI/SRAI (RV64 encoding)
    pub fn shamt(&self) -> u32 {
        extract_field(self.0, 25, 20)
    }

    /// 5-bit shift amount of SLLIW/SRLIW/SRAIW
    pub fn shamt_word(&self) -> u32 {
        extract_field(self.0, 24, 20)
    }

    /// Bit 5 of the encoded shift amount in a word-width shift
    /// immediate; a legal …IW encoding has this bit clear
    pub fn shamt_word_bit5(&self) -> bool {
        extract_field(self.0, 25, 25) == 1
    }

    /// I-type immediate: imm[11:0] = inst[31:20]
    pub fn imm_i(&self) -> i64 {
        sign_extend(self.bits(31, 20), 11)
    }

    /// S-type immediate: imm[11:5] = inst[31:25], imm[4:0] = inst[11:7]
    pub fn imm_s(&self) -> i64 {
        let imm = (self.bits(31, 25) << 5) | self.bits(11, 7);
        sign_extend(imm, 11)
    }

    /// B-type immediate: imm[12|11|10:5|4:1] = inst[31|7|30:25|11:8],
    /// bit 0 zero
    pub fn imm_b(&self) -> i64 {
        let imm = (self.bits(31, 31) << 12)
            | (self.bits(7, 7) << 11)
            | (self.bits(30, 25) << 5)
            | (self.bits(11, 8) << 1);
        sign_extend(imm, 12)
    }

    /// U-type immediate: imm[31:12] = inst[31:12], low 12 bits zero,
    /// sign-extended from bit 31 as RV64 requires
    pub fn imm_u(&self) -> i64 {
        sign_extend(self.bits(31, 12) << 12, 31)
    }

    /// J-type immediate: imm[20|19:12|11|10:1] =
    /// inst[31|19:12|20|30:21], bit 0 zero
    pub fn imm_j(&self) -> i64 {
        let imm = (self.bits(31, 31) << 20)
            | (self.bits(19, 12) << 12)
            | (self.bits(20, 20) << 11)
            | (self.bits(30, 21) << 1);
        sign_extend(imm, 20)
    }

    // ------------------------------------------------------------
    // Compressed formats (low 16 bits of the word)

    /// Full 5-bit rd/rs1 field of the CI/CR formats (bits 11:7)
    pub fn c_rd(&self) -> XRegister {
        XRegister::from_index(extract_field(self.0, 11, 7) as u8)
    }

    /// Full 5-bit rs2 field of the CR/CSS formats (bits 6:2)
    pub fn c_rs2(&self) -> XRegister {
        XRegister::from_index(extract_field(self.0, 6, 2) as u8)
    }

    /// 3-bit rd′ field (bits 4:2), mapping to x8..x15
    pub fn c_rd_prime(&self) -> XRegister {
        XRegister::from_index(8 + extract_field(self.0, 4, 2) as u8)
    }

    /// 3-bit rs1′ field (bits 9:7), mapping to x8..x15
    pub fn c_rs1_prime(&self) -> XRegister {
        XRegister::from_index(8 + extract_field(self.0, 9, 7) as u8)
    }

    /// 3-bit rs2′ field (bits 4:2), mapping to x8..x15
    pub fn c_rs2_prime(&self) -> XRegister {
        XRegister::from_index(8 + extract_field(self.0, 4, 2) as u8)
    }

    /// CI-format 6-bit signed immediate: imm[5] = inst[12],
    /// imm[4:0] = inst[6:2] (C.ADDI, C.ADDIW, C.LI, C.ANDI)
    pub fn imm_ci(&self) -> i64 {
        let imm = (self.bits(12, 12) << 5) | self.bits(6, 2);
        sign_extend(imm, 5)
    }

    /// C.LUI immediate: imm[17] = inst[12], imm[16:12] = inst[6:2],
    /// sign-extended from bit 17
    pub fn imm_clui(&self) -> i64 {
        let imm = (self.bits(12, 12) << 17) | (self.bits(6, 2) << 12);
        sign_extend(imm, 17)
    }

    /// C.ADDI16SP immediate: imm[9|4|6|8:7|5] = inst[12|6|5|4:3|2],
    /// sign-extended from bit 9
    pub fn imm_caddi16sp(&self) -> i64 {
        let imm = (self.bits(12, 12) << 9)
            | (self.bits(6, 6) << 4)
            | (self.bits(5, 5) << 6)
            | (self.bits(4, 3) << 7)
            | (self.bits(2, 2) << 5);
        sign_extend(imm, 9)
    }

    /// C.ADDI4SPN zero-extended immediate:
    /// uimm[5:4|9:6|2|3] = inst[12:11|10:7|6|5]
    pub fn uimm_caddi4spn(&self) -> u64 {
        (self.bits(12, 11) << 4)
            | (self.bits(10, 7) << 6)
            | (self.bits(6, 6) << 2)
            | (self.bits(5, 5) << 3)
    }

    /// CL/CS word offset: uimm[5:3|2|6] = inst[12:10|6|5]
    pub fn uimm_cw(&self) -> u64 {
        (self.bits(12, 10) << 3) | (self.bits(6, 6) << 2) | (self.bits(5, 5) << 6)
    }

    /// CL/CS doubleword offset: uimm[5:3|7:6] = inst[12:10|6:5]
    pub fn uimm_cd(&self) -> u64 {
        (self.bits(12, 10) << 3) | (self.bits(6, 5) << 6)
    }

    /// C.LWSP offset: uimm[5|4:2|7:6] = inst[12|6:4|3:2]
    pub fn uimm_clwsp(&self) -> u64 {
        (self.bits(12, 12) << 5) | (self.bits(6, 4) << 2) | (self.bits(3, 2) << 6)
    }

    /// C.LDSP offset: uimm[5|4:3|8:6] = inst[12|6:5|4:2]
    pub fn uimm_cldsp(&self) -> u64 {
        (self.bits(12, 12) << 5) | (self.bits(6, 5) << 3) | (self.bits(4, 2) << 6)
    }

    /// C.SWSP offset: uimm[5:2|7:6] = inst[12:9|8:7]
    pub fn uimm_cswsp(&self) -> u64 {
        (self.bits(12, 9) << 2) | (self.bits(8, 7) << 6)
    }

    /// C.SDSP offset: uimm[5:3|8:6] = inst[12:10|9:7]
    pub fn uimm_csdsp(&self) -> u64 {
        (self.bits(12, 10) << 3) | (self.bits(9, 7) << 6)
    }

    /// CJ immediate: imm[11|4|9:8|10|6|7|3:1|5] =
    /// inst[12|11|10:9|8|7|6|5:3|2], 12-bit signed, bit 0 zero
    pub fn imm_cj(&self) -> i64 {
        let imm = (self.bits(12, 12) << 11)
            | (self.bits(11, 11) << 4)
            | (self.bits(10, 9) << 8)
            | (self.bits(8, 8) << 10)
            | (self.bits(7, 7) << 6)
            | (self.bits(6, 6) << 7)
            | (self.bits(5, 3) << 1)
            | (self.bits(2, 2) << 5);
        sign_extend(imm, 11)
    }

    /// CB branch immediate: imm[8|4:3|7:6|2:1|5] =
    /// inst[12|11:10|6:5|4:3|2], 9-bit signed, bit 0 zero
    pub fn imm_cb(&self) -> i64 {
        let imm = (self.bits(12, 12) << 8)
            | (self.bits(11, 10) << 3)
            | (self.bits(6, 5) << 6)
            | (self.bits(4, 3) << 1)
            | (self.bits(2, 2) << 5);
        sign_extend(imm, 8)
    }

    /// 6-bit compressed shift amount: shamt[5] = inst[12],
    /// shamt[4:0] = inst[6:2]
    pub fn c_shamt(&self) -> u32 {
        (extract_field(self.0, 12, 12) << 5) | extract_field(self.0, 6, 2)
    }
}
