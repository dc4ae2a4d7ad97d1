//! Instruction decoder.
//!
//! Every instruction is one 16-bit word whose top four bits select the
//! opcode. Fields are read with MSB-first slices of the word, so `[4:7)`
//! below means bits 4, 5 and 6 counting from the left.
//!
//! ```text
//! BR    0000 nzp pcoffset9
//! ADD   0001 dr  sr1 0 00 sr2
//! ADD   0001 dr  sr1 1 imm5
//! LD    0010 dr  pcoffset9
//! ST    0011 sr  pcoffset9
//! AND   0101 dr  sr1 0 00 sr2
//! AND   0101 dr  sr1 1 imm5
//! NOT   1001 dr  sr  111111
//! TRAP  1111 0000 trapvect8
//! ```

use crate::bits::{BitVector, BitsError, WORD_WIDTH};
use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// TRAP vector that writes the low byte of R0 to the output sink.
pub const TRAP_OUT: u8 = 0x21;

/// TRAP vector that stops the machine.
pub const TRAP_HALT: u8 = 0x25;

/// Second source operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register operand (bit 10 clear)
    Reg(Reg),
    /// Sign-extended imm5 operand (bit 10 set)
    Imm(i16),
}

/// The implemented opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Br = 0b0000,
    Add = 0b0001,
    Ld = 0b0010,
    St = 0b0011,
    And = 0b0101,
    Not = 0b1001,
    Trap = 0b1111,
}

impl Opcode {
    /// Look up a 4-bit opcode field.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b0000 => Some(Opcode::Br),
            0b0001 => Some(Opcode::Add),
            0b0010 => Some(Opcode::Ld),
            0b0011 => Some(Opcode::St),
            0b0101 => Some(Opcode::And),
            0b1001 => Some(Opcode::Not),
            0b1111 => Some(Opcode::Trap),
            _ => None,
        }
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Br => "BR",
            Opcode::Add => "ADD",
            Opcode::Ld => "LD",
            Opcode::St => "ST",
            Opcode::And => "AND",
            Opcode::Not => "NOT",
            Opcode::Trap => "TRAP",
        }
    }
}

/// A decoded instruction.
///
/// Offsets and immediates are already sign-extended to 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Branch: if any flag in `nzp` is set in CC, PC := PC + offset
    Br { nzp: BitVector, offset: i16 },

    /// Add: DR := SR1 + operand
    Add { dr: Reg, sr1: Reg, operand: Operand },

    /// Load: DR := mem[PC + offset]
    Ld { dr: Reg, offset: i16 },

    /// Store: mem[PC + offset] := SR
    St { sr: Reg, offset: i16 },

    /// Bitwise and: DR := SR1 & operand
    And { dr: Reg, sr1: Reg, operand: Operand },

    /// Bitwise not: DR := !SR
    Not { dr: Reg, sr: Reg },

    /// System call selected by an 8-bit vector
    Trap { vector: u8 },
}

impl Instruction {
    /// The opcode this instruction encodes to.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::St { .. } => Opcode::St,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Trap { .. } => Opcode::Trap,
        }
    }
}

/// Read the 4-bit opcode field of a word without decoding the rest.
pub fn opcode_bits(word: BitVector) -> Result<u8, DecodeError> {
    Ok(field(word, 0, 4)?.unsigned() as u8)
}

/// Decode a 16-bit instruction word.
pub fn decode(word: BitVector) -> Result<Instruction, DecodeError> {
    if word.width() != WORD_WIDTH {
        return Err(DecodeError::BadWidth(word.width()));
    }

    let bits = opcode_bits(word)?;
    let opcode = Opcode::from_bits(bits).ok_or(DecodeError::IllegalOpcode(bits))?;

    let instruction = match opcode {
        Opcode::Br => Instruction::Br {
            nzp: field(word, 4, 3)?,
            offset: pc_offset9(word)?,
        },
        Opcode::Add => Instruction::Add {
            dr: reg(word, 4)?,
            sr1: reg(word, 7)?,
            operand: operand(word)?,
        },
        Opcode::Ld => Instruction::Ld {
            dr: reg(word, 4)?,
            offset: pc_offset9(word)?,
        },
        Opcode::St => Instruction::St {
            sr: reg(word, 4)?,
            offset: pc_offset9(word)?,
        },
        Opcode::And => Instruction::And {
            dr: reg(word, 4)?,
            sr1: reg(word, 7)?,
            operand: operand(word)?,
        },
        Opcode::Not => Instruction::Not {
            dr: reg(word, 4)?,
            sr: reg(word, 7)?,
        },
        Opcode::Trap => Instruction::Trap {
            vector: field(word, 8, 8)?.unsigned() as u8,
        },
    };

    Ok(instruction)
}

fn field(word: BitVector, start: usize, length: usize) -> Result<BitVector, DecodeError> {
    Ok(word.slice(start, length)?)
}

fn reg(word: BitVector, start: usize) -> Result<Reg, DecodeError> {
    Ok(Reg::from_field(field(word, start, 3)?))
}

fn pc_offset9(word: BitVector) -> Result<i16, DecodeError> {
    Ok(field(word, 7, 9)?.sign_extend(WORD_WIDTH)?.signed() as i16)
}

fn operand(word: BitVector) -> Result<Operand, DecodeError> {
    if field(word, 10, 1)?.unsigned() == 1 {
        let imm = field(word, 11, 5)?.sign_extend(WORD_WIDTH)?;
        Ok(Operand::Imm(imm.signed() as i16))
    } else {
        Ok(Operand::Reg(reg(word, 13)?))
    }
}

/// Encode an instruction back to a 16-bit word.
///
/// Offsets and immediates are truncated to their field widths; the
/// assembler range-checks them before calling this.
pub fn encode(instr: &Instruction) -> BitVector {
    let op = (instr.opcode() as u16) << 12;
    let reg_at = |reg: Reg, shift: u16| (reg.index() as u16) << shift;
    let offset9 = |offset: i16| offset as u16 & 0x1FF;
    let operand_bits = |operand: Operand| match operand {
        Operand::Reg(sr2) => reg_at(sr2, 0),
        Operand::Imm(imm) => 1 << 5 | (imm as u16 & 0x1F),
    };

    let word = match *instr {
        Instruction::Br { nzp, offset } => op | (nzp.unsigned() as u16 & 0b111) << 9 | offset9(offset),
        Instruction::Add { dr, sr1, operand } => op | reg_at(dr, 9) | reg_at(sr1, 6) | operand_bits(operand),
        Instruction::Ld { dr, offset } => op | reg_at(dr, 9) | offset9(offset),
        Instruction::St { sr, offset } => op | reg_at(sr, 9) | offset9(offset),
        Instruction::And { dr, sr1, operand } => op | reg_at(dr, 9) | reg_at(sr1, 6) | operand_bits(operand),
        Instruction::Not { dr, sr } => op | reg_at(dr, 9) | reg_at(sr, 6) | 0x3F,
        Instruction::Trap { vector } => op | vector as u16,
    };

    BitVector::from_word(word)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal opcode: {0} ({0:04b})")]
    IllegalOpcode(u8),

    #[error("instruction must be 16 bits wide, got {0}")]
    BadWidth(usize),

    #[error("instruction format error: {0}")]
    Field(#[from] BitsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(literal: &str) -> BitVector {
        let cleaned: String = literal.chars().filter(|c| !c.is_whitespace()).collect();
        BitVector::from_literal(16, &cleaned).unwrap()
    }

    fn r(index: u8) -> Reg {
        Reg::new(index).unwrap()
    }

    #[test]
    fn test_decode_add_register() {
        let instr = decode(word("0001 000 010 0 00 010")).unwrap();
        assert_eq!(instr, Instruction::Add { dr: r(0), sr1: r(2), operand: Operand::Reg(r(2)) });
    }

    #[test]
    fn test_decode_add_negative_immediate() {
        let instr = decode(word("0001 000 010 1 11101")).unwrap();
        assert_eq!(instr, Instruction::Add { dr: r(0), sr1: r(2), operand: Operand::Imm(-3) });
    }

    #[test]
    fn test_decode_branch() {
        let instr = decode(word("0000 001 111111110")).unwrap();
        assert_eq!(instr, Instruction::Br { nzp: BitVector::nzp(0b001), offset: -2 });
    }

    #[test]
    fn test_decode_not_and_trap() {
        assert_eq!(
            decode(word("1001100101111111")).unwrap(),
            Instruction::Not { dr: r(4), sr: r(5) }
        );
        assert_eq!(
            decode(word("1111 0000 00100101")).unwrap(),
            Instruction::Trap { vector: TRAP_HALT }
        );
    }

    #[test]
    fn test_decode_memory_ops() {
        assert_eq!(
            decode(word("0010 000 000000001")).unwrap(),
            Instruction::Ld { dr: r(0), offset: 1 }
        );
        assert_eq!(
            decode(word("0011 001 100000000")).unwrap(),
            Instruction::St { sr: r(1), offset: -256 }
        );
    }

    #[test]
    fn test_illegal_opcodes() {
        for bits in [4u8, 6, 7, 8, 10, 11, 12, 13, 14] {
            let w = BitVector::from_word((bits as u16) << 12);
            assert_eq!(decode(w), Err(DecodeError::IllegalOpcode(bits)));
        }
    }

    #[test]
    fn test_decode_rejects_narrow_word() {
        assert_eq!(decode(BitVector::nzp(0)), Err(DecodeError::BadWidth(3)));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let test_cases = [
            Instruction::Br { nzp: BitVector::nzp(0b101), offset: 255 },
            Instruction::Add { dr: r(7), sr1: r(1), operand: Operand::Imm(-16) },
            Instruction::Add { dr: r(3), sr1: r(3), operand: Operand::Reg(r(6)) },
            Instruction::Ld { dr: r(2), offset: -1 },
            Instruction::St { sr: r(5), offset: 17 },
            Instruction::And { dr: r(1), sr1: r(1), operand: Operand::Imm(15) },
            Instruction::Not { dr: r(4), sr: r(5) },
            Instruction::Trap { vector: TRAP_OUT },
        ];

        for instr in test_cases {
            assert_eq!(decode(encode(&instr)).unwrap(), instr);
        }
    }

    #[test]
    fn test_encode_matches_hand_assembly() {
        let not = Instruction::Not { dr: r(4), sr: r(5) };
        assert_eq!(encode(&not).to_string(), "1001100101111111");

        let halt = Instruction::Trap { vector: TRAP_HALT };
        assert_eq!(encode(&halt).to_string(), "1111000000100101");
    }
}
