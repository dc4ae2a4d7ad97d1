//! Disassembler for LC-3 subset programs.
//!
//! Output uses the assembler's own syntax, so a listing can be fed back to
//! [`assemble`](crate::asm::assemble).

use crate::bits::BitVector;
use crate::cpu::decode::{decode, encode, Instruction, Operand, TRAP_HALT, TRAP_OUT};

/// Disassemble a single word to text.
///
/// Words that do not decode, branches that can never be taken, and words
/// with stray bits in unused fields are shown as `.FILL` data, so the text
/// always assembles back to the same word.
pub fn disassemble_instruction(word: BitVector) -> String {
    match decode(word) {
        Ok(Instruction::Br { nzp, .. }) if nzp.is_zero() => fill(word),
        Ok(decoded) if encode(&decoded) == word => format_instruction(&decoded),
        _ => fill(word),
    }
}

/// Disassemble a slice of words into an address-annotated listing.
pub fn disassemble(words: &[BitVector]) -> String {
    let mut output = String::new();
    output.push_str("; lc3-mini disassembly\n");
    output.push_str("; ---------------------\n\n");

    for (addr, word) in words.iter().enumerate() {
        let line = disassemble_instruction(*word);
        output.push_str(&format!("{:<22} ; {:02}: {}\n", line, addr, word));
    }

    output
}

fn fill(word: BitVector) -> String {
    format!(".FILL x{:04X}", word.unsigned())
}

/// Format a decoded instruction as assembly text.
pub fn format_instruction(instr: &Instruction) -> String {
    match *instr {
        Instruction::Br { nzp, offset } => {
            let flags: String = [('n', 0b100), ('z', 0b010), ('p', 0b001)]
                .iter()
                .filter(|(_, bit)| nzp.unsigned() & bit != 0)
                .map(|(c, _)| *c)
                .collect();
            format!("BR{} #{}", flags, offset)
        }
        Instruction::Add { dr, sr1, operand } | Instruction::And { dr, sr1, operand } => {
            format!("{} {}, {}, {}", instr.opcode().mnemonic(), dr, sr1, format_operand(operand))
        }
        Instruction::Ld { dr: reg, offset } | Instruction::St { sr: reg, offset } => {
            format!("{} {}, #{}", instr.opcode().mnemonic(), reg, offset)
        }
        Instruction::Not { dr, sr } => format!("NOT {}, {}", dr, sr),
        Instruction::Trap { vector: TRAP_OUT } => "OUT".to_string(),
        Instruction::Trap { vector: TRAP_HALT } => "HALT".to_string(),
        Instruction::Trap { vector } => format!("TRAP x{:02X}", vector),
    }
}

fn format_operand(operand: Operand) -> String {
    match operand {
        Operand::Reg(reg) => reg.to_string(),
        Operand::Imm(imm) => format!("#{}", imm),
    }
}
