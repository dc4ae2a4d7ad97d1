//! Two-pass assembler for the LC-3 subset.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOOP    ADD R1, R1, #-1   ; label, then instruction
//!         BRp LOOP          ; PC-relative branch to a label
//!         LD R0, CHAR
//!         OUT               ; TRAP x21
//!         HALT              ; TRAP x25
//! CHAR:   .FILL x41         ; a trailing colon on labels is optional
//! BUF     .BLKW 3           ; three zero words
//! ```
//!
//! Numbers are `#decimal`, `xHEX`, `0xHEX`, `bBINARY` or plain decimal.
//! Mnemonics, registers and labels are case-insensitive.

use crate::bits::BitVector;
use crate::cpu::decode::{encode, Instruction, Operand, TRAP_HALT, TRAP_OUT};
use crate::cpu::execute::MAX_PROGRAM_WORDS;
use crate::cpu::registers::Reg;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Assemble source code to a list of machine words.
pub fn assemble(source: &str) -> Result<Vec<BitVector>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// One statement remembered between the passes.
struct Statement<'a> {
    line: usize,
    addr: usize,
    mnemonic: String,
    operands: Vec<&'a str>,
}

/// The assembler state.
struct Assembler<'a> {
    /// Current address.
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Statements collected by pass 1.
    statements: Vec<Statement<'a>>,
}

impl<'a> Assembler<'a> {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            statements: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &'a str) -> Result<Vec<BitVector>, AssemblerError> {
        // Pass 1: assign addresses and collect labels
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: encode with every label known
        let mut output = Vec::with_capacity(self.current_addr);
        for stmt in &self.statements {
            self.encode_statement(stmt, &mut output)?;
        }

        debug!(words = output.len(), labels = self.symbols.len(), "assembled");
        Ok(output)
    }

    fn process_line(&mut self, line: &'a str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };

        let tokens: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();

        let Some(&first) = tokens.first() else {
            return Ok(());
        };

        // A leading token is a label if it carries a colon or is followed by
        // a mnemonic (or nothing at all).
        let rest = if !is_mnemonic(first)
            && (first.ends_with(':') || tokens.get(1).map_or(true, |t| is_mnemonic(t)))
        {
            self.define_label(first.trim_end_matches(':'), line_num)?;
            &tokens[1..]
        } else {
            &tokens[..]
        };

        let Some((&mnemonic, operands)) = rest.split_first() else {
            return Ok(());
        };

        let mnemonic = mnemonic.to_uppercase();
        if !is_mnemonic(&mnemonic) {
            return Err(AssemblerError::UnknownMnemonic { line: line_num, mnemonic });
        }

        let size = if mnemonic == ".BLKW" {
            let [count] = expect_operands::<1>(operands, line_num)?;
            let count = parse_number(count).ok_or_else(|| AssemblerError::SyntaxError {
                line: line_num,
                message: format!(".BLKW needs a number, got '{}'", count),
            })?;
            check_range(count, 1, MAX_PROGRAM_WORDS as i32, line_num)? as usize
        } else {
            1
        };

        self.statements.push(Statement {
            line: line_num,
            addr: self.current_addr,
            mnemonic,
            operands: operands.to_vec(),
        });
        self.current_addr += size;

        if self.current_addr > MAX_PROGRAM_WORDS {
            return Err(AssemblerError::ProgramTooLarge { size: self.current_addr });
        }

        Ok(())
    }

    fn define_label(&mut self, label: &str, line_num: usize) -> Result<(), AssemblerError> {
        let valid = label.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid label '{}'", label),
            });
        }
        // operands try numbers first, so `X1` or `B10` could never be referenced
        if parse_number(label).is_some() {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("label '{}' reads as a number", label),
            });
        }

        let label = label.to_uppercase();
        if self.symbols.contains_key(&label) {
            return Err(AssemblerError::DuplicateLabel { line: line_num, label });
        }
        self.symbols.insert(label, self.current_addr);
        Ok(())
    }

    fn encode_statement(&self, stmt: &Statement<'_>, output: &mut Vec<BitVector>) -> Result<(), AssemblerError> {
        let line = stmt.line;
        let ops = stmt.operands.as_slice();

        let instr = match stmt.mnemonic.as_str() {
            // Directives
            ".FILL" => {
                let [value] = expect_operands::<1>(ops, line)?;
                let value = match parse_number(value) {
                    Some(n) => check_range(n, i32::from(i16::MIN), i32::from(u16::MAX), line)?,
                    None => self.lookup(value, line)? as i32,
                };
                output.push(BitVector::from_word(value as u16));
                return Ok(());
            }
            ".BLKW" => {
                let [count] = expect_operands::<1>(ops, line)?;
                let count = parse_number(count).unwrap_or(0).max(0) as usize;
                output.extend(std::iter::repeat(BitVector::word()).take(count));
                return Ok(());
            }

            "ADD" | "AND" => {
                let [dr, sr1, src2] = expect_operands::<3>(ops, line)?;
                let (dr, sr1) = (parse_reg(dr, line)?, parse_reg(sr1, line)?);
                let operand = if looks_like_reg(src2) {
                    Operand::Reg(parse_reg(src2, line)?)
                } else {
                    Operand::Imm(self.immediate(src2, line)?)
                };
                if stmt.mnemonic == "ADD" {
                    Instruction::Add { dr, sr1, operand }
                } else {
                    Instruction::And { dr, sr1, operand }
                }
            }
            "NOT" => {
                let [dr, sr] = expect_operands::<2>(ops, line)?;
                Instruction::Not { dr: parse_reg(dr, line)?, sr: parse_reg(sr, line)? }
            }
            "LD" => {
                let [dr, target] = expect_operands::<2>(ops, line)?;
                Instruction::Ld { dr: parse_reg(dr, line)?, offset: self.pc_offset(target, stmt.addr, line)? }
            }
            "ST" => {
                let [sr, target] = expect_operands::<2>(ops, line)?;
                Instruction::St { sr: parse_reg(sr, line)?, offset: self.pc_offset(target, stmt.addr, line)? }
            }
            "TRAP" => {
                let [vector] = expect_operands::<1>(ops, line)?;
                let vector = parse_number(vector).ok_or_else(|| AssemblerError::SyntaxError {
                    line,
                    message: format!("TRAP needs a vector, got '{}'", vector),
                })?;
                Instruction::Trap { vector: check_range(vector, 0, 255, line)? as u8 }
            }
            "OUT" => {
                expect_operands::<0>(ops, line)?;
                Instruction::Trap { vector: TRAP_OUT }
            }
            "HALT" => {
                expect_operands::<0>(ops, line)?;
                Instruction::Trap { vector: TRAP_HALT }
            }

            branch => {
                let nzp = branch_mask(branch).ok_or_else(|| AssemblerError::UnknownMnemonic {
                    line,
                    mnemonic: branch.to_string(),
                })?;
                let [target] = expect_operands::<1>(ops, line)?;
                Instruction::Br { nzp: BitVector::nzp(nzp), offset: self.pc_offset(target, stmt.addr, line)? }
            }
        };

        output.push(encode(&instr));
        Ok(())
    }

    fn lookup(&self, label: &str, line: usize) -> Result<usize, AssemblerError> {
        let label = label.to_uppercase();
        self.symbols
            .get(&label)
            .copied()
            .ok_or(AssemblerError::UndefinedLabel { line, label })
    }

    /// A literal offset, or a label resolved relative to the incremented PC.
    fn pc_offset(&self, target: &str, addr: usize, line: usize) -> Result<i16, AssemblerError> {
        let offset = match parse_number(target) {
            Some(n) => n,
            None => self.lookup(target, line)? as i32 - (addr as i32 + 1),
        };
        Ok(check_range(offset, -256, 255, line)? as i16)
    }

    fn immediate(&self, value: &str, line: usize) -> Result<i16, AssemblerError> {
        let n = parse_number(value).ok_or_else(|| AssemblerError::SyntaxError {
            line,
            message: format!("expected a register or immediate, got '{}'", value),
        })?;
        Ok(check_range(n, -16, 15, line)? as i16)
    }
}

/// `BR`, `BRn`, `BRzp`, ... to an `nzp` mask. Flags must appear in n, z, p order.
fn branch_mask(mnemonic: &str) -> Option<u8> {
    let flags = mnemonic.strip_prefix("BR")?;
    if flags.is_empty() {
        return Some(0b111);
    }

    let mut mask = 0u8;
    let mut last = 0u8;
    for c in flags.chars() {
        let bit = match c {
            'N' => 0b100,
            'Z' => 0b010,
            'P' => 0b001,
            _ => return None,
        };
        // each flag at most once, in order
        if last != 0 && bit >= last {
            return None;
        }
        mask |= bit;
        last = bit;
    }
    Some(mask)
}

fn is_mnemonic(token: &str) -> bool {
    let upper = token.to_uppercase();
    matches!(
        upper.as_str(),
        "ADD" | "AND" | "NOT" | "LD" | "ST" | "TRAP" | "OUT" | "HALT" | ".FILL" | ".BLKW"
    ) || branch_mask(&upper).is_some()
}

fn looks_like_reg(token: &str) -> bool {
    token.starts_with(|c: char| c.eq_ignore_ascii_case(&'r')) && token.len() > 1 && token[1..].chars().all(|c| c.is_ascii_digit())
}

fn parse_reg(token: &str, line: usize) -> Result<Reg, AssemblerError> {
    if looks_like_reg(token) {
        if let Some(reg) = token[1..].parse::<u8>().ok().and_then(Reg::new) {
            return Ok(reg);
        }
    }
    Err(AssemblerError::InvalidRegister { line, token: token.to_string() })
}

/// Parse `#dec`, `xHEX`, `0xHEX`, `bBIN` or plain decimal.
fn parse_number(token: &str) -> Option<i32> {
    let (digits, radix) = if let Some(rest) = token.strip_prefix('#') {
        (rest, 10)
    } else if let Some(rest) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = token.strip_prefix(|c: char| c.eq_ignore_ascii_case(&'x')) {
        (rest, 16)
    } else if let Some(rest) = token.strip_prefix(|c: char| c.eq_ignore_ascii_case(&'b')) {
        (rest, 2)
    } else {
        (token, 10)
    };

    let (negative, digits) = match digits.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, digits),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let value = i32::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

fn check_range(value: i32, min: i32, max: i32, line: usize) -> Result<i32, AssemblerError> {
    if value < min || value > max {
        return Err(AssemblerError::ValueOutOfRange { line, value, min, max });
    }
    Ok(value)
}

fn expect_operands<'o, const N: usize>(operands: &[&'o str], line: usize) -> Result<[&'o str; N], AssemblerError> {
    <[&str; N]>::try_from(operands).map_err(|_| AssemblerError::SyntaxError {
        line,
        message: format!("expected {} operand(s), found {}", N, operands.len()),
    })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: {token} (expected R0-R7)")]
    InvalidRegister { line: usize, token: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value} (expected {min} to {max})")]
    ValueOutOfRange { line: usize, value: i32, min: i32, max: i32 },

    #[error("program needs {size} words but at most {max} fit", max = MAX_PROGRAM_WORDS)]
    ProgramTooLarge { size: usize },
}
