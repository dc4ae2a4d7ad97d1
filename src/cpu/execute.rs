//! CPU execution engine.
//!
//! Implements program loading, the fetch-decode-execute cycle and the seven
//! instruction handlers.

use crate::bits::{BitVector, BitsError, WORD_WIDTH};
use crate::cpu::{Memory, RegisterFile, ConditionCode};
use crate::cpu::decode::{self, Instruction, Operand, DecodeError, TRAP_HALT, TRAP_OUT};
use crate::cpu::memory::{MemoryError, MEMORY_SIZE};
use crate::cpu::registers::{Reg, REGISTER_COUNT};
use serde::{Serialize, Deserialize};
use std::io::{self, Write};
use thiserror::Error;
use tracing::{debug, trace};

/// Most words a single program may hold.
pub const MAX_PROGRAM_WORDS: usize = MEMORY_SIZE - 1;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed TRAP x25).
    Halted,
    /// CPU stopped on a fatal error.
    Faulted,
}

/// Destination for characters written by TRAP OUT.
///
/// Characters arrive one at a time, in program order.
pub trait OutputSink {
    fn put(&mut self, ch: char) -> io::Result<()>;
}

impl OutputSink for String {
    fn put(&mut self, ch: char) -> io::Result<()> {
        self.push(ch);
        Ok(())
    }
}

/// An [`OutputSink`] that writes through to any [`Write`] and flushes after
/// every character.
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleSink<io::Stdout> {
    /// Sink for the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> OutputSink for ConsoleSink<W> {
    fn put(&mut self, ch: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.out.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
        self.out.flush()
    }
}

/// The simulated computer.
///
/// All state is private; accessors hand out owned copies.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "SavedComputer")]
pub struct Computer {
    regs: RegisterFile,
    mem: Memory,
    pc: BitVector,
    ir: BitVector,
    cc: ConditionCode,
    state: CpuState,
    cycles: u64,
    loaded: bool,
    #[serde(skip)]
    last_instr: Option<Instruction>,
}

/// A deserialized [`Computer`] before its word widths are checked.
#[derive(Deserialize)]
struct SavedComputer {
    regs: RegisterFile,
    mem: Memory,
    pc: BitVector,
    ir: BitVector,
    cc: ConditionCode,
    state: CpuState,
    cycles: u64,
    #[serde(default)]
    loaded: bool,
}

impl TryFrom<SavedComputer> for Computer {
    type Error = RestoreError;

    fn try_from(saved: SavedComputer) -> Result<Self, Self::Error> {
        for (register, value) in [("pc", saved.pc), ("ir", saved.ir)] {
            if value.width() != WORD_WIDTH {
                return Err(RestoreError::BadWidth { register, width: value.width() });
            }
        }

        Ok(Self {
            regs: saved.regs,
            mem: saved.mem,
            pc: saved.pc,
            ir: saved.ir,
            cc: saved.cc,
            state: saved.state,
            cycles: saved.cycles,
            loaded: saved.loaded,
            last_instr: None,
        })
    }
}

impl Computer {
    /// Create a computer with Ri = i, zeroed memory, PC = IR = 0 and CC = 000.
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(),
            mem: Memory::new(),
            pc: BitVector::word(),
            ir: BitVector::word(),
            cc: ConditionCode::new(),
            state: CpuState::Running,
            cycles: 0,
            loaded: false,
            last_instr: None,
        }
    }

    /// Load a program written as strings of `'0'`/`'1'`.
    ///
    /// Whitespace inside a word is ignored. Every word is validated before
    /// any memory is written, so a bad word leaves memory untouched.
    pub fn load_machine_code<S: AsRef<str>>(&mut self, words: &[S]) -> Result<(), LoadError> {
        check_count(words.len())?;

        let program = words
            .iter()
            .enumerate()
            .map(|(index, word)| {
                let cleaned: String = word.as_ref().chars().filter(|c| !c.is_whitespace()).collect();
                BitVector::from_literal(WORD_WIDTH, &cleaned)
                    .map_err(|source| LoadError::BadWord { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.load_program(&program)
    }

    /// Load already-parsed words into memory starting at address 0.
    ///
    /// A machine takes one program. A failed load can be retried.
    pub fn load_program(&mut self, program: &[BitVector]) -> Result<(), LoadError> {
        if self.cycles > 0 || self.state != CpuState::Running {
            return Err(LoadError::AlreadyStarted);
        }
        if self.loaded {
            return Err(LoadError::AlreadyLoaded);
        }
        check_count(program.len())?;
        if let Some(index) = program.iter().position(|word| word.width() != WORD_WIDTH) {
            return Err(LoadError::BadWord {
                index,
                source: BitsError::WrongLength { expected: WORD_WIDTH, got: program[index].width() },
            });
        }

        self.mem.load_program(program)?;
        self.loaded = true;
        debug!(words = program.len(), "program loaded");
        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. Any error
    /// leaves the machine in [`CpuState::Faulted`].
    pub fn step(&mut self, out: &mut dyn OutputSink) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        match self.cycle(out) {
            Ok(instr) => Ok(instr),
            Err(e) => {
                self.state = CpuState::Faulted;
                debug!(pc = self.pc.unsigned(), error = %e, "cpu fault");
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn execute(&mut self, out: &mut dyn OutputSink) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64, out: &mut dyn OutputSink) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn cycle(&mut self, out: &mut dyn OutputSink) -> Result<Instruction, CpuError> {
        // Fetch
        self.ir = self.mem.read(self.pc.unsigned() as i32)?;

        // PC points past the fetched word for the rest of the cycle
        self.pc.set_signed(self.pc.unsigned() as i32 + 1);

        // Decode
        let pc = self.pc.unsigned();
        let instr = decode::decode(self.ir).map_err(|e| match e {
            DecodeError::IllegalOpcode(opcode) => CpuError::IllegalInstruction { opcode, pc },
            other => CpuError::DecodeError(other),
        })?;

        // Execute
        self.execute_instruction(instr, out)?;
        trace!(pc = pc - 1, ir = %self.ir, ?instr, cc = %self.cc, "executed");

        self.cycles += 1;
        self.last_instr = Some(instr);

        Ok(instr)
    }

    /// Execute a decoded instruction.
    fn execute_instruction(&mut self, instr: Instruction, out: &mut dyn OutputSink) -> Result<(), CpuError> {
        match instr {
            Instruction::Br { nzp, offset } => {
                if self.cc.matches(nzp) {
                    let target = self.effective_address(offset);
                    self.pc.set_signed(target);
                }
            }

            Instruction::Add { dr, sr1, operand } => {
                let sum = self.regs.get(sr1).signed() + self.operand_value(operand).signed();
                let mut result = BitVector::word();
                result.set_signed(sum);
                self.write_result(dr, result);
            }

            Instruction::Ld { dr, offset } => {
                let value = self.mem.read(self.effective_address(offset))?;
                self.write_result(dr, value);
            }

            Instruction::St { sr, offset } => {
                let value = self.regs.get(sr);
                self.mem.write(self.effective_address(offset), value)?;
            }

            Instruction::And { dr, sr1, operand } => {
                let result = self.regs.get(sr1).and(&self.operand_value(operand))?;
                self.write_result(dr, result);
            }

            Instruction::Not { dr, sr } => {
                let mut result = self.regs.get(sr);
                result.invert();
                self.write_result(dr, result);
            }

            Instruction::Trap { vector } => self.trap(vector, out)?,
        }

        Ok(())
    }

    fn trap(&mut self, vector: u8, out: &mut dyn OutputSink) -> Result<(), CpuError> {
        match vector {
            TRAP_OUT => {
                let byte = self.regs.get(Reg::R0).slice(8, 8)?.unsigned() as u8;
                out.put(char::from(byte)).map_err(|e| CpuError::Output(e.to_string()))?;
            }
            TRAP_HALT => {
                self.state = CpuState::Halted;
                debug!(cycles = self.cycles + 1, "halted");
            }
            _ => {
                return Err(CpuError::UnknownTrap { vector, pc: self.pc.unsigned() });
            }
        }
        Ok(())
    }

    /// Store a result register and set CC from its sign.
    fn write_result(&mut self, dr: Reg, value: BitVector) {
        self.regs.set(dr, value);
        self.cc.set_from(value.signed());
    }

    /// PC-relative address: incremented PC plus a sign-extended offset.
    fn effective_address(&self, offset: i16) -> i32 {
        self.pc.unsigned() as i32 + i32::from(offset)
    }

    fn operand_value(&self, operand: Operand) -> BitVector {
        match operand {
            Operand::Reg(sr2) => self.regs.get(sr2),
            Operand::Imm(imm) => BitVector::from_word(imm as u16),
        }
    }

    /// Copies of R0-R7.
    pub fn registers(&self) -> [BitVector; REGISTER_COUNT] {
        self.regs.to_array()
    }

    /// Copies of every memory cell.
    pub fn memory(&self) -> Vec<BitVector> {
        self.mem.cells()
    }

    /// Read one memory cell.
    pub fn memory_at(&self, addr: usize) -> Option<BitVector> {
        self.mem.read(i32::try_from(addr).ok()?).ok()
    }

    pub fn pc(&self) -> BitVector {
        self.pc
    }

    pub fn ir(&self) -> BitVector {
        self.ir
    }

    /// The raw 3-bit condition code.
    pub fn cc(&self) -> BitVector {
        self.cc.bits()
    }

    pub fn condition_code(&self) -> ConditionCode {
        self.cc
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Instructions executed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

fn check_count(count: usize) -> Result<(), LoadError> {
    match count {
        0 => Err(LoadError::Empty),
        n if n > MAX_PROGRAM_WORDS => Err(LoadError::TooLong { count: n }),
        _ => Ok(()),
    }
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Computer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computer")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("pc", &self.pc.unsigned())
            .field("cc", &self.cc)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that reject a program before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("program is empty")]
    Empty,

    #[error("program has {count} words (at most {max} allowed)", max = MAX_PROGRAM_WORDS)]
    TooLong { count: usize },

    #[error("word {index}: {source}")]
    BadWord { index: usize, source: BitsError },

    #[error("cannot load a program after execution has started")]
    AlreadyStarted,

    #[error("a program is already loaded")]
    AlreadyLoaded,

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),
}

/// Errors from restoring a serialized [`Computer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("{register} must be 16 bits wide, got {width}")]
    BadWidth { register: &'static str, width: usize },
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("illegal instruction: opcode {opcode} ({opcode:04b}) before PC={pc}")]
    IllegalInstruction { opcode: u8, pc: u32 },

    #[error("decode error: {0}")]
    DecodeError(DecodeError),

    #[error("unknown TRAP vector x{vector:02X} before PC={pc}")]
    UnknownTrap { vector: u8, pc: u32 },

    #[error("bit vector error: {0}")]
    Bits(#[from] BitsError),

    #[error("output error: {0}")]
    Output(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;

    fn run(program: &[&str]) -> (Computer, String) {
        let mut cpu = Computer::new();
        cpu.load_machine_code(program).unwrap();
        let mut out = String::new();
        cpu.execute(&mut out).unwrap();
        (cpu, out)
    }

    fn reg(cpu: &Computer, index: usize) -> i32 {
        cpu.registers()[index].signed()
    }

    #[test]
    fn test_halt() {
        let (cpu, out) = run(&["1111 0000 00100101"]);
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles(), 1);
        assert_eq!(cpu.pc().unsigned(), 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_add_register_register() {
        let (cpu, _) = run(&[
            "0001000010000010", // R0 <- R2 + R2
            "1111000000100101", // HALT
        ]);
        assert_eq!(reg(&cpu, 0), 4);
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_add_positive_immediate() {
        let (cpu, _) = run(&[
            "0001 000 010100011", // R0 <- R2 + #3
            "1111 000000100101",  // HALT
        ]);
        assert_eq!(reg(&cpu, 0), 5);
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_add_negative_immediate() {
        let (cpu, _) = run(&[
            "0001 000 010 1 11101", // R0 <- R2 + #-3
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 0), -1);
        assert_eq!(cpu.cc().to_string(), "100");
    }

    #[test]
    fn test_add_wraps_on_overflow() {
        let (cpu, _) = run(&[
            "0010 000 000000010",   // LD R0, + #2
            "0001 000 000 1 00001", // R0 <- R0 + #1
            "1111 0000 00100101",   // HALT
            "0111 1111 1111 1111",  // 32767
        ]);
        assert_eq!(reg(&cpu, 0), -32768);
        assert_eq!(cpu.cc().to_string(), "100");
    }

    #[test]
    fn test_not_sets_cc_from_result() {
        let (cpu, _) = run(&[
            "1001100101111111", // R4 <- NOT R5
            "1111000000100101", // HALT
        ]);
        assert_eq!(cpu.registers()[4].to_string(), "1111111111111010");
        assert_eq!(reg(&cpu, 4), -6);
        assert_eq!(cpu.cc().to_string(), "100");
    }

    #[test]
    fn test_and_with_sign_replicated_immediate() {
        let (cpu, _) = run(&[
            "0001 001 001 1 00110", // R1 <- R1 + #6 (7)
            "0101 001 001 1 11101", // R1 <- R1 AND #-3
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 1), 5);
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_and_sets_zero_flag() {
        let (cpu, _) = run(&[
            "0101 011 010 0 00 101", // R3 <- R2 AND R5 (2 & 5 = 0)
            "1111 0000 00100101",    // HALT
        ]);
        assert_eq!(reg(&cpu, 3), 0);
        assert_eq!(cpu.cc().to_string(), "010");
    }

    #[test]
    fn test_branch_taken_skips_instruction() {
        let (cpu, _) = run(&[
            "0001 001 001 1 00011", // ADD R1 + #3
            "0000 001 0000 00001",  // BRp + #1
            "0001 001 001 1 01000", // ADD R1 + #8
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 1), 4);
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_branch_not_taken() {
        let (cpu, _) = run(&[
            "0001 001 001 1 00011", // ADD R1 + #3
            "0000 110 000000001",   // BRnz + #1
            "0001 001 001 1 01000", // ADD R1 + #8
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 1), 12);
    }

    #[test]
    fn test_branch_before_any_cc_is_never_taken() {
        let (cpu, _) = run(&[
            "0000 111 000000001",   // BRnzp + #1, CC still 000
            "0001 001 001 1 01000", // ADD R1 + #8
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 1), 9);
    }

    #[test]
    fn test_backward_branch_loop() {
        // Count R1 down from 3 to 0, adding 2 to R0 each pass.
        let (cpu, _) = run(&[
            "0101 000 000 1 00000", // R0 <- R0 AND #0
            "0101 001 001 1 00000", // R1 <- R1 AND #0
            "0001 001 001 1 00011", // R1 <- R1 + #3
            "0001 000 000 1 00010", // loop: R0 <- R0 + #2
            "0001 001 001 1 11111", // R1 <- R1 - 1
            "0000 001 111111101",   // BRp loop (-3)
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(reg(&cpu, 0), 6);
        assert_eq!(reg(&cpu, 1), 0);
        assert_eq!(cpu.cc().to_string(), "010");
    }

    #[test]
    fn test_load() {
        let (cpu, _) = run(&[
            "0010 000 000000001",   // LD + #1
            "1111 0000 00100101",   // HALT
            "0000 0000 0100 0001",  // #65
        ]);
        assert_eq!(reg(&cpu, 0), 65);
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_store() {
        let (cpu, _) = run(&[
            "0001 001 001 1 00111", // ADD R1 + #7
            "0011 001 000000010",   // ST R1 to + #2
            "1111 0000 00100101",   // HALT
        ]);
        assert_eq!(cpu.memory()[4].signed(), 8);
        // ST leaves the ADD's flag in place
        assert_eq!(cpu.cc().to_string(), "001");
    }

    #[test]
    fn test_load_and_trap_out() {
        let (cpu, out) = run(&[
            "0010 000 000000010",  // LD + #2
            "1111 0000 00100001",  // OUT
            "1111 0000 00100101",  // HALT
            "0000 0000 0100 0001", // ASCII 'A'
        ]);
        assert_eq!(out, "A");
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles(), 3);
        assert_eq!(cpu.pc().unsigned(), 3);
    }

    #[test]
    fn test_out_uses_low_byte_only() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&[
            "0010 000 000000010",  // LD + #2
            "1111 0000 00100001",  // OUT
            "1111 0000 00100101",  // HALT
            "0111 1111 0100 0010", // high byte set, low byte 'B'
        ]).unwrap();
        let mut out = String::new();
        cpu.execute(&mut out).unwrap();
        assert_eq!(out, "B");
    }

    #[test]
    fn test_console_sink_writes_in_order() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&[
            "0010 000 000000100",  // LD R0, + #4
            "1111 0000 00100001",  // OUT
            "0001 000 000 1 00001", // R0 <- R0 + 1
            "1111 0000 00100001",  // OUT
            "1111 0000 00100101",  // HALT
            "0000 0000 0110 1000", // 'h'
        ]).unwrap();
        let mut sink = ConsoleSink::new(Vec::new());
        cpu.execute(&mut sink).unwrap();
        assert_eq!(sink.into_inner(), b"hi");
    }

    #[test]
    fn test_illegal_opcode_stops_execution() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&[
            "0100 000 000000000",   // opcode 4 (JSR) is not implemented
            "0001 001 001 1 01000", // never reached
            "1111 0000 00100101",
        ]).unwrap();

        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::IllegalInstruction { opcode: 4, pc: 1 });
        assert_eq!(cpu.state(), CpuState::Faulted);
        assert_eq!(reg(&cpu, 1), 1);
        assert_eq!(cpu.cycles(), 0);

        // A faulted machine refuses to continue
        assert_eq!(
            cpu.step(&mut String::new()),
            Err(CpuError::NotRunning(CpuState::Faulted))
        );
    }

    #[test]
    fn test_illegal_opcode_six() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0001 001 001 1 00001", "0110 000 000000000"]).unwrap();
        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::IllegalInstruction { opcode: 6, pc: 2 });
        assert_eq!(reg(&cpu, 1), 2);
    }

    #[test]
    fn test_unknown_trap_is_fatal() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["1111 0000 00100011"]).unwrap();
        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::UnknownTrap { vector: 0x23, pc: 1 });
    }

    #[test]
    fn test_load_out_of_range() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0010 000 011111111"]).unwrap(); // LD 1 + 255
        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::MemoryError(MemoryError::AddressOutOfRange(256)));
    }

    #[test]
    fn test_store_out_of_range() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0011 000 111111110"]).unwrap(); // ST 1 - 2
        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::MemoryError(MemoryError::AddressOutOfRange(-1)));
    }

    #[test]
    fn test_fetch_past_end_of_memory() {
        // 49 ADDs followed by running off the end at address 50
        let words = vec!["0001 001 001 1 00000"; MAX_PROGRAM_WORDS];
        let mut cpu = Computer::new();
        cpu.load_machine_code(&words).unwrap();
        // address 49 is zero, which decodes as a never-taken BR
        let err = cpu.execute(&mut String::new()).unwrap_err();
        assert_eq!(err, CpuError::MemoryError(MemoryError::AddressOutOfRange(50)));
        assert_eq!(cpu.cycles(), 50);
    }

    #[test]
    fn test_branch_out_of_range_faults_on_next_fetch() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&[
            "0001 000 000 1 00001", // R0 <- R0 + 1
            "0000 001 000110000",   // BRp + #48 -> PC = 50
        ]).unwrap();
        let mut out = String::new();
        cpu.step(&mut out).unwrap();
        cpu.step(&mut out).unwrap();
        assert_eq!(cpu.pc().unsigned(), 50);
        assert!(cpu.is_running());
        assert_eq!(
            cpu.step(&mut out),
            Err(CpuError::MemoryError(MemoryError::AddressOutOfRange(50)))
        );
    }

    #[test]
    fn test_load_machine_code_bounds() {
        let mut cpu = Computer::new();
        let empty: [&str; 0] = [];
        assert_eq!(cpu.load_machine_code(&empty), Err(LoadError::Empty));

        let too_long = vec!["0000000000000000"; MEMORY_SIZE];
        assert_eq!(cpu.load_machine_code(&too_long), Err(LoadError::TooLong { count: 50 }));

        let max = vec!["1111000000100101"; MAX_PROGRAM_WORDS];
        assert!(Computer::new().load_machine_code(&max).is_ok());
    }

    #[test]
    fn test_load_machine_code_is_atomic() {
        let mut cpu = Computer::new();
        let err = cpu.load_machine_code(&["1111000000100101", "0101"]).unwrap_err();
        assert_eq!(
            err,
            LoadError::BadWord { index: 1, source: BitsError::WrongLength { expected: 16, got: 4 } }
        );
        assert!(cpu.memory().iter().all(|cell| cell.is_zero()));

        let err = cpu.load_machine_code(&["1111 0000 0010 010x"]).unwrap_err();
        assert!(matches!(err, LoadError::BadWord { index: 0, source: BitsError::InvalidChar('x') }));
    }

    #[test]
    fn test_load_strips_all_whitespace() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["\t1111 0000\n0010 0101 "]).unwrap();
        assert_eq!(cpu.memory()[0].to_string(), "1111000000100101");
    }

    #[test]
    fn test_cannot_reload_after_start() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["1111000000100101"]).unwrap();
        cpu.execute(&mut String::new()).unwrap();
        assert_eq!(
            cpu.load_machine_code(&["1111000000100101"]),
            Err(LoadError::AlreadyStarted)
        );
    }

    #[test]
    fn test_cannot_load_twice() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0001001001100001", "0001001001100001", "1111000000100101"]).unwrap();
        assert_eq!(
            cpu.load_machine_code(&["1111000000100101"]),
            Err(LoadError::AlreadyLoaded)
        );
        assert_eq!(cpu.memory()[0].to_string(), "0001001001100001");
        assert_eq!(cpu.memory()[2].to_string(), "1111000000100101");
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let mut cpu = Computer::new();
        assert!(cpu.load_machine_code(&["0101"]).is_err());
        assert!(cpu.load_machine_code(&["1111000000100101"]).is_ok());
    }

    #[test]
    fn test_cannot_reload_after_fault() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0100000000000000"]).unwrap();
        assert!(cpu.execute(&mut String::new()).is_err());
        assert_eq!(cpu.state(), CpuState::Faulted);
        assert_eq!(cpu.cycles(), 0);
        assert_eq!(
            cpu.load_machine_code(&["1111000000100101"]),
            Err(LoadError::AlreadyStarted)
        );
    }

    #[test]
    fn test_accessors_return_copies() {
        let (cpu, _) = run(&["1111000000100101"]);

        let mut regs = cpu.registers();
        regs[0].invert();
        let mut mem = cpu.memory();
        mem[0].invert();
        let mut pc = cpu.pc();
        pc.invert();

        assert_eq!(reg(&cpu, 0), 0);
        assert_eq!(cpu.memory()[0].to_string(), "1111000000100101");
        assert_eq!(cpu.pc().unsigned(), 1);
        assert_eq!(cpu.ir(), cpu.memory()[0]);
    }

    #[test]
    fn test_run_limited() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&[
            "0000 111 111111111", // BRnzp -1, spins once CC is set
        ]).unwrap();
        // CC is 000, so the branch falls through to address 1 (zero = BR never)
        let executed = cpu.run_limited(5, &mut String::new()).unwrap();
        assert_eq!(executed, 5);
        assert!(cpu.is_running());
        assert_eq!(cpu.pc().unsigned(), 5);
    }

    #[test]
    fn test_last_instruction() {
        let mut cpu = Computer::new();
        let halt = Instruction::Trap { vector: TRAP_HALT };
        cpu.load_program(&[encode(&halt)]).unwrap();
        assert_eq!(cpu.last_instruction(), None);
        cpu.step(&mut String::new()).unwrap();
        assert_eq!(cpu.last_instruction(), Some(halt));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (cpu, _) = run(&["0001000010000010", "1111000000100101"]);
        let json = serde_json::to_string(&cpu).unwrap();
        let restored: Computer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.registers(), cpu.registers());
        assert_eq!(restored.memory(), cpu.memory());
        assert_eq!(restored.cc(), cpu.cc());
        assert_eq!(restored.state(), CpuState::Halted);
    }

    #[test]
    fn test_snapshot_rejects_bad_state() {
        let json = serde_json::to_string(&Computer::new()).unwrap();
        assert!(json.contains("\"cc\":\"000\""));
        assert!(serde_json::from_str::<Computer>(&json).is_ok());

        let bad_cc = json.replace("\"cc\":\"000\"", "\"cc\":\"111\"");
        assert!(serde_json::from_str::<Computer>(&bad_cc).is_err());

        let short_pc = json.replacen("\"pc\":\"0000000000000000\"", "\"pc\":\"000\"", 1);
        assert_ne!(short_pc, json);
        let err = serde_json::from_str::<Computer>(&short_pc).unwrap_err();
        assert!(err.to_string().contains("pc must be 16 bits wide, got 3"));
    }

    #[test]
    fn test_restored_snapshot_keeps_program_loaded() {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["1111000000100101"]).unwrap();
        let json = serde_json::to_string(&cpu).unwrap();

        let mut restored: Computer = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.load_machine_code(&["1111000000100101"]), Err(LoadError::AlreadyLoaded));
        assert_eq!(restored.execute(&mut String::new()), Ok(1));
    }
}
