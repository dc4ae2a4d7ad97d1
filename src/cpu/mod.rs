//! CPU emulation for the LC-3 subset.
//!
//! This module implements the machine:
//! - 50 sixteen-bit memory cells
//! - 8 general purpose registers plus PC, IR and a 3-bit condition code
//! - 7 opcodes: BR, ADD, LD, ST, AND, NOT, TRAP

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::{RegisterFile, Reg, ConditionCode, Flag, REGISTER_COUNT};
pub use decode::{Instruction, Operand, Opcode, DecodeError};
pub use execute::{Computer, CpuError, CpuState, LoadError, RestoreError, OutputSink, ConsoleSink, MAX_PROGRAM_WORDS};
