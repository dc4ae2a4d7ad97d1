//! # LC-3 Mini
//!
//! A teaching simulator for a seven-instruction subset of the LC-3.
//!
//! Words are modelled as fixed-width [`BitVector`]s so every instruction
//! field is read with an explicit MSB-first slice, exactly as the bits sit
//! in the instruction word.

pub mod bits;
pub mod cpu;
pub mod asm;
pub mod dump;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use bits::{BitVector, BitsError};
pub use cpu::{Computer, CpuState, CpuError, LoadError, Memory, RegisterFile, ConditionCode, Instruction, OutputSink, ConsoleSink};
pub use asm::{assemble, disassemble, AssemblerError, ProgramFile, load_program_file, save_program_file};
pub use config::{RunConfig, DumpFormat};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
