//! Assembler, disassembler and program files.
//!
//! This module provides:
//! - A two-pass assembler (assembly text → machine words)
//! - A disassembler (machine words → assembly text)
//! - The plain-text machine-code file format

pub mod assembler;
pub mod disasm;
pub mod program;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_instruction};
pub use program::{ProgramFile, ProgramError, load_program_file, parse_program, save_program_file, format_program};
