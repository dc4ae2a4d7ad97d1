//! WebAssembly bindings for the LC-3 subset simulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::bits::BitVector;
use crate::cpu::{Computer, MEMORY_SIZE};
use crate::asm::assembler::assemble;
use crate::asm::disasm::{disassemble_instruction, format_instruction};
use crate::dump::Snapshot;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmComputer {
    cpu: Computer,
    program: Vec<BitVector>,
    output: String,
}

#[wasm_bindgen]
impl WasmComputer {
    /// Create a new machine.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            cpu: Computer::new(),
            program: Vec::new(),
            output: String::new(),
        }
    }

    /// Load a program from assembly source code.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let words = assemble(source)
            .map_err(|e| JsError::new(&e.to_string()))?;
        self.load(words)
    }

    /// Load a program given as `0`/`1` strings, one per word.
    #[wasm_bindgen]
    pub fn load_machine_code(&mut self, words: Vec<String>) -> Result<usize, JsError> {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&words)
            .map_err(|e| JsError::new(&e.to_string()))?;

        self.program = cpu.memory()[..words.len()].to_vec();
        self.cpu = cpu;
        self.output.clear();
        Ok(words.len())
    }

    fn load(&mut self, words: Vec<BitVector>) -> Result<usize, JsError> {
        let mut cpu = Computer::new();
        cpu.load_program(&words)
            .map_err(|e| JsError::new(&e.to_string()))?;

        let len = words.len();
        self.program = words;
        self.cpu = cpu;
        self.output.clear();
        Ok(len)
    }

    /// Step one instruction. Returns the executed instruction as assembly.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.cpu.step(&mut self.output)
            .map_err(|e| JsError::new(&e.to_string()))?;

        Ok(format_instruction(&instr))
    }

    /// Run until halt or max cycles. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.cpu.run_limited(u64::from(max_cycles), &mut self.output)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.cpu.cycles())
    }

    /// Reset the machine and reload the program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu = Computer::new();
        self.output.clear();
        if !self.program.is_empty() {
            let _ = self.cpu.load_program(&self.program);
        }
    }

    /// Check if the machine is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if the machine is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u32 {
        self.cpu.pc().unsigned()
    }

    /// Instruction register as a bit string.
    #[wasm_bindgen]
    pub fn ir(&self) -> String {
        self.cpu.ir().to_string()
    }

    /// Condition code as a 3-bit `nzp` string.
    #[wasm_bindgen]
    pub fn cc(&self) -> String {
        self.cpu.cc().to_string()
    }

    /// Signed value of R0-R7 (out-of-range indices read as 0).
    #[wasm_bindgen]
    pub fn register(&self, index: usize) -> i32 {
        self.cpu.registers().get(index).map_or(0, |r| r.signed())
    }

    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state())
    }

    /// Text written by TRAP OUT so far.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.output.clone()
    }

    /// Get memory cell value at index (0-49).
    #[wasm_bindgen]
    pub fn memory_at(&self, index: usize) -> i32 {
        self.cpu.memory_at(index).map_or(0, |w| w.signed())
    }

    /// Get memory cell as a bit string.
    #[wasm_bindgen]
    pub fn memory_bits_at(&self, index: usize) -> String {
        self.cpu.memory_at(index)
            .unwrap_or_default()
            .to_string()
    }

    /// Get all memory as signed values.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> Vec<i32> {
        self.cpu.memory().iter().map(|w| w.signed()).collect()
    }

    /// Full machine state as JSON.
    #[wasm_bindgen]
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        Snapshot::capture(&self.cpu)
            .to_json()
            .map_err(|e| JsError::new(&e.to_string()))
    }

    /// Number of memory cells.
    #[wasm_bindgen]
    pub fn memory_size() -> usize {
        MEMORY_SIZE
    }
}

impl Default for WasmComputer {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the words as bit strings.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<String>, JsError> {
    let words = assemble(source)
        .map_err(|e| JsError::new(&e.to_string()))?;
    Ok(words.iter().map(|w| w.to_string()).collect())
}

/// Disassemble a single 16-bit word.
#[wasm_bindgen]
pub fn wasm_disassemble(value: u16) -> String {
    disassemble_instruction(BitVector::from_word(value))
}
