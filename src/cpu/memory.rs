//! Main memory.
//!
//! The machine has 50 sixteen-bit cells at addresses 0-49. A cell is an
//! instruction when fetched through PC and plain data when touched by
//! LD/ST; memory itself does not distinguish the two.

use crate::bits::{BitVector, WORD_WIDTH};
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 50;

/// Fixed-capacity word memory with bounds-checked access.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BitVector>", into = "Vec<BitVector>")]
pub struct Memory {
    cells: Vec<BitVector>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![BitVector::word(); MEMORY_SIZE],
        }
    }

    /// Validate an address computed by the CPU.
    ///
    /// All range checks for fetch, LD and ST go through here.
    pub fn address(addr: i32) -> Result<usize, MemoryError> {
        if addr < 0 || addr as usize >= MEMORY_SIZE {
            return Err(MemoryError::AddressOutOfRange(addr));
        }
        Ok(addr as usize)
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, addr: i32) -> Result<BitVector, MemoryError> {
        let index = Self::address(addr)?;
        Ok(self.cells[index])
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: i32, value: BitVector) -> Result<(), MemoryError> {
        let index = Self::address(addr)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Copy a program into memory starting at address 0.
    ///
    /// Nothing is written unless the whole program fits.
    pub fn load_program(&mut self, program: &[BitVector]) -> Result<(), MemoryError> {
        if program.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: MEMORY_SIZE,
            });
        }

        self.cells[..program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Owned copy of every cell, in address order.
    pub fn cells(&self) -> Vec<BitVector> {
        self.cells.clone()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<BitVector>> for Memory {
    type Error = MemoryError;

    fn try_from(cells: Vec<BitVector>) -> Result<Self, Self::Error> {
        if cells.len() != MEMORY_SIZE || cells.iter().any(|cell| cell.width() != WORD_WIDTH) {
            return Err(MemoryError::BadImage(cells.len()));
        }
        Ok(Self { cells })
    }
}

impl From<Memory> for Vec<BitVector> {
    fn from(memory: Memory) -> Self {
        memory.cells
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|cell| !cell.is_zero()).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside valid memory range.
    #[error("memory address {0} out of range (0 to {max})", max = MEMORY_SIZE - 1)]
    AddressOutOfRange(i32),

    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },

    /// A serialized image did not hold exactly 50 sixteen-bit cells.
    #[error("memory image must hold {size} 16-bit cells, found {0}", size = MEMORY_SIZE)]
    BadImage(usize),
}
