//! CPU registers.
//!
//! The machine has:
//! - R0-R7: eight 16-bit general purpose registers
//! - CC: a 3-bit condition code, one-hot `n`/`z`/`p`
//!
//! PC and IR live on [`Computer`](crate::cpu::Computer) itself.

use crate::bits::{BitVector, WORD_WIDTH};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// The number of general purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// A general purpose register index, always in `0..8`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Reg(u8);

impl Reg {
    /// R0, the TRAP OUT source register.
    pub const R0: Reg = Reg(0);

    /// All registers in index order.
    pub const ALL: [Reg; REGISTER_COUNT] = [
        Reg(0), Reg(1), Reg(2), Reg(3), Reg(4), Reg(5), Reg(6), Reg(7),
    ];

    /// Create a register index, rejecting anything above R7.
    pub fn new(index: u8) -> Option<Self> {
        (usize::from(index) < REGISTER_COUNT).then_some(Self(index))
    }

    /// Decode a 3-bit register field.
    pub(crate) fn from_field(field: BitVector) -> Self {
        Self((field.unsigned() & 0b111) as u8)
    }

    /// Register number as an array index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u8> for Reg {
    type Error = RegisterError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index).ok_or(RegisterError::NoSuchRegister(index))
    }
}

impl From<Reg> for u8 {
    fn from(reg: Reg) -> Self {
        reg.0
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// The general purpose register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[BitVector; 8]", into = "[BitVector; 8]")]
pub struct RegisterFile {
    regs: [BitVector; REGISTER_COUNT],
}

impl RegisterFile {
    /// Create a register file where Ri holds the value i.
    pub fn new() -> Self {
        let mut regs = [BitVector::word(); REGISTER_COUNT];
        for (i, reg) in regs.iter_mut().enumerate() {
            *reg = BitVector::from_word(i as u16);
        }
        Self { regs }
    }

    /// Read a register.
    #[inline]
    pub fn get(&self, reg: Reg) -> BitVector {
        self.regs[reg.index()]
    }

    /// Overwrite a register.
    #[inline]
    pub fn set(&mut self, reg: Reg, value: BitVector) {
        self.regs[reg.index()] = value;
    }

    /// Owned copy of all eight registers.
    pub fn to_array(&self) -> [BitVector; REGISTER_COUNT] {
        self.regs
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<[BitVector; REGISTER_COUNT]> for RegisterFile {
    type Error = RegisterError;

    fn try_from(regs: [BitVector; REGISTER_COUNT]) -> Result<Self, Self::Error> {
        if let Some(bad) = regs.iter().find(|reg| reg.width() != WORD_WIDTH) {
            return Err(RegisterError::BadWidth(bad.width()));
        }
        Ok(Self { regs })
    }
}

impl From<RegisterFile> for [BitVector; REGISTER_COUNT] {
    fn from(file: RegisterFile) -> Self {
        file.regs
    }
}

/// The sign recorded by the condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Flag {
    Negative,
    Zero,
    Positive,
}

impl Flag {
    /// Classify a signed result.
    pub fn of(value: i32) -> Self {
        match value.signum() {
            -1 => Flag::Negative,
            0 => Flag::Zero,
            _ => Flag::Positive,
        }
    }

    /// The one-hot `nzp` pattern for this flag.
    pub const fn pattern(self) -> u8 {
        match self {
            Flag::Negative => 0b100,
            Flag::Zero => 0b010,
            Flag::Positive => 0b001,
        }
    }
}

/// The 3-bit `nzp` condition code.
///
/// Starts as `000`. After the first CC-defining instruction exactly one bit
/// is set, because [`ConditionCode::set_from`] is the only writer.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BitVector", into = "BitVector")]
pub struct ConditionCode {
    bits: BitVector,
}

impl ConditionCode {
    /// Create a cleared condition code (`000`).
    pub const fn new() -> Self {
        Self { bits: BitVector::nzp(0) }
    }

    /// Record the sign of a result.
    pub fn set_from(&mut self, value: i32) {
        self.bits = BitVector::nzp(Flag::of(value).pattern());
    }

    /// The flag currently set, if any instruction has defined it yet.
    pub fn flag(&self) -> Option<Flag> {
        match self.bits.unsigned() {
            0b100 => Some(Flag::Negative),
            0b010 => Some(Flag::Zero),
            0b001 => Some(Flag::Positive),
            _ => None,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.flag() == Some(Flag::Negative)
    }

    pub fn is_zero(&self) -> bool {
        self.flag() == Some(Flag::Zero)
    }

    pub fn is_positive(&self) -> bool {
        self.flag() == Some(Flag::Positive)
    }

    /// Test a BR mask: true if any flag selected by `nzp` is set.
    pub fn matches(&self, nzp: BitVector) -> bool {
        nzp.unsigned() & self.bits.unsigned() != 0
    }

    /// Owned copy of the raw 3-bit pattern.
    pub fn bits(&self) -> BitVector {
        self.bits
    }
}

impl Default for ConditionCode {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<BitVector> for ConditionCode {
    type Error = RegisterError;

    /// Accepts `000` or a single set flag.
    fn try_from(bits: BitVector) -> Result<Self, Self::Error> {
        if bits.width() != 3 {
            return Err(RegisterError::BadConditionCode(bits.to_string()));
        }
        match bits.unsigned() {
            0b000 | 0b100 | 0b010 | 0b001 => Ok(Self { bits }),
            _ => Err(RegisterError::BadConditionCode(bits.to_string())),
        }
    }
}

impl From<ConditionCode> for BitVector {
    fn from(cc: ConditionCode) -> Self {
        cc.bits
    }
}

impl fmt::Debug for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CC={}", self.bits)
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.bits, f)
    }
}

/// Errors from building registers out of untrusted values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("no register R{0} (expected R0-R7)")]
    NoSuchRegister(u8),

    #[error("register must be 16 bits wide, got {0}")]
    BadWidth(usize),

    #[error("condition code must be 000, 100, 010 or 001, got {0:?}")]
    BadConditionCode(String),
}
