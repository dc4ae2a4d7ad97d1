//! Fixed-width bit vectors.
//!
//! A [`BitVector`] is an ordered run of bits, most significant bit first,
//! whose width is fixed when it is created. The machine uses two widths:
//! - 16 bits for memory cells, registers, PC and IR
//! - 3 bits for the condition code
//!
//! Internally the bits are packed into a `u32` (bit 0 of the integer is the
//! least significant bit), but every public index is MSB-first: index 0 is
//! the leftmost character of the literal `"1000000000000000"`.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Width of a machine word.
pub const WORD_WIDTH: usize = 16;

/// Widest vector that can be represented.
pub const MAX_WIDTH: usize = 32;

/// A fixed-width bit pattern with unsigned and two's complement views.
///
/// Bits above `width` are always zero, so the derived equality is
/// structural: same width, same pattern. Serialized as its bit string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BitVector {
    width: u8,
    bits: u32,
}

impl BitVector {
    /// Create an all-zero vector of the given width.
    pub fn new(width: usize) -> Result<Self, BitsError> {
        if width == 0 || width > MAX_WIDTH {
            return Err(BitsError::InvalidWidth(width));
        }
        Ok(Self { width: width as u8, bits: 0 })
    }

    /// An all-zero 16-bit word.
    #[inline]
    pub const fn word() -> Self {
        Self { width: WORD_WIDTH as u8, bits: 0 }
    }

    /// A 16-bit word holding `value` verbatim.
    #[inline]
    pub const fn from_word(value: u16) -> Self {
        Self { width: WORD_WIDTH as u8, bits: value as u32 }
    }

    /// A 3-bit `nzp` pattern; only the low three bits of `value` are kept.
    #[inline]
    pub const fn nzp(value: u8) -> Self {
        Self { width: 3, bits: (value & 0b111) as u32 }
    }

    /// Build a vector from a string of `'0'`/`'1'` characters, MSB first.
    ///
    /// The string must contain exactly `width` characters.
    pub fn from_literal(width: usize, literal: &str) -> Result<Self, BitsError> {
        let mut vector = Self::new(width)?;
        let got = literal.chars().count();
        if got != width {
            return Err(BitsError::WrongLength { expected: width, got });
        }

        for c in literal.chars() {
            let bit = match c {
                '0' => 0,
                '1' => 1,
                _ => return Err(BitsError::InvalidChar(c)),
            };
            vector.bits = (vector.bits << 1) | bit;
        }

        Ok(vector)
    }

    /// Build a vector holding a non-negative integer.
    pub fn from_unsigned(width: usize, value: u32) -> Result<Self, BitsError> {
        let mut vector = Self::new(width)?;
        vector.set_unsigned(value)?;
        Ok(vector)
    }

    /// Build a vector holding `value` in two's complement, truncated to `width` bits.
    pub fn from_signed(width: usize, value: i32) -> Result<Self, BitsError> {
        let mut vector = Self::new(width)?;
        vector.set_signed(value);
        Ok(vector)
    }

    /// Number of bits in this vector.
    #[inline]
    pub const fn width(&self) -> usize {
        self.width as usize
    }

    #[inline]
    const fn mask(&self) -> u32 {
        if self.width as usize == MAX_WIDTH {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Largest unsigned value this width can hold.
    #[inline]
    pub const fn max_unsigned(&self) -> u32 {
        self.mask()
    }

    /// Store a non-negative integer.
    ///
    /// Fails if `value` needs more than `width` bits.
    pub fn set_unsigned(&mut self, value: u32) -> Result<(), BitsError> {
        if value > self.mask() {
            return Err(BitsError::UnsignedOverflow { value, width: self.width() });
        }
        self.bits = value;
        Ok(())
    }

    /// The pattern read as an unsigned magnitude in `[0, 2^width - 1]`.
    #[inline]
    pub const fn unsigned(&self) -> u32 {
        self.bits
    }

    /// Store `value` in two's complement.
    ///
    /// The value is reduced modulo `2^width`, so results that overflow the
    /// width wrap around.
    #[inline]
    pub fn set_signed(&mut self, value: i32) {
        self.bits = (value as u32) & self.mask();
    }

    /// The pattern read as a two's complement integer.
    pub const fn signed(&self) -> i32 {
        let width = self.width as u32;
        if width as usize == MAX_WIDTH {
            return self.bits as i32;
        }
        if self.bits >> (width - 1) & 1 == 1 {
            (self.bits as i64 - (1i64 << width)) as i32
        } else {
            self.bits as i32
        }
    }

    /// Read a single bit by MSB-first index.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.width() {
            return None;
        }
        let shift = self.width() - 1 - index;
        Some(self.bits >> shift & 1 == 1)
    }

    /// The most significant bit.
    #[inline]
    pub const fn sign_bit(&self) -> bool {
        self.bits >> (self.width - 1) & 1 == 1
    }

    /// Copy bits `[start, start + length)` into a new vector of width `length`.
    pub fn slice(&self, start: usize, length: usize) -> Result<Self, BitsError> {
        if length == 0 || start + length > self.width() {
            return Err(BitsError::SliceOutOfRange { start, length, width: self.width() });
        }
        let shift = self.width() - start - length;
        let mut out = Self::new(length)?;
        out.bits = (self.bits >> shift) & out.mask();
        Ok(out)
    }

    /// Flip every bit in place.
    #[inline]
    pub fn invert(&mut self) {
        self.bits = !self.bits & self.mask();
    }

    /// Widen to `width` bits, replicating the sign bit into the new upper bits.
    pub fn sign_extend(&self, width: usize) -> Result<Self, BitsError> {
        if width < self.width() {
            return Err(BitsError::Narrowing { from: self.width(), to: width });
        }
        Self::from_signed(width, self.signed())
    }

    /// Bitwise AND of two vectors of the same width.
    pub fn and(&self, other: &Self) -> Result<Self, BitsError> {
        if self.width != other.width {
            return Err(BitsError::WidthMismatch { left: self.width(), right: other.width() });
        }
        Ok(Self { width: self.width, bits: self.bits & other.bits })
    }

    /// Check if every bit is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.bits == 0
    }
}

impl Default for BitVector {
    fn default() -> Self {
        Self::word()
    }
}

impl From<u16> for BitVector {
    fn from(value: u16) -> Self {
        Self::from_word(value)
    }
}

impl TryFrom<String> for BitVector {
    type Error = BitsError;

    fn try_from(literal: String) -> Result<Self, Self::Error> {
        Self::from_literal(literal.chars().count(), &literal)
    }
}

impl From<BitVector> for String {
    fn from(vector: BitVector) -> Self {
        vector.to_string()
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = (0..self.width())
            .rev()
            .map(|shift| if self.bits >> shift & 1 == 1 { '1' } else { '0' })
            .collect();
        f.pad(&text)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector<{}>({} = {})", self.width, self, self.signed())
    }
}

/// Errors produced by bit vector construction and slicing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitsError {
    #[error("invalid width {0} (must be 1-32)")]
    InvalidWidth(usize),

    #[error("expected {expected} bits, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("invalid bit character: '{0}' (expected 0/1)")]
    InvalidChar(char),

    #[error("value {value} does not fit in {width} bits")]
    UnsignedOverflow { value: u32, width: usize },

    #[error("slice [{start}, {start}+{length}) exceeds width {width}")]
    SliceOutOfRange { start: usize, length: usize, width: usize },

    #[error("cannot sign-extend {from} bits down to {to}")]
    Narrowing { from: usize, to: usize },

    #[error("width mismatch: {left} vs {right}")]
    WidthMismatch { left: usize, right: usize },
}
