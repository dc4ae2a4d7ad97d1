//! Binary word primitives.
//!
//! The machine works on fixed-width two's complement bit patterns:
//! - [`BitVector`] - a width-tagged bit pattern with signed/unsigned views
//! - [`WORD_WIDTH`] - the 16-bit word used by memory and registers

mod vector;

pub use vector::{BitVector, BitsError, WORD_WIDTH, MAX_WIDTH};
