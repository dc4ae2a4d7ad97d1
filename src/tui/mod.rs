//! TUI debugger for the LC-3 subset.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, PC, IR and condition code view
//! - Memory view with a breakpoint cursor
//! - Step/run/breakpoint controls
//! - Disassembly view and captured OUT text

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
