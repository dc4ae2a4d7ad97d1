//! Debugger application state and logic.

use crate::bits::BitVector;
use crate::cpu::{Computer, MEMORY_SIZE};
use crate::asm::disasm::{disassemble_instruction, format_instruction};
use std::collections::BTreeSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub cpu: Computer,
    /// Original program, reloaded on reset.
    pub program: Vec<BitVector>,
    /// Breakpoints (by address).
    pub breakpoints: BTreeSet<usize>,
    /// Characters written by TRAP OUT.
    pub output: String,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory cursor.
    pub selected_addr: usize,
    /// Set by `run` so execution can leave a breakpoint it stopped on.
    resuming: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<BitVector>) -> Self {
        let mut app = Self {
            cpu: Computer::new(),
            program,
            breakpoints: BTreeSet::new(),
            output: String::new(),
            running: false,
            should_quit: false,
            status: String::new(),
            selected_addr: 0,
            resuming: false,
        };
        app.reset();
        app.status = "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into();
        app
    }

    fn pc(&self) -> usize {
        self.cpu.pc().unsigned() as usize
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state());
            self.running = false;
            return;
        }

        let pc = self.pc();
        match self.cpu.step(&mut self.output) {
            Ok(instr) => {
                self.status = format!("PC={:02}: {}", pc, format_instruction(&instr));
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.resuming = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("{:?} after {} cycles", self.cpu.state(), self.cpu.cycles());
            return;
        }

        // Check for breakpoint
        let pc = self.pc();
        if self.breakpoints.contains(&pc) && !self.resuming {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02}", pc);
            return;
        }

        self.resuming = false;
        self.step();
    }

    /// Toggle a breakpoint at the memory cursor.
    pub fn toggle_breakpoint(&mut self) {
        let addr = self.selected_addr;
        if self.breakpoints.remove(&addr) {
            self.status = format!("Removed breakpoint at {:02}", addr);
        } else {
            self.breakpoints.insert(addr);
            self.status = format!("Set breakpoint at {:02}", addr);
        }
    }

    /// Move the memory cursor, clamped to valid addresses.
    pub fn move_cursor(&mut self, delta: isize) {
        let next = self.selected_addr.saturating_add_signed(delta);
        self.selected_addr = next.min(MEMORY_SIZE - 1);
    }

    /// Reset the machine and reload the program.
    pub fn reset(&mut self) {
        self.cpu = Computer::new();
        self.output.clear();
        self.running = false;
        self.status = match self.cpu.load_program(&self.program) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => format!("Load failed: {}", e),
        };
    }

    /// Disassembly around the current PC: (address, text, is_pc).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let pc = self.pc();
        let start = pc.saturating_sub(lines / 2).min(MEMORY_SIZE.saturating_sub(lines));

        (start..(start + lines).min(MEMORY_SIZE))
            .filter_map(|addr| {
                let word = self.cpu.memory_at(addr)?;
                Some((addr, disassemble_instruction(word), addr == pc))
            })
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<BitVector>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(program);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.move_cursor(-1),
                        KeyCode::Down => app.move_cursor(1),
                        KeyCode::PageUp => app.move_cursor(-10),
                        KeyCode::PageDown => app.move_cursor(10),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn app(source: &str) -> DebuggerApp {
        DebuggerApp::new(assemble(source).unwrap())
    }

    fn run_to_stop(app: &mut DebuggerApp) {
        app.run();
        for _ in 0..1000 {
            if !app.running {
                break;
            }
            app.tick();
        }
    }

    #[test]
    fn test_step_and_capture_output() {
        let mut app = app("LD R0, CH\nOUT\nHALT\nCH .FILL x41");
        app.step();
        assert!(app.status.starts_with("PC=00: LD R0, #2"));
        app.step();
        assert_eq!(app.output, "A");
    }

    #[test]
    fn test_breakpoint_stops_then_resumes() {
        let mut app = app("ADD R1, R1, #1\nADD R1, R1, #1\nHALT");
        app.selected_addr = 1;
        app.toggle_breakpoint();

        run_to_stop(&mut app);
        assert_eq!(app.status, "Breakpoint at PC=01");
        assert_eq!(app.cpu.registers()[1].signed(), 2);

        run_to_stop(&mut app);
        assert!(app.cpu.is_halted());
        assert_eq!(app.cpu.registers()[1].signed(), 3);
    }

    #[test]
    fn test_reset_reloads_program() {
        let mut app = app("LD R0, CH\nOUT\nHALT\nCH .FILL x41");
        run_to_stop(&mut app);
        assert!(app.cpu.is_halted());
        assert_eq!(app.output, "A");

        app.reset();
        assert!(app.cpu.is_running());
        assert!(app.output.is_empty());
        assert_eq!(app.cpu.pc().unsigned(), 0);
    }

    #[test]
    fn test_cursor_is_clamped() {
        let mut app = app("HALT");
        app.move_cursor(-5);
        assert_eq!(app.selected_addr, 0);
        app.move_cursor(100);
        assert_eq!(app.selected_addr, MEMORY_SIZE - 1);
    }

    #[test]
    fn test_disassembly_window() {
        let app = app("HALT");
        let lines = app.get_disassembly(5);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], (0, "HALT".to_string(), true));
        assert_eq!(lines[1].1, ".FILL x0000");
    }
}
