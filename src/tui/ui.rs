//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::{Flag, MEMORY_SIZE};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, registers, output and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(4),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_output(frame, left_chunks[2], app);
    draw_status(frame, left_chunks[3], app);

    // Right side: memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_help(frame, right_chunks[1]);
}

/// Draw disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{:02}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw PC, IR, CC and R0-R7.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = app.cpu.registers();
    let reg_span = |i: usize| {
        Span::raw(format!("R{} {:>6}  ", i, regs[i].signed()))
    };

    let content = vec![
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:02}", app.cpu.pc().unsigned()), Style::default().fg(Color::Yellow)),
            Span::raw("   IR: "),
            Span::styled(app.cpu.ir().to_string(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("CC: "),
            Span::styled(app.cpu.cc().to_string(), cc_style(app.cpu.condition_code().flag())),
        ]),
        Line::from((0..4).map(reg_span).collect::<Vec<_>>()),
        Line::from((4..8).map(reg_span).collect::<Vec<_>>()),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles()), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.cpu.state()),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view, keeping the cursor on screen.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2).max(1);
    let start = (app.selected_addr + 1).saturating_sub(visible_rows);
    let end = (start + visible_rows).min(MEMORY_SIZE);
    let pc = app.cpu.pc().unsigned() as usize;
    let memory = app.cpu.memory();

    let items: Vec<ListItem> = (start..end)
        .map(|addr| {
            let value = memory[addr];
            let bp = if app.breakpoints.contains(&addr) { "●" } else { " " };
            let text = format!("{}{:02}: {} = {}", bp, addr, value, value.signed());

            let mut style = if addr == pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if !value.is_zero() {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            if addr == app.selected_addr {
                style = style.add_modifier(Modifier::REVERSED);
            }

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw text written by TRAP OUT.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let output = Paragraph::new(app.output.clone())
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Output ")
            .borders(Borders::ALL));

    frame.render_widget(output, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint at cursor"),
        Line::from("x: Reset  ↑↓/PgUp/PgDn: Move cursor  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Color for the condition code.
fn cc_style(flag: Option<Flag>) -> Style {
    match flag {
        Some(Flag::Negative) => Style::default().fg(Color::Red),
        Some(Flag::Zero) => Style::default().fg(Color::Gray),
        Some(Flag::Positive) => Style::default().fg(Color::Green),
        None => Style::default().fg(Color::DarkGray),
    }
}
