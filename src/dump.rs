//! Human-readable and JSON dumps of machine state.
//!
//! Both are built only from [`Computer`]'s accessors, so two machines in
//! the same state always dump identically.

use crate::bits::BitVector;
use crate::cpu::{Computer, CpuState};
use serde::{Serialize, Deserialize};
use std::fmt::Write as _;

/// Cells per row in the register and memory listings.
const PER_ROW: usize = 3;

/// Render PC, IR, CC, the registers and all of memory as bit strings.
///
/// ```text
/// PC 0000000000000011   IR 1111000000100101   CC 001
/// R0 0000000000000100   R1 0000000000000001   R2 0000000000000010
/// ...
///   0 0001000010000010     1 1111000000100101     2 0000000000000000
/// ```
pub fn render(cpu: &Computer) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "PC {}   IR {}   CC {}", cpu.pc(), cpu.ir(), cpu.cc());

    let registers: Vec<String> = cpu
        .registers()
        .iter()
        .enumerate()
        .map(|(i, reg)| format!("R{} {}", i, reg))
        .collect();
    push_rows(&mut out, &registers);

    let memory: Vec<String> = cpu
        .memory()
        .iter()
        .enumerate()
        .map(|(addr, cell)| format!("{:3} {}", addr, cell))
        .collect();
    push_rows(&mut out, &memory);

    out
}

fn push_rows(out: &mut String, cells: &[String]) {
    for row in cells.chunks(PER_ROW) {
        let _ = writeln!(out, "{}", row.join("   "));
    }
}

/// One word as both a bit string and its signed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordView {
    pub bits: String,
    pub signed: i32,
}

impl From<BitVector> for WordView {
    fn from(word: BitVector) -> Self {
        Self {
            bits: word.to_string(),
            signed: word.signed(),
        }
    }
}

/// Serializable view of the whole machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: CpuState,
    pub cycles: u64,
    pub pc: WordView,
    pub ir: WordView,
    pub cc: String,
    pub registers: Vec<WordView>,
    pub memory: Vec<WordView>,
}

impl Snapshot {
    /// Capture the current machine state.
    pub fn capture(cpu: &Computer) -> Self {
        Self {
            state: cpu.state(),
            cycles: cpu.cycles(),
            pc: cpu.pc().into(),
            ir: cpu.ir().into(),
            cc: cpu.cc().to_string(),
            registers: cpu.registers().into_iter().map(WordView::from).collect(),
            memory: cpu.memory().into_iter().map(WordView::from).collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn halted_add() -> Computer {
        let mut cpu = Computer::new();
        cpu.load_machine_code(&["0001000010000010", "1111000000100101"]).unwrap();
        cpu.execute(&mut String::new()).unwrap();
        cpu
    }

    #[test]
    fn test_render_layout() {
        let text = render(&halted_add());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "PC 0000000000000010   IR 1111000000100101   CC 001");
        assert_eq!(
            lines[1],
            "R0 0000000000000100   R1 0000000000000001   R2 0000000000000010"
        );
        assert_eq!(lines[3], "R6 0000000000000110   R7 0000000000000111");
        assert_eq!(
            lines[4],
            "  0 0001000010000010     1 1111000000100101     2 0000000000000000"
        );
        // 1 header + 3 register rows + 17 memory rows
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[20], " 48 0000000000000000    49 0000000000000000");
    }

    #[test]
    fn test_render_depends_only_on_state() {
        let cpu = halted_add();
        let json = serde_json::to_string(&cpu).unwrap();
        let restored: Computer = serde_json::from_str(&json).unwrap();
        assert_eq!(render(&cpu), render(&restored));
        assert_eq!(Snapshot::capture(&cpu), Snapshot::capture(&restored));
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = Snapshot::capture(&halted_add());
        assert_eq!(snapshot.registers[0], WordView { bits: "0000000000000100".into(), signed: 4 });
        assert_eq!(snapshot.memory.len(), 50);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"state\": \"Halted\""));
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
