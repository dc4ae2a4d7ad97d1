//! Machine-code program files.
//!
//! A program file is plain text:
//! - One 16-bit word per line, written as `0`/`1` characters
//! - Whitespace inside a word is ignored (`0001 000 010 0 00 010`)
//! - `;` and `//` start a comment that runs to the end of the line
//! - Blank lines are ignored

use crate::bits::{BitVector, WORD_WIDTH};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// A parsed machine-code program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFile {
    /// The program words, in load order.
    pub words: Vec<BitVector>,
    /// Original source lines (for debugging).
    pub source_lines: Vec<String>,
}

impl ProgramFile {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a program from already-encoded words.
    pub fn from_words(words: &[BitVector]) -> Self {
        Self {
            words: words.to_vec(),
            source_lines: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Add a word.
    pub fn push(&mut self, word: BitVector, source: &str) {
        self.words.push(word);
        self.source_lines.push(source.to_string());
    }

    /// Get the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Strip a trailing `;` or `//` comment.
fn strip_comment(line: &str) -> &str {
    let cut = [line.find(';'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

/// Parse program text.
pub fn parse_program(text: &str) -> Result<ProgramFile, ProgramError> {
    let mut program = ProgramFile::new();

    for (line_num, line) in text.lines().enumerate() {
        let code = strip_comment(line).trim();
        if code.is_empty() {
            continue;
        }

        let bits: String = code.chars().filter(|c| !c.is_whitespace()).collect();
        let word = BitVector::from_literal(WORD_WIDTH, &bits)
            .map_err(|e| ProgramError::ParseError {
                line: line_num + 1,
                message: e.to_string(),
            })?;

        program.push(word, line.trim());
    }

    Ok(program)
}

/// Load a program file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<ProgramFile, ProgramError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ProgramError::IoError(e.to_string()))?;
    parse_program(&text)
}

/// Render a program in the file format, one word per line with its address.
pub fn format_program(program: &ProgramFile) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; lc3-mini program");
    let _ = writeln!(out, "; {} words", program.len());
    let _ = writeln!(out);

    for (addr, word) in program.words.iter().enumerate() {
        let _ = writeln!(out, "{} ; {:02}", word, addr);
    }

    out
}

/// Save a program file to disk.
pub fn save_program_file<P: AsRef<Path>>(path: P, program: &ProgramFile) -> Result<(), ProgramError> {
    std::fs::write(path.as_ref(), format_program(program))
        .map_err(|e| ProgramError::IoError(e.to_string()))
}

/// Errors that can occur reading or writing program files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_comments() {
        let text = "\
; load 'A' and print it
0010 000 000000010   ; LD R0, #2
1111 0000 00100001   // OUT

1111000000100101
0000000001000001 ; 'A'
";
        let program = parse_program(text).unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.words[0].to_string(), "0010000000000010");
        assert_eq!(program.words[3].unsigned(), 0x41);
        assert_eq!(program.source_lines[1], "1111 0000 00100001   // OUT");
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_program("1111000000100101\n\n0101 01\n").unwrap_err();
        assert!(matches!(err, ProgramError::ParseError { line: 3, .. }));

        let err = parse_program("111100000010010a").unwrap_err();
        assert!(matches!(err, ProgramError::ParseError { line: 1, .. }));
    }

    #[test]
    fn test_empty_text_is_empty_program() {
        let program = parse_program("; nothing here\n\n").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn test_format_parses_back() {
        let program = ProgramFile::from_words(&[
            BitVector::from_word(0x1082),
            BitVector::from_word(0xF025),
        ]);
        let text = format_program(&program);
        assert!(text.contains("0001000010000010 ; 00"));
        assert_eq!(parse_program(&text).unwrap().words, program.words);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("lc3mini-{}.bin", std::process::id()));
        let program = ProgramFile::from_words(&[BitVector::from_word(0xF025)]);

        save_program_file(&path, &program).unwrap();
        let loaded = load_program_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.words, program.words);
    }

    #[test]
    fn test_missing_file() {
        let err = load_program_file("/nonexistent/lc3mini/program.bin").unwrap_err();
        assert!(matches!(err, ProgramError::IoError(_)));
    }
}
