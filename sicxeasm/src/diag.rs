//! The diagnostic value threaded through every stage. Stages collect these
//! into lists and report a success flag; nothing panics across a stage
//! boundary.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
    PassOne,
    PassTwo,
    Records,
    Loader,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::PassOne => "pass1",
            Phase::PassTwo => "pass2",
            Phase::Records => "records",
            Phase::Loader => "loader",
        };
        write!(f, "{}", tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    /// 1-based source line.
    pub line_no: usize,
    pub message: String,
    pub source: Option<String>,
    pub label: Option<String>,
    pub opcode: Option<String>,
    pub operand: Option<String>,
    pub locctr: Option<u32>,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn error(phase: Phase, line_no: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            phase,
            severity: Severity::Error,
            line_no,
            message: message.into(),
            source: None,
            label: None,
            opcode: None,
            operand: None,
            locctr: None,
            hint: None,
        }
    }

    pub fn warning(phase: Phase, line_no: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(phase, line_no, message)
        }
    }

    pub fn with_line(mut self, line: &crate::lexer::SourceLine) -> Self {
        self.source = Some(line.raw.clone());
        self.label = line.label.clone();
        self.opcode = line.opcode.clone();
        self.operand = line.operand.clone();
        self
    }

    pub fn with_locctr(mut self, locctr: u32) -> Self {
        self.locctr = Some(locctr);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "line {} [{}] {}: {}",
            self.line_no, self.phase, severity, self.message
        )?;
        if let Some(locctr) = self.locctr {
            write!(f, " (at {:0>4X})", locctr)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\n  | {}", source.trim_end())?;
        }
        if let Some(ref hint) = self.hint {
            write!(f, "\n  = hint: {}", hint)?;
        }
        Ok(())
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shape() {
        let d = Diagnostic::error(Phase::PassTwo, 7, "displacement out of range")
            .with_locctr(0x1033)
            .with_hint("use the extended form: +STA");
        let text = d.to_string();
        assert!(text.starts_with("line 7 [pass2] error: displacement out of range"));
        assert!(text.contains("1033"));
        assert!(text.contains("hint: use the extended form"));
    }

    #[test]
    fn error_detection() {
        let diags = vec![
            Diagnostic::warning(Phase::PassOne, 1, "no END directive"),
            Diagnostic::error(Phase::PassOne, 3, "duplicate symbol"),
        ];
        assert!(has_errors(&diags));
        assert!(!has_errors(&diags[..1]));
    }
}
