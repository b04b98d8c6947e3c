//! Pass 1: location assignment and symbol resolution. Walks the tokenized
//! program once, sizing every line, then runs the deferred-EQU fixed point
//! for forward references.

use tracing::debug;

use crate::constants::byte_constant_size;
use crate::diag::{has_errors, Diagnostic, Phase};
use crate::directive::{Assembler, Directive};
use crate::expr::{evaluate, ExprError};
use crate::lexer::SourceLine;
use crate::symbols::SymbolTable;

/// A source line annotated with its place in the address space. `locctr`
/// is absent for empty, comment, END, and post-END lines.
#[derive(Debug, Clone)]
pub struct IntermediateLine {
    pub source: SourceLine,
    pub locctr: Option<u32>,
    pub size: u32,
}

#[derive(Debug)]
struct DeferredEqu {
    label: String,
    operand: String,
    locctr: u32,
    line_no: usize,
}

#[derive(Debug)]
pub struct PassOne {
    pub lines: Vec<IntermediateLine>,
    pub symbols: SymbolTable,
    pub program_name: String,
    pub start_address: u32,
    pub program_length: u32,
    /// END's operand, resolved to the first-executable address by the
    /// record generator.
    pub end_operand: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

struct FirstPass {
    locctr: u32,
    start_address: u32,
    program_name: String,
    found_start: bool,
    seen_code: bool,
    found_end: bool,
    end_locctr: u32,
    symbols: SymbolTable,
    deferred: Vec<DeferredEqu>,
    diagnostics: Vec<Diagnostic>,
}

pub fn pass_one(lines: &[SourceLine]) -> PassOne {
    let mut pass = FirstPass {
        locctr: 0,
        start_address: 0,
        program_name: "PROG".into(),
        found_start: false,
        seen_code: false,
        found_end: false,
        end_locctr: 0,
        symbols: SymbolTable::new(),
        deferred: Vec::new(),
        diagnostics: Vec::new(),
    };

    let intermediate = lines
        .iter()
        .map(|line| pass.handle_line(line))
        .collect::<Vec<_>>();

    if !pass.found_end {
        pass.end_locctr = pass.locctr;
        pass.diagnostics.push(Diagnostic::warning(
            Phase::PassOne,
            lines.len(),
            "no END directive",
        ));
    }

    pass.resolve_deferred();

    let end_operand = lines
        .iter()
        .find(|l| matches!(l.directive(), Some(Directive::Command(Assembler::END))))
        .and_then(|l| l.operand.clone());

    let program_length = pass.end_locctr.saturating_sub(pass.start_address);
    debug!(
        name = %pass.program_name,
        start = pass.start_address,
        length = program_length,
        symbols = pass.symbols.len(),
        "pass one complete"
    );

    let success = !has_errors(&pass.diagnostics);
    PassOne {
        lines: intermediate,
        symbols: pass.symbols,
        program_name: pass.program_name,
        start_address: pass.start_address,
        program_length,
        end_operand,
        diagnostics: pass.diagnostics,
        success,
    }
}

impl FirstPass {
    fn handle_line(&mut self, line: &SourceLine) -> IntermediateLine {
        if line.is_blank() || self.found_end {
            return IntermediateLine {
                source: line.clone(),
                locctr: None,
                size: 0,
            };
        }

        let Some(directive) = line.directive() else {
            // Unknown or missing opcode: the validator already reported it;
            // record the line so downstream indexes stay aligned.
            if line.opcode.is_some() {
                self.diagnostics.push(
                    Diagnostic::error(
                        Phase::PassOne,
                        line.line_no,
                        format!(
                            "cannot size unknown opcode {}",
                            line.opcode.as_deref().unwrap_or("")
                        ),
                    )
                    .with_line(line),
                );
            }
            return IntermediateLine {
                source: line.clone(),
                locctr: Some(self.locctr),
                size: 0,
            };
        };

        if !matches!(directive, Directive::Command(Assembler::START)) {
            self.seen_code = true;
        }

        match directive {
            Directive::Command(Assembler::START) => self.handle_start(line),
            Directive::Command(Assembler::END) => {
                self.found_end = true;
                self.end_locctr = self.locctr;
                IntermediateLine {
                    source: line.clone(),
                    locctr: None,
                    size: 0,
                }
            }
            Directive::Command(Assembler::EQU) => self.handle_equ(line),
            Directive::Command(Assembler::ORG) => self.handle_org(line),
            _ => {
                if let Some(ref label) = line.label {
                    self.define(label, self.locctr, line);
                }
                let size = self.line_size(line, directive);
                let locctr = self.locctr;
                self.locctr += size;
                IntermediateLine {
                    source: line.clone(),
                    locctr: Some(locctr),
                    size,
                }
            }
        }
    }

    fn handle_start(&mut self, line: &SourceLine) -> IntermediateLine {
        if self.found_start {
            self.diagnostics.push(
                Diagnostic::error(Phase::PassOne, line.line_no, "duplicate START directive")
                    .with_line(line),
            );
            return IntermediateLine {
                source: line.clone(),
                locctr: Some(self.locctr),
                size: 0,
            };
        }
        if self.seen_code {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::PassOne,
                    line.line_no,
                    "START must be the first line of the program",
                )
                .with_line(line),
            );
        }
        self.found_start = true;

        // START addresses are written in hex.
        let address = line
            .operand
            .as_deref()
            .and_then(|a| u32::from_str_radix(a, 16).ok())
            .unwrap_or(0);
        self.start_address = address;
        self.locctr = address;

        if let Some(ref label) = line.label {
            self.program_name = label.clone();
            self.define(label, self.locctr, line);
        }

        IntermediateLine {
            source: line.clone(),
            locctr: Some(self.locctr),
            size: 0,
        }
    }

    fn handle_equ(&mut self, line: &SourceLine) -> IntermediateLine {
        let entry = IntermediateLine {
            source: line.clone(),
            locctr: Some(self.locctr),
            size: 0,
        };
        let (Some(label), Some(operand)) = (line.label.as_ref(), line.operand.as_ref()) else {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::PassOne,
                    line.line_no,
                    "EQU requires both a label and an operand",
                )
                .with_line(line),
            );
            return entry;
        };

        match evaluate(operand, &self.symbols, self.locctr) {
            Ok(value) => self.define(label, value as u32, line),
            Err(ExprError::Undefined(_)) => {
                debug!(label = %label, operand = %operand, "deferring EQU");
                self.deferred.push(DeferredEqu {
                    label: label.clone(),
                    operand: operand.clone(),
                    locctr: self.locctr,
                    line_no: line.line_no,
                });
            }
            Err(ExprError::Malformed(_)) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        Phase::PassOne,
                        line.line_no,
                        format!("malformed EQU expression {:?}", operand),
                    )
                    .with_line(line),
                );
            }
        }
        entry
    }

    fn handle_org(&mut self, line: &SourceLine) -> IntermediateLine {
        if let Some(ref label) = line.label {
            self.define(label, self.locctr, line);
        }
        match line
            .operand
            .as_ref()
            .ok_or_else(|| ExprError::Malformed(String::new()))
            .and_then(|operand| evaluate(operand, &self.symbols, self.locctr))
        {
            Ok(value) if value >= 0 => self.locctr = value as u32,
            Ok(_) => {
                self.diagnostics.push(
                    Diagnostic::error(Phase::PassOne, line.line_no, "ORG to a negative address")
                        .with_line(line),
                );
            }
            Err(ExprError::Undefined(symbol)) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        Phase::PassOne,
                        line.line_no,
                        format!("ORG references undefined symbol {}", symbol),
                    )
                    .with_line(line)
                    .with_hint("ORG must be resolvable when it is reached"),
                );
            }
            Err(ExprError::Malformed(_)) => {
                self.diagnostics.push(
                    Diagnostic::error(Phase::PassOne, line.line_no, "ORG requires an expression")
                        .with_line(line),
                );
            }
        }
        IntermediateLine {
            source: line.clone(),
            locctr: Some(self.locctr),
            size: 0,
        }
    }

    fn define(&mut self, label: &str, address: u32, line: &SourceLine) {
        if let Err(prior) = self.symbols.insert(label, address) {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::PassOne,
                    line.line_no,
                    format!(
                        "duplicate symbol {} (already defined at {:0>4X}, redefined at {:0>4X})",
                        label.to_uppercase(),
                        prior,
                        address
                    ),
                )
                .with_line(line)
                .with_locctr(address),
            );
        }
    }

    fn line_size(&mut self, line: &SourceLine, directive: Directive) -> u32 {
        let size = match directive {
            Directive::Op(op) => match op.base_format() {
                _ if line.extended => Ok(4),
                1 => Ok(1),
                2 => Ok(2),
                _ => Ok(3),
            },
            Directive::Command(Assembler::WORD) => Ok(3),
            Directive::Command(Assembler::BYTE) => line
                .operand
                .as_deref()
                .and_then(byte_constant_size)
                .map(|n| n as u32)
                .ok_or("BYTE requires a C'…' or X'…' constant"),
            Directive::Command(Assembler::RESB) => reservation_count(line),
            Directive::Command(Assembler::RESW) => reservation_count(line).map(|n| n * 3),
            Directive::Command(_) => Ok(0),
        };

        match size {
            Ok(size) => size,
            Err(message) => {
                self.diagnostics.push(
                    Diagnostic::error(Phase::PassOne, line.line_no, message)
                        .with_line(line)
                        .with_locctr(self.locctr),
                );
                0
            }
        }
    }

    /// Re-try deferred EQUs until a full sweep resolves nothing new.
    fn resolve_deferred(&mut self) {
        let cap = self.deferred.len() + 1;
        for _ in 0..cap {
            if self.deferred.is_empty() {
                break;
            }
            let pending = std::mem::take(&mut self.deferred);
            let before = pending.len();
            for equ in pending {
                match evaluate(&equ.operand, &self.symbols, equ.locctr) {
                    Ok(value) => {
                        if let Err(prior) = self.symbols.insert(&equ.label, value as u32) {
                            self.diagnostics.push(Diagnostic::error(
                                Phase::PassOne,
                                equ.line_no,
                                format!(
                                    "duplicate symbol {} (already defined at {:0>4X})",
                                    equ.label.to_uppercase(),
                                    prior
                                ),
                            ));
                        }
                    }
                    Err(ExprError::Undefined(_)) => self.deferred.push(equ),
                    Err(ExprError::Malformed(_)) => {
                        self.diagnostics.push(Diagnostic::error(
                            Phase::PassOne,
                            equ.line_no,
                            format!("malformed EQU expression {:?}", equ.operand),
                        ));
                    }
                }
            }
            if self.deferred.len() == before {
                break;
            }
        }

        for equ in std::mem::take(&mut self.deferred) {
            self.diagnostics.push(
                Diagnostic::error(
                    Phase::PassOne,
                    equ.line_no,
                    format!(
                        "EQU {} = {:?}: undefined symbol or circular reference",
                        equ.label, equ.operand
                    ),
                )
                .with_hint("every symbol in an EQU expression must be defined somewhere"),
            );
        }
    }
}

fn reservation_count(line: &SourceLine) -> Result<u32, &'static str> {
    line.operand
        .as_deref()
        .and_then(|n| n.parse::<u32>().ok())
        .filter(|&n| n > 0)
        .ok_or("reservation requires a positive count")
}
