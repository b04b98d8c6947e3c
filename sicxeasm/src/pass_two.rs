//! Pass 2: addressing resolution, displacement selection, and object-code
//! emission. Consumes the pass 1 listing in source order, tracking the BASE
//! register as it goes.

use std::str::FromStr;

use tracing::debug;

use libsicxe::op::{
    AddressFlags, AddressMode, AddressRelativeTo, Op, OneReg, Register, Shift, TwoReg, Variable,
};

use crate::constants::{extract_byte_constant, is_valid_decimal, parse_numeric};
use crate::diag::{has_errors, Diagnostic, Phase};
use crate::directive::{Assembler, Directive, OpCode};
use crate::expr::{evaluate, ExprError};
use crate::lexer::{AddressModifier, SourceLine};
use crate::pass_one::{IntermediateLine, PassOne};
use crate::symbols::SymbolTable;

static MAX_DISP: i64 = 4095; // 0x0FFF
static MAX_PC: i64 = 2047; // 0x07FF
static MIN_PC: i64 = -2048; // -0x0800

/// Everything pass 2 decides about one line.
#[derive(Debug, Clone)]
pub struct PassTwoEntry {
    /// Index into the pass 1 listing.
    pub index: usize,
    pub line_no: usize,
    /// 0 for lines that carry no instruction format (directives, data).
    pub format: u8,
    pub flags: Option<AddressFlags>,
    pub mode: AddressMode,
    pub target: Option<u32>,
    pub disp: Option<u32>,
    pub relative_to: Option<AddressRelativeTo>,
    /// Uppercase hex, two digits per byte; empty for no-code lines.
    pub object_code: String,
    pub needs_modification: bool,
    pub locctr: Option<u32>,
    pub size: u32,
}

impl PassTwoEntry {
    fn no_code(index: usize, line: &IntermediateLine) -> Self {
        PassTwoEntry {
            index,
            line_no: line.source.line_no,
            format: 0,
            flags: None,
            mode: AddressMode::Simple,
            target: None,
            disp: None,
            relative_to: None,
            object_code: String::new(),
            needs_modification: false,
            locctr: line.locctr,
            size: line.size,
        }
    }
}

#[derive(Debug)]
pub struct PassTwo {
    pub entries: Vec<PassTwoEntry>,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

struct SecondPass<'a> {
    symbols: &'a SymbolTable,
    base: Option<u32>,
    diagnostics: Vec<Diagnostic>,
}

pub fn pass_two(pass_one: &PassOne) -> PassTwo {
    let mut pass = SecondPass {
        symbols: &pass_one.symbols,
        base: None,
        diagnostics: Vec::new(),
    };

    let entries = pass_one
        .lines
        .iter()
        .enumerate()
        .map(|(index, line)| pass.assemble_line(index, line))
        .collect::<Vec<_>>();

    debug!(entries = entries.len(), "pass two complete");

    let success = !has_errors(&pass.diagnostics);
    PassTwo {
        entries,
        diagnostics: pass.diagnostics,
        success,
    }
}

impl<'a> SecondPass<'a> {
    fn error(&mut self, line: &SourceLine, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(Phase::PassTwo, line.line_no, message).with_line(line)
    }

    fn assemble_line(&mut self, index: usize, line: &IntermediateLine) -> PassTwoEntry {
        let entry = PassTwoEntry::no_code(index, line);
        let source = &line.source;
        // END and everything after it carry no location and emit nothing.
        if source.is_blank() || line.locctr.is_none() {
            return entry;
        }

        let Some(directive) = source.directive() else {
            return entry;
        };

        match directive {
            Directive::Command(cmd) => self.assemble_command(cmd, line, entry),
            Directive::Op(op) => self.assemble_op(op, line, entry),
        }
    }

    fn assemble_command(
        &mut self,
        cmd: Assembler,
        line: &IntermediateLine,
        mut entry: PassTwoEntry,
    ) -> PassTwoEntry {
        let source = &line.source;
        match cmd {
            Assembler::BASE => {
                let resolved = source.operand.as_deref().and_then(|operand| {
                    self.symbols
                        .get(operand)
                        .or_else(|| parse_numeric(operand).map(|v| v as u32))
                });
                match resolved {
                    Some(value) => self.base = Some(value),
                    None => {
                        let d = self.error(
                            source,
                            format!(
                                "BASE operand {:?} is neither a symbol nor a number",
                                source.operand.as_deref().unwrap_or("")
                            ),
                        );
                        self.diagnostics.push(d);
                    }
                }
            }
            Assembler::NOBASE => self.base = None,
            Assembler::BYTE => {
                if let Some(bytes) = source.operand.as_deref().and_then(extract_byte_constant) {
                    entry.object_code = to_hex(&bytes);
                }
                // a bad constant was already reported in pass 1
            }
            Assembler::WORD => self.assemble_word(line, &mut entry),
            _ => {}
        }
        entry
    }

    fn assemble_word(&mut self, line: &IntermediateLine, entry: &mut PassTwoEntry) {
        let source = &line.source;
        let Some(operand) = source.operand.as_deref() else {
            return;
        };
        match evaluate(operand, self.symbols, line.locctr.unwrap_or(0)) {
            Ok(value) => {
                entry.object_code = format!("{:0>6X}", (value as u32) & 0x00FF_FFFF);
                // A bare symbol is an address and must move with the
                // program; arithmetic results and plain numbers are
                // absolute.
                entry.needs_modification =
                    !is_valid_decimal(operand) && self.symbols.contains(operand.trim());
            }
            Err(ExprError::Undefined(symbol)) => {
                let d = self.error(source, format!("undefined symbol {} in WORD", symbol));
                self.diagnostics.push(d);
            }
            Err(ExprError::Malformed(_)) => {
                let d = self.error(source, format!("invalid WORD operand {:?}", operand));
                self.diagnostics.push(d);
            }
        }
    }

    fn assemble_op(
        &mut self,
        op: OpCode,
        line: &IntermediateLine,
        mut entry: PassTwoEntry,
    ) -> PassTwoEntry {
        let source = &line.source;
        match op {
            OpCode::OneByte(opcode) => {
                entry.format = 1;
                entry.object_code = Op::OneByte(opcode).to_hex();
            }
            OpCode::OneReg(opcode) => {
                entry.format = 2;
                if let Some(r1) = self.register_operand(source, 0) {
                    entry.object_code = Op::OneReg(OneReg { opcode, r1 }).to_hex();
                }
            }
            OpCode::TwoReg(opcode) => {
                entry.format = 2;
                if let (Some(r1), Some(r2)) = (
                    self.register_operand(source, 0),
                    self.register_operand(source, 1),
                ) {
                    entry.object_code = Op::TwoReg(TwoReg { opcode, r1, r2 }).to_hex();
                }
            }
            OpCode::Shift(opcode) => {
                entry.format = 2;
                let count = self.numeric_operand(source, 1);
                if let (Some(r1), Some(count)) = (self.register_operand(source, 0), count) {
                    // the hardware shifts by count + 1
                    entry.object_code = Op::Shift(Shift {
                        opcode,
                        r1,
                        n: (count as u8).wrapping_sub(1),
                    })
                    .to_hex();
                }
            }
            OpCode::Svc => {
                entry.format = 2;
                if let Some(n) = self.numeric_operand(source, 0) {
                    entry.object_code = Op::Svc(n as u8).to_hex();
                }
            }
            OpCode::Variable(opcode) => {
                self.assemble_variable(opcode, line, &mut entry);
            }
        }
        entry
    }

    fn assemble_variable(
        &mut self,
        opcode: libsicxe::op::VariableOp,
        line: &IntermediateLine,
        entry: &mut PassTwoEntry,
    ) {
        let source = &line.source;
        let locctr = line.locctr.unwrap_or(0);
        let extended = source.extended;
        entry.format = if extended { 4 } else { 3 };

        let mode = match source.modifier {
            AddressModifier::Unmodified => AddressMode::Simple,
            AddressModifier::Immediate => AddressMode::Immediate,
            AddressModifier::Indirect => AddressMode::Indirect,
        };
        entry.mode = mode;

        let mut flags = AddressFlags {
            mode,
            relative_to: AddressRelativeTo::Direct,
            indexed: source.indexed,
            extended,
        };

        // Split the operand three ways: absent, a bare numeric literal, or
        // an expression over the symbol table.
        enum Target {
            None,
            Literal(i64),
            Address(u32),
            Unresolved(String),
        }

        let target = match source.operand.as_deref() {
            None => Target::None,
            Some(operand) if mode == AddressMode::Immediate && source.operand_is_literal() => {
                Target::Literal(parse_numeric(operand).unwrap_or(0))
            }
            Some(operand) => match evaluate(operand, self.symbols, locctr) {
                Ok(value) => Target::Address(value as u32),
                Err(ExprError::Undefined(symbol)) => Target::Unresolved(symbol),
                Err(ExprError::Malformed(_)) => {
                    let d = self.error(source, format!("invalid operand {:?}", operand));
                    self.diagnostics.push(d);
                    return;
                }
            },
        };

        if extended {
            // Format 4 carries the full 20-bit address; no relative forms.
            let address = match target {
                Target::None => 0,
                Target::Literal(value) => value as u32,
                Target::Address(value) => {
                    entry.target = Some(value);
                    value
                }
                Target::Unresolved(symbol) => {
                    if mode != AddressMode::Immediate {
                        let d = self.error(source, format!("undefined symbol {}", symbol));
                        self.diagnostics.push(d);
                        return;
                    }
                    0
                }
            };

            // Symbol-valued operands are relocatable: plain references in
            // simple mode, and the immediate-with-symbol form.
            let symbolic = !source.operand_is_literal() && source.operand.is_some();
            entry.needs_modification = symbolic
                && (mode == AddressMode::Simple || mode == AddressMode::Immediate);

            entry.disp = Some(address & 0x000F_FFFF);
            entry.relative_to = Some(AddressRelativeTo::Direct);
            entry.flags = Some(flags);
            entry.object_code = Op::Variable(Variable {
                opcode,
                address_flags: flags,
                disp: address & 0x000F_FFFF,
            })
            .to_hex();
            return;
        }

        let disp = match target {
            Target::None => {
                // RSUB and friends: empty displacement
                Some(0)
            }
            Target::Literal(value) => {
                entry.relative_to = Some(AddressRelativeTo::Direct);
                entry.disp = Some((value as u32) & 0x0FFF);
                Some((value as u32) & 0x0FFF)
            }
            Target::Address(value) => {
                entry.target = Some(value);
                let pc = locctr as i64 + 3;
                match select_displacement(value as i64, pc, self.base) {
                    Some((disp, relative_to)) => {
                        flags.relative_to = relative_to;
                        entry.relative_to = Some(relative_to);
                        entry.disp = Some(disp);
                        Some(disp)
                    }
                    None => {
                        let d = self
                            .error(
                                source,
                                format!(
                                    "target {:0>4X} is out of range for Format 3 addressing",
                                    value
                                ),
                            )
                            .with_locctr(locctr)
                            .with_hint(format!(
                                "use the extended form: +{}",
                                source.opcode.as_deref().unwrap_or("")
                            ));
                        self.diagnostics.push(d);
                        None
                    }
                }
            }
            Target::Unresolved(symbol) => {
                let d = self.error(source, format!("undefined symbol {}", symbol));
                self.diagnostics.push(d);
                None
            }
        };

        if let Some(disp) = disp {
            entry.flags = Some(flags);
            entry.object_code = Op::Variable(Variable {
                opcode,
                address_flags: flags,
                disp,
            })
            .to_hex();
        }
    }

    fn register_operand(&mut self, source: &SourceLine, index: usize) -> Option<Register> {
        let operand = operand_field(source, index)?;
        match Register::from_str(&operand) {
            Ok(register) => Some(register),
            Err(_) => {
                let d = self.error(source, format!("{:?} is not a register", operand));
                self.diagnostics.push(d);
                None
            }
        }
    }

    fn numeric_operand(&mut self, source: &SourceLine, index: usize) -> Option<u32> {
        let operand = operand_field(source, index)?;
        match operand.parse::<u32>() {
            Ok(n) => Some(n),
            Err(_) => {
                let d = self.error(source, format!("{:?} is not a number", operand));
                self.diagnostics.push(d);
                None
            }
        }
    }
}

fn operand_field(source: &SourceLine, index: usize) -> Option<String> {
    source
        .operand
        .as_deref()?
        .split(',')
        .nth(index)
        .map(|p| p.trim().to_uppercase())
}

/// Prefer PC-relative, fall back to BASE-relative, otherwise fail.
fn select_displacement(
    target: i64,
    pc: i64,
    base: Option<u32>,
) -> Option<(u32, AddressRelativeTo)> {
    let disp_pc = target - pc;
    if (MIN_PC..=MAX_PC).contains(&disp_pc) {
        return Some(((disp_pc as u32) & 0x0FFF, AddressRelativeTo::PC));
    }
    if let Some(base) = base {
        let disp_base = target - base as i64;
        if (0..=MAX_DISP).contains(&disp_base) {
            return Some((disp_base as u32, AddressRelativeTo::Base));
        }
    }
    None
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:0>2X}", b)).collect()
}
