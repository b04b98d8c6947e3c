//! Per-line syntactic validation. This stage inspects tokenized lines and
//! reports; it never transforms them.

use std::str::FromStr;

use libsicxe::op::{Register, ShiftOp, VariableOp};

use crate::constants::{is_valid_byte_constant, is_valid_decimal, is_valid_hex, is_valid_label};
use crate::diag::{Diagnostic, Phase, Severity};
use crate::directive::{Assembler, Directive, OpCode};
use crate::lexer::{AddressModifier, SourceLine};

pub struct Validation {
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

pub fn validate(lines: &[SourceLine]) -> Validation {
    let mut diagnostics = Vec::new();
    for line in lines {
        validate_line(line, &mut diagnostics);
    }
    let success = !diagnostics.iter().any(|d| d.severity == Severity::Error);
    Validation {
        diagnostics,
        success,
    }
}

fn error(line: &SourceLine, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(Phase::Parser, line.line_no, message).with_line(line)
}

fn warning(line: &SourceLine, message: impl Into<String>) -> Diagnostic {
    Diagnostic::warning(Phase::Parser, line.line_no, message).with_line(line)
}

fn validate_line(line: &SourceLine, diagnostics: &mut Vec<Diagnostic>) {
    if line.is_blank() {
        return;
    }

    if let Some(ref label) = line.label {
        if !is_valid_label(label) {
            diagnostics.push(
                error(line, format!("invalid label {:?}", label)).with_hint(
                    "labels start with a letter, use letters, digits, or _, and fit in 16 characters",
                ),
            );
        }
    }

    let Some(ref opcode) = line.opcode else {
        diagnostics.push(error(line, "missing opcode"));
        return;
    };

    let Some(directive) = Directive::from_mnemonic(opcode) else {
        diagnostics.push(
            error(line, format!("unknown opcode {}", opcode))
                .with_hint("not a SIC/XE mnemonic or assembler directive"),
        );
        return;
    };

    if line.extended && !matches!(directive, Directive::Op(OpCode::Variable(_))) {
        diagnostics.push(
            error(line, format!("+{} is not a valid extended form", opcode))
                .with_hint("only Format 3 instructions take the + prefix"),
        );
    }

    if line.modifier == AddressModifier::Immediate && line.indexed {
        diagnostics.push(error(line, "immediate addressing cannot be indexed"));
    }

    match directive {
        Directive::Command(cmd) => validate_command(line, cmd, diagnostics),
        Directive::Op(op) => validate_op(line, op, diagnostics),
    }
}

fn validate_command(line: &SourceLine, cmd: Assembler, diagnostics: &mut Vec<Diagnostic>) {
    let operand = line.operand.as_deref();
    match cmd {
        Assembler::START => match operand {
            Some(addr) if is_valid_hex(addr) => {}
            Some(addr) => {
                diagnostics.push(error(line, format!("START address {:?} is not hex", addr)))
            }
            None => diagnostics
                .push(warning(line, "START without an address").with_hint("defaulting to 0")),
        },
        Assembler::BYTE => match operand {
            Some(c) if is_valid_byte_constant(c) => {}
            Some(c) => diagnostics.push(
                error(line, format!("invalid byte constant {:?}", c))
                    .with_hint("use C'chars' or X'hex' with an even number of hex digits"),
            ),
            None => diagnostics.push(error(line, "BYTE requires an operand")),
        },
        Assembler::WORD => match operand {
            Some(v) if is_valid_decimal(v) || is_valid_label(v) || crate::expr::is_expression(v) => {
            }
            Some(v) => diagnostics.push(error(line, format!("invalid WORD operand {:?}", v))),
            None => diagnostics.push(error(line, "WORD requires an operand")),
        },
        Assembler::RESB | Assembler::RESW => match operand {
            Some(n) if n.parse::<u32>().map(|n| n > 0).unwrap_or(false) => {}
            Some(n) => diagnostics.push(error(
                line,
                format!("{:?} is not a positive number of units to reserve", n),
            )),
            None => diagnostics.push(error(line, "reservation requires a count")),
        },
        Assembler::BASE => {
            if operand.is_none() {
                diagnostics.push(error(line, "BASE requires an operand"));
            }
        }
        Assembler::NOBASE | Assembler::LTORG => {
            if operand.is_some() {
                diagnostics.push(warning(
                    line,
                    format!("{:?} takes no operand", line.opcode.as_deref().unwrap_or("")),
                ));
            }
        }
        Assembler::EQU => {
            if line.label.is_none() {
                diagnostics.push(error(line, "EQU requires a label"));
            }
            if operand.is_none() {
                diagnostics.push(error(line, "EQU requires an operand"));
            }
        }
        Assembler::ORG => {
            if operand.is_none() {
                diagnostics.push(error(line, "ORG requires an operand"));
            }
        }
        Assembler::END | Assembler::USE | Assembler::CSECT | Assembler::EXTDEF
        | Assembler::EXTREF => {}
    }
}

fn validate_op(line: &SourceLine, op: OpCode, diagnostics: &mut Vec<Diagnostic>) {
    match op {
        OpCode::OneByte(_) => {
            if line.operand.is_some() {
                diagnostics.push(warning(line, "Format 1 instruction takes no operand"));
            }
        }
        OpCode::Variable(VariableOp::RSUB) => {
            if line.operand.is_some() {
                diagnostics.push(warning(line, "RSUB takes no operand"));
            }
        }
        OpCode::Variable(_) => {
            if line.operand.is_none() {
                diagnostics.push(error(line, "instruction requires an operand"));
            }
        }
        OpCode::OneReg(_) => {
            let regs = register_operands(line);
            match regs.as_slice() {
                [r] if is_register(r) => {}
                [r] => diagnostics.push(error(line, format!("{:?} is not a register", r))),
                _ => diagnostics.push(error(line, "expected a single register operand")),
            }
        }
        OpCode::Svc => {
            let regs = register_operands(line);
            match regs.as_slice() {
                [n] if is_valid_decimal(n) => {}
                [n] => diagnostics.push(error(line, format!("{:?} is not a service number", n))),
                _ => diagnostics.push(error(line, "SVC expects a single number")),
            }
        }
        OpCode::Shift(shift) => {
            let regs = register_operands(line);
            match regs.as_slice() {
                [r, n] => {
                    if !is_register(r) {
                        diagnostics.push(error(line, format!("{:?} is not a register", r)));
                    }
                    if !n.parse::<u32>().map(|n| n > 0).unwrap_or(false) {
                        diagnostics.push(error(
                            line,
                            format!("{:?} is not a valid shift count", n),
                        ));
                    }
                }
                _ => {
                    let name = match shift {
                        ShiftOp::SHIFTL => "SHIFTL",
                        ShiftOp::SHIFTR => "SHIFTR",
                    };
                    diagnostics.push(error(
                        line,
                        format!("{} expects a register and a count", name),
                    ));
                }
            }
        }
        OpCode::TwoReg(_) => {
            let regs = register_operands(line);
            match regs.as_slice() {
                [r1, r2] => {
                    for r in [r1, r2] {
                        if !is_register(r) {
                            diagnostics.push(error(line, format!("{:?} is not a register", r)));
                        }
                    }
                }
                _ => diagnostics.push(error(line, "expected two register operands")),
            }
        }
    }
}

fn register_operands(line: &SourceLine) -> Vec<String> {
    line.operand
        .as_deref()
        .map(|o| {
            o.split(',')
                .map(|p| p.trim().to_uppercase())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

fn is_register(name: &str) -> bool {
    Register::from_str(name).is_ok()
}
