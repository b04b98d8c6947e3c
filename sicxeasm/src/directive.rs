//! Mnemonic-level classification: every opcode in the instruction set plus
//! the assembler directives, keyed by the uppercased token from the lexer.

use std::str::FromStr;

use strum_macros::EnumString;

use libsicxe::op::{OneByteOp, OneRegOp, ShiftOp, TwoRegOp, VariableOp, SVC};

#[allow(clippy::upper_case_acronyms)]
#[derive(EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assembler {
    START,
    END,
    BYTE,
    WORD,
    RESB,
    RESW,
    BASE,
    NOBASE,
    EQU,
    ORG,
    LTORG,
    // Recognized but assembled to nothing.
    USE,
    CSECT,
    EXTDEF,
    EXTREF,
}

/// An opcode stripped of its operands: which format family it belongs to
/// and which opcode byte it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    OneByte(OneByteOp),
    OneReg(OneRegOp),
    TwoReg(TwoRegOp),
    Shift(ShiftOp),
    Svc,
    Variable(VariableOp),
}

impl OpCode {
    pub fn from_mnemonic(i: &str) -> Option<OpCode> {
        if let Ok(one) = OneByteOp::from_str(i) {
            Some(OpCode::OneByte(one))
        } else if let Ok(onereg) = OneRegOp::from_str(i) {
            Some(OpCode::OneReg(onereg))
        } else if let Ok(tworeg) = TwoRegOp::from_str(i) {
            Some(OpCode::TwoReg(tworeg))
        } else if let Ok(shift) = ShiftOp::from_str(i) {
            Some(OpCode::Shift(shift))
        } else if let Ok(variable) = VariableOp::from_str(i) {
            Some(OpCode::Variable(variable))
        } else if i == "SVC" {
            Some(OpCode::Svc)
        } else {
            None
        }
    }

    pub fn opcode_byte(&self) -> u8 {
        match self {
            OpCode::OneByte(o) => *o as u8,
            OpCode::OneReg(o) => *o as u8,
            OpCode::TwoReg(o) => *o as u8,
            OpCode::Shift(o) => *o as u8,
            OpCode::Svc => SVC,
            OpCode::Variable(o) => *o as u8,
        }
    }

    pub fn base_format(&self) -> u8 {
        match self {
            OpCode::OneByte(_) => 1,
            OpCode::OneReg(_) | OpCode::TwoReg(_) | OpCode::Shift(_) | OpCode::Svc => 2,
            OpCode::Variable(_) => 3,
        }
    }

    /// How many comma-separated operands the mnemonic expects.
    pub fn arity(&self) -> u8 {
        match self {
            OpCode::OneByte(_) => 0,
            OpCode::OneReg(_) | OpCode::Svc => 1,
            OpCode::TwoReg(_) | OpCode::Shift(_) => 2,
            OpCode::Variable(VariableOp::RSUB) => 0,
            OpCode::Variable(_) => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Op(OpCode),
    Command(Assembler),
}

impl Directive {
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        if let Ok(cmd) = Assembler::from_str(s) {
            Some(Directive::Command(cmd))
        } else {
            OpCode::from_mnemonic(s).map(Directive::Op)
        }
    }
}

/// Is this token (possibly carrying a `+` prefix) an opcode or directive?
/// The lexer's label heuristic leans on this.
pub fn is_mnemonic(token: &str) -> bool {
    let token = token.strip_prefix('+').unwrap_or(token);
    Directive::from_mnemonic(&token.to_uppercase()).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            Directive::from_mnemonic("LDA"),
            Some(Directive::Op(OpCode::Variable(VariableOp::LDA)))
        );
        assert_eq!(
            Directive::from_mnemonic("RESW"),
            Some(Directive::Command(Assembler::RESW))
        );
        assert_eq!(Directive::from_mnemonic("FROB"), None);
    }

    #[test]
    fn formats_and_opcodes() {
        let lda = OpCode::from_mnemonic("LDA").unwrap();
        assert_eq!(lda.opcode_byte(), 0x00);
        assert_eq!(lda.base_format(), 3);

        let compr = OpCode::from_mnemonic("COMPR").unwrap();
        assert_eq!(compr.opcode_byte(), 0xA0);
        assert_eq!(compr.base_format(), 2);
        assert_eq!(compr.arity(), 2);

        let tio = OpCode::from_mnemonic("TIO").unwrap();
        assert_eq!(tio.base_format(), 1);
        assert_eq!(tio.arity(), 0);

        assert_eq!(OpCode::from_mnemonic("RSUB").unwrap().arity(), 0);
        assert_eq!(OpCode::from_mnemonic("SVC").unwrap().opcode_byte(), 0xB0);
    }

    #[test]
    fn mnemonic_probe() {
        assert!(is_mnemonic("+lda"));
        assert!(is_mnemonic("Byte"));
        assert!(!is_mnemonic("LOOP"));
    }
}
