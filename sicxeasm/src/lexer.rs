//! Line tokenizer. This stage never fails: malformed constructs are carried
//! through as text and surface as diagnostics in the validator or in pass 1.

use crate::constants::parse_numeric;
use crate::directive::{self, Directive, OpCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressModifier {
    Unmodified,
    Immediate,
    Indirect,
}

impl Default for AddressModifier {
    fn default() -> Self {
        Self::Unmodified
    }
}

/// One tokenized source line.
#[derive(Debug, Clone, Default)]
pub struct SourceLine {
    /// 1-based.
    pub line_no: usize,
    pub raw: String,
    pub label: Option<String>,
    /// Uppercased, `+` prefix stripped.
    pub opcode: Option<String>,
    /// As authored, minus the addressing prefix and any indexed suffix.
    pub operand: Option<String>,
    pub extended: bool,
    pub indexed: bool,
    pub modifier: AddressModifier,
    pub comment: Option<String>,
    pub is_empty: bool,
    pub is_comment: bool,
}

impl SourceLine {
    fn blank(line_no: usize, raw: &str) -> Self {
        SourceLine {
            line_no,
            raw: raw.to_owned(),
            ..SourceLine::default()
        }
    }

    pub fn directive(&self) -> Option<Directive> {
        Directive::from_mnemonic(self.opcode.as_deref()?)
    }

    /// True for lines that produce neither location nor code.
    pub fn is_blank(&self) -> bool {
        self.is_empty || self.is_comment
    }

    /// The operand is a bare number in any radix `parse_numeric` accepts,
    /// not a symbol or expression. Decides direct immediate encoding in
    /// pass 2.
    pub fn operand_is_literal(&self) -> bool {
        self.operand.as_deref().and_then(parse_numeric).is_some()
    }
}

/// Index of the first `.` or `;` outside quotes, if any.
fn comment_start(line: &str) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '.' | ';' if !in_single && !in_double => return Some(i),
            _ => {}
        }
    }
    None
}

/// Whitespace-separated tokens, treating quoted runs as opaque so `C'A B'`
/// stays one token.
fn split_tokens(code: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    for c in code.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn tokenize_line(line_no: usize, raw: &str) -> SourceLine {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let mut out = SourceLine::blank(line_no, raw);
        out.is_empty = true;
        return out;
    }

    if trimmed.starts_with('.') || trimmed.starts_with(';') {
        let mut out = SourceLine::blank(line_no, raw);
        out.is_comment = true;
        out.comment = Some(trimmed.to_owned());
        return out;
    }

    let (code, comment) = match comment_start(raw) {
        Some(i) => (&raw[..i], Some(raw[i..].trim_end().to_owned())),
        None => (raw, None),
    };

    let tokens = split_tokens(code);
    let mut out = SourceLine::blank(line_no, raw);
    out.comment = comment;
    if tokens.is_empty() {
        out.is_empty = true;
        return out;
    }

    // The first token is a label only when the line starts in column one
    // and the token either isn't a mnemonic itself or a real mnemonic
    // follows it.
    let starts_flush = !raw.starts_with(char::is_whitespace);
    let first_is_label = starts_flush
        && (!directive::is_mnemonic(&tokens[0])
            || tokens[1..].iter().any(|t| directive::is_mnemonic(t)));

    let mut rest = &tokens[..];
    if first_is_label {
        out.label = Some(tokens[0].clone());
        rest = &tokens[1..];
    }

    let Some(opcode_token) = rest.first() else {
        return out;
    };
    let opcode_token = opcode_token.as_str();
    let stripped = opcode_token.strip_prefix('+');
    out.extended = stripped.is_some();
    let opcode = stripped.unwrap_or(opcode_token).to_uppercase();

    let operand_tokens = &rest[1..];
    if !operand_tokens.is_empty() {
        let mut operand = operand_tokens.join(" ");

        if let Some(inner) = operand.strip_prefix('#') {
            out.modifier = AddressModifier::Immediate;
            operand = inner.to_owned();
        } else if let Some(inner) = operand.strip_prefix('@') {
            out.modifier = AddressModifier::Indirect;
            operand = inner.to_owned();
        }

        let format2 = matches!(
            OpCode::from_mnemonic(&opcode),
            Some(op) if op.base_format() == 2
        );
        if !format2 && operand.to_uppercase().ends_with(",X") {
            operand.truncate(operand.len() - 2);
            out.indexed = true;
        }

        if !operand.is_empty() {
            out.operand = Some(operand);
        }
    }

    out.opcode = Some(opcode);
    out
}

/// Tokenize a whole program, one entry per input line.
pub fn tokenize(source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .map(|(i, raw)| tokenize_line(i + 1, raw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> SourceLine {
        tokenize_line(1, line)
    }

    #[test]
    fn label_and_opcode() {
        let line = one("LOOP    LDA     FIVE");
        assert_eq!(line.label.as_deref(), Some("LOOP"));
        assert_eq!(line.opcode.as_deref(), Some("LDA"));
        assert_eq!(line.operand.as_deref(), Some("FIVE"));
    }

    #[test]
    fn no_label_when_indented() {
        let line = one("        LDA     FIVE");
        assert_eq!(line.label, None);
        assert_eq!(line.opcode.as_deref(), Some("LDA"));
    }

    #[test]
    fn extended_prefix() {
        let line = one("        +JSUB   RDREC");
        assert!(line.extended);
        assert_eq!(line.opcode.as_deref(), Some("JSUB"));
    }

    #[test]
    fn addressing_prefixes() {
        let line = one("        LDA     #100");
        assert_eq!(line.modifier, AddressModifier::Immediate);
        assert_eq!(line.operand.as_deref(), Some("100"));
        assert!(line.operand_is_literal());

        let line = one("        LDA     @PTR");
        assert_eq!(line.modifier, AddressModifier::Indirect);
        assert_eq!(line.operand.as_deref(), Some("PTR"));
        assert!(!line.operand_is_literal());
    }

    #[test]
    fn hex_operands_are_literals() {
        let line = one("        LDA     #0x10");
        assert!(line.operand_is_literal());

        // bare hex is a number too, same as parse_numeric
        let line = one("        COMP    #1F");
        assert!(line.operand_is_literal());

        let line = one("        LDA     #MAXLEN");
        assert!(!line.operand_is_literal());
    }

    #[test]
    fn indexed_suffix_skips_format_2() {
        let line = one("        STCH    BUFFER,X");
        assert!(line.indexed);
        assert_eq!(line.operand.as_deref(), Some("BUFFER"));

        let line = one("        RMO     A,X");
        assert!(!line.indexed);
        assert_eq!(line.operand.as_deref(), Some("A,X"));
    }

    #[test]
    fn comments() {
        let line = one(". whole line comment");
        assert!(line.is_comment);
        assert_eq!(line.comment.as_deref(), Some(". whole line comment"));

        let line = one("HERE    WORD    5 . the answer, almost");
        assert_eq!(line.label.as_deref(), Some("HERE"));
        assert_eq!(line.operand.as_deref(), Some("5"));
        assert_eq!(line.comment.as_deref(), Some(". the answer, almost"));

        let line = one("        BYTE    C'EOF.'   ; marker");
        assert_eq!(line.operand.as_deref(), Some("C'EOF.'"));
        assert_eq!(line.comment.as_deref(), Some("; marker"));
    }

    #[test]
    fn lowercase_and_casing() {
        let line = one("        lda     five,x");
        assert_eq!(line.opcode.as_deref(), Some("LDA"));
        assert!(line.indexed);
        // operand case is preserved as authored
        assert_eq!(line.operand.as_deref(), Some("five"));
    }

    #[test]
    fn label_that_shadows_mnemonic() {
        // first token is a valid mnemonic, but another follows: label wins
        let line = one("END     J       END");
        assert_eq!(line.label.as_deref(), Some("END"));
        assert_eq!(line.opcode.as_deref(), Some("J"));
        assert_eq!(line.operand.as_deref(), Some("END"));
    }

    #[test]
    fn label_only_line() {
        let line = one("ORPHAN");
        assert_eq!(line.label.as_deref(), Some("ORPHAN"));
        assert_eq!(line.opcode, None);
    }

    #[test]
    fn empty_lines() {
        assert!(one("").is_empty);
        assert!(one("   \t ").is_empty);
    }
}
