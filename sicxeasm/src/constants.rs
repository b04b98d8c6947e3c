//! Lexeme predicates shared by the lexer, validator, and both passes.

use once_cell::sync::OnceCell;
use regex::Regex;

pub static MAX_LABEL_LEN: usize = 16;

static LABEL_REGEX: OnceCell<Regex> = OnceCell::new();
static HEX_REGEX: OnceCell<Regex> = OnceCell::new();
static DECIMAL_REGEX: OnceCell<Regex> = OnceCell::new();

fn label_regex() -> &'static Regex {
    LABEL_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("label regex"))
}

fn hex_regex() -> &'static Regex {
    HEX_REGEX.get_or_init(|| Regex::new(r"^[0-9A-Fa-f]+$").expect("hex regex"))
}

fn decimal_regex() -> &'static Regex {
    DECIMAL_REGEX.get_or_init(|| Regex::new(r"^[+-]?[0-9]+$").expect("decimal regex"))
}

pub fn is_valid_label(s: &str) -> bool {
    s.len() <= MAX_LABEL_LEN && label_regex().is_match(s)
}

pub fn is_valid_hex(s: &str) -> bool {
    hex_regex().is_match(s)
}

/// Optionally signed decimal integer.
pub fn is_valid_decimal(s: &str) -> bool {
    decimal_regex().is_match(s)
}

/// A general numeric literal: `0x` prefix wins, then signed decimal, then
/// bare hex (the radix START addresses are written in).
pub fn parse_numeric(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if is_valid_decimal(s) {
        return s.parse::<i64>().ok();
    }
    if is_valid_hex(s) {
        return i64::from_str_radix(s, 16).ok();
    }
    None
}

/// `C'…'` with at least one character, or `X'…'` with an even count of hex
/// digits.
pub fn is_valid_byte_constant(s: &str) -> bool {
    extract_byte_constant(s).is_some()
}

pub fn extract_byte_constant(s: &str) -> Option<Vec<u8>> {
    let rest = s.strip_prefix('C').or_else(|| s.strip_prefix('c'));
    if let Some(rest) = rest {
        let inner = rest.strip_prefix('\'')?.strip_suffix('\'')?;
        if inner.is_empty() {
            return None;
        }
        return Some(inner.chars().map(|c| c as u8).collect());
    }

    let rest = s.strip_prefix('X').or_else(|| s.strip_prefix('x'))?;
    let inner = rest.strip_prefix('\'')?.strip_suffix('\'')?;
    if inner.is_empty() || inner.len() % 2 != 0 || !is_valid_hex(inner) {
        return None;
    }
    inner
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|c| {
            let s: String = c.iter().collect();
            u8::from_str_radix(&s, 16).ok()
        })
        .collect()
}

pub fn byte_constant_size(s: &str) -> Option<usize> {
    extract_byte_constant(s).map(|b| b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert!(is_valid_label("LOOP"));
        assert!(is_valid_label("A1_b2"));
        assert!(!is_valid_label("1LOOP"));
        assert!(!is_valid_label("LO OP"));
        assert!(!is_valid_label("THISLABELISWAYTOOLONG"));
    }

    #[test]
    fn numerics() {
        assert_eq!(parse_numeric("0x10"), Some(16));
        assert_eq!(parse_numeric("-42"), Some(-42));
        assert_eq!(parse_numeric("1000"), Some(1000));
        assert_eq!(parse_numeric("FF"), Some(255));
        assert_eq!(parse_numeric("G1"), None);
    }

    #[test]
    fn byte_constants() {
        assert_eq!(extract_byte_constant("C'EOF'"), Some(vec![0x45, 0x4F, 0x46]));
        assert_eq!(extract_byte_constant("X'F1'"), Some(vec![0xF1]));
        assert_eq!(byte_constant_size("X'0F0A21C3'"), Some(4));
        assert!(extract_byte_constant("X'F'").is_none());
        assert!(extract_byte_constant("C''").is_none());
        assert!(extract_byte_constant("D'5'").is_none());
    }
}
