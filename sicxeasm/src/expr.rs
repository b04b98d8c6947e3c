//! Operand expressions: terms joined by `+`/`-`, evaluated left to right.
//! A term is `*` (the current location counter), a decimal literal, or a
//! symbol. No precedence, no parentheses.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha1, alphanumeric1, char, digit1, hex_digit1, one_of, space0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    multi::{many0, many0_count},
    sequence::{delimited, pair, preceded},
    IResult,
};
use thiserror::Error;

use crate::symbols::SymbolTable;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    /// A symbol in the expression has no table entry yet. Pass 1 defers on
    /// this; pass 2 treats it as fatal for the line.
    #[error("undefined symbol {0}")]
    Undefined(String),
    #[error("malformed expression {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Here,
    Number(i64),
    Symbol(String),
}

fn symbol(i: &str) -> IResult<&str, Term> {
    map(
        recognize(pair(
            alpha1,
            many0_count(alt((recognize(alphanumeric1), tag("_")))),
        )),
        |s: &str| Term::Symbol(s.to_uppercase()),
    )(i)
}

fn number(i: &str) -> IResult<&str, Term> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |h: &str| {
            i64::from_str_radix(h, 16).map(Term::Number)
        }),
        map_res(digit1, |d: &str| d.parse::<i64>().map(Term::Number)),
    ))(i)
}

fn term(i: &str) -> IResult<&str, Term> {
    delimited(
        space0,
        alt((map(char('*'), |_| Term::Here), number, symbol)),
        space0,
    )(i)
}

#[allow(clippy::type_complexity)]
fn expression(i: &str) -> IResult<&str, (Option<char>, Term, Vec<(char, Term)>)> {
    all_consuming(map(
        pair(
            pair(preceded(space0, opt(one_of("+-"))), term),
            many0(pair(one_of("+-"), term)),
        ),
        |((sign, first), rest)| (sign, first, rest),
    ))(i)
}

fn resolve(term: &Term, symbols: &SymbolTable, locctr: u32) -> Result<i64, ExprError> {
    match term {
        Term::Here => Ok(locctr as i64),
        Term::Number(n) => Ok(*n),
        Term::Symbol(name) => symbols
            .get(name)
            .map(|v| v as i64)
            .ok_or_else(|| ExprError::Undefined(name.clone())),
    }
}

/// Evaluate `text` against the symbol table, with `*` standing for
/// `locctr`.
pub fn evaluate(text: &str, symbols: &SymbolTable, locctr: u32) -> Result<i64, ExprError> {
    let (_, (sign, first, rest)) =
        expression(text).map_err(|_| ExprError::Malformed(text.to_owned()))?;

    let mut value = resolve(&first, symbols, locctr)?;
    if sign == Some('-') {
        value = -value;
    }
    for (op, term) in &rest {
        let rhs = resolve(term, symbols, locctr)?;
        match op {
            '+' => value += rhs,
            '-' => value -= rhs,
            _ => unreachable!("one_of only matches + or -"),
        }
    }
    Ok(value)
}

/// True when `text` parses as an expression, resolvable or not.
pub fn is_expression(text: &str) -> bool {
    expression(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::new();
        t.insert("BUFFER", 0x1000).unwrap();
        t.insert("LENGTH", 0x102D).unwrap();
        t
    }

    #[test]
    fn single_terms() {
        let t = table();
        assert_eq!(evaluate("4096", &t, 0), Ok(4096));
        assert_eq!(evaluate("0x1006", &t, 0), Ok(0x1006));
        assert_eq!(evaluate("BUFFER", &t, 0), Ok(0x1000));
        assert_eq!(evaluate("buffer", &t, 0), Ok(0x1000));
        assert_eq!(evaluate("*", &t, 0x33), Ok(0x33));
    }

    #[test]
    fn arithmetic_is_left_to_right() {
        let t = table();
        assert_eq!(evaluate("BUFFER+4096", &t, 0), Ok(0x2000));
        assert_eq!(evaluate("LENGTH-BUFFER", &t, 0), Ok(0x2D));
        assert_eq!(evaluate("LENGTH-BUFFER+1", &t, 0), Ok(0x2E));
        assert_eq!(evaluate("*-BUFFER", &t, 0x1004), Ok(4));
        assert_eq!(evaluate("-3+BUFFER", &t, 0), Ok(0x0FFD));
    }

    #[test]
    fn undefined_symbols() {
        let t = table();
        assert_eq!(
            evaluate("BUFEND", &t, 0),
            Err(ExprError::Undefined("BUFEND".into()))
        );
        assert_eq!(
            evaluate("BUFEND-BUFFER", &t, 0),
            Err(ExprError::Undefined("BUFEND".into()))
        );
    }

    #[test]
    fn malformed() {
        let t = table();
        assert!(matches!(
            evaluate("BUFFER+", &t, 0),
            Err(ExprError::Malformed(_))
        ));
        assert!(matches!(
            evaluate("BUFFER*2", &t, 0),
            Err(ExprError::Malformed(_))
        ));
        assert!(matches!(evaluate("", &t, 0), Err(ExprError::Malformed(_))));
    }

    #[test]
    fn spaces_between_terms() {
        let t = table();
        assert_eq!(evaluate("BUFFER + 4096", &t, 0), Ok(0x2000));
    }
}
