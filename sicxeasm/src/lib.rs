//! A two-pass assembler for the SIC/XE instruction set.
//!
//! The pipeline is a straight line: [`lexer::tokenize`] turns source text
//! into lines, [`parser::validate`] checks them, [`pass_one::pass_one`]
//! assigns locations and builds the symbol table, [`pass_two::pass_two`]
//! emits object code, and [`record::generate`] packs the H/T/M/E records.
//! [`libsicxe::load`] closes the loop by reading the records back into a
//! memory image.

use anyhow::{bail, Result};
use tracing::debug;

use libsicxe::load::{self, LayoutEntry, MemoryImage};
use sicxedbg::Sdb;

pub mod constants;
pub mod diag;
pub mod directive;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod pass_one;
pub mod pass_two;
pub mod record;
pub mod symbols;

use diag::{has_errors, Diagnostic};
use lexer::SourceLine;
use pass_one::PassOne;
use pass_two::PassTwo;
use record::ObjectProgram;

/// Every stage's output for one assembly. Later stages are `None` when an
/// earlier stage reported errors; whatever was produced before the failure
/// stays intact.
#[derive(Debug)]
pub struct Assembly {
    pub source_lines: Vec<SourceLine>,
    pub pass_one: Option<PassOne>,
    pub pass_two: Option<PassTwo>,
    pub object: Option<ObjectProgram>,
    /// All phases' diagnostics, in pipeline order.
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
}

impl Assembly {
    fn failed(source_lines: Vec<SourceLine>, diagnostics: Vec<Diagnostic>) -> Self {
        Assembly {
            source_lines,
            pass_one: None,
            pass_two: None,
            object: None,
            diagnostics,
            success: false,
        }
    }

    /// The loader's per-byte provenance map, if assembly got far enough.
    pub fn layout(&self) -> Vec<LayoutEntry> {
        match (&self.pass_one, &self.pass_two) {
            (Some(p1), Some(p2)) => record::layout(p1, p2),
            _ => Vec::new(),
        }
    }

    /// Load the object program into a fresh memory image of `size` bytes.
    pub fn load_image(&self, size: usize) -> Result<MemoryImage> {
        let Some(ref object) = self.object else {
            bail!("no object program to load");
        };
        let program = load::parse_object_program(&object.to_string())?;
        Ok(MemoryImage::load(&program, &self.layout(), size))
    }
}

/// Run the full pipeline. Each stage runs only if its predecessor produced
/// no error-severity diagnostics.
pub fn assemble(source: &str) -> Assembly {
    let source_lines = lexer::tokenize(source);
    debug!(lines = source_lines.len(), "tokenized");

    let validation = parser::validate(&source_lines);
    let mut diagnostics = validation.diagnostics;
    if !validation.success {
        return Assembly::failed(source_lines, diagnostics);
    }

    let p1 = pass_one::pass_one(&source_lines);
    diagnostics.extend(p1.diagnostics.iter().cloned());
    if !p1.success {
        let mut assembly = Assembly::failed(source_lines, diagnostics);
        assembly.pass_one = Some(p1);
        return assembly;
    }

    let p2 = pass_two::pass_two(&p1);
    diagnostics.extend(p2.diagnostics.iter().cloned());
    if !p2.success {
        let mut assembly = Assembly::failed(source_lines, diagnostics);
        assembly.pass_one = Some(p1);
        assembly.pass_two = Some(p2);
        return assembly;
    }

    let (object, record_diagnostics) = record::generate(&p1, &p2);
    diagnostics.extend(record_diagnostics);

    let success = !has_errors(&diagnostics);
    Assembly {
        source_lines,
        pass_one: Some(p1),
        pass_two: Some(p2),
        object: Some(object),
        diagnostics,
        success,
    }
}

/// Assemble straight to the object-program text.
///
/// # Errors
///
/// Fails on the first error-severity diagnostic.
pub fn assemble_program(source: &str) -> Result<String> {
    let assembly = assemble(source);
    if !assembly.success {
        let first = assembly
            .diagnostics
            .iter()
            .find(|d| d.severity == diag::Severity::Error);
        match first {
            Some(d) => bail!("{}", d),
            None => bail!("assembly failed"),
        }
    }
    Ok(assembly
        .object
        .as_ref()
        .expect("successful assembly has an object program")
        .to_string())
}

/// Assemble and build the debug sidecar alongside the object text.
pub fn assemble_with_debug(source: &str) -> Result<(String, Sdb)> {
    let assembly = assemble(source);
    if !assembly.success {
        let first = assembly
            .diagnostics
            .iter()
            .find(|d| d.severity == diag::Severity::Error);
        match first {
            Some(d) => bail!("{}", d),
            None => bail!("assembly failed"),
        }
    }
    let object = assembly
        .object
        .as_ref()
        .expect("successful assembly has an object program")
        .to_string();

    let p1 = assembly.pass_one.as_ref().expect("pass one ran");
    let p2 = assembly.pass_two.as_ref().expect("pass two ran");

    let mut sdb = Sdb::new(&p1.program_name, p1.start_address);
    for (name, address) in p1.symbols.iter() {
        sdb.add_label(name.clone(), *address);
    }
    for entry in &p2.entries {
        let Some(address) = entry.locctr else {
            continue;
        };
        if entry.object_code.is_empty() {
            continue;
        }
        let source_line = &p1.lines[entry.index].source;
        sdb.add_line(
            address,
            source_line.line_no,
            source_line.raw.trim_end().to_owned(),
            entry.object_code.clone(),
        );
    }

    Ok((object, sdb))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "SIMPLE  START   0\n\
                          \x20       LDA     FIVE\n\
                          \x20       ADD     THREE\n\
                          \x20       STA     RESULT\n\
                          \x20       RSUB\n\
                          FIVE    WORD    5\n\
                          THREE   WORD    3\n\
                          RESULT  RESW    1\n\
                          \x20       END     SIMPLE\n";

    #[test]
    fn pipeline_end_to_end() {
        let assembly = assemble(SIMPLE);
        assert!(assembly.success, "{:?}", assembly.diagnostics);
        assert!(assembly.object.is_some());
        assert_eq!(assembly.layout().len(), 7);
    }

    #[test]
    fn stages_stop_on_error() {
        let assembly = assemble("        FROB    X\n");
        assert!(!assembly.success);
        assert!(assembly.pass_one.is_none());
        assert!(assembly.object.is_none());
        assert!(!assembly.diagnostics.is_empty());
    }

    #[test]
    fn pass_two_failure_keeps_pass_one() {
        let assembly = assemble(
            "TST     START   0\n\
             \x20       LDA     MISSING\n\
             \x20       END     TST\n",
        );
        assert!(!assembly.success);
        assert!(assembly.pass_one.is_some());
        assert!(assembly.object.is_none());
    }

    #[test]
    fn debug_sidecar() {
        let (object, sdb) = assemble_with_debug(SIMPLE).unwrap();
        assert!(object.starts_with("H^SIMPLE"));
        assert_eq!(sdb.name, "SIMPLE");
        assert_eq!(sdb.labels["FIVE"], 0x0C);
        let line = sdb.line_at(0).unwrap();
        assert_eq!(line.object_code, "032009");
        assert_eq!(line.line_number, 2);
    }

    #[test]
    fn load_image_roundtrip() {
        let assembly = assemble(SIMPLE);
        let image = assembly.load_image(load::SIC_MEMORY_SIZE).unwrap();
        assert_eq!(image.word_at(0x0C), Some(5));
        assert_eq!(image.tag_at(0).line_no, Some(2));
    }
}
