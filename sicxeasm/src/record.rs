//! Object-program records: H/T/M/E in the caret-delimited text form, packed
//! from the pass 2 entry stream.

use std::fmt::Display;

use tracing::debug;

use libsicxe::load::{ByteKind, LayoutEntry};

use crate::diag::{Diagnostic, Phase};
use crate::directive::{Assembler, Directive};
use crate::pass_one::PassOne;
use crate::pass_two::{PassTwo, PassTwoEntry};

/// Most bytes one text record may carry.
const TEXT_RECORD_CAP: usize = 30;

#[derive(Debug)]
pub struct Text {
    pub address: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct Modification {
    pub address: u32,
    /// Field width in half-bytes.
    pub length: u8,
    pub add: bool,
    pub symbol: String,
}

#[derive(Debug)]
pub enum Record {
    Header {
        name: String,
        start: u32,
        length: u32,
    },
    Text(Text),
    Modification(Modification),
    End {
        first_instruction: u32,
    },
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Header {
                name,
                start,
                length,
            } => {
                write!(
                    f,
                    "H^{:<6}^{:0>6X}^{:0>6X}",
                    truncate_name(name),
                    start,
                    length
                )
            }
            Record::Text(text) => {
                write!(f, "T^{:0>6X}^{:0>2X}^", text.address, text.bytes.len())?;
                for byte in &text.bytes {
                    write!(f, "{:0>2X}", byte)?;
                }
                Ok(())
            }
            Record::Modification(m) => write!(
                f,
                "M^{:0>6X}^{:0>2X}^{}{}",
                m.address,
                m.length,
                if m.add { "+" } else { "-" },
                m.symbol
            ),
            Record::End { first_instruction } => write!(f, "E^{:0>6X}", first_instruction),
        }
    }
}

/// The full record stream, in emit order: H, T*, M*, E.
#[derive(Debug)]
pub struct ObjectProgram {
    pub records: Vec<Record>,
}

impl Display for ObjectProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for record in &self.records {
            writeln!(f, "{}", record)?;
        }
        Ok(())
    }
}

impl ObjectProgram {
    pub fn text_records(&self) -> impl Iterator<Item = &Text> {
        self.records.iter().filter_map(|r| match r {
            Record::Text(t) => Some(t),
            _ => None,
        })
    }
}

struct RecordStream {
    current: Option<Text>,
    texts: Vec<Text>,
}

impl RecordStream {
    fn new() -> Self {
        RecordStream {
            current: None,
            texts: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if let Some(text) = self.current.take() {
            self.texts.push(text);
        }
    }

    /// Append one entry's bytes. `splittable` entries (BYTE runs) may span
    /// records; instructions move whole to a new record instead.
    fn push(&mut self, address: u32, bytes: &[u8], splittable: bool) {
        let mut address = address;
        let mut bytes = bytes;

        if !splittable {
            if let Some(ref current) = self.current {
                if current.bytes.len() + bytes.len() > TEXT_RECORD_CAP {
                    self.flush();
                }
            }
            let text = self.current.get_or_insert(Text {
                address,
                bytes: Vec::new(),
            });
            text.bytes.extend_from_slice(bytes);
            return;
        }

        while !bytes.is_empty() {
            let text = self.current.get_or_insert(Text {
                address,
                bytes: Vec::new(),
            });
            let space = TEXT_RECORD_CAP - text.bytes.len();
            if space == 0 {
                self.flush();
                continue;
            }
            let take = space.min(bytes.len());
            text.bytes.extend_from_slice(&bytes[..take]);
            address += take as u32;
            bytes = &bytes[take..];
            if !bytes.is_empty() {
                self.flush();
            }
        }
    }
}

/// Pack pass 2 output into the ordered record stream.
pub fn generate(pass_one: &PassOne, pass_two: &PassTwo) -> (ObjectProgram, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut stream = RecordStream::new();
    let mut modifications = Vec::new();

    for entry in &pass_two.entries {
        if entry.object_code.is_empty() {
            // Reservations and directives break the byte run.
            stream.flush();
            continue;
        }
        let Some(address) = entry.locctr else {
            continue;
        };
        let bytes = decode_hex(&entry.object_code);
        // Only BYTE runs may straddle a record boundary; instructions and
        // WORDs move whole.
        let splittable = matches!(
            pass_one.lines[entry.index].source.directive(),
            Some(Directive::Command(Assembler::BYTE))
        );
        stream.push(address, &bytes, splittable);

        if entry.needs_modification && entry.format == 4 {
            modifications.push(Modification {
                address: address + 1,
                length: 5,
                add: true,
                symbol: truncate_name(&pass_one.program_name),
            });
        }
    }
    stream.flush();

    let first_instruction = match pass_one.end_operand.as_deref() {
        Some(operand) => match pass_one.symbols.get(operand) {
            Some(address) => address,
            None => {
                diagnostics.push(
                    Diagnostic::warning(
                        Phase::Records,
                        0,
                        format!("END operand {:?} is not a defined symbol", operand),
                    )
                    .with_hint("falling back to the program start address"),
                );
                pass_one.start_address
            }
        },
        None => pass_one.start_address,
    };

    let mut records = vec![Record::Header {
        name: pass_one.program_name.clone(),
        start: pass_one.start_address,
        length: pass_one.program_length,
    }];
    records.extend(stream.texts.into_iter().map(Record::Text));
    records.extend(modifications.into_iter().map(Record::Modification));
    records.push(Record::End { first_instruction });

    debug!(records = records.len(), "object program assembled");

    (ObjectProgram { records }, diagnostics)
}

/// The loader's view of the listing: which address ranges belong to which
/// source lines, and what they hold.
pub fn layout(pass_one: &PassOne, pass_two: &PassTwo) -> Vec<LayoutEntry> {
    pass_two
        .entries
        .iter()
        .filter_map(|entry| {
            let address = entry.locctr?;
            if entry.size == 0 {
                return None;
            }
            let source = &pass_one.lines[entry.index].source;
            Some(LayoutEntry {
                address,
                size: entry.size,
                kind: entry_kind(entry, source.directive()),
                line_no: source.line_no,
                source: source.raw.trim().to_owned(),
                label: source.label.clone(),
            })
        })
        .collect()
}

fn entry_kind(entry: &PassTwoEntry, directive: Option<Directive>) -> ByteKind {
    match directive {
        Some(Directive::Command(Assembler::BYTE | Assembler::WORD)) => ByteKind::Data,
        Some(Directive::Command(Assembler::RESB | Assembler::RESW)) => ByteKind::Reserved,
        _ if entry.format > 0 => ByteKind::Code,
        _ => ByteKind::Data,
    }
}

fn decode_hex(code: &str) -> Vec<u8> {
    code.chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .filter_map(|c| {
            let pair: String = c.iter().collect();
            u8::from_str_radix(&pair, 16).ok()
        })
        .collect()
}

fn truncate_name(name: &str) -> String {
    name.chars().take(6).collect()
}
