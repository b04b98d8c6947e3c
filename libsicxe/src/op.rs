use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use strum_macros::EnumString;

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneByteOp {
    FIX = 0xC4,
    FLOAT = 0xC0,
    HIO = 0xF4,
    NORM = 0xC8,
    SIO = 0xF0,
    TIO = 0xF8,
}

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneRegOp {
    CLEAR = 0xB4,
    TIXR = 0xB8,
}

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoRegOp {
    ADDR = 0x90,
    COMPR = 0xA0,
    DIVR = 0x9C,
    MULR = 0x98,
    RMO = 0xAC,
    SUBR = 0x94,
}

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    SHIFTL = 0xA4,
    SHIFTR = 0xA8,
}

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableOp {
    ADD = 0x18,
    ADDF = 0x58,
    AND = 0x40,
    COMP = 0x28,
    COMPF = 0x88,
    DIV = 0x24,
    DIVF = 0x64,
    J = 0x3C,
    JEQ = 0x30,
    JGT = 0x34,
    JLT = 0x38,
    JSUB = 0x48,
    LDA = 0x00,
    LDB = 0x68,
    LDCH = 0x50,
    LDF = 0x70,
    LDL = 0x08,
    LDS = 0x6C,
    LDT = 0x74,
    LDX = 0x04,
    LPS = 0xD0,
    MUL = 0x20,
    MULF = 0x60,
    OR = 0x44,
    RD = 0xD8,
    RSUB = 0x4C,
    SSK = 0xEC,
    STA = 0x0C,
    STB = 0x78,
    STCH = 0x54,
    STF = 0x80,
    STI = 0xD4,
    STL = 0x14,
    STS = 0x7C,
    STSW = 0xE8,
    STT = 0x84,
    STX = 0x10,
    SUB = 0x1C,
    SUBF = 0x5C,
    TD = 0xE0,
    TIX = 0x2C,
    WD = 0xDC,
}

pub const SVC: u8 = 0xB0;

#[derive(FromPrimitive, EnumString, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A = 0,
    X = 1,
    L = 2,
    B = 3,
    S = 4,
    T = 5,
    F = 6,
    PC = 8,
    SW = 9,
}

impl Register {
    fn r1_with(&self, r2: Register) -> u8 {
        ((*self as u8) << 4) + ((r2 as u8) & 0x0F)
    }

    fn from_r1(registers: u8) -> Option<Register> {
        Register::from_u8(registers >> 4)
    }

    fn from_r2(registers: u8) -> Option<Register> {
        Register::from_u8(registers & 0x0F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Simple,
    Immediate,
    Indirect,
}

impl Default for AddressMode {
    fn default() -> Self {
        Self::Simple
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRelativeTo {
    Direct,
    Base,
    PC,
}

impl Default for AddressRelativeTo {
    fn default() -> Self {
        AddressRelativeTo::Direct
    }
}

/// The n/i/x/b/p/e bits of a Format 3/4 instruction, kept symbolic until
/// encoding. The (n, i) pair is derived from `mode`; b and p from
/// `relative_to`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressFlags {
    pub mode: AddressMode,
    pub relative_to: AddressRelativeTo,
    pub indexed: bool,
    pub extended: bool,
}

impl AddressFlags {
    /// Recover the flags from the first two instruction bytes. Returns
    /// `None` for the SIC-compatible form (n = i = 0), which this
    /// assembler never emits.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        let mode = match bytes[0] & 0x03 {
            0x03 => AddressMode::Simple,
            0x02 => AddressMode::Indirect,
            0x01 => AddressMode::Immediate,
            _ => return None,
        };
        let base_relative = bytes[1] & 0x40 > 0;
        let pc_relative = bytes[1] & 0x20 > 0;
        Some(AddressFlags {
            mode,
            relative_to: match (base_relative, pc_relative) {
                (true, false) => AddressRelativeTo::Base,
                (false, true) => AddressRelativeTo::PC,
                _ => AddressRelativeTo::Direct,
            },
            indexed: bytes[1] & 0x80 > 0,
            extended: bytes[1] & 0x10 > 0,
        })
    }

    pub fn n(&self) -> u8 {
        match self.mode {
            AddressMode::Simple | AddressMode::Indirect => 1,
            AddressMode::Immediate => 0,
        }
    }

    pub fn i(&self) -> u8 {
        match self.mode {
            AddressMode::Simple | AddressMode::Immediate => 1,
            AddressMode::Indirect => 0,
        }
    }

    pub fn x(&self) -> u8 {
        self.indexed as u8
    }

    pub fn b(&self) -> u8 {
        (self.relative_to == AddressRelativeTo::Base) as u8
    }

    pub fn p(&self) -> u8 {
        (self.relative_to == AddressRelativeTo::PC) as u8
    }

    pub fn e(&self) -> u8 {
        self.extended as u8
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OneReg {
    pub opcode: OneRegOp,
    pub r1: Register,
}

#[derive(Debug, Clone, Copy)]
pub struct TwoReg {
    pub opcode: TwoRegOp,
    pub r1: Register,
    pub r2: Register,
}

#[derive(Debug, Clone, Copy)]
pub struct Shift {
    pub opcode: ShiftOp,
    pub r1: Register,
    /// Stored pre-encoded as count - 1.
    pub n: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub opcode: VariableOp,
    pub address_flags: AddressFlags,
    /// 12-bit displacement, or 20-bit address when extended.
    pub disp: u32,
}

#[derive(Debug, Clone, Copy)]
pub enum Op {
    OneByte(OneByteOp),
    OneReg(OneReg),
    TwoReg(TwoReg),
    Shift(Shift),
    Svc(u8),
    Variable(Variable),
}

#[allow(clippy::len_without_is_empty)]
impl Op {
    pub fn len(&self) -> u32 {
        match self {
            Op::OneByte(_) => 1,
            Op::OneReg(_) | Op::TwoReg(_) | Op::Shift(_) | Op::Svc(_) => 2,
            Op::Variable(Variable {
                address_flags: AddressFlags { extended, .. },
                ..
            }) => {
                if *extended {
                    4
                } else {
                    3
                }
            }
        }
    }

    /// Decode an instruction from its first four bytes (unused trailing
    /// bytes are ignored). Returns `None` when byte 0 matches no opcode or
    /// the operand fields are malformed.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        if bytes[0] == SVC {
            return Some(Op::Svc(bytes[1] >> 4));
        }
        if let Some(opcode) = OneByteOp::from_u8(bytes[0]) {
            return Some(Op::OneByte(opcode));
        }
        if let Some(opcode) = OneRegOp::from_u8(bytes[0]) {
            return Some(Op::OneReg(OneReg {
                opcode,
                r1: Register::from_r1(bytes[1])?,
            }));
        }
        if let Some(opcode) = TwoRegOp::from_u8(bytes[0]) {
            return Some(Op::TwoReg(TwoReg {
                opcode,
                r1: Register::from_r1(bytes[1])?,
                r2: Register::from_r2(bytes[1])?,
            }));
        }
        if let Some(opcode) = ShiftOp::from_u8(bytes[0]) {
            return Some(Op::Shift(Shift {
                opcode,
                r1: Register::from_r1(bytes[1])?,
                n: bytes[1] & 0x0F,
            }));
        }
        if let Some(opcode) = VariableOp::from_u8(bytes[0] & 0xFC) {
            let address_flags = AddressFlags::from_bytes([bytes[0], bytes[1]])?;
            let disp = if address_flags.extended {
                (((bytes[1] & 0x0F) as u32) << 16) + ((bytes[2] as u32) << 8) + bytes[3] as u32
            } else {
                (((bytes[1] & 0x0F) as u32) << 8) + bytes[2] as u32
            };
            return Some(Op::Variable(Variable {
                opcode,
                address_flags,
                disp,
            }));
        }
        None
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            Op::OneByte(opcode) => [*opcode as u8, 0, 0, 0],
            Op::OneReg(or) => [or.opcode as u8, or.r1.r1_with(Register::A), 0, 0],
            Op::TwoReg(tr) => [tr.opcode as u8, tr.r1.r1_with(tr.r2), 0, 0],
            Op::Shift(shift) => [
                shift.opcode as u8,
                ((shift.r1 as u8) << 4) + (shift.n & 0x0F),
                0,
                0,
            ],
            Op::Svc(n) => [SVC, (n & 0x0F) << 4, 0, 0],
            Op::Variable(var) => {
                let flags = &var.address_flags;
                // The opcode table keeps the low two bits clear; n and i
                // land there.
                let a = (var.opcode as u8) + (flags.n() << 1) + flags.i();

                let bits =
                    (flags.x() << 7) + (flags.b() << 6) + (flags.p() << 5) + (flags.e() << 4);

                if flags.extended {
                    let [_, b, c, d] = var.disp.to_be_bytes();
                    [a, bits + (b & 0x0F), c, d]
                } else {
                    let [_, _, b, c] = var.disp.to_be_bytes();
                    [a, bits + (b & 0x0F), c, 0]
                }
            }
        }
    }

    /// The emitted object code, uppercase hex, one pair per byte.
    pub fn to_hex(&self) -> String {
        let bytes = self.to_bytes();
        bytes[..self.len() as usize]
            .iter()
            .map(|b| format!("{:0>2X}", b))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mnemonic_lookup() {
        assert_eq!(VariableOp::from_str("LDA"), Ok(VariableOp::LDA));
        assert_eq!(TwoRegOp::from_str("RMO"), Ok(TwoRegOp::RMO));
        assert_eq!(Register::from_str("SW"), Ok(Register::SW));
        assert!(VariableOp::from_str("NOPE").is_err());
    }

    #[test]
    fn simple_pc_relative() {
        let op = Op::Variable(Variable {
            opcode: VariableOp::LDA,
            address_flags: AddressFlags {
                mode: AddressMode::Simple,
                relative_to: AddressRelativeTo::PC,
                indexed: false,
                extended: false,
            },
            disp: 0x009,
        });
        assert_eq!(op.to_hex(), "032009");
    }

    #[test]
    fn extended_simple() {
        let op = Op::Variable(Variable {
            opcode: VariableOp::JSUB,
            address_flags: AddressFlags {
                mode: AddressMode::Simple,
                relative_to: AddressRelativeTo::Direct,
                indexed: false,
                extended: true,
            },
            disp: 0x02039,
        });
        assert_eq!(op.to_hex(), "4B102039");
    }

    #[test]
    fn negative_pc_displacement_wraps() {
        // disp is pre-masked to 12 bits by the caller
        let op = Op::Variable(Variable {
            opcode: VariableOp::J,
            address_flags: AddressFlags {
                mode: AddressMode::Simple,
                relative_to: AddressRelativeTo::PC,
                indexed: false,
                extended: false,
            },
            disp: 0xFFA,
        });
        assert_eq!(op.to_hex(), "3F2FFA");
    }

    #[test]
    fn two_reg() {
        let op = Op::TwoReg(TwoReg {
            opcode: TwoRegOp::COMPR,
            r1: Register::A,
            r2: Register::S,
        });
        assert_eq!(op.to_hex(), "A004");
    }

    #[test]
    fn shift_and_svc() {
        let op = Op::Shift(Shift {
            opcode: ShiftOp::SHIFTR,
            r1: Register::T,
            n: 3, // authored as 4
        });
        assert_eq!(op.to_hex(), "A853");

        let op = Op::Svc(2);
        assert_eq!(op.to_hex(), "B020");
    }

    #[test]
    fn decode_matches_encode() {
        let ops = [
            Op::OneByte(OneByteOp::TIO),
            Op::OneReg(OneReg {
                opcode: OneRegOp::CLEAR,
                r1: Register::X,
            }),
            Op::TwoReg(TwoReg {
                opcode: TwoRegOp::RMO,
                r1: Register::A,
                r2: Register::SW,
            }),
            Op::Shift(Shift {
                opcode: ShiftOp::SHIFTL,
                r1: Register::T,
                n: 3,
            }),
            Op::Svc(2),
            Op::Variable(Variable {
                opcode: VariableOp::STCH,
                address_flags: AddressFlags {
                    mode: AddressMode::Simple,
                    relative_to: AddressRelativeTo::Base,
                    indexed: true,
                    extended: false,
                },
                disp: 0x057,
            }),
            Op::Variable(Variable {
                opcode: VariableOp::JSUB,
                address_flags: AddressFlags {
                    mode: AddressMode::Simple,
                    relative_to: AddressRelativeTo::Direct,
                    indexed: false,
                    extended: true,
                },
                disp: 0x02039,
            }),
        ];
        for op in ops {
            let bytes = op.to_bytes();
            let back = Op::from_bytes(bytes).unwrap();
            assert_eq!(back.to_bytes(), bytes);
            assert_eq!(back.len(), op.len());
        }
    }

    #[test]
    fn decode_extended_jsub() {
        let Some(Op::Variable(var)) = Op::from_bytes([0x4B, 0x10, 0x20, 0x39]) else {
            panic!("expected a variable-format op");
        };
        assert_eq!(var.opcode, VariableOp::JSUB);
        assert!(var.address_flags.extended);
        assert_eq!(var.disp, 0x02039);
    }

    #[test]
    fn sic_compatible_words_do_not_decode() {
        // n = i = 0 is the SIC-compatible form, which this assembler
        // never produces
        assert!(Op::from_bytes([0x00, 0x00, 0x05, 0x00]).is_none());
    }

    #[test]
    fn indexed_sets_x() {
        let op = Op::Variable(Variable {
            opcode: VariableOp::STCH,
            address_flags: AddressFlags {
                mode: AddressMode::Simple,
                relative_to: AddressRelativeTo::Base,
                indexed: true,
                extended: false,
            },
            disp: 0x057,
        });
        assert_eq!(op.to_hex(), "57C057");
    }
}
