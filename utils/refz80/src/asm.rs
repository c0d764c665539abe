//! Single-pass assembler for the instruction subset [`Cpu`](crate::Cpu)
//! executes.
//!
//! Instructions are written one per call in conventional Z80 syntax
//! (`ld (ix+1),a`). Relative jumps take an absolute target address, since
//! there are no labels.

use deltabench::{Assembler, Diagnostic, Program, parse_literal};
use thiserror::Error;

use crate::cpu::Index;

#[derive(Debug, Error, PartialEq, Eq)]
enum EncodeError {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("cannot parse operand `{0}`")]
    BadOperand(String),
    #[error("unsupported operands for `{0}`")]
    UnsupportedOperands(String),
    #[error("value {value:#x} does not fit in {bits} bits")]
    OutOfRange { value: u32, bits: u32 },
    #[error("index displacement {0} is outside -128..=127")]
    IndexDisplacement(i64),
    #[error("jump target {0:#06x} is out of relative range")]
    RelativeTarget(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    /// 8-bit register by encoding: b c d e h l (hl) a.
    Reg(u8),
    /// 16-bit pair by encoding: bc de hl sp.
    Pair(u8),
    Af,
    AfShadow,
    Index(Index),
    Indexed(Index, i8),
    IndBc,
    IndDe,
    I,
    Mem(u32),
    Imm(u32),
}

const ALU: [&str; 8] = ["add", "adc", "sub", "sbc", "and", "xor", "or", "cp"];

const MNEMONICS: &[&str] = &[
    "nop", "halt", "di", "ei", "im", "exx", "ex", "scf", "ccf", "cpl", "neg", "ld", "inc", "dec",
    "push", "pop", "jp", "jr", "djnz", "db",
];

fn number(text: &str) -> Result<u32, EncodeError> {
    parse_literal(text).ok_or_else(|| EncodeError::BadOperand(text.to_owned()))
}

fn byte(value: u32) -> Result<u8, EncodeError> {
    u8::try_from(value).map_err(|_| EncodeError::OutOfRange { value, bits: 8 })
}

fn word(value: u32) -> Result<[u8; 2], EncodeError> {
    u16::try_from(value)
        .map(u16::to_le_bytes)
        .map_err(|_| EncodeError::OutOfRange { value, bits: 16 })
}

fn parse_indirect(inner: &str) -> Result<Operand, EncodeError> {
    for (name, index) in [("ix", Index::Ix), ("iy", Index::Iy)] {
        let Some(rest) = inner.strip_prefix(name) else {
            continue;
        };
        let rest = rest.trim();
        let displacement = if rest.is_empty() {
            0
        } else if let Some(magnitude) = rest.strip_prefix('+') {
            i64::from(number(magnitude)?)
        } else if let Some(magnitude) = rest.strip_prefix('-') {
            -i64::from(number(magnitude)?)
        } else {
            return Err(EncodeError::BadOperand(format!("({inner})")));
        };
        let displacement = i8::try_from(displacement)
            .map_err(|_| EncodeError::IndexDisplacement(displacement))?;
        return Ok(Operand::Indexed(index, displacement));
    }
    Ok(Operand::Mem(number(inner)?))
}

fn parse_operand(text: &str) -> Result<Operand, EncodeError> {
    let text = text.trim();
    let operand = match text {
        "b" => Operand::Reg(0),
        "c" => Operand::Reg(1),
        "d" => Operand::Reg(2),
        "e" => Operand::Reg(3),
        "h" => Operand::Reg(4),
        "l" => Operand::Reg(5),
        "(hl)" => Operand::Reg(6),
        "a" => Operand::Reg(7),
        "bc" => Operand::Pair(0),
        "de" => Operand::Pair(1),
        "hl" => Operand::Pair(2),
        "sp" => Operand::Pair(3),
        "af" => Operand::Af,
        "af'" => Operand::AfShadow,
        "ix" => Operand::Index(Index::Ix),
        "iy" => Operand::Index(Index::Iy),
        "(bc)" => Operand::IndBc,
        "(de)" => Operand::IndDe,
        "i" => Operand::I,
        _ => match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            Some(inner) => parse_indirect(inner.trim())?,
            None => Operand::Imm(number(text)?),
        },
    };
    Ok(operand)
}

fn relative(here: u32, target: u32) -> Result<u8, EncodeError> {
    let displacement = i64::from(target) - i64::from(here + 2);
    i8::try_from(displacement)
        .map(|d| d as u8)
        .map_err(|_| EncodeError::RelativeTarget(target))
}

fn encode_alu(code: u8, operand: Operand) -> Result<Vec<u8>, EncodeError> {
    let bytes = match operand {
        Operand::Reg(r) => vec![0x80 | code << 3 | r],
        Operand::Imm(n) => vec![0xc6 | code << 3, byte(n)?],
        Operand::Indexed(index, d) => vec![index.prefix(), 0x86 | code << 3, d as u8],
        _ => return Err(EncodeError::UnsupportedOperands(ALU[usize::from(code)].to_owned())),
    };
    Ok(bytes)
}

/// Encode one instruction placed at `here`.
fn encode(mnemonic: &str, operands: &[Operand], here: u32) -> Result<Vec<u8>, EncodeError> {
    use Operand::*;

    // 16-bit adds share a mnemonic with the accumulator form
    let alu = ALU.iter().position(|m| *m == mnemonic);
    if let Some(code) = alu {
        match (mnemonic, operands) {
            ("add", [Pair(2), _]) | ("add", [Index(_), _]) => {}
            (_, [Reg(7), rhs]) | (_, [rhs]) => return encode_alu(code as u8, *rhs),
            _ => return Err(EncodeError::UnsupportedOperands(mnemonic.to_owned())),
        }
    }

    let bytes = match (mnemonic, operands) {
        ("nop", []) => vec![0x00],
        ("halt", []) => vec![0x76],
        ("di", []) => vec![0xf3],
        ("ei", []) => vec![0xfb],
        ("exx", []) => vec![0xd9],
        ("scf", []) => vec![0x37],
        ("ccf", []) => vec![0x3f],
        ("cpl", []) => vec![0x2f],
        ("neg", []) => vec![0xed, 0x44],
        ("im", [Imm(0)]) => vec![0xed, 0x46],
        ("im", [Imm(1)]) => vec![0xed, 0x56],
        ("im", [Imm(2)]) => vec![0xed, 0x5e],
        ("ex", [Af, AfShadow]) => vec![0x08],
        ("ex", [Pair(1), Pair(2)]) => vec![0xeb],

        ("ld", [Reg(dst), Reg(src)]) if (*dst, *src) != (6, 6) => vec![0x40 | *dst << 3 | *src],
        ("ld", [Reg(dst), Imm(n)]) => vec![0x06 | *dst << 3, byte(*n)?],
        ("ld", [Reg(7), IndBc]) => vec![0x0a],
        ("ld", [Reg(7), IndDe]) => vec![0x1a],
        ("ld", [IndBc, Reg(7)]) => vec![0x02],
        ("ld", [IndDe, Reg(7)]) => vec![0x12],
        ("ld", [Reg(7), Mem(addr)]) => {
            let [lo, hi] = word(*addr)?;
            vec![0x3a, lo, hi]
        }
        ("ld", [Mem(addr), Reg(7)]) => {
            let [lo, hi] = word(*addr)?;
            vec![0x32, lo, hi]
        }
        ("ld", [Reg(7), I]) => vec![0xed, 0x57],
        ("ld", [I, Reg(7)]) => vec![0xed, 0x47],
        ("ld", [Pair(3), Pair(2)]) => vec![0xf9],
        ("ld", [Pair(3), Index(x)]) => vec![x.prefix(), 0xf9],
        ("ld", [Pair(p), Imm(n)]) => {
            let [lo, hi] = word(*n)?;
            vec![0x01 | *p << 4, lo, hi]
        }
        ("ld", [Index(x), Imm(n)]) => {
            let [lo, hi] = word(*n)?;
            vec![x.prefix(), 0x21, lo, hi]
        }
        ("ld", [Indexed(x, d), Reg(r)]) if *r != 6 => vec![x.prefix(), 0x70 | *r, *d as u8],
        ("ld", [Reg(r), Indexed(x, d)]) if *r != 6 => {
            vec![x.prefix(), 0x46 | *r << 3, *d as u8]
        }
        ("ld", [Indexed(x, d), Imm(n)]) => vec![x.prefix(), 0x36, *d as u8, byte(*n)?],

        ("inc", [Reg(r)]) => vec![0x04 | *r << 3],
        ("dec", [Reg(r)]) => vec![0x05 | *r << 3],
        ("inc", [Pair(p)]) => vec![0x03 | *p << 4],
        ("dec", [Pair(p)]) => vec![0x0b | *p << 4],
        ("inc", [Index(x)]) => vec![x.prefix(), 0x23],
        ("dec", [Index(x)]) => vec![x.prefix(), 0x2b],
        ("inc", [Indexed(x, d)]) => vec![x.prefix(), 0x34, *d as u8],
        ("dec", [Indexed(x, d)]) => vec![x.prefix(), 0x35, *d as u8],

        ("add", [Pair(2), Pair(p)]) => vec![0x09 | *p << 4],
        ("add", [Index(x), rhs]) => {
            let code = match rhs {
                Pair(0) => 0,
                Pair(1) => 1,
                Index(y) if y == x => 2,
                Pair(3) => 3,
                _ => return Err(EncodeError::UnsupportedOperands(mnemonic.to_owned())),
            };
            vec![x.prefix(), 0x09 | code << 4]
        }

        ("push", [Pair(p)]) if *p != 3 => vec![0xc5 | *p << 4],
        ("push", [Af]) => vec![0xf5],
        ("push", [Index(x)]) => vec![x.prefix(), 0xe5],
        ("pop", [Pair(p)]) if *p != 3 => vec![0xc1 | *p << 4],
        ("pop", [Af]) => vec![0xf1],
        ("pop", [Index(x)]) => vec![x.prefix(), 0xe1],

        ("jp", [Imm(target)]) => {
            let [lo, hi] = word(*target)?;
            vec![0xc3, lo, hi]
        }
        ("jp", [Reg(6)]) => vec![0xe9],
        ("jp", [Indexed(x, 0)]) => vec![x.prefix(), 0xe9],
        ("jr", [Imm(target)]) => vec![0x18, relative(here, *target)?],
        ("djnz", [Imm(target)]) => vec![0x10, relative(here, *target)?],

        ("db", values) if !values.is_empty() => values
            .iter()
            .map(|value| match value {
                Imm(n) => byte(*n),
                _ => Err(EncodeError::UnsupportedOperands("db".to_owned())),
            })
            .collect::<Result<_, _>>()?,

        (mnemonic, _) if MNEMONICS.contains(&mnemonic) || alu.is_some() => {
            return Err(EncodeError::UnsupportedOperands(mnemonic.to_owned()));
        }
        (mnemonic, _) => return Err(EncodeError::UnknownMnemonic(mnemonic.to_owned())),
    };
    Ok(bytes)
}

/// Code-builder handle passed to test case bodies.
///
/// Errors do not abort building; they are collected and reported together
/// once the body returns.
#[derive(Debug)]
pub struct Asm {
    origin: u16,
    bytes: Vec<u8>,
    diagnostics: Vec<Diagnostic>,
    instructions: usize,
}

impl Asm {
    pub fn new(origin: u16) -> Self {
        Self {
            origin,
            bytes: Vec::new(),
            diagnostics: Vec::new(),
            instructions: 0,
        }
    }

    /// Address the next instruction will be placed at.
    pub fn here(&self) -> u32 {
        u32::from(self.origin) + self.bytes.len() as u32
    }

    /// Assemble one source line. Text after `;` is ignored, and a line
    /// holding only a comment emits nothing.
    pub fn line(&mut self, source: &str) -> &mut Self {
        self.instructions += 1;
        match self.encode_line(source) {
            Ok(bytes) => self.bytes.extend(bytes),
            Err(err) => {
                let text = source.trim();
                self.diagnostics
                    .push(Diagnostic::at(self.instructions, format!("`{text}`: {err}")));
            }
        }
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.line("nop")
    }

    pub fn halt(&mut self) -> &mut Self {
        self.line("halt")
    }

    /// Emit raw bytes.
    pub fn db(&mut self, bytes: &[u8]) -> &mut Self {
        self.instructions += 1;
        self.bytes.extend_from_slice(bytes);
        self
    }

    fn encode_line(&self, source: &str) -> Result<Vec<u8>, EncodeError> {
        let code = source.split(';').next().unwrap_or_default();
        let code = code.trim().to_ascii_lowercase();
        if code.is_empty() {
            return Ok(Vec::new());
        }
        let (mnemonic, rest) = code
            .split_once(char::is_whitespace)
            .unwrap_or((code.as_str(), ""));
        let operands = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(parse_operand)
                .collect::<Result<Vec<_>, _>>()?
        };
        encode(mnemonic, &operands, self.here())
    }

    pub fn finish(self) -> Result<Program, Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(Program::new(self.origin, self.bytes))
        } else {
            Err(self.diagnostics)
        }
    }
}

/// [`Assembler`] issuing [`Asm`] handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z80Assembler;

impl Assembler for Z80Assembler {
    type Handle = Asm;

    fn assemble(
        &self,
        origin: u16,
        build: &dyn Fn(&mut Asm),
    ) -> Result<Program, Vec<Diagnostic>> {
        let mut asm = Asm::new(origin);
        build(&mut asm);
        asm.finish()
    }
}
