use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A named architectural register field.
///
/// Register pairs are not fields of their own: `hl` is observed as `h` and
/// `l`. The `Alt*` variants are the shadow bank swapped in by `exx` and
/// `ex af, af'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    Pc,
    Sp,
    Ix,
    Iy,
    I,
    Im,
    Iff1,
    Iff2,
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    AltA,
    AltF,
    AltB,
    AltC,
    AltD,
    AltE,
    AltH,
    AltL,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown register `{0}`")]
pub struct UnknownRegister(pub String);

impl Register {
    /// Every field of the register model, in comparison order.
    pub const ALL: [Register; 24] = [
        Register::Pc,
        Register::Sp,
        Register::Ix,
        Register::Iy,
        Register::I,
        Register::Im,
        Register::Iff1,
        Register::Iff2,
        Register::A,
        Register::F,
        Register::B,
        Register::C,
        Register::D,
        Register::E,
        Register::H,
        Register::L,
        Register::AltA,
        Register::AltF,
        Register::AltB,
        Register::AltC,
        Register::AltD,
        Register::AltE,
        Register::AltH,
        Register::AltL,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Register::Pc => "pc",
            Register::Sp => "sp",
            Register::Ix => "ix",
            Register::Iy => "iy",
            Register::I => "i",
            Register::Im => "im",
            Register::Iff1 => "iff1",
            Register::Iff2 => "iff2",
            Register::A => "a",
            Register::F => "f",
            Register::B => "b",
            Register::C => "c",
            Register::D => "d",
            Register::E => "e",
            Register::H => "h",
            Register::L => "l",
            Register::AltA => "a'",
            Register::AltF => "f'",
            Register::AltB => "b'",
            Register::AltC => "c'",
            Register::AltD => "d'",
            Register::AltE => "e'",
            Register::AltH => "h'",
            Register::AltL => "l'",
        }
    }

    /// Width of the field in bits. Values stored into the field wrap at this width.
    pub fn bits(self) -> u32 {
        match self {
            Register::Pc | Register::Sp | Register::Ix | Register::Iy => 16,
            Register::Iff1 | Register::Iff2 => 1,
            Register::Im => 2,
            _ => 8,
        }
    }

    /// Largest value a declared expectation may hold for this field.
    pub fn max_value(self) -> u16 {
        match self {
            // im 3 is not a mode
            Register::Im => 2,
            reg => ((1u32 << reg.bits()) - 1) as u16,
        }
    }

    pub fn mask(self) -> u16 {
        ((1u32 << self.bits()) - 1) as u16
    }

    /// Render a value of this field the way reports print it.
    pub fn format_value(self, value: u16) -> String {
        match self.bits() {
            16 => format!("0x{value:04x}"),
            8 => format!("0x{value:02x}"),
            _ => value.to_string(),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = UnknownRegister;

    /// Accepts the canonical names plus `a_`-style spellings for the shadow bank.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let canonical = match lowered.strip_suffix('_') {
            Some(base) => format!("{base}'"),
            None => lowered,
        };
        Register::ALL
            .into_iter()
            .find(|reg| reg.name() == canonical)
            .ok_or_else(|| UnknownRegister(s.to_owned()))
    }
}

/// Register file state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSet {
    pub pc: u16,
    pub sp: u16,
    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    pub im: u8,
    pub iff1: bool,
    pub iff2: bool,
    pub a: u8,
    /// Composite flags. Only meaningful once filled by a snapshot capture.
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub alt_a: u8,
    pub alt_f: u8,
    pub alt_b: u8,
    pub alt_c: u8,
    pub alt_d: u8,
    pub alt_e: u8,
    pub alt_h: u8,
    pub alt_l: u8,
}

impl RegisterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: Register) -> u16 {
        match reg {
            Register::Pc => self.pc,
            Register::Sp => self.sp,
            Register::Ix => self.ix,
            Register::Iy => self.iy,
            Register::I => self.i.into(),
            Register::Im => self.im.into(),
            Register::Iff1 => self.iff1.into(),
            Register::Iff2 => self.iff2.into(),
            Register::A => self.a.into(),
            Register::F => self.f.into(),
            Register::B => self.b.into(),
            Register::C => self.c.into(),
            Register::D => self.d.into(),
            Register::E => self.e.into(),
            Register::H => self.h.into(),
            Register::L => self.l.into(),
            Register::AltA => self.alt_a.into(),
            Register::AltF => self.alt_f.into(),
            Register::AltB => self.alt_b.into(),
            Register::AltC => self.alt_c.into(),
            Register::AltD => self.alt_d.into(),
            Register::AltE => self.alt_e.into(),
            Register::AltH => self.alt_h.into(),
            Register::AltL => self.alt_l.into(),
        }
    }

    /// Store `value` into `reg`, truncated to the field's width.
    pub fn set(&mut self, reg: Register, value: u16) {
        let value = value & reg.mask();
        let byte = value as u8;
        match reg {
            Register::Pc => self.pc = value,
            Register::Sp => self.sp = value,
            Register::Ix => self.ix = value,
            Register::Iy => self.iy = value,
            Register::I => self.i = byte,
            Register::Im => self.im = byte,
            Register::Iff1 => self.iff1 = value != 0,
            Register::Iff2 => self.iff2 = value != 0,
            Register::A => self.a = byte,
            Register::F => self.f = byte,
            Register::B => self.b = byte,
            Register::C => self.c = byte,
            Register::D => self.d = byte,
            Register::E => self.e = byte,
            Register::H => self.h = byte,
            Register::L => self.l = byte,
            Register::AltA => self.alt_a = byte,
            Register::AltF => self.alt_f = byte,
            Register::AltB => self.alt_b = byte,
            Register::AltC => self.alt_c = byte,
            Register::AltD => self.alt_d = byte,
            Register::AltE => self.alt_e = byte,
            Register::AltH => self.alt_h = byte,
            Register::AltL => self.alt_l = byte,
        }
    }

    /// Registers whose values differ between `self` and `other`, in model order.
    pub fn differences<'a>(
        &'a self,
        other: &'a RegisterSet,
    ) -> impl Iterator<Item = (Register, u16, u16)> + 'a {
        Register::ALL.into_iter().filter_map(move |reg| {
            let (old, new) = (self.get(reg), other.get(reg));
            (old != new).then_some((reg, old, new))
        })
    }
}
