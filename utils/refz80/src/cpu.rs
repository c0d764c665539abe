use deltabench::{Backend, Engine, EngineError, MemoryImage, MemoryLayout, RegisterSet, Status};
use tracing::{trace, warn};

/// Status reported for an opcode outside the implemented subset.
pub const FAULT_ILLEGAL_OPCODE: u32 = 1;

/// Individual flag bits. `F` only exists when composed from these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub sign: bool,
    pub zero: bool,
    /// Undocumented bit 5, copied from results.
    pub y: bool,
    pub half: bool,
    /// Undocumented bit 3, copied from results.
    pub x: bool,
    pub parity: bool,
    pub subtract: bool,
    pub carry: bool,
}

impl Flags {
    pub fn compose(self) -> u8 {
        u8::from(self.sign) << 7
            | u8::from(self.zero) << 6
            | u8::from(self.y) << 5
            | u8::from(self.half) << 4
            | u8::from(self.x) << 3
            | u8::from(self.parity) << 2
            | u8::from(self.subtract) << 1
            | u8::from(self.carry)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            sign: bits & 0x80 != 0,
            zero: bits & 0x40 != 0,
            y: bits & 0x20 != 0,
            half: bits & 0x10 != 0,
            x: bits & 0x08 != 0,
            parity: bits & 0x04 != 0,
            subtract: bits & 0x02 != 0,
            carry: bits & 0x01 != 0,
        }
    }

    fn copy_xy(&mut self, value: u8) {
        self.y = value & 0x20 != 0;
        self.x = value & 0x08 != 0;
    }

    fn set_sz_xy(&mut self, result: u8) {
        self.sign = result & 0x80 != 0;
        self.zero = result == 0;
        self.copy_xy(result);
    }
}

fn even_parity(value: u8) -> bool {
    value.count_ones() % 2 == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Index {
    Ix,
    Iy,
}

impl Index {
    pub(crate) fn prefix(self) -> u8 {
        match self {
            Index::Ix => 0xdd,
            Index::Iy => 0xfd,
        }
    }
}

/// Reference Z80-subset interpreter.
///
/// Power-on state has every register cleared and the program counter at
/// the entry point. Writes into the layout's read-only region are dropped.
pub struct Cpu {
    pc: u16,
    sp: u16,
    ix: u16,
    iy: u16,
    i: u8,
    im: u8,
    iff1: bool,
    iff2: bool,
    a: u8,
    flags: Flags,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    alt_a: u8,
    alt_f: u8,
    alt_b: u8,
    alt_c: u8,
    alt_d: u8,
    alt_e: u8,
    alt_h: u8,
    alt_l: u8,
    memory: Box<[u8]>,
    layout: MemoryLayout,
    halted: bool,
    fault: Option<u32>,
}

impl Cpu {
    pub fn new(image: MemoryImage, layout: MemoryLayout, entry: u16) -> Self {
        Self {
            pc: entry,
            sp: 0,
            ix: 0,
            iy: 0,
            i: 0,
            im: 0,
            iff1: false,
            iff2: false,
            a: 0,
            flags: Flags::default(),
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            alt_a: 0,
            alt_f: 0,
            alt_b: 0,
            alt_c: 0,
            alt_d: 0,
            alt_e: 0,
            alt_h: 0,
            alt_l: 0,
            memory: image.into_boxed_slice(),
            layout,
            halted: false,
            fault: None,
        }
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    fn read(&self, addr: u16) -> u8 {
        self.memory[usize::from(addr)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if self.layout.read_only.contains(addr) {
            warn!(addr, value, pc = self.pc, "write to read-only memory dropped");
            return;
        }
        self.memory[usize::from(addr)] = value;
    }

    fn fetch(&mut self) -> u8 {
        let byte = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch();
        let hi = self.fetch();
        u16::from_le_bytes([lo, hi])
    }

    fn fetch_displacement(&mut self) -> i16 {
        i16::from(self.fetch() as i8)
    }

    fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    fn set_hl(&mut self, value: u16) {
        [self.h, self.l] = value.to_be_bytes();
    }

    /// 8-bit operand by its encoding: b c d e h l (hl) a.
    fn reg8(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => self.read(self.hl()),
            _ => self.a,
        }
    }

    fn set_reg8(&mut self, code: u8, value: u8) {
        match code & 7 {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => self.write(self.hl(), value),
            _ => self.a = value,
        }
    }

    /// 16-bit operand by its encoding: bc de hl sp.
    fn pair(&self, code: u8) -> u16 {
        match code & 3 {
            0 => u16::from_be_bytes([self.b, self.c]),
            1 => u16::from_be_bytes([self.d, self.e]),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn set_pair(&mut self, code: u8, value: u16) {
        match code & 3 {
            0 => [self.b, self.c] = value.to_be_bytes(),
            1 => [self.d, self.e] = value.to_be_bytes(),
            2 => self.set_hl(value),
            _ => self.sp = value,
        }
    }

    /// Stack operand by its encoding: bc de hl af.
    fn stack_pair(&self, code: u8) -> u16 {
        match code & 3 {
            3 => u16::from_be_bytes([self.a, self.flags.compose()]),
            code => self.pair(code),
        }
    }

    fn set_stack_pair(&mut self, code: u8, value: u16) {
        match code & 3 {
            3 => {
                let [a, f] = value.to_be_bytes();
                self.a = a;
                self.flags = Flags::from_bits(f);
            }
            code => self.set_pair(code, value),
        }
    }

    fn index(&self, index: Index) -> u16 {
        match index {
            Index::Ix => self.ix,
            Index::Iy => self.iy,
        }
    }

    fn set_index(&mut self, index: Index, value: u16) {
        match index {
            Index::Ix => self.ix = value,
            Index::Iy => self.iy = value,
        }
    }

    fn push(&mut self, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.sp = self.sp.wrapping_sub(1);
        self.write(self.sp, hi);
        self.sp = self.sp.wrapping_sub(1);
        self.write(self.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let lo = self.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    fn jump_relative(&mut self, displacement: i16) {
        self.pc = self.pc.wrapping_add_signed(displacement);
    }

    fn add8(&mut self, value: u8, carry: bool) -> u8 {
        let carry = u8::from(carry);
        let sum = u16::from(self.a) + u16::from(value) + u16::from(carry);
        let result = sum as u8;
        self.flags.set_sz_xy(result);
        self.flags.half = (self.a & 0x0f) + (value & 0x0f) + carry > 0x0f;
        self.flags.parity = (self.a ^ value) & 0x80 == 0 && (self.a ^ result) & 0x80 != 0;
        self.flags.subtract = false;
        self.flags.carry = sum > 0xff;
        result
    }

    fn sub8(&mut self, value: u8, carry: bool) -> u8 {
        let carry = u8::from(carry);
        let diff = i16::from(self.a) - i16::from(value) - i16::from(carry);
        let result = diff as u8;
        self.flags.set_sz_xy(result);
        self.flags.half = (self.a & 0x0f) < (value & 0x0f) + carry;
        self.flags.parity = (self.a ^ value) & 0x80 != 0 && (self.a ^ result) & 0x80 != 0;
        self.flags.subtract = true;
        self.flags.carry = diff < 0;
        result
    }

    fn logic(&mut self, result: u8, half: bool) {
        self.a = result;
        self.flags.set_sz_xy(result);
        self.flags.half = half;
        self.flags.parity = even_parity(result);
        self.flags.subtract = false;
        self.flags.carry = false;
    }

    /// `op` is bits 3..5 of the opcode: add adc sub sbc and xor or cp.
    fn alu(&mut self, op: u8, value: u8) {
        match op & 7 {
            0 => self.a = self.add8(value, false),
            1 => self.a = self.add8(value, self.flags.carry),
            2 => self.a = self.sub8(value, false),
            3 => self.a = self.sub8(value, self.flags.carry),
            4 => self.logic(self.a & value, true),
            5 => self.logic(self.a ^ value, false),
            6 => self.logic(self.a | value, false),
            _ => {
                self.sub8(value, false);
                self.flags.copy_xy(value);
            }
        }
    }

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.flags.set_sz_xy(result);
        self.flags.half = value & 0x0f == 0x0f;
        self.flags.parity = value == 0x7f;
        self.flags.subtract = false;
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.flags.set_sz_xy(result);
        self.flags.half = value & 0x0f == 0;
        self.flags.parity = value == 0x80;
        self.flags.subtract = true;
        result
    }

    fn add16(&mut self, lhs: u16, rhs: u16) -> u16 {
        let sum = u32::from(lhs) + u32::from(rhs);
        let result = sum as u16;
        self.flags.half = (lhs & 0x0fff) + (rhs & 0x0fff) > 0x0fff;
        self.flags.subtract = false;
        self.flags.carry = sum > 0xffff;
        self.flags.copy_xy((result >> 8) as u8);
        result
    }

    fn illegal(&mut self, opcode: u8) -> Status {
        warn!(opcode, pc = self.pc, "illegal opcode");
        self.fault = Some(FAULT_ILLEGAL_OPCODE);
        Status::Other(FAULT_ILLEGAL_OPCODE)
    }

    fn execute(&mut self, opcode: u8) -> Status {
        match opcode {
            0x00 => {}
            0x76 => {
                self.halted = true;
                return Status::Halted;
            }
            0x02 => self.write(self.pair(0), self.a),
            0x12 => self.write(self.pair(1), self.a),
            0x0a => self.a = self.read(self.pair(0)),
            0x1a => self.a = self.read(self.pair(1)),
            0x32 => {
                let addr = self.fetch_word();
                self.write(addr, self.a);
            }
            0x3a => {
                let addr = self.fetch_word();
                self.a = self.read(addr);
            }
            0x08 => {
                let f = self.flags.compose();
                std::mem::swap(&mut self.a, &mut self.alt_a);
                self.flags = Flags::from_bits(self.alt_f);
                self.alt_f = f;
            }
            0x10 => {
                let displacement = self.fetch_displacement();
                self.b = self.b.wrapping_sub(1);
                if self.b != 0 {
                    self.jump_relative(displacement);
                }
            }
            0x18 => {
                let displacement = self.fetch_displacement();
                self.jump_relative(displacement);
            }
            0x2f => {
                self.a = !self.a;
                self.flags.half = true;
                self.flags.subtract = true;
                self.flags.copy_xy(self.a);
            }
            0x37 => {
                self.flags.carry = true;
                self.flags.half = false;
                self.flags.subtract = false;
                self.flags.copy_xy(self.a);
            }
            0x3f => {
                self.flags.half = self.flags.carry;
                self.flags.carry = !self.flags.carry;
                self.flags.subtract = false;
                self.flags.copy_xy(self.a);
            }
            0xc3 => self.pc = self.fetch_word(),
            0xd9 => {
                std::mem::swap(&mut self.b, &mut self.alt_b);
                std::mem::swap(&mut self.c, &mut self.alt_c);
                std::mem::swap(&mut self.d, &mut self.alt_d);
                std::mem::swap(&mut self.e, &mut self.alt_e);
                std::mem::swap(&mut self.h, &mut self.alt_h);
                std::mem::swap(&mut self.l, &mut self.alt_l);
            }
            0xe9 => self.pc = self.hl(),
            0xeb => {
                std::mem::swap(&mut self.d, &mut self.h);
                std::mem::swap(&mut self.e, &mut self.l);
            }
            0xf3 => {
                self.iff1 = false;
                self.iff2 = false;
            }
            0xfb => {
                self.iff1 = true;
                self.iff2 = true;
            }
            0xf9 => self.sp = self.hl(),
            0xdd => return self.execute_indexed(Index::Ix),
            0xfd => return self.execute_indexed(Index::Iy),
            0xed => return self.execute_extended(),
            0x40..=0x7f => {
                let value = self.reg8(opcode);
                self.set_reg8(opcode >> 3, value);
            }
            0x80..=0xbf => {
                let value = self.reg8(opcode);
                self.alu(opcode >> 3, value);
            }
            op if op & 0xc7 == 0x06 => {
                let value = self.fetch();
                self.set_reg8(op >> 3, value);
            }
            op if op & 0xc7 == 0x04 => {
                let value = self.inc8(self.reg8(op >> 3));
                self.set_reg8(op >> 3, value);
            }
            op if op & 0xc7 == 0x05 => {
                let value = self.dec8(self.reg8(op >> 3));
                self.set_reg8(op >> 3, value);
            }
            op if op & 0xcf == 0x01 => {
                let value = self.fetch_word();
                self.set_pair(op >> 4, value);
            }
            op if op & 0xcf == 0x03 => self.set_pair(op >> 4, self.pair(op >> 4).wrapping_add(1)),
            op if op & 0xcf == 0x0b => self.set_pair(op >> 4, self.pair(op >> 4).wrapping_sub(1)),
            op if op & 0xcf == 0x09 => {
                let value = self.add16(self.hl(), self.pair(op >> 4));
                self.set_hl(value);
            }
            op if op & 0xc7 == 0xc6 => {
                let value = self.fetch();
                self.alu(op >> 3, value);
            }
            op if op & 0xcf == 0xc5 => self.push(self.stack_pair(op >> 4)),
            op if op & 0xcf == 0xc1 => {
                let value = self.pop();
                self.set_stack_pair(op >> 4, value);
            }
            op => return self.illegal(op),
        }
        Status::Running
    }

    fn execute_indexed(&mut self, index: Index) -> Status {
        let opcode = self.fetch();
        let base = self.index(index);
        match opcode {
            0x21 => {
                let value = self.fetch_word();
                self.set_index(index, value);
            }
            0x23 => self.set_index(index, base.wrapping_add(1)),
            0x2b => self.set_index(index, base.wrapping_sub(1)),
            op if op & 0xcf == 0x09 => {
                let rhs = match (op >> 4) & 3 {
                    2 => base,
                    code => self.pair(code),
                };
                let value = self.add16(base, rhs);
                self.set_index(index, value);
            }
            0x34 | 0x35 => {
                let addr = base.wrapping_add_signed(self.fetch_displacement());
                let value = self.read(addr);
                let value = if opcode == 0x34 {
                    self.inc8(value)
                } else {
                    self.dec8(value)
                };
                self.write(addr, value);
            }
            0x36 => {
                let addr = base.wrapping_add_signed(self.fetch_displacement());
                let value = self.fetch();
                self.write(addr, value);
            }
            // there is no ld (ix+d),(ix+d)
            0x76 => return self.illegal(opcode),
            op if op & 0xc7 == 0x46 => {
                let addr = base.wrapping_add_signed(self.fetch_displacement());
                let value = self.read(addr);
                self.set_reg8(op >> 3, value);
            }
            op if op & 0xf8 == 0x70 => {
                let addr = base.wrapping_add_signed(self.fetch_displacement());
                self.write(addr, self.reg8(op));
            }
            op if op & 0xc7 == 0x86 => {
                let addr = base.wrapping_add_signed(self.fetch_displacement());
                let value = self.read(addr);
                self.alu(op >> 3, value);
            }
            0xe1 => {
                let value = self.pop();
                self.set_index(index, value);
            }
            0xe5 => self.push(base),
            0xe9 => self.pc = base,
            0xf9 => self.sp = base,
            op => return self.illegal(op),
        }
        Status::Running
    }

    fn execute_extended(&mut self) -> Status {
        match self.fetch() {
            0x44 => {
                let value = self.a;
                self.a = 0;
                self.a = self.sub8(value, false);
            }
            0x46 => self.im = 0,
            0x56 => self.im = 1,
            0x5e => self.im = 2,
            0x47 => self.i = self.a,
            0x57 => {
                self.a = self.i;
                self.flags.set_sz_xy(self.a);
                self.flags.half = false;
                self.flags.subtract = false;
                self.flags.parity = self.iff2;
            }
            op => return self.illegal(op),
        }
        Status::Running
    }
}

impl Engine for Cpu {
    fn is_ready(&self) -> bool {
        self.memory.len() == deltabench::ADDRESS_SPACE
    }

    fn registers(&self) -> RegisterSet {
        RegisterSet {
            pc: self.pc,
            sp: self.sp,
            ix: self.ix,
            iy: self.iy,
            i: self.i,
            im: self.im,
            iff1: self.iff1,
            iff2: self.iff2,
            a: self.a,
            f: self.flags.compose(),
            b: self.b,
            c: self.c,
            d: self.d,
            e: self.e,
            h: self.h,
            l: self.l,
            alt_a: self.alt_a,
            alt_f: self.alt_f,
            alt_b: self.alt_b,
            alt_c: self.alt_c,
            alt_d: self.alt_d,
            alt_e: self.alt_e,
            alt_h: self.alt_h,
            alt_l: self.alt_l,
        }
    }

    fn compose_flags(&self) -> u8 {
        self.flags.compose()
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn step(&mut self) -> Status {
        if self.halted {
            return Status::Halted;
        }
        if let Some(code) = self.fault {
            return Status::Other(code);
        }
        let pc = self.pc;
        let opcode = self.fetch();
        let status = self.execute(opcode);
        trace!(pc, opcode, ?status, "step");
        status
    }
}

/// Backend handing out a fresh [`Cpu`] per test case.
#[derive(Debug, Clone, Copy, Default)]
pub struct Z80Backend;

impl Backend for Z80Backend {
    type Engine = Cpu;

    fn name(&self) -> &str {
        "refz80"
    }

    fn create(
        &self,
        image: MemoryImage,
        layout: &MemoryLayout,
        entry: u16,
    ) -> Result<Cpu, EngineError> {
        Ok(Cpu::new(image, *layout, entry))
    }
}
