//! A toy machine for exercising the harness without a real backend.
//!
//! Opcodes: `00` nop, `76` halt, `3e n` ld a,n, `06 n` ld b,n,
//! `32 lo hi` ld (nn),a, `18 d` jr d, `f3` di, `fb` ei.

use crate::engine::{Assembler, Backend, Diagnostic, Engine, EngineError, Program, Status};
use crate::memory::{MemoryImage, MemoryLayout};
use crate::register_file::RegisterSet;

pub(crate) const FAULT_UNKNOWN_OPCODE: u32 = 0xbad;

pub(crate) struct ToyEngine {
    pub regs: RegisterSet,
    pub zero: bool,
    pub stale_f: u8,
    pub memory: Vec<u8>,
    pub ready: bool,
    pub steps: u64,
}

impl ToyEngine {
    pub fn new(memory: Vec<u8>) -> Self {
        Self {
            regs: RegisterSet::new(),
            zero: false,
            stale_f: 0,
            memory,
            ready: true,
            steps: 0,
        }
    }

    pub fn with_program(code: &[u8]) -> Self {
        let image = MemoryImage::build(&Program::new(0, code.to_vec()), 0x76)
            .unwrap_or_else(|_| MemoryImage::filled(0x76));
        Self::new(image.into_boxed_slice().into_vec())
    }

    fn fetch(&mut self) -> u8 {
        let byte = self.memory[usize::from(self.regs.pc)];
        self.regs.pc = self.regs.pc.wrapping_add(1);
        byte
    }
}

impl Engine for ToyEngine {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn registers(&self) -> RegisterSet {
        RegisterSet {
            f: self.stale_f,
            ..self.regs.clone()
        }
    }

    fn compose_flags(&self) -> u8 {
        if self.zero { 0x40 } else { 0x00 }
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn step(&mut self) -> Status {
        self.steps += 1;
        match self.fetch() {
            0x00 => {}
            0x76 => return Status::Halted,
            0x3e => {
                self.regs.a = self.fetch();
                self.zero = self.regs.a == 0;
            }
            0x06 => self.regs.b = self.fetch(),
            0x32 => {
                let lo = self.fetch();
                let hi = self.fetch();
                let addr = u16::from_le_bytes([lo, hi]);
                self.memory[usize::from(addr)] = self.regs.a;
            }
            0x18 => {
                let disp = self.fetch() as i8;
                self.regs.pc = self.regs.pc.wrapping_add_signed(disp.into());
            }
            0xf3 => self.regs.iff1 = false,
            0xfb => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
            }
            _ => return Status::Other(FAULT_UNKNOWN_OPCODE),
        }
        Status::Running
    }
}

#[derive(Default)]
pub(crate) struct ToyBackend {
    pub unready: bool,
}

impl Backend for ToyBackend {
    type Engine = ToyEngine;

    fn name(&self) -> &str {
        "toy"
    }

    fn create(
        &self,
        image: MemoryImage,
        _layout: &MemoryLayout,
        entry: u16,
    ) -> Result<ToyEngine, EngineError> {
        let mut engine = ToyEngine::new(image.into_boxed_slice().into_vec());
        engine.regs.pc = entry;
        engine.ready = !self.unready;
        Ok(engine)
    }
}

#[derive(Default)]
pub(crate) struct ToyAsm {
    bytes: Vec<u8>,
    errors: Vec<String>,
}

impl ToyAsm {
    pub fn emit(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }
}

pub(crate) struct ToyAssembler;

impl Assembler for ToyAssembler {
    type Handle = ToyAsm;

    fn assemble(
        &self,
        origin: u16,
        build: &dyn Fn(&mut ToyAsm),
    ) -> Result<Program, Vec<Diagnostic>> {
        let mut asm = ToyAsm::default();
        build(&mut asm);
        if asm.errors.is_empty() {
            Ok(Program::new(origin, asm.bytes))
        } else {
            Err(asm.errors.into_iter().map(Diagnostic::new).collect())
        }
    }
}
