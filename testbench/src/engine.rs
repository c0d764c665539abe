//! Capability traits for the collaborators the harness drives: the
//! execution engine under test and the assembler that produces its code.

use std::fmt;

use thiserror::Error;

use crate::memory::{MemoryImage, MemoryLayout};
use crate::register_file::RegisterSet;

/// What the engine reports after one call to [`Engine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
    /// Any other terminal condition, with an engine-defined code.
    Other(u32),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not ready to be inspected")]
    NotReady,
    #[error("engine exposes {0} bytes of memory, expected 65536")]
    MemoryLength(usize),
    #[error("failed to construct engine: {0}")]
    Setup(String),
}

/// A live execution engine instance.
pub trait Engine {
    fn is_ready(&self) -> bool;

    /// Current register values. The `f` field may be stale; captures always
    /// replace it with [`Engine::compose_flags`].
    fn registers(&self) -> RegisterSet;

    /// Compute the composite flags value from the engine's live flag state.
    fn compose_flags(&self) -> u8;

    /// The full address space as the engine currently sees it.
    fn memory(&self) -> &[u8];

    /// Execute starting at the current program counter.
    fn step(&mut self) -> Status;
}

/// Builds a fresh [`Engine`] for every test case.
pub trait Backend {
    type Engine: Engine;

    fn name(&self) -> &str;

    /// Power on an engine over `image` with the program counter at `entry`.
    fn create(
        &self,
        image: MemoryImage,
        layout: &MemoryLayout,
        entry: u16,
    ) -> Result<Self::Engine, EngineError>;
}

/// Assembled machine code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub origin: u16,
    pub bytes: Vec<u8>,
    /// First address past the last assembled byte.
    pub end: u32,
}

impl Program {
    pub fn new(origin: u16, bytes: Vec<u8>) -> Self {
        let end = u32::from(origin) + bytes.len() as u32;
        Self { origin, bytes, end }
    }
}

/// One assembler complaint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based index of the offending instruction, when there is one.
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }

    pub fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "instruction {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Turns a code-builder callback into machine code.
///
/// `Handle` is whatever the builder issues instructions against.
pub trait Assembler {
    type Handle;

    fn assemble(
        &self,
        origin: u16,
        build: &dyn Fn(&mut Self::Handle),
    ) -> Result<Program, Vec<Diagnostic>>;
}
