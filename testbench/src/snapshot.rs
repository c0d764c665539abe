use tracing::debug;

use crate::engine::{Engine, EngineError};
use crate::memory::MemoryImage;
use crate::register_file::RegisterSet;

/// Point-in-time architectural state: every register and every memory byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub registers: RegisterSet,
    pub memory: MemoryImage,
}

impl Snapshot {
    /// Read the engine's complete state without disturbing it.
    pub fn capture<E: Engine + ?Sized>(engine: &E) -> Result<Self, EngineError> {
        if !engine.is_ready() {
            return Err(EngineError::NotReady);
        }

        let mut registers = engine.registers();
        registers.f = engine.compose_flags();
        let memory = MemoryImage::from_slice(engine.memory())?;
        debug!(pc = registers.pc, f = registers.f, "captured snapshot");

        Ok(Self { registers, memory })
    }
}
