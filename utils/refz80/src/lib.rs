//! Reference Z80-subset backend for `deltabench`: an interpreter, a small
//! assembler and the YAML batch loader used by the `deltabench` binary.

mod asm;
mod batch;
mod cpu;

pub use asm::{Asm, Z80Assembler};
pub use batch::{load_batch, parse_batch};
pub use cpu::{Cpu, FAULT_ILLEGAL_OPCODE, Flags, Z80Backend};

use deltabench::{HarnessConfig, Runner};

/// Runner wired to the reference assembler and interpreter.
pub fn reference_runner(config: HarnessConfig) -> Runner<Z80Assembler, Z80Backend> {
    Runner::new(Z80Assembler, Z80Backend, config)
}
