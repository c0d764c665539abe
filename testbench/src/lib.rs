//! Delta-verified regression testing for instruction-set emulators.
//!
//! A test case assembles a short program, snapshots the machine, runs it to
//! a halt, snapshots again and checks that exactly the declared registers
//! and memory bytes changed.

mod compare;
mod config;
mod delta;
mod driver;
mod engine;
mod error;
mod literal;
mod memory;
mod register_file;
mod runner;
mod snapshot;

#[cfg(test)]
mod testing;

// Re-export public API
pub use compare::compare_results;
pub use config::{HarnessConfig, PcPolicy};
pub use delta::{DeltaError, DeltaKey, ExpectedDelta, evaluate};
pub use driver::{DEFAULT_STEP_BUDGET, run_to_halt};
pub use engine::{Assembler, Backend, Diagnostic, Engine, EngineError, Program, Status};
pub use error::{HarnessError, exit};
pub use literal::{Literal, parse_literal};
pub use memory::{ADDRESS_SPACE, HALT_OPCODE, MemoryImage, MemoryLayout, Region};
pub use register_file::{Register, RegisterSet, UnknownRegister};
pub use runner::{Failure, Runner, Summary, TestBatch, TestCase};
pub use snapshot::Snapshot;
