use thiserror::Error;

use crate::engine::{Diagnostic, EngineError};
use crate::register_file::Register;

/// Process exit statuses. Compatible harnesses must preserve these exactly.
pub mod exit {
    pub const SUCCESS: u8 = 0;
    pub const ABNORMAL_STATUS: u8 = 1;
    pub const UNEXPECTED_REGISTER: u8 = 2;
    pub const UNEXPECTED_MEMORY: u8 = 3;
    pub const REGISTER_MISMATCH: u8 = 4;
    pub const MEMORY_MISMATCH: u8 = 5;
    pub const ASSEMBLY: u8 = 6;
    pub const STEP_BUDGET: u8 = 7;
    pub const ENGINE: u8 = 8;
    /// Bad command line, configuration or batch file.
    pub const USAGE: u8 = 64;
}

/// A fatal inconsistency detected while running one test case.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("assembly failed with {} diagnostic(s):\n{}", .0.len(), render_diagnostics(.0))]
    Assembly(Vec<Diagnostic>),

    #[error(
        "engine stopped with status {status} at pc=0x{pc:04x} after {steps} step(s); only halt is accepted"
    )]
    AbnormalStatus { status: u32, pc: u16, steps: u64 },

    #[error("engine did not halt within the step budget of {budget} step(s)")]
    StepBudgetExceeded { budget: u64 },

    #[error(
        "unexpected change of register {register}: old={} new={}{}",
        show(.register, .old),
        show(.register, .new),
        more(.others, "register", "registers"),
    )]
    UnexpectedRegister {
        register: Register,
        old: u16,
        new: u16,
        others: usize,
    },

    #[error(
        "unexpected change of memory at 0x{address:04x}: old=0x{old:02x} new=0x{new:02x}{}",
        more(.others, "address", "addresses"),
    )]
    UnexpectedMemory {
        address: u16,
        old: u8,
        new: u8,
        others: usize,
    },

    #[error(
        "register {register} expectation failed: old={} new={} expected={}",
        show(.register, .old),
        show(.register, .new),
        show(.register, .expected),
    )]
    RegisterMismatch {
        register: Register,
        old: u16,
        new: u16,
        expected: u16,
    },

    #[error(
        "memory expectation failed at 0x{address:04x}: old=0x{old:02x} new=0x{new:02x} expected=0x{expected:02x}"
    )]
    MemoryMismatch {
        address: u16,
        old: u8,
        new: u8,
        expected: u8,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl HarnessError {
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::AbnormalStatus { .. } => exit::ABNORMAL_STATUS,
            HarnessError::UnexpectedRegister { .. } => exit::UNEXPECTED_REGISTER,
            HarnessError::UnexpectedMemory { .. } => exit::UNEXPECTED_MEMORY,
            HarnessError::RegisterMismatch { .. } => exit::REGISTER_MISMATCH,
            HarnessError::MemoryMismatch { .. } => exit::MEMORY_MISMATCH,
            HarnessError::Assembly(_) => exit::ASSEMBLY,
            HarnessError::StepBudgetExceeded { .. } => exit::STEP_BUDGET,
            HarnessError::Engine(_) => exit::ENGINE,
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| format!("  {diagnostic}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn show(register: &Register, value: &u16) -> String {
    register.format_value(*value)
}

fn more(others: &usize, one: &str, many: &str) -> String {
    match *others {
        0 => String::new(),
        1 => format!(" (1 more {one} also differs)"),
        n => format!(" ({n} more {many} also differ)"),
    }
}
