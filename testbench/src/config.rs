use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::driver::DEFAULT_STEP_BUDGET;
use crate::engine::Program;
use crate::literal;
use crate::memory::{HALT_OPCODE, MemoryLayout};

/// How the expected program counter is derived when a case does not declare one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PcPolicy {
    /// Code falls through into the halt that follows it; the engine leaves
    /// `pc` at `program end + offset`.
    FallThrough {
        #[serde(default = "default_offset")]
        offset: u16,
    },
    /// Never synthesize an expectation. An undeclared `pc` change is then
    /// reported as an unexpected register change.
    Explicit,
}

fn default_offset() -> u16 {
    1
}

impl Default for PcPolicy {
    fn default() -> Self {
        PcPolicy::FallThrough {
            offset: default_offset(),
        }
    }
}

impl PcPolicy {
    pub fn expected_pc(&self, program: &Program) -> Option<u16> {
        match self {
            PcPolicy::FallThrough { offset } => Some((program.end + u32::from(*offset)) as u16),
            PcPolicy::Explicit => None,
        }
    }
}

/// Harness settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HarnessConfig {
    /// Address code is assembled for and loaded at.
    #[serde(deserialize_with = "literal::de_u16")]
    pub origin: u16,
    /// Byte the whole address space is filled with before loading.
    #[serde(deserialize_with = "literal::de_u8")]
    pub halt_opcode: u8,
    /// Maximum engine steps per case; `null` disables the bound.
    pub step_budget: Option<u64>,
    pub pc_policy: PcPolicy,
    pub layout: MemoryLayout,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            origin: 0,
            halt_opcode: HALT_OPCODE,
            step_budget: Some(DEFAULT_STEP_BUDGET),
            pc_policy: PcPolicy::default(),
            layout: MemoryLayout::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_yaml(source: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(source).context("Failed to parse harness configuration")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&source).with_context(|| format!("Invalid config {}", path.display()))
    }
}
