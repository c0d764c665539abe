use std::fmt;

use tracing::{debug, info};

use crate::compare::compare_results;
use crate::config::HarnessConfig;
use crate::delta::{evaluate, ExpectedDelta};
use crate::driver::run_to_halt;
use crate::engine::{Assembler, Backend, Program};
use crate::error::HarnessError;
use crate::memory::MemoryImage;
use crate::snapshot::Snapshot;

type CodeBuilder<H> = Box<dyn Fn(&mut H)>;

/// One labelled program and the changes it is allowed to make.
pub struct TestCase<H> {
    label: String,
    code: CodeBuilder<H>,
    delta: ExpectedDelta,
}

impl<H> TestCase<H> {
    pub fn new(
        label: impl Into<String>,
        code: impl Fn(&mut H) + 'static,
        delta: ExpectedDelta,
    ) -> Self {
        Self {
            label: label.into(),
            code: Box::new(code),
            delta,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn delta(&self) -> &ExpectedDelta {
        &self.delta
    }
}

impl<H> fmt::Debug for TestCase<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("label", &self.label)
            .field("delta", &self.delta)
            .finish_non_exhaustive()
    }
}

/// Test cases in execution order.
pub struct TestBatch<H> {
    cases: Vec<TestCase<H>>,
}

impl<H> TestBatch<H> {
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    pub fn push(&mut self, case: TestCase<H>) {
        self.cases.push(case);
    }

    pub fn append(&mut self, other: TestBatch<H>) {
        self.cases.extend(other.cases);
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().map(TestCase::label)
    }
}

impl<H> fmt::Debug for TestBatch<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.cases).finish()
    }
}

impl<H> Default for TestBatch<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> FromIterator<TestCase<H>> for TestBatch<H> {
    fn from_iter<I: IntoIterator<Item = TestCase<H>>>(iter: I) -> Self {
        Self {
            cases: iter.into_iter().collect(),
        }
    }
}

impl<H> IntoIterator for TestBatch<H> {
    type Item = TestCase<H>;
    type IntoIter = std::vec::IntoIter<TestCase<H>>;

    fn into_iter(self) -> Self::IntoIter {
        self.cases.into_iter()
    }
}

/// The first failing case of a batch.
#[derive(Debug)]
pub struct Failure {
    /// 1-based position in the batch.
    pub index: usize,
    pub total: usize,
    pub label: String,
    pub error: HarnessError,
}

impl Failure {
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "test case {}/{} ({}) failed: {}",
            self.index, self.total, self.label, self.error
        )
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub cases: usize,
    /// Engine steps summed over every case.
    pub steps: u64,
}

/// Runs test batches against one backend.
pub struct Runner<A, B> {
    assembler: A,
    backend: B,
    config: HarnessConfig,
}

impl<A: Assembler, B: Backend> Runner<A, B> {
    pub fn new(assembler: A, backend: B, config: HarnessConfig) -> Self {
        Self {
            assembler,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every case in order, stopping at the first failure.
    pub fn run(&self, batch: TestBatch<A::Handle>) -> Result<Summary, Failure> {
        let total = batch.len();
        info!(backend = self.backend.name(), total, "running batch");

        let mut steps = 0;
        for (n, case) in batch.into_iter().enumerate() {
            let index = n + 1;
            println!("[{index}/{total}] {}", case.label);
            steps += self.run_case(&case).map_err(|error| Failure {
                index,
                total,
                label: case.label,
                error,
            })?;
        }

        println!("All {total} test cases passed");
        Ok(Summary {
            cases: total,
            steps,
        })
    }

    /// Run one case to completion and verify it. Returns the engine step count.
    pub fn run_case(&self, case: &TestCase<A::Handle>) -> Result<u64, HarnessError> {
        let program = self
            .assembler
            .assemble(self.config.origin, &*case.code)
            .map_err(HarnessError::Assembly)?;
        let image =
            MemoryImage::build(&program, self.config.halt_opcode).map_err(HarnessError::Assembly)?;
        let mut engine = self
            .backend
            .create(image, &self.config.layout, program.origin)?;

        let before = Snapshot::capture(&engine)?;
        let steps = run_to_halt(&mut engine, self.config.step_budget)?;
        let mut after = Snapshot::capture(&engine)?;
        debug!(label = case.label(), steps, bytes = program.bytes.len(), "case executed");

        let delta = self.resolve_delta(&case.delta, &program);
        evaluate(&before, &mut after, &delta)?;
        compare_results(&before, &after)?;
        Ok(steps)
    }

    fn resolve_delta(&self, declared: &ExpectedDelta, program: &Program) -> ExpectedDelta {
        let mut delta = declared.clone();
        if let Some(pc) = self.config.pc_policy.expected_pc(program) {
            delta.default_pc(pc);
        }
        delta
    }
}
