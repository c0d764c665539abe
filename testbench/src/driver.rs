use tracing::debug;

use crate::engine::{Engine, Status};
use crate::error::HarnessError;

/// Default upper bound on engine steps for one test case.
pub const DEFAULT_STEP_BUDGET: u64 = 1_000_000;

/// Step the engine until it reports a terminal status.
///
/// Returns the number of steps taken when the engine halts. At most `budget`
/// steps are taken, so `Some(0)` fails without stepping; `None` steps forever.
pub fn run_to_halt<E: Engine + ?Sized>(
    engine: &mut E,
    budget: Option<u64>,
) -> Result<u64, HarnessError> {
    let mut steps = 0u64;
    loop {
        if let Some(budget) = budget.filter(|&budget| steps >= budget) {
            return Err(HarnessError::StepBudgetExceeded { budget });
        }
        let status = engine.step();
        steps += 1;
        match status {
            Status::Running => {}
            Status::Halted => {
                debug!(steps, "engine halted");
                return Ok(steps);
            }
            Status::Other(status) => {
                return Err(HarnessError::AbnormalStatus {
                    status,
                    pc: engine.registers().pc,
                    steps,
                });
            }
        }
    }
}
