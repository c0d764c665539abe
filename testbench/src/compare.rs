use crate::error::HarnessError;
use crate::snapshot::Snapshot;

/// Closed-world check: after neutralization nothing may differ.
///
/// Registers are compared first, then every memory byte. The first surviving
/// difference is reported together with how many more of its kind exist.
pub fn compare_results(old: &Snapshot, new: &Snapshot) -> Result<(), HarnessError> {
    let mut registers = old.registers.differences(&new.registers);
    if let Some((register, old, new)) = registers.next() {
        return Err(HarnessError::UnexpectedRegister {
            register,
            old,
            new,
            others: registers.count(),
        });
    }

    let mut memory = old.memory.differences(&new.memory);
    if let Some((address, old, new)) = memory.next() {
        return Err(HarnessError::UnexpectedMemory {
            address,
            old,
            new,
            others: memory.count(),
        });
    }

    Ok(())
}
