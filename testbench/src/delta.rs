use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::error::HarnessError;
use crate::register_file::{Register, UnknownRegister};
use crate::snapshot::Snapshot;

/// What an expectation is about: a register field or one memory byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeltaKey {
    Register(Register),
    Address(u16),
}

impl fmt::Display for DeltaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaKey::Register(reg) => write!(f, "{reg}"),
            DeltaKey::Address(addr) => write!(f, "0x{addr:04x}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    #[error(transparent)]
    UnknownRegister(#[from] UnknownRegister),
    #[error("value 0x{value:x} does not fit register {register} (max {})", max_of(.register))]
    RegisterValue { register: Register, value: u32 },
    #[error("address 0x{0:x} is outside the 64 KiB address space")]
    Address(u32),
    #[error("value 0x{value:x} at address 0x{address:04x} does not fit in a byte")]
    MemoryValue { address: u16, value: u32 },
    #[error("{0} is declared more than once")]
    Duplicate(DeltaKey),
}

fn max_of(register: &Register) -> String {
    register.format_value(register.max_value())
}

/// The changes a test case is allowed to make.
///
/// Keys are independent; evaluation order does not affect the outcome, only
/// which failure is reported first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedDelta {
    entries: BTreeMap<DeltaKey, u16>,
}

impl ExpectedDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_register(&mut self, register: Register, value: u16) -> Result<(), DeltaError> {
        if value > register.max_value() {
            return Err(DeltaError::RegisterValue {
                register,
                value: value.into(),
            });
        }
        self.insert(DeltaKey::Register(register), value)
    }

    /// Resolve `name` to a register and record the expectation.
    pub fn insert_named(&mut self, name: &str, value: u32) -> Result<(), DeltaError> {
        let register: Register = name.parse()?;
        let value = u16::try_from(value)
            .map_err(|_| DeltaError::RegisterValue { register, value })?;
        self.insert_register(register, value)
    }

    pub fn insert_byte(&mut self, address: u16, value: u8) -> Result<(), DeltaError> {
        self.insert(DeltaKey::Address(address), value.into())
    }

    fn insert(&mut self, key: DeltaKey, value: u16) -> Result<(), DeltaError> {
        match self.entries.entry(key) {
            Entry::Occupied(_) => Err(DeltaError::Duplicate(key)),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    /// Record a memory expectation from unchecked numbers.
    pub fn insert_address(&mut self, address: u32, value: u32) -> Result<(), DeltaError> {
        let address = u16::try_from(address).map_err(|_| DeltaError::Address(address))?;
        let value =
            u8::try_from(value).map_err(|_| DeltaError::MemoryValue { address, value })?;
        self.insert_byte(address, value)
    }

    pub fn with_register(mut self, register: Register, value: u16) -> Result<Self, DeltaError> {
        self.insert_register(register, value)?;
        Ok(self)
    }

    pub fn with_byte(mut self, address: u16, value: u8) -> Result<Self, DeltaError> {
        self.insert_byte(address, value)?;
        Ok(self)
    }

    /// Expect `pc == value` unless the case already constrains `pc`.
    pub fn default_pc(&mut self, value: u16) {
        self.entries
            .entry(DeltaKey::Register(Register::Pc))
            .or_insert(value);
    }

    pub fn get(&self, key: DeltaKey) -> Option<u16> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: DeltaKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeltaKey, u16)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, *value))
    }
}

/// Check every declared expectation against `new`, neutralizing matches.
///
/// On success every declared field and byte in `new` holds its value from
/// `old`, so a following residual comparison only sees undeclared changes.
pub fn evaluate(
    old: &Snapshot,
    new: &mut Snapshot,
    delta: &ExpectedDelta,
) -> Result<(), HarnessError> {
    for (key, expected) in delta.iter() {
        match key {
            DeltaKey::Address(address) => {
                let expected = expected as u8;
                let (before, after) = (old.memory.get(address), new.memory.get(address));
                if after != expected {
                    return Err(HarnessError::MemoryMismatch {
                        address,
                        old: before,
                        new: after,
                        expected,
                    });
                }
                new.memory.set(address, before);
            }
            DeltaKey::Register(register) => {
                let (before, after) = (old.registers.get(register), new.registers.get(register));
                if after != expected {
                    return Err(HarnessError::RegisterMismatch {
                        register,
                        old: before,
                        new: after,
                        expected,
                    });
                }
                new.registers.set(register, before);
            }
        }
        debug!(%key, expected, "expectation met");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use crate::register_file::RegisterSet;

    fn snapshot() -> Snapshot {
        Snapshot {
            registers: RegisterSet::new(),
            memory: MemoryImage::filled(0x76),
        }
    }

    #[test]
    fn matched_register_is_neutralized() {
        let old = snapshot();
        let mut new = old.clone();
        new.registers.h = 0x43;
        new.registers.l = 0x21;

        let delta = ExpectedDelta::new()
            .with_register(Register::H, 0x43)
            .and_then(|delta| delta.with_register(Register::L, 0x21))
            .unwrap();
        evaluate(&old, &mut new, &delta).unwrap();
        assert_eq!(new, old);
    }

    #[test]
    fn matched_address_is_neutralized() {
        let old = snapshot();
        let mut new = old.clone();
        new.memory.set(0x8001, 0x01);

        let delta = ExpectedDelta::new().with_byte(0x8001, 0x01).unwrap();
        evaluate(&old, &mut new, &delta).unwrap();
        assert_eq!(new.memory.get(0x8001), 0x76);
    }

    #[test]
    fn unchanged_but_declared_values_still_match() {
        let old = snapshot();
        let mut new = old.clone();
        let delta = ExpectedDelta::new()
            .with_byte(0x0000, 0x76)
            .and_then(|delta| delta.with_register(Register::A, 0))
            .unwrap();
        evaluate(&old, &mut new, &delta).unwrap();
        assert_eq!(new, old);
    }

    #[test]
    fn register_mismatch_reports_old_new_expected() {
        let old = snapshot();
        let mut new = old.clone();
        new.registers.b = 2;

        let delta = ExpectedDelta::new().with_register(Register::B, 3).unwrap();
        let err = evaluate(&old, &mut new, &delta).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::RegisterMismatch {
                register: Register::B,
                old: 0,
                new: 2,
                expected: 3
            }
        ));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn memory_mismatch_reports_address_old_new_expected() {
        let old = snapshot();
        let mut new = old.clone();
        new.memory.set(0x8000, 0x01);

        let delta = ExpectedDelta::new().with_byte(0x8000, 0x02).unwrap();
        let err = evaluate(&old, &mut new, &delta).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::MemoryMismatch {
                address: 0x8000,
                old: 0x76,
                new: 0x01,
                expected: 0x02
            }
        ));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn keys_are_typed_not_ranged() {
        let mut delta = ExpectedDelta::new();
        delta.insert_named("a", 1).unwrap();
        delta.insert_address(0x0000, 1).unwrap();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get(DeltaKey::Register(Register::A)), Some(1));
        assert_eq!(delta.get(DeltaKey::Address(0)), Some(1));
    }

    #[test]
    fn construction_validates_names_and_widths() {
        let mut delta = ExpectedDelta::new();
        assert!(matches!(
            delta.insert_named("q", 1),
            Err(DeltaError::UnknownRegister(_))
        ));
        assert!(matches!(
            delta.insert_named("a", 0x100),
            Err(DeltaError::RegisterValue { .. })
        ));
        assert!(matches!(
            delta.insert_named("im", 3),
            Err(DeltaError::RegisterValue { .. })
        ));
        assert!(matches!(
            delta.insert_address(0x1_0000, 0),
            Err(DeltaError::Address(0x1_0000))
        ));
        assert!(matches!(
            delta.insert_address(0x8000, 0x100),
            Err(DeltaError::MemoryValue { .. })
        ));
        assert!(delta.is_empty());
    }

    #[test]
    fn a_key_may_be_declared_only_once() {
        let mut delta = ExpectedDelta::new();
        delta.insert_named("h'", 1).unwrap();
        assert_eq!(
            delta.insert_named("h_", 2),
            Err(DeltaError::Duplicate(DeltaKey::Register(Register::AltH)))
        );
        delta.insert_named("h", 4).unwrap();
        assert!(matches!(
            delta.insert_named("H", 3),
            Err(DeltaError::Duplicate(_))
        ));

        delta.insert_address(0x8001, 1).unwrap();
        let err = delta.insert_address(0x8001, 2).unwrap_err();
        assert_eq!(err.to_string(), "0x8001 is declared more than once");

        assert_eq!(delta.get(DeltaKey::Register(Register::AltH)), Some(1));
        assert_eq!(delta.get(DeltaKey::Register(Register::H)), Some(4));
        assert_eq!(delta.get(DeltaKey::Address(0x8001)), Some(1));
    }

    #[test]
    fn default_pc_never_conflicts_with_a_declared_pc() {
        let mut delta = ExpectedDelta::new().with_register(Register::Pc, 7).unwrap();
        delta.default_pc(3);
        assert_eq!(delta.get(DeltaKey::Register(Register::Pc)), Some(7));
    }
}
