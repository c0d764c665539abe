use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::{Diagnostic, EngineError, Program};
use crate::literal;

/// Number of addressable bytes in the target's address space.
pub const ADDRESS_SPACE: usize = 0x1_0000;

/// Opcode every unused byte is filled with, so runaway control flow stops.
pub const HALT_OPCODE: u8 = 0x76;

/// A complete 64 KiB memory image.
#[derive(Clone, PartialEq, Eq)]
pub struct MemoryImage {
    bytes: Box<[u8]>,
}

impl MemoryImage {
    pub fn filled(value: u8) -> Self {
        Self {
            bytes: vec![value; ADDRESS_SPACE].into_boxed_slice(),
        }
    }

    /// Copy an engine's memory view. Anything but exactly 64 KiB is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() != ADDRESS_SPACE {
            return Err(EngineError::MemoryLength(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.into(),
        })
    }

    /// Build the pre-execution image: halt opcodes everywhere, then the
    /// program overlaid at its origin.
    pub fn build(program: &Program, halt_opcode: u8) -> Result<Self, Vec<Diagnostic>> {
        let start = usize::from(program.origin);
        let end = start + program.bytes.len();
        if end > ADDRESS_SPACE {
            return Err(vec![Diagnostic::new(format!(
                "program of {} bytes at origin 0x{:04x} does not fit in the address space",
                program.bytes.len(),
                program.origin
            ))]);
        }

        let mut image = Self::filled(halt_opcode);
        image.bytes[start..end].copy_from_slice(&program.bytes);
        Ok(image)
    }

    pub fn get(&self, addr: u16) -> u8 {
        self.bytes[usize::from(addr)]
    }

    pub fn set(&mut self, addr: u16, value: u8) {
        self.bytes[usize::from(addr)] = value;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_boxed_slice(self) -> Box<[u8]> {
        self.bytes
    }

    /// Addresses whose bytes differ, as `(address, self, other)`.
    pub fn differences<'a>(
        &'a self,
        other: &'a MemoryImage,
    ) -> impl Iterator<Item = (u16, u8, u8)> + 'a {
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(addr, (old, new))| (addr as u16, *old, *new))
    }
}

impl fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryImage")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Region {
    #[serde(deserialize_with = "literal::de_u32")]
    pub start: u32,
    #[serde(deserialize_with = "literal::de_u32")]
    pub end: u32,
}

impl Region {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, addr: u16) -> bool {
        let addr = u32::from(addr);
        self.start <= addr && addr < self.end
    }
}

/// Memory partition handed to the engine when it is constructed.
///
/// The harness does not enforce it; write protection is the engine's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MemoryLayout {
    pub read_only: Region,
    pub writable: Region,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self {
            read_only: Region::new(0x0000, 0x4000),
            writable: Region::new(0x4000, 0x8000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(origin: u16, bytes: &[u8]) -> Program {
        Program::new(origin, bytes.to_vec())
    }

    #[test]
    fn build_fills_with_halt_and_overlays_program() {
        let image = MemoryImage::build(&program(0, &[0x00, 0x3e, 0x01]), HALT_OPCODE).unwrap();
        assert_eq!(image.len(), ADDRESS_SPACE);
        assert_eq!(&image.as_slice()[..4], &[0x00, 0x3e, 0x01, HALT_OPCODE]);
        assert!(image.as_slice()[3..].iter().all(|&b| b == HALT_OPCODE));
    }

    #[test]
    fn build_honours_origin() {
        let image = MemoryImage::build(&program(0x100, &[0xaa]), 0x00).unwrap();
        assert_eq!(image.get(0x00ff), 0x00);
        assert_eq!(image.get(0x0100), 0xaa);
        assert_eq!(image.get(0x0101), 0x00);
    }

    #[test]
    fn build_rejects_programs_past_the_top_of_memory() {
        let diagnostics = MemoryImage::build(&program(0xffff, &[0, 0]), HALT_OPCODE).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("does not fit"));

        assert!(MemoryImage::build(&program(0xffff, &[0]), HALT_OPCODE).is_ok());
    }

    #[test]
    fn from_slice_requires_full_address_space() {
        assert!(matches!(
            MemoryImage::from_slice(&[0; 16]),
            Err(EngineError::MemoryLength(16))
        ));
        assert!(MemoryImage::from_slice(&[0; ADDRESS_SPACE]).is_ok());
    }

    #[test]
    fn differences_reports_changed_bytes() {
        let old = MemoryImage::filled(0);
        let mut new = old.clone();
        new.set(0x8001, 1);
        new.set(0xffff, 2);
        let diffs: Vec<_> = old.differences(&new).collect();
        assert_eq!(diffs, vec![(0x8001, 0, 1), (0xffff, 0, 2)]);
    }

    #[test]
    fn default_layout_matches_partition() {
        let layout = MemoryLayout::default();
        assert!(layout.read_only.contains(0x3fff));
        assert!(!layout.read_only.contains(0x4000));
        assert!(layout.writable.contains(0x4000));
        assert!(!layout.writable.contains(0x8000));
    }
}
