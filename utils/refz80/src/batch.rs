//! YAML batch files.
//!
//! ```yaml
//! cases:
//!   - label: load pair
//!     code: ["ld hl,0x4321"]
//!     registers: { h: 0x43, l: 0x21 }
//!   - label: store indirect
//!     code: ["ld ix,0x8000", "ld a,1", "ld (ix+1),a"]
//!     registers: { ix: 0x8000, a: 1 }
//!     memory: { 0x8001: 1 }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use anyhow::{Context, Result};
use deltabench::{ExpectedDelta, Literal, TestBatch, TestCase};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::asm::Asm;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchFile {
    cases: Vec<CaseFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseFile {
    label: String,
    #[serde(default)]
    code: Vec<String>,
    #[serde(default, deserialize_with = "entries")]
    registers: Vec<(String, Literal)>,
    #[serde(default, deserialize_with = "entries")]
    memory: Vec<(Literal, Literal)>,
}

/// Mapping entries in document order. `0x8001` and `"$8001"` are distinct
/// YAML keys, so aliases survive until the delta rejects them.
fn entries<'de, D, K, V>(deserializer: D) -> Result<Vec<(K, V)>, D::Error>
where
    D: Deserializer<'de>,
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    struct Entries<K, V>(PhantomData<(K, V)>);

    impl<'de, K: Deserialize<'de>, V: Deserialize<'de>> Visitor<'de> for Entries<K, V> {
        type Value = Vec<(K, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::new();
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Entries(PhantomData))
}

impl CaseFile {
    fn into_case(self) -> Result<TestCase<Asm>> {
        let mut delta = ExpectedDelta::new();
        for (name, value) in &self.registers {
            delta
                .insert_named(name, value.0)
                .with_context(|| format!("case `{}`", self.label))?;
        }
        for (address, value) in &self.memory {
            delta
                .insert_address(address.0, value.0)
                .with_context(|| format!("case `{}`", self.label))?;
        }

        let code = self.code;
        let body = move |asm: &mut Asm| {
            for line in &code {
                asm.line(line);
            }
        };
        Ok(TestCase::new(self.label, body, delta))
    }
}

pub fn parse_batch(source: &str) -> Result<TestBatch<Asm>> {
    let file: BatchFile = serde_yaml::from_str(source).context("Failed to parse batch file")?;
    file.cases.into_iter().map(CaseFile::into_case).collect()
}

pub fn load_batch<P: AsRef<Path>>(path: P) -> Result<TestBatch<Asm>> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch {}", path.display()))?;
    parse_batch(&source).with_context(|| format!("Invalid batch {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltabench::{DeltaKey, Register};

    #[test]
    fn parses_cases_in_order() {
        let batch = parse_batch(
            r#"
cases:
  - label: no-op
    code: [nop]
  - label: store indirect
    code: ["ld ix,0x8000", "ld a,1", "ld (ix+1),a"]
    registers: { ix: 0x8000, a: 1, "a'": 0 }
    memory: { 0x8001: 1, "$8002": "0x02" }
"#,
        )
        .unwrap();
        assert_eq!(batch.labels().collect::<Vec<_>>(), vec!["no-op", "store indirect"]);

        let cases: Vec<_> = batch.into_iter().collect();
        assert!(cases[0].delta().is_empty());
        let delta = cases[1].delta();
        assert_eq!(delta.get(DeltaKey::Register(Register::Ix)), Some(0x8000));
        assert_eq!(delta.get(DeltaKey::Register(Register::AltA)), Some(0));
        assert_eq!(delta.get(DeltaKey::Address(0x8001)), Some(1));
        assert_eq!(delta.get(DeltaKey::Address(0x8002)), Some(2));
    }

    #[test]
    fn reports_the_offending_case() {
        let err = parse_batch("cases: [{ label: bad, registers: { q: 1 } }]").unwrap_err();
        assert_eq!(err.to_string(), "case `bad`");
        assert!(format!("{err:#}").contains("unknown register `q`"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_batch("cases: [{ label: wide, registers: { a: 0x100 } }]").is_err());
        assert!(parse_batch("cases: [{ label: far, memory: { 0x10000: 0 } }]").is_err());
        assert!(parse_batch("cases: [{ label: typo, regs: {} }]").is_err());
    }

    #[test]
    fn rejects_expectations_declared_twice() {
        let err = parse_batch(r#"cases: [{ label: twice, registers: { "h'": 1, "h_": 2 } }]"#)
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "case `twice`: h' is declared more than once");

        let err = parse_batch(r#"cases: [{ label: aliased, memory: { 0x8001: 1, "$8001": 2 } }]"#)
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "case `aliased`: 0x8001 is declared more than once");
    }
}
