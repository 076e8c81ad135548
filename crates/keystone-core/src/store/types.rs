//! On-disk record file formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{InstanceKind, TokenId};

pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Persisted instances of one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFile {
    /// Record file format version
    pub version: u32,

    pub label: InstanceKind,

    /// Timestamp of the run that wrote the file
    pub generated_at: chrono::DateTime<chrono::Utc>,

    /// One serialized instance per ready (or orphaned) spec entry, in order
    pub records: Vec<Value>,

    /// Positions of records whose initialization did not complete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphans: Vec<usize>,
}

impl RecordFile {
    pub fn new(label: InstanceKind, records: Vec<Value>, orphans: Vec<usize>) -> Self {
        Self {
            version: RECORD_FORMAT_VERSION,
            label,
            generated_at: chrono::Utc::now(),
            records,
            orphans,
        }
    }

    pub fn validate(&self, expected: InstanceKind) -> anyhow::Result<()> {
        if self.version != RECORD_FORMAT_VERSION {
            anyhow::bail!("Unsupported record file version: {}", self.version);
        }
        if self.label != expected {
            anyhow::bail!(
                "Record file holds '{}' records, expected '{}'",
                self.label,
                expected
            );
        }
        if let Some(index) = self.orphans.iter().find(|i| **i >= self.records.len()) {
            anyhow::bail!(
                "Orphan marker {} out of range ({} records)",
                index,
                self.records.len()
            );
        }
        Ok(())
    }
}

/// Persisted output of the token phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFile {
    pub version: u32,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub tokens: Vec<TokenId>,
}

impl TokenFile {
    pub fn new(tokens: Vec<TokenId>) -> Self {
        Self {
            version: RECORD_FORMAT_VERSION,
            generated_at: chrono::Utc::now(),
            tokens,
        }
    }
}

/// Wiring steps that still have to be applied, by step name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WiringFile {
    pub version: u32,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub pending: Vec<String>,
}

impl WiringFile {
    pub fn new(pending: Vec<String>) -> Self {
        Self {
            version: RECORD_FORMAT_VERSION,
            generated_at: chrono::Utc::now(),
            pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_file_validate() {
        let file = RecordFile::new(InstanceKind::Pair, vec![], vec![]);
        assert!(file.validate(InstanceKind::Pair).is_ok());
        assert!(file.validate(InstanceKind::Farm).is_err());

        let mut file = file;
        file.version = 999;
        assert!(file.validate(InstanceKind::Pair).is_err());
    }

    #[test]
    fn test_orphan_marker_out_of_range() {
        let file = RecordFile::new(InstanceKind::Pair, vec![serde_json::json!({})], vec![1]);
        assert!(file.validate(InstanceKind::Pair).is_err());
    }
}
