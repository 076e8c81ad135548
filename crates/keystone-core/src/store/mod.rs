//! Persisted instance records, one JSON file per instance-type label.

pub mod types;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::catalog::{InstanceRecord, blueprint};
use crate::error::SpecMismatchError;
use crate::types::{InstanceKind, TokenId};

pub use types::{RECORD_FORMAT_VERSION, RecordFile, TokenFile, WiringFile};

const TOKENS_FILE: &str = "tokens.json";
const WIRING_FILE: &str = "wiring.json";

/// Decoded contents of a group's record file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Persisted {
    pub records: Vec<InstanceRecord>,
    pub orphans: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the state directory and check a file can be written into it.
    pub fn ensure_writable(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create state directory: {}", self.dir.display())
        })?;
        let check = self
            .dir
            .join(format!(".write-check.{}", std::process::id()));
        fs::write(&check, b"").with_context(|| {
            format!("State directory is not writable: {}", self.dir.display())
        })?;
        fs::remove_file(&check)
            .with_context(|| format!("Failed to remove {}", check.display()))?;
        Ok(())
    }

    pub fn record_path(&self, kind: InstanceKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.label()))
    }

    /// Load a group's records; no file means no records.
    pub fn load(&self, kind: InstanceKind) -> anyhow::Result<Vec<InstanceRecord>> {
        Ok(self.load_persisted(kind)?.records)
    }

    /// Load a group's records together with its orphan markers.
    pub fn load_persisted(&self, kind: InstanceKind) -> anyhow::Result<Persisted> {
        let Some(file) = self.read_file(kind)? else {
            return Ok(Persisted::default());
        };
        let capability = blueprint(kind);
        let records = file
            .records
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                capability
                    .from_record(value)
                    .with_context(|| format!("Failed to decode {}[{}]", kind, i))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Persisted {
            records,
            orphans: file.orphans.into_iter().collect(),
        })
    }

    /// Overwrite a group's record file.
    pub fn save(&self, kind: InstanceKind, records: &[InstanceRecord]) -> anyhow::Result<()> {
        self.save_persisted(kind, records, &BTreeSet::new())
    }

    pub fn save_persisted(
        &self,
        kind: InstanceKind,
        records: &[InstanceRecord],
        orphans: &BTreeSet<usize>,
    ) -> anyhow::Result<()> {
        let capability = blueprint(kind);
        let values = records
            .iter()
            .map(|record| capability.to_record(record))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let file = RecordFile::new(kind, values, orphans.iter().copied().collect());
        self.write_atomic(&self.record_path(kind), &file)?;
        tracing::debug!(kind = %kind, records = records.len(), orphans = orphans.len(), "Saved records");
        Ok(())
    }

    /// Number of records in a group's file, without decoding them.
    pub fn persisted_count(&self, kind: InstanceKind) -> anyhow::Result<usize> {
        Ok(self.read_file(kind)?.map_or(0, |file| file.records.len()))
    }

    pub fn check_count(&self, kind: InstanceKind, declared: usize) -> anyhow::Result<()> {
        let persisted = self.persisted_count(kind)?;
        if persisted != declared {
            return Err(SpecMismatchError {
                kind,
                persisted,
                declared,
            }
            .into());
        }
        Ok(())
    }

    /// Strict equality of persisted and declared counts. Mismatches and
    /// unreadable files are logged and reported as `false`.
    pub fn count_matches(&self, kind: InstanceKind, declared: usize) -> bool {
        match self.check_count(kind, declared) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind = %kind, "{:#}", e);
                false
            }
        }
    }

    pub fn load_tokens(&self) -> anyhow::Result<Vec<TokenId>> {
        let path = self.dir.join(TOKENS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file: TokenFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if file.version != RECORD_FORMAT_VERSION {
            anyhow::bail!("Unsupported token file version: {}", file.version);
        }
        Ok(file.tokens)
    }

    pub fn save_tokens(&self, tokens: &[TokenId]) -> anyhow::Result<()> {
        let file = TokenFile::new(tokens.to_vec());
        self.write_atomic(&self.dir.join(TOKENS_FILE), &file)
    }

    /// Names of wiring steps left unapplied by earlier runs.
    pub fn load_wiring(&self) -> anyhow::Result<BTreeSet<String>> {
        let path = self.dir.join(WIRING_FILE);
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file: WiringFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if file.version != RECORD_FORMAT_VERSION {
            anyhow::bail!("Unsupported wiring file version: {}", file.version);
        }
        Ok(file.pending.into_iter().collect())
    }

    pub fn save_wiring(&self, pending: &BTreeSet<String>) -> anyhow::Result<()> {
        let file = WiringFile::new(pending.iter().cloned().collect());
        self.write_atomic(&self.dir.join(WIRING_FILE), &file)
    }

    fn read_file(&self, kind: InstanceKind) -> anyhow::Result<Option<RecordFile>> {
        let path = self.record_path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read record file: {}", path.display()))?;
        let file: RecordFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse record file: {}", path.display()))?;
        file.validate(kind)?;
        Ok(Some(file))
    }

    /// Write via a temp file and rename.
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create state directory: {}", self.dir.display())
        })?;

        let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize records")?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid record path: {}", path.display()))?;
        let tmp_path = self
            .dir
            .join(format!("{}.tmp.{}", file_name, std::process::id()));

        fs::write(&tmp_path, bytes)
            .with_context(|| format!("Failed to write tmp file: {}", tmp_path.display()))?;
        let replaced = replace_file(&tmp_path, path);
        if replaced.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        replaced
    }
}

fn replace_file(tmp_path: &Path, path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing file: {}", path.display()))?;
    }
    fs::rename(tmp_path, path)
        .with_context(|| format!("Failed to rename tmp file: {}", tmp_path.display()))
}
