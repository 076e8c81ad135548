//! Per-kind provisioning state for one run.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::catalog::InstanceRecord;
use crate::error::ProvisionError;
use crate::spec::SpecEntry;
use crate::types::{DependencyRef, InstanceKind};

/// How a group's instances were obtained this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Not processed yet
    Pending,
    /// Outside the run's filter; persisted records loaded read-only
    Skipped,
    /// Satisfied from persisted records
    Reused,
    /// Provisioned this run (possibly partially)
    Fresh,
}

#[derive(Debug, Clone)]
pub struct InstanceTypeGroup {
    pub kind: InstanceKind,
    pub entries: Vec<SpecEntry>,
    pub instances: Vec<InstanceRecord>,
    /// Positions in `instances` that were deployed but not fully initialized
    pub orphans: BTreeSet<usize>,
    pub reuse_requested: bool,
    pub artifact: String,
    pub origin: Origin,
    pub failure: Option<ProvisionError>,
    pub activation_failure: Option<ProvisionError>,
    /// Writing this run's records failed
    pub save_failure: Option<String>,
}

impl InstanceTypeGroup {
    pub fn new(kind: InstanceKind, entries: Vec<SpecEntry>, reuse_requested: bool, artifact: String) -> Self {
        Self {
            kind,
            entries,
            instances: Vec::new(),
            orphans: BTreeSet::new(),
            reuse_requested,
            artifact,
            origin: Origin::Pending,
            failure: None,
            activation_failure: None,
            save_failure: None,
        }
    }

    pub fn declared(&self) -> usize {
        self.entries.len()
    }

    /// Instances that completed every initialization call.
    pub fn ready(&self) -> usize {
        self.instances.len() - self.orphans.len()
    }

    pub fn is_satisfied(&self) -> bool {
        self.instances.len() == self.entries.len()
            && self.orphans.is_empty()
            && self.instances.iter().all(|i| !i.address().is_empty())
    }

    pub fn is_processed(&self) -> bool {
        self.origin != Origin::Pending
    }

    /// Record at `index`, only if the whole group is satisfied.
    pub fn resolve(&self, index: usize) -> Result<&InstanceRecord, ProvisionError> {
        let reference = DependencyRef::new(self.kind, index).to_string();
        if !self.is_processed() {
            return Err(ProvisionError::DependencyUnresolved {
                reference,
                reason: "group not processed yet".to_string(),
            });
        }
        if !self.is_satisfied() {
            return Err(ProvisionError::DependencyUnresolved {
                reference,
                reason: format!(
                    "group not satisfied ({} of {} ready)",
                    self.ready(),
                    self.declared()
                ),
            });
        }
        self.instances
            .get(index)
            .ok_or_else(|| ProvisionError::DependencyUnresolved {
                reference,
                reason: format!("only {} instance(s) declared", self.declared()),
            })
    }

    pub fn push_ready(&mut self, record: InstanceRecord) {
        self.instances.push(record);
    }

    pub fn push_orphan(&mut self, record: InstanceRecord) {
        self.orphans.insert(self.instances.len());
        self.instances.push(record);
    }
}
