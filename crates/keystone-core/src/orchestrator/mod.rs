//! Run driver: tokens, groups in catalog order, activation, wiring.
//!
//! Failures are contained at the group boundary. A group that fails part-way
//! keeps (and persists) what it produced, and the run moves on to the next
//! group; only later groups that reference it are affected.

mod tokens;
mod wiring;

use std::collections::BTreeSet;

use anyhow::Context;

use crate::artifact::ArtifactCache;
use crate::catalog::{Failure, InstanceRecord, InstanceType, Resolved, blueprint};
use crate::config::DeployConfig;
use crate::error::ProvisionError;
use crate::gateway::{NetworkGateway, TokenIndex};
use crate::group::{InstanceTypeGroup, Origin};
use crate::session::{DeployerAccount, Session};
use crate::spec::{DeploySpec, SpecEntry};
use crate::status::{GroupSummary, RunSummary, SequenceSummary, TokenReport};
use crate::store::RecordStore;
use crate::types::{Address, InstanceKind, TokenId};

pub use wiring::{WIRING_STEPS, WiringMode, WiringReport, WiringStatus, WiringStep};

pub struct Orchestrator<'a> {
    config: &'a DeployConfig,
    gateway: &'a dyn NetworkGateway,
    index: &'a dyn TokenIndex,
    spec: &'a DeploySpec,
    store: RecordStore,
    groups: Vec<InstanceTypeGroup>,
    tokens: Vec<TokenId>,
    token_report: TokenReport,
    account: DeployerAccount,
    artifacts: ArtifactCache,
    wiring: Vec<WiringReport>,
    wiring_save_failure: Option<String>,
}

impl<'a> Orchestrator<'a> {
    /// Build the groups from the catalog and read the deployer's sequence
    /// number from the network, once.
    ///
    /// Fails before any submission if the state directory cannot be written.
    pub fn connect(
        config: &'a DeployConfig,
        spec: &'a DeploySpec,
        gateway: &'a dyn NetworkGateway,
        index: &'a dyn TokenIndex,
        deployer: Address,
    ) -> anyhow::Result<Self> {
        let store = RecordStore::new(config.state_dir());
        store.ensure_writable()?;

        let account = DeployerAccount::connect(gateway, deployer)
            .context("Failed to read deployer sequence number")?;

        let groups = InstanceKind::CATALOG
            .into_iter()
            .map(|kind| {
                InstanceTypeGroup::new(
                    kind,
                    spec.entries(kind).to_vec(),
                    config.reuse_requested(kind),
                    config.artifact_locator(kind),
                )
            })
            .collect();

        Ok(Self {
            config,
            gateway,
            index,
            spec,
            store,
            groups,
            tokens: Vec::new(),
            token_report: TokenReport::default(),
            account,
            artifacts: ArtifactCache::new(config),
            wiring: Vec::new(),
            wiring_save_failure: None,
        })
    }

    pub fn groups(&self) -> &[InstanceTypeGroup] {
        &self.groups
    }

    pub fn group(&self, kind: InstanceKind) -> &InstanceTypeGroup {
        &self.groups[kind.position()]
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn account(&self) -> &DeployerAccount {
        &self.account
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Execute every phase in order and summarize.
    ///
    /// Every phase runs even if persisting an earlier one failed; those
    /// failures are carried in the summary.
    pub fn run(&mut self, filter: Option<&BTreeSet<InstanceKind>>) -> RunSummary {
        self.provision_tokens();
        self.provision_all(filter);
        self.save_all();
        self.activate_all();
        self.wire_globally();
        self.summary()
    }

    /// Provision every group in catalog order.
    ///
    /// Groups outside `filter` are left untouched on disk; their persisted
    /// records are loaded read-only so later groups can still reference them.
    pub fn provision_all(&mut self, filter: Option<&BTreeSet<InstanceKind>>) {
        for position in 0..self.groups.len() {
            // Resolution only ever sees groups earlier in catalog order.
            let (earlier, rest) = self.groups.split_at_mut(position);
            let group = &mut rest[0];
            let kind = group.kind;

            if filter.is_some_and(|f| !f.contains(&kind)) {
                match self.store.load_persisted(kind) {
                    Ok(persisted) => {
                        group.instances = persisted.records;
                        group.orphans = persisted.orphans;
                    }
                    Err(e) => tracing::warn!(kind = %kind, "Skipped group has unreadable records: {:#}", e),
                }
                group.origin = Origin::Skipped;
                tracing::info!(kind = %kind, persisted = group.instances.len(), "Skipping group (filtered out)");
                continue;
            }

            if group.reuse_requested && self.store.count_matches(kind, group.declared()) {
                match self.store.load_persisted(kind) {
                    Ok(persisted) => {
                        group.instances = persisted.records;
                        group.orphans = persisted.orphans;
                        group.origin = Origin::Reused;
                        if group.orphans.is_empty() {
                            tracing::info!(kind = %kind, instances = group.instances.len(), "Reusing persisted instances");
                        } else {
                            tracing::warn!(kind = %kind, orphans = group.orphans.len(), "Reused group still has orphaned instances");
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(kind = %kind, "Persisted records unusable, provisioning fresh: {:#}", e);
                    }
                }
            }

            let mut session = Session::new(
                self.gateway,
                &self.config.polling,
                self.config.network.partitions,
                &mut self.account,
                &self.tokens,
                &mut self.artifacts,
            );
            provision_group(group, earlier, &mut session);
        }
    }

    /// Run activation hooks for groups provisioned this run.
    ///
    /// Reused groups are included only with `force_activate`. Orphans are never
    /// activated. The first failure stops that group's activation only.
    pub fn activate_all(&mut self) {
        let force = self.config.reuse.force_activate;
        let mut session = Session::new(
            self.gateway,
            &self.config.polling,
            self.config.network.partitions,
            &mut self.account,
            &self.tokens,
            &mut self.artifacts,
        );

        for group in self.groups.iter_mut() {
            let eligible = match group.origin {
                Origin::Fresh => true,
                Origin::Reused => force,
                Origin::Pending | Origin::Skipped => false,
            };
            if !eligible || group.instances.is_empty() {
                continue;
            }

            let capability = blueprint(group.kind);
            tracing::info!(kind = %group.kind, instances = group.instances.len(), "Activating group");
            for (index, record) in group.instances.iter().enumerate() {
                if group.orphans.contains(&index) {
                    tracing::warn!(kind = %group.kind, index, address = %record.address(), "Not activating orphaned instance");
                    continue;
                }
                if let Err(e) = capability.activate(record, &mut session) {
                    tracing::error!(kind = %group.kind, index, error = %e, "Activation failed");
                    group.activation_failure = Some(e);
                    break;
                }
            }
        }
    }

    /// Persist every group provisioned (fully or partially) this run.
    ///
    /// Reused and skipped groups are not rewritten. Every group is attempted
    /// even if an earlier save fails; each failure stays on its group.
    pub fn save_all(&mut self) {
        for group in self.groups.iter_mut().filter(|g| g.origin == Origin::Fresh) {
            group.save_failure = self
                .store
                .save_persisted(group.kind, &group.instances, &group.orphans)
                .err()
                .map(|e| {
                    tracing::error!(kind = %group.kind, "Failed to save records: {:#}", e);
                    format!("{:#}", e)
                });
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            groups: self
                .groups
                .iter()
                .map(|g| GroupSummary {
                    kind: g.kind,
                    declared: g.declared(),
                    ready: g.ready(),
                    orphaned: g.orphans.len(),
                    origin: g.origin,
                    error: g.failure.as_ref().map(ToString::to_string),
                    activation_error: g.activation_failure.as_ref().map(ToString::to_string),
                    save_error: g.save_failure.clone(),
                })
                .collect(),
            tokens: self.token_report.clone(),
            wiring: self.wiring.clone(),
            wiring_save_error: self.wiring_save_failure.clone(),
            sequence: SequenceSummary {
                initial: self.account.initial(),
                current: self.account.current(),
                accepted: self.account.accepted(),
                rejected: self.account.rejected(),
            },
        }
    }
}

/// Fresh provisioning of one group: entries in order, stop at first failure.
fn provision_group(
    group: &mut InstanceTypeGroup,
    earlier: &[InstanceTypeGroup],
    session: &mut Session<'_>,
) {
    let kind = group.kind;
    let capability = blueprint(kind);
    group.origin = Origin::Fresh;
    group.instances.clear();
    group.orphans.clear();
    group.failure = None;

    tracing::info!(kind = %kind, declared = group.declared(), artifact = %group.artifact, "Provisioning group");

    for index in 0..group.declared() {
        match provision_entry(capability, &group.entries[index], earlier, session) {
            Ok(record) => {
                tracing::debug!(kind = %kind, index, address = %record.address(), "Instance ready");
                group.push_ready(record);
            }
            Err(Failure { error, orphan }) => {
                if let Some(record) = orphan {
                    tracing::warn!(kind = %kind, index, address = %record.address(), "Instance deployed but not fully initialized");
                    group.push_orphan(record);
                }
                tracing::error!(
                    kind = %kind,
                    index,
                    remaining = group.declared() - index - 1,
                    error = %error,
                    "Group aborted"
                );
                group.failure = Some(error);
                break;
            }
        }
    }

    if group.failure.is_none() {
        tracing::info!(kind = %kind, ready = group.ready(), "Group provisioned");
    }
}

/// Resolve an entry's references against earlier groups, then provision it.
fn provision_entry(
    capability: &dyn InstanceType,
    entry: &SpecEntry,
    earlier: &[InstanceTypeGroup],
    session: &mut Session<'_>,
) -> Result<InstanceRecord, Failure<InstanceRecord>> {
    let refs = capability
        .references(entry)
        .map_err(ProvisionError::InvalidEntry)?;

    let mut deps = Resolved::new();
    for reference in refs.instances {
        let group = earlier
            .iter()
            .find(|g| g.kind == reference.kind)
            .ok_or_else(|| ProvisionError::DependencyUnresolved {
                reference: reference.to_string(),
                reason: "group is not provisioned before this one".to_string(),
            })?;
        deps.insert(reference, group.resolve(reference.index)?.clone());
    }

    capability.provision(entry, &deps, session)
}
