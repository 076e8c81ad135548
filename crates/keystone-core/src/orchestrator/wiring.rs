//! Cross-group wiring after provisioning.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::ProvisionError;
use crate::group::{InstanceTypeGroup, Origin};
use crate::session::Session;
use crate::types::{Address, InstanceKind};

use super::Orchestrator;

/// Which side of a step receives the calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiringMode {
    /// One call on the anchor per target instance, passing the target
    OnAnchor,
    /// One call on each target instance, passing the anchor
    OnTarget,
}

#[derive(Debug, Clone, Copy)]
pub struct WiringStep {
    pub name: &'static str,
    /// The step uses the first instance of this kind
    pub anchor: InstanceKind,
    pub targets: &'static [InstanceKind],
    pub endpoint: &'static str,
    pub mode: WiringMode,
}

pub const WIRING_STEPS: [WiringStep; 4] = [
    WiringStep {
        name: "pair-fee-destination",
        anchor: InstanceKind::FeesCollector,
        targets: &[InstanceKind::Pair],
        endpoint: "setFeeOn",
        mode: WiringMode::OnTarget,
    },
    WiringStep {
        name: "fees-collector-known-contracts",
        anchor: InstanceKind::FeesCollector,
        targets: &[InstanceKind::Pair],
        endpoint: "addKnownContracts",
        mode: WiringMode::OnAnchor,
    },
    WiringStep {
        name: "proxy-dex-whitelist",
        anchor: InstanceKind::ProxyDex,
        targets: &[InstanceKind::Pair, InstanceKind::Farm],
        endpoint: "addSCAddressToWhitelist",
        mode: WiringMode::OnTarget,
    },
    WiringStep {
        name: "locked-token-transfer-role",
        anchor: InstanceKind::SimpleLock,
        targets: &[InstanceKind::FeesCollector, InstanceKind::ProxyDex],
        endpoint: "setTransferRoleLockedToken",
        mode: WiringMode::OnAnchor,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WiringStatus {
    Applied { calls: usize },
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringReport {
    pub step: String,
    #[serde(flatten)]
    pub status: WiringStatus,
}

impl WiringStep {
    fn kinds(&self) -> impl Iterator<Item = InstanceKind> + '_ {
        std::iter::once(self.anchor).chain(self.targets.iter().copied())
    }

    /// `(contract, argument)` pairs to call, or why the step cannot run.
    fn plan(&self, groups: &[InstanceTypeGroup]) -> Result<Vec<(Address, Address)>, WiringStatus> {
        let group = |kind: InstanceKind| &groups[kind.position()];

        let anchor_group = group(self.anchor);
        if anchor_group.declared() == 0 {
            return Err(WiringStatus::Skipped {
                reason: format!("no {} declared", self.anchor),
            });
        }
        let anchor = anchor_group
            .resolve(0)
            .map_err(|e| WiringStatus::Failed { error: e.to_string() })?
            .address();

        let mut calls = Vec::new();
        for kind in self.targets {
            let target_group = group(*kind);
            for index in 0..target_group.declared() {
                let target = target_group
                    .resolve(index)
                    .map_err(|e| WiringStatus::Failed { error: e.to_string() })?
                    .address();
                calls.push(match self.mode {
                    WiringMode::OnAnchor => (anchor, target),
                    WiringMode::OnTarget => (target, anchor),
                });
            }
        }
        Ok(calls)
    }
}

impl Orchestrator<'_> {
    /// Run the fixed wiring steps in order.
    ///
    /// A step runs if a group it touches was provisioned this run, or if it
    /// failed on an earlier run and is still pending. A failed step is
    /// recorded, kept pending for the next run, and the remaining steps still
    /// run. A retried step re-issues all of its calls.
    pub fn wire_globally(&mut self) {
        let (pending, readable) = match self.store.load_wiring() {
            Ok(pending) => (pending, true),
            Err(e) => {
                tracing::warn!("Pending wiring list unusable, ignoring it: {:#}", e);
                (BTreeSet::new(), false)
            }
        };
        let mut still_pending = BTreeSet::new();
        let mut reports = Vec::with_capacity(WIRING_STEPS.len());
        let mut session = Session::new(
            self.gateway,
            &self.config.polling,
            self.config.network.partitions,
            &mut self.account,
            &self.tokens,
            &mut self.artifacts,
        );

        for step in &WIRING_STEPS {
            let touched = step.kinds().any(|kind| {
                let group = &self.groups[kind.position()];
                group.origin == Origin::Fresh && !group.instances.is_empty()
            });
            let retry = pending.contains(step.name);
            let status = if !touched && !retry {
                WiringStatus::Skipped {
                    reason: "no group provisioned this run".to_string(),
                }
            } else {
                match step.plan(&self.groups) {
                    Ok(calls) => match execute_step(step, &calls, &mut session) {
                        Ok(()) => WiringStatus::Applied { calls: calls.len() },
                        Err(e) => WiringStatus::Failed { error: e.to_string() },
                    },
                    Err(status) => status,
                }
            };

            match &status {
                WiringStatus::Applied { calls } => {
                    tracing::info!(step = step.name, calls, "Wiring step applied")
                }
                WiringStatus::Skipped { reason } => {
                    tracing::debug!(step = step.name, reason = %reason, "Wiring step skipped")
                }
                WiringStatus::Failed { error } => {
                    tracing::warn!(step = step.name, error = %error, "Wiring step failed");
                    still_pending.insert(step.name.to_string());
                }
            }
            if retry && matches!(status, WiringStatus::Applied { .. }) {
                tracing::info!(step = step.name, "Pending wiring step completed");
            }
            reports.push(WiringReport {
                step: step.name.to_string(),
                status,
            });
        }

        self.wiring = reports;
        self.wiring_save_failure = if readable && still_pending == pending {
            None
        } else {
            self.store.save_wiring(&still_pending).err().map(|e| {
                tracing::error!("Failed to save pending wiring steps: {:#}", e);
                format!("{:#}", e)
            })
        };
    }

    pub fn wiring_reports(&self) -> &[WiringReport] {
        &self.wiring
    }
}

fn execute_step(
    step: &WiringStep,
    calls: &[(Address, Address)],
    session: &mut Session<'_>,
) -> Result<(), ProvisionError> {
    for (contract, argument) in calls {
        session.call(*contract, step.endpoint, vec![argument.to_string()])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_only_reference_catalog_kinds_in_order() {
        for step in &WIRING_STEPS {
            assert!(!step.targets.is_empty(), "{}", step.name);
            assert!(!step.targets.contains(&step.anchor), "{}", step.name);
        }
        let names: Vec<_> = WIRING_STEPS.iter().map(|s| s.name).collect();
        assert_eq!(names[0], "pair-fee-destination");
        assert_eq!(names[3], "locked-token-transfer-role");
    }
}
