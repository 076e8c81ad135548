//! Run summaries and persisted-state status.

use serde::Serialize;

use crate::group::Origin;
use crate::orchestrator::{WiringReport, WiringStatus};
use crate::spec::DeploySpec;
use crate::store::RecordStore;
use crate::types::InstanceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenOrigin {
    #[default]
    Reused,
    Fresh,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenReport {
    pub declared: usize,
    pub available: usize,
    pub minted: usize,
    pub origin: TokenOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The token list could not be persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub kind: InstanceKind,
    pub declared: usize,
    pub ready: usize,
    pub orphaned: usize,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_error: Option<String>,
    /// Records produced this run that could not be written to disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

impl GroupSummary {
    /// Declared instances that did not reach the ready state.
    pub fn shortfall(&self) -> usize {
        self.declared.saturating_sub(self.ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceSummary {
    pub initial: u64,
    pub current: u64,
    pub accepted: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub groups: Vec<GroupSummary>,
    pub tokens: TokenReport,
    pub wiring: Vec<WiringReport>,
    /// Failed wiring steps could not be recorded for the next run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wiring_save_error: Option<String>,
    pub sequence: SequenceSummary,
}

impl RunSummary {
    /// Every processed group reached its declared count, activated and was
    /// persisted.
    ///
    /// Groups skipped by a filter are not judged. Any state that failed to
    /// reach disk makes the run incomplete.
    pub fn is_complete(&self) -> bool {
        self.tokens.save_error.is_none()
            && self.wiring_save_error.is_none()
            && self
                .groups
                .iter()
                .filter(|g| g.origin != Origin::Skipped)
                .all(|g| {
                    g.shortfall() == 0 && g.activation_error.is_none() && g.save_error.is_none()
                })
    }

    pub fn save_errors(&self) -> impl Iterator<Item = &GroupSummary> {
        self.groups.iter().filter(|g| g.save_error.is_some())
    }

    pub fn short_groups(&self) -> impl Iterator<Item = &GroupSummary> {
        self.groups
            .iter()
            .filter(|g| g.origin != Origin::Skipped && g.shortfall() > 0)
    }

    pub fn failed_wiring(&self) -> impl Iterator<Item = &WiringReport> {
        self.wiring
            .iter()
            .filter(|w| matches!(w.status, WiringStatus::Failed { .. }))
    }
}

/// Persisted vs declared counts for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub kind: InstanceKind,
    pub declared: usize,
    pub persisted: usize,
    pub orphaned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoreStatus {
    /// Would be reused as-is on the next run.
    pub fn is_current(&self) -> bool {
        self.error.is_none() && self.persisted == self.declared && self.orphaned == 0
    }
}

/// Compare the record store against the spec without touching the network.
pub fn store_status(spec: &DeploySpec, store: &RecordStore) -> Vec<StoreStatus> {
    InstanceKind::CATALOG
        .into_iter()
        .map(|kind| {
            let declared = spec.declared(kind);
            match store.load_persisted(kind) {
                Ok(persisted) => StoreStatus {
                    kind,
                    declared,
                    persisted: persisted.records.len(),
                    orphaned: persisted.orphans.len(),
                    error: None,
                },
                Err(e) => StoreStatus {
                    kind,
                    declared,
                    persisted: 0,
                    orphaned: 0,
                    error: Some(format!("{:#}", e)),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: InstanceKind, declared: usize, ready: usize, origin: Origin) -> GroupSummary {
        GroupSummary {
            kind,
            declared,
            ready,
            orphaned: 0,
            origin,
            error: None,
            activation_error: None,
            save_error: None,
        }
    }

    fn run(groups: Vec<GroupSummary>) -> RunSummary {
        RunSummary {
            groups,
            tokens: TokenReport::default(),
            wiring: Vec::new(),
            wiring_save_error: None,
            sequence: SequenceSummary {
                initial: 0,
                current: 0,
                accepted: 0,
                rejected: 0,
            },
        }
    }

    #[test]
    fn test_short_group_makes_run_incomplete() {
        let summary = run(vec![
            summary(InstanceKind::Router, 1, 1, Origin::Reused),
            summary(InstanceKind::Pair, 3, 1, Origin::Fresh),
        ]);
        assert!(!summary.is_complete());
        assert_eq!(summary.short_groups().count(), 1);
    }

    #[test]
    fn test_skipped_groups_not_judged() {
        let summary = run(vec![summary(InstanceKind::Farm, 2, 0, Origin::Skipped)]);
        assert!(summary.is_complete());
    }

    #[test]
    fn test_activation_error_makes_run_incomplete() {
        let mut group = summary(InstanceKind::Pair, 1, 1, Origin::Fresh);
        group.activation_error = Some("resume failed".to_string());
        assert!(!run(vec![group]).is_complete());
    }

    #[test]
    fn test_save_errors_make_run_incomplete() {
        let mut group = summary(InstanceKind::Pair, 2, 2, Origin::Fresh);
        group.save_error = Some("permission denied".to_string());
        let failed = run(vec![group]);
        assert!(!failed.is_complete());
        assert_eq!(failed.save_errors().count(), 1);

        let mut tokens = run(vec![summary(InstanceKind::Pair, 2, 2, Origin::Fresh)]);
        tokens.tokens.save_error = Some("disk full".to_string());
        assert!(!tokens.is_complete());

        let mut wiring = run(vec![summary(InstanceKind::Pair, 2, 2, Origin::Fresh)]);
        wiring.wiring_save_error = Some("disk full".to_string());
        assert!(!wiring.is_complete());
    }

    #[test]
    fn test_summary_serializes() {
        let json = serde_json::to_value(run(vec![summary(
            InstanceKind::Pair,
            2,
            2,
            Origin::Fresh,
        )]))
        .unwrap();
        assert_eq!(json["groups"][0]["kind"], "pair");
        assert_eq!(json["groups"][0]["origin"], "fresh");
        assert!(json["groups"][0].get("error").is_none());
        assert!(json["groups"][0].get("save_error").is_none());
        assert!(json.get("wiring_save_error").is_none());
    }
}
