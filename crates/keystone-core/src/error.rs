//! Error types for spec loading, provisioning and the network boundary.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::InstanceKind;

/// Fatal errors raised while loading or validating the deploy spec.
///
/// Any of these aborts the run before a single action is submitted.
#[derive(Debug, Error)]
pub enum SpecLoadError {
    #[error("deploy spec not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read deploy spec {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed deploy spec: {0}")]
    Malformed(String),

    #[error("unknown instance-type label '{0}'")]
    UnknownLabel(String),

    #[error("{kind}[{index}]: {message}")]
    InvalidEntry {
        kind: InstanceKind,
        index: usize,
        message: String,
    },

    #[error(
        "{kind}[{index}] references {target}, which is not provisioned before {kind} in catalog order"
    )]
    ForwardReference {
        kind: InstanceKind,
        index: usize,
        target: InstanceKind,
    },

    #[error("{kind}[{index}] references {target}[{target_index}] but only {declared} declared")]
    IndexOutOfRange {
        kind: InstanceKind,
        index: usize,
        target: InstanceKind,
        target_index: usize,
        declared: usize,
    },

    #[error("{kind}[{index}] references token #{token} but only {declared} tokens declared")]
    TokenOutOfRange {
        kind: InstanceKind,
        index: usize,
        token: usize,
        declared: usize,
    },
}

/// Errors reported by a network gateway or index service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Errors that abort the remaining entries of a group (or a single wiring
/// step, or a group's activation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("dependency {reference} is not ready: {reason}")]
    DependencyUnresolved { reference: String, reason: String },

    #[error("submission of {action} rejected: {reason}")]
    Submission { action: String, reason: String },

    #[error("{action} not included after {attempts} poll(s) (handle {handle})")]
    InclusionTimeout {
        action: String,
        handle: String,
        attempts: u32,
    },

    #[error("{action} failed: {reason}")]
    ExecutionFailed { action: String, reason: String },

    #[error("artifact for {kind} unavailable: {reason}")]
    Artifact { kind: InstanceKind, reason: String },

    #[error("invalid parameters: {0}")]
    InvalidEntry(String),
}

/// Persisted record count differs from the declared count on the reuse path.
///
/// Never fatal: the group is provisioned fresh instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {persisted} persisted record(s) but {declared} declared")]
pub struct SpecMismatchError {
    pub kind: InstanceKind,
    pub persisted: usize,
    pub declared: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ProvisionError::DependencyUnresolved {
            reference: "router[0]".into(),
            reason: "group not satisfied".into(),
        };
        assert_eq!(
            err.to_string(),
            "dependency router[0] is not ready: group not satisfied"
        );

        let err = SpecMismatchError {
            kind: InstanceKind::Pair,
            persisted: 1,
            declared: 2,
        };
        assert_eq!(err.to_string(), "pair: 1 persisted record(s) but 2 declared");

        let err = SpecLoadError::ForwardReference {
            kind: InstanceKind::Router,
            index: 0,
            target: InstanceKind::Pair,
        };
        assert!(err.to_string().contains("not provisioned before router"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpecLoadError>();
        assert_send_sync::<ProvisionError>();
        assert_send_sync::<GatewayError>();
    }
}
