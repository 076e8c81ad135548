//! Deploy spec loading and load-time validation.
//!
//! The spec is a JSON document with one key per instance-type label, each an
//! array of parameter objects, plus an optional `tokens` key describing the
//! fungible tokens the token phase must provide:
//!
//! ```json
//! {
//!   "tokens": { "count": 2, "ticker_prefix": "TST", "supply": "1000000", "decimals": 18 },
//!   "router": [ {} ],
//!   "pair": [ { "router": 0, "first_token": 0, "second_token": 1 } ]
//! }
//! ```
//!
//! Dependency references are type-specific fields named after the referenced
//! label. They are checked here against catalog order, but resolved only at
//! provisioning time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::blueprint;
use crate::error::SpecLoadError;
use crate::types::{Amount, InstanceKind};

/// One declared instance: its named parameters.
pub type SpecEntry = Map<String, Value>;

/// Top-level key for the token phase.
pub const TOKENS_KEY: &str = "tokens";

/// Fungible tokens required by later phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenPlan {
    pub count: usize,
    pub ticker_prefix: String,
    pub supply: Amount,
    pub decimals: u8,
}

impl Default for TokenPlan {
    fn default() -> Self {
        Self {
            count: 0,
            ticker_prefix: "TST".to_string(),
            supply: Amount(1_000_000_000_000_000_000_000_000),
            decimals: 18,
        }
    }
}

impl TokenPlan {
    /// Ticker for the n-th token, e.g. `TST0`.
    pub fn ticker(&self, n: usize) -> String {
        format!("{}{}", self.ticker_prefix, n)
    }

    fn validate(&self) -> Result<(), SpecLoadError> {
        let prefix_ok = !self.ticker_prefix.is_empty()
            && self
                .ticker_prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !prefix_ok {
            return Err(SpecLoadError::Malformed(format!(
                "tokens.ticker_prefix '{}' must be uppercase alphanumeric",
                self.ticker_prefix
            )));
        }
        if self.count > 0 && !crate::types::is_valid_ticker(&self.ticker(self.count - 1)) {
            return Err(SpecLoadError::Malformed(format!(
                "tokens.ticker_prefix '{}' yields invalid tickers for {} tokens",
                self.ticker_prefix, self.count
            )));
        }
        Ok(())
    }
}

/// Loaded, validated, read-only deploy spec.
#[derive(Debug, Clone, Default)]
pub struct DeploySpec {
    groups: BTreeMap<InstanceKind, Vec<SpecEntry>>,
    tokens: TokenPlan,
}

impl DeploySpec {
    /// Load and validate the spec document at `path`.
    pub fn load(path: &Path) -> Result<Self, SpecLoadError> {
        if !path.exists() {
            return Err(SpecLoadError::Missing(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| SpecLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            instances = spec.total_declared(),
            tokens = spec.tokens.count,
            "Loaded deploy spec"
        );
        Ok(spec)
    }

    pub fn from_json_str(content: &str) -> Result<Self, SpecLoadError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| SpecLoadError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SpecLoadError> {
        let Value::Object(root) = value else {
            return Err(SpecLoadError::Malformed(
                "top level must be an object keyed by instance-type label".to_string(),
            ));
        };

        let mut groups = BTreeMap::new();
        let mut tokens = TokenPlan::default();

        for (key, value) in root {
            if key == TOKENS_KEY {
                tokens = serde_json::from_value(value)
                    .map_err(|e| SpecLoadError::Malformed(format!("{}: {}", TOKENS_KEY, e)))?;
                continue;
            }

            let kind =
                InstanceKind::from_label(&key).ok_or_else(|| SpecLoadError::UnknownLabel(key.clone()))?;
            let Value::Array(items) = value else {
                return Err(SpecLoadError::Malformed(format!(
                    "'{}' must be an array of parameter objects",
                    key
                )));
            };

            let mut entries = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(entry) => entries.push(entry),
                    _ => {
                        return Err(SpecLoadError::InvalidEntry {
                            kind,
                            index,
                            message: "entry must be an object".to_string(),
                        });
                    }
                }
            }
            groups.insert(kind, entries);
        }

        let spec = Self { groups, tokens };
        spec.validate()?;
        Ok(spec)
    }

    /// Declared entries for a kind; an absent label means none.
    pub fn entries(&self, kind: InstanceKind) -> &[SpecEntry] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn declared(&self, kind: InstanceKind) -> usize {
        self.entries(kind).len()
    }

    pub fn total_declared(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn tokens(&self) -> &TokenPlan {
        &self.tokens
    }

    /// Parse every entry into its typed parameters and check references.
    ///
    /// References must point strictly backwards in catalog order; the
    /// orchestrator walks the catalog in declaration order and never computes a
    /// topological sort.
    fn validate(&self) -> Result<(), SpecLoadError> {
        self.tokens.validate()?;

        for kind in InstanceKind::CATALOG {
            let capability = blueprint(kind);
            for (index, entry) in self.entries(kind).iter().enumerate() {
                let refs = capability
                    .references(entry)
                    .map_err(|message| SpecLoadError::InvalidEntry {
                        kind,
                        index,
                        message,
                    })?;

                for dep in refs.instances {
                    // Unreachable for the built-in blueprints, whose parameter
                    // types only name earlier kinds. Guards new blueprints.
                    if dep.kind >= kind {
                        return Err(SpecLoadError::ForwardReference {
                            kind,
                            index,
                            target: dep.kind,
                        });
                    }
                    let declared = self.declared(dep.kind);
                    if dep.index >= declared {
                        return Err(SpecLoadError::IndexOutOfRange {
                            kind,
                            index,
                            target: dep.kind,
                            target_index: dep.index,
                            declared,
                        });
                    }
                }

                for token in refs.tokens {
                    if token >= self.tokens.count {
                        return Err(SpecLoadError::TokenOutOfRange {
                            kind,
                            index,
                            token,
                            declared: self.tokens.count,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_label_means_zero_instances() {
        let spec = DeploySpec::from_value(json!({ "router": [{}] })).unwrap();
        assert_eq!(spec.declared(InstanceKind::Router), 1);
        assert_eq!(spec.declared(InstanceKind::Pair), 0);
        assert!(spec.entries(InstanceKind::Farm).is_empty());
        assert_eq!(spec.tokens().count, 0);
    }

    #[test]
    fn test_unknown_label_rejected() {
        let err = DeploySpec::from_value(json!({ "bridge": [] })).unwrap_err();
        assert!(matches!(err, SpecLoadError::UnknownLabel(label) if label == "bridge"));
    }

    #[test]
    fn test_non_object_root_rejected() {
        assert!(matches!(
            DeploySpec::from_value(json!([1, 2])),
            Err(SpecLoadError::Malformed(_))
        ));
        assert!(matches!(
            DeploySpec::from_json_str("{ not json"),
            Err(SpecLoadError::Malformed(_))
        ));
    }

    #[test]
    fn test_entry_must_be_object() {
        let err = DeploySpec::from_value(json!({ "router": [1] })).unwrap_err();
        assert!(matches!(
            err,
            SpecLoadError::InvalidEntry { kind: InstanceKind::Router, index: 0, .. }
        ));
    }

    #[test]
    fn test_reference_out_of_range() {
        let err = DeploySpec::from_value(json!({
            "tokens": { "count": 2 },
            "router": [{}],
            "pair": [{ "router": 1, "first_token": 0, "second_token": 1 }]
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            SpecLoadError::IndexOutOfRange { target: InstanceKind::Router, target_index: 1, declared: 1, .. }
        ));
    }

    #[test]
    fn test_every_blueprint_references_only_earlier_kinds() {
        let spec = DeploySpec::from_value(json!({
            "tokens": { "count": 3 },
            "router": [{}],
            "pair": [{ "router": 0, "first_token": 0, "second_token": 1 }],
            "simple_lock": [{}],
            "fees_collector": [{ "simple_lock": 0, "known_tokens": [0, 1] }],
            "farm": [{ "pair": 0, "reward_token": 0 }],
            "staking": [{ "staking_token": 0 }],
            "proxy_dex": [{ "simple_lock": 0, "pairs": [0], "farms": [0] }],
            "metastaking": [{ "farm": 0, "staking": 0, "pair": 0 }],
            "price_discovery": [
                { "launched_token": 1, "accepted_token": 0, "start_block": 10, "end_block": 100 }
            ]
        }))
        .unwrap();

        let mut with_dependencies = 0;
        for kind in InstanceKind::CATALOG {
            assert_eq!(spec.declared(kind), 1, "{}", kind);
            let refs = blueprint(kind).references(&spec.entries(kind)[0]).unwrap();
            if !refs.instances.is_empty() {
                with_dependencies += 1;
            }
            for dep in refs.instances {
                assert!(dep.kind < kind, "{} references {}", kind, dep.kind);
            }
        }
        assert!(with_dependencies >= 5);
    }

    #[test]
    fn test_token_reference_out_of_range() {
        let err = DeploySpec::from_value(json!({
            "tokens": { "count": 1 },
            "router": [{}],
            "pair": [{ "router": 0, "first_token": 0, "second_token": 1 }]
        }))
        .unwrap_err();
        assert!(matches!(err, SpecLoadError::TokenOutOfRange { token: 1, declared: 1, .. }));
    }

    #[test]
    fn test_literal_tokens_need_no_token_phase() {
        let spec = DeploySpec::from_value(json!({
            "router": [{}],
            "pair": [{ "router": 0, "first_token": "WEGLD-bd4d79", "second_token": "MEX-455c57" }]
        }))
        .unwrap();
        assert_eq!(spec.declared(InstanceKind::Pair), 1);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let err = DeploySpec::from_value(json!({ "router": [{ "owner_fee": 3 }] })).unwrap_err();
        assert!(matches!(err, SpecLoadError::InvalidEntry { kind: InstanceKind::Router, .. }));
    }

    #[test]
    fn test_bad_ticker_prefix_rejected() {
        let err = DeploySpec::from_value(json!({
            "tokens": { "count": 1, "ticker_prefix": "tst" }
        }))
        .unwrap_err();
        assert!(matches!(err, SpecLoadError::Malformed(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = DeploySpec::load(&temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SpecLoadError::Missing(_)));
    }
}
