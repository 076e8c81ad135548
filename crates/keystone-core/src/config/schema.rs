//! Configuration schema for keystone.toml

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{Address, InstanceKind};

/// Root configuration, built once at process start and never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub network: NetworkConfig,
    pub deployer: DeployerConfig,
    pub paths: PathsConfig,
    pub polling: PollingConfig,
    pub reuse: ReuseConfig,

    /// Artifact locators keyed by instance-type label: a path (relative to
    /// `paths.root`) or an http(s) URL.
    pub artifacts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Gateway that accepts actions and reports their status
    pub gateway: Option<Url>,

    /// Index service listing the tokens an account holds
    pub index: Option<Url>,

    /// Number of partitions the network is split into
    pub partitions: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            gateway: None,
            index: None,
            partitions: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    pub address: Option<Address>,

    /// Location of the signing key; handed to the gateway, never read here.
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which the spec, artifacts and state live
    pub root: PathBuf,

    /// Deploy spec file name, relative to `root`
    pub spec: String,

    /// Record directory name, relative to `root`
    pub state: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("deployment"),
            spec: "deploy-spec.json".to_string(),
            state: "state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub same_partition_delay_ms: u64,
    pub cross_partition_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            same_partition_delay_ms: 6_000,
            cross_partition_delay_ms: 18_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReuseConfig {
    /// Reuse persisted records when their count matches the spec
    pub default: bool,

    /// Groups that are always provisioned fresh
    pub fresh: BTreeSet<InstanceKind>,

    /// Activate reused groups as well as fresh ones
    pub force_activate: bool,
}

impl Default for ReuseConfig {
    fn default() -> Self {
        Self {
            default: true,
            fresh: BTreeSet::new(),
            force_activate: false,
        }
    }
}

impl DeployConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.partitions == 0 {
            anyhow::bail!("network.partitions must be at least 1");
        }
        if self.polling.max_attempts == 0 {
            anyhow::bail!("polling.max_attempts must be at least 1");
        }
        if self.paths.spec.trim().is_empty() {
            anyhow::bail!("paths.spec must not be empty");
        }
        for label in self.artifacts.keys() {
            label.parse::<InstanceKind>()?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn spec_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.spec)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.paths.root.join(&self.paths.state)
    }

    /// Config for a run against an in-memory network.
    ///
    /// Records go to `<state>-simulated` so simulated addresses never mix with
    /// the ones a real network produced.
    pub fn simulated(mut self) -> Self {
        self.paths.state = format!("{}-simulated", self.paths.state);
        self
    }

    /// Artifact locator for a kind, defaulting to `artifacts/<label>.wasm`.
    pub fn artifact_locator(&self, kind: InstanceKind) -> String {
        self.artifacts
            .iter()
            .find(|(label, _)| label.parse::<InstanceKind>().ok() == Some(kind))
            .map(|(_, locator)| locator.clone())
            .unwrap_or_else(|| format!("artifacts/{}.wasm", kind.label()))
    }

    pub fn reuse_requested(&self, kind: InstanceKind) -> bool {
        self.reuse.default && !self.reuse.fresh.contains(&kind)
    }
}

/// Command-line overrides layered on top of the file configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub reuse_all: bool,
    pub reuse_none: bool,
    pub fresh: Vec<InstanceKind>,
    pub force_activate: bool,
}

impl DeployConfig {
    /// Apply overrides, producing the final immutable configuration.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> anyhow::Result<Self> {
        if overrides.reuse_all && overrides.reuse_none {
            anyhow::bail!("--reuse-all and --reuse-none are mutually exclusive");
        }
        if let Some(root) = overrides.root {
            self.paths.root = root;
        }
        if overrides.reuse_all {
            self.reuse.default = true;
            self.reuse.fresh.clear();
        }
        if overrides.reuse_none {
            self.reuse.default = false;
        }
        self.reuse.fresh.extend(overrides.fresh);
        if overrides.force_activate {
            self.reuse.force_activate = true;
        }
        self.validate()?;
        Ok(self)
    }
}
