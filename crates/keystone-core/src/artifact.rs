//! Code artifacts: locating, fetching and digesting the code each instance
//! type deploys.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use url::Url;

use crate::config::DeployConfig;
use crate::gateway::http::HttpClient;
use crate::types::{InstanceKind, encode_hex};

/// Where an artifact comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Local(PathBuf),
    Remote(Url),
}

impl ArtifactSource {
    /// Parse a locator; relative paths are taken relative to `root`.
    pub fn parse(locator: &str, root: &Path) -> anyhow::Result<Self> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            let url = Url::parse(locator)
                .with_context(|| format!("Invalid artifact URL: {}", locator))?;
            return Ok(Self::Remote(url));
        }
        let path = PathBuf::from(locator);
        if path.is_absolute() {
            Ok(Self::Local(path))
        } else {
            Ok(Self::Local(root.join(path)))
        }
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactSource::Local(path) => write!(f, "{}", path.display()),
            ArtifactSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Fetched artifact bytes plus their blake3 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: Vec<u8>,
    pub digest: String,
}

impl Artifact {
    pub fn from_bytes(code: Vec<u8>) -> Self {
        let digest = blake3::hash(&code).to_hex().to_string();
        Self { code, digest }
    }

    pub fn code_hex(&self) -> String {
        encode_hex(&self.code)
    }
}

/// Resolves each kind's artifact at most once per run.
pub struct ArtifactCache {
    root: PathBuf,
    locators: HashMap<InstanceKind, String>,
    resolved: HashMap<InstanceKind, Artifact>,
    http: Option<HttpClient>,
}

impl ArtifactCache {
    pub fn new(config: &DeployConfig) -> Self {
        let locators = InstanceKind::CATALOG
            .into_iter()
            .map(|kind| (kind, config.artifact_locator(kind)))
            .collect();
        Self {
            root: config.root().to_path_buf(),
            locators,
            resolved: HashMap::new(),
            http: None,
        }
    }

    pub fn locator(&self, kind: InstanceKind) -> Option<&str> {
        self.locators.get(&kind).map(String::as_str)
    }

    pub fn get(&mut self, kind: InstanceKind) -> anyhow::Result<&Artifact> {
        if !self.resolved.contains_key(&kind) {
            let artifact = self.fetch(kind)?;
            tracing::debug!(kind = %kind, digest = %artifact.digest, size = artifact.code.len(), "Resolved artifact");
            self.resolved.insert(kind, artifact);
        }
        self.resolved
            .get(&kind)
            .ok_or_else(|| anyhow::anyhow!("artifact for {} missing from cache", kind))
    }

    fn fetch(&mut self, kind: InstanceKind) -> anyhow::Result<Artifact> {
        let locator = self
            .locators
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| format!("artifacts/{}.wasm", kind.label()));
        let source = ArtifactSource::parse(&locator, &self.root)?;
        let code = match &source {
            ArtifactSource::Local(path) => std::fs::read(path)
                .with_context(|| format!("Failed to read artifact: {}", path.display()))?,
            ArtifactSource::Remote(url) => {
                if self.http.is_none() {
                    self.http = Some(HttpClient::new()?);
                }
                let client = self
                    .http
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("HTTP client unavailable"))?;
                client.get_bytes(url)?
            }
        };
        if code.is_empty() {
            anyhow::bail!("Artifact {} is empty", source);
        }
        Ok(Artifact::from_bytes(code))
    }
}
