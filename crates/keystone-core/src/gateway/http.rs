//! HTTP adapters for a gateway proxy and a token index service.
//!
//! Both services answer with a `{ "data": .., "error": .. }` envelope. Calls
//! block: the reqwest futures are driven on a private current-thread tokio
//! runtime.

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::GatewayError;
use crate::gateway::{Action, ActionHandle, ActionStatus, NetworkGateway, Outcome, TokenIndex};
use crate::types::{Address, TokenId};

const USER_AGENT: &str = concat!("keystone/", env!("CARGO_PKG_VERSION"));

/// Blocking wrapper around an async reqwest client.
pub struct HttpClient {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { runtime, client })
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, GatewayError> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| GatewayError::Transport(format!("GET {}: {}", url, e)))?;
            read_envelope(response).await
        })
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<T, GatewayError> {
        self.runtime.block_on(async {
            let response = self
                .client
                .post(url.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| GatewayError::Transport(format!("POST {}: {}", url, e)))?;
            read_envelope(response).await
        })
    }

    /// Raw body of a GET, used for remote artifacts.
    pub fn get_bytes(&self, url: &Url) -> anyhow::Result<Vec<u8>> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("Failed to download {}", url))?;
            if !response.status().is_success() {
                anyhow::bail!("Failed to download: HTTP {} from {}", response.status(), url);
            }
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read response body from {}", url))?;
            Ok(bytes.to_vec())
        })
    }
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| GatewayError::Protocol(format!("HTTP {}: undecodable body: {}", status, e)))?;
    unwrap_envelope(status.is_success(), body)
}

fn unwrap_envelope<T: DeserializeOwned>(success: bool, mut body: Value) -> Result<T, GatewayError> {
    if let Some(error) = body.get("error").and_then(Value::as_str)
        && !error.is_empty()
    {
        return Err(if success {
            GatewayError::Protocol(error.to_string())
        } else {
            GatewayError::Rejected(error.to_string())
        });
    }
    if !success {
        return Err(GatewayError::Rejected(body.to_string()));
    }
    let data = body
        .get_mut("data")
        .map(Value::take)
        .ok_or_else(|| GatewayError::Protocol("response has no 'data' field".to_string()))?;
    serde_json::from_value(data).map_err(|e| GatewayError::Protocol(e.to_string()))
}

/// Base URLs are joined relative to themselves, so they need a trailing slash.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn join(base: &Url, path: &str) -> Result<Url, GatewayError> {
    base.join(path)
        .map_err(|e| GatewayError::Transport(format!("bad endpoint {}{}: {}", base, path, e)))
}

#[derive(serde::Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum StatusResponse {
    Pending,
    Success {
        #[serde(flatten)]
        outcome: Outcome,
    },
    Fail {
        #[serde(default)]
        reason: String,
    },
}

#[derive(Debug, serde::Deserialize)]
struct NonceResponse {
    nonce: u64,
}

pub struct HttpGateway {
    base: Url,
    client: HttpClient,
}

impl HttpGateway {
    pub fn new(base: Url) -> anyhow::Result<Self> {
        Ok(Self {
            base: normalize_base(base),
            client: HttpClient::new()?,
        })
    }
}

impl NetworkGateway for HttpGateway {
    fn submit(&self, action: &Action) -> Result<ActionHandle, GatewayError> {
        let url = join(&self.base, "transactions")?;
        let response: SubmitResponse = self.client.post_json(&url, action)?;
        tracing::debug!(hash = %response.hash, nonce = action.nonce, "Submitted action");
        Ok(ActionHandle(response.hash))
    }

    fn poll_status(&self, handle: &ActionHandle) -> Result<ActionStatus, GatewayError> {
        let url = join(&self.base, &format!("transactions/{}/status", handle))?;
        let status = match self.client.get_json::<StatusResponse>(&url)? {
            StatusResponse::Pending => ActionStatus::Pending,
            StatusResponse::Success { outcome } => ActionStatus::Included(outcome),
            StatusResponse::Fail { reason } => ActionStatus::Failed(reason),
        };
        Ok(status)
    }

    fn sync_sequence_number(&self, account: &Address) -> Result<u64, GatewayError> {
        let url = join(&self.base, &format!("accounts/{}/nonce", account))?;
        let response: NonceResponse = self.client.get_json(&url)?;
        Ok(response.nonce)
    }
}

pub struct HttpTokenIndex {
    base: Url,
    client: HttpClient,
}

impl HttpTokenIndex {
    pub fn new(base: Url) -> anyhow::Result<Self> {
        Ok(Self {
            base: normalize_base(base),
            client: HttpClient::new()?,
        })
    }
}

#[derive(serde::Deserialize)]
struct TokenEntry {
    identifier: String,
}

impl TokenIndex for HttpTokenIndex {
    fn fungible_tokens(&self, account: &Address) -> Result<Vec<TokenId>, GatewayError> {
        let url = join(&self.base, &format!("accounts/{}/tokens", account))?;
        let entries: Vec<TokenEntry> = self.client.get_json(&url)?;
        // The index also lists non-fungible collections; keep what parses.
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.identifier.parse().ok())
            .collect())
    }
}
