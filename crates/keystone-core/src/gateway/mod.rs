//! Network boundary: the gateway that accepts actions and the index service
//! that lists token holdings.
//!
//! Both are external collaborators. Two implementations ship with the crate:
//! - [`http::HttpGateway`] / [`http::HttpTokenIndex`] talk to a gateway proxy
//! - [`simulated::SimulatedNetwork`] is a deterministic in-memory network used
//!   for rehearsal runs and tests

pub mod http;
pub mod simulated;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{Address, Amount, TokenId};

/// A signed-by-the-gateway provisioning action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub sender: Address,
    pub nonce: u64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Deploy code; the contract address is reported on inclusion.
    Deploy {
        code_hash: String,
        code: String,
        arguments: Vec<String>,
    },
    /// Call an endpoint of a deployed contract.
    Call {
        contract: Address,
        endpoint: String,
        arguments: Vec<String>,
    },
    /// Issue a new fungible token held by the sender.
    IssueFungible {
        ticker: String,
        supply: Amount,
        decimals: u8,
    },
}

impl ActionKind {
    /// Contract the action targets, if it targets one.
    pub fn target(&self) -> Option<Address> {
        match self {
            ActionKind::Call { contract, .. } => Some(*contract),
            ActionKind::Deploy { .. } | ActionKind::IssueFungible { .. } => None,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ActionKind::Call { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

/// Gateway-assigned handle used to poll an action's status.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionHandle(pub String);

impl fmt::Display for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    Pending,
    Included(Outcome),
    Failed(String),
}

/// Result of an included action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Address created by a deployment
    #[serde(default)]
    pub created: Option<Address>,

    /// Values returned by the call, e.g. an issued token identifier
    #[serde(default)]
    pub return_data: Vec<String>,
}

impl Outcome {
    /// First return value parsed as a token identifier.
    pub fn issued_token(&self) -> Result<TokenId, String> {
        let raw = self
            .return_data
            .first()
            .ok_or_else(|| "no token identifier returned".to_string())?;
        raw.parse::<TokenId>().map_err(|e| e.to_string())
    }
}

/// Submits actions and reports their inclusion.
pub trait NetworkGateway {
    /// Submit an action. Returns once the gateway accepted or rejected it.
    fn submit(&self, action: &Action) -> Result<ActionHandle, GatewayError>;

    /// Current status of a previously accepted action.
    fn poll_status(&self, handle: &ActionHandle) -> Result<ActionStatus, GatewayError>;

    /// Next sequence number (nonce) the account must use.
    fn sync_sequence_number(&self, account: &Address) -> Result<u64, GatewayError>;
}

/// Lists the fungible tokens an account holds.
pub trait TokenIndex {
    fn fungible_tokens(&self, account: &Address) -> Result<Vec<TokenId>, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_flat() {
        let action = Action {
            sender: Address::ZERO,
            nonce: 4,
            kind: ActionKind::Call {
                contract: Address::ZERO,
                endpoint: "resume".to_string(),
                arguments: vec![],
            },
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "call");
        assert_eq!(json["endpoint"], "resume");
        assert_eq!(json["nonce"], 4);
    }

    #[test]
    fn test_outcome_issued_token() {
        let outcome = Outcome {
            created: None,
            return_data: vec!["LPTOK-0a1b2c".to_string()],
        };
        assert_eq!(outcome.issued_token().unwrap().as_str(), "LPTOK-0a1b2c");
        assert!(Outcome::default().issued_token().is_err());
    }
}
