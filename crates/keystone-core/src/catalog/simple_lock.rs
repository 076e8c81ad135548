//! Simple lock: wraps tokens into a locked token until an unlock epoch.

use serde::{Deserialize, Serialize};

use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId};

pub struct SimpleLock;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleLockParams {
    #[serde(default = "default_locked_ticker")]
    pub locked_ticker: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

fn default_locked_ticker() -> String {
    "LKTOK".to_string()
}

fn default_display_name() -> String {
    "LockedToken".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleLockInstance {
    pub address: Address,
    #[serde(default)]
    pub locked_token: Option<TokenId>,
    #[serde(default)]
    pub roles_set: bool,
}

impl Blueprint for SimpleLock {
    const KIND: InstanceKind = InstanceKind::SimpleLock;

    type Params = SimpleLockParams;
    type Instance = SimpleLockInstance;

    fn references(_params: &SimpleLockParams) -> References {
        References::new()
    }

    fn validate(params: &SimpleLockParams) -> Result<(), String> {
        check_ticker("locked_ticker", &params.locked_ticker)
    }

    fn provision(
        params: &SimpleLockParams,
        _deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<SimpleLockInstance, Failure<SimpleLockInstance>> {
        let address = session.deploy(Self::KIND, vec![])?;
        let mut instance = SimpleLockInstance {
            address,
            locked_token: None,
            roles_set: false,
        };

        let token = session
            .issue(
                address,
                "issueLockedToken",
                &params.display_name,
                &params.locked_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.locked_token = Some(token);

        session
            .call(address, "setLocalRolesLockedToken", vec![])
            .or_orphan(&instance)?;
        instance.roles_set = true;

        Ok(instance)
    }

    fn wrap(instance: SimpleLockInstance) -> InstanceRecord {
        InstanceRecord::SimpleLock(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&SimpleLockInstance> {
        match record {
            InstanceRecord::SimpleLock(instance) => Some(instance),
            _ => None,
        }
    }
}
