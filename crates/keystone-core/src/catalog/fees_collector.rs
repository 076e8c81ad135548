//! Fees collector: receives swap fees and locks rewards through a simple lock.

use serde::{Deserialize, Serialize};

use super::simple_lock::SimpleLock;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved};
use crate::error::ProvisionError;
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId, TokenRef};

pub struct FeesCollector;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeesCollectorParams {
    pub simple_lock: usize,
    #[serde(default = "default_lock_epochs")]
    pub lock_epochs: u64,
    #[serde(default)]
    pub known_tokens: Vec<TokenRef>,
}

fn default_lock_epochs() -> u64 {
    1440
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeesCollectorInstance {
    pub address: Address,
    pub simple_lock: Address,
    pub locked_token: TokenId,
    #[serde(default)]
    pub lock_epochs: Option<u64>,
    #[serde(default)]
    pub locking_address_set: bool,
    #[serde(default)]
    pub known_tokens: Vec<TokenId>,
}

impl Blueprint for FeesCollector {
    const KIND: InstanceKind = InstanceKind::FeesCollector;

    type Params = FeesCollectorParams;
    type Instance = FeesCollectorInstance;

    fn references(params: &FeesCollectorParams) -> References {
        params
            .known_tokens
            .iter()
            .fold(
                References::new().instance(InstanceKind::SimpleLock, params.simple_lock),
                |refs, token| refs.token(token),
            )
    }

    fn validate(params: &FeesCollectorParams) -> Result<(), String> {
        if params.lock_epochs == 0 {
            return Err("lock_epochs must be at least 1".to_string());
        }
        Ok(())
    }

    fn provision(
        params: &FeesCollectorParams,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<FeesCollectorInstance, Failure<FeesCollectorInstance>> {
        let lock = deps.instance::<SimpleLock>(params.simple_lock)?;
        let locked_token = lock.locked_token.clone().ok_or_else(|| {
            ProvisionError::DependencyUnresolved {
                reference: format!("{}[{}]", InstanceKind::SimpleLock, params.simple_lock),
                reason: "no locked token issued".to_string(),
            }
        })?;
        let simple_lock = lock.address;
        let known_tokens = params
            .known_tokens
            .iter()
            .map(|token| session.token(token))
            .collect::<Result<Vec<_>, _>>()?;

        let address = session.deploy(Self::KIND, vec![locked_token.to_string()])?;
        let mut instance = FeesCollectorInstance {
            address,
            simple_lock,
            locked_token,
            lock_epochs: None,
            locking_address_set: false,
            known_tokens: Vec::new(),
        };

        session
            .call(address, "setLockingScAddress", vec![simple_lock.to_string()])
            .or_orphan(&instance)?;
        instance.locking_address_set = true;

        session
            .call(address, "setLockEpochs", vec![params.lock_epochs.to_string()])
            .or_orphan(&instance)?;
        instance.lock_epochs = Some(params.lock_epochs);

        session
            .call(
                address,
                "addKnownTokens",
                known_tokens.iter().map(ToString::to_string).collect(),
            )
            .or_orphan(&instance)?;
        instance.known_tokens = known_tokens;

        Ok(instance)
    }

    fn wrap(instance: FeesCollectorInstance) -> InstanceRecord {
        InstanceRecord::FeesCollector(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&FeesCollectorInstance> {
        match record {
            InstanceRecord::FeesCollector(instance) => Some(instance),
            _ => None,
        }
    }
}
