//! Single-token staking farm.

use serde::{Deserialize, Serialize};

use super::farm::default_per_block_reward;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::error::ProvisionError;
use crate::session::Session;
use crate::types::{Address, Amount, InstanceKind, TokenId, TokenRef};

pub struct Staking;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StakingParams {
    pub staking_token: TokenRef,
    #[serde(default = "default_per_block_reward")]
    pub per_block_reward: Amount,
    /// Basis points
    #[serde(default = "default_max_apr")]
    pub max_apr: u64,
    #[serde(default = "default_farm_ticker")]
    pub farm_ticker: String,
}

fn default_max_apr() -> u64 {
    2_500
}

fn default_farm_ticker() -> String {
    "STAKE".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingInstance {
    pub address: Address,
    pub staking_token: TokenId,
    #[serde(default)]
    pub farm_token: Option<TokenId>,
    #[serde(default)]
    pub roles_set: bool,
    #[serde(default)]
    pub per_block_reward: Option<Amount>,
    #[serde(default)]
    pub max_apr: Option<u64>,
}

impl Blueprint for Staking {
    const KIND: InstanceKind = InstanceKind::Staking;

    type Params = StakingParams;
    type Instance = StakingInstance;

    fn references(params: &StakingParams) -> References {
        References::new().token(&params.staking_token)
    }

    fn validate(params: &StakingParams) -> Result<(), String> {
        check_ticker("farm_ticker", &params.farm_ticker)
    }

    fn provision(
        params: &StakingParams,
        _deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<StakingInstance, Failure<StakingInstance>> {
        let staking_token = session.token(&params.staking_token)?;
        let address = session.deploy(Self::KIND, vec![staking_token.to_string()])?;
        let mut instance = StakingInstance {
            address,
            staking_token,
            farm_token: None,
            roles_set: false,
            per_block_reward: None,
            max_apr: None,
        };

        let farm_token = session
            .issue(
                address,
                "registerFarmToken",
                &params.farm_ticker,
                &params.farm_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.farm_token = Some(farm_token);

        session
            .call(address, "setLocalRolesFarmToken", vec![])
            .or_orphan(&instance)?;
        instance.roles_set = true;

        session
            .call(
                address,
                "setPerBlockRewardAmount",
                vec![params.per_block_reward.to_string()],
            )
            .or_orphan(&instance)?;
        instance.per_block_reward = Some(params.per_block_reward);

        session
            .call(address, "setMaxApr", vec![params.max_apr.to_string()])
            .or_orphan(&instance)?;
        instance.max_apr = Some(params.max_apr);

        Ok(instance)
    }

    fn activate(instance: &StakingInstance, session: &mut Session<'_>) -> Result<(), ProvisionError> {
        session.call(instance.address, "startProduceRewards", vec![])?;
        session.call(instance.address, "resume", vec![])?;
        Ok(())
    }

    fn wrap(instance: StakingInstance) -> InstanceRecord {
        InstanceRecord::Staking(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&StakingInstance> {
        match record {
            InstanceRecord::Staking(instance) => Some(instance),
            _ => None,
        }
    }
}
