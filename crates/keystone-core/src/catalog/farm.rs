//! Farm: stakes a pair's LP token for rewards.
//!
//! Version 2 farms additionally get a boosted-yields percentage during
//! initialization.

use serde::{Deserialize, Serialize};

use super::pair::Pair;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::error::ProvisionError;
use crate::session::Session;
use crate::types::{Address, Amount, ContractVersion, InstanceKind, TokenId, TokenRef};

pub struct Farm;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FarmParams {
    pub pair: usize,
    pub reward_token: TokenRef,
    #[serde(default)]
    pub version: ContractVersion,
    #[serde(default = "default_per_block_reward")]
    pub per_block_reward: Amount,
    #[serde(default = "default_boosted_yields")]
    pub boosted_yields_percent: u64,
    #[serde(default = "default_farm_ticker")]
    pub farm_ticker: String,
}

pub(crate) fn default_per_block_reward() -> Amount {
    Amount(1_000_000_000_000_000_000)
}

fn default_boosted_yields() -> u64 {
    2_500
}

fn default_farm_ticker() -> String {
    "FARM".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmInstance {
    pub address: Address,
    pub version: ContractVersion,
    pub pair: Address,
    pub farming_token: TokenId,
    pub reward_token: TokenId,
    #[serde(default)]
    pub farm_token: Option<TokenId>,
    #[serde(default)]
    pub roles_set: bool,
    #[serde(default)]
    pub per_block_reward: Option<Amount>,
    #[serde(default)]
    pub boosted_yields_percent: Option<u64>,
}

impl Blueprint for Farm {
    const KIND: InstanceKind = InstanceKind::Farm;

    type Params = FarmParams;
    type Instance = FarmInstance;

    fn references(params: &FarmParams) -> References {
        References::new()
            .instance(InstanceKind::Pair, params.pair)
            .token(&params.reward_token)
    }

    fn validate(params: &FarmParams) -> Result<(), String> {
        if params.boosted_yields_percent > 10_000 {
            return Err("boosted_yields_percent is in basis points (max 10000)".to_string());
        }
        check_ticker("farm_ticker", &params.farm_ticker)
    }

    fn provision(
        params: &FarmParams,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<FarmInstance, Failure<FarmInstance>> {
        let pair = deps.instance::<Pair>(params.pair)?;
        let farming_token =
            pair.lp_token
                .clone()
                .ok_or_else(|| ProvisionError::DependencyUnresolved {
                    reference: format!("{}[{}]", InstanceKind::Pair, params.pair),
                    reason: "no LP token issued".to_string(),
                })?;
        let pair = pair.address;
        let reward_token = session.token(&params.reward_token)?;

        let address = session.deploy(
            Self::KIND,
            vec![
                reward_token.to_string(),
                farming_token.to_string(),
                pair.to_string(),
            ],
        )?;
        let mut instance = FarmInstance {
            address,
            version: params.version,
            pair,
            farming_token,
            reward_token,
            farm_token: None,
            roles_set: false,
            per_block_reward: None,
            boosted_yields_percent: None,
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

        if params.version == ContractVersion::V2 {
            session
                .call(
                    address,
                    "setBoostedYieldsRewardsPercentage",
                    vec![params.boosted_yields_percent.to_string()],
                )
                .or_orphan(&instance)?;
            instance.boosted_yields_percent = Some(params.boosted_yields_percent);
        }

        Ok(instance)
    }

    fn activate(instance: &FarmInstance, session: &mut Session<'_>) -> Result<(), ProvisionError> {
        session.call(instance.address, "startProduceRewards", vec![])?;
        session.call(instance.address, "resume", vec![])?;
        Ok(())
    }

    fn wrap(instance: FarmInstance) -> InstanceRecord {
        InstanceRecord::Farm(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&FarmInstance> {
        match record {
            InstanceRecord::Farm(instance) => Some(instance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_defaults_to_v2() {
        let params: FarmParams =
            serde_json::from_value(json!({ "pair": 0, "reward_token": 0 })).unwrap();
        assert_eq!(params.version, ContractVersion::V2);
        assert_eq!(params.farm_ticker, "FARM");
    }

    #[test]
    fn test_boosted_yields_bounds() {
        let params: FarmParams = serde_json::from_value(
            json!({ "pair": 0, "reward_token": 0, "boosted_yields_percent": 20000 }),
        )
        .unwrap();
        assert!(Farm::validate(&params).is_err());
    }
}
