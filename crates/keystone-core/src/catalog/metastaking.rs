//! Metastaking: stakes farm positions into a staking farm for dual yield.

use serde::{Deserialize, Serialize};

use super::farm::Farm;
use super::pair::Pair;
use super::staking::Staking;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId};

pub struct Metastaking;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetastakingParams {
    pub farm: usize,
    pub staking: usize,
    pub pair: usize,
    #[serde(default = "default_dual_yield_ticker")]
    pub dual_yield_ticker: String,
}

fn default_dual_yield_ticker() -> String {
    "METASTAKE".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetastakingInstance {
    pub address: Address,
    pub farm: Address,
    pub staking: Address,
    pub pair: Address,
    #[serde(default)]
    pub dual_yield_token: Option<TokenId>,
    #[serde(default)]
    pub roles_set: bool,
    /// Farms that have whitelisted this instance, in call order
    #[serde(default)]
    pub whitelisted_by: Vec<Address>,
}

impl Blueprint for Metastaking {
    const KIND: InstanceKind = InstanceKind::Metastaking;

    type Params = MetastakingParams;
    type Instance = MetastakingInstance;

    fn references(params: &MetastakingParams) -> References {
        References::new()
            .instance(InstanceKind::Farm, params.farm)
            .instance(InstanceKind::Staking, params.staking)
            .instance(InstanceKind::Pair, params.pair)
    }

    fn validate(params: &MetastakingParams) -> Result<(), String> {
        check_ticker("dual_yield_ticker", &params.dual_yield_ticker)
    }

    fn provision(
        params: &MetastakingParams,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<MetastakingInstance, Failure<MetastakingInstance>> {
        let farm = deps.instance::<Farm>(params.farm)?.address;
        let staking = deps.instance::<Staking>(params.staking)?.address;
        let pair = deps.instance::<Pair>(params.pair)?.address;

        let address = session.deploy(
            Self::KIND,
            vec![farm.to_string(), staking.to_string(), pair.to_string()],
        )?;
        let mut instance = MetastakingInstance {
            address,
            farm,
            staking,
            pair,
            dual_yield_token: None,
            roles_set: false,
            whitelisted_by: Vec::new(),
        };

        let token = session
            .issue(
                address,
                "registerDualYieldToken",
                &params.dual_yield_ticker,
                &params.dual_yield_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.dual_yield_token = Some(token);

        session
            .call(address, "setLocalRolesDualYieldToken", vec![])
            .or_orphan(&instance)?;
        instance.roles_set = true;

        for target in [farm, staking] {
            session
                .call(target, "addSCAddressToWhitelist", vec![address.to_string()])
                .or_orphan(&instance)?;
            instance.whitelisted_by.push(target);
        }

        Ok(instance)
    }

    fn wrap(instance: MetastakingInstance) -> InstanceRecord {
        InstanceRecord::Metastaking(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&MetastakingInstance> {
        match record {
            InstanceRecord::Metastaking(instance) => Some(instance),
            _ => None,
        }
    }
}
