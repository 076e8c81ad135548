//! Proxy DEX: lets locked-token holders use pairs and farms.
//!
//! Each intermediated pair and farm is added with its own call, so a failure
//! half-way leaves an orphan recording exactly which ones were added.

use serde::{Deserialize, Serialize};

use super::farm::Farm;
use super::pair::Pair;
use super::simple_lock::SimpleLock;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::error::ProvisionError;
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId};

pub struct ProxyDex;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyDexParams {
    pub simple_lock: usize,
    #[serde(default)]
    pub pairs: Vec<usize>,
    #[serde(default)]
    pub farms: Vec<usize>,
    #[serde(default = "default_pair_ticker")]
    pub proxy_pair_ticker: String,
    #[serde(default = "default_farm_ticker")]
    pub proxy_farm_ticker: String,
}

fn default_pair_ticker() -> String {
    "LKLP".to_string()
}

fn default_farm_ticker() -> String {
    "LKFARM".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDexInstance {
    pub address: Address,
    pub simple_lock: Address,
    pub locked_token: TokenId,
    #[serde(default)]
    pub proxy_pair_token: Option<TokenId>,
    #[serde(default)]
    pub proxy_farm_token: Option<TokenId>,
    #[serde(default)]
    pub intermediated_pairs: Vec<Address>,
    #[serde(default)]
    pub intermediated_farms: Vec<Address>,
}

impl Blueprint for ProxyDex {
    const KIND: InstanceKind = InstanceKind::ProxyDex;

    type Params = ProxyDexParams;
    type Instance = ProxyDexInstance;

    fn references(params: &ProxyDexParams) -> References {
        References::new()
            .instances(InstanceKind::Pair, &params.pairs)
            .instances(InstanceKind::Farm, &params.farms)
            .instance(InstanceKind::SimpleLock, params.simple_lock)
    }

    fn validate(params: &ProxyDexParams) -> Result<(), String> {
        check_ticker("proxy_pair_ticker", &params.proxy_pair_ticker)?;
        check_ticker("proxy_farm_ticker", &params.proxy_farm_ticker)
    }

    fn provision(
        params: &ProxyDexParams,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<ProxyDexInstance, Failure<ProxyDexInstance>> {
        let lock = deps.instance::<SimpleLock>(params.simple_lock)?;
        let locked_token = lock.locked_token.clone().ok_or_else(|| {
            ProvisionError::DependencyUnresolved {
                reference: format!("{}[{}]", InstanceKind::SimpleLock, params.simple_lock),
                reason: "no locked token issued".to_string(),
            }
        })?;
        let simple_lock = lock.address;
        let pairs = params
            .pairs
            .iter()
            .map(|i| deps.instance::<Pair>(*i).map(|p| p.address))
            .collect::<Result<Vec<_>, _>>()?;
        let farms = params
            .farms
            .iter()
            .map(|i| deps.instance::<Farm>(*i).map(|f| f.address))
            .collect::<Result<Vec<_>, _>>()?;

        let address = session.deploy(
            Self::KIND,
            vec![locked_token.to_string(), simple_lock.to_string()],
        )?;
        let mut instance = ProxyDexInstance {
            address,
            simple_lock,
            locked_token,
            proxy_pair_token: None,
            proxy_farm_token: None,
            intermediated_pairs: Vec::new(),
            intermediated_farms: Vec::new(),
        };

        let token = session
            .issue(
                address,
                "registerProxyPair",
                &params.proxy_pair_ticker,
                &params.proxy_pair_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.proxy_pair_token = Some(token);

        let token = session
            .issue(
                address,
                "registerProxyFarm",
                &params.proxy_farm_ticker,
                &params.proxy_farm_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.proxy_farm_token = Some(token);

        for pair in pairs {
            session
                .call(address, "addPairToIntermediate", vec![pair.to_string()])
                .or_orphan(&instance)?;
            instance.intermediated_pairs.push(pair);
        }
        for farm in farms {
            session
                .call(address, "addFarmToIntermediate", vec![farm.to_string()])
                .or_orphan(&instance)?;
            instance.intermediated_farms.push(farm);
        }

        Ok(instance)
    }

    fn wrap(instance: ProxyDexInstance) -> InstanceRecord {
        InstanceRecord::ProxyDex(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&ProxyDexInstance> {
        match record {
            InstanceRecord::ProxyDex(instance) => Some(instance),
            _ => None,
        }
    }
}
