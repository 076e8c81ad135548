//! Liquidity pair between two tokens, registered with a router.
//!
//! Initialization issues the LP token, grants the pair its local roles and
//! registers the pair with its router. Activation resumes trading.

use serde::{Deserialize, Serialize};

use super::router::Router;
use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::error::ProvisionError;
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId, TokenRef};

pub struct Pair;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PairParams {
    pub router: usize,
    pub first_token: TokenRef,
    pub second_token: TokenRef,
    #[serde(default = "default_total_fee")]
    pub total_fee_percent: u64,
    #[serde(default = "default_special_fee")]
    pub special_fee_percent: u64,
    /// LP ticker; derived from the pair's tickers when absent
    #[serde(default)]
    pub lp_ticker: Option<String>,
}

fn default_total_fee() -> u64 {
    300
}

fn default_special_fee() -> u64 {
    50
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInstance {
    pub address: Address,
    pub router: Address,
    pub first_token: TokenId,
    pub second_token: TokenId,
    pub total_fee_percent: u64,
    pub special_fee_percent: u64,
    #[serde(default)]
    pub lp_token: Option<TokenId>,
    #[serde(default)]
    pub lp_roles_set: bool,
    #[serde(default)]
    pub registered: bool,
}

/// `TST0` + `TST1` -> `TST0TST1LP`.
pub fn derive_lp_ticker(first: &TokenId, second: &TokenId) -> String {
    let head = |t: &TokenId| t.ticker().chars().take(4).collect::<String>();
    format!("{}{}LP", head(first), head(second))
}

impl Blueprint for Pair {
    const KIND: InstanceKind = InstanceKind::Pair;

    type Params = PairParams;
    type Instance = PairInstance;

    fn references(params: &PairParams) -> References {
        References::new()
            .instance(InstanceKind::Router, params.router)
            .token(&params.first_token)
            .token(&params.second_token)
    }

    fn validate(params: &PairParams) -> Result<(), String> {
        if params.first_token == params.second_token {
            return Err("first_token and second_token must differ".to_string());
        }
        if params.special_fee_percent > params.total_fee_percent {
            return Err("special_fee_percent exceeds total_fee_percent".to_string());
        }
        if let Some(ticker) = &params.lp_ticker {
            check_ticker("lp_ticker", ticker)?;
        }
        Ok(())
    }

    fn provision(
        params: &PairParams,
        deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<PairInstance, Failure<PairInstance>> {
        let router = deps.instance::<Router>(params.router)?.address;
        let first_token = session.token(&params.first_token)?;
        let second_token = session.token(&params.second_token)?;

        let address = session.deploy(
            Self::KIND,
            vec![
                first_token.to_string(),
                second_token.to_string(),
                router.to_string(),
                params.total_fee_percent.to_string(),
                params.special_fee_percent.to_string(),
            ],
        )?;
        let mut instance = PairInstance {
            address,
            router,
            first_token,
            second_token,
            total_fee_percent: params.total_fee_percent,
            special_fee_percent: params.special_fee_percent,
            lp_token: None,
            lp_roles_set: false,
            registered: false,
        };

        let ticker = params
            .lp_ticker
            .clone()
            .unwrap_or_else(|| derive_lp_ticker(&instance.first_token, &instance.second_token));
        let lp_token = session
            .issue(address, "issueLpToken", &ticker, &ticker, 18)
            .or_orphan(&instance)?;
        instance.lp_token = Some(lp_token);

        session
            .call(address, "setLpTokenLocalRoles", vec![])
            .or_orphan(&instance)?;
        instance.lp_roles_set = true;

        session
            .call(
                router,
                "registerPair",
                vec![
                    address.to_string(),
                    instance.first_token.to_string(),
                    instance.second_token.to_string(),
                ],
            )
            .or_orphan(&instance)?;
        instance.registered = true;

        Ok(instance)
    }

    fn activate(instance: &PairInstance, session: &mut Session<'_>) -> Result<(), ProvisionError> {
        session.call(instance.address, "resume", vec![])?;
        Ok(())
    }

    fn wrap(instance: PairInstance) -> InstanceRecord {
        InstanceRecord::Pair(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&PairInstance> {
        match record {
            InstanceRecord::Pair(instance) => Some(instance),
            _ => None,
        }
    }
}
