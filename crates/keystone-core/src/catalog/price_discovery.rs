//! Price discovery: launch mechanism issuing redeem tokens for deposits.

use serde::{Deserialize, Serialize};

use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved, check_ticker};
use crate::session::Session;
use crate::types::{Address, InstanceKind, TokenId, TokenRef};

pub struct PriceDiscovery;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriceDiscoveryParams {
    pub launched_token: TokenRef,
    pub accepted_token: TokenRef,
    pub start_block: u64,
    pub end_block: u64,
    #[serde(default = "default_redeem_ticker")]
    pub redeem_ticker: String,
}

fn default_redeem_ticker() -> String {
    "REDEEM".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDiscoveryInstance {
    pub address: Address,
    pub launched_token: TokenId,
    pub accepted_token: TokenId,
    pub start_block: u64,
    pub end_block: u64,
    #[serde(default)]
    pub redeem_token: Option<TokenId>,
    #[serde(default)]
    pub initial_redeem_tokens_created: bool,
}

impl Blueprint for PriceDiscovery {
    const KIND: InstanceKind = InstanceKind::PriceDiscovery;

    type Params = PriceDiscoveryParams;
    type Instance = PriceDiscoveryInstance;

    fn references(params: &PriceDiscoveryParams) -> References {
        References::new()
            .token(&params.launched_token)
            .token(&params.accepted_token)
    }

    fn validate(params: &PriceDiscoveryParams) -> Result<(), String> {
        if params.end_block <= params.start_block {
            return Err("end_block must be after start_block".to_string());
        }
        check_ticker("redeem_ticker", &params.redeem_ticker)
    }

    fn provision(
        params: &PriceDiscoveryParams,
        _deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<PriceDiscoveryInstance, Failure<PriceDiscoveryInstance>> {
        let launched_token = session.token(&params.launched_token)?;
        let accepted_token = session.token(&params.accepted_token)?;

        let address = session.deploy(
            Self::KIND,
            vec![
                launched_token.to_string(),
                accepted_token.to_string(),
                params.start_block.to_string(),
                params.end_block.to_string(),
            ],
        )?;
        let mut instance = PriceDiscoveryInstance {
            address,
            launched_token,
            accepted_token,
            start_block: params.start_block,
            end_block: params.end_block,
            redeem_token: None,
            initial_redeem_tokens_created: false,
        };

        let token = session
            .issue(
                address,
                "issueRedeemToken",
                &params.redeem_ticker,
                &params.redeem_ticker,
                18,
            )
            .or_orphan(&instance)?;
        instance.redeem_token = Some(token);

        session
            .call(address, "createInitialRedeemTokens", vec![])
            .or_orphan(&instance)?;
        instance.initial_redeem_tokens_created = true;

        Ok(instance)
    }

    fn wrap(instance: PriceDiscoveryInstance) -> InstanceRecord {
        InstanceRecord::PriceDiscovery(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&PriceDiscoveryInstance> {
        match record {
            InstanceRecord::PriceDiscovery(instance) => Some(instance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_window_validated() {
        let params: PriceDiscoveryParams = serde_json::from_value(json!({
            "launched_token": 0,
            "accepted_token": 1,
            "start_block": 100,
            "end_block": 100
        }))
        .unwrap();
        assert!(PriceDiscovery::validate(&params).is_err());
    }
}
