//! Router: registry of pairs. No dependencies.

use serde::{Deserialize, Serialize};

use super::{Blueprint, Failure, InstanceRecord, OrOrphan, References, Resolved};
use crate::session::Session;
use crate::types::{Address, InstanceKind};

pub struct Router;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInstance {
    pub address: Address,
    pub pair_creation_enabled: bool,
}

impl Blueprint for Router {
    const KIND: InstanceKind = InstanceKind::Router;

    type Params = RouterParams;
    type Instance = RouterInstance;

    fn references(_params: &RouterParams) -> References {
        References::new()
    }

    fn provision(
        _params: &RouterParams,
        _deps: &Resolved,
        session: &mut Session<'_>,
    ) -> Result<RouterInstance, Failure<RouterInstance>> {
        let address = session.deploy(Self::KIND, vec![])?;
        let mut instance = RouterInstance {
            address,
            pair_creation_enabled: false,
        };

        session
            .call(address, "setPairCreationEnabled", vec!["true".to_string()])
            .or_orphan(&instance)?;
        instance.pair_creation_enabled = true;

        Ok(instance)
    }

    fn wrap(instance: RouterInstance) -> InstanceRecord {
        InstanceRecord::Router(instance)
    }

    fn unwrap(record: &InstanceRecord) -> Option<&RouterInstance> {
        match record {
            InstanceRecord::Router(instance) => Some(instance),
            _ => None,
        }
    }
}
