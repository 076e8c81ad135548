#![allow(dead_code)]

use std::collections::BTreeSet;

use keystone_core::config::DeployConfig;
use keystone_core::gateway::simulated::SimulatedNetwork;
use keystone_core::orchestrator::Orchestrator;
use keystone_core::spec::DeploySpec;
use keystone_core::status::RunSummary;
use keystone_core::store::RecordStore;
use keystone_core::types::{Address, InstanceKind};
use serde_json::{Value, json};
use tempfile::TempDir;

/// Deployment root with an artifact for every kind and fast polling.
pub struct Fixture {
    pub temp: TempDir,
    pub config: DeployConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let artifacts = temp.path().join("artifacts");
        std::fs::create_dir_all(&artifacts).unwrap();
        for kind in InstanceKind::CATALOG {
            std::fs::write(
                artifacts.join(format!("{}.wasm", kind.label())),
                format!("\0asm-{}", kind.label()),
            )
            .unwrap();
        }

        let mut config = DeployConfig::new();
        config.paths.root = temp.path().to_path_buf();
        config.polling.max_attempts = 3;
        config.polling.same_partition_delay_ms = 0;
        config.polling.cross_partition_delay_ms = 0;

        Self { temp, config }
    }

    /// Write the spec file and load it back through the normal path.
    pub fn spec(&self, value: Value) -> DeploySpec {
        let path = self.config.spec_path();
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        DeploySpec::load(&path).unwrap()
    }

    pub fn store(&self) -> RecordStore {
        RecordStore::new(self.config.state_dir())
    }

    pub fn run(&self, spec: &DeploySpec, network: &SimulatedNetwork) -> RunSummary {
        self.run_filtered(spec, network, None)
    }

    pub fn run_filtered(
        &self,
        spec: &DeploySpec,
        network: &SimulatedNetwork,
        filter: Option<&BTreeSet<InstanceKind>>,
    ) -> RunSummary {
        let mut orchestrator =
            Orchestrator::connect(&self.config, spec, network, network, deployer()).unwrap();
        orchestrator.run(filter)
    }
}

pub fn deployer() -> Address {
    Address::derive(b"keystone-test-deployer")
}

pub fn router_and_pairs() -> Value {
    json!({
        "tokens": { "count": 3, "ticker_prefix": "TST" },
        "router": [ {} ],
        "pair": [
            { "router": 0, "first_token": 0, "second_token": 1 },
            { "router": 0, "first_token": 0, "second_token": 2 }
        ]
    })
}

/// One or more instances of every kind in the catalog.
pub fn full_catalog() -> Value {
    json!({
        "tokens": { "count": 3, "ticker_prefix": "TST" },
        "router": [ {} ],
        "pair": [
            { "router": 0, "first_token": 0, "second_token": 1 },
            { "router": 0, "first_token": 0, "second_token": 2 }
        ],
        "simple_lock": [ {} ],
        "fees_collector": [ { "simple_lock": 0, "known_tokens": [0, 1] } ],
        "farm": [ { "pair": 0, "reward_token": 0 } ],
        "staking": [ { "staking_token": 0 } ],
        "proxy_dex": [ { "simple_lock": 0, "pairs": [0, 1], "farms": [0] } ],
        "metastaking": [ { "farm": 0, "staking": 0, "pair": 0 } ],
        "price_discovery": [
            { "launched_token": 1, "accepted_token": 0, "start_block": 10, "end_block": 100 }
        ]
    })
}
