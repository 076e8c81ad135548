mod support;

use std::collections::BTreeSet;

use keystone_core::catalog::InstanceRecord;
use keystone_core::gateway::ActionKind;
use keystone_core::gateway::simulated::{Fault, Selector, SimulatedNetwork};
use keystone_core::group::Origin;
use keystone_core::orchestrator::WiringStatus;
use keystone_core::status::GroupSummary;
use keystone_core::types::InstanceKind;
use serde_json::json;

use support::{Fixture, deployer, full_catalog, router_and_pairs};

fn group(summary: &keystone_core::status::RunSummary, kind: InstanceKind) -> &GroupSummary {
    summary.groups.iter().find(|g| g.kind == kind).unwrap()
}

#[test]
fn router_and_two_pairs_from_scratch() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();

    let summary = fixture.run(&spec, &network);

    assert!(summary.is_complete());
    assert_eq!(summary.tokens.available, 3);
    assert_eq!(summary.tokens.minted, 3);
    assert_eq!(group(&summary, InstanceKind::Router).ready, 1);
    assert_eq!(group(&summary, InstanceKind::Pair).ready, 2);
    assert_eq!(group(&summary, InstanceKind::Pair).origin, Origin::Fresh);

    let store = fixture.store();
    let tokens = store.load_tokens().unwrap();
    let routers = store.load(InstanceKind::Router).unwrap();
    let pairs = store.load(InstanceKind::Pair).unwrap();
    assert_eq!(routers.len(), 1);
    assert_eq!(pairs.len(), 2);

    let InstanceRecord::Pair(second) = &pairs[1] else {
        panic!("expected a pair record");
    };
    assert_eq!(second.router, routers[0].address());
    assert_eq!(second.first_token, tokens[0]);
    assert_eq!(second.second_token, tokens[2]);
    assert!(second.lp_token.is_some());
    assert!(second.registered);
}

#[test]
fn second_run_reuses_everything_without_submitting() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();

    fixture.run(&spec, &network);
    let accepted = network.accepted().len();
    let requests = network.request_count();
    let pairs = fixture.store().load(InstanceKind::Pair).unwrap();

    let summary = fixture.run(&spec, &network);

    assert!(summary.is_complete());
    assert_eq!(network.accepted().len(), accepted);
    // Only the sequence-number sync reaches the network.
    assert_eq!(network.request_count(), requests + 1);
    assert_eq!(summary.sequence.accepted, 0);
    assert!(
        summary
            .groups
            .iter()
            .all(|g| g.origin == Origin::Reused)
    );
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap(), pairs);
}

#[test]
fn count_mismatch_provisions_group_fresh() {
    let fixture = Fixture::new();
    let network = SimulatedNetwork::new();
    fixture.run(&fixture.spec(router_and_pairs()), &network);
    let routers = fixture.store().load(InstanceKind::Router).unwrap();

    let spec = fixture.spec(json!({
        "tokens": { "count": 3, "ticker_prefix": "TST" },
        "router": [ {} ],
        "pair": [
            { "router": 0, "first_token": 0, "second_token": 1 },
            { "router": 0, "first_token": 0, "second_token": 2 },
            { "router": 0, "first_token": 1, "second_token": 2 }
        ]
    }));
    let summary = fixture.run(&spec, &network);

    assert!(summary.is_complete());
    assert_eq!(group(&summary, InstanceKind::Router).origin, Origin::Reused);
    assert_eq!(group(&summary, InstanceKind::Pair).origin, Origin::Fresh);
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap().len(), 3);
    assert_eq!(fixture.store().load(InstanceKind::Router).unwrap(), routers);
}

#[test]
fn rejected_deploy_persists_partial_group() {
    let fixture = Fixture::new();
    let spec = fixture.spec(json!({
        "tokens": { "count": 3, "ticker_prefix": "TST" },
        "router": [ {} ],
        "pair": [
            { "router": 0, "first_token": 0, "second_token": 1 },
            { "router": 0, "first_token": 0, "second_token": 2 },
            { "router": 0, "first_token": 1, "second_token": 2 }
        ]
    }));
    let network = SimulatedNetwork::new();
    // Router is the first deployment, so this hits the second pair.
    network.inject(Selector::Deploy(3), Fault::Reject);

    let summary = fixture.run(&spec, &network);

    let pairs = group(&summary, InstanceKind::Pair);
    assert_eq!(pairs.ready, 1);
    assert_eq!(pairs.shortfall(), 2);
    assert!(pairs.error.is_some());
    assert!(!summary.is_complete());
    assert_eq!(summary.sequence.rejected, 1);
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap().len(), 1);

    // Next run: count mismatch, so the whole group is provisioned again.
    network.clear_faults();
    let summary = fixture.run(&spec, &network);
    assert!(summary.is_complete());
    assert_eq!(group(&summary, InstanceKind::Router).origin, Origin::Reused);
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap().len(), 3);
}

#[test]
fn failed_initialization_keeps_orphan_until_fresh() {
    let mut fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();
    network.inject(
        Selector::Endpoint("registerPair".to_string(), 2),
        Fault::FailExecution,
    );

    let summary = fixture.run(&spec, &network);
    let pairs = group(&summary, InstanceKind::Pair);
    assert_eq!(pairs.ready, 1);
    assert_eq!(pairs.orphaned, 1);
    assert!(!summary.is_complete());

    let persisted = fixture.store().load_persisted(InstanceKind::Pair).unwrap();
    assert_eq!(persisted.records.len(), 2);
    assert_eq!(persisted.orphans, BTreeSet::from([1]));
    let InstanceRecord::Pair(orphan) = &persisted.records[1] else {
        panic!("expected a pair record");
    };
    assert!(orphan.lp_roles_set);
    assert!(!orphan.registered);

    // The orphan is never activated.
    let resumed: Vec<_> = network
        .accepted()
        .into_iter()
        .filter(|a| a.kind.endpoint() == Some("resume"))
        .filter_map(|a| a.kind.target())
        .collect();
    assert_eq!(resumed, vec![persisted.records[0].address()]);

    // Counts match, so the group is reused and still short.
    network.clear_faults();
    let summary = fixture.run(&spec, &network);
    assert_eq!(group(&summary, InstanceKind::Pair).origin, Origin::Reused);
    assert_eq!(group(&summary, InstanceKind::Pair).orphaned, 1);
    assert!(!summary.is_complete());

    fixture.config.reuse.fresh.insert(InstanceKind::Pair);
    let summary = fixture.run(&spec, &network);
    assert!(summary.is_complete());
    assert!(
        fixture
            .store()
            .load_persisted(InstanceKind::Pair)
            .unwrap()
            .orphans
            .is_empty()
    );
}

#[test]
fn failed_group_only_affects_its_dependents() {
    let fixture = Fixture::new();
    let spec = fixture.spec(full_catalog());
    let network = SimulatedNetwork::new();
    // Deployments: router, pair, pair, simple_lock.
    network.inject(Selector::Deploy(4), Fault::Reject);

    let summary = fixture.run(&spec, &network);

    assert_eq!(group(&summary, InstanceKind::SimpleLock).ready, 0);
    for kind in [InstanceKind::FeesCollector, InstanceKind::ProxyDex] {
        let dependent = group(&summary, kind);
        assert_eq!(dependent.ready, 0, "{}", kind);
        assert!(
            dependent.error.as_deref().unwrap().contains("simple_lock[0]"),
            "{}",
            kind
        );
    }
    for kind in [
        InstanceKind::Router,
        InstanceKind::Pair,
        InstanceKind::Farm,
        InstanceKind::Staking,
        InstanceKind::Metastaking,
        InstanceKind::PriceDiscovery,
    ] {
        let unaffected = group(&summary, kind);
        assert_eq!(unaffected.shortfall(), 0, "{}", kind);
        assert!(unaffected.error.is_none(), "{}", kind);
    }

    // Only four deployments were attempted before the failure; the rest come
    // from independent groups.
    let deploys = network
        .accepted()
        .iter()
        .filter(|a| matches!(a.kind, ActionKind::Deploy { .. }))
        .count();
    assert_eq!(deploys, 3 + 4);
    assert!(summary.failed_wiring().count() > 0);
}

#[test]
fn dependencies_resolve_to_earlier_instances() {
    let fixture = Fixture::new();
    let spec = fixture.spec(full_catalog());
    let network = SimulatedNetwork::new();

    let summary = fixture.run(&spec, &network);
    assert!(summary.is_complete());

    let store = fixture.store();
    let pairs = store.load(InstanceKind::Pair).unwrap();
    let locks = store.load(InstanceKind::SimpleLock).unwrap();
    let farms = store.load(InstanceKind::Farm).unwrap();
    let staking = store.load(InstanceKind::Staking).unwrap();

    let InstanceRecord::Pair(pair) = &pairs[0] else {
        panic!("expected a pair record");
    };
    let InstanceRecord::SimpleLock(lock) = &locks[0] else {
        panic!("expected a simple_lock record");
    };
    let InstanceRecord::Farm(farm) = &farms[0] else {
        panic!("expected a farm record");
    };
    assert_eq!(farm.pair, pair.address);
    assert_eq!(Some(&farm.farming_token), pair.lp_token.as_ref());

    let collectors = store.load(InstanceKind::FeesCollector).unwrap();
    let InstanceRecord::FeesCollector(collector) = &collectors[0] else {
        panic!("expected a fees_collector record");
    };
    assert_eq!(collector.simple_lock, lock.address);
    assert_eq!(Some(&collector.locked_token), lock.locked_token.as_ref());

    let proxies = store.load(InstanceKind::ProxyDex).unwrap();
    let InstanceRecord::ProxyDex(proxy) = &proxies[0] else {
        panic!("expected a proxy_dex record");
    };
    assert_eq!(
        proxy.intermediated_pairs,
        vec![pairs[0].address(), pairs[1].address()]
    );
    assert_eq!(proxy.intermediated_farms, vec![farm.address]);

    let metastaking = store.load(InstanceKind::Metastaking).unwrap();
    let InstanceRecord::Metastaking(meta) = &metastaking[0] else {
        panic!("expected a metastaking record");
    };
    assert_eq!(meta.farm, farm.address);
    assert_eq!(meta.staking, staking[0].address());
    assert_eq!(meta.pair, pair.address);
    assert_eq!(meta.whitelisted_by, vec![farm.address, staking[0].address()]);
}

#[test]
fn wiring_runs_after_fresh_provisioning() {
    let fixture = Fixture::new();
    let spec = fixture.spec(full_catalog());
    let network = SimulatedNetwork::new();

    let summary = fixture.run(&spec, &network);

    let calls: Vec<_> = summary
        .wiring
        .iter()
        .map(|r| match r.status {
            WiringStatus::Applied { calls } => calls,
            _ => panic!("step {} not applied: {:?}", r.step, r.status),
        })
        .collect();
    assert_eq!(calls, vec![2, 2, 3, 2]);

    let collector = fixture.store().load(InstanceKind::FeesCollector).unwrap()[0].address();
    let fee_targets: BTreeSet<_> = network
        .accepted()
        .iter()
        .filter(|a| a.kind.endpoint() == Some("setFeeOn"))
        .filter_map(|a| a.kind.target())
        .collect();
    let pairs: BTreeSet<_> = fixture
        .store()
        .load(InstanceKind::Pair)
        .unwrap()
        .iter()
        .map(InstanceRecord::address)
        .collect();
    assert_eq!(fee_targets, pairs);
    assert!(!pairs.contains(&collector));

    // Nothing fresh on the second run, so nothing is wired again.
    let summary = fixture.run(&spec, &network);
    assert!(
        summary
            .wiring
            .iter()
            .all(|r| matches!(r.status, WiringStatus::Skipped { .. }))
    );
}

#[test]
fn sequence_numbers_advance_once_per_accepted_action() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new().with_initial_nonce(7);
    network.inject(Selector::Deploy(2), Fault::Reject);

    let summary = fixture.run(&spec, &network);
    let sequence = summary.sequence;

    assert_eq!(sequence.initial, 7);
    assert_eq!(sequence.current, sequence.initial + sequence.accepted);
    assert_eq!(sequence.rejected, 1);
    assert_eq!(network.nonce_of(&deployer()), sequence.current);

    let nonces: Vec<u64> = network.accepted().iter().map(|a| a.nonce).collect();
    let expected: Vec<u64> = (7..sequence.current).collect();
    assert_eq!(nonces, expected);
}

#[test]
fn action_never_included_times_out() {
    let fixture = Fixture::new();
    let spec = fixture.spec(json!({ "router": [ {} ] }));
    let network = SimulatedNetwork::new();
    network.inject(Selector::Deploy(1), Fault::NeverInclude);

    let summary = fixture.run(&spec, &network);

    let router = group(&summary, InstanceKind::Router);
    assert_eq!(router.ready, 0);
    assert!(router.error.is_some());
    // The submission was accepted, so its sequence number is spent.
    assert_eq!(summary.sequence.accepted, 1);
    assert_eq!(summary.sequence.current, summary.sequence.initial + 1);
    assert!(fixture.store().load(InstanceKind::Router).unwrap().is_empty());
}

#[test]
fn filtered_out_groups_stay_on_disk_and_resolve() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();

    let only_router = BTreeSet::from([InstanceKind::Router]);
    let summary = fixture.run_filtered(&spec, &network, Some(&only_router));
    assert!(summary.is_complete());
    assert_eq!(group(&summary, InstanceKind::Pair).origin, Origin::Skipped);
    assert!(!fixture.store().record_path(InstanceKind::Pair).exists());

    let only_pair = BTreeSet::from([InstanceKind::Pair]);
    let summary = fixture.run_filtered(&spec, &network, Some(&only_pair));
    assert!(summary.is_complete());
    assert_eq!(group(&summary, InstanceKind::Router).origin, Origin::Skipped);
    assert_eq!(group(&summary, InstanceKind::Pair).ready, 2);

    let router = fixture.store().load(InstanceKind::Router).unwrap()[0].address();
    for record in fixture.store().load(InstanceKind::Pair).unwrap() {
        let InstanceRecord::Pair(pair) = record else {
            panic!("expected a pair record");
        };
        assert_eq!(pair.router, router);
    }
}

#[test]
fn unreadable_record_file_is_provisioned_fresh() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();
    fixture.run(&spec, &network);

    std::fs::write(fixture.store().record_path(InstanceKind::Pair), "{ not json").unwrap();
    let summary = fixture.run(&spec, &network);

    assert!(summary.is_complete());
    assert_eq!(group(&summary, InstanceKind::Pair).origin, Origin::Fresh);
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap().len(), 2);
}

#[test]
fn force_activate_reactivates_reused_groups() {
    let mut fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let network = SimulatedNetwork::new();
    fixture.run(&spec, &network);
    let before = network.accepted().len();

    fixture.config.reuse.force_activate = true;
    let summary = fixture.run(&spec, &network);

    assert!(summary.is_complete());
    let activated: Vec<_> = network.accepted()[before..]
        .iter()
        .map(|a| a.kind.endpoint().unwrap_or_default().to_string())
        .collect();
    assert_eq!(activated, vec!["resume", "resume"]);
}

#[test]
fn token_phase_picks_up_existing_holdings() {
    let fixture = Fixture::new();
    let spec = fixture.spec(json!({ "tokens": { "count": 2, "ticker_prefix": "TST" } }));
    let network = SimulatedNetwork::new();
    network.grant_tokens(deployer(), vec!["TST0-00000a".parse().unwrap()]);

    let summary = fixture.run(&spec, &network);

    // Nothing was persisted, so both are minted; the granted one is merged in.
    assert_eq!(summary.tokens.minted, 2);
    assert_eq!(summary.tokens.available, 3);
    let tokens = fixture.store().load_tokens().unwrap();
    assert!(tokens.iter().any(|t| t.as_str() == "TST0-00000a"));
    assert_eq!(tokens.last().unwrap().ticker(), "TST1");
}

#[test]
fn failed_wiring_step_does_not_stop_later_steps() {
    let fixture = Fixture::new();
    let spec = fixture.spec(full_catalog());
    let network = SimulatedNetwork::new();
    network.inject(
        Selector::Endpoint("setFeeOn".to_string(), 1),
        Fault::FailExecution,
    );

    let summary = fixture.run(&spec, &network);

    assert_eq!(summary.wiring[0].step, "pair-fee-destination");
    assert!(matches!(summary.wiring[0].status, WiringStatus::Failed { .. }));
    let later: Vec<_> = summary.wiring[1..].iter().map(|r| r.status.clone()).collect();
    assert_eq!(
        later,
        vec![
            WiringStatus::Applied { calls: 2 },
            WiringStatus::Applied { calls: 3 },
            WiringStatus::Applied { calls: 2 },
        ]
    );
    assert_eq!(summary.failed_wiring().count(), 1);
    // Groups themselves are unaffected.
    assert!(summary.groups.iter().all(|g| g.shortfall() == 0));
}

#[test]
fn failed_wiring_step_is_retried_on_the_next_run() {
    let fixture = Fixture::new();
    let spec = fixture.spec(full_catalog());
    let network = SimulatedNetwork::new();
    network.inject(
        Selector::Endpoint("setFeeOn".to_string(), 1),
        Fault::FailExecution,
    );

    fixture.run(&spec, &network);
    let pending = fixture.store().load_wiring().unwrap();
    assert_eq!(pending, BTreeSet::from(["pair-fee-destination".to_string()]));

    network.clear_faults();
    let before = network.accepted().len();
    let summary = fixture.run(&spec, &network);

    // Every group is reused, yet the pending step runs again in full.
    assert!(summary.groups.iter().all(|g| g.origin == Origin::Reused));
    assert_eq!(summary.wiring[0].status, WiringStatus::Applied { calls: 2 });
    assert!(
        summary.wiring[1..]
            .iter()
            .all(|r| matches!(r.status, WiringStatus::Skipped { .. }))
    );
    let retried = network.accepted()[before..]
        .iter()
        .filter(|a| a.kind.endpoint() == Some("setFeeOn"))
        .count();
    assert_eq!(retried, 2);
    assert!(fixture.store().load_wiring().unwrap().is_empty());

    // Nothing left to retry.
    let summary = fixture.run(&spec, &network);
    assert!(
        summary
            .wiring
            .iter()
            .all(|r| matches!(r.status, WiringStatus::Skipped { .. }))
    );
    assert!(summary.is_complete());
}
