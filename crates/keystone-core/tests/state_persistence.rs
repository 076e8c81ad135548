mod support;

use keystone_core::gateway::simulated::SimulatedNetwork;
use keystone_core::orchestrator::Orchestrator;
use keystone_core::status::RunSummary;
use keystone_core::store::RecordStore;
use keystone_core::types::InstanceKind;

use support::{Fixture, deployer, router_and_pairs};

fn pair_activations(network: &SimulatedNetwork) -> usize {
    network
        .accepted()
        .iter()
        .filter(|a| a.kind.endpoint() == Some("resume"))
        .count()
}

fn group_save_error(summary: &RunSummary, kind: InstanceKind) -> Option<&str> {
    summary
        .groups
        .iter()
        .find(|g| g.kind == kind)
        .and_then(|g| g.save_error.as_deref())
}

#[test]
fn unwritable_state_dir_fails_before_submitting() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    std::fs::write(fixture.config.state_dir(), "not a directory").unwrap();
    let network = SimulatedNetwork::new();

    let connected = Orchestrator::connect(&fixture.config, &spec, &network, &network, deployer());

    assert!(connected.is_err());
    assert!(network.accepted().is_empty());
    assert_eq!(network.request_count(), 0);
}

#[test]
fn failed_record_save_is_reported_and_later_phases_still_run() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let store = fixture.store();
    std::fs::create_dir_all(store.record_path(InstanceKind::Pair)).unwrap();
    let network = SimulatedNetwork::new();

    let summary = fixture.run(&spec, &network);

    assert!(group_save_error(&summary, InstanceKind::Pair).is_some());
    assert!(group_save_error(&summary, InstanceKind::Router).is_none());
    assert!(!summary.is_complete());
    assert_eq!(summary.save_errors().count(), 1);

    // Provisioning itself succeeded and activation went ahead.
    let pair = summary.groups.iter().find(|g| g.kind == InstanceKind::Pair).unwrap();
    assert_eq!(pair.ready, 2);
    assert_eq!(pair_activations(&network), 2);

    // The other groups and the tokens reached disk; no temp files linger.
    assert_eq!(store.load(InstanceKind::Router).unwrap().len(), 1);
    assert_eq!(store.load_tokens().unwrap().len(), 3);
    let leftovers = std::fs::read_dir(store.dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn failed_token_save_is_reported_and_groups_still_provision() {
    let fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    std::fs::create_dir_all(fixture.config.state_dir().join("tokens.json")).unwrap();
    let network = SimulatedNetwork::new();

    let summary = fixture.run(&spec, &network);

    assert!(summary.tokens.save_error.is_some());
    assert_eq!(summary.tokens.available, 3);
    assert!(!summary.is_complete());
    assert_eq!(fixture.store().load(InstanceKind::Pair).unwrap().len(), 2);
}

#[test]
fn simulated_runs_keep_their_own_state() {
    let mut fixture = Fixture::new();
    let spec = fixture.spec(router_and_pairs());
    let real_state = fixture.config.state_dir();
    fixture.config = fixture.config.clone().simulated();

    let summary = fixture.run(&spec, &SimulatedNetwork::new());

    assert!(summary.is_complete());
    assert!(!real_state.exists());
    let simulated = RecordStore::new(fixture.temp.path().join("state-simulated"));
    assert_eq!(simulated.load(InstanceKind::Pair).unwrap().len(), 2);
    assert_eq!(simulated.load_tokens().unwrap().len(), 3);
}
