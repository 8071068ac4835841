//! Service start/stop against the mock ePO server.

use epo_remote_bridge::fabric::{Fabric, InMemoryFabric};
use epo_remote_bridge::{BridgeError, EpoService, ServiceState};

use crate::support::{closed_port, plain_http, write_config, Harness, MockEpo, TEST_GUID, WAIT};

#[test]
fn discovers_unique_id_and_registers_topic() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    assert_eq!(harness.service.state(), ServiceState::Running);
    assert_eq!(
        harness.fabric.topics(),
        vec![format!("/mcafee/service/epo/remote/{}", TEST_GUID)]
    );
    let registry = harness.service.registry().unwrap();
    let endpoint = registry.get(&harness.topic()).unwrap();
    assert_eq!(endpoint.name(), "testEpo1");
    assert_eq!(endpoint.unique_id(), TEST_GUID);
}

#[test]
fn configured_unique_id_skips_discovery() {
    let mock = MockEpo::start();
    let harness = Harness::start_with(&mock, Default::default(), "uniqueId = \"{configured}\"");

    assert_eq!(mock.command_requests(), 0);
    assert_eq!(
        harness.fabric.topics(),
        vec!["/mcafee/service/epo/remote/{configured}".to_string()]
    );
}

#[test]
fn unreachable_backend_aborts_start() {
    let port = closed_port();

    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), port, "");
    let fabric = InMemoryFabric::new(Default::default());
    let service = EpoService::new(dir.path(), fabric.clone()).with_transport_factory(plain_http);

    let err = service.start().unwrap_err();
    assert!(matches!(err, BridgeError::Transport(ref m) if m.contains("testEpo1")));
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(!fabric.is_connected());
}

#[test]
fn stop_unregisters_and_requests_stop_flowing() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);
    let topic = harness.topic();

    harness.service.stop().unwrap();
    harness.service.stop().unwrap();

    assert_eq!(harness.service.state(), ServiceState::Stopped);
    assert!(harness.fabric.topics().is_empty());
    assert!(harness
        .fabric
        .request(&topic, r#"{"command":"core.help"}"#, WAIT)
        .is_err());
}

#[test]
fn dropping_service_disconnects_fabric() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);
    let fabric = harness.fabric.clone();
    assert!(fabric.is_connected());

    drop(harness);
    assert!(!fabric.is_connected());
}
