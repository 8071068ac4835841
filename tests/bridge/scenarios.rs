//! End-to-end request scenarios through the in-memory fabric.

use std::thread;
use std::time::Duration;

use epo_remote_bridge::config::FabricConfig;
use epo_remote_bridge::fabric::{FabricError, InMemoryFabric};
use epo_remote_bridge::{request_topic, EpoService};
use serde_json::Value;

use crate::support::{
    closed_port, plain_http, system_find_payload, write_config, Harness, MockEpo,
    TEST_SECURITY_TOKEN, WAIT,
};

#[test]
fn core_help_lists_system_find() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"core.help","output":"json"}"#, WAIT)
        .unwrap();

    assert!(!response.is_error(), "{:?}", response.error_message());
    assert!(response.payload_str().unwrap().contains("system.find"));
}

#[test]
fn system_find_returns_backend_json_unchanged() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    let response = harness
        .fabric
        .request(
            &harness.topic(),
            r#"{"command":"system.find","output":"json","params":{"searchText":"Linux"}}"#,
            WAIT,
        )
        .unwrap();

    let decoded: Value = serde_json::from_slice(response.payload().unwrap()).unwrap();
    assert_eq!(decoded, system_find_payload());
    assert_eq!(decoded.as_array().unwrap().len(), 2);

    let query = mock.last_query();
    assert_eq!(query["searchText"], "Linux");
    assert_eq!(query[":output"], "json");
    assert_eq!(query["orion.user.security.token"], TEST_SECURITY_TOKEN);
    assert!(mock.last_authorization().unwrap().starts_with("Basic "));
}

#[test]
fn missing_command_is_rejected_without_backend_call() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);
    let tokens_after_start = mock.token_requests();
    let commands_after_start = mock.command_requests();

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"output":"json"}"#, WAIT)
        .unwrap();

    assert!(response.is_error());
    assert!(response.error_message().unwrap().contains("command"));
    assert_eq!(mock.token_requests(), tokens_after_start);
    assert_eq!(mock.command_requests(), commands_after_start);
}

#[test]
fn unknown_command_reports_code_and_message() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"bogus.cmd"}"#, WAIT)
        .unwrap();

    let message = response.error_message().unwrap();
    assert!(message.contains('1'));
    assert!(message.contains("No such command: bogus.cmd"));
    assert_eq!(response.error_code(), Some(1));
}

#[test]
fn every_request_fetches_its_own_token() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);
    let baseline = mock.token_requests();

    for _ in 0..2 {
        let response = harness
            .fabric
            .request(&harness.topic(), r#"{"command":"core.help"}"#, WAIT)
            .unwrap();
        assert!(!response.is_error());
    }

    assert_eq!(mock.token_requests(), baseline + 2);
}

#[test]
fn malformed_payloads_each_get_one_error_reply() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    for payload in [
        "not json at all",
        "{}",
        r#"{"command":"core.help","params":["a"]}"#,
        r#"{"command":"core.help","output":"yaml"}"#,
    ] {
        let response = harness.fabric.request(&harness.topic(), payload, WAIT).unwrap();
        assert!(response.is_error(), "payload {payload} should fail");
    }

    // The service keeps answering afterwards.
    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"core.help"}"#, WAIT)
        .unwrap();
    assert!(!response.is_error());
}

#[test]
fn garbled_backend_response_is_protocol_error() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"test.garbled"}"#, WAIT)
        .unwrap();
    assert!(response.error_message().unwrap().contains("protocol error"));
}

#[test]
fn other_topics_are_not_routed_to_backend() {
    let mock = MockEpo::start();
    let harness = Harness::start(&mock);
    let commands_after_start = mock.command_requests();

    let response = harness
        .fabric
        .request(
            "/mcafee/service/epo/remote/{someone-else}",
            r#"{"command":"core.help"}"#,
            WAIT,
        )
        .unwrap();

    assert!(response.is_error());
    assert_eq!(mock.command_requests(), commands_after_start);
}

/// A slow backend holds the worker that called it; with a single worker,
/// later requests queue behind it.
#[test]
fn slow_backend_blocks_single_worker() {
    let mock = MockEpo::start();
    let harness = Harness::start_with(
        &mock,
        FabricConfig {
            thread_pool_size: 1,
            queue_size: 8,
        },
        "",
    );

    let fabric = harness.fabric.clone();
    let topic = harness.topic();
    let slow = thread::spawn(move || fabric.request(&topic, r#"{"command":"test.slow"}"#, WAIT));
    thread::sleep(Duration::from_millis(200));

    let starved = harness.fabric.request(
        &harness.topic(),
        r#"{"command":"core.help"}"#,
        Duration::from_millis(300),
    );
    assert!(matches!(starved, Err(FabricError::Timeout)));
    assert_eq!(slow.join().unwrap().unwrap().payload_str(), Some("slow"));
}

#[test]
fn more_workers_isolate_slow_backend_calls() {
    let mock = MockEpo::start();
    let harness = Harness::start_with(
        &mock,
        FabricConfig {
            thread_pool_size: 2,
            queue_size: 8,
        },
        "",
    );

    let fabric = harness.fabric.clone();
    let topic = harness.topic();
    let slow = thread::spawn(move || fabric.request(&topic, r#"{"command":"test.slow"}"#, WAIT));
    thread::sleep(Duration::from_millis(200));

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"core.help"}"#, Duration::from_secs(1))
        .unwrap();
    assert!(!response.is_error());
    assert!(!slow.join().unwrap().unwrap().is_error());
}

#[test]
fn unreachable_backend_reply_names_the_cause() {
    let dir = tempfile::tempdir().unwrap();
    write_config(dir.path(), closed_port(), "uniqueId = \"{offline}\"");
    let fabric = InMemoryFabric::new(FabricConfig::default());
    let service = EpoService::new(dir.path(), fabric.clone()).with_transport_factory(plain_http);
    service.start().unwrap();

    let response = fabric
        .request(&request_topic("{offline}"), r#"{"command":"core.help"}"#, WAIT)
        .unwrap();

    let message = response.error_message().unwrap();
    assert!(message.starts_with("transport error:"), "{message}");
    assert!(message.to_lowercase().contains("refused"), "{message}");
    assert_eq!(response.error_code(), Some(0));
}
