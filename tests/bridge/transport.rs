//! `RemoteCommandClient` over real HTTP against the mock server.

use std::collections::BTreeMap;

use epo_remote_bridge::config::{BackendConfig, TlsPolicy};
use epo_remote_bridge::remote::{HttpTransport, OutputFormat, RemoteCommandClient};
use epo_remote_bridge::BridgeError;

use crate::support::{closed_port, MockEpo, TEST_GUID, TEST_PASSWORD, TEST_USER};

fn client_for(mock: &MockEpo) -> RemoteCommandClient {
    let backend = BackendConfig {
        name: "testEpo1".into(),
        host: "127.0.0.1".into(),
        port: mock.port(),
        user: TEST_USER.into(),
        password: TEST_PASSWORD.into(),
        unique_id: None,
        tls: TlsPolicy::Disabled,
        timeout: None,
    };
    RemoteCommandClient::new(HttpTransport::with_base_url(mock.base_url(), &backend).unwrap())
}

#[test]
fn invoke_command_returns_trimmed_body() {
    let mock = MockEpo::start();
    let client = client_for(&mock);

    let body = client
        .invoke_command("core.help", &BTreeMap::new(), OutputFormat::Verbose)
        .unwrap();
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("core.help"));
    assert!(text.ends_with("Finds systems in the System Tree"));
    assert_eq!(mock.last_query()[":output"], "verbose");
}

#[test]
fn lookup_unique_id_over_http() {
    let mock = MockEpo::start();
    assert_eq!(client_for(&mock).lookup_unique_id().unwrap(), TEST_GUID);
}

#[test]
fn sequential_invocations_fetch_two_tokens() {
    let mock = MockEpo::start();
    let client = client_for(&mock);

    client
        .invoke_command("core.help", &BTreeMap::new(), OutputFormat::Json)
        .unwrap();
    client
        .invoke_command("core.help", &BTreeMap::new(), OutputFormat::Json)
        .unwrap();
    assert_eq!(mock.token_requests(), 2);
}

#[test]
fn caller_cannot_override_token_or_output() {
    let mock = MockEpo::start();
    let client = client_for(&mock);

    let mut params = BTreeMap::new();
    params.insert("orion.user.security.token".to_string(), "forged".to_string());
    params.insert(":output".to_string(), "xml".to_string());
    client
        .invoke_command("core.help", &params, OutputFormat::Terse)
        .unwrap();

    let query = mock.last_query();
    assert_eq!(query[":output"], "terse");
    assert_ne!(query["orion.user.security.token"], "forged");
}

#[test]
fn remote_error_is_typed() {
    let mock = MockEpo::start();
    let err = client_for(&mock)
        .invoke_command("bogus.cmd", &BTreeMap::new(), OutputFormat::Json)
        .unwrap_err();
    match err {
        BridgeError::RemoteCommand { code, message } => {
            assert_eq!(code, 1);
            assert_eq!(message, "No such command: bogus.cmd");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn connection_refused_is_transport_error_with_cause() {
    let port = closed_port();

    let backend = BackendConfig {
        name: "gone".into(),
        host: "127.0.0.1".into(),
        port,
        user: TEST_USER.into(),
        password: TEST_PASSWORD.into(),
        unique_id: None,
        tls: TlsPolicy::Disabled,
        timeout: None,
    };
    let client = RemoteCommandClient::new(
        HttpTransport::with_base_url(format!("http://127.0.0.1:{}/remote", port), &backend)
            .unwrap(),
    );
    match client.invoke_command("core.help", &BTreeMap::new(), OutputFormat::Json) {
        Err(BridgeError::Transport(message)) => {
            assert!(message.to_lowercase().contains("refused"), "{message}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
