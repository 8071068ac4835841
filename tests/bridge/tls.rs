//! The default HTTPS transport against a TLS mock server.

use std::collections::BTreeMap;

use epo_remote_bridge::config::{BackendConfig, TlsPolicy};
use epo_remote_bridge::remote::{HttpTransport, OutputFormat, RemoteCommandClient};
use epo_remote_bridge::{BridgeError, ServiceState};

use crate::support::{
    system_find_payload, write_backend_config, Harness, MockEpo, TEST_GUID, TEST_PASSWORD,
    TEST_USER, WAIT,
};

fn backend(mock: &MockEpo, tls: TlsPolicy) -> BackendConfig {
    BackendConfig {
        name: "testEpo1".into(),
        host: "127.0.0.1".into(),
        port: mock.port(),
        user: TEST_USER.into(),
        password: TEST_PASSWORD.into(),
        unique_id: None,
        tls,
        timeout: None,
    }
}

#[test]
fn core_help_over_https_without_verification() {
    let mock = MockEpo::start_tls();
    let harness = Harness::start_https(|dir| {
        write_backend_config(dir, mock.port(), "verifyCertificate = false");
    });

    assert_eq!(harness.service.state(), ServiceState::Running);
    assert_eq!(
        harness.fabric.topics(),
        vec![format!("/mcafee/service/epo/remote/{}", TEST_GUID)]
    );

    let response = harness
        .fabric
        .request(&harness.topic(), r#"{"command":"core.help","output":"json"}"#, WAIT)
        .unwrap();
    assert!(!response.is_error(), "{:?}", response.error_message());
    assert!(response.payload_str().unwrap().contains("system.find"));
    assert!(mock.token_requests() >= 2);
}

#[test]
fn ca_bundle_file_verifies_server() {
    let mock = MockEpo::start_tls();
    let harness = Harness::start_https(|dir| {
        std::fs::write(dir.join("ca.pem"), mock.ca_pem()).unwrap();
        write_backend_config(dir, mock.port(), "verifyCertBundle = \"ca.pem\"");
    });

    let response = harness
        .fabric
        .request(
            &harness.topic(),
            r#"{"command":"system.find","params":{"searchText":"Linux"}}"#,
            WAIT,
        )
        .unwrap();
    let decoded: serde_json::Value = serde_json::from_slice(response.payload().unwrap()).unwrap();
    assert_eq!(decoded, system_find_payload());
}

#[test]
fn ca_bundle_directory_verifies_server() {
    let mock = MockEpo::start_tls();
    let certs = tempfile::tempdir().unwrap();
    std::fs::write(certs.path().join("issuer.crt"), mock.ca_pem()).unwrap();
    std::fs::write(certs.path().join("README"), "not a certificate").unwrap();

    let transport =
        HttpTransport::new(&backend(&mock, TlsPolicy::CaBundle(certs.path().to_path_buf())))
            .unwrap();
    assert_eq!(transport.base_url(), format!("https://127.0.0.1:{}/remote", mock.port()));
    assert_eq!(
        RemoteCommandClient::new(transport).lookup_unique_id().unwrap(),
        TEST_GUID
    );
}

#[test]
fn untrusted_certificate_is_rejected_with_cause() {
    let mock = MockEpo::start_tls();
    let client =
        RemoteCommandClient::new(HttpTransport::new(&backend(&mock, TlsPolicy::SystemRoots)).unwrap());

    let err = client
        .invoke_command("core.help", &BTreeMap::new(), OutputFormat::Json)
        .unwrap_err();
    match err {
        BridgeError::Transport(message) => {
            assert!(message.to_lowercase().contains("certificate"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.token_requests(), 0);
}
