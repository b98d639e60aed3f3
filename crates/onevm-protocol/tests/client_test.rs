// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client tests for onevm-protocol against a local HTTP mock.

use std::time::Duration;

use mockito::Matcher;
use onevm_protocol::{OneClient, RpcClient, RpcClientConfig, RpcValue, TransportError};

fn envelope(success: bool, body: &str, code: i32) -> String {
    format!(
        r#"<?xml version="1.0"?>
<methodResponse>
  <params>
    <param>
      <value>
        <array>
          <data>
            <value><boolean>{}</boolean></value>
            <value><string>{}</string></value>
            <value><i4>{}</i4></value>
          </data>
        </array>
      </value>
    </param>
  </params>
</methodResponse>"#,
        if success { 1 } else { 0 },
        body,
        code
    )
}

fn client_for(server: &mockito::Server) -> OneClient {
    OneClient::new(RpcClientConfig {
        endpoint: format!("{}/RPC2", server.url()),
        username: "oneadmin".to_string(),
        password: "secret".to_string(),
        request_timeout: Duration::from_secs(5),
    })
}

#[test]
fn test_default_config() {
    let config = RpcClientConfig::default();

    assert_eq!(config.endpoint, "http://localhost:2633/RPC2");
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert!(config.username.is_empty());
}

#[test]
fn test_session_string() {
    let client = OneClient::localhost("oneadmin", "secret");
    assert_eq!(client.config().session(), "oneadmin:secret");
}

#[test]
fn test_debug_redacts_password() {
    let client = OneClient::localhost("oneadmin", "secret");
    let debug = format!("{:?}", client.config());
    assert!(debug.contains("oneadmin"));
    assert!(!debug.contains("secret"));
}

#[test]
fn test_call_returns_body() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/RPC2")
        .match_header("content-type", "text/xml")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("<methodName>one.vm.info</methodName>".to_string()),
            Matcher::Regex("<string>oneadmin:secret</string>".to_string()),
            Matcher::Regex("<i4>7</i4>".to_string()),
        ]))
        .with_status(200)
        .with_body(envelope(true, "&lt;VM&gt;&lt;ID&gt;7&lt;/ID&gt;&lt;/VM&gt;", 0))
        .create();

    let client = client_for(&server);
    let body = client.call("one.vm.info", &[RpcValue::from(7)]).unwrap();

    assert_eq!(body, "<VM><ID>7</ID></VM>");
    mock.assert();
}

#[test]
fn test_call_remote_failure() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/RPC2")
        .with_status(200)
        .with_body(envelope(false, "[one.vm.info] Error getting virtual machine [7].", 1024))
        .create();

    let client = client_for(&server);
    match client.call("one.vm.info", &[RpcValue::from(7)]) {
        Err(TransportError::Remote { code, message }) => {
            assert_eq!(code, 1024);
            assert!(message.contains("Error getting virtual machine"));
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn test_call_http_error() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/RPC2")
        .with_status(500)
        .with_body("boom")
        .create();

    let client = client_for(&server);
    match client.call("one.vm.info", &[]) {
        Err(TransportError::Http { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[test]
fn test_call_garbage_response() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/RPC2")
        .with_status(200)
        .with_body("<html>not xml-rpc</html>")
        .create();

    let client = client_for(&server);
    assert!(matches!(
        client.call("one.vm.info", &[]),
        Err(TransportError::Decode(_))
    ));
}

#[test]
fn test_call_unreachable_endpoint() {
    let client = OneClient::new(RpcClientConfig {
        endpoint: "http://127.0.0.1:1/RPC2".to_string(),
        request_timeout: Duration::from_secs(1),
        ..Default::default()
    });

    assert!(matches!(
        client.call("one.vm.info", &[]),
        Err(TransportError::Connection(_))
    ));
}

#[test]
fn test_call_through_trait_object() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/RPC2")
        .with_status(200)
        .with_body(
            r#"<methodResponse><params><param><value><array><data>
                <value><boolean>1</boolean></value>
                <value><i4>113</i4></value>
            </data></array></value></param></params></methodResponse>"#,
        )
        .create();

    let client: Box<dyn RpcClient> = Box::new(client_for(&server));
    let id = client
        .call("one.template.instantiate", &[RpcValue::from(3)])
        .unwrap();
    assert_eq!(id, "113");
}
