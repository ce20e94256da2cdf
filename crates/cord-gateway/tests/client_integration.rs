//! Bootstrap integration tests.
//!
//! A minimal HTTP responder stands in for the REST API; a websocket mock
//! stands in for the gateway it points at.

use std::time::Duration;

use cord_gateway::{Client, ClientConfig, GatewayError};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const STEP: Duration = Duration::from_secs(5);

/// Serve one HTTP request with `status` and `body`; yields the raw request head.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}/api", listener.local_addr().expect("addr"));

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.expect("read");
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.expect("write");
        stream.shutdown().await.ok();
        String::from_utf8_lossy(&head).to_string()
    });

    (base, handle)
}

fn config(api_base: String) -> ClientConfig {
    let mut config = ClientConfig::new("abc.def");
    config.api_base = api_base;
    config.agent_name = "cord-test".to_string();
    config.timeout_ms = 2_000;
    config
}

#[tokio::test]
async fn test_gateway_url_appends_version_and_encoding() {
    let (base, server) = serve_once("200 OK", json!({"url": "wss://gateway.example.com"}).to_string()).await;
    let client = Client::new(config(base)).expect("client");

    let url = client.gateway_url().await.expect("gateway url");
    assert_eq!(url, "wss://gateway.example.com?v=6&encoding=json");

    let head = timeout(STEP, server).await.expect("server").expect("join");
    let head = head.to_ascii_lowercase();
    assert!(head.starts_with("get /api/v6/gateway http/1.1"), "{head}");
    assert!(head.contains("authorization: bot abc.def"), "{head}");
    assert!(head.contains("user-agent: discordbot ("), "{head}");
}

#[tokio::test]
async fn test_gateway_url_http_error() {
    let (base, _server) = serve_once("500 Internal Server Error", "{}".to_string()).await;
    let client = Client::new(config(base)).expect("client");

    assert!(matches!(
        client.gateway_url().await,
        Err(GatewayError::Http(_))
    ));
}

#[tokio::test]
async fn test_gateway_url_unusable_body() {
    let (base, _server) = serve_once("200 OK", json!({"nope": true}).to_string()).await;
    let client = Client::new(config(base)).expect("client");

    assert!(matches!(
        client.gateway_url().await,
        Err(GatewayError::Bootstrap(_))
    ));
}

#[tokio::test]
async fn test_gateway_bootstraps_session() {
    let gateway = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let gateway_url = format!("ws://{}/", gateway.local_addr().expect("addr"));
    let (base, _server) = serve_once("200 OK", json!({"url": gateway_url}).to_string()).await;
    let client = Client::new(config(base)).expect("client");

    let mut session = client.gateway().await.expect("session");

    let (stream, _) = timeout(STEP, gateway.accept()).await.expect("no connection").expect("accept");
    let mut ws = accept_async(stream).await.expect("handshake");
    ws.send(Message::Text(json!({"op": 10, "d": {"heartbeat_interval": 45000}}).to_string().into()))
        .await
        .expect("hello");

    let identify = match timeout(STEP, ws.next()).await.expect("no identify") {
        Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).expect("json"),
        other => panic!("unexpected frame: {other:?}"),
    };
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "abc.def");
    assert_eq!(identify["d"]["properties"]["browser"], "cord-test");

    session.close().await.expect("clean close");
}

#[tokio::test]
async fn test_gateway_bootstrap_failure_returned_directly() {
    let (base, _server) = serve_once("401 Unauthorized", "{}".to_string()).await;
    let client = Client::new(config(base)).expect("client");

    assert!(matches!(client.gateway().await, Err(GatewayError::Http(_))));
}
