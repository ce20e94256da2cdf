//! Socket integration tests over real TCP.

use std::time::Duration;

use cord_gateway::socket::{Socket, SocketError, CLOSE_GOING_AWAY};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const STEP: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_connect_and_exchange_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        ws.send(Message::Text(json!({"op": 10}).to_string().into()))
            .await
            .expect("send");
        let reply = ws.next().await.expect("frame").expect("read");
        let text = reply.into_text().expect("text frame");
        let code = match ws.next().await {
            Some(Ok(Message::Close(Some(frame)))) => Some(u16::from(frame.code)),
            _ => None,
        };
        (text.to_string(), code)
    });

    let mut socket = Socket::connect(&url, STEP).await.expect("connect");
    assert!(socket.is_open());

    let frame = timeout(STEP, socket.recv()).await.expect("recv timed out");
    assert_eq!(frame, Some(json!({"op": 10})));

    socket.send(&json!({"op": 2}));
    socket.close(CLOSE_GOING_AWAY);
    assert!(!socket.is_open());
    assert_eq!(socket.fate().await, Ok(()));

    let (text, code) = timeout(STEP, server).await.expect("server").expect("join");
    assert_eq!(text, r#"{"op":2}"#);
    assert_eq!(code, Some(CLOSE_GOING_AWAY));
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));
    drop(listener);

    let result = Socket::connect(&url, STEP).await;
    assert!(matches!(result, Err(SocketError::Connect(_))));
}

#[tokio::test]
async fn test_connect_times_out_when_handshake_stalls() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    // accept TCP but never answer the upgrade
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let result = Socket::connect(&url, Duration::from_millis(100)).await;
    assert_eq!(
        result.err(),
        Some(SocketError::Timeout(Duration::from_millis(100)))
    );
    server.abort();
}

#[tokio::test]
async fn test_invalid_url_fails_to_connect() {
    let result = Socket::connect("ws://", STEP).await;
    assert!(matches!(result, Err(SocketError::Connect(_))));
}

#[tokio::test]
async fn test_server_close_reported_with_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}", listener.local_addr().expect("addr"));

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("handshake");
        let _ = ws
            .close(Some(
                tokio_tungstenite::tungstenite::protocol::CloseFrame {
                    code: 4009u16.into(),
                    reason: "Session timed out.".to_string().into(),
                },
            ))
            .await;
        // drain until the client answers the close
        while ws.next().await.is_some() {}
    });

    let mut socket = Socket::connect(&url, STEP).await.expect("connect");
    assert_eq!(timeout(STEP, socket.recv()).await.expect("recv"), None);
    assert_eq!(
        socket.fate().await,
        Err(SocketError::Closed {
            code: 4009,
            reason: "Session timed out.".to_string(),
        })
    );
}
