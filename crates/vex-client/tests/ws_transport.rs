//! WebSocket transport against a local tungstenite server.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use vex_client::{Connector, Transport, TransportError, WsConnector};

async fn echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) => {
                    ws.send(Message::Text(format!("echo:{text}"))).await.unwrap();
                },
                Message::Binary(bytes) => ws.send(Message::Binary(bytes)).await.unwrap(),
                Message::Close(_) => break,
                _ => {},
            }
        }
    });

    format!("ws://{addr}/socket")
}

/// Server that sends `messages` to the first client, then waits for it to close.
async fn push_server(messages: Vec<Message>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for message in messages {
            ws.send(message).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    format!("ws://{addr}/socket")
}

#[tokio::test]
async fn text_frames_round_trip() {
    let url = echo_server().await;
    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    transport.send(r#"{"type":"ping"}"#.to_string()).await.unwrap();

    let reply = transport.recv().await.unwrap().unwrap();
    assert_eq!(reply, r#"echo:{"type":"ping"}"#);

    transport.close().await;
}

#[tokio::test]
async fn close_ends_the_stream() {
    let url = echo_server().await;
    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    transport.close().await;

    assert!(!matches!(transport.recv().await, Some(Ok(_))));
}

#[tokio::test]
async fn unreachable_host_fails_to_connect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WsConnector::new().connect(&format!("ws://{addr}/socket")).await;

    assert!(matches!(result, Err(TransportError::Connect(_))));
}

#[tokio::test]
async fn binary_frames_are_read_as_text() {
    let url = push_server(vec![
        Message::Binary(br#"{"type":"pong"}"#.to_vec()),
        Message::Binary(vec![0xff, b'{']),
        Message::Text(r#"{"type":"ping"}"#.to_string()),
    ])
    .await;
    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"pong"}"#);
    // Invalid UTF-8 arrives lossily and the connection stays usable.
    assert_eq!(transport.recv().await.unwrap().unwrap(), "\u{fffd}{");
    assert_eq!(transport.recv().await.unwrap().unwrap(), r#"{"type":"ping"}"#);

    transport.close().await;
}
