// Tests for the WebSocket link client against a loopback server.

use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use voxstream::link::{DeepgramLink, LinkConfig, LinkEvent, TranscriptionLink};

/// Accept one WebSocket connection and collect every text frame until the
/// client closes or the stream goes quiet.
async fn collect_text_frames(listener: TcpListener) -> Vec<String> {
    let (stream, _) = listener.accept().await.expect("client should connect");
    let mut ws = tokio_tungstenite::accept_async(stream)
        .await
        .expect("handshake should succeed");

    let mut texts = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(1), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => texts.push(text),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) | Err(_) => break,
            Ok(Some(Ok(_))) => {}
        }
    }
    texts
}

#[tokio::test]
async fn test_keepalive_is_sent_while_the_link_is_quiet() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(collect_text_frames(listener));

    let config = LinkConfig {
        endpoint: format!("ws://{}", addr),
        api_key: "test-key".to_string(),
        keepalive_interval: Duration::from_millis(25),
        ..LinkConfig::default()
    };
    let link = DeepgramLink::new(config);

    let (events, _events_rx) = mpsc::channel::<LinkEvent>(16);
    link.connect(events).await.expect("connect should succeed");

    // No audio flows; only keepalives should cross the wire
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(link.is_connected());
    link.disconnect().await.expect("disconnect should succeed");

    let texts = server.await.unwrap();
    let keepalives = texts
        .iter()
        .filter(|t| t.contains("\"KeepAlive\""))
        .count();
    assert!(
        keepalives >= 2,
        "expected repeated keepalives, got frames: {texts:?}"
    );
}

#[tokio::test]
async fn test_deliberate_disconnect_sends_close_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(collect_text_frames(listener));

    let config = LinkConfig {
        endpoint: format!("ws://{}", addr),
        api_key: "test-key".to_string(),
        ..LinkConfig::default()
    };
    let link = DeepgramLink::new(config);

    let (events, mut events_rx) = mpsc::channel::<LinkEvent>(16);
    link.connect(events).await.expect("connect should succeed");

    tokio::time::timeout(Duration::from_secs(2), async {
        while !link.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("link should become ready");
    link.disconnect().await.expect("disconnect should succeed");

    let texts = server.await.unwrap();
    assert!(texts.iter().any(|t| t.contains("\"CloseStream\"")));

    // A deliberate close never surfaces ConnectionLost
    while let Ok(event) = events_rx.try_recv() {
        assert!(
            matches!(event, LinkEvent::Transcript { .. }),
            "unexpected error event after deliberate close: {event:?}"
        );
    }
}
