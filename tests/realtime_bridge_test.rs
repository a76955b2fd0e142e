//! Realtime bridge tests against a local WebSocket server

mod common;

use common::FakeTransport;
use futures::SinkExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use switchline::domain::realtime::RealtimeEvent;
use switchline::infrastructure::realtime::{
    BridgeConfig, ChannelState, RealtimeEventBridge, WebSocketChannel,
};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// Serve one scripted frame list per accepted connection, then close it
async fn serve(scripts: Vec<Vec<&'static str>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for frames in scripts {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for frame in frames {
                ws.send(Message::Text(frame.to_string())).await.unwrap();
            }
            let _ = ws.close(None).await;
        }
    });

    format!("ws://{}", addr)
}

fn bridge(url: String, transport: Arc<FakeTransport>, poll: Duration) -> Arc<RealtimeEventBridge> {
    Arc::new(RealtimeEventBridge::new(
        Arc::new(WebSocketChannel::new(url)),
        transport,
        BridgeConfig {
            reconnect_backoff: Duration::from_millis(50),
            poll_interval: poll,
            event_buffer: 32,
        },
    ))
}

async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<RealtimeEvent>) -> RealtimeEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_frames_survive_reconnect() {
    let url = serve(vec![
        vec![
            r#"{"type":"welcome"}"#,
            r#"{"type":"sms_received","message":{"id":"SM1","direction":"inbound","from":"+15550199","to":"+15550001","body":"hi","sent_at":"2024-05-01T10:00:00Z"}}"#,
            r#"{"type":"sms_received","message":"garbage"}"#,
        ],
        vec![r#"{"type":"call_incoming","call_sid":"CA1","from":"+15550199","to":"+15550001"}"#],
    ])
    .await;

    let bridge = bridge(url, Arc::new(FakeTransport::default()), Duration::from_secs(3600));
    let mut rx = bridge.subscribe();
    let handle = bridge.start();

    match next_event(&mut rx).await {
        RealtimeEvent::MessageReceived { message } => assert_eq!(message.body, "hi"),
        other => panic!("Wrong event type: {:?}", other),
    }
    // The malformed frame is dropped and the second connection's event follows
    match next_event(&mut rx).await {
        RealtimeEvent::CallIncoming { provider_sid, .. } => assert_eq!(provider_sid, "CA1"),
        other => panic!("Wrong event type: {:?}", other),
    }

    handle.shutdown();
}

#[tokio::test]
async fn test_poll_backstop_without_server() {
    let transport = Arc::new(FakeTransport::default());
    transport.inbox.lock().unwrap().push(common::outbound(
        "SM9",
        "+15550001",
        "+15550199",
        "sent elsewhere",
        chrono::Utc::now(),
    ));

    // Nothing listens on this port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let bridge = bridge(url, transport.clone(), Duration::from_millis(50));
    let mut rx = bridge.subscribe();
    let handle = bridge.start();

    match next_event(&mut rx).await {
        RealtimeEvent::MessagesPolled { messages } => assert_eq!(messages.len(), 1),
        other => panic!("Wrong event type: {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(transport.polls.load(Ordering::SeqCst) >= 2);
    assert_ne!(bridge.state(), ChannelState::Connected);

    handle.shutdown();
}
