// Integration tests for the WebSocket channel against an in-process server.
//
// Each test binds a TcpListener on a loopback port, points a ChannelClient
// at it, and plays the service side of the conversation by hand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use braindump::channel::{ChannelClient, ChannelCommand, ChannelEvent, LinkState};
use braindump::config::ServerConfig;
use braindump::protocol::{InboundEnvelope, OutboundEnvelope};
use braindump::session::SessionId;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async};

struct TestChannel {
    listener: TcpListener,
    session: SessionId,
    events: mpsc::Receiver<ChannelEvent>,
    cmd_tx: mpsc::Sender<ChannelCommand>,
    client: tokio::task::JoinHandle<()>,
}

async fn start_channel(reconnect: bool) -> TestChannel {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let session = SessionId::generate();

    let (event_tx, events) = mpsc::channel(32);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let config = ServerConfig {
        url,
        reconnect,
        reconnect_initial_secs: 0,
        reconnect_max_secs: 1,
    };
    let client = tokio::spawn(ChannelClient::new(config, session.clone(), event_tx, cmd_rx).run());

    TestChannel {
        listener,
        session,
        events,
        cmd_tx,
        client,
    }
}

async fn next_event(events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a channel event")
        .expect("event channel closed")
}

async fn next_inbound(events: &mut mpsc::Receiver<ChannelEvent>) -> InboundEnvelope {
    loop {
        if let ChannelEvent::Inbound(envelope) = next_event(events).await {
            return envelope;
        }
    }
}

fn assert_state(event: ChannelEvent, expected: LinkState) {
    match event {
        ChannelEvent::State(state) => assert_eq!(state, expected),
        other => panic!("expected state {expected:?}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_carries_the_session_id_in_the_path() {
    let mut ch = start_channel(false).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let seen_path = Arc::new(Mutex::new(None));
    let cb_path = seen_path.clone();
    let _server = accept_hdr_async(stream, move |req: &Request, resp: Response| {
        *cb_path.lock().unwrap() = Some(req.uri().path().to_string());
        Ok(resp)
    })
    .await
    .unwrap();

    assert_state(next_event(&mut ch.events).await, LinkState::Connecting);
    assert_state(next_event(&mut ch.events).await, LinkState::Connected);
    assert_eq!(
        seen_path.lock().unwrap().as_deref(),
        Some(format!("/ws/{}", ch.session).as_str())
    );

    ch.client.abort();
}

#[tokio::test]
async fn test_outbound_envelopes_travel_as_tagged_json() {
    let mut ch = start_channel(false).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();

    ch.cmd_tx
        .send(ChannelCommand::Send(OutboundEnvelope::Text {
            text: "buy milk".to_string(),
        }))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), server.next())
        .await
        .expect("no frame arrived")
        .unwrap()
        .unwrap();
    let Message::Text(raw) = frame else {
        panic!("expected a text frame, got {frame:?}");
    };
    assert_eq!(raw.to_string(), r#"{"type":"text","text":"buy milk"}"#);

    ch.client.abort();
}

#[tokio::test]
async fn test_inbound_frames_are_decoded_into_envelopes() {
    let mut ch = start_channel(false).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();

    server
        .send(Message::Text(
            r#"{"type":"response","conversation":"Morning!","tasks":[],"schedule":[]}"#.into(),
        ))
        .await
        .unwrap();

    let envelope = next_inbound(&mut ch.events).await;
    let InboundEnvelope::Response { conversation, .. } = envelope else {
        panic!("expected a response envelope, got {envelope:?}");
    };
    assert_eq!(conversation, "Morning!");

    ch.client.abort();
}

#[tokio::test]
async fn test_malformed_frames_are_dropped_silently() {
    let mut ch = start_channel(false).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();

    // Junk, an unknown tag, then something real.
    server.send(Message::Text("not json".into())).await.unwrap();
    server
        .send(Message::Text(r#"{"type":"bogus"}"#.into()))
        .await
        .unwrap();
    server
        .send(Message::Text(
            r#"{"type":"error","message":"slow down"}"#.into(),
        ))
        .await
        .unwrap();

    let envelope = next_inbound(&mut ch.events).await;
    assert_eq!(envelope, InboundEnvelope::Error {
        message: "slow down".to_string(),
    });

    ch.client.abort();
}

#[tokio::test]
async fn test_clean_close_disconnects_without_retry() {
    let mut ch = start_channel(false).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();

    assert_state(next_event(&mut ch.events).await, LinkState::Connecting);
    assert_state(next_event(&mut ch.events).await, LinkState::Connected);

    server.close(None).await.unwrap();

    assert_state(next_event(&mut ch.events).await, LinkState::Disconnected);

    // Reconnect is off: the client task ends and the event channel closes.
    let end = tokio::time::timeout(Duration::from_secs(5), ch.events.recv())
        .await
        .expect("client kept the event channel open");
    assert!(end.is_none());
    tokio::time::timeout(Duration::from_secs(5), ch.client)
        .await
        .expect("client task did not finish")
        .unwrap();
}

#[tokio::test]
async fn test_dropped_connection_is_redialed_when_reconnect_is_on() {
    let mut ch = start_channel(true).await;

    let (stream, _) = ch.listener.accept().await.unwrap();
    let mut server = accept_async(stream).await.unwrap();
    assert_state(next_event(&mut ch.events).await, LinkState::Connecting);
    assert_state(next_event(&mut ch.events).await, LinkState::Connected);

    server.close(None).await.unwrap();
    assert_state(next_event(&mut ch.events).await, LinkState::Disconnected);

    // The client dials again on its own; play the service once more.
    let (stream, _) = ch.listener.accept().await.unwrap();
    let _server = accept_async(stream).await.unwrap();
    assert_state(next_event(&mut ch.events).await, LinkState::Connecting);
    assert_state(next_event(&mut ch.events).await, LinkState::Connected);

    ch.client.abort();
}

#[tokio::test]
async fn test_client_stops_when_the_event_receiver_goes_away() {
    let ch = start_channel(true).await;
    drop(ch.events);

    // The client connects, cannot hand the Connected event over, and shuts
    // down instead of redialing forever.
    let (stream, _) = ch.listener.accept().await.unwrap();
    let _server = accept_async(stream).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), ch.client)
        .await
        .expect("client task kept running without an event consumer")
        .unwrap();
}
