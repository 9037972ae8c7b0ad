#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests driving a real socket against an in-process server,
//! the way `moltis-gateway`'s `tests/chat_ui.rs` drives its own `/ws` route.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arqon_config::{ArqonBusConfig, CasilConfig};
use arqon_gateway::{server, GatewayState};
use arqon_metrics::{init_metrics, MetricsRecorderConfig};
use arqon_protocol::PROTOCOL_VERSION;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_server(config: ArqonBusConfig) -> (SocketAddr, Arc<GatewayState>) {
    let state = GatewayState::new(config).await.unwrap();
    let metrics = Arc::new(init_metrics(MetricsRecorderConfig::default()).unwrap());
    let app = server::build_app(state.clone(), metrics);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    (addr, state)
}

fn parse(message: Message) -> Value {
    let text = message.into_text().unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Stamps the required `id`/`timestamp`/`version` fields a real client
/// would generate itself, merging in whatever else the test cares about.
fn client_envelope(kind: &str, fields: Value) -> Message {
    let mut envelope = json!({
        "id": arqon_protocol::ids::generate_message_id(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "type": kind,
        "version": PROTOCOL_VERSION,
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut envelope, fields) {
        base.extend(extra);
    }
    Message::text(envelope.to_string())
}

fn command(name: &str, args: Value) -> Message {
    client_envelope("command", json!({"command": name, "args": args}))
}

/// Scenario 1: a connecting client receives exactly one welcome envelope
/// naming its own freshly registered client id.
#[tokio::test]
async fn authenticated_connect_receives_welcome() {
    let (addr, state) = start_server(ArqonBusConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let welcome = parse(ws.next().await.unwrap().unwrap());
    assert_eq!(welcome["type"], "message");
    let client_id = welcome["payload"]["client_id"].as_str().unwrap().to_string();
    assert!(welcome["payload"]["welcome"].is_string());
    assert!(state.registry.has_client(&client_id).await);
}

/// Scenario 2: with authentication enabled and no connect token, the
/// upgrade itself must fail with HTTP 401 rather than opening a socket.
#[tokio::test]
async fn unauthenticated_connect_is_rejected_with_401() {
    let mut config = ArqonBusConfig::default();
    config.security.enable_authentication = true;
    config.security.shared_secret = Some("test-secret".to_string());
    let (addr, _state) = start_server(config).await;

    let err = connect_async(format!("ws://{addr}/ws")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected an HTTP 401 rejection, got {other:?}"),
    }
}

/// Scenario 3: an expired connect token is rejected the same way as a
/// missing one.
#[tokio::test]
async fn expired_token_is_rejected_with_401() {
    let mut config = ArqonBusConfig::default();
    config.security.enable_authentication = true;
    config.security.shared_secret = Some("test-secret".to_string());
    let (addr, _state) = start_server(config).await;

    let token = arqon_gateway::auth::issue_token(&json!({"exp": 1_000_000_000}), "test-secret");
    let err = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected an HTTP 401 rejection, got {other:?}"),
    }
}

/// A valid, unexpired token is accepted and reaches the welcome frame.
#[tokio::test]
async fn valid_token_is_accepted() {
    let mut config = ArqonBusConfig::default();
    config.security.enable_authentication = true;
    config.security.shared_secret = Some("test-secret".to_string());
    let (addr, _state) = start_server(config).await;

    let token = arqon_gateway::auth::issue_token(&json!({"exp": 9_999_999_999i64}), "test-secret");
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    let welcome = parse(ws.next().await.unwrap().unwrap());
    assert_eq!(welcome["type"], "message");
}

/// A message sent into a room+channel is delivered to a co-subscribed
/// peer and acknowledged back to the sender with a `message_response`.
#[tokio::test]
async fn message_is_routed_to_room_peer_and_acked_to_sender() {
    let (addr, _state) = start_server(ArqonBusConfig::default()).await;

    let (mut sender, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = sender.next().await.unwrap().unwrap();
    let (mut receiver, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = receiver.next().await.unwrap().unwrap();

    let join_args = json!({"room": "science", "channel": "general"});
    sender.send(command("join_channel", join_args.clone())).await.unwrap();
    let _ = parse(sender.next().await.unwrap().unwrap());

    receiver.send(command("join_channel", join_args)).await.unwrap();
    let _ = parse(receiver.next().await.unwrap().unwrap());

    sender
        .send(client_envelope(
            "message",
            json!({"room": "science", "channel": "general", "payload": {"content": "hello science"}}),
        ))
        .await
        .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(2), receiver.next())
        .await
        .expect("peer should receive the message before the timeout")
        .unwrap()
        .unwrap();
    let delivered = parse(delivered);
    assert_eq!(delivered["payload"]["content"], "hello science");

    let ack = parse(sender.next().await.unwrap().unwrap());
    assert_eq!(ack["type"], "response");
}

/// A `ping` command gets a `pong` response keyed to the issuing request.
#[tokio::test]
async fn ping_command_round_trips() {
    let (addr, _state) = start_server(ArqonBusConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = ws.next().await.unwrap().unwrap();

    ws.send(command("ping", json!({}))).await.unwrap();

    let reply = parse(ws.next().await.unwrap().unwrap());
    assert_eq!(reply["payload"]["pong"], true);
}

/// Scenario 5 (hot reload): `op.casil.reload` to `enforce` takes effect
/// immediately against the live gate, with no restart — a secret-bearing
/// message that was merely observed under monitor mode is blocked outright
/// once the reload lands, and never reaches the co-subscribed peer.
#[tokio::test]
async fn casil_reload_command_swaps_the_live_mode() {
    let mut config = ArqonBusConfig::default();
    config.casil = CasilConfig {
        enabled: true,
        block_on_probable_secret: true,
        ..CasilConfig::default()
    };
    let (addr, state) = start_server(config).await;

    let (mut sender, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = sender.next().await.unwrap().unwrap();
    let (mut receiver, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = receiver.next().await.unwrap().unwrap();

    let join_args = json!({"room": "science", "channel": "general"});
    sender.send(command("join_channel", join_args.clone())).await.unwrap();
    let _ = parse(sender.next().await.unwrap().unwrap());
    receiver.send(command("join_channel", join_args)).await.unwrap();
    let _ = parse(receiver.next().await.unwrap().unwrap());

    assert_eq!(state.casil.current_mode().await, "monitor");

    sender.send(command("op.casil.reload", json!({"mode": "enforce"}))).await.unwrap();
    let reply = parse(sender.next().await.unwrap().unwrap());
    assert_eq!(reply["type"], "response");
    assert_eq!(state.casil.current_mode().await, "enforce");

    sender
        .send(client_envelope(
            "message",
            json!({"room": "science", "channel": "general", "payload": {"api_token": "abc123"}}),
        ))
        .await
        .unwrap();

    let sender_reply = parse(sender.next().await.unwrap().unwrap());
    assert_eq!(sender_reply["type"], "error");

    let never_arrives = tokio::time::timeout(Duration::from_millis(300), receiver.next()).await;
    assert!(never_arrives.is_err(), "blocked message must not reach the co-subscribed peer");
}

/// Monitor mode observes but never rewrites: a co-subscribed peer must see
/// the original payload even when redaction paths are configured, since
/// `redaction.transport_redaction` defaults to `false` and the redacted
/// body is only ever meant for logs/telemetry.
#[tokio::test]
async fn monitor_mode_routes_original_payload_to_peer() {
    let mut config = ArqonBusConfig::default();
    config.casil = CasilConfig {
        enabled: true,
        redaction: arqon_config::CasilRedactionConfig {
            paths: vec!["secret".to_string()],
            ..arqon_config::CasilRedactionConfig::default()
        },
        ..CasilConfig::default()
    };
    let (addr, _state) = start_server(config).await;

    let (mut sender, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = sender.next().await.unwrap().unwrap();
    let (mut receiver, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = receiver.next().await.unwrap().unwrap();

    let join_args = json!({"room": "science", "channel": "general"});
    sender.send(command("join_channel", join_args.clone())).await.unwrap();
    let _ = parse(sender.next().await.unwrap().unwrap());
    receiver.send(command("join_channel", join_args)).await.unwrap();
    let _ = parse(receiver.next().await.unwrap().unwrap());

    sender
        .send(client_envelope(
            "message",
            json!({"room": "science", "channel": "general", "payload": {"secret": "hunter2"}}),
        ))
        .await
        .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(2), receiver.next())
        .await
        .expect("peer should receive the original message before the timeout")
        .unwrap()
        .unwrap();
    let delivered = parse(delivered);
    assert_eq!(delivered["payload"]["secret"], "hunter2");
}

/// When an operator opts into `redaction.transport_redaction` via hot
/// reload, a subsequent secret-bearing message is rewritten before it
/// reaches the peer.
#[tokio::test]
async fn transport_redaction_enabled_by_reload_rewrites_payload_to_peer() {
    let mut config = ArqonBusConfig::default();
    config.casil = CasilConfig {
        enabled: true,
        redaction: arqon_config::CasilRedactionConfig {
            paths: vec!["secret".to_string()],
            ..arqon_config::CasilRedactionConfig::default()
        },
        ..CasilConfig::default()
    };
    let (addr, _state) = start_server(config).await;

    let (mut sender, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = sender.next().await.unwrap().unwrap();
    let (mut receiver, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = receiver.next().await.unwrap().unwrap();

    let join_args = json!({"room": "science", "channel": "general"});
    sender.send(command("join_channel", join_args.clone())).await.unwrap();
    let _ = parse(sender.next().await.unwrap().unwrap());
    receiver.send(command("join_channel", join_args)).await.unwrap();
    let _ = parse(receiver.next().await.unwrap().unwrap());

    sender
        .send(command("op.casil.reload", json!({"redaction": {"transport_redaction": true}})))
        .await
        .unwrap();
    let _ = parse(sender.next().await.unwrap().unwrap());

    sender
        .send(client_envelope(
            "message",
            json!({"room": "science", "channel": "general", "payload": {"secret": "hunter2"}}),
        ))
        .await
        .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(2), receiver.next())
        .await
        .expect("peer should receive the redacted message before the timeout")
        .unwrap()
        .unwrap();
    let delivered = parse(delivered);
    assert_ne!(delivered["payload"]["secret"], "hunter2");
}

/// An operator registering via the dedicated `operator.join` envelope
/// type reaches the same handler as the `operator.join` command.
#[tokio::test]
async fn operator_join_envelope_registers_the_operator() {
    let (addr, state) = start_server(ArqonBusConfig::default()).await;
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let _ = ws.next().await.unwrap().unwrap();

    ws.send(client_envelope("operator.join", json!({"payload": {"group": "verify"}})))
        .await
        .unwrap();
    let reply = parse(ws.next().await.unwrap().unwrap());
    assert_eq!(reply["type"], "response");

    assert_eq!(state.operators.total_operators().await, 1);
}
