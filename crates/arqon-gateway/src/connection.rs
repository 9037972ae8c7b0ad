//! Drives one accepted socket through its full lifecycle: admission →
//! registration → message loop → teardown. Every task this function spawns
//! (the writer, an operator's delivery loop via [`crate::commands::dispatch`])
//! is a child of this connection's own cancellation token, so disconnecting
//! tears down the whole subtree without touching any other connection.

use std::sync::Arc;
use std::time::Duration;

use arqon_protocol::wire::{self, RawFrame, WireFormat};
use arqon_protocol::{frames, Envelope, EnvelopeType};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::GatewayState;

/// WebSocket close code for "try again later" (spec §4.9: connection limit).
const CLOSE_CODE_TOO_MANY_CONNECTIONS: u16 = 1013;

pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let Some(_admission) = state.try_admit_connection() else {
        reject_over_capacity(socket).await;
        return;
    };

    let conn_cancel = state.connection_cancellation();
    let wire_format = outbound_wire_format(&state);
    let required_wire_format = required_wire_format(&state);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Arc<Envelope>>();

    let writer_cancel = conn_cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                next = outbound_rx.recv() => {
                    let Some(envelope) = next else { break };
                    let Ok(encoded) = wire::encode(&envelope, wire_format) else {
                        warn!("failed to encode outbound envelope, dropping");
                        continue;
                    };
                    let message = match wire_format {
                        WireFormat::Json => Message::text(String::from_utf8_lossy(&encoded).into_owned()),
                        WireFormat::Binary => Message::binary(encoded),
                    };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let client_id = match state.registry.register(outbound_tx.clone(), None, None).await {
        Ok(id) => id,
        Err(err) => {
            warn!(error = %err, "failed to register new connection");
            writer.abort();
            return;
        }
    };
    info!(client_id = %client_id, "connection ready");

    let _ = outbound_tx.send(Arc::new(frames::welcome(&client_id)));
    state.telemetry.client_connected(&client_id).await;

    loop {
        let Some(message) = ws_rx.next().await else { break };
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                debug!(client_id = %client_id, error = %err, "socket read error");
                break;
            }
        };

        let frame = match message {
            Message::Text(text) => RawFrame::Text(text.to_string()),
            Message::Binary(data) => RawFrame::Binary(data.to_vec()),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if frame_len(&frame) > state.config.websocket.max_message_size {
            send_error(&outbound_tx, None, arqon_protocol::error_codes::VALIDATION_ERROR, "frame exceeds max_message_size");
            continue;
        }

        let mut envelope = match wire::parse(frame, required_wire_format) {
            Ok(envelope) => envelope,
            Err(err) => {
                send_error(&outbound_tx, None, arqon_protocol::error_codes::VALIDATION_ERROR, &err.to_string());
                continue;
            }
        };

        let violations = envelope.validate();
        if !violations.is_empty() {
            send_error(
                &outbound_tx,
                Some(&envelope.id),
                arqon_protocol::error_codes::VALIDATION_ERROR,
                &violations.join("; "),
            );
            continue;
        }

        envelope.sender = Some(client_id.clone());
        state.registry.touch(&client_id).await;

        handle_envelope(&state, &client_id, envelope, &outbound_tx, &conn_cancel).await;
    }

    teardown(&state, &client_id).await;
    writer.abort();
}

/// Dispatches one validated, sender-stamped envelope by kind. Inspection
/// (CASIL) runs ahead of routing/command execution for `message` and
/// `command` envelopes only, per the inline-policy pipeline; every other
/// kind passes straight through.
async fn handle_envelope(
    state: &Arc<GatewayState>,
    client_id: &str,
    envelope: Envelope,
    outbound_tx: &mpsc::UnboundedSender<Arc<Envelope>>,
    conn_cancel: &CancellationToken,
) {
    match envelope.kind {
        EnvelopeType::Message => handle_message(state, client_id, envelope, outbound_tx).await,
        EnvelopeType::Command => {
            let envelope = match inspect(state, envelope).await {
                Ok(envelope) => envelope,
                Err(blocked) => {
                    let _ = outbound_tx.send(Arc::new(blocked));
                    return;
                }
            };
            let reply = crate::commands::dispatch(state, client_id, &envelope, conn_cancel).await;
            let _ = outbound_tx.send(Arc::new(reply));
        }
        EnvelopeType::OperatorJoin => {
            let synthetic = Envelope::build(EnvelopeType::Command)
                .with_command("operator.join", envelope.payload.clone());
            let reply = crate::commands::dispatch(state, client_id, &synthetic, conn_cancel).await;
            let _ = outbound_tx.send(Arc::new(reply));
        }
        EnvelopeType::Response | EnvelopeType::Error => {
            if let Some(request_id) = envelope.request_id.clone() {
                state.collector.add_result(&request_id, client_id, envelope).await;
            }
        }
        EnvelopeType::Telemetry => {
            debug!(client_id, "ignoring inbound telemetry envelope");
        }
    }
}

async fn handle_message(
    state: &Arc<GatewayState>,
    client_id: &str,
    envelope: Envelope,
    outbound_tx: &mpsc::UnboundedSender<Arc<Envelope>>,
) {
    let envelope = match inspect(state, envelope).await {
        Ok(envelope) => envelope,
        Err(blocked) => {
            let _ = outbound_tx.send(Arc::new(blocked));
            return;
        }
    };

    let message_id = envelope.id.clone();
    if let Err(err) = state.storage.append(&envelope).await {
        warn!(message_id = %message_id, error = %err, "failed to persist message");
        state.telemetry.message_failed(&message_id, &err.to_string()).await;
    }

    let shared = Arc::new(envelope.clone());
    match state.router.route(shared, client_id).await {
        Ok(recipients) => state.telemetry.message_routed(&message_id, recipients).await,
        Err(err) => {
            let _ = outbound_tx.send(Arc::new(frames::error_reply(
                Some(&envelope.id),
                arqon_protocol::error_codes::ROOM_NOT_FOUND,
                &err.to_string(),
            )));
            state.telemetry.message_failed(&message_id, &err.to_string()).await;
            return;
        }
    }

    state.telemetry.message_sent(&message_id, client_id).await;
    let _ = outbound_tx.send(Arc::new(frames::message_response(&envelope)));
}

/// Runs the envelope through CASIL. `Ok` carries the envelope onward —
/// redacted in place only when the gate produced a transport-target
/// redaction — and `Err` carries the error reply to send back in place of
/// any further processing. `redacted_payload` on the outcome is a
/// logs/telemetry-target redaction and must never ride the wire.
async fn inspect(state: &Arc<GatewayState>, mut envelope: Envelope) -> Result<Envelope, Envelope> {
    let outcome = state.casil.inspect(&envelope).await;
    if outcome.is_blocked() {
        return Err(frames::error_reply(Some(&envelope.id), &outcome.reason_code, "blocked by inspection policy"));
    }
    if let Some(transport_payload) = outcome.transport_payload {
        envelope.payload = transport_payload;
    }
    Ok(envelope)
}

async fn teardown(state: &Arc<GatewayState>, client_id: &str) {
    state.registry.unregister(client_id).await;
    state.operators.unregister(client_id).await;
    state.telemetry.client_disconnected(client_id).await;
    info!(client_id, "connection closed");
}

fn send_error(outbound_tx: &mpsc::UnboundedSender<Arc<Envelope>>, request_id: Option<&str>, code: &str, message: &str) {
    let _ = outbound_tx.send(Arc::new(frames::error_reply(request_id, code, message)));
}

fn frame_len(frame: &RawFrame) -> usize {
    match frame {
        RawFrame::Text(text) => text.len(),
        RawFrame::Binary(bytes) => bytes.len(),
    }
}

fn outbound_wire_format(state: &Arc<GatewayState>) -> WireFormat {
    if state.config.websocket.wire_json_allowed {
        WireFormat::Json
    } else {
        WireFormat::Binary
    }
}

/// `None` means either wire format is accepted (dev); `Some` pins the one
/// acceptable encoding (staging/prod forbid JSON per spec §6).
fn required_wire_format(state: &Arc<GatewayState>) -> Option<WireFormat> {
    if state.config.websocket.wire_json_allowed {
        None
    } else {
        Some(WireFormat::Binary)
    }
}

async fn reject_over_capacity(mut socket: WebSocket) {
    warn!("rejecting connection: at max_connections capacity");
    let _ = socket
        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
            code: CLOSE_CODE_TOO_MANY_CONNECTIONS,
            reason: "server is at capacity".into(),
        })))
        .await;
}
