//! The command surface: every `command` envelope a connected client or
//! operator can send, dispatched by name. Kept as a plain async function
//! over [`GatewayState`] rather than axum-specific plumbing so it can be
//! exercised directly in tests without a socket.

use std::sync::Arc;

use arqon_dispatch::DispatchStrategy;
use arqon_protocol::{error_codes, frames, Envelope};
use arqon_storage::HistoryQuery;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::state::GatewayState;

const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Executes `envelope`'s command against `state` on behalf of `client_id`,
/// returning the single response or error envelope to send back. Commands
/// never produce more than one terminal reply (streaming progress updates,
/// where a command might eventually support them, are a future extension,
/// not something any current command does). `conn_cancel` is the issuing
/// connection's own cancellation token, so anything a command spawns (like
/// an operator's task-delivery loop) dies when that connection does, not
/// just when the whole broker shuts down.
pub async fn dispatch(
    state: &Arc<GatewayState>,
    client_id: &str,
    envelope: &Envelope,
    conn_cancel: &CancellationToken,
) -> Envelope {
    let Some(command) = envelope.command.as_deref().filter(|c| !c.is_empty()) else {
        return frames::error_reply(Some(&envelope.id), error_codes::MISSING_COMMAND, "command name is required");
    };

    let request_id = envelope.id.as_str();
    let args = &envelope.args;

    match command {
        "ping" => frames::command_response(request_id, json!({"pong": true})),
        "version" => frames::command_response(
            request_id,
            json!({"protocol_version": arqon_protocol::PROTOCOL_VERSION, "broker_version": CARGO_VERSION}),
        ),
        "status" => status(state, request_id).await,
        "help" => frames::command_response(request_id, json!({"commands": COMMAND_NAMES})),

        "create_channel" => create_channel(state, request_id, args).await,
        "delete_channel" => delete_channel(state, request_id, args).await,
        "join_channel" => join_channel(state, client_id, request_id, args).await,
        "leave_channel" => leave_channel(state, client_id, request_id, args).await,
        "list_channels" => list_channels(state, request_id, args).await,
        "channel_info" => channel_info(state, request_id, args).await,
        "history" => history(state, request_id, args).await,

        "operator.join" => operator_join(state, client_id, request_id, args, conn_cancel).await,

        "op.casil.reload" => casil_reload(state, request_id, args).await,
        "op.history.get" => history(state, request_id, args).await,
        "op.history.replay" => history_replay(state, client_id, request_id, args).await,

        name if name.starts_with("op.omega.") => frames::error_reply(
            Some(request_id),
            error_codes::FEATURE_DISABLED,
            "the omega lane is experimental and disabled in this deployment",
        ),

        other => {
            warn!(command = other, "unknown command");
            frames::error_reply(Some(request_id), error_codes::UNKNOWN_COMMAND, &format!("unknown command '{other}'"))
        }
    }
}

const COMMAND_NAMES: &[&str] = &[
    "ping",
    "status",
    "version",
    "help",
    "create_channel",
    "delete_channel",
    "join_channel",
    "leave_channel",
    "list_channels",
    "channel_info",
    "history",
    "operator.join",
    "op.casil.reload",
    "op.history.get",
    "op.history.replay",
];

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn arg_usize(args: &Map<String, Value>, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

fn arg_datetime(args: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    args.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

async fn status(state: &Arc<GatewayState>, request_id: &str) -> Envelope {
    let health = state.router.health();
    let result = json!({
        "clients": state.registry.client_count().await,
        "connections": state.connection_count(),
        "operators": state.operators.total_operators().await,
        "router_status": match health.status {
            arqon_router::RouterStatus::Healthy => "healthy",
            arqon_router::RouterStatus::Degraded => "degraded",
        },
        "routing_error_rate": health.error_rate,
        "casil_mode": state.casil.current_mode().await,
        "storage_degraded": !state.storage.health_check().await,
    });
    frames::command_response(request_id, result)
}

async fn create_channel(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let Some(room) = arg_str(args, "room") else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room is required");
    };
    let channel = arg_str(args, "channel").or_else(|| arg_str(args, "name"));
    let Some(channel) = channel else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "channel (or name) is required");
    };
    let description = arg_str(args, "description").map(str::to_string);

    match state.registry.rooms().create_channel(room, channel, description).await {
        Ok(created) => frames::command_response(request_id, json!({"room": room, "channel": created.name})),
        Err(err) => frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, &err.to_string()),
    }
}

async fn delete_channel(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let (Some(room), Some(channel)) = (arg_str(args, "room"), arg_str(args, "channel")) else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room and channel are required");
    };
    match state.registry.rooms().delete_channel(room, channel).await {
        Ok(()) => frames::command_response(request_id, json!({"deleted": true})),
        Err(_) => frames::error_reply(Some(request_id), error_codes::CHANNEL_NOT_FOUND, "channel not found"),
    }
}

async fn join_channel(
    state: &Arc<GatewayState>,
    client_id: &str,
    request_id: &str,
    args: &Map<String, Value>,
) -> Envelope {
    let (Some(room), Some(channel)) = (arg_str(args, "room"), arg_str(args, "channel")) else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room and channel are required");
    };
    match state.registry.join(client_id, room, channel).await {
        Ok(()) => frames::command_response(request_id, json!({"room": room, "channel": channel})),
        Err(err) => frames::error_reply(Some(request_id), error_codes::ROOM_NOT_FOUND, &err.to_string()),
    }
}

async fn leave_channel(
    state: &Arc<GatewayState>,
    client_id: &str,
    request_id: &str,
    args: &Map<String, Value>,
) -> Envelope {
    let (Some(room), Some(channel)) = (arg_str(args, "room"), arg_str(args, "channel")) else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room and channel are required");
    };
    let _ = state.registry.leave(client_id, room, channel).await;
    frames::command_response(request_id, json!({"left": true}))
}

async fn list_channels(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let Some(room) = arg_str(args, "room") else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room is required");
    };
    match state.registry.rooms().get_room(room).await {
        Some(room_handle) => frames::command_response(
            request_id,
            json!({"room": room, "channels": room_handle.channel_names().await}),
        ),
        None => frames::error_reply(Some(request_id), error_codes::ROOM_NOT_FOUND, "room not found"),
    }
}

async fn channel_info(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let (Some(room), Some(channel)) = (arg_str(args, "room"), arg_str(args, "channel")) else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "room and channel are required");
    };
    match state.registry.rooms().get_channel(room, channel).await {
        Ok(handle) => frames::command_response(
            request_id,
            json!({
                "room": room,
                "channel": channel,
                "members": handle.member_count().await,
                "message_rate_24h": handle.message_rate_24h().await,
            }),
        ),
        Err(_) => frames::error_reply(Some(request_id), error_codes::CHANNEL_NOT_FOUND, "channel not found"),
    }
}

async fn history(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let query = HistoryQuery {
        room: arg_str(args, "room").map(str::to_string),
        channel: arg_str(args, "channel").map(str::to_string),
        limit: arg_usize(args, "limit").unwrap_or(100),
        since: arg_datetime(args, "since"),
        until: arg_datetime(args, "until"),
    };
    match state.storage.get_history(&query).await {
        Ok(entries) => {
            let messages: Vec<Value> =
                entries.iter().filter_map(|e| serde_json::to_value(&e.envelope).ok()).collect();
            frames::command_response(request_id, json!({"messages": messages, "count": messages.len()}))
        }
        Err(err) => frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, &err.to_string()),
    }
}

async fn history_replay(
    state: &Arc<GatewayState>,
    client_id: &str,
    request_id: &str,
    args: &Map<String, Value>,
) -> Envelope {
    let query = HistoryQuery {
        room: arg_str(args, "room").map(str::to_string),
        channel: arg_str(args, "channel").map(str::to_string),
        limit: arg_usize(args, "limit").unwrap_or(100),
        since: arg_datetime(args, "since"),
        until: None,
    };
    let entries = match state.storage.get_history(&query).await {
        Ok(entries) => entries,
        Err(err) => return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, &err.to_string()),
    };

    let mut replayed = 0;
    for entry in &entries {
        if state.registry.send_to(client_id, Arc::new(entry.envelope.clone())).await {
            replayed += 1;
        }
    }
    frames::command_response(request_id, json!({"replayed": replayed}))
}

async fn operator_join(
    state: &Arc<GatewayState>,
    client_id: &str,
    request_id: &str,
    args: &Map<String, Value>,
    conn_cancel: &CancellationToken,
) -> Envelope {
    let Some(group) = arg_str(args, "group") else {
        return frames::error_reply(Some(request_id), error_codes::VALIDATION_ERROR, "group is required");
    };
    let token = arg_str(args, "auth_token").unwrap_or("");

    // A client belongs to at most one group at a time: joining a new one
    // replaces the old membership rather than stacking on top of it.
    state.operators.unregister(client_id).await;

    if !state.operators.register(client_id, group, token).await {
        return frames::error_reply(Some(request_id), error_codes::OPERATOR_AUTH_FAILED, "operator authentication failed");
    }

    if let Some(consumer_groups) = state.consumer_groups.clone() {
        let registry = state.registry.clone();
        let cancel = conn_cancel.child_token();
        let group_name = group.to_string();
        let operator_id = client_id.to_string();
        tokio::spawn(async move {
            arqon_dispatch::delivery::run(consumer_groups, registry, group_name, operator_id, cancel).await;
        });
    }

    frames::command_response(request_id, json!({"group": group, "strategy_hint": DispatchStrategy::Competing.as_str()}))
}

fn arg_str_vec(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

async fn casil_reload(state: &Arc<GatewayState>, request_id: &str, args: &Map<String, Value>) -> Envelope {
    let mut config = state.casil.current_config().await;

    if let Some(mode) = arg_str(args, "mode") {
        config.mode = mode.to_string();
    }
    if let Some(enabled) = args.get("enabled").and_then(Value::as_bool) {
        config.enabled = enabled;
    }
    if let Some(default_decision) = arg_str(args, "default_decision") {
        config.default_decision = default_decision.to_string();
    }
    if let Some(block) = args.get("block_on_probable_secret").and_then(Value::as_bool) {
        config.block_on_probable_secret = block;
    }

    if let Some(scope) = args.get("scope").and_then(Value::as_object) {
        if let Some(include) = scope.get("include").and_then(arg_str_vec) {
            config.scope.include = include;
        }
        if let Some(exclude) = scope.get("exclude").and_then(arg_str_vec) {
            config.scope.exclude = exclude;
        }
    }

    if let Some(redaction) = args.get("redaction").and_then(Value::as_object) {
        if let Some(patterns) = redaction.get("patterns").and_then(arg_str_vec) {
            config.redaction.patterns = patterns;
        }
        if let Some(paths) = redaction.get("paths").and_then(arg_str_vec) {
            config.redaction.paths = paths;
        }
        if let Some(never_log_for) = redaction.get("never_log_for").and_then(arg_str_vec) {
            config.redaction.never_log_for = never_log_for;
        }
        if let Some(transport_redaction) = redaction.get("transport_redaction").and_then(Value::as_bool) {
            config.redaction.transport_redaction = transport_redaction;
        }
    }

    let mode = state.casil.reload(config).await;
    frames::command_response(request_id, json!({"mode": mode}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_config::ArqonBusConfig;
    use arqon_protocol::EnvelopeType;

    async fn test_state() -> Arc<GatewayState> {
        GatewayState::new(ArqonBusConfig::default()).await.unwrap()
    }

    fn command(name: &str, args: Map<String, Value>) -> Envelope {
        Envelope::build(EnvelopeType::Command).with_command(name, args)
    }

    async fn run(state: &Arc<GatewayState>, client_id: &str, envelope: &Envelope) -> Envelope {
        dispatch(state, client_id, envelope, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn ping_replies_with_pong() {
        let state = test_state().await;
        let reply = run(&state, "client-1", &command("ping", Map::new())).await;
        assert_eq!(reply.payload.get("pong"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let state = test_state().await;
        let reply = run(&state, "client-1", &command("not.a.command", Map::new())).await;
        assert_eq!(reply.error_code.as_deref(), Some(error_codes::UNKNOWN_COMMAND));
    }

    #[tokio::test]
    async fn create_then_list_channels_round_trips() {
        let state = test_state().await;
        let mut create_args = Map::new();
        create_args.insert("room".to_string(), json!("science"));
        create_args.insert("channel".to_string(), json!("general"));
        let reply = run(&state, "client-1", &command("create_channel", create_args)).await;
        assert!(reply.error_code.is_none());

        let mut list_args = Map::new();
        list_args.insert("room".to_string(), json!("science"));
        let reply = run(&state, "client-1", &command("list_channels", list_args)).await;
        assert_eq!(reply.payload.get("channels"), Some(&json!(["general"])));
    }

    #[tokio::test]
    async fn casil_reload_swaps_mode() {
        let state = test_state().await;
        let mut args = Map::new();
        args.insert("mode".to_string(), json!("enforce"));
        let reply = run(&state, "client-1", &command("op.casil.reload", args)).await;
        assert_eq!(reply.payload.get("mode"), Some(&json!("enforce")));
        assert_eq!(state.casil.current_mode().await, "enforce");
    }

    #[tokio::test]
    async fn casil_reload_replaces_redaction_and_scope() {
        let state = test_state().await;
        let mut args = Map::new();
        args.insert("scope".to_string(), json!({"include": ["science:*"], "exclude": ["science:off-topic"]}));
        args.insert(
            "redaction".to_string(),
            json!({"patterns": [r"hunter\d"], "paths": ["api_key"], "transport_redaction": true}),
        );
        run(&state, "client-1", &command("op.casil.reload", args)).await;

        let reloaded = state.casil.current_config().await;
        assert_eq!(reloaded.scope.include, vec!["science:*".to_string()]);
        assert_eq!(reloaded.scope.exclude, vec!["science:off-topic".to_string()]);
        assert_eq!(reloaded.redaction.patterns, vec![r"hunter\d".to_string()]);
        assert_eq!(reloaded.redaction.paths, vec!["api_key".to_string()]);
        assert!(reloaded.redaction.transport_redaction);
    }

    #[tokio::test]
    async fn omega_lane_is_disabled() {
        let state = test_state().await;
        let reply = run(&state, "client-1", &command("op.omega.run", Map::new())).await;
        assert_eq!(reply.error_code.as_deref(), Some(error_codes::FEATURE_DISABLED));
    }
}
