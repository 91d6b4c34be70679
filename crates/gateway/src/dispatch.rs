//! The inbound envelope dispatch table (spec.md §4.2).
//!
//! One function per `envelope.type`; routing lives in [`dispatch`]. Errors
//! never propagate out of this module — every failure becomes an `error`
//! envelope sent back down the same socket (spec.md §7: "Handler errors").

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use tracing::{error, instrument, warn};

use fleet_common::{InstanceId, Role};
use fleet_persistence::{Heartbeat, Metric};

use crate::envelope::{to_broker_payload, Envelope, HeartbeatPingPayload, InstanceEventPayload, MetricsUpdatePayload, SubscribeRequest};
use crate::registry::ConnectionHandle;
use crate::state::GatewayState;

const CHANNEL_METRICS: &str = "metrics";
const CHANNEL_HEARTBEAT: &str = "heartbeat";
const CHANNEL_LOGS: &str = "logs";
const CHANNEL_TERMINAL: &str = "terminal";
const CHANNEL_EVENTS: &str = "events";
const CHANNEL_COMMANDS: &str = "commands";

/// Parses one inbound frame and dispatches it, replying on `conn` with an
/// `error`/`ack`/reply envelope as appropriate. Never panics and never lets
/// a handler error escape (spec.md §7).
#[instrument(skip(state, conn, raw), fields(connection_id = %conn.id))]
pub async fn dispatch(state: &GatewayState, conn: &Arc<ConnectionHandle>, raw: &str) {
    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "failed to parse inbound envelope");
            reply(conn, Envelope::error("PARSE_ERROR", e.to_string(), None));
            return;
        }
    };

    let correlation_id = envelope.correlation_id.clone();
    let result = route(state, conn, &envelope).await;
    if let Err(err) = result {
        error!(
            connection_id = %conn.id,
            correlation_id = ?correlation_id,
            error = %err,
            "handler error dispatching envelope"
        );
        reply(conn, Envelope::error(err.code, err.message, correlation_id));
    }
}

struct HandlerError {
    code: &'static str,
    message: String,
}

impl HandlerError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

fn reply(conn: &Arc<ConnectionHandle>, envelope: Envelope) {
    if let Ok(text) = serde_json::to_string(&envelope) {
        conn.send(Message::Text(text.into()));
    }
}

/// Resolves the target instance id for an operation: an agent's bound
/// instance id on its own principal, or the instance id a browser supplied
/// explicitly in the envelope (spec.md §4.2: "clients MAY omit inbound" for
/// the principal's own channel, but a browser targeting an instance must
/// name it).
fn target_instance_id(conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<InstanceId, HandlerError> {
    conn.principal
        .instance_id
        .clone()
        .or_else(|| envelope.instance_id.clone())
        .ok_or_else(|| HandlerError::new("NO_INSTANCE_ID", "no instance id on principal or envelope"))
}

async fn route(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    match envelope.kind.as_str() {
        "metrics:update" => handle_metrics_update(state, conn, envelope).await,
        "heartbeat:ping" => handle_heartbeat_ping(state, conn, envelope).await,
        "log:line" | "log:batch" => handle_log(state, conn, envelope).await,
        "terminal:create" | "terminal:data" | "terminal:resize" | "terminal:close" => {
            handle_terminal(state, conn, envelope).await
        }
        "event:instance" => handle_event_instance(state, conn, envelope).await,
        "command:exec" => handle_command_exec(state, conn, envelope).await,
        "command:result" => handle_command_result(state, conn, envelope).await,
        "subscribe" => handle_subscribe(state, conn, envelope).await,
        other => {
            warn!(kind = %other, "unknown inbound message type");
            reply(conn, Envelope::error("UNKNOWN_MESSAGE_TYPE", format!("unknown type {other}"), envelope.correlation_id.clone()));
            Ok(())
        }
    }
}

fn require_agent(conn: &Arc<ConnectionHandle>) -> Result<(), HandlerError> {
    if !conn.principal.is_agent() {
        return Err(HandlerError::new("FORBIDDEN", "operation requires an agent principal"));
    }
    Ok(())
}

/// "browser (OPERATOR+)" per spec.md §4.2's terminal dispatch row: ADMIN or
/// OPERATOR, not DEVELOPER/VIEWER.
fn require_operator_or_agent(conn: &Arc<ConnectionHandle>) -> Result<(), HandlerError> {
    if conn.principal.is_agent() {
        return Ok(());
    }
    match conn.principal.role {
        Role::Admin | Role::Operator => Ok(()),
        _ => Err(HandlerError::new("FORBIDDEN", "terminal operations require OPERATOR role or higher")),
    }
}

async fn handle_metrics_update(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;

    let payload: MetricsUpdatePayload = serde_json::from_value(envelope.data.clone())
        .map_err(|e| HandlerError::new("VALIDATION_ERROR", e.to_string()))?;

    let (load_avg_1, load_avg_5) = (
        payload.load_avg.first().copied().unwrap_or(0.0),
        payload.load_avg.get(1).copied().unwrap_or(0.0),
    );

    let metric = Metric {
        instance_id: instance_id.0,
        timestamp: Utc::now(),
        cpu_percent: payload.cpu_percent,
        mem_used: payload.memory_used,
        mem_total: payload.memory_total,
        disk_used: payload.disk_used,
        disk_total: payload.disk_total,
        load_avg_1,
        load_avg_5,
        net_bytes_sent: payload.network_bytes_out,
        net_bytes_recv: payload.network_bytes_in,
    };

    state
        .metrics
        .insert(&metric)
        .await
        .map_err(|e| HandlerError::new("PERSISTENCE_ERROR", e.to_string()))?;

    publish(state, CHANNEL_METRICS, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await?;
    Ok(())
}

async fn handle_heartbeat_ping(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;

    let payload: HeartbeatPingPayload = serde_json::from_value(envelope.data.clone())
        .map_err(|e| HandlerError::new("VALIDATION_ERROR", e.to_string()))?;

    let heartbeat = Heartbeat {
        instance_id: instance_id.0,
        timestamp: Utc::now(),
        agent_version: payload.agent_version,
        uptime_sec: payload.uptime,
    };

    state
        .heartbeats
        .insert(&heartbeat)
        .await
        .map_err(|e| HandlerError::new("PERSISTENCE_ERROR", e.to_string()))?;

    reply(
        conn,
        Envelope::new(CHANNEL_HEARTBEAT, "heartbeat:pong", Some(instance_id.clone()), serde_json::json!({"ok": true}))
            .with_correlation(envelope.correlation_id.clone()),
    );

    // Publish the pong too, so browsers subscribed to `heartbeat` see last-seen (spec.md §4.2).
    publish(state, CHANNEL_HEARTBEAT, &instance_id, "heartbeat:pong", envelope.ts, &serde_json::json!({"ok": true})).await?;
    Ok(())
}

async fn handle_log(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;
    publish(state, CHANNEL_LOGS, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await
}

async fn handle_terminal(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_operator_or_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;
    publish(state, CHANNEL_TERMINAL, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await
}

async fn handle_event_instance(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;

    let payload: InstanceEventPayload = serde_json::from_value(envelope.data.clone())
        .map_err(|e| HandlerError::new("VALIDATION_ERROR", e.to_string()))?;
    let metadata = payload.metadata.unwrap_or(serde_json::Value::Null);

    state
        .events
        .record(instance_id.0, &payload.event_type, &metadata)
        .await
        .map_err(|e| HandlerError::new("PERSISTENCE_ERROR", e.to_string()))?;

    publish(state, CHANNEL_EVENTS, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await
}

async fn handle_command_exec(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    if !conn.principal.role.can_write() {
        return Err(HandlerError::new("FORBIDDEN", "VIEWER cannot dispatch commands"));
    }
    let instance_id = target_instance_id(conn, envelope)?;
    publish(state, CHANNEL_COMMANDS, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await
}

async fn handle_command_result(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    require_agent(conn)?;
    let instance_id = target_instance_id(conn, envelope)?;
    publish(state, CHANNEL_COMMANDS, &instance_id, &envelope.kind, envelope.ts, &envelope.data).await
}

async fn handle_subscribe(state: &GatewayState, conn: &Arc<ConnectionHandle>, envelope: &Envelope) -> Result<(), HandlerError> {
    let request: SubscribeRequest = serde_json::from_value(envelope.data.clone())
        .map_err(|e| HandlerError::new("VALIDATION_ERROR", e.to_string()))?;

    let subscription = match &request.instance_id {
        Some(instance_id) => state.broker.subscribe(&request.channel, instance_id).await,
        None => state.broker.subscribe_all(&request.channel).await,
    }
    .map_err(|e| HandlerError::new("BROKER_ERROR", e.to_string()))?;

    let mut receiver = subscription.receiver.resubscribe();
    let forward_conn = conn.clone();
    let channel_name = request.channel.clone();
    tokio::spawn(async move {
        while let Ok(message) = receiver.recv().await {
            let kind = message.payload.get("type").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let ts = message.payload.get("ts").and_then(|v| v.as_i64()).unwrap_or(0);
            let data = message.payload.get("data").cloned().unwrap_or(serde_json::Value::Null);
            let out = Envelope::relay(&channel_name, &kind, Some(message.instance_id), ts, data);
            if let Ok(text) = serde_json::to_string(&out) {
                forward_conn.send(Message::Text(text.into()));
            }
        }
    });

    conn.add_subscription(subscription).await;
    reply(conn, Envelope::ack(envelope.correlation_id.clone()));
    Ok(())
}

async fn publish(
    state: &GatewayState,
    channel: &str,
    instance_id: &InstanceId,
    kind: &str,
    ts: i64,
    data: &serde_json::Value,
) -> Result<(), HandlerError> {
    state
        .broker
        .publish(channel, instance_id, to_broker_payload(kind, ts, data))
        .await
        .map_err(|e| HandlerError::new("BROKER_ERROR", e.to_string()))
}
