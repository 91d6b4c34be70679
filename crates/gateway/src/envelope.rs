//! The wire envelope (spec.md §4.1) and per-channel payload schemas (spec.md §6).
//!
//! Every WebSocket frame is one JSON object: `{channel, type, instanceId?,
//! correlationId?, ts, data}`. `data` is typed per `(channel, type)`, but the
//! gateway only needs to look at `channel`/`type` to route — the payload
//! itself is threaded through as `serde_json::Value` and decoded by whatever
//! handles that specific type, matching the "envelopes instead of
//! exceptions" design note (spec.md §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fleet_common::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelName {
    Metrics,
    Heartbeat,
    Logs,
    Terminal,
    Events,
    Commands,
}

impl ChannelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelName::Metrics => "metrics",
            ChannelName::Heartbeat => "heartbeat",
            ChannelName::Logs => "logs",
            ChannelName::Terminal => "terminal",
            ChannelName::Events => "events",
            ChannelName::Commands => "commands",
        }
    }
}

/// The outer JSON wrapper of every WebSocket frame (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "instanceId", skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default, rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub ts: i64,
    pub data: Value,
}

impl Envelope {
    pub fn new(channel: &str, kind: &str, instance_id: Option<InstanceId>, data: Value) -> Self {
        Self {
            channel: channel.to_string(),
            kind: kind.to_string(),
            instance_id,
            correlation_id: None,
            ts: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// `{channel: events, type: error, data: {code, message}}` (spec.md §4.1).
    pub fn error(code: &str, message: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self::new(
            "events",
            "error",
            None,
            serde_json::json!({"code": code, "message": message.into()}),
        )
        .with_correlation(correlation_id)
    }

    pub fn ack(correlation_id: Option<String>) -> Self {
        Self::new("events", "ack", None, serde_json::json!({"ok": true})).with_correlation(correlation_id)
    }

    /// Rebuilds an envelope for fan-out to a subscriber, preserving the
    /// producer's original `ts` and the instance id the broker key carries
    /// (spec.md §4.1: "server preserves [instanceId] on fan-out").
    pub fn relay(channel: &str, kind: &str, instance_id: Option<InstanceId>, ts: i64, data: Value) -> Self {
        Self {
            channel: channel.to_string(),
            kind: kind.to_string(),
            instance_id,
            correlation_id: None,
            ts,
            data,
        }
    }
}

/// What gets handed to the broker for a given publish (spec.md §4.3): the
/// envelope's `type` and `data`/`ts` are carried through the broker message
/// payload; `channel` and `instanceId` live in the broker key/`BrokerMessage`
/// itself and are reattached on relay.
pub fn to_broker_payload(kind: &str, ts: i64, data: &Value) -> Value {
    serde_json::json!({"type": kind, "ts": ts, "data": data})
}

/// `metrics:update` payload (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdatePayload {
    pub cpu_percent: f64,
    pub memory_used: f64,
    pub memory_total: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub load_avg: Vec<f64>,
    #[serde(default)]
    pub network_bytes_in: f64,
    #[serde(default)]
    pub network_bytes_out: f64,
    #[serde(default)]
    pub process_count: i64,
}

/// `heartbeat:ping` payload (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPingPayload {
    pub agent_version: String,
    pub uptime: i64,
}

/// `event:instance` payload (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceEventPayload {
    pub event_type: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Inbound `subscribe` request: `{channel, instanceId?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeRequest {
    pub channel: String,
    #[serde(default, rename = "instanceId")]
    pub instance_id: Option<InstanceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_json() {
        let env = Envelope::new(
            "metrics",
            "metrics:update",
            Some(InstanceId::new()),
            serde_json::json!({"cpuPercent": 50.0}),
        )
        .with_correlation(Some("abc".to_string()));

        let json = serde_json::to_value(&env).unwrap();
        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.channel, "metrics");
        assert_eq!(back.kind, "metrics:update");
        assert_eq!(back.correlation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn parse_error_envelope_shape() {
        let env = Envelope::error("PARSE_ERROR", "bad json", None);
        assert_eq!(env.channel, "events");
        assert_eq!(env.kind, "error");
        assert_eq!(env.data["code"], "PARSE_ERROR");
    }

    #[test]
    fn missing_instance_id_defaults_to_none() {
        let raw = r#"{"channel":"heartbeat","type":"heartbeat:ping","ts":1,"data":{}}"#;
        let env: Envelope = serde_json::from_str(raw).unwrap();
        assert!(env.instance_id.is_none());
    }
}
