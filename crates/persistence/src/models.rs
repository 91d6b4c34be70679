//! Row types returned by the persistence façade (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleet_common::{AlertStatus, DriftStatus, InstanceStatus, RuleConditions, RuleType, Severity};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub hash: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub mem_used: f64,
    pub mem_total: f64,
    pub disk_used: f64,
    pub disk_total: f64,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub net_bytes_sent: f64,
    pub net_bytes_recv: f64,
}

impl Metric {
    pub fn mem_percent(&self) -> f64 {
        if self.mem_total <= 0.0 {
            0.0
        } else {
            self.mem_used / self.mem_total * 100.0
        }
    }

    pub fn disk_percent(&self) -> f64 {
        if self.disk_total <= 0.0 {
            0.0
        } else {
            self.disk_used / self.disk_total * 100.0
        }
    }

    pub fn value_for(&self, metric: fleet_common::MetricName) -> f64 {
        use fleet_common::MetricName::*;
        match metric {
            CpuPercent => self.cpu_percent,
            MemPercent => self.mem_percent(),
            DiskPercent => self.disk_percent(),
            LoadAvg1 => self.load_avg_1,
            LoadAvg5 => self.load_avg_5,
            NetBytesRecv => self.net_bytes_recv,
            NetBytesSent => self.net_bytes_sent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_version: String,
    pub uptime_sec: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: Severity,
    pub instance_id: Option<Uuid>,
    pub conditions: RuleConditions,
    pub cooldown_sec: i64,
    pub enabled: bool,
    pub channel_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub instance_id: Option<Uuid>,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub status: AlertStatus,
    pub fired_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub dedupe_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: fleet_common::ChannelType,
    pub config: fleet_common::ChannelConfig,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub channel_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub declared: serde_json::Value,
    pub actual: serde_json::Value,
    pub drift_status: DriftStatus,
    pub config_hash: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftEvent {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub severity: Severity,
    pub field_path: String,
    pub declared_val: Option<serde_json::Value>,
    pub actual_val: Option<serde_json::Value>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub id: Uuid,
    pub instance_id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    /// Ciphertext, never plaintext (spec.md §3). Excluded from ordinary
    /// read responses; only the explicit reveal operation surfaces it.
    #[serde(skip_serializing)]
    pub value_ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The explicit, role-gated view that exposes a secret's ciphertext (spec.md
/// §3: "reveal requires elevated role"). Decrypting the ciphertext is an
/// external KMS/envelope-encryption boundary out of scope for the core.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedSecret {
    pub id: Uuid,
    pub name: String,
    pub value_ciphertext: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub severity: Severity,
    pub package: String,
    pub version: String,
    pub advisory: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKey {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub fingerprint: String,
    pub revoked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftSummary {
    pub by_severity: std::collections::HashMap<String, i64>,
    pub by_status: std::collections::HashMap<String, i64>,
    pub instances_with_drift: i64,
    pub total_unresolved: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySummary {
    pub critical_vulnerabilities: i64,
    pub overdue_secrets: i64,
    pub revoked_keys: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub active_by_severity: std::collections::HashMap<String, i64>,
    pub by_status: std::collections::HashMap<String, i64>,
}

#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub rule_type: Option<RuleType>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub instance_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub instance_id: Option<Uuid>,
    pub rule_id: Option<Uuid>,
}
