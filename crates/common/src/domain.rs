//! Shared domain enums and tagged unions.
//!
//! Rule conditions and channel configs are modeled as closed sum types keyed
//! by their `type` discriminant (spec.md §9: "tagged variants over
//! inheritance") rather than an untyped JSON bag, so the evaluator and the
//! dispatcher branch once on `type` and the compiler enforces that the shape
//! of `conditions`/`config` matches.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ids::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Operator,
    Developer,
    Viewer,
}

impl Role {
    /// VIEWER cannot dispatch commands or mutate rules/channels/alerts (spec.md §3).
    pub fn can_write(&self) -> bool {
        !matches!(self, Role::Viewer)
    }

    /// Secret reveal requires an elevated role (spec.md §3: "reveal requires
    /// elevated role").
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum InstanceStatus {
    Running,
    Error,
    Unknown,
    Stopped,
    Provisioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Silenced,
}

impl AlertStatus {
    /// ACTIVE and ACKNOWLEDGED are "non-terminal" (spec.md §3 dedupeKey invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Silenced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum RuleType {
    Threshold,
    Anomaly,
    Lifecycle,
    Security,
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChannelType {
    Webhook,
    Slack,
    Email,
    InApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum DriftStatus {
    Clean,
    Drifted,
    Unknown,
    Error,
}

/// Metric names usable in THRESHOLD/ANOMALY rule conditions (spec.md §4.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricName {
    CpuPercent,
    MemPercent,
    DiskPercent,
    LoadAvg1,
    LoadAvg5,
    NetBytesRecv,
    NetBytesSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ComparisonOperator {
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Gt => value > threshold,
            ComparisonOperator::Gte => value >= threshold,
            ComparisonOperator::Lt => value < threshold,
            ComparisonOperator::Lte => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleEvent {
    HeartbeatLost,
    Unresponsive,
    StatusChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConditions {
    pub metric: MetricName,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    /// Reserved extension point; not honoured by the evaluator (spec.md §9 Open Questions).
    #[serde(default)]
    pub duration_sec: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConditions {
    pub metric: MetricName,
    pub deviation_percent: f64,
    pub window_sec: u64,
}

fn default_heartbeat_timeout() -> u64 {
    120
}

fn default_target_statuses() -> Vec<InstanceStatus> {
    vec![InstanceStatus::Error, InstanceStatus::Unknown]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConditions {
    pub event: LifecycleEvent,
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_sec: u64,
    #[serde(default = "default_target_statuses")]
    pub target_statuses: Vec<InstanceStatus>,
}

/// The closed union of rule conditions, keyed by `type` (spec.md §3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RuleConditions {
    Threshold(ThresholdConditions),
    Anomaly(AnomalyConditions),
    Lifecycle(LifecycleConditions),
    /// Stub: does not fire in the core (spec.md §4.4.1).
    Security(serde_json::Value),
    /// Stub: does not fire in the core (spec.md §4.4.1).
    Cost(serde_json::Value),
}

impl RuleConditions {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConditions::Threshold(_) => RuleType::Threshold,
            RuleConditions::Anomaly(_) => RuleType::Anomaly,
            RuleConditions::Lifecycle(_) => RuleType::Lifecycle,
            RuleConditions::Security(_) => RuleType::Security,
            RuleConditions::Cost(_) => RuleType::Cost,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InAppConfig {}

/// The closed union of notification channel configs, keyed by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChannelConfig {
    Webhook(WebhookConfig),
    Slack(SlackConfig),
    Email(EmailConfig),
    InApp(InAppConfig),
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Webhook(_) => ChannelType::Webhook,
            ChannelConfig::Slack(_) => ChannelType::Slack,
            ChannelConfig::Email(_) => ChannelType::Email,
            ChannelConfig::InApp(_) => ChannelType::InApp,
        }
    }
}

/// `dedupeKey = ruleId:instanceId` (spec.md §3). Instance-unscoped rules use
/// the literal string `"*"` in place of the instance id.
pub fn dedupe_key(rule_id: &crate::ids::RuleId, instance_id: Option<&InstanceId>) -> String {
    match instance_id {
        Some(id) => format!("{}:{}", rule_id, id),
        None => format!("{}:*", rule_id),
    }
}

/// Broker key format for the shared back-end (spec.md §4.3/§6):
/// `fleet:instance:<instanceId>:<channel>`.
pub fn broker_key(channel: &str, instance_id: &InstanceId) -> String {
    format!("fleet:instance:{}:{}", instance_id, channel)
}

/// Broadcast pattern key: `fleet:instance:*:<channel>`.
pub fn broker_pattern_key(channel: &str) -> String {
    format!("fleet:instance:*:{}", channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RuleId;

    #[test]
    fn dedupe_key_scoped_to_instance() {
        let rule_id = RuleId::new();
        let instance_id = InstanceId::new();
        let key = dedupe_key(&rule_id, Some(&instance_id));
        assert_eq!(key, format!("{}:{}", rule_id, instance_id));
    }

    #[test]
    fn dedupe_key_unscoped_rule() {
        let rule_id = RuleId::new();
        let key = dedupe_key(&rule_id, None);
        assert!(key.ends_with(":*"));
    }

    #[test]
    fn threshold_conditions_roundtrip() {
        let conditions = RuleConditions::Threshold(ThresholdConditions {
            metric: MetricName::CpuPercent,
            operator: ComparisonOperator::Gt,
            threshold: 90.0,
            duration_sec: None,
        });
        let json = serde_json::to_value(&conditions).unwrap();
        assert_eq!(json["type"], "THRESHOLD");
        let back: RuleConditions = serde_json::from_value(json).unwrap();
        assert_eq!(back.rule_type(), RuleType::Threshold);
    }

    #[test]
    fn comparison_operator_matches_spec() {
        assert!(ComparisonOperator::Gt.compare(92.7, 90.0));
        assert!(!ComparisonOperator::Gt.compare(90.0, 90.0));
        assert!(ComparisonOperator::Gte.compare(90.0, 90.0));
    }

    #[test]
    fn broker_key_format() {
        let instance_id = InstanceId::new();
        assert_eq!(
            broker_key("metrics", &instance_id),
            format!("fleet:instance:{}:metrics", instance_id)
        );
        assert_eq!(broker_pattern_key("metrics"), "fleet:instance:*:metrics");
    }
}
