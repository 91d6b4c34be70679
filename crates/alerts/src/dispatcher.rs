//! The dispatcher: delivers a fired alert to its rule's enabled channels
//! (spec.md §4.4.3).
//!
//! Delivery is "at-least-partial": every enabled channel is attempted
//! concurrently and one channel's failure never cancels the others. Each
//! attempt, success or failure, is recorded as an immutable
//! `AlertNotification` row.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use fleet_broker::Broker;
use fleet_common::{ChannelConfig, ChannelType, InstanceId, Result, Severity};
use fleet_persistence::{AlertRepo, ChannelRepo, NewNotification, NotificationChannel, NotificationRepo, RuleRepo};

use crate::adapters::{chat, email, inapp, webhook};

/// The stable JSON shape sent to every channel (spec.md §4.4.3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub alert_id: Uuid,
    pub rule_id: Uuid,
    pub rule_name: String,
    pub rule_type: fleet_common::RuleType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub status: fleet_common::AlertStatus,
    pub fired_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

pub struct TestResult {
    pub success: bool,
    pub error: Option<String>,
}

pub struct Dispatcher {
    alerts: Arc<dyn AlertRepo>,
    rules: Arc<dyn RuleRepo>,
    channels: Arc<dyn ChannelRepo>,
    notifications: Arc<dyn NotificationRepo>,
    broker: Arc<dyn Broker>,
    http_timeout: Duration,
    user_agent: String,
}

impl Dispatcher {
    pub fn new(
        alerts: Arc<dyn AlertRepo>,
        rules: Arc<dyn RuleRepo>,
        channels: Arc<dyn ChannelRepo>,
        notifications: Arc<dyn NotificationRepo>,
        broker: Arc<dyn Broker>,
        http_timeout: Duration,
        user_agent: String,
    ) -> Self {
        Self { alerts, rules, channels, notifications, broker, http_timeout, user_agent }
    }

    /// Loads the alert with its rule and the rule's enabled channels, builds
    /// the payload, and delivers on every channel concurrently (spec.md
    /// §4.4.3). Called fire-and-forget by the evaluator; errors are logged,
    /// never propagated, since there is no caller left to hand them to.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, alert_id: Uuid) {
        if let Err(err) = self.dispatch_inner(alert_id).await {
            error!(alert_id = %alert_id, error = %err, "dispatch failed to load its working set");
        }
    }

    async fn dispatch_inner(&self, alert_id: Uuid) -> Result<()> {
        let Some(alert) = self.alerts.get(alert_id).await? else {
            warn!(alert_id = %alert_id, "dispatch: alert vanished before delivery");
            return Ok(());
        };
        let Some(rule) = self.rules.get(alert.rule_id).await? else {
            warn!(alert_id = %alert_id, rule_id = %alert.rule_id, "dispatch: rule vanished before delivery");
            return Ok(());
        };
        let channels = self.channels.get_many(&rule.channel_ids).await?;
        let enabled: Vec<NotificationChannel> = channels.into_iter().filter(|c| c.enabled).collect();

        let payload = AlertPayload {
            alert_id: alert.id,
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type,
            instance_id: alert.instance_id,
            severity: alert.severity,
            title: alert.title.clone(),
            message: alert.message.clone(),
            status: alert.status,
            fired_at: alert.fired_at,
            metadata: Some(alert.metadata.clone()),
        };

        let deliveries = enabled.into_iter().map(|channel| self.deliver_and_record(alert.id, channel, &payload));
        futures::future::join_all(deliveries).await;
        Ok(())
    }

    async fn deliver_and_record(&self, alert_id: Uuid, channel: NotificationChannel, payload: &AlertPayload) {
        let outcome = self.deliver(&channel, payload).await;
        let (success, error) = match &outcome {
            Ok(()) => (true, None),
            Err(message) => (false, Some(message.clone())),
        };

        if !success {
            warn!(alert_id = %alert_id, channel_id = %channel.id, error = ?error, "notification delivery failed");
        }

        let payload_value = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        let record_result = self
            .notifications
            .create(NewNotification {
                alert_id,
                channel_id: channel.id,
                success,
                error,
                payload: payload_value,
            })
            .await;
        // A failure to record MUST be logged but MUST NOT raise (spec.md §4.4.3).
        if let Err(err) = record_result {
            error!(alert_id = %alert_id, channel_id = %channel.id, error = %err, "failed to record notification attempt");
        } else {
            info!(alert_id = %alert_id, channel_id = %channel.id, success, "notification delivery recorded");
        }
    }

    async fn deliver(&self, channel: &NotificationChannel, payload: &AlertPayload) -> std::result::Result<(), String> {
        match &channel.config {
            ChannelConfig::Webhook(config) => {
                webhook::deliver(config, payload, self.http_timeout, &self.user_agent).await
            }
            ChannelConfig::Slack(config) => chat::deliver(config, payload, self.http_timeout).await,
            ChannelConfig::Email(config) => email::deliver(config, payload).await,
            ChannelConfig::InApp(_) => {
                let instance_id = payload.instance_id.map(InstanceId::from);
                inapp::deliver(self.broker.as_ref(), instance_id.as_ref(), payload).await
            }
        }
    }

    /// Synthesises a canned payload and exercises the adapter for `channel`
    /// without persisting anything (spec.md §4.4.3: "test delivery").
    pub async fn test(&self, channel_type: ChannelType, config: &ChannelConfig) -> TestResult {
        let payload = AlertPayload {
            alert_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            rule_name: "Test Rule".to_string(),
            rule_type: fleet_common::RuleType::Threshold,
            instance_id: None,
            severity: Severity::Info,
            title: "Test Notification".to_string(),
            message: "This is a test notification from fleet-console.".to_string(),
            status: fleet_common::AlertStatus::Active,
            fired_at: Utc::now(),
            metadata: None,
        };

        let outcome = match (channel_type, config) {
            (ChannelType::Webhook, ChannelConfig::Webhook(c)) => {
                webhook::deliver(c, &payload, self.http_timeout, &self.user_agent).await
            }
            (ChannelType::Slack, ChannelConfig::Slack(c)) => chat::deliver(c, &payload, self.http_timeout).await,
            (ChannelType::Email, ChannelConfig::Email(c)) => email::deliver(c, &payload).await,
            (ChannelType::InApp, ChannelConfig::InApp(_)) => {
                inapp::deliver(self.broker.as_ref(), Some(&InstanceId::new()), &payload).await
            }
            _ => Err("channel type does not match its configured config".to_string()),
        };

        match outcome {
            Ok(()) => TestResult { success: true, error: None },
            Err(error) => TestResult { success: false, error: Some(error) },
        }
    }
}
