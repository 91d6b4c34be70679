//! In-app delivery: no network side effect. The persisted `AlertNotification`
//! row plus fan-out of the alert on the broker's `events` channel together
//! constitute the delivery (spec.md §4.4.3).

use fleet_broker::Broker;
use fleet_common::InstanceId;

use crate::dispatcher::AlertPayload;

const EVENTS_CHANNEL: &str = "events";

/// Publishes `payload` on the `events` channel for `instance_id`. An alert
/// with no `instance_id` (an unscoped rule) has nothing to fan out to — the
/// persisted notification row is itself the delivery, so this is a no-op
/// success rather than an error.
pub async fn deliver(
    broker: &dyn Broker,
    instance_id: Option<&InstanceId>,
    payload: &AlertPayload,
) -> Result<(), String> {
    let Some(instance_id) = instance_id else {
        return Ok(());
    };

    let data = serde_json::to_value(payload).map_err(|e| format!("failed to serialize payload: {e}"))?;
    broker
        .publish(EVENTS_CHANNEL, instance_id, data)
        .await
        .map_err(|e| format!("broker publish failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_broker::InProcessBroker;
    use uuid::Uuid;

    fn payload(instance_id: Option<Uuid>) -> AlertPayload {
        AlertPayload {
            alert_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            rule_name: "Heartbeat lost".into(),
            rule_type: fleet_common::RuleType::Lifecycle,
            instance_id,
            severity: fleet_common::Severity::Critical,
            title: "Instance unresponsive".into(),
            message: "No heartbeat received".into(),
            status: fleet_common::AlertStatus::Active,
            fired_at: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn unscoped_alert_is_a_no_op_success() {
        let broker = InProcessBroker::new();
        let result = deliver(&broker, None, &payload(None)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn scoped_alert_publishes_on_events_channel() {
        let broker = InProcessBroker::new();
        let instance_id = InstanceId::new();
        let mut sub = broker.subscribe(EVENTS_CHANNEL, &instance_id).await.expect("subscribe");

        let result = deliver(&broker, Some(&instance_id), &payload(Some(instance_id.0))).await;
        assert!(result.is_ok());

        let received = sub.receiver.recv().await.expect("message delivered");
        assert_eq!(received.channel, EVENTS_CHANNEL);
        assert_eq!(received.instance_id, instance_id);
    }
}
