//! Per-rule-type condition evaluators (spec.md §4.4.1).
//!
//! Each evaluator takes the rule's typed conditions plus whatever
//! observation set it needs and returns an [`Evaluation`]. The evaluator
//! loop (`evaluator.rs`) branches once on `RuleConditions` and never
//! inspects condition fields itself.

use chrono::{DateTime, Utc};

use fleet_common::{
    AnomalyConditions, InstanceStatus, LifecycleConditions, LifecycleEvent, ThresholdConditions,
};
use fleet_persistence::{Heartbeat, Instance, Metric};

/// Outcome of a single (rule, instance) evaluation.
pub struct Evaluation {
    pub fired: bool,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl Evaluation {
    fn not_fired() -> Self {
        Self {
            fired: false,
            title: String::new(),
            message: String::new(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// THRESHOLD: compares the latest metric's value for `metric` against
/// `threshold` via `operator`. Does not fire without a latest metric
/// (spec.md §8: "THRESHOLD with no latest metric does not fire").
/// `duration_sec` is parsed but not honoured (spec.md §9 Open Questions).
pub fn evaluate_threshold(
    conditions: &ThresholdConditions,
    instance_name: &str,
    latest_metric: Option<&Metric>,
) -> Evaluation {
    let Some(metric) = latest_metric else {
        return Evaluation::not_fired();
    };

    let value = metric.value_for(conditions.metric);
    if !conditions.operator.compare(value, conditions.threshold) {
        return Evaluation::not_fired();
    }

    Evaluation {
        fired: true,
        title: format!("{} threshold exceeded on {}", metric_label(conditions.metric), instance_name),
        message: format!(
            "{} is {:.1}% (threshold: {} {}%)",
            metric_label(conditions.metric),
            value,
            conditions.operator,
            conditions.threshold
        ),
        metadata: serde_json::json!({
            "metric": conditions.metric,
            "value": value,
            "threshold": conditions.threshold,
            "operator": conditions.operator,
        }),
    }
}

fn metric_label(metric: fleet_common::MetricName) -> &'static str {
    use fleet_common::MetricName::*;
    match metric {
        CpuPercent => "CPU usage",
        MemPercent => "Memory usage",
        DiskPercent => "Disk usage",
        LoadAvg1 => "1-minute load average",
        LoadAvg5 => "5-minute load average",
        NetBytesRecv => "Inbound network traffic",
        NetBytesSent => "Outbound network traffic",
    }
}

/// ANOMALY: baseline is the mean of `samples` over the rule's window
/// (spec.md §4.4.1). Requires at least 5 samples and a positive baseline.
pub fn evaluate_anomaly(
    conditions: &AnomalyConditions,
    instance_name: &str,
    current: Option<&Metric>,
    samples: &[Metric],
) -> Evaluation {
    let Some(current) = current else {
        return Evaluation::not_fired();
    };

    if samples.len() < 5 {
        return Evaluation::not_fired();
    }

    let values: Vec<f64> = samples.iter().map(|m| m.value_for(conditions.metric)).collect();
    let baseline = mean_excluding_zero_net(conditions.metric, &values);
    if baseline <= 0.0 {
        return Evaluation::not_fired();
    }

    let current_value = current.value_for(conditions.metric);
    let deviation = (current_value - baseline).abs() / baseline * 100.0;
    if deviation < conditions.deviation_percent {
        return Evaluation::not_fired();
    }

    Evaluation {
        fired: true,
        title: format!("{} anomaly detected on {}", metric_label(conditions.metric), instance_name),
        message: format!(
            "{} deviates {:.1}% from its {}s baseline ({:.1} vs baseline {:.1})",
            metric_label(conditions.metric),
            deviation,
            conditions.window_sec,
            current_value,
            baseline
        ),
        metadata: serde_json::json!({
            "metric": conditions.metric,
            "value": current_value,
            "baseline": baseline,
            "deviationPercent": deviation,
            "windowSec": conditions.window_sec,
        }),
    }
}

/// For net_bytes_{recv,sent} a zero sample means "no traffic observed",
/// not a valid baseline contribution (spec.md §4.4.1: "excluding zeros for
/// network metrics").
fn mean_excluding_zero_net(metric: fleet_common::MetricName, values: &[f64]) -> f64 {
    use fleet_common::MetricName::{NetBytesRecv, NetBytesSent};
    if matches!(metric, NetBytesRecv | NetBytesSent) {
        let nonzero: Vec<f64> = values.iter().copied().filter(|v| *v != 0.0).collect();
        if nonzero.is_empty() {
            return 0.0;
        }
        nonzero.iter().sum::<f64>() / nonzero.len() as f64
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// LIFECYCLE: branches on `event` (spec.md §4.4.1).
pub fn evaluate_lifecycle(
    conditions: &LifecycleConditions,
    instance: &Instance,
    latest_heartbeat: Option<&Heartbeat>,
    now: DateTime<Utc>,
) -> Evaluation {
    match conditions.event {
        LifecycleEvent::HeartbeatLost => evaluate_heartbeat_lost(conditions, instance, latest_heartbeat, now),
        LifecycleEvent::Unresponsive => evaluate_unresponsive(instance),
        LifecycleEvent::StatusChanged => evaluate_status_changed(conditions, instance),
    }
}

fn evaluate_heartbeat_lost(
    conditions: &LifecycleConditions,
    instance: &Instance,
    latest_heartbeat: Option<&Heartbeat>,
    now: DateTime<Utc>,
) -> Evaluation {
    let Some(heartbeat) = latest_heartbeat else {
        // No heartbeat at all does not fire unless the instance is RUNNING
        // (spec.md §8: "no heartbeat and instance status != RUNNING does not fire").
        if instance.status != InstanceStatus::Running {
            return Evaluation::not_fired();
        }
        return Evaluation {
            fired: true,
            title: format!("Heartbeat lost on {}", instance.name),
            message: format!("No heartbeat has ever been received (timeout: {}s)", conditions.timeout_sec),
            metadata: serde_json::json!({
                "lastHeartbeatAt": serde_json::Value::Null,
                "timeoutSec": conditions.timeout_sec,
            }),
        };
    };

    let age_seconds = (now - heartbeat.timestamp).num_seconds();
    if age_seconds < conditions.timeout_sec as i64 {
        return Evaluation::not_fired();
    }

    Evaluation {
        fired: true,
        title: format!("Heartbeat lost on {}", instance.name),
        message: format!("Last heartbeat was {age_seconds}s ago (timeout: {}s)", conditions.timeout_sec),
        metadata: serde_json::json!({
            "lastHeartbeatAt": heartbeat.timestamp,
            "ageSeconds": age_seconds,
            "timeoutSec": conditions.timeout_sec,
        }),
    }
}

fn evaluate_unresponsive(instance: &Instance) -> Evaluation {
    if !matches!(instance.status, InstanceStatus::Error | InstanceStatus::Unknown) {
        return Evaluation::not_fired();
    }
    Evaluation {
        fired: true,
        title: format!("Instance {} is unresponsive", instance.name),
        message: format!("Instance status is {}", instance.status),
        metadata: serde_json::json!({ "status": instance.status }),
    }
}

fn evaluate_status_changed(conditions: &LifecycleConditions, instance: &Instance) -> Evaluation {
    if !conditions.target_statuses.contains(&instance.status) {
        return Evaluation::not_fired();
    }
    Evaluation {
        fired: true,
        title: format!("Instance {} status changed", instance.name),
        message: format!("Instance status is now {}", instance.status),
        metadata: serde_json::json!({ "status": instance.status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::{ComparisonOperator, MetricName};
    use uuid::Uuid;

    fn metric(cpu: f64) -> Metric {
        Metric {
            instance_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            cpu_percent: cpu,
            mem_used: 1.0,
            mem_total: 1.0,
            disk_used: 1.0,
            disk_total: 1.0,
            load_avg_1: 0.0,
            load_avg_5: 0.0,
            net_bytes_sent: 0.0,
            net_bytes_recv: 0.0,
        }
    }

    #[test]
    fn threshold_fires_on_exceeded_value() {
        let conditions = ThresholdConditions {
            metric: MetricName::CpuPercent,
            operator: ComparisonOperator::Gt,
            threshold: 90.0,
            duration_sec: None,
        };
        let m = metric(92.7);
        let eval = evaluate_threshold(&conditions, "web-1", Some(&m));
        assert!(eval.fired);
        assert_eq!(eval.metadata["value"], 92.7);
        assert_eq!(eval.message, "CPU usage is 92.7% (threshold: gt 90%)");
    }

    #[test]
    fn threshold_does_not_fire_without_a_metric() {
        let conditions = ThresholdConditions {
            metric: MetricName::CpuPercent,
            operator: ComparisonOperator::Gt,
            threshold: 90.0,
            duration_sec: None,
        };
        assert!(!evaluate_threshold(&conditions, "web-1", None).fired);
    }

    #[test]
    fn anomaly_requires_five_samples() {
        let conditions = AnomalyConditions { metric: MetricName::CpuPercent, deviation_percent: 50.0, window_sec: 600 };
        let current = metric(90.0);
        let samples = vec![metric(10.0), metric(11.0), metric(9.0)];
        assert!(!evaluate_anomaly(&conditions, "web-1", Some(&current), &samples).fired);
    }

    #[test]
    fn anomaly_does_not_fire_on_zero_baseline() {
        let conditions = AnomalyConditions { metric: MetricName::NetBytesRecv, deviation_percent: 50.0, window_sec: 600 };
        let mut current = metric(0.0);
        current.net_bytes_recv = 500.0;
        let mut samples = vec![metric(0.0); 5];
        for s in &mut samples {
            s.net_bytes_recv = 0.0;
        }
        assert!(!evaluate_anomaly(&conditions, "web-1", Some(&current), &samples).fired);
    }

    #[test]
    fn anomaly_fires_on_large_deviation() {
        let conditions = AnomalyConditions { metric: MetricName::CpuPercent, deviation_percent: 50.0, window_sec: 600 };
        let current = metric(90.0);
        let samples = vec![metric(10.0), metric(12.0), metric(11.0), metric(9.0), metric(10.0)];
        let eval = evaluate_anomaly(&conditions, "web-1", Some(&current), &samples);
        assert!(eval.fired);
    }

    fn instance(status: InstanceStatus) -> Instance {
        Instance { id: Uuid::new_v4(), name: "web-1".into(), status }
    }

    #[test]
    fn heartbeat_lost_does_not_fire_without_heartbeat_unless_running() {
        let conditions = LifecycleConditions { event: LifecycleEvent::HeartbeatLost, timeout_sec: 120, target_statuses: vec![] };
        let eval = evaluate_heartbeat_lost(&conditions, &instance(InstanceStatus::Stopped), None, Utc::now());
        assert!(!eval.fired);
    }

    #[test]
    fn heartbeat_lost_fires_past_timeout() {
        let conditions = LifecycleConditions { event: LifecycleEvent::HeartbeatLost, timeout_sec: 120, target_statuses: vec![] };
        let heartbeat = Heartbeat {
            instance_id: Uuid::new_v4(),
            timestamp: Utc::now() - chrono::Duration::seconds(180),
            agent_version: "1.0".into(),
            uptime_sec: 10,
        };
        let eval = evaluate_heartbeat_lost(&conditions, &instance(InstanceStatus::Running), Some(&heartbeat), Utc::now());
        assert!(eval.fired);
        assert!(eval.metadata["ageSeconds"].as_i64().unwrap() >= 180);
    }

    #[test]
    fn unresponsive_fires_on_error_or_unknown() {
        assert!(evaluate_unresponsive(&instance(InstanceStatus::Error)).fired);
        assert!(evaluate_unresponsive(&instance(InstanceStatus::Unknown)).fired);
        assert!(!evaluate_unresponsive(&instance(InstanceStatus::Running)).fired);
    }

    #[test]
    fn status_changed_uses_default_targets() {
        let conditions = LifecycleConditions {
            event: LifecycleEvent::StatusChanged,
            timeout_sec: 120,
            target_statuses: vec![InstanceStatus::Error, InstanceStatus::Unknown],
        };
        assert!(evaluate_status_changed(&conditions, &instance(InstanceStatus::Error)).fired);
        assert!(!evaluate_status_changed(&conditions, &instance(InstanceStatus::Running)).fired);
    }
}
