//! The periodic evaluator tick (spec.md §4.4.1).
//!
//! A single timer drives a reentrancy-guarded tick: load enabled rules and
//! the instance/metric/heartbeat snapshot once, then evaluate every
//! (rule, instance) pair concurrently. Firing hands the new alert id to the
//! dispatcher; ceasing to fire auto-resolves the existing non-terminal
//! alert. Errors in one pair are logged and skipped (spec.md §5: "Errors in
//! one pair MUST NOT abort the tick").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use fleet_common::{dedupe_key, InstanceId, RuleConditions};
use fleet_persistence::{AlertRepo, Heartbeat, HeartbeatRepo, Instance, InstanceRepo, Metric, MetricRepo, NewAlert, RuleRepo};

use crate::conditions::{evaluate_anomaly, evaluate_lifecycle, evaluate_threshold};
use crate::dispatcher::Dispatcher;

/// Dependencies the evaluator reads from on every tick.
pub struct Evaluator {
    rules: Arc<dyn RuleRepo>,
    instances: Arc<dyn InstanceRepo>,
    metrics: Arc<dyn MetricRepo>,
    heartbeats: Arc<dyn HeartbeatRepo>,
    alerts: Arc<dyn AlertRepo>,
    dispatcher: Arc<Dispatcher>,
    /// Single mutable bit guarding reentrancy (spec.md §5): only one tick
    /// routine runs per process, so a plain atomic suffices.
    ticking: AtomicBool,
}

impl Evaluator {
    pub fn new(
        rules: Arc<dyn RuleRepo>,
        instances: Arc<dyn InstanceRepo>,
        metrics: Arc<dyn MetricRepo>,
        heartbeats: Arc<dyn HeartbeatRepo>,
        alerts: Arc<dyn AlertRepo>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self { rules, instances, metrics, heartbeats, alerts, dispatcher, ticking: AtomicBool::new(false) }
    }

    /// Runs the tick loop forever. The timer fires an immediate tick at
    /// startup, then every `tick_ms` (spec.md §4.4.1: "starts an immediate
    /// initial tick at startup (non-blocking)").
    pub async fn run(self: Arc<Self>, tick_ms: u64) {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let evaluator = self.clone();
            tokio::spawn(async move { evaluator.tick().await });
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) {
        if self.ticking.swap(true, Ordering::SeqCst) {
            warn!("evaluator tick skipped: previous tick still running");
            return;
        }
        let result = self.run_tick().await;
        self.ticking.store(false, Ordering::SeqCst);
        if let Err(err) = result {
            error!(error = %err, "evaluator tick failed to load its working set");
        }
    }

    async fn run_tick(&self) -> fleet_common::Result<()> {
        let rules = self.rules.list_enabled().await?;
        let instances = self.instances.list_all().await?;
        let instances_by_id: HashMap<Uuid, &Instance> = instances.iter().map(|i| (i.id, i)).collect();
        let latest_metrics: HashMap<Uuid, Metric> =
            self.metrics.latest_per_instance().await?.into_iter().map(|m| (m.instance_id, m)).collect();
        let latest_heartbeats: HashMap<Uuid, Heartbeat> =
            self.heartbeats.latest_per_instance().await?.into_iter().map(|h| (h.instance_id, h)).collect();

        let mut handles = Vec::new();
        for rule in rules {
            let targets: Vec<Uuid> = match rule.instance_id {
                Some(id) => vec![id],
                None => instances.iter().map(|i| i.id).collect(),
            };
            for instance_id in targets {
                let Some(instance) = instances_by_id.get(&instance_id) else {
                    continue;
                };
                handles.push(self.evaluate_pair(
                    rule.clone(),
                    (*instance).clone(),
                    latest_metrics.get(&instance_id).cloned(),
                    latest_heartbeats.get(&instance_id).cloned(),
                ));
            }
        }

        // Per-(rule, instance) work is unordered within a tick (spec.md §5).
        futures::future::join_all(handles).await;
        Ok(())
    }

    #[instrument(skip(self, rule, instance, metric, heartbeat), fields(rule_id = %rule.id, instance_id = %instance.id))]
    async fn evaluate_pair(&self, rule: fleet_persistence::AlertRule, instance: Instance, metric: Option<Metric>, heartbeat: Option<Heartbeat>) {
        if let Err(err) = self.evaluate_pair_inner(&rule, &instance, metric.as_ref(), heartbeat.as_ref()).await {
            error!(error = %err, "evaluation failed for rule/instance pair, skipping");
        }
    }

    async fn evaluate_pair_inner(
        &self,
        rule: &fleet_persistence::AlertRule,
        instance: &Instance,
        metric: Option<&Metric>,
        heartbeat: Option<&Heartbeat>,
    ) -> fleet_common::Result<()> {
        let instance_id = InstanceId(instance.id);
        let key = dedupe_key(&fleet_common::RuleId(rule.id), Some(&instance_id));

        let cooldown = chrono::Duration::seconds(rule.cooldown_sec);
        let not_before = Utc::now() - cooldown;
        if self.alerts.find_cooling_down(&key, not_before).await?.is_some() {
            return Ok(());
        }

        let evaluation = match &rule.conditions {
            RuleConditions::Threshold(c) => evaluate_threshold(c, &instance.name, metric),
            RuleConditions::Anomaly(c) => {
                let since = Utc::now() - chrono::Duration::seconds(c.window_sec as i64);
                let samples = self.metrics.range(instance.id, since).await?;
                evaluate_anomaly(c, &instance.name, metric, &samples)
            }
            RuleConditions::Lifecycle(c) => evaluate_lifecycle(c, instance, heartbeat, Utc::now()),
            // SECURITY, COST are stubs: never fire in the core (spec.md §4.4.1).
            RuleConditions::Security(_) | RuleConditions::Cost(_) => return Ok(()),
        };

        if !evaluation.fired {
            if let Some(existing) = self.alerts.find_non_terminal_by_dedupe_key(&key).await? {
                self.alerts.resolve(existing.id, "system:auto-resolution").await?;
                info!(alert_id = %existing.id, "alert auto-resolved");
            }
            return Ok(());
        }

        let (alert, is_duplicate) = self.fire_alert(rule, instance.id, evaluation, &key).await?;
        if !is_duplicate {
            self.dispatcher.dispatch(alert.id).await;
        }
        Ok(())
    }

    /// Create-or-return-existing by dedupe key (spec.md §4.4.2: `fireAlert`).
    /// Atomic against the persistence layer's own non-terminal lookup, so a
    /// concurrent duplicate call observes the same alert id (spec.md §8
    /// scenario 6).
    async fn fire_alert(
        &self,
        rule: &fleet_persistence::AlertRule,
        instance_id: Uuid,
        evaluation: crate::conditions::Evaluation,
        dedupe_key: &str,
    ) -> fleet_common::Result<(fleet_persistence::Alert, bool)> {
        if let Some(existing) = self.alerts.find_non_terminal_by_dedupe_key(dedupe_key).await? {
            return Ok((existing, true));
        }

        let alert = self
            .alerts
            .create(NewAlert {
                rule_id: rule.id,
                instance_id: Some(instance_id),
                severity: rule.severity,
                title: evaluation.title,
                message: evaluation.message,
                metadata: evaluation.metadata,
                dedupe_key: dedupe_key.to_string(),
            })
            .await?;
        Ok((alert, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_broker::{Broker, InProcessBroker};
    use fleet_common::{ComparisonOperator, MetricName, PageParams, Severity};
    use fleet_persistence::{
        Alert, AlertFilter, AlertRule, ChannelRepo, ChannelUpdate, NewChannel, NewNotification,
        NotificationChannel, NotificationRepo, RuleFilter, RuleUpdate,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAlertRepo {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertRepo for FakeAlertRepo {
        async fn find_non_terminal_by_dedupe_key(&self, dedupe_key: &str) -> fleet_common::Result<Option<Alert>> {
            Ok(self.alerts.lock().unwrap().iter().find(|a| a.dedupe_key == dedupe_key && !a.status.is_terminal()).cloned())
        }

        async fn find_cooling_down(&self, dedupe_key: &str, not_before: chrono::DateTime<Utc>) -> fleet_common::Result<Option<Alert>> {
            Ok(self
                .alerts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.dedupe_key == dedupe_key && !a.status.is_terminal() && a.fired_at > not_before)
                .cloned())
        }

        async fn create(&self, alert: fleet_persistence::NewAlert) -> fleet_common::Result<Alert> {
            // Atomic check-then-insert under one lock, matching the unique
            // constraint a real database would enforce for scenario 6
            // (spec.md §8: "exactly one alert created").
            let mut alerts = self.alerts.lock().unwrap();
            if let Some(existing) = alerts.iter().find(|a| a.dedupe_key == alert.dedupe_key && !a.status.is_terminal()) {
                return Ok(existing.clone());
            }
            let record = Alert {
                id: Uuid::new_v4(),
                rule_id: alert.rule_id,
                instance_id: alert.instance_id,
                severity: alert.severity,
                title: alert.title,
                message: alert.message,
                metadata: alert.metadata,
                status: fleet_common::AlertStatus::Active,
                fired_at: Utc::now(),
                acknowledged_at: None,
                acknowledged_by: None,
                resolved_at: None,
                resolved_by: None,
                dedupe_key: alert.dedupe_key,
            };
            alerts.push(record.clone());
            Ok(record)
        }

        async fn get(&self, id: Uuid) -> fleet_common::Result<Option<Alert>> {
            Ok(self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned())
        }

        async fn acknowledge(&self, id: Uuid, user_id: &str) -> fleet_common::Result<Option<Alert>> {
            let mut alerts = self.alerts.lock().unwrap();
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else { return Ok(None) };
            alert.status = fleet_common::AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(Utc::now());
            alert.acknowledged_by = Some(user_id.to_string());
            Ok(Some(alert.clone()))
        }

        async fn resolve(&self, id: Uuid, resolved_by: &str) -> fleet_common::Result<Option<Alert>> {
            let mut alerts = self.alerts.lock().unwrap();
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else { return Ok(None) };
            alert.status = fleet_common::AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
            alert.resolved_by = Some(resolved_by.to_string());
            Ok(Some(alert.clone()))
        }

        async fn bulk_acknowledge(&self, ids: &[Uuid], user_id: &str) -> fleet_common::Result<Vec<Alert>> {
            let mut out = Vec::new();
            for id in ids {
                if let Some(a) = self.acknowledge(*id, user_id).await? {
                    out.push(a);
                }
            }
            Ok(out)
        }

        async fn bulk_resolve(&self, ids: &[Uuid], resolved_by: &str) -> fleet_common::Result<Vec<Alert>> {
            let mut out = Vec::new();
            for id in ids {
                if let Some(a) = self.resolve(*id, resolved_by).await? {
                    out.push(a);
                }
            }
            Ok(out)
        }

        async fn list(&self, _filter: AlertFilter, _page: PageParams) -> fleet_common::Result<(Vec<Alert>, i64)> {
            let alerts = self.alerts.lock().unwrap().clone();
            let total = alerts.len() as i64;
            Ok((alerts, total))
        }

        async fn summary(&self) -> fleet_common::Result<fleet_persistence::AlertSummary> {
            Ok(fleet_persistence::AlertSummary::default())
        }
    }

    struct FakeRuleRepo {
        rules: Vec<AlertRule>,
    }

    #[async_trait]
    impl RuleRepo for FakeRuleRepo {
        async fn create(&self, _rule: fleet_persistence::NewRule) -> fleet_common::Result<AlertRule> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn get(&self, id: Uuid) -> fleet_common::Result<Option<AlertRule>> {
            Ok(self.rules.iter().find(|r| r.id == id).cloned())
        }
        async fn update(&self, _id: Uuid, _update: RuleUpdate) -> fleet_common::Result<Option<AlertRule>> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn delete(&self, _id: Uuid) -> fleet_common::Result<bool> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn set_enabled(&self, _id: Uuid, _enabled: bool) -> fleet_common::Result<Option<AlertRule>> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn list(&self, _filter: RuleFilter, _page: PageParams) -> fleet_common::Result<(Vec<AlertRule>, i64)> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn list_enabled(&self) -> fleet_common::Result<Vec<AlertRule>> {
            Ok(self.rules.clone())
        }
    }

    struct FakeInstanceRepo {
        instances: Vec<Instance>,
    }

    #[async_trait]
    impl InstanceRepo for FakeInstanceRepo {
        async fn list_all(&self) -> fleet_common::Result<Vec<Instance>> {
            Ok(self.instances.clone())
        }
        async fn get(&self, id: Uuid) -> fleet_common::Result<Option<Instance>> {
            Ok(self.instances.iter().find(|i| i.id == id).cloned())
        }
    }

    #[derive(Default)]
    struct FakeMetricRepo {
        latest: Mutex<HashMap<Uuid, Metric>>,
    }

    #[async_trait]
    impl MetricRepo for FakeMetricRepo {
        async fn insert(&self, _metric: &Metric) -> fleet_common::Result<()> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn latest_per_instance(&self) -> fleet_common::Result<Vec<Metric>> {
            Ok(self.latest.lock().unwrap().values().cloned().collect())
        }
        async fn latest_for_instance(&self, instance_id: Uuid) -> fleet_common::Result<Option<Metric>> {
            Ok(self.latest.lock().unwrap().get(&instance_id).cloned())
        }
        async fn range(&self, _instance_id: Uuid, _since: chrono::DateTime<Utc>) -> fleet_common::Result<Vec<Metric>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeHeartbeatRepo;

    #[async_trait]
    impl HeartbeatRepo for FakeHeartbeatRepo {
        async fn insert(&self, _heartbeat: &Heartbeat) -> fleet_common::Result<()> {
            unimplemented!("not exercised by the evaluator")
        }
        async fn latest_per_instance(&self) -> fleet_common::Result<Vec<Heartbeat>> {
            Ok(Vec::new())
        }
        async fn latest_for_instance(&self, _instance_id: Uuid) -> fleet_common::Result<Option<Heartbeat>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct FakeChannelRepo;

    #[async_trait]
    impl ChannelRepo for FakeChannelRepo {
        async fn create(&self, _channel: NewChannel) -> fleet_common::Result<NotificationChannel> {
            unimplemented!("not exercised by these tests")
        }
        async fn get(&self, _id: Uuid) -> fleet_common::Result<Option<NotificationChannel>> {
            Ok(None)
        }
        async fn update(&self, _id: Uuid, _update: ChannelUpdate) -> fleet_common::Result<Option<NotificationChannel>> {
            unimplemented!("not exercised by these tests")
        }
        async fn delete(&self, _id: Uuid) -> fleet_common::Result<bool> {
            unimplemented!("not exercised by these tests")
        }
        async fn list(&self, _page: PageParams) -> fleet_common::Result<(Vec<NotificationChannel>, i64)> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_many(&self, _ids: &[Uuid]) -> fleet_common::Result<Vec<NotificationChannel>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeNotificationRepo;

    #[async_trait]
    impl NotificationRepo for FakeNotificationRepo {
        async fn create(&self, notification: NewNotification) -> fleet_common::Result<fleet_persistence::AlertNotification> {
            Ok(fleet_persistence::AlertNotification {
                id: Uuid::new_v4(),
                alert_id: notification.alert_id,
                channel_id: notification.channel_id,
                sent_at: Utc::now(),
                success: notification.success,
                error: notification.error,
                payload: notification.payload,
            })
        }
        async fn list_for_alert(&self, _alert_id: Uuid) -> fleet_common::Result<Vec<fleet_persistence::AlertNotification>> {
            Ok(Vec::new())
        }
    }

    fn threshold_rule(id: Uuid, instance_id: Uuid, cooldown_sec: i64) -> AlertRule {
        AlertRule {
            id,
            name: "CPU>90".to_string(),
            rule_type: fleet_common::RuleType::Threshold,
            severity: Severity::High,
            instance_id: Some(instance_id),
            conditions: fleet_common::RuleConditions::Threshold(fleet_common::ThresholdConditions {
                metric: MetricName::CpuPercent,
                operator: ComparisonOperator::Gt,
                threshold: 90.0,
                duration_sec: None,
            }),
            cooldown_sec,
            enabled: true,
            channel_ids: Vec::new(),
        }
    }

    fn metric(instance_id: Uuid, cpu_percent: f64) -> Metric {
        Metric {
            instance_id,
            timestamp: Utc::now(),
            cpu_percent,
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

    fn dispatcher(alerts: Arc<dyn AlertRepo>, rules: Arc<dyn RuleRepo>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            alerts,
            rules,
            Arc::new(FakeChannelRepo::default()),
            Arc::new(FakeNotificationRepo::default()),
            Arc::new(InProcessBroker::new()) as Arc<dyn Broker>,
            Duration::from_millis(1000),
            "fleet-console-tests/1.0".to_string(),
        ))
    }

    /// Scenario 1 (spec.md §8): CPU>90 fires with the literal title,
    /// message, and metadata the spec spells out.
    #[tokio::test]
    async fn threshold_fire_matches_scenario_one() {
        let rule_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let instance = Instance { id: instance_id, name: "test-instance".to_string(), status: fleet_common::InstanceStatus::Running };

        let alerts = Arc::new(FakeAlertRepo::default());
        let rules = Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] });
        let instances = Arc::new(FakeInstanceRepo { instances: vec![instance] });
        let metrics = Arc::new(FakeMetricRepo::default());
        metrics.latest.lock().unwrap().insert(instance_id, metric(instance_id, 92.7));
        let heartbeats = Arc::new(FakeHeartbeatRepo::default());

        let evaluator = Evaluator::new(rules, instances, metrics, heartbeats, alerts.clone(), dispatcher(alerts.clone(), Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] })));
        evaluator.run_tick().await.unwrap();

        let (created, total) = alerts.list(AlertFilter::default(), PageParams::default()).await.unwrap();
        assert_eq!(total, 1);
        let alert = &created[0];
        assert_eq!(alert.dedupe_key, format!("{rule_id}:{instance_id}"));
        assert_eq!(alert.title, "CPU usage threshold exceeded on test-instance");
        assert_eq!(alert.message, "CPU usage is 92.7% (threshold: gt 90%)");
        assert_eq!(alert.metadata["metric"], "cpu_percent");
        assert_eq!(alert.metadata["value"], 92.7);
        assert_eq!(alert.metadata["threshold"], 90.0);
        assert_eq!(alert.metadata["operator"], "gt");
    }

    /// Scenario 2 (spec.md §8): a second fire within the cooldown window
    /// produces no new alert.
    #[tokio::test]
    async fn cooldown_suppresses_second_fire() {
        let rule_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let instance = Instance { id: instance_id, name: "test-instance".to_string(), status: fleet_common::InstanceStatus::Running };

        let alerts = Arc::new(FakeAlertRepo::default());
        let rules = Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] });
        let instances = Arc::new(FakeInstanceRepo { instances: vec![instance] });
        let metrics = Arc::new(FakeMetricRepo::default());
        metrics.latest.lock().unwrap().insert(instance_id, metric(instance_id, 92.7));
        let heartbeats = Arc::new(FakeHeartbeatRepo::default());

        let evaluator = Evaluator::new(
            rules,
            instances,
            metrics.clone(),
            heartbeats,
            alerts.clone(),
            dispatcher(alerts.clone(), Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] })),
        );
        evaluator.run_tick().await.unwrap();

        metrics.latest.lock().unwrap().insert(instance_id, metric(instance_id, 95.0));
        evaluator.run_tick().await.unwrap();

        let (_, total) = alerts.list(AlertFilter::default(), PageParams::default()).await.unwrap();
        assert_eq!(total, 1, "still cooling down, no second alert should fire");
    }

    /// Scenario 3 (spec.md §8): a previously firing rule that stops firing
    /// auto-resolves the non-terminal alert as `system:auto-resolution`.
    /// The seeded alert's `firedAt` is outside the cooldown window so the
    /// evaluator's unconditional cooldown gate (spec.md §4.4.1 step b)
    /// doesn't also suppress the auto-resolve path.
    #[tokio::test]
    async fn auto_resolves_when_condition_stops_firing() {
        let rule_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let instance = Instance { id: instance_id, name: "test-instance".to_string(), status: fleet_common::InstanceStatus::Running };
        let dedupe_key = format!("{rule_id}:{instance_id}");

        let alerts = Arc::new(FakeAlertRepo::default());
        let existing = alerts
            .create(fleet_persistence::NewAlert {
                rule_id,
                instance_id: Some(instance_id),
                severity: Severity::High,
                title: "CPU usage threshold exceeded on test-instance".to_string(),
                message: "CPU usage is 92.7% (threshold: gt 90%)".to_string(),
                metadata: serde_json::json!({}),
                dedupe_key: dedupe_key.clone(),
            })
            .await
            .unwrap();
        alerts.alerts.lock().unwrap().iter_mut().find(|a| a.id == existing.id).unwrap().fired_at =
            Utc::now() - chrono::Duration::seconds(600);

        let rules = Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] });
        let instances = Arc::new(FakeInstanceRepo { instances: vec![instance] });
        let metrics = Arc::new(FakeMetricRepo::default());
        metrics.latest.lock().unwrap().insert(instance_id, metric(instance_id, 10.0));
        let heartbeats = Arc::new(FakeHeartbeatRepo::default());

        let evaluator = Evaluator::new(
            rules,
            instances,
            metrics,
            heartbeats,
            alerts.clone(),
            dispatcher(alerts.clone(), Arc::new(FakeRuleRepo { rules: vec![threshold_rule(rule_id, instance_id, 300)] })),
        );
        evaluator.run_tick().await.unwrap();

        let resolved = alerts.get(existing.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, fleet_common::AlertStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("system:auto-resolution"));
    }

    /// Scenario 6 (spec.md §8): concurrent `fireAlert` calls with the same
    /// dedupe key create exactly one alert and agree on its id.
    #[tokio::test]
    async fn concurrent_fire_alert_creates_exactly_one_alert() {
        let rule_id = Uuid::new_v4();
        let instance_id = Uuid::new_v4();
        let rule = threshold_rule(rule_id, instance_id, 300);
        let dedupe_key = format!("{rule_id}:{instance_id}");

        let alerts = Arc::new(FakeAlertRepo::default());
        let evaluator = Evaluator::new(
            Arc::new(FakeRuleRepo { rules: vec![rule.clone()] }),
            Arc::new(FakeInstanceRepo { instances: Vec::new() }),
            Arc::new(FakeMetricRepo::default()),
            Arc::new(FakeHeartbeatRepo::default()),
            alerts.clone(),
            dispatcher(alerts.clone(), Arc::new(FakeRuleRepo { rules: vec![rule.clone()] })),
        );

        let eval_a = crate::conditions::evaluate_threshold(
            &fleet_common::ThresholdConditions { metric: MetricName::CpuPercent, operator: ComparisonOperator::Gt, threshold: 90.0, duration_sec: None },
            "test-instance",
            Some(&metric(instance_id, 95.0)),
        );
        let eval_b = crate::conditions::evaluate_threshold(
            &fleet_common::ThresholdConditions { metric: MetricName::CpuPercent, operator: ComparisonOperator::Gt, threshold: 90.0, duration_sec: None },
            "test-instance",
            Some(&metric(instance_id, 95.0)),
        );

        let (result_a, result_b) =
            tokio::join!(evaluator.fire_alert(&rule, instance_id, eval_a, &dedupe_key), evaluator.fire_alert(&rule, instance_id, eval_b, &dedupe_key));
        let (alert_a, dup_a) = result_a.unwrap();
        let (alert_b, dup_b) = result_b.unwrap();

        assert_eq!(alert_a.id, alert_b.id);
        assert!(dup_a != dup_b, "exactly one caller should observe isDuplicate=false");

        let (_, total) = alerts.list(AlertFilter::default(), PageParams::default()).await.unwrap();
        assert_eq!(total, 1);
    }
}
