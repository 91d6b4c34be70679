//! `RuleService`: CRUD + toggle over alert rules (spec.md §4.5).

use std::sync::Arc;

use uuid::Uuid;

use fleet_common::Result;
use fleet_persistence::{AlertRule, NewRule, RuleFilter, RuleRepo, RuleUpdate};

pub struct RuleService {
    rules: Arc<dyn RuleRepo>,
}

impl RuleService {
    pub fn new(rules: Arc<dyn RuleRepo>) -> Self {
        Self { rules }
    }

    /// Create default cooldown 300s, enabled true, applied by the repo when
    /// `cooldown_sec`/`enabled` are absent (spec.md §4.5).
    pub async fn create(&self, rule: NewRule) -> Result<AlertRule> {
        self.rules.create(rule).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AlertRule>> {
        self.rules.get(id).await
    }

    /// `channelIds` semantics is replace-when-provided (spec.md §4.5): a
    /// `None` leaves the existing association set untouched.
    pub async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<Option<AlertRule>> {
        self.rules.update(id, update).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.rules.delete(id).await
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<AlertRule>> {
        self.rules.set_enabled(id, enabled).await
    }

    /// When `instanceId` is supplied, rules with `instance_id == instanceId`
    /// OR `instance_id == null` match — a null-scoped rule applies to all
    /// instances (spec.md §4.5). That widening lives in the repo's query.
    pub async fn list(&self, filter: RuleFilter, page: fleet_common::PageParams) -> Result<(Vec<AlertRule>, i64)> {
        self.rules.list(filter, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleet_common::{RuleConditions, RuleType, Severity, ThresholdConditions};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRuleRepo {
        rules: Mutex<Vec<AlertRule>>,
    }

    #[async_trait]
    impl RuleRepo for FakeRuleRepo {
        async fn create(&self, rule: NewRule) -> Result<AlertRule> {
            let record = AlertRule {
                id: Uuid::new_v4(),
                name: rule.name,
                rule_type: rule.rule_type,
                severity: rule.severity,
                instance_id: rule.instance_id,
                conditions: rule.conditions,
                cooldown_sec: rule.cooldown_sec.unwrap_or(300),
                enabled: rule.enabled.unwrap_or(true),
                channel_ids: rule.channel_ids,
            };
            self.rules.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn get(&self, id: Uuid) -> Result<Option<AlertRule>> {
            Ok(self.rules.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<Option<AlertRule>> {
            let mut rules = self.rules.lock().unwrap();
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                return Ok(None);
            };
            if let Some(channel_ids) = update.channel_ids {
                rule.channel_ids = channel_ids;
            }
            if let Some(enabled) = update.enabled {
                rule.enabled = enabled;
            }
            Ok(Some(rule.clone()))
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            let mut rules = self.rules.lock().unwrap();
            let before = rules.len();
            rules.retain(|r| r.id != id);
            Ok(rules.len() != before)
        }

        async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<AlertRule>> {
            self.update(id, RuleUpdate { enabled: Some(enabled), ..Default::default() }).await
        }

        async fn list(&self, _filter: RuleFilter, _page: fleet_common::PageParams) -> Result<(Vec<AlertRule>, i64)> {
            let rules = self.rules.lock().unwrap().clone();
            let total = rules.len() as i64;
            Ok((rules, total))
        }

        async fn list_enabled(&self) -> Result<Vec<AlertRule>> {
            Ok(self.rules.lock().unwrap().iter().filter(|r| r.enabled).cloned().collect())
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_channel_set() {
        let repo = Arc::new(FakeRuleRepo::default());
        let service = RuleService::new(repo);
        let channel_ids = vec![Uuid::new_v4(), Uuid::new_v4()];

        let created = service
            .create(NewRule {
                name: "CPU>90".into(),
                rule_type: RuleType::Threshold,
                severity: Severity::High,
                instance_id: None,
                conditions: RuleConditions::Threshold(ThresholdConditions {
                    metric: fleet_common::MetricName::CpuPercent,
                    operator: fleet_common::ComparisonOperator::Gt,
                    threshold: 90.0,
                    duration_sec: None,
                }),
                cooldown_sec: None,
                enabled: None,
                channel_ids: channel_ids.clone(),
            })
            .await
            .unwrap();

        assert_eq!(created.cooldown_sec, 300);
        assert!(created.enabled);

        let fetched = service.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.channel_ids, channel_ids);
    }
}
