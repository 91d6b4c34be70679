//! `AlertService`: user-initiated alert state transitions (spec.md §4.4.2).
//!
//! Creation and auto-resolution are owned by the evaluator (`evaluator.rs`);
//! this service only handles the read/ack/resolve/list/summary surface the
//! HTTP API calls.

use std::sync::Arc;

use uuid::Uuid;

use fleet_common::{PageParams, Result};
use fleet_persistence::{Alert, AlertFilter, AlertRepo, AlertSummary};

pub struct AlertService {
    alerts: Arc<dyn AlertRepo>,
}

impl AlertService {
    pub fn new(alerts: Arc<dyn AlertRepo>) -> Self {
        Self { alerts }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Alert>> {
        self.alerts.get(id).await
    }

    pub async fn list(&self, filter: AlertFilter, page: PageParams) -> Result<(Vec<Alert>, i64)> {
        self.alerts.list(filter, page).await
    }

    /// Null when the target does not exist; refuses (also null) when RESOLVED
    /// (spec.md §4.4.2) — both cases are indistinguishable to the caller by
    /// design, matching the teacher's "optional means caller decides" style.
    pub async fn acknowledge(&self, id: Uuid, user_id: &str) -> Result<Option<Alert>> {
        self.alerts.acknowledge(id, user_id).await
    }

    pub async fn resolve(&self, id: Uuid, user_id: &str) -> Result<Option<Alert>> {
        self.alerts.resolve(id, user_id).await
    }

    pub async fn bulk_acknowledge(&self, ids: &[Uuid], user_id: &str) -> Result<Vec<Alert>> {
        self.alerts.bulk_acknowledge(ids, user_id).await
    }

    pub async fn bulk_resolve(&self, ids: &[Uuid], user_id: &str) -> Result<Vec<Alert>> {
        self.alerts.bulk_resolve(ids, user_id).await
    }

    pub async fn summary(&self) -> Result<AlertSummary> {
        self.alerts.summary().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use fleet_common::Severity;
    use fleet_persistence::NewAlert;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAlertRepo {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertRepo for FakeAlertRepo {
        async fn find_non_terminal_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Alert>> {
            Ok(self
                .alerts
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.dedupe_key == dedupe_key && !a.status.is_terminal())
                .cloned())
        }

        async fn find_cooling_down(&self, _dedupe_key: &str, _not_before: DateTime<Utc>) -> Result<Option<Alert>> {
            Ok(None)
        }

        async fn create(&self, alert: NewAlert) -> Result<Alert> {
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
            self.alerts.lock().unwrap().push(record.clone());
            Ok(record)
        }

        async fn get(&self, id: Uuid) -> Result<Option<Alert>> {
            Ok(self.alerts.lock().unwrap().iter().find(|a| a.id == id).cloned())
        }

        async fn acknowledge(&self, id: Uuid, user_id: &str) -> Result<Option<Alert>> {
            let mut alerts = self.alerts.lock().unwrap();
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
                return Ok(None);
            };
            if alert.status == fleet_common::AlertStatus::Resolved {
                return Ok(None);
            }
            alert.status = fleet_common::AlertStatus::Acknowledged;
            alert.acknowledged_at = Some(Utc::now());
            alert.acknowledged_by = Some(user_id.to_string());
            Ok(Some(alert.clone()))
        }

        async fn resolve(&self, id: Uuid, resolved_by: &str) -> Result<Option<Alert>> {
            let mut alerts = self.alerts.lock().unwrap();
            let Some(alert) = alerts.iter_mut().find(|a| a.id == id) else {
                return Ok(None);
            };
            alert.status = fleet_common::AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
            alert.resolved_by = Some(resolved_by.to_string());
            Ok(Some(alert.clone()))
        }

        async fn bulk_acknowledge(&self, ids: &[Uuid], user_id: &str) -> Result<Vec<Alert>> {
            let mut out = Vec::new();
            for id in ids {
                if let Some(a) = self.acknowledge(*id, user_id).await? {
                    out.push(a);
                }
            }
            Ok(out)
        }

        async fn bulk_resolve(&self, ids: &[Uuid], resolved_by: &str) -> Result<Vec<Alert>> {
            let mut out = Vec::new();
            for id in ids {
                if let Some(a) = self.resolve(*id, resolved_by).await? {
                    out.push(a);
                }
            }
            Ok(out)
        }

        async fn list(&self, _filter: AlertFilter, _page: PageParams) -> Result<(Vec<Alert>, i64)> {
            let alerts = self.alerts.lock().unwrap().clone();
            let total = alerts.len() as i64;
            Ok((alerts, total))
        }

        async fn summary(&self) -> Result<AlertSummary> {
            Ok(AlertSummary::default())
        }
    }

    #[tokio::test]
    async fn acknowledge_refuses_resolved_alert() {
        let repo = Arc::new(FakeAlertRepo::default());
        let service = AlertService::new(repo.clone());

        let alert = repo
            .create(NewAlert {
                rule_id: Uuid::new_v4(),
                instance_id: None,
                severity: Severity::Low,
                title: "t".into(),
                message: "m".into(),
                metadata: serde_json::Value::Null,
                dedupe_key: "k".into(),
            })
            .await
            .unwrap();
        service.resolve(alert.id, "user-1").await.unwrap();

        let result = service.acknowledge(alert.id, "user-2").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn acknowledge_missing_alert_returns_none() {
        let repo = Arc::new(FakeAlertRepo::default());
        let service = AlertService::new(repo);
        assert!(service.acknowledge(Uuid::new_v4(), "user-1").await.unwrap().is_none());
    }
}
