//! Drift and security summaries: thin read-side services over the
//! persistence layer's aggregate queries. They do not alter the evaluator's
//! or dispatcher's core loops; the HTTP façade calls them directly
//! (spec.md §4.5).

use std::sync::Arc;

use fleet_common::Result;
use fleet_persistence::{
    ConfigSnapshot, DriftEvent, DriftRepo, DriftSummary, NewSecret, RevealedSecret, Secret,
    SecretRepo, SecretUpdate, SecuritySummary, SecurityRepo,
};
use uuid::Uuid;

pub struct DriftSummaryService {
    drift: Arc<dyn DriftRepo>,
}

impl DriftSummaryService {
    pub fn new(drift: Arc<dyn DriftRepo>) -> Self {
        Self { drift }
    }

    pub async fn latest_snapshot(&self, instance_id: Uuid) -> Result<Option<ConfigSnapshot>> {
        self.drift.latest_snapshot(instance_id).await
    }

    pub async fn unresolved_events(&self) -> Result<Vec<DriftEvent>> {
        self.drift.unresolved_events().await
    }

    pub async fn summary(&self) -> Result<DriftSummary> {
        self.drift.summary().await
    }
}

pub struct SecuritySummaryService {
    security: Arc<dyn SecurityRepo>,
    secrets: Arc<dyn SecretRepo>,
}

impl SecuritySummaryService {
    pub fn new(security: Arc<dyn SecurityRepo>, secrets: Arc<dyn SecretRepo>) -> Self {
        Self { security, secrets }
    }

    pub async fn summary(&self) -> Result<SecuritySummary> {
        self.security.summary().await
    }

    pub async fn secrets_for_instance(&self, instance_id: Uuid) -> Result<Vec<Secret>> {
        self.secrets.list_for_instance(instance_id).await
    }

    pub async fn create_secret(&self, secret: NewSecret) -> Result<Secret> {
        self.secrets.create(secret).await
    }

    pub async fn get_secret(&self, id: Uuid) -> Result<Option<Secret>> {
        self.secrets.get(id).await
    }

    pub async fn update_secret(&self, id: Uuid, update: SecretUpdate) -> Result<Option<Secret>> {
        self.secrets.update(id, update).await
    }

    pub async fn delete_secret(&self, id: Uuid) -> Result<bool> {
        self.secrets.delete(id).await
    }

    pub async fn rotate_secret(&self, id: Uuid, value_ciphertext: String) -> Result<Option<Secret>> {
        self.secrets.rotate(id, value_ciphertext).await
    }

    /// Callers MUST enforce the elevated-role gate before invoking this
    /// (spec.md §3: "reveal requires elevated role") — this service is
    /// role-agnostic, the HTTP façade is the enforcement boundary.
    pub async fn reveal_secret(&self, id: Uuid) -> Result<Option<RevealedSecret>> {
        self.secrets.reveal(id).await
    }
}
