//! The persistence façade: typed repositories over the relational store
//! (spec.md §3, component 1 of §2).

pub mod alerts;
pub mod api_keys;
pub mod channels;
pub mod drift;
pub mod events;
pub mod heartbeats;
pub mod instances;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod pool;
pub mod rules;
pub mod security;

pub use models::*;

pub use alerts::{AlertRepo, NewAlert, PgAlertRepo};
pub use api_keys::{ApiKeyRepo, AuthenticatedPrincipal, PgApiKeyRepo};
pub use channels::{ChannelRepo, ChannelUpdate, NewChannel, PgChannelRepo};
pub use drift::{DriftRepo, PgDriftRepo};
pub use events::{EventRepo, PgEventRepo};
pub use heartbeats::{HeartbeatRepo, PgHeartbeatRepo};
pub use instances::{InstanceRepo, PgInstanceRepo};
pub use metrics::{MetricRepo, PgMetricRepo};
pub use notifications::{NewNotification, NotificationRepo, PgNotificationRepo};
pub use rules::{NewRule, PgRuleRepo, RuleRepo, RuleUpdate};
pub use security::{NewSecret, PgSecretRepo, PgSecurityRepo, SecretRepo, SecretUpdate, SecurityRepo};
