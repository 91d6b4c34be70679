//! Shared gateway state: the broker handle and the persistence repos the
//! dispatch table needs (spec.md §4.2 dispatch table).

use std::sync::Arc;

use fleet_broker::Broker;
use fleet_persistence::{ApiKeyRepo, EventRepo, HeartbeatRepo, MetricRepo};

#[derive(Clone)]
pub struct GatewayState {
    pub broker: Arc<dyn Broker>,
    pub api_keys: Arc<dyn ApiKeyRepo>,
    pub metrics: Arc<dyn MetricRepo>,
    pub heartbeats: Arc<dyn HeartbeatRepo>,
    pub events: Arc<dyn EventRepo>,
    pub keep_alive_ms: u64,
}
