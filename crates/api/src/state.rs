//! The HTTP API's shared application state (spec.md §6, §10).

use std::sync::Arc;

use fleet_alerts::{AlertService, ChannelService, Dispatcher, DriftSummaryService, RuleService, SecuritySummaryService};
use fleet_gateway::{ConnectionRegistry, GatewayState};
use fleet_persistence::ApiKeyRepo;

#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<dyn ApiKeyRepo>,
    pub rules: Arc<RuleService>,
    pub channels: Arc<ChannelService>,
    pub alerts: Arc<AlertService>,
    pub drift: Arc<DriftSummaryService>,
    pub security: Arc<SecuritySummaryService>,
    pub dispatcher: Arc<Dispatcher>,
    pub gateway: GatewayState,
    pub registry: ConnectionRegistry,
}
