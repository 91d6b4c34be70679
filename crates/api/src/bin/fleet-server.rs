//! fleet-server binary entry point.
//!
//! Loads configuration, opens the shared connection pool, wires the
//! persistence repos into the alert engine and gateway, starts the
//! evaluator's tick loop and the gateway's keep-alive sweep, and serves the
//! HTTP API plus the `/ws` upgrade off one listener.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use fleet_alerts::{AlertService, ChannelService, Dispatcher, DriftSummaryService, Evaluator, RuleService, SecuritySummaryService};
use fleet_api::{AppState, FleetServer};
use fleet_broker::{Broker, InProcessBroker, SharedBroker};
use fleet_common::FleetConfig;
use fleet_gateway::{ConnectionRegistry, GatewayState};
use fleet_persistence::{
    PgAlertRepo, PgApiKeyRepo, PgChannelRepo, PgDriftRepo, PgEventRepo, PgHeartbeatRepo,
    PgInstanceRepo, PgMetricRepo, PgNotificationRepo, PgRuleRepo, PgSecretRepo, PgSecurityRepo,
};

#[derive(Parser)]
#[command(name = "fleet-server")]
#[command(version = "0.1.0")]
#[command(about = "Fleet console control-plane server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    fleet_common::init_tracing_with_level(log_level)?;

    let config = FleetConfig::load(&cli.config).map_err(|e| {
        error!(error = %e, "failed to load configuration");
        e
    })?;

    info!(path = %cli.config, "configuration loaded");

    let pool = fleet_persistence::pool::connect(&config.database.url, config.database.max_connections).await?;

    let api_keys = Arc::new(PgApiKeyRepo::new(pool.clone()));
    let instances = Arc::new(PgInstanceRepo::new(pool.clone()));
    let metrics = Arc::new(PgMetricRepo::new(pool.clone()));
    let heartbeats = Arc::new(PgHeartbeatRepo::new(pool.clone()));
    let events = Arc::new(PgEventRepo::new(pool.clone()));
    let rules = Arc::new(PgRuleRepo::new(pool.clone()));
    let channels = Arc::new(PgChannelRepo::new(pool.clone()));
    let alerts = Arc::new(PgAlertRepo::new(pool.clone()));
    let notifications = Arc::new(PgNotificationRepo::new(pool.clone()));
    let drift = Arc::new(PgDriftRepo::new(pool.clone()));
    let security = Arc::new(PgSecurityRepo::new(pool.clone()));
    let secrets = Arc::new(PgSecretRepo::new(pool.clone()));

    let broker: Arc<dyn Broker> = match &config.broker.redis_url {
        Some(redis_url) => {
            info!("using the shared (Redis-backed) broker for cross-replica fan-out");
            Arc::new(SharedBroker::new(redis_url)?)
        }
        None => {
            info!("using the in-process broker (single replica)");
            Arc::new(InProcessBroker::new())
        }
    };

    let dispatcher = Arc::new(Dispatcher::new(
        alerts.clone(),
        rules.clone(),
        channels.clone(),
        notifications.clone(),
        broker.clone(),
        Duration::from_millis(config.dispatcher.http_timeout_ms),
        config.dispatcher.user_agent.clone(),
    ));

    let evaluator = Arc::new(Evaluator::new(
        rules.clone(),
        instances.clone(),
        metrics.clone(),
        heartbeats.clone(),
        alerts.clone(),
        dispatcher.clone(),
    ));
    tokio::spawn(evaluator.run(config.evaluator.tick_ms));

    let gateway_state = GatewayState {
        broker: broker.clone(),
        api_keys: api_keys.clone(),
        metrics: metrics.clone(),
        heartbeats: heartbeats.clone(),
        events: events.clone(),
        keep_alive_ms: config.gateway.keep_alive_ms,
    };
    let registry = ConnectionRegistry::new();
    tokio::spawn(fleet_gateway::ws::run_keep_alive(registry.clone(), config.gateway.keep_alive_ms));

    let app_state = AppState {
        api_keys,
        rules: Arc::new(RuleService::new(rules)),
        channels: Arc::new(ChannelService::new(channels, dispatcher.clone())),
        alerts: Arc::new(AlertService::new(alerts)),
        drift: Arc::new(DriftSummaryService::new(drift)),
        security: Arc::new(SecuritySummaryService::new(security, secrets)),
        dispatcher,
        gateway: gateway_state.clone(),
        registry: registry.clone(),
    };

    let server = FleetServer::new(app_state, gateway_state, registry, config.gateway.ws_path.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    server.run(&addr).await?;

    Ok(())
}
