//! OpenAPI specification (spec.md §6: "HTTP API (summary)"), generated
//! from the route handlers and response types via `utoipa`.

use utoipa::OpenApi;

use crate::types::{ErrorResponse, HealthResponse};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Fleet Console API",
        description = "
# Fleet Console Control Plane

REST surface over the fleet-console control plane: alert rule and
notification channel CRUD, alert acknowledgement/resolution, and
drift/security summaries. The real-time telemetry ingest and browser
fan-out path runs over a separate WebSocket upgrade at `/ws`; it is not
part of this REST surface.

## Resources

- **Alerts** — list/get/acknowledge/resolve/bulk-acknowledge/bulk-resolve,
  plus an active-alert summary. Alerts are created and auto-resolved by the
  evaluator, not through this API.
- **Rules** — alert rule CRUD, enable/disable toggle.
- **Channels** — notification channel CRUD, inline test, and send-test
  against a persisted channel. Secret fields are masked on every read.
- **Drift** — read-only snapshot/event summaries over agent-reported
  configuration drift.
- **Security** — vulnerability/secret/SSH-key summary counts, and the
  secrets vault (create/rotate/reveal). Reveal requires an elevated role.
        ",
        version = "1.0.0",
        contact(name = "Fleet Console")
    ),
    paths(
        crate::server::health_check,
    ),
    components(schemas(
        ErrorResponse,
        HealthResponse,
    )),
    tags(
        (name = "alerts", description = "Alert read/acknowledge/resolve surface"),
        (name = "rules", description = "Alert rule CRUD"),
        (name = "channels", description = "Notification channel CRUD and test delivery"),
        (name = "drift", description = "Configuration drift summaries"),
        (name = "security", description = "Security summary and secrets vault"),
        (name = "health", description = "Liveness check")
    )
)]
pub struct ApiDoc;
