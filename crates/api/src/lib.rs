//! # Fleet console API
//!
//! The HTTP façade over the fleet-console control plane (spec.md §2,
//! component 5): CRUD for alert rules, notification channels, and alerts,
//! plus drift and security summaries. The real-time ingest/fan-out path
//! (spec.md §4.2) is mounted alongside this router but lives in
//! `fleet-gateway` — this crate only wires the two together.
//!
//! ## Layout
//!
//! - [`state`] — [`state::AppState`], the state every route handler extracts.
//! - [`auth`] — the `X-Api-Key`/`apiKey` extractor shared with the
//!   WebSocket gateway's pre-handshake authentication.
//! - [`routes`] — one module per resource.
//! - [`middleware`] — request logging.
//! - [`server`] — top-level router assembly and the bound listener.
//! - [`openapi`] — the generated OpenAPI document served at `/api-doc/openapi.json`.

pub mod auth;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;
pub mod types;

pub use server::FleetServer;
pub use state::AppState;
pub use types::*;
