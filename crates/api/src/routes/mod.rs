//! HTTP API route modules (spec.md §6: "HTTP API (summary)"). Each module
//! owns one resource's CRUD surface and exposes a `Router<AppState>` the
//! server merges into the top-level router.

pub mod alerts;
pub mod channels;
pub mod drift;
pub mod rules;
pub mod security;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(alerts::router())
        .merge(rules::router())
        .merge(channels::router())
        .merge(drift::router())
        .merge(security::router())
}
