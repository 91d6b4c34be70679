//! Pre-handshake auth and the per-connection socket loop (spec.md §4.2).
//!
//! Grounded on the reader/writer `tokio::select!` shape of the teacher
//! pack's WebSocket forwarder handlers (`ws_forwarder.rs`), adapted from a
//! single-purpose device session to the gateway's generic envelope dispatch
//! table plus a registry-driven keep-alive instead of a per-socket timer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::{authenticate, extract_raw_key};
use crate::dispatch::dispatch;
use crate::registry::ConnectionRegistry;
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

/// Gateway-local router state, kept distinct from the HTTP API's
/// `AppState` so the two crates stay decoupled; `fleet-api`'s server
/// merges this already-stateful router into its own (spec.md §10).
#[derive(Clone)]
pub struct WsState {
    pub gateway: GatewayState,
    pub registry: ConnectionRegistry,
}

/// Builds the `/ws`-mounted, already-stateful sub-router (spec.md §6:
/// "WebSocket over HTTP(S) at path `/ws` (configurable)").
pub fn router(path: &str, gateway: GatewayState, registry: ConnectionRegistry) -> Router {
    Router::new().route(path, get(upgrade)).with_state(WsState { gateway, registry })
}

/// The `/ws` upgrade endpoint (spec.md §6). Authentication happens before
/// the handshake completes: a failed lookup writes an HTTP 401 with
/// `X-Error-Code` and never reaches the gateway message loop (spec.md §7).
async fn upgrade(
    ws: WebSocketUpgrade,
    State(WsState { gateway: state, registry }): State<WsState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let header_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    let raw_key = extract_raw_key(header_key, query.api_key.as_deref());
    let instance_header = headers.get("x-instance-id").and_then(|v| v.to_str().ok()).map(|s| s.to_string());

    let principal = match authenticate(state.api_keys.as_ref(), raw_key.as_deref(), instance_header.as_deref()).await {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "rejected websocket upgrade");
            return unauthorized(err.code());
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, registry, principal))
}

fn unauthorized(code: &'static str) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, code.to_string()).into_response();
    response
        .headers_mut()
        .insert("X-Error-Code", axum::http::HeaderValue::from_static(code));
    response
}

async fn handle_socket(
    socket: WebSocket,
    state: GatewayState,
    registry: ConnectionRegistry,
    principal: crate::auth::Principal,
) {
    let (mut sink, mut stream) = futures_util::StreamExt::split(socket);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let conn = registry.register(principal, outbound_tx);
    info!(connection_id = %conn.id, is_agent = conn.principal.is_agent(), "connection registered");

    let writer_id = conn.id;
    let writer = tokio::spawn(async move {
        use futures_util::SinkExt;
        while let Some(message) = outbound_rx.recv().await {
            let is_close = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = writer_id;
    });

    loop {
        use futures_util::StreamExt;
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                dispatch(&state, &conn, &text).await;
            }
            Some(Ok(Message::Pong(_))) => {
                conn.touch_pong();
            }
            Some(Ok(Message::Ping(_))) => {
                // axum answers pings automatically on some transports, but
                // be explicit since this gateway also drives its own
                // keep-alive pings in the other direction.
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(Message::Binary(_))) => {
                warn!(connection_id = %conn.id, "binary frames are not part of the envelope protocol, ignoring");
            }
            Some(Err(e)) => {
                warn!(connection_id = %conn.id, error = %e, "websocket read error");
                break;
            }
        }
    }

    registry.remove(conn.id).await;
    writer.abort();
    info!(connection_id = %conn.id, "connection closed and subscriptions released");
}

/// Drives the registry-wide keep-alive sweep (spec.md §4.2: "every
/// `keepAliveMs`, iterate the registry"). Runs for the lifetime of the
/// process; callers select it against a shutdown signal.
pub async fn run_keep_alive(registry: ConnectionRegistry, interval_ms: u64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        ticker.tick().await;
        registry.keep_alive_tick(interval_ms);
    }
}
