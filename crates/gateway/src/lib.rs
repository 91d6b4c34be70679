//! The WebSocket gateway (spec.md §4.2): pre-handshake authentication, the
//! envelope protocol, connection registry and keep-alive, and the inbound
//! dispatch table. Depends only on the [`fleet_broker::Broker`] capability
//! and the narrow persistence repos its dispatch handlers need (spec.md §9:
//! "Pub/sub as capability").

pub mod auth;
pub mod dispatch;
pub mod envelope;
pub mod registry;
pub mod state;
pub mod ws;

pub use auth::Principal;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use state::GatewayState;
pub use ws::{router, WsState};
