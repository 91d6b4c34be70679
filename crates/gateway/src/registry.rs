//! Connection registry and keep-alive (spec.md §4.2, §5).
//!
//! A connection's subscription disposers are stored on its record (spec.md
//! §4.3 design note: "Connection-owned subscriptions"); the close handler
//! runs them all under best-effort semantics. The registry itself is a
//! concurrent map — mutated by each connection's own reader/close handler,
//! read by the keep-alive loop under no extra lock beyond the map's own.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use fleet_common::ConnectionId;
use fleet_broker::Subscription;

use crate::auth::Principal;

pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub principal: Principal,
    pub connected_at: chrono::DateTime<Utc>,
    last_pong_ms: AtomicI64,
    pub outbound: mpsc::UnboundedSender<Message>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ConnectionHandle {
    pub fn touch_pong(&self) {
        self.last_pong_ms.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    fn last_pong_age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_pong_ms.load(Ordering::SeqCst)
    }

    pub async fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions.lock().await.push(subscription);
    }

    /// Releases every subscription this connection acquired. Best-effort:
    /// one disposer failing to tear down does not stop the rest (spec.md
    /// §4.3 design note).
    async fn release_subscriptions(&self) {
        let mut subs = self.subscriptions.lock().await;
        for sub in subs.drain(..) {
            sub.unsubscribe().await;
        }
    }

    pub fn send(&self, message: Message) {
        if self.outbound.send(message).is_err() {
            debug!(connection_id = %self.id, "outbound channel closed, dropping message");
        }
    }
}

/// Tracks every live connection so the keep-alive loop and the close
/// handler can find and release them (spec.md §4.2).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, Arc<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, principal: Principal, outbound: mpsc::UnboundedSender<Message>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle {
            id: ConnectionId::new(),
            principal,
            connected_at: Utc::now(),
            last_pong_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            outbound,
            subscriptions: Mutex::new(Vec::new()),
        });
        self.connections.insert(handle.id, handle.clone());
        handle
    }

    /// Releases a connection's subscriptions and drops its registry entry
    /// (spec.md §4.2 close handler, §8 invariant: "after C's close handler
    /// completes, the broker has no listener registered by C").
    pub async fn remove(&self, id: ConnectionId) {
        if let Some((_, handle)) = self.connections.remove(&id) {
            handle.release_subscriptions().await;
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// One keep-alive sweep (spec.md §4.2): terminate any connection whose
    /// `lastPong` is older than `2 * interval_ms`, ping the rest.
    pub fn keep_alive_tick(&self, interval_ms: u64) {
        let stale_after = 2 * interval_ms as i64;
        let mut stale = Vec::new();

        for entry in self.connections.iter() {
            let handle = entry.value();
            if handle.last_pong_age_ms() > stale_after {
                stale.push(handle.clone());
            } else {
                handle.send(Message::Ping(Vec::new()));
            }
        }

        for handle in stale {
            warn!(connection_id = %handle.id, "keep-alive timeout, terminating connection");
            handle.send(Message::Close(None));
        }
    }

    /// Closes every tracked connection with WS code 1001 and clears the
    /// registry (spec.md §4.2 graceful shutdown).
    pub async fn shutdown(&self) {
        for entry in self.connections.iter() {
            entry.value().send(Message::Close(Some(axum::extract::ws::CloseFrame {
                code: 1001,
                reason: "server shutting down".into(),
            })));
        }
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.remove(id).await;
        }
    }
}
