//! The pub/sub broker (spec.md §4.3): a keyed fan-out of JSON payloads
//! scoped to `channel:instanceId`, with an optional all-instances
//! subscription per channel. Two backends share one trait:
//!
//! - [`InProcessBroker`] — single replica, in-memory `broadcast` channels.
//! - [`SharedBroker`] — multi-replica, Redis pub/sub for cross-replica fan-out
//!   layered over an `InProcessBroker` for the same-replica fast path.
//!
//! Grounded on the subscribe/broadcast shape of `BidirectionalEventChannel`
//! in the teacher's `crates/agent-network/src/execution_manager.rs`,
//! generalized to a keyed, multi-backend trait, with the Redis client shape
//! taken from the teacher's (now-removed) `crates/storage/src/redis.rs`.

pub mod inprocess;
pub mod message;
pub mod shared;

use std::sync::Arc;

use tokio::sync::broadcast;

use fleet_common::{InstanceId, Result};

pub use inprocess::InProcessBroker;
pub use message::BrokerMessage;
pub use shared::SharedBroker;

/// The publish/subscribe contract every backend implements.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, instance_id: &InstanceId, payload: serde_json::Value) -> Result<()>;

    /// Subscribe to a single `channel:instanceId` pair.
    async fn subscribe(&self, channel: &str, instance_id: &InstanceId) -> Result<Subscription>;

    /// Subscribe to every instance's traffic on a channel.
    async fn subscribe_all(&self, channel: &str) -> Result<Subscription>;
}

/// Releases the resources a subscription holds: the in-process refcount
/// slot and, for the shared backend, the remote Redis listener once the
/// last local subscriber has gone away.
#[async_trait::async_trait]
pub(crate) trait Disposer: Send + Sync {
    async fn dispose(&self);
}

/// A live subscription. Read `receiver` to drain messages; call
/// `unsubscribe()` to tear the subscription down. After `unsubscribe()`
/// returns, no further messages are delivered for that key through this
/// handle (spec.md §8) — a second call is a harmless no-op.
pub struct Subscription {
    pub receiver: broadcast::Receiver<BrokerMessage>,
    key: String,
    disposer: Arc<dyn Disposer>,
    disposed: std::sync::atomic::AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BrokerMessage>,
        key: String,
        disposer: Arc<dyn Disposer>,
    ) -> Self {
        Self {
            receiver,
            key,
            disposer,
            disposed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn unsubscribe(self) {
        if !self.disposed.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.disposer.dispose().await;
        }
    }
}
