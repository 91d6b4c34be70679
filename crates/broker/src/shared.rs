use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use redis::AsyncCommands;
use tracing::warn;

use fleet_common::{broker_key, broker_pattern_key, FleetError, InstanceId, Result};

use crate::inprocess::InProcessBroker;
use crate::message::BrokerMessage;
use crate::{Broker, Disposer, Subscription};

struct RemoteListener {
    ref_count: AtomicUsize,
    cancel: tokio::sync::watch::Sender<bool>,
}

/// Multi-replica pub/sub: same-replica subscribers are served directly by
/// an [`InProcessBroker`]; cross-replica fan-out rides Redis pub/sub.
/// Publishing always hits the local broker first so same-replica delivery
/// never waits on the network round trip, matching spec.md §4.3's
/// same-replica fast-path requirement. Redis client shape grounded on the
/// teacher's (now-removed) `crates/storage/src/redis.rs`.
pub struct SharedBroker {
    local: InProcessBroker,
    client: redis::Client,
    listeners: Arc<DashMap<String, Arc<RemoteListener>>>,
}

impl SharedBroker {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| FleetError::Broker(e.to_string()))?;
        Ok(Self {
            local: InProcessBroker::new(),
            client,
            listeners: Arc::new(DashMap::new()),
        })
    }

    async fn publish_remote(&self, key: &str, message: &BrokerMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| FleetError::Broker(e.to_string()))?;
        let _: i64 = conn
            .publish(key, payload)
            .await
            .map_err(|e| FleetError::Broker(e.to_string()))?;
        Ok(())
    }

    /// Ensures a background task is forwarding Redis deliveries for `key`
    /// (or its pattern) into the local broker, starting one if this is the
    /// first subscriber. `pattern` selects `PSUBSCRIBE` over `SUBSCRIBE`.
    async fn ensure_remote_listener(&self, key: &str, pattern: bool) -> Result<()> {
        if let Some(listener) = self.listeners.get(key) {
            listener.ref_count.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);
        let listener = Arc::new(RemoteListener {
            ref_count: AtomicUsize::new(1),
            cancel: cancel_tx,
        });
        self.listeners.insert(key.to_string(), listener);

        let client = self.client.clone();
        let local = self.local.clone();
        let key_owned = key.to_string();

        tokio::spawn(async move {
            let conn = match client.get_async_connection().await {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, key = %key_owned, "failed to open redis pub/sub connection");
                    return;
                }
            };
            let mut pubsub = conn.into_pubsub();
            let subscribed = if pattern {
                pubsub.psubscribe(&key_owned).await
            } else {
                pubsub.subscribe(&key_owned).await
            };
            if let Err(e) = subscribed {
                warn!(error = %e, key = %key_owned, "failed to subscribe to redis channel");
                return;
            }

            let mut stream = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        if *cancel_rx.borrow() {
                            break;
                        }
                    }
                    maybe_msg = stream.next() => {
                        let Some(msg) = maybe_msg else { break };
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "malformed redis pub/sub payload");
                                continue;
                            }
                        };
                        match serde_json::from_str::<BrokerMessage>(&payload) {
                            Ok(message) => local.publish_local(&key_owned, message),
                            Err(e) => warn!(error = %e, "failed to decode broker message"),
                        }
                    }
                }
            }
        });

        Ok(())
    }

    fn make_subscription(
        &self,
        key: String,
        receiver: tokio::sync::broadcast::Receiver<BrokerMessage>,
    ) -> Subscription {
        let disposer = Arc::new(SharedDisposer {
            local: self.local.clone(),
            listeners: self.listeners.clone(),
            key: key.clone(),
        });
        Subscription::new(receiver, key, disposer)
    }
}

#[async_trait::async_trait]
impl Broker for SharedBroker {
    async fn publish(&self, channel: &str, instance_id: &InstanceId, payload: serde_json::Value) -> Result<()> {
        let message = BrokerMessage {
            channel: channel.to_string(),
            instance_id: instance_id.clone(),
            payload,
        };
        let key = broker_key(channel, instance_id);
        self.local.publish_local(&key, message.clone());
        self.local.publish_local(&broker_pattern_key(channel), message.clone());
        self.publish_remote(&key, &message).await
    }

    async fn subscribe(&self, channel: &str, instance_id: &InstanceId) -> Result<Subscription> {
        let key = broker_key(channel, instance_id);
        let receiver = self.local.subscribe_key(&key);
        self.ensure_remote_listener(&key, false).await?;
        Ok(self.make_subscription(key, receiver))
    }

    async fn subscribe_all(&self, channel: &str) -> Result<Subscription> {
        let key = broker_pattern_key(channel);
        let receiver = self.local.subscribe_key(&key);
        self.ensure_remote_listener(&key, true).await?;
        Ok(self.make_subscription(key, receiver))
    }
}

/// Tears down both the local refcounted slot and, once the last local
/// subscriber for a key is gone, the background Redis listener task.
struct SharedDisposer {
    local: InProcessBroker,
    listeners: Arc<DashMap<String, Arc<RemoteListener>>>,
    key: String,
}

#[async_trait::async_trait]
impl Disposer for SharedDisposer {
    async fn dispose(&self) {
        self.local.release_key(&self.key);

        let mut remove = false;
        if let Some(listener) = self.listeners.get(&self.key) {
            if listener.ref_count.fetch_sub(1, Ordering::SeqCst) == 1 {
                let _ = listener.cancel.send(true);
                remove = true;
            }
        }
        if remove {
            self.listeners.remove(&self.key);
        }
    }
}
