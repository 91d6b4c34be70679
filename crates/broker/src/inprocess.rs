use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use fleet_common::{broker_key, broker_pattern_key, InstanceId, Result};

use crate::message::BrokerMessage;
use crate::{Broker, Disposer, Subscription};

const CHANNEL_CAPACITY: usize = 256;

struct Slot {
    sender: broadcast::Sender<BrokerMessage>,
    ref_count: usize,
}

/// Single-replica pub/sub: every key fans out through an in-memory
/// `broadcast` channel. Grounded on `BidirectionalEventChannel` in the
/// teacher's `execution_manager.rs`, generalized from one channel per
/// connection to a keyed table so multiple channel/instance pairs can
/// share one broker instance.
#[derive(Clone, Default)]
pub struct InProcessBroker {
    keyed: Arc<DashMap<String, Slot>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fans a message out to local subscribers of `key` only. Used both by
    /// `publish` directly and, in the shared backend, to redeliver messages
    /// that arrived over Redis without re-publishing them remotely.
    pub(crate) fn publish_local(&self, key: &str, message: BrokerMessage) {
        if let Some(slot) = self.keyed.get(key) {
            let _ = slot.sender.send(message);
        }
    }

    pub(crate) fn subscribe_key(&self, key: &str) -> broadcast::Receiver<BrokerMessage> {
        let mut entry = self.keyed.entry(key.to_string()).or_insert_with(|| Slot {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            ref_count: 0,
        });
        entry.ref_count += 1;
        entry.sender.subscribe()
    }

    /// Decrements `key`'s reference count, removing the slot once the last
    /// subscriber has gone. Used directly by the shared backend's disposer,
    /// which needs to tear down the local slot alongside its remote
    /// listener rather than going through a second `Subscription`.
    pub(crate) fn release_key(&self, key: &str) {
        let mut remove = false;
        if let Some(mut entry) = self.keyed.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            remove = entry.ref_count == 0;
        }
        if remove {
            self.keyed.remove(key);
        }
    }

    fn make_subscription(&self, key: String, receiver: broadcast::Receiver<BrokerMessage>) -> Subscription {
        let disposer = Arc::new(InProcessDisposer {
            keyed: self.keyed.clone(),
            key: key.clone(),
        });
        Subscription::new(receiver, key, disposer)
    }
}

#[async_trait::async_trait]
impl Broker for InProcessBroker {
    async fn publish(&self, channel: &str, instance_id: &InstanceId, payload: serde_json::Value) -> Result<()> {
        let message = BrokerMessage {
            channel: channel.to_string(),
            instance_id: instance_id.clone(),
            payload,
        };
        self.publish_local(&broker_key(channel, instance_id), message.clone());
        self.publish_local(&broker_pattern_key(channel), message);
        Ok(())
    }

    async fn subscribe(&self, channel: &str, instance_id: &InstanceId) -> Result<Subscription> {
        let key = broker_key(channel, instance_id);
        let receiver = self.subscribe_key(&key);
        Ok(self.make_subscription(key, receiver))
    }

    async fn subscribe_all(&self, channel: &str) -> Result<Subscription> {
        let key = broker_pattern_key(channel);
        let receiver = self.subscribe_key(&key);
        Ok(self.make_subscription(key, receiver))
    }
}

/// Decrements a key's reference count on drop, removing the slot entirely
/// once the last subscriber has torn down.
struct InProcessDisposer {
    keyed: Arc<DashMap<String, Slot>>,
    key: String,
}

#[async_trait::async_trait]
impl Disposer for InProcessDisposer {
    async fn dispose(&self) {
        let mut remove = false;
        if let Some(mut entry) = self.keyed.get_mut(&self.key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            remove = entry.ref_count == 0;
        }
        if remove {
            self.keyed.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::InstanceId;

    #[tokio::test]
    async fn publish_reaches_matching_key_subscriber() {
        let broker = InProcessBroker::new();
        let instance_id = InstanceId::new();
        let sub = broker.subscribe("metrics:update", &instance_id).await.unwrap();
        let mut receiver = sub.receiver;

        broker
            .publish("metrics:update", &instance_id, serde_json::json!({"cpu": 50}))
            .await
            .unwrap();

        let message = receiver.recv().await.unwrap();
        assert_eq!(message.instance_id, instance_id);
    }

    #[tokio::test]
    async fn subscribe_all_receives_every_instance() {
        let broker = InProcessBroker::new();
        let a = InstanceId::new();
        let b = InstanceId::new();
        let sub = broker.subscribe_all("log:line").await.unwrap();
        let mut receiver = sub.receiver;

        broker.publish("log:line", &a, serde_json::json!("hello")).await.unwrap();
        broker.publish("log:line", &b, serde_json::json!("world")).await.unwrap();

        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.instance_id, a);
        assert_eq!(second.instance_id, b);
    }

    #[tokio::test]
    async fn unrelated_instance_does_not_receive_scoped_publish() {
        let broker = InProcessBroker::new();
        let watched = InstanceId::new();
        let other = InstanceId::new();
        let sub = broker.subscribe("metrics:update", &watched).await.unwrap();
        let mut receiver = sub.receiver;

        broker
            .publish("metrics:update", &other, serde_json::json!({"cpu": 10}))
            .await
            .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), receiver.recv()).await;
        assert!(result.is_err(), "subscriber scoped to `watched` should not see `other`'s publish");
    }

    #[tokio::test]
    async fn unsubscribe_tears_down_slot_once_refcount_hits_zero() {
        let broker = InProcessBroker::new();
        let instance_id = InstanceId::new();
        let key = broker_key("metrics:update", &instance_id);

        let sub1 = broker.subscribe("metrics:update", &instance_id).await.unwrap();
        let sub2 = broker.subscribe("metrics:update", &instance_id).await.unwrap();
        assert!(broker.keyed.contains_key(&key));

        sub1.unsubscribe().await;
        assert!(broker.keyed.contains_key(&key), "slot must survive while another subscriber remains");

        sub2.unsubscribe().await;
        assert!(!broker.keyed.contains_key(&key), "slot must be removed once the last subscriber unsubscribes");
    }

    #[tokio::test]
    async fn unsubscribe_does_not_deliver_further_messages() {
        let broker = InProcessBroker::new();
        let instance_id = InstanceId::new();
        let sub = broker.subscribe("metrics:update", &instance_id).await.unwrap();
        let mut receiver = sub.receiver.resubscribe();
        sub.unsubscribe().await;

        broker
            .publish("metrics:update", &instance_id, serde_json::json!({"cpu": 99}))
            .await
            .unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), receiver.recv()).await;
        assert!(result.is_err(), "no message should arrive once the slot has been torn down");
    }
}
