use fleet_common::InstanceId;
use serde::{Deserialize, Serialize};

/// One fanned-out pub/sub message (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerMessage {
    pub channel: String,
    pub instance_id: InstanceId,
    pub payload: serde_json::Value,
}
