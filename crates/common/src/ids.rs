use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(InstanceId);
uuid_id!(UserId);
uuid_id!(ApiKeyId);
uuid_id!(RuleId);
uuid_id!(ChannelId);
uuid_id!(AlertId);
uuid_id!(NotificationId);
uuid_id!(ConnectionId);
uuid_id!(SnapshotId);
uuid_id!(DriftEventId);
uuid_id!(SecretId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn id_roundtrips_through_json() {
        let id = AlertId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: AlertId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
