//! Pre-handshake authentication (spec.md §4.2, §6).
//!
//! The raw API key is taken from `X-Api-Key` or, failing that, the `apiKey`
//! query parameter (browsers cannot set custom headers on a WebSocket
//! upgrade). Its SHA-256 hex digest is looked up against the stored hash;
//! the plaintext key itself is never persisted or logged.

use sha2::{Digest, Sha256};

use fleet_common::{FleetError, InstanceId, Result, Role, UserId};
use fleet_persistence::ApiKeyRepo;

/// The authenticated identity attached to a connection after upgrade
/// (spec.md §4.2, glossary: "Principal").
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub instance_id: Option<InstanceId>,
    pub api_key_id: fleet_common::ApiKeyId,
}

impl Principal {
    /// Whether this connection represents an instance agent (has a bound
    /// instance id) rather than a browser session.
    pub fn is_agent(&self) -> bool {
        self.instance_id.is_some()
    }
}

pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extracts the raw key from a header value or a query string, preferring
/// the header (spec.md §6: `X-Api-Key` OR `?apiKey=`).
pub fn extract_raw_key(header: Option<&str>, query: Option<&str>) -> Option<String> {
    header
        .map(|s| s.to_string())
        .or_else(|| query.map(|s| s.to_string()))
}

/// Runs the full pre-handshake authentication flow against the persistence
/// façade. `instance_header` is `X-Instance-ID`, used only to populate the
/// principal when present — it is not itself validated against the agent's
/// actual instance ownership in the core (left to the lifecycle service).
pub async fn authenticate(
    api_keys: &dyn ApiKeyRepo,
    raw_key: Option<&str>,
    instance_header: Option<&str>,
) -> Result<Principal> {
    let raw_key = raw_key.ok_or(FleetError::MissingApiKey)?;
    let hash = hash_key(raw_key);

    let record = api_keys
        .find_by_hash(&hash)
        .await?
        .ok_or(FleetError::InvalidApiKey)?;

    // `find_by_hash` already excludes expired keys, but a key found by hash
    // moments after expiring would otherwise slip through a stale read path;
    // re-check defensively against the record's own `expires_at`.
    if let Some(expires_at) = record.expires_at {
        if expires_at <= chrono::Utc::now() {
            return Err(FleetError::ExpiredApiKey);
        }
    }

    let role = api_keys
        .role_for_user(record.owner_user_id)
        .await?
        .unwrap_or(Role::Viewer);

    let instance_id = instance_header
        .and_then(|s| s.parse::<uuid::Uuid>().ok())
        .map(InstanceId::from);

    Ok(Principal {
        user_id: UserId::from(record.owner_user_id),
        role,
        instance_id,
        api_key_id: fleet_common::ApiKeyId::from(record.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_sha256_hex() {
        let h1 = hash_key("secret-key");
        let h2 = hash_key("secret-key");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_keys_hash_differently() {
        assert_ne!(hash_key("a"), hash_key("b"));
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let key = extract_raw_key(Some("header-key"), Some("query-key"));
        assert_eq!(key.as_deref(), Some("header-key"));
    }

    #[test]
    fn falls_back_to_query_when_header_absent() {
        let key = extract_raw_key(None, Some("query-key"));
        assert_eq!(key.as_deref(), Some("query-key"));
    }

    #[test]
    fn missing_both_yields_none() {
        assert!(extract_raw_key(None, None).is_none());
    }
}
