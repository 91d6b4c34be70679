//! Webhook delivery: HTTP POST (or configured method) with optional
//! HMAC-SHA256 request signing (spec.md §4.4.3, §6).
//!
//! Signing is computed over the exact serialized body bytes that go out on
//! the wire, grounded on the sign-then-header shape of
//! `other_examples/f550258c_suryatmodulus-svix-webhooks__server-svix-server-src-worker.rs.rs`'s
//! `sign_msg`/`generate_msg_headers`.

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use sha2::Sha256;

use fleet_common::WebhookConfig;

use crate::dispatcher::AlertPayload;

type HmacSha256 = Hmac<Sha256>;

pub async fn deliver(
    config: &WebhookConfig,
    payload: &AlertPayload,
    timeout: Duration,
    user_agent: &str,
) -> Result<(), String> {
    let body = serde_json::to_vec(payload).map_err(|e| format!("failed to serialize payload: {e}"))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent).unwrap_or_else(|_| HeaderValue::from_static("fleet-console/1.0")));

    for (name, value) in &config.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    if let Some(secret) = &config.secret {
        let signature = sign(secret, &body);
        headers.insert(
            HeaderName::from_static("x-fleet-signature"),
            HeaderValue::from_str(&format!("sha256={signature}")).map_err(|e| e.to_string())?,
        );
    }

    let method = match config.method.as_deref() {
        Some("PUT") | Some("put") => reqwest::Method::PUT,
        _ => reqwest::Method::POST,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build http client: {e}"))?;

    let response = client
        .request(method, &config.url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| format!("webhook request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("webhook returned non-2xx status {}", response.status()));
    }
    Ok(())
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hmac_sha256_hex() {
        let body = br#"{"alertId":"x"}"#;
        let sig1 = sign("S", body);
        let sig2 = sign("S", body);
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64);
        assert!(sig1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        let body = br#"{"alertId":"x"}"#;
        assert_ne!(sign("S1", body), sign("S2", body));
    }
}
