//! `ChannelService`: CRUD + test over notification channels, with secret
//! masking on every read response (spec.md §4.5, §8).
//!
//! Masking happens here, in the read formatter, not in the persistence
//! layer, so the dispatcher can still load the unmasked config when it
//! actually delivers a notification (spec.md §9: "Secret masking on read").

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use fleet_common::{ChannelConfig, Result};
use fleet_persistence::{ChannelRepo, ChannelUpdate, NewChannel, NotificationChannel};

use crate::dispatcher::Dispatcher;

const MASK: &str = "***";

static SECRET_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)auth|token|key|secret").unwrap());

pub struct ChannelService {
    channels: Arc<dyn ChannelRepo>,
    dispatcher: Arc<Dispatcher>,
}

impl ChannelService {
    pub fn new(channels: Arc<dyn ChannelRepo>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { channels, dispatcher }
    }

    pub async fn create(&self, channel: NewChannel) -> Result<NotificationChannel> {
        let created = self.channels.create(channel).await?;
        Ok(mask(created))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<NotificationChannel>> {
        Ok(self.channels.get(id).await?.map(mask))
    }

    pub async fn update(&self, id: Uuid, update: ChannelUpdate) -> Result<Option<NotificationChannel>> {
        Ok(self.channels.update(id, update).await?.map(mask))
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.channels.delete(id).await
    }

    pub async fn list(&self, page: fleet_common::PageParams) -> Result<(Vec<NotificationChannel>, i64)> {
        let (channels, total) = self.channels.list(page).await?;
        Ok((channels.into_iter().map(mask).collect(), total))
    }

    /// Loads the channel's *unmasked* config and exercises the dispatcher's
    /// canned test delivery (spec.md §4.5: "`test(id)` loads the channel and
    /// invokes dispatcher `test(type, config)`").
    pub async fn test(&self, id: Uuid) -> Result<Option<crate::dispatcher::TestResult>> {
        let Some(channel) = self.channels.get(id).await? else {
            return Ok(None);
        };
        Ok(Some(self.dispatcher.test(channel.channel_type, &channel.config).await))
    }
}

/// Masks every secret-shaped field in a channel's config for HTTP responses
/// (spec.md §4.5, §8).
fn mask(mut channel: NotificationChannel) -> NotificationChannel {
    channel.config = mask_config(channel.config);
    channel
}

fn mask_config(config: ChannelConfig) -> ChannelConfig {
    match config {
        ChannelConfig::Webhook(mut webhook) => {
            if webhook.secret.is_some() {
                webhook.secret = Some(MASK.to_string());
            }
            for (name, value) in webhook.headers.iter_mut() {
                if SECRET_HEADER.is_match(name) {
                    *value = MASK.to_string();
                }
            }
            ChannelConfig::Webhook(webhook)
        }
        ChannelConfig::Slack(mut slack) => {
            slack.webhook_url = mask_url_tail(&slack.webhook_url);
            ChannelConfig::Slack(slack)
        }
        other => other,
    }
}

/// Replaces a chat webhook URL's terminal path segment with `/***` (spec.md
/// §4.5: "chat `webhook_url` has its terminal path segment replaced by
/// `/***`").
fn mask_url_tail(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => format!("{}/{}", &url[..idx], MASK),
        _ => format!("{url}/{MASK}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_common::{SlackConfig, WebhookConfig};
    use std::collections::HashMap;

    #[test]
    fn webhook_secret_is_masked() {
        let config = ChannelConfig::Webhook(WebhookConfig {
            url: "https://x.example/hook".into(),
            method: None,
            headers: HashMap::new(),
            secret: Some("super-secret".into()),
        });
        let masked = mask_config(config);
        let ChannelConfig::Webhook(webhook) = masked else { panic!("wrong variant") };
        assert_eq!(webhook.secret.as_deref(), Some(MASK));
    }

    #[test]
    fn header_matching_secret_pattern_is_masked() {
        let mut headers = HashMap::new();
        headers.insert("X-Auth-Token".to_string(), "abc123".to_string());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let config = ChannelConfig::Webhook(WebhookConfig {
            url: "https://x.example/hook".into(),
            method: None,
            headers,
            secret: None,
        });
        let masked = mask_config(config);
        let ChannelConfig::Webhook(webhook) = masked else { panic!("wrong variant") };
        assert_eq!(webhook.headers.get("X-Auth-Token").unwrap(), MASK);
        assert_eq!(webhook.headers.get("Content-Type").unwrap(), "application/json");
    }

    #[test]
    fn slack_webhook_url_tail_is_masked() {
        let config = ChannelConfig::Slack(SlackConfig {
            webhook_url: "https://hooks.slack.com/services/T000/B000/XXXXXXXXXXXX".into(),
        });
        let masked = mask_config(config);
        let ChannelConfig::Slack(slack) = masked else { panic!("wrong variant") };
        assert_eq!(slack.webhook_url, "https://hooks.slack.com/services/T000/B000/***");
    }
}
