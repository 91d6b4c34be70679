//! Slack-style chat delivery: POST to an incoming-webhook URL with a fixed
//! attachment shape (spec.md §4.4.3).

use std::time::Duration;

use fleet_common::{Severity, SlackConfig};
use serde_json::json;

use crate::dispatcher::AlertPayload;

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "\u{1F6A8}",
        Severity::High => "\u{26A0}\u{FE0F}",
        Severity::Medium => "\u{26A1}",
        Severity::Low => "\u{2139}\u{FE0F}",
        Severity::Info => "\u{1F4A1}",
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#FF0000",
        Severity::High => "#FF6600",
        Severity::Medium => "#FFA500",
        Severity::Low => "#0099FF",
        Severity::Info => "#999999",
    }
}

pub async fn deliver(config: &SlackConfig, payload: &AlertPayload, timeout: Duration) -> Result<(), String> {
    let mut fields = vec![
        json!({"title": "Severity", "value": payload.severity.to_string(), "short": true}),
        json!({"title": "Rule", "value": payload.rule_name, "short": true}),
    ];
    if let Some(instance_id) = payload.instance_id {
        fields.push(json!({"title": "Instance", "value": instance_id.to_string(), "short": true}));
    }
    fields.push(json!({
        "title": "FiredAt",
        "value": payload.fired_at.to_rfc2822(),
        "short": true,
    }));

    let body = json!({
        "attachments": [{
            "color": severity_color(payload.severity),
            "title": format!("{} {}", severity_emoji(payload.severity), payload.title),
            "text": payload.message,
            "fields": fields,
            "footer": "fleet-console",
            "ts": payload.fired_at.timestamp(),
        }]
    });

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build http client: {e}"))?;

    let response = client
        .post(&config.webhook_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("chat webhook request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("chat webhook returned non-2xx status {}", response.status()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_color_mapping_matches_spec() {
        assert_eq!(severity_color(Severity::Critical), "#FF0000");
        assert_eq!(severity_color(Severity::High), "#FF6600");
        assert_eq!(severity_color(Severity::Medium), "#FFA500");
        assert_eq!(severity_color(Severity::Low), "#0099FF");
        assert_eq!(severity_color(Severity::Info), "#999999");
    }
}
