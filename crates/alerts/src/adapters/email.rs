//! E-mail delivery: the core builds the subject/body and hands them to a
//! pluggable [`EmailSink`]; the concrete transport (SMTP relay, SES, …) is
//! an external collaborator out of scope for the core (spec.md §1, §4.4.3).

use async_trait::async_trait;

use fleet_common::EmailConfig;

use crate::dispatcher::AlertPayload;

/// The boundary the core exposes to an external mail transport. Concrete
/// implementations live outside this crate; the core only needs "does this
/// call succeed".
#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), String>;
}

/// Records success on call return without attempting real delivery — the
/// default sink until a concrete transport is wired in at the binary edge
/// (spec.md §4.4.3: "records success on call return").
pub struct LoggingEmailSink;

#[async_trait]
impl EmailSink for LoggingEmailSink {
    async fn send(&self, recipients: &[String], subject: &str, _body: &str) -> Result<(), String> {
        tracing::info!(recipients = ?recipients, subject, "email sink invoked (no concrete transport configured)");
        Ok(())
    }
}

pub fn build_subject(prefix: Option<&str>, payload: &AlertPayload) -> String {
    let prefix = prefix.unwrap_or("[fleet-console]");
    format!("{prefix} {}: {}", payload.severity, payload.title)
}

pub fn build_body(payload: &AlertPayload) -> String {
    format!(
        "{}\n\nRule: {}\nSeverity: {}\nFired at: {}\n",
        payload.message,
        payload.rule_name,
        payload.severity,
        payload.fired_at.to_rfc2822()
    )
}

pub async fn deliver_with_sink(
    sink: &dyn EmailSink,
    config: &EmailConfig,
    payload: &AlertPayload,
) -> Result<(), String> {
    let subject = build_subject(config.subject_prefix.as_deref(), payload);
    let body = build_body(payload);
    sink.send(&config.recipients, &subject, &body).await
}

/// Convenience entry point used where no sink has been wired in (e.g. the
/// channel `test()` operation); delegates to [`LoggingEmailSink`].
pub async fn deliver(config: &EmailConfig, payload: &AlertPayload) -> Result<(), String> {
    deliver_with_sink(&LoggingEmailSink, config, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn payload() -> AlertPayload {
        AlertPayload {
            alert_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            rule_name: "CPU>90".into(),
            rule_type: fleet_common::RuleType::Threshold,
            instance_id: None,
            severity: fleet_common::Severity::High,
            title: "CPU usage threshold exceeded".into(),
            message: "CPU usage is 92.7%".into(),
            status: fleet_common::AlertStatus::Active,
            fired_at: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn subject_uses_default_prefix_when_absent() {
        let subject = build_subject(None, &payload());
        assert_eq!(subject, "[fleet-console] HIGH: CPU usage threshold exceeded");
    }

    #[test]
    fn subject_honours_configured_prefix() {
        let subject = build_subject(Some("[ALERT]"), &payload());
        assert_eq!(subject, "[ALERT] HIGH: CPU usage threshold exceeded");
    }

    #[tokio::test]
    async fn default_sink_records_success() {
        let config = EmailConfig { recipients: vec!["ops@example.com".into()], subject_prefix: None };
        assert!(deliver(&config, &payload()).await.is_ok());
    }
}
