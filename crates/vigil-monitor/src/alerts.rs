//! Alert engine: threshold evaluation for security events.
//!
//! Occurrences are counted per (event type, subject). Each increment
//! re-arms the counter's expiry to the rule window, so the window is
//! measured from the latest event rather than a fixed origin: a steady
//! trickle of events arriving just inside the window accumulates
//! indefinitely.
//!
//! Alert lifecycle:
//!
//! ```text
//! absent ──breach──▶ active ──breach──▶ active (count, last_occurrence bumped)
//!                      │
//!                      └── no breach for retention.alert ──▶ absent (TTL)
//! ```
//!
//! There is no resolved or acknowledged state; alerts only leave by expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use vigil_core::config::AlertRule;
use vigil_core::{Alert, SecurityEvent, SecurityEventType};

use crate::audit::{AuditEntry, AuditLevel, AuditTrail};
use crate::error::MonitorResult;
use crate::repository::Repository;

/// Rules indexed by event type.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<SecurityEventType, AlertRule>,
}

impl RuleTable {
    pub fn new(rules: &[AlertRule]) -> Self {
        Self {
            rules: rules.iter().map(|r| (r.event_type, r.clone())).collect(),
        }
    }

    pub fn rule_for(&self, event_type: SecurityEventType) -> Option<&AlertRule> {
        self.rules.get(&event_type)
    }
}

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The event type has no rule; nothing was counted.
    NoRule,
    /// Counted, still under the threshold.
    BelowThreshold { count: u64, threshold: u64 },
    /// Threshold crossed with no active alert; a new one was created.
    Raised(Alert),
    /// Threshold crossed again while an alert was active.
    Updated(Alert),
}

pub struct AlertEngine {
    repo: Arc<Repository>,
    rules: RuleTable,
    audit: Arc<dyn AuditTrail>,
}

impl AlertEngine {
    pub fn new(repo: Arc<Repository>, rules: RuleTable, audit: Arc<dyn AuditTrail>) -> Self {
        Self { repo, rules, audit }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Count `event` against its rule and raise or update an alert if the
    /// threshold is reached.
    pub async fn evaluate(&self, event: &SecurityEvent) -> MonitorResult<Evaluation> {
        let Some(rule) = self.rules.rule_for(event.event_type) else {
            debug!(event_type = %event.event_type, "no alert rule, not counted");
            return Ok(Evaluation::NoRule);
        };

        let subject = event.subject();
        let window = Duration::from_secs(rule.window_secs);
        let count = self
            .repo
            .bump_alert_counter(event.event_type, &subject, window)
            .await?;

        if count < rule.threshold {
            return Ok(Evaluation::BelowThreshold {
                count,
                threshold: rule.threshold,
            });
        }

        let subject = subject.to_string();
        let message = alert_message(event.event_type, count, rule.window_secs, &subject);

        if let Some(mut alert) = self.repo.load_alert(event.event_type, &subject).await? {
            alert.count = count;
            alert.last_occurrence = event.timestamp;
            alert.message = message;
            alert.severity = event.severity;
            alert.metadata = event.context.clone();
            self.repo.save_alert(&alert).await?;
            debug!(
                alert_type = %alert.alert_type,
                subject = %alert.subject,
                count,
                "security alert re-triggered"
            );
            return Ok(Evaluation::Updated(alert));
        }

        let alert = Alert {
            alert_type: event.event_type,
            subject,
            message,
            severity: event.severity,
            count,
            first_occurrence: event.timestamp,
            last_occurrence: event.timestamp,
            metadata: event.context.clone(),
        };
        self.repo.save_alert(&alert).await?;

        warn!(
            component = "alerts",
            alert_type = %alert.alert_type,
            subject = %alert.subject,
            severity = %alert.severity,
            count,
            threshold = rule.threshold,
            "security alert raised: {}",
            alert.message
        );

        // The alert is already stored; a failed audit write only loses the
        // audit copy.
        if let Err(e) = self.audit.save_audit_log(alert_audit_entry(&alert, event)).await {
            warn!(component = "alerts", error = %e, "failed to forward alert to audit trail");
        }

        Ok(Evaluation::Raised(alert))
    }
}

fn alert_audit_entry(alert: &Alert, event: &SecurityEvent) -> AuditEntry {
    AuditEntry {
        message: format!("Security alert: {}", alert.message),
        user_id: event.user_id.clone(),
        category: "security_alert".to_string(),
        level: AuditLevel::from(alert.severity),
        metadata: serde_json::json!({
            "alert_type": alert.alert_type,
            "subject": alert.subject,
            "count": alert.count,
            "first_occurrence": alert.first_occurrence,
            "context": alert.metadata,
        }),
        ip_address: event.ip_address.clone(),
        user_agent: event.context.user_agent.clone(),
        endpoint: event.context.endpoint.clone(),
    }
}

/// Human-readable alert text, e.g.
/// `5 failed login attempts within 15 minutes for ip:1.2.3.4`.
pub fn alert_message(
    event_type: SecurityEventType,
    count: u64,
    window_secs: u64,
    subject: &str,
) -> String {
    let what = match event_type {
        SecurityEventType::FailedLogin => "failed login attempts",
        SecurityEventType::RateLimitExceeded => "rate limit violations",
        SecurityEventType::UnauthorizedAccess => "unauthorized access attempts",
        SecurityEventType::SuspiciousActivity => "suspicious activity reports",
        SecurityEventType::TwoFactorFailed => "failed 2FA verifications",
        SecurityEventType::PasswordReset => "password reset requests",
        SecurityEventType::AccountLocked => "account lockouts",
    };
    format!("{count} {what} within {} for {subject}", human_window(window_secs))
}

fn human_window(secs: u64) -> String {
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    if secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, Harness};
    use vigil_core::config::default_rules;
    use vigil_core::Clock;
    use vigil_core::Severity;

    fn engine(h: &Harness) -> AlertEngine {
        AlertEngine::new(h.repo.clone(), RuleTable::new(&default_rules()), h.audit.clone())
    }

    fn failed_login(h: &Harness, ip: &str) -> SecurityEvent {
        SecurityEvent::new(
            SecurityEventType::FailedLogin,
            Severity::Medium,
            h.clock.now_millis(),
        )
        .with_ip(ip)
        .with_endpoint("/auth/login")
    }

    #[test]
    fn messages_render_window() {
        assert_eq!(
            alert_message(SecurityEventType::FailedLogin, 5, 900, "ip:1.2.3.4"),
            "5 failed login attempts within 15 minutes for ip:1.2.3.4"
        );
        assert_eq!(
            alert_message(SecurityEventType::SuspiciousActivity, 3, 3600, "user:9"),
            "3 suspicious activity reports within 1 hour for user:9"
        );
        assert_eq!(human_window(90), "90 seconds");
        assert_eq!(human_window(60), "1 minute");
    }

    #[tokio::test]
    async fn alert_raised_exactly_at_threshold() {
        let h = harness();
        let engine = engine(&h);

        for n in 1..=4 {
            let outcome = engine.evaluate(&failed_login(&h, "1.2.3.4")).await.unwrap();
            assert_eq!(
                outcome,
                Evaluation::BelowThreshold {
                    count: n,
                    threshold: 5
                }
            );
        }
        assert!(h.repo.scan_alerts().await.unwrap().is_empty());

        let outcome = engine.evaluate(&failed_login(&h, "1.2.3.4")).await.unwrap();
        let Evaluation::Raised(alert) = outcome else {
            panic!("expected a raised alert, got {outcome:?}");
        };
        assert_eq!(alert.alert_type, SecurityEventType::FailedLogin);
        assert_eq!(alert.subject, "ip:1.2.3.4");
        assert_eq!(alert.count, 5);
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.metadata.endpoint.as_deref(), Some("/auth/login"));

        // Raised alerts are forwarded to the audit trail.
        let entries = h.audit.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, "security_alert");
    }

    #[tokio::test]
    async fn retrigger_preserves_first_occurrence() {
        let h = harness();
        let engine = engine(&h);

        for _ in 0..5 {
            engine.evaluate(&failed_login(&h, "1.2.3.4")).await.unwrap();
        }
        let first = h.repo.scan_alerts().await.unwrap().remove(0);

        h.clock.advance(Duration::from_secs(30));
        let outcome = engine.evaluate(&failed_login(&h, "1.2.3.4")).await.unwrap();
        let Evaluation::Updated(updated) = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(updated.count, 6);
        assert_eq!(updated.first_occurrence, first.first_occurrence);
        assert_eq!(updated.last_occurrence, first.last_occurrence + 30_000);
        assert!(updated.message.starts_with("6 failed login attempts"));

        // Only the initial raise is audited.
        assert_eq!(h.audit.entries().await.len(), 1);
        assert_eq!(h.repo.scan_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn two_factor_failures_never_escalate() {
        // No rule exists for 2fa-failed; this pins the current behaviour.
        let h = harness();
        let engine = engine(&h);
        for _ in 0..50 {
            let event = SecurityEvent::new(
                SecurityEventType::TwoFactorFailed,
                Severity::High,
                h.clock.now_millis(),
            )
            .with_user("42");
            assert_eq!(engine.evaluate(&event).await.unwrap(), Evaluation::NoRule);
        }
        assert!(h.repo.scan_alerts().await.unwrap().is_empty());
        let count = h
            .repo
            .alert_counter(
                SecurityEventType::TwoFactorFailed,
                &vigil_core::AlertSubject::User("42".into()),
            )
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn counter_resets_after_window_expires() {
        let h = harness();
        let engine = engine(&h);
        for _ in 0..4 {
            engine.evaluate(&failed_login(&h, "5.6.7.8")).await.unwrap();
        }
        h.clock.advance(Duration::from_secs(15 * 60));

        let outcome = engine.evaluate(&failed_login(&h, "5.6.7.8")).await.unwrap();
        assert_eq!(
            outcome,
            Evaluation::BelowThreshold {
                count: 1,
                threshold: 5
            }
        );
    }

    #[tokio::test]
    async fn trickle_just_inside_window_accumulates() {
        // The window is re-armed by every event, so events spaced just under
        // the window never let the counter expire. Kept as-is; flagged here.
        let h = harness();
        let engine = engine(&h);
        let mut last = Evaluation::NoRule;
        for _ in 0..5 {
            last = engine.evaluate(&failed_login(&h, "9.9.9.9")).await.unwrap();
            h.clock.advance(Duration::from_secs(14 * 60));
        }
        assert!(matches!(last, Evaluation::Raised(ref a) if a.count == 5));
    }

    #[tokio::test]
    async fn expired_alert_is_raised_fresh() {
        let h = harness();
        let engine = engine(&h);
        for _ in 0..5 {
            engine.evaluate(&failed_login(&h, "1.1.1.1")).await.unwrap();
        }
        let first = h.repo.scan_alerts().await.unwrap().remove(0);

        // Past both the counter window and the alert retention.
        h.clock.advance(Duration::from_secs(61 * 60));
        assert!(h.repo.scan_alerts().await.unwrap().is_empty());

        let mut outcome = Evaluation::NoRule;
        for _ in 0..5 {
            outcome = engine.evaluate(&failed_login(&h, "1.1.1.1")).await.unwrap();
        }
        let Evaluation::Raised(fresh) = outcome else {
            panic!("expected a fresh alert, got {outcome:?}");
        };
        assert_eq!(fresh.count, 5);
        assert!(fresh.first_occurrence > first.last_occurrence);
    }

    #[tokio::test]
    async fn subjects_are_counted_separately() {
        let h = harness();
        let engine = engine(&h);
        for _ in 0..4 {
            engine.evaluate(&failed_login(&h, "1.0.0.1")).await.unwrap();
            engine.evaluate(&failed_login(&h, "1.0.0.2")).await.unwrap();
        }
        assert!(h.repo.scan_alerts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn suspicious_activity_uses_hour_window() {
        let h = harness();
        let engine = engine(&h);
        let event = || {
            SecurityEvent::new(
                SecurityEventType::SuspiciousActivity,
                Severity::High,
                h.clock.now_millis(),
            )
            .with_user("u1")
        };
        engine.evaluate(&event()).await.unwrap();
        h.clock.advance(Duration::from_secs(50 * 60));
        engine.evaluate(&event()).await.unwrap();
        h.clock.advance(Duration::from_secs(50 * 60));
        let outcome = engine.evaluate(&event()).await.unwrap();
        assert!(matches!(outcome, Evaluation::Raised(ref a) if a.count == 3));
    }

    #[tokio::test]
    async fn audit_failure_does_not_block_alert() {
        let h = harness();
        h.audit.fail(true);
        let engine = engine(&h);
        let mut outcome = Evaluation::NoRule;
        for _ in 0..5 {
            outcome = engine.evaluate(&failed_login(&h, "2.2.2.2")).await.unwrap();
        }
        assert!(matches!(outcome, Evaluation::Raised(_)));
        assert_eq!(h.repo.scan_alerts().await.unwrap().len(), 1);
    }
}
