//! Event recorder: persistence, audit forwarding and alert evaluation for
//! security events.
//!
//! [`EventRecorder::record`] runs four steps in order: persist the event,
//! forward it to the audit trail, evaluate alert rules, and log critical
//! events. Each step is best-effort on its own, so an audit outage still
//! lets the alert engine run and vice versa.

use std::sync::Arc;

use tracing::{debug, error};

use vigil_core::{Clock, SecurityEvent, SecurityEventType, Severity};

use crate::alerts::AlertEngine;
use crate::audit::{AuditEntry, AuditLevel, AuditTrail};
use crate::boundary::best_effort;
use crate::error::MonitorError;
use crate::repository::Repository;

/// Caller identity attached to the convenience recorders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientInfo {
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn ip(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            ..Default::default()
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn apply(&self, mut event: SecurityEvent) -> SecurityEvent {
        event.user_id = self.user_id.clone();
        event.ip_address = self.ip_address.clone();
        event.context.user_agent = self.user_agent.clone();
        event
    }
}

pub struct EventRecorder {
    repo: Arc<Repository>,
    audit: Arc<dyn AuditTrail>,
    alerts: AlertEngine,
    clock: Arc<dyn Clock>,
}

impl EventRecorder {
    pub fn new(
        repo: Arc<Repository>,
        audit: Arc<dyn AuditTrail>,
        alerts: AlertEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            audit,
            alerts,
            clock,
        }
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    /// Record a security event. The recorder stamps the timestamp; any
    /// value already on `event` is replaced. Never fails.
    pub async fn record(&self, mut event: SecurityEvent) {
        event.timestamp = self.clock.now_millis();

        if let Some(key) = best_effort("security", "persist", self.repo.save_event(&event)).await {
            debug!(%key, event_type = %event.event_type, "security event stored");
        }

        best_effort("security", "audit", async {
            self.audit
                .save_audit_log(event_audit_entry(&event))
                .await
                .map_err(MonitorError::from)
        })
        .await;

        best_effort("security", "evaluate", self.alerts.evaluate(&event)).await;

        if event.severity == Severity::Critical {
            error!(
                component = "security",
                critical = true,
                event_type = %event.event_type,
                subject = %event.subject(),
                endpoint = event.context.endpoint.as_deref().unwrap_or("-"),
                "critical security event: {}",
                event.event_type
            );
        }
    }

    fn draft(&self, event_type: SecurityEventType, severity: Severity) -> SecurityEvent {
        SecurityEvent::new(event_type, severity, self.clock.now_millis())
    }

    pub async fn failed_login(&self, client: &ClientInfo, reason: &str) {
        let event = self
            .draft(SecurityEventType::FailedLogin, Severity::Medium)
            .with_endpoint("/auth/login")
            .with_detail("reason", reason);
        self.record(client.apply(event)).await;
    }

    pub async fn rate_limit_exceeded(&self, client: &ClientInfo, endpoint: &str, limit: u64) {
        let event = self
            .draft(SecurityEventType::RateLimitExceeded, Severity::Medium)
            .with_endpoint(endpoint)
            .with_detail("limit", limit);
        self.record(client.apply(event)).await;
    }

    pub async fn unauthorized_access(&self, client: &ClientInfo, endpoint: &str, resource: &str) {
        let event = self
            .draft(SecurityEventType::UnauthorizedAccess, Severity::High)
            .with_endpoint(endpoint)
            .with_detail("resource", resource);
        self.record(client.apply(event)).await;
    }

    pub async fn two_factor_failed(&self, client: &ClientInfo, method: &str) {
        let event = self
            .draft(SecurityEventType::TwoFactorFailed, Severity::High)
            .with_endpoint("/auth/2fa/verify")
            .with_detail("method", method);
        self.record(client.apply(event)).await;
    }

    pub async fn suspicious_activity(&self, client: &ClientInfo, endpoint: &str, description: &str) {
        let event = self
            .draft(SecurityEventType::SuspiciousActivity, Severity::High)
            .with_endpoint(endpoint)
            .with_detail("description", description);
        self.record(client.apply(event)).await;
    }

    pub async fn password_reset_requested(&self, client: &ClientInfo, email: &str) {
        let event = self
            .draft(SecurityEventType::PasswordReset, Severity::Low)
            .with_endpoint("/auth/password-reset")
            .with_detail("email", email);
        self.record(client.apply(event)).await;
    }

    pub async fn account_locked(&self, client: &ClientInfo, failed_attempts: u64) {
        let event = self
            .draft(SecurityEventType::AccountLocked, Severity::High)
            .with_endpoint("/auth/login")
            .with_detail("failed_attempts", failed_attempts);
        self.record(client.apply(event)).await;
    }
}

fn event_audit_entry(event: &SecurityEvent) -> AuditEntry {
    AuditEntry {
        message: format!("Security event: {}", event.event_type),
        user_id: event.user_id.clone(),
        category: "security".to_string(),
        level: AuditLevel::from(event.severity),
        metadata: serde_json::json!({
            "event_type": event.event_type,
            "severity": event.severity,
            "timestamp": event.timestamp,
            "details": event.context.details,
        }),
        ip_address: event.ip_address.clone(),
        user_agent: event.context.user_agent.clone(),
        endpoint: event.context.endpoint.clone(),
    }
}
