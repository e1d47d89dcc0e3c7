//! Domain types for the Vigil monitoring engine.
//!
//! These are the records held in the shared counter store: per-operation
//! request statistics, raw performance samples, security events, and the
//! alerts raised from them. All types are serializable to/from JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub type Timestamp = u64;

// ── Operations ─────────────────────────────────────────────────────

/// An HTTP method + route pair, the aggregation key for request statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    pub method: String,
    pub route: String,
}

impl Operation {
    /// Build an operation; the method is normalised to upper case.
    pub fn new(method: impl AsRef<str>, route: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            route: route.into(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.route)
    }
}

/// One completed unit of work, as handed to the metric recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub method: String,
    pub route: String,
    pub duration_ms: f64,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: Timestamp,
}

impl PerformanceSample {
    /// Whether the response counts towards the error tally (status >= 400).
    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// Running aggregate statistics for one operation.
///
/// The percentile fields are a ratcheting approximation, not order
/// statistics. See `vigil_monitor::stats` for the update rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub method: String,
    pub route: String,
    pub request_count: u64,
    pub error_count: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    /// `error_count / request_count`, 0.0 when no requests were seen.
    pub error_rate: f64,
    pub last_updated: Timestamp,
}

impl OperationStats {
    pub fn operation(&self) -> Operation {
        Operation::new(&self.method, self.route.clone())
    }
}

// ── Security events ────────────────────────────────────────────────

/// Kind of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityEventType {
    FailedLogin,
    SuspiciousActivity,
    RateLimitExceeded,
    UnauthorizedAccess,
    #[serde(rename = "2fa-failed")]
    TwoFactorFailed,
    PasswordReset,
    AccountLocked,
}

impl SecurityEventType {
    pub const ALL: [SecurityEventType; 7] = [
        SecurityEventType::FailedLogin,
        SecurityEventType::SuspiciousActivity,
        SecurityEventType::RateLimitExceeded,
        SecurityEventType::UnauthorizedAccess,
        SecurityEventType::TwoFactorFailed,
        SecurityEventType::PasswordReset,
        SecurityEventType::AccountLocked,
    ];

    /// Wire name, also used inside store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::FailedLogin => "failed-login",
            SecurityEventType::SuspiciousActivity => "suspicious-activity",
            SecurityEventType::RateLimitExceeded => "rate-limit-exceeded",
            SecurityEventType::UnauthorizedAccess => "unauthorized-access",
            SecurityEventType::TwoFactorFailed => "2fa-failed",
            SecurityEventType::PasswordReset => "password-reset",
            SecurityEventType::AccountLocked => "account-locked",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown security event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for SecurityEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecurityEventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// Severity of a security event; fixed by the call site, never computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how a security event happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Free-form details supplied by the call site.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// A single security-relevant occurrence. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub context: EventContext,
    pub timestamp: Timestamp,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity, timestamp: Timestamp) -> Self {
        Self {
            event_type,
            user_id: None,
            ip_address: None,
            severity,
            context: EventContext::default(),
            timestamp,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.context.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.context.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.details.insert(key.into(), value.into());
        self
    }

    /// The subject occurrences are grouped under for alerting.
    pub fn subject(&self) -> AlertSubject {
        match (&self.user_id, &self.ip_address) {
            (Some(user), _) => AlertSubject::User(user.clone()),
            (None, Some(ip)) => AlertSubject::Ip(ip.clone()),
            (None, None) => AlertSubject::Unknown,
        }
    }
}

// ── Alerts ─────────────────────────────────────────────────────────

/// Who an alert is about: a user if known, otherwise the client address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertSubject {
    User(String),
    Ip(String),
    Unknown,
}

impl fmt::Display for AlertSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSubject::User(id) => write!(f, "user:{id}"),
            AlertSubject::Ip(addr) => write!(f, "ip:{addr}"),
            AlertSubject::Unknown => f.write_str("unknown"),
        }
    }
}

/// An escalation raised when occurrences of one event type for one subject
/// cross the configured threshold inside the rule window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: SecurityEventType,
    /// Rendered [`AlertSubject`], e.g. `ip:1.2.3.4`.
    pub subject: String,
    pub message: String,
    pub severity: Severity,
    /// Occurrence count at the latest trigger.
    pub count: u64,
    pub first_occurrence: Timestamp,
    pub last_occurrence: Timestamp,
    /// Context of the most recent triggering event.
    pub metadata: EventContext,
}
