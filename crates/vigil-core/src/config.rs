//! vigil.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::types::SecurityEventType;

/// Window applied to alert rules that do not set one (15 minutes).
pub const DEFAULT_ALERT_WINDOW_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9464
}

/// Which counter store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redb,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file for the redb backend.
    pub path: Option<String>,
    /// Connection URL for the redis backend.
    pub url: Option<String>,
    /// Key prefix, lets several deployments share one redis.
    #[serde(default)]
    pub namespace: String,
    /// How often expired entries are purged (backends without native TTL).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            url: None,
            namespace: String::new(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// How long each record class lives after its last write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_day")]
    pub stats_secs: u64,
    #[serde(default = "default_day")]
    pub events_secs: u64,
    #[serde(default = "default_alert_retention")]
    pub alert_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            stats_secs: default_day(),
            events_secs: default_day(),
            alert_secs: default_alert_retention(),
        }
    }
}

fn default_day() -> u64 {
    24 * 60 * 60
}

fn default_alert_retention() -> u64 {
    60 * 60
}

/// Thresholds for the log-only performance alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_slow_request_ms")]
    pub slow_request_ms: f64,
    #[serde(default = "default_slow_window")]
    pub slow_window_secs: u64,
    #[serde(default = "default_slow_alert_count")]
    pub slow_alert_count: i64,
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_request_ms: default_slow_request_ms(),
            slow_window_secs: default_slow_window(),
            slow_alert_count: default_slow_alert_count(),
            error_rate_threshold: default_error_rate_threshold(),
        }
    }
}

fn default_slow_request_ms() -> f64 {
    1000.0
}

fn default_slow_window() -> u64 {
    5 * 60
}

fn default_slow_alert_count() -> i64 {
    10
}

fn default_error_rate_threshold() -> f64 {
    0.10
}

/// Threshold rule for one security event type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRule {
    pub event_type: SecurityEventType,
    pub threshold: u64,
    #[serde(default = "default_alert_window")]
    pub window_secs: u64,
}

impl AlertRule {
    pub fn new(event_type: SecurityEventType, threshold: u64, window_secs: u64) -> Self {
        Self {
            event_type,
            threshold,
            window_secs,
        }
    }
}

fn default_alert_window() -> u64 {
    DEFAULT_ALERT_WINDOW_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<AlertRule>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

/// The stock rule table.
///
/// `2fa-failed` deliberately has no entry: those events are stored and
/// audited but never escalate.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(SecurityEventType::FailedLogin, 5, 15 * 60),
        AlertRule::new(SecurityEventType::RateLimitExceeded, 10, 15 * 60),
        AlertRule::new(SecurityEventType::UnauthorizedAccess, 5, 15 * 60),
        AlertRule::new(SecurityEventType::SuspiciousActivity, 3, 60 * 60),
    ]
}

impl VigilConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: VigilConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let r = &self.retention;
        if r.stats_secs == 0 || r.events_secs == 0 || r.alert_secs == 0 {
            bail!("retention periods must be greater than zero");
        }

        let p = &self.performance;
        if !(p.error_rate_threshold > 0.0 && p.error_rate_threshold <= 1.0) {
            bail!(
                "performance.error_rate_threshold must be in (0, 1], got {}",
                p.error_rate_threshold
            );
        }
        if p.slow_window_secs == 0 || p.slow_alert_count < 1 {
            bail!("performance slow-request window and count must be positive");
        }

        let mut seen = HashSet::new();
        for rule in &self.alerts.rules {
            if rule.threshold == 0 {
                bail!("alert rule for {} has a zero threshold", rule.event_type);
            }
            if rule.window_secs == 0 {
                bail!("alert rule for {} has a zero window", rule.event_type);
            }
            if !seen.insert(rule.event_type) {
                bail!("duplicate alert rule for {}", rule.event_type);
            }
        }

        match self.store.backend {
            StoreBackend::Redb if self.store.path.is_none() => {
                bail!("store.path is required for the redb backend")
            }
            StoreBackend::Redis if self.store.url.is_none() => {
                bail!("store.url is required for the redis backend")
            }
            _ => {}
        }
        if self.store.sweep_interval_secs == 0 {
            bail!("store.sweep_interval_secs must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = VigilConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 9464);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.retention.stats_secs, 86_400);
        assert_eq!(config.retention.alert_secs, 3_600);
        assert_eq!(config.performance.slow_request_ms, 1000.0);
        assert_eq!(config.performance.slow_alert_count, 10);
        assert_eq!(config.alerts.rules, default_rules());
    }

    #[test]
    fn default_rules_skip_two_factor() {
        assert!(
            default_rules()
                .iter()
                .all(|r| r.event_type != SecurityEventType::TwoFactorFailed)
        );
    }

    #[test]
    fn parse_custom_rules() {
        let toml_str = r#"
[store]
backend = "redb"
path = "/tmp/vigil.redb"

[[alerts.rules]]
event_type = "failed-login"
threshold = 3

[[alerts.rules]]
event_type = "suspicious-activity"
threshold = 2
window_secs = 120
"#;
        let config = VigilConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redb);
        assert_eq!(config.alerts.rules.len(), 2);
        assert_eq!(config.alerts.rules[0].window_secs, DEFAULT_ALERT_WINDOW_SECS);
        assert_eq!(config.alerts.rules[1].window_secs, 120);
    }

    #[test]
    fn duplicate_rules_rejected() {
        let toml_str = r#"
[[alerts.rules]]
event_type = "failed-login"
threshold = 3

[[alerts.rules]]
event_type = "failed-login"
threshold = 4
"#;
        let err = VigilConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn backend_requirements_enforced() {
        let err = VigilConfig::from_toml_str("[store]\nbackend = \"redis\"\n").unwrap_err();
        assert!(err.to_string().contains("store.url"));

        let err = VigilConfig::from_toml_str("[store]\nbackend = \"redb\"\n").unwrap_err();
        assert!(err.to_string().contains("store.path"));
    }

    #[test]
    fn bad_error_rate_rejected() {
        let err =
            VigilConfig::from_toml_str("[performance]\nerror_rate_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("error_rate_threshold"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = VigilConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let back = VigilConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(back.alerts.rules, config.alerts.rules);
    }
}
