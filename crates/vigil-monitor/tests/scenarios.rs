//! End-to-end recorder scenarios over an in-memory store, with log output
//! captured by a recording tracing layer.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    Layer, Registry, layer::Context, layer::SubscriberExt, registry::LookupSpan,
};

use vigil_core::{AlertSubject, ManualClock, SecurityEventType, VigilConfig};
use vigil_monitor::{ClientInfo, Monitor, TracingAuditTrail};
use vigil_store::{CounterStore, MemoryStore, StoreError, StoreResult};

const START: u64 = 1_700_000_000_000;

// ── Log capture ────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct CapturedEvent {
    level: Level,
    target: String,
    fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn message(&self) -> &str {
        self.field("message").unwrap_or("")
    }
}

#[derive(Clone)]
struct RecordingLayer {
    events: Arc<StdMutex<Vec<CapturedEvent>>>,
}

struct FieldVisitor<'a> {
    fields: &'a mut HashMap<String, String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for RecordingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            fields: HashMap::new(),
        };
        event.record(&mut FieldVisitor {
            fields: &mut captured.fields,
        });
        if let Ok(mut events) = self.events.lock() {
            events.push(captured);
        }
    }
}

struct Logs(Arc<StdMutex<Vec<CapturedEvent>>>);

impl Logs {
    fn snapshot(&self) -> Vec<CapturedEvent> {
        self.0.lock().map(|events| events.to_vec()).unwrap_or_default()
    }

    fn at(&self, level: Level) -> Vec<CapturedEvent> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.level == level && e.target != "audit")
            .collect()
    }
}

// ── Fixtures ───────────────────────────────────────────────────────

struct Env {
    monitor: Monitor,
    clock: Arc<ManualClock>,
}

fn env_with_store(store: Arc<dyn CounterStore>, clock: Arc<ManualClock>) -> Env {
    let monitor = Monitor::new(
        &VigilConfig::default(),
        store,
        Arc::new(TracingAuditTrail),
        clock.clone(),
    );
    Env { monitor, clock }
}

fn env() -> Env {
    let clock = Arc::new(ManualClock::new(START));
    let store = MemoryStore::with_clock(clock.clone());
    env_with_store(Arc::new(store), clock)
}

/// A store that has gone away.
struct UnreachableStore;

fn refused() -> StoreError {
    StoreError::Backend("connection refused".into())
}

#[async_trait]
impl CounterStore for UnreachableStore {
    async fn set(&self, _: &str, _: &str, _: Duration) -> StoreResult<()> {
        Err(refused())
    }
    async fn get(&self, _: &str) -> StoreResult<Option<String>> {
        Err(refused())
    }
    async fn increment(&self, _: &str) -> StoreResult<i64> {
        Err(refused())
    }
    async fn scan_prefix(&self, _: &str) -> StoreResult<Vec<(String, String)>> {
        Err(refused())
    }
    async fn ping(&self) -> StoreResult<()> {
        Err(refused())
    }
}

fn capture() -> (Logs, tracing::subscriber::DefaultGuard) {
    let events = Arc::new(StdMutex::new(Vec::new()));
    let subscriber = Registry::default().with(RecordingLayer {
        events: events.clone(),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (Logs(events), guard)
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn fifth_failed_login_raises_alert() {
    let (logs, _guard) = capture();
    let env = env();
    let client = ClientInfo::ip("1.2.3.4");

    for _ in 0..4 {
        env.monitor.events().failed_login(&client, "bad password").await;
    }
    assert!(env.monitor.get_active_alerts().await.unwrap().is_empty());

    env.monitor.events().failed_login(&client, "bad password").await;
    let alerts = env.monitor.get_active_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.alert_type, SecurityEventType::FailedLogin);
    assert_eq!(alert.subject, "ip:1.2.3.4");
    assert_eq!(alert.count, 5);
    assert_eq!(
        alert.message,
        "5 failed login attempts within 15 minutes for ip:1.2.3.4"
    );

    let raised: Vec<_> = logs
        .at(Level::WARN)
        .into_iter()
        .filter(|e| e.field("component") == Some("alerts"))
        .collect();
    assert_eq!(raised.len(), 1);
    assert!(raised[0].message().contains("security alert raised"));
}

#[tokio::test]
async fn tenth_slow_request_logs_error_without_alert() {
    let (logs, _guard) = capture();
    let env = env();

    for _ in 0..9 {
        env.monitor
            .record_metric("GET", "/v1/posts", 1500.0, 200, None)
            .await;
    }
    assert!(logs.at(Level::ERROR).is_empty());

    env.monitor
        .record_metric("GET", "/v1/posts", 1500.0, 200, None)
        .await;
    let errors = logs.at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field("component"), Some("metrics"));
    assert!(
        errors[0]
            .message()
            .contains("10 slow requests in the last 5 minutes for GET /v1/posts"),
        "unexpected message: {}",
        errors[0].message()
    );
    assert!(env.monitor.get_active_alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn high_error_rate_logs_warning() {
    let (logs, _guard) = capture();
    let env = env();

    for _ in 0..9 {
        env.monitor.record_metric("POST", "/v1/orders", 20.0, 201, None).await;
    }
    assert!(logs.at(Level::WARN).is_empty());

    // 1 error in 10 is exactly the threshold, not above it.
    env.monitor.record_metric("POST", "/v1/orders", 20.0, 500, None).await;
    assert!(logs.at(Level::WARN).is_empty());

    env.monitor.record_metric("POST", "/v1/orders", 20.0, 503, None).await;
    let warnings = logs.at(Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message().contains("high error rate for POST /v1/orders"));
}

#[tokio::test]
async fn two_factor_failures_never_alert() {
    let env = env();
    let client = ClientInfo::user("42");
    for _ in 0..25 {
        env.monitor.events().two_factor_failed(&client, "totp").await;
    }
    assert!(env.monitor.get_active_alerts().await.unwrap().is_empty());
    assert_eq!(
        env.monitor
            .reader()
            .get_recent_events(100)
            .await
            .unwrap()
            .len(),
        25
    );
}

#[tokio::test]
async fn retrigger_keeps_first_occurrence() {
    let env = env();
    let client = ClientInfo::user("7");
    for _ in 0..3 {
        env.monitor
            .events()
            .suspicious_activity(&client, "/v1/export", "bulk download")
            .await;
    }
    let first = env.monitor.get_active_alerts().await.unwrap().remove(0);
    assert_eq!(first.subject, "user:7");
    assert_eq!(first.first_occurrence, START);

    env.clock.advance(Duration::from_secs(120));
    env.monitor
        .events()
        .suspicious_activity(&client, "/v1/export", "bulk download")
        .await;

    let alerts = env.monitor.get_active_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].count, 4);
    assert_eq!(alerts[0].first_occurrence, START);
    assert_eq!(alerts[0].last_occurrence, START + 120_000);
}

#[tokio::test]
async fn alert_expires_then_reraises_fresh() {
    let env = env();
    let client = ClientInfo::ip("8.8.8.8");
    for _ in 0..10 {
        env.monitor
            .events()
            .rate_limit_exceeded(&client, "/v1/search", 100)
            .await;
    }
    assert_eq!(env.monitor.get_active_alerts().await.unwrap().len(), 1);

    env.clock.advance(Duration::from_secs(3600));
    assert!(env.monitor.get_active_alerts().await.unwrap().is_empty());

    for _ in 0..10 {
        env.monitor
            .events()
            .rate_limit_exceeded(&client, "/v1/search", 100)
            .await;
    }
    let alerts = env.monitor.get_active_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].count, 10);
    assert_eq!(alerts[0].first_occurrence, START + 3_600_000);
}

#[tokio::test]
async fn identical_events_are_stored_separately() {
    let env = env();
    let client = ClientInfo::ip("1.2.3.4");
    env.monitor.events().failed_login(&client, "bad password").await;
    env.monitor.events().failed_login(&client, "bad password").await;

    let events = env.monitor.reader().get_recent_events(10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp, events[1].timestamp);

    let count = env
        .monitor
        .reader()
        .get_alert_counter(
            SecurityEventType::FailedLogin,
            &AlertSubject::Ip("1.2.3.4".into()),
        )
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn critical_events_logged_as_critical() {
    let (logs, _guard) = capture();
    let env = env();
    let event = vigil_core::SecurityEvent::new(
        SecurityEventType::UnauthorizedAccess,
        vigil_core::Severity::Critical,
        0,
    )
    .with_user("root")
    .with_endpoint("/admin/keys");
    env.monitor.record_event(event).await;

    let critical: Vec<_> = logs
        .at(Level::ERROR)
        .into_iter()
        .filter(|e| e.field("critical") == Some("true"))
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].field("component"), Some("security"));

    // The audit copy is emitted on its own target.
    assert!(
        logs.snapshot()
            .iter()
            .any(|e| e.target == "audit" && e.field("critical") == Some("true"))
    );
}

#[tokio::test]
async fn store_outage_never_reaches_callers() {
    let (logs, _guard) = capture();
    let clock = Arc::new(ManualClock::new(START));
    let env = env_with_store(Arc::new(UnreachableStore), clock);

    env.monitor
        .record_metric("GET", "/v1/posts", 2000.0, 500, Some("u1"))
        .await;
    env.monitor
        .events()
        .failed_login(&ClientInfo::ip("1.2.3.4"), "bad password")
        .await;

    let failures: Vec<_> = logs
        .at(Level::WARN)
        .into_iter()
        .filter(|e| e.message().contains("recording failed"))
        .collect();
    // metrics/record, security/persist, security/evaluate
    assert_eq!(failures.len(), 3);

    assert!(env.monitor.get_active_alerts().await.is_err());
    assert!(!env.monitor.reader().health().await.store_reachable);
}
