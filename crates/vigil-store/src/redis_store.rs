//! RedisStore, the shared store used when several processes record into
//! the same counters.
//!
//! Maps the trait onto native commands: `SET EX`, `GET`, `INCR`, `SCAN` and
//! `PING`. Redis expires keys itself, so `purge_expired` is a no-op. An
//! optional namespace is prepended to every key and stripped from scan
//! results.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::CounterStore;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("conn", &"<ConnectionManager>")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl RedisStore {
    /// Connect to `url`; `namespace` may be empty.
    pub async fn connect(url: &str, namespace: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Open(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;
        info!(namespace, "redis counter store connected");
        Ok(Self {
            conn,
            namespace: namespace.to_string(),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    fn full_key(&self, key: &str) -> String {
        namespaced(&self.namespace, key)
    }
}

fn namespaced(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{namespace}:{key}")
    }
}

fn strip_namespace<'a>(namespace: &str, key: &'a str) -> &'a str {
    if namespace.is_empty() {
        return key;
    }
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(key)
}

/// Escape glob metacharacters so a literal prefix can be used with `MATCH`.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn backend_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        // EX has second granularity; never round a live TTL down to zero.
        let secs = ttl.as_secs().max(1);
        let _: () = self
            .conn()
            .set_ex(self.full_key(key), value, secs)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = self
            .conn()
            .get(self.full_key(key))
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let result: Result<i64, redis::RedisError> =
            self.conn().incr(self.full_key(key), 1i64).await;
        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == redis::ErrorKind::TypeError
                || e.to_string().contains("not an integer") =>
            {
                Err(StoreError::NotInteger(key.to_string()))
            }
            Err(e) => Err(backend_err(e)),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let pattern = format!("{}*", escape_glob(&self.full_key(prefix)));
        let mut conn = self.conn();
        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend_err)?;
            keys.extend(batch);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may return duplicates and makes no ordering promise.
        keys.sort();
        keys.dedup();

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            // Keys can expire between SCAN and GET.
            let value: Option<String> = conn.get(&key).await.map_err(backend_err)?;
            if let Some(value) = value {
                results.push((strip_namespace(&self.namespace, &key).to_string(), value));
            }
        }
        debug!(prefix, found = results.len(), "redis prefix scan");
        Ok(results)
    }

    async fn ping(&self) -> StoreResult<()> {
        let pong: String = redis::cmd("PING")
            .query_async(&mut self.conn())
            .await
            .map_err(backend_err)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("unexpected PING reply: {pong}")))
        }
    }
}
