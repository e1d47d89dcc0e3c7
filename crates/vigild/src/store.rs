//! Counter store selection.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;

use vigil_core::Clock;
use vigil_core::config::{StoreBackend, StoreConfig};
use vigil_store::{CounterStore, MemoryStore, RedbStore, RedisStore};

/// Open the backend named in `config`.
pub async fn open_store(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory counter store; data is lost on restart");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
        StoreBackend::Redb => {
            let Some(path) = config.path.as_deref() else {
                bail!("store.path is required for the redb backend");
            };
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let store = RedbStore::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?
                .with_clock(clock);
            Ok(Arc::new(store))
        }
        StoreBackend::Redis => {
            let Some(url) = config.url.as_deref() else {
                bail!("store.url is required for the redis backend");
            };
            let store = RedisStore::connect(url, &config.namespace)
                .await
                .context("failed to connect to redis")?;
            Ok(Arc::new(store))
        }
    }
}
