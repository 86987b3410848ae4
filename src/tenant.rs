use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::compactor;
use crate::engine::{Engine, EngineConfig};
use crate::limits::*;

/// One engine, WAL and compactor per tenant.
/// Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    engine_config: EngineConfig,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, engine_config: EngineConfig) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            engine_config,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        let safe_name = wal_file_stem(tenant).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty tenant name")
        })?;

        // Two racing connections for a new tenant must end up sharing one engine.
        let entry = self.engines.entry(tenant.to_string());
        if let Entry::Occupied(existing) = &entry {
            return Ok(existing.get().clone());
        }
        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path, self.engine_config)?);
        tokio::spawn(compactor::run_compactor(engine.clone(), self.compact_threshold));
        entry.or_insert(engine.clone());

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!("tenant {tenant} loaded");
        Ok(engine)
    }
}

/// Tenant name with everything but `[A-Za-z0-9_-]` stripped, so it cannot
/// escape the data directory.
fn wal_file_stem(tenant: &str) -> Option<String> {
    let stem: String = tenant
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!stem.is_empty()).then_some(stem)
}
