use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::observability::TENANTS_ACTIVE;

/// Manages per-venue engines. Each venue gets its own Engine + WAL + compactor.
/// Venue = database name from the pgwire connection, or the `{venue}` path segment over HTTP.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    clock: Arc<dyn Clock>,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            clock,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> io::Result<Arc<Engine>> {
        let name = sanitize(tenant)?;
        if let Some(engine) = self.engines.get(&name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many tenants"));
        }

        // The entry guard keeps a concurrent caller from opening the same WAL twice.
        let engine = match self.engines.entry(name.clone()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let wal_path = self.wal_path(&name);
                let engine = Arc::new(Engine::new(wal_path, self.clock.clone())?);
                tokio::spawn(compactor::run_compactor(
                    Arc::downgrade(&engine),
                    self.compact_threshold,
                ));
                slot.insert(engine.clone());
                engine
            }
        };

        tracing::info!("opened venue {name}");
        metrics::gauge!(TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    /// Engine for a venue that already exists, loaded or on disk. Never creates a WAL.
    pub fn open_existing(&self, tenant: &str) -> io::Result<Option<Arc<Engine>>> {
        let name = match sanitize(tenant) {
            Ok(name) => name,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => return Ok(None),
            Err(e) => return Err(e),
        };
        if let Some(engine) = self.engines.get(&name) {
            return Ok(Some(engine.value().clone()));
        }
        if !self.wal_path(&name).exists() {
            return Ok(None);
        }
        self.get_or_create(&name).map(Some)
    }

    fn wal_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.wal"))
    }
}

/// Strip everything but `[A-Za-z0-9_-]` so a tenant name can't escape the data dir.
fn sanitize(tenant: &str) -> io::Result<String> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "tenant name too long",
        ));
    }
    let safe_name: String = tenant
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe_name.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty tenant name",
        ));
    }
    Ok(safe_name)
}
