use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::limits::*;
use crate::notify::NotifyHub;
use crate::store::{EngineError, ReservationStore, ResourceDirectory};

/// Registry-wide settings. Explicit construction only — no process-wide
/// state. `from_env` exists for binaries that configure through the
/// environment.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub data_dir: PathBuf,
    /// WAL appends after which `compact_if_due` rewrites a catalog's log.
    pub compact_threshold: u64,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("RESERVA_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold: u64 = std::env::var("RESERVA_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
        }
    }
}

/// One catalog of bookable resources: spaces, books, … A catalog without a
/// directory trusts the caller's resource ids; one with a directory verifies
/// existence before every insert.
pub struct CatalogSpec {
    pub name: String,
    pub directory: Option<Arc<dyn ResourceDirectory>>,
}

impl CatalogSpec {
    /// Spaces-style catalog: resource ids are trusted.
    pub fn trusted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: None,
        }
    }

    /// Books-style catalog: resource existence is verified upstream.
    pub fn with_directory(name: &str, directory: Arc<dyn ResourceDirectory>) -> Self {
        Self {
            name: name.to_string(),
            directory: Some(directory),
        }
    }
}

/// A fixed in-memory resource directory. Useful as the collaborator in tests
/// and in embedders whose inventory is small and static.
pub struct MemoryDirectory {
    known: HashSet<String>,
}

impl MemoryDirectory {
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            known: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ResourceDirectory for MemoryDirectory {
    async fn resource_exists(&self, resource_id: &str) -> Result<bool, EngineError> {
        Ok(self.known.contains(resource_id))
    }
}

/// Manages per-catalog stores. Each catalog gets its own store + WAL file,
/// created lazily on first use.
pub struct StoreRegistry {
    stores: DashMap<String, Arc<ReservationStore>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl StoreRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            stores: DashMap::new(),
            data_dir: config.data_dir,
            compact_threshold: config.compact_threshold,
        }
    }

    /// Get or lazily create the store for the given catalog.
    pub fn get_or_create(&self, spec: CatalogSpec) -> std::io::Result<Arc<ReservationStore>> {
        if let Some(store) = self.stores.get(&spec.name) {
            return Ok(store.value().clone());
        }
        if spec.name.len() > MAX_CATALOG_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "catalog name too long",
            ));
        }
        if self.stores.len() >= MAX_CATALOGS {
            return Err(std::io::Error::other("too many catalogs"));
        }

        // Sanitize the catalog name to prevent path traversal
        let safe_name: String = spec
            .name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty catalog name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let store = Arc::new(ReservationStore::open(wal_path, notify, spec.directory)?);

        self.stores.insert(spec.name, store.clone());
        metrics::gauge!(crate::observability::STORES_ACTIVE).set(self.stores.len() as f64);
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ReservationStore>> {
        self.stores.get(name).map(|e| e.value().clone())
    }

    /// Compact a catalog's WAL once enough appends have accumulated. Invoked
    /// by the embedder at moments of its choosing — the engine runs no
    /// periodic tasks.
    pub async fn compact_if_due(&self, name: &str) -> Result<bool, EngineError> {
        let Some(store) = self.get(name) else {
            return Ok(false);
        };
        if store.wal_appends_since_compact().await < self.compact_threshold {
            return Ok(false);
        }
        store.compact_wal().await?;
        Ok(true)
    }
}
