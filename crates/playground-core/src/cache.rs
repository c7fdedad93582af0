//! Version-keyed cache of compiled compiler modules.
//!
//! [`ModuleCache`] turns a [`ModuleSource`] into a ready [`CompiledModule`]:
//!
//! 1. A resolved module for the version is returned without any I/O.
//! 2. Otherwise, if a resolution for the version is already running, the
//!    caller joins it instead of starting another fetch.
//! 3. Otherwise the bytes are fetched (directly, or out of a tarball), compiled
//!    on the blocking pool and stored.
//!
//! Failed resolutions are not remembered; the next request retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, instrument, warn};
use wasmtime::Engine;

use playground_common::{ArtifactConfig, ModuleError, ModuleSource};

use crate::CompiledModule;
use crate::archive::extract_entry;

/// Source of raw module and archive bytes.
///
/// Injected into the cache so tests and offline setups can serve bytes
/// without a network.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// Fetch the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ModuleError>;
}

type PendingModule = Shared<BoxFuture<'static, Result<Arc<CompiledModule>, ModuleError>>>;

#[derive(Debug, Default)]
struct Counters {
    fetches: AtomicU64,
    compiles: AtomicU64,
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Network (or fetcher) round trips made.
    pub fetches: u64,
    /// Module compilations started.
    pub compiles: u64,
    /// Versions currently resolved.
    pub resolved: usize,
}

/// Memoizing resolver from version to compiled module.
///
/// Created once per worker and never evicts: a session touches only a
/// handful of versions.
pub struct ModuleCache {
    engine: Engine,
    fetcher: Arc<dyn ModuleFetcher>,
    artifact: ArtifactConfig,
    resolved: DashMap<String, Arc<CompiledModule>>,
    in_flight: DashMap<String, PendingModule>,
    counters: Arc<Counters>,
}

impl ModuleCache {
    /// Create an empty cache.
    pub fn new(engine: Engine, fetcher: Arc<dyn ModuleFetcher>, artifact: ArtifactConfig) -> Self {
        Self {
            engine,
            fetcher,
            artifact,
            resolved: DashMap::new(),
            in_flight: DashMap::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Resolve a source to a compiled module.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Fetch`], [`ModuleError::Unpack`] or
    /// [`ModuleError::Compile`] depending on which step failed.
    #[instrument(skip(self, source), fields(version = %source.version()))]
    pub async fn resolve(&self, source: &ModuleSource) -> Result<Arc<CompiledModule>, ModuleError> {
        let version = source.version().to_string();

        if let Some(module) = self.get(&version) {
            debug!(
                age_secs = module.compiled_at().elapsed().as_secs(),
                "Module cache hit"
            );
            return Ok(module);
        }

        let pending = match self.in_flight.entry(version.clone()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight resolution");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A resolution may have settled between the first lookup and
                // taking the entry lock.
                if let Some(module) = self.get(&version) {
                    return Ok(module);
                }
                let pending = Self::load(
                    self.engine.clone(),
                    Arc::clone(&self.fetcher),
                    self.artifact.clone(),
                    Arc::clone(&self.counters),
                    source.clone(),
                )
                .boxed()
                .shared();
                entry.insert(pending.clone());
                pending
            }
        };

        let result = pending.clone().await;

        match &result {
            Ok(module) => {
                self.resolved.insert(version.clone(), Arc::clone(module));
            }
            Err(e) => warn!(error = %e, "Module resolution failed"),
        }
        self.in_flight
            .remove_if(&version, |_, current| current.ptr_eq(&pending));

        result
    }

    /// Fetch, unpack if needed, and compile.
    async fn load(
        engine: Engine,
        fetcher: Arc<dyn ModuleFetcher>,
        artifact: ArtifactConfig,
        counters: Arc<Counters>,
        source: ModuleSource,
    ) -> Result<Arc<CompiledModule>, ModuleError> {
        let version = source.version().to_string();

        let bytes = match source {
            ModuleSource::DirectUrl(version) => {
                let url = artifact.direct_url(&version);
                info!(url = %url, "Fetching module");
                counters.fetches.fetch_add(1, Ordering::Relaxed);
                fetcher.fetch(&url).await?
            }
            ModuleSource::Manifest(manifest) => {
                info!(tarball = %manifest.tarball, "Fetching module archive");
                counters.fetches.fetch_add(1, Ordering::Relaxed);
                let archive = fetcher.fetch(&manifest.tarball).await?;
                let filename = artifact.module_filename;
                let tarball = manifest.tarball;
                let location = tarball.clone();
                tokio::task::spawn_blocking(move || extract_entry(&archive, &tarball, &filename))
                    .await
                    .map_err(|e| ModuleError::unpack(location, format!("unpack task failed: {e}")))??
            }
        };

        counters.compiles.fetch_add(1, Ordering::Relaxed);
        let module = tokio::task::spawn_blocking(move || {
            CompiledModule::from_bytes(&engine, &version, &bytes)
        })
        .await
        .map_err(|e| ModuleError::compile(format!("compile task failed: {e}")))??;

        Ok(Arc::new(module))
    }

    /// A resolved module, if any, without triggering resolution.
    pub fn get(&self, version: &str) -> Option<Arc<CompiledModule>> {
        self.resolved.get(version).map(|m| Arc::clone(m.value()))
    }

    /// Returns `true` if the version is resolved.
    pub fn contains(&self, version: &str) -> bool {
        self.resolved.contains_key(version)
    }

    /// Store an already compiled module under its version.
    pub fn insert(&self, module: CompiledModule) -> Arc<CompiledModule> {
        let module = Arc::new(module);
        self.resolved
            .insert(module.version().to_string(), Arc::clone(&module));
        module
    }

    /// Resolved versions.
    pub fn versions(&self) -> Vec<String> {
        self.resolved.iter().map(|r| r.key().clone()).collect()
    }

    /// Activity counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            compiles: self.counters.compiles.load(Ordering::Relaxed),
            resolved: self.resolved.len(),
        }
    }

    /// The Wasmtime engine modules are compiled for.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("resolved", &self.resolved.len())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}
