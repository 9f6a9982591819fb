//! Async front for a `CacheEngine`.
//!
//! Engine calls block on the remote store, so they run on tokio's blocking pool.
//! A semaphore caps how many of them are in flight at once; callers past the cap
//! wait for a permit instead of spawning more blocking tasks.

use crate::engine::CacheEngine;
use crate::errors::CacheError;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

#[derive(Clone)]
pub struct AsyncCache {
    engine: Arc<CacheEngine>,
    permits: Arc<Semaphore>,
}

impl AsyncCache {
    pub fn new(engine: Arc<CacheEngine>, max_in_flight: usize) -> Self {
        Self { engine, permits: Arc::new(Semaphore::new(max_in_flight.max(1))) }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    /// Permits not currently held by a running call.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&CacheEngine) -> Result<T, CacheError> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| CacheError::WorkerPool(e.to_string()))?;
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(&engine)
        })
        .await
        .map_err(|e| CacheError::WorkerPool(e.to_string()))?
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let key = key.to_string();
        self.run(move |e| e.get(&key)).await
    }

    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let key = key.to_string();
        self.run(move |e| e.put(&key, value)).await
    }

    pub async fn evict(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        self.run(move |e| e.evict(&key)).await
    }

    /// The loader runs on the blocking pool together with the lookup.
    pub async fn get_or_load<F, E>(&self, key: &str, loader: F) -> Result<Vec<u8>, CacheError>
    where
        F: FnOnce() -> Result<Vec<u8>, E> + Send + 'static,
        E: Display,
    {
        let key = key.to_string();
        self.run(move |e| e.get_or_load(&key, loader)).await
    }
}
