//! An in-memory [`StorageEngine`] implementation
//!
//! A [`HashMap`] wrapped by a [`Mutex`], nothing clever around performance.
//! This is the engine the mock transport and the test suites run against.
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::instrument;

use super::{Error, Result, StorageEngine};

type Store = HashMap<Bytes, Bytes>;

#[derive(Clone, Debug, Default)]
pub struct InMemory {
    inner: Arc<Mutex<Store>>,
}

impl InMemory {
    /// A failure to acquire the lock can only mean [`Mutex`] poisoning,
    /// which is reported as [`Error::Logic`]
    fn acquire_lock(&self) -> Result<MutexGuard<Store>> {
        match self.inner.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => Err(Error::Logic {
                reason: "Unable to acquire lock for InMemory storage engine - poisoned..."
                    .to_string(),
            }),
        }
    }
}

#[async_trait]
impl StorageEngine for InMemory {
    #[instrument(name = "storage::in_memory::get", level = "info", skip(self))]
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let guard = self.acquire_lock()?;
        Ok(guard.get(key).cloned())
    }

    #[instrument(name = "storage::in_memory::put", level = "info", skip(self))]
    async fn put(&self, key: Bytes, value: Bytes) -> Result<()> {
        let mut guard = self.acquire_lock()?;
        guard
            .entry(key)
            .and_modify(|e| *e = value.clone())
            .or_insert(value);
        Ok(())
    }

    #[instrument(name = "storage::in_memory::delete", level = "info", skip(self))]
    async fn delete(&self, key: &[u8]) -> Result<()> {
        let mut guard = self.acquire_lock()?;
        guard.remove(key);
        Ok(())
    }

    #[instrument(name = "storage::in_memory::keys", level = "info", skip(self))]
    async fn keys(&self) -> Result<Vec<Bytes>> {
        let guard = self.acquire_lock()?;
        Ok(guard.keys().cloned().collect())
    }
}
