//! Named reader/writer locks guarding report directories.
//!
//! Readers (this service) take a report kind's lock in shared mode for as long
//! as a file is being streamed. Producers that generate or delete report
//! content must take the same lock in exclusive mode, so readers never see a
//! half written or half deleted report.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kernel::ReportKind;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::ServeError;

/// Identifies one lock: all reports of one kind produced by one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub build_id: i64,
    pub kind: ReportKind,
}

impl LockKey {
    #[must_use]
    pub const fn new(build_id: i64, kind: ReportKind) -> Self {
        Self { build_id, kind }
    }
}

/// Registry of per-key reader/writer locks.
///
/// Locks are created on first use and kept for the lifetime of the
/// coordinator. `tokio::sync::RwLock` queues waiters in FIFO order, so a
/// pending writer is not starved by readers arriving after it.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    locks: DashMap<LockKey, Arc<RwLock<()>>>,
}

/// Shared hold on a report lock, released on drop.
#[derive(Debug)]
pub struct SharedGuard {
    key: LockKey,
    _guard: OwnedRwLockReadGuard<()>,
}

/// Exclusive hold on a report lock, released on drop.
#[derive(Debug)]
pub struct ExclusiveGuard {
    key: LockKey,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl SharedGuard {
    #[must_use]
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl ExclusiveGuard {
    #[must_use]
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl LockCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: LockKey) -> Arc<RwLock<()>> {
        if let Some(lock) = self.locks.get(&key) {
            return Arc::clone(lock.value());
        }
        // entry() holds the shard write lock, so racing first users get the same lock
        Arc::clone(self.locks.entry(key).or_default().value())
    }

    pub async fn acquire_shared(&self, key: LockKey) -> SharedGuard {
        let guard = self.lock_for(key).read_owned().await;
        tracing::trace!("shared lock acquired: {key:?}");
        SharedGuard { key, _guard: guard }
    }

    pub async fn acquire_exclusive(&self, key: LockKey) -> ExclusiveGuard {
        let guard = self.lock_for(key).write_owned().await;
        tracing::trace!("exclusive lock acquired: {key:?}");
        ExclusiveGuard { key, _guard: guard }
    }

    /// Like [`acquire_shared`](Self::acquire_shared) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`ServeError::LockTimeout`] when the lock was not granted in time.
    pub async fn acquire_shared_timeout(
        &self,
        key: LockKey,
        timeout: Duration,
    ) -> Result<SharedGuard, ServeError> {
        tokio::time::timeout(timeout, self.acquire_shared(key))
            .await
            .map_err(|_| {
                tracing::warn!("shared lock wait timed out after {timeout:?}: {key:?}");
                ServeError::LockTimeout
            })
    }

    /// Like [`acquire_exclusive`](Self::acquire_exclusive) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`ServeError::LockTimeout`] when the lock was not granted in time.
    pub async fn acquire_exclusive_timeout(
        &self,
        key: LockKey,
        timeout: Duration,
    ) -> Result<ExclusiveGuard, ServeError> {
        tokio::time::timeout(timeout, self.acquire_exclusive(key))
            .await
            .map_err(|_| {
                tracing::warn!("exclusive lock wait timed out after {timeout:?}: {key:?}");
                ServeError::LockTimeout
            })
    }

    /// Shared acquisition with an optional bound; `None` waits forever.
    ///
    /// # Errors
    ///
    /// [`ServeError::LockTimeout`] when a bound was given and it elapsed.
    pub async fn acquire_shared_within(
        &self,
        key: LockKey,
        timeout: Option<Duration>,
    ) -> Result<SharedGuard, ServeError> {
        match timeout {
            Some(timeout) => self.acquire_shared_timeout(key, timeout).await,
            None => Ok(self.acquire_shared(key).await),
        }
    }

    /// Number of keys ever locked through this coordinator.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
