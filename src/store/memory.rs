//! In-memory record store implementation using DashMap.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::error::{RelayError, Result};

use super::traits::{
    RecordStore, StoreConnection, StoreParams, DEFAULT_CONNECT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT,
};

/// One accepted procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Procedure invoked
    pub procedure: String,
    /// Parameters passed
    pub params: StoreParams,
}

struct Inner {
    name: String,
    procedure: String,
    connect_timeout: Duration,
    operation_timeout: Duration,

    /// Accepted calls: sequence -> call
    calls: DashMap<u64, RecordedCall>,
    sequence: AtomicU64,

    reachable: AtomicBool,
    reject_writes: AtomicBool,
    latency_nanos: AtomicU64,

    connects: AtomicUsize,
    releases: AtomicUsize,
}

/// In-process record store using DashMap for concurrent access.
///
/// Clones share state, so a test can keep a handle while the cascade owns
/// another. Reachability and write rejection can be switched at runtime.
///
/// # Example
///
/// ```rust
/// use tagrelay::store::MemoryStore;
///
/// let store = MemoryStore::new("local");
/// store.set_reachable(false);
/// assert!(store.calls().is_empty());
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create a reachable store with the default procedure name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(
            name,
            "insert_tag_reading",
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_OPERATION_TIMEOUT,
        )
    }

    /// Create a store with explicit procedure and timeouts.
    pub fn with_settings(
        name: impl Into<String>,
        procedure: impl Into<String>,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                procedure: procedure.into(),
                connect_timeout,
                operation_timeout,
                calls: DashMap::new(),
                sequence: AtomicU64::new(0),
                reachable: AtomicBool::new(true),
                reject_writes: AtomicBool::new(false),
                latency_nanos: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }),
        }
    }

    /// Make `connect` succeed or fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `call` reject every write.
    pub fn set_reject_writes(&self, reject: bool) {
        self.inner.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_nanos
            .store(u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Accepted calls in the order they were made.
    pub fn calls(&self) -> Vec<RecordedCall> {
        let mut entries: Vec<(u64, RecordedCall)> = self
            .inner
            .calls
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, call)| call).collect()
    }

    /// Number of connections opened (probes included).
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of connections released, by close or drop.
    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn procedure(&self) -> &str {
        &self.inner.procedure
    }

    fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    fn operation_timeout(&self) -> Duration {
        self.inner.operation_timeout
    }

    async fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(RelayError::connection(&self.inner.name, "connection refused"));
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
            open: true,
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
    open: bool,
}

impl MemoryConnection {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn call(&mut self, procedure: &str, params: &StoreParams) -> Result<()> {
        if !self.open {
            return Err(RelayError::connection(&self.inner.name, "connection closed"));
        }

        let latency = self.inner.latency_nanos.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_nanos(latency)).await;
        }

        if self.inner.reject_writes.load(Ordering::SeqCst) {
            return Err(RelayError::write(
                &self.inner.name,
                format!("procedure {} rejected the record", procedure),
            ));
        }

        let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        self.inner.calls.insert(
            seq,
            RecordedCall {
                procedure: procedure.to_string(),
                params: params.clone(),
            },
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
