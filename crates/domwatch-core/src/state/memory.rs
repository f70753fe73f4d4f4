// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for embedding the engine where the caller owns
// persistence.
//
// ## Crash Behavior
//
// - All snapshots and history are lost on restart
// - The first run after a restart treats every domain as a first observation

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{DomainSnapshot, SnapshotField};
use crate::traits::SnapshotStore;

#[derive(Debug, Default)]
struct Tables {
    current: HashMap<String, DomainSnapshot>,
    history: HashMap<String, Vec<DomainSnapshot>>,
}

/// In-memory snapshot store implementation
///
/// Live snapshots and history are kept in HashMaps behind a RwLock. Clones
/// share the same tables.
///
/// # Example
///
/// ```rust,no_run
/// use domwatch_core::{DomainSnapshot, MemorySnapshotStore, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySnapshotStore::new();
///     store.insert_domain(DomainSnapshot::new("example.com")).await;
///
///     let active = store.list_active().await?;
///     assert_eq!(active.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<Tables>>,
}

impl MemorySnapshotStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a domain, replacing any live snapshot with the same name
    pub async fn insert_domain(&self, snapshot: DomainSnapshot) {
        let mut guard = self.inner.write().await;
        guard.current.insert(snapshot.name.clone(), snapshot);
    }

    /// Full history of a domain, oldest first
    pub async fn history(&self, domain: &str) -> Vec<DomainSnapshot> {
        let guard = self.inner.read().await;
        guard.history.get(domain).cloned().unwrap_or_default()
    }

    /// Number of history rows recorded for a domain
    pub async fn history_len(&self, domain: &str) -> usize {
        let guard = self.inner.read().await;
        guard.history.get(domain).map_or(0, Vec::len)
    }

    /// Get the number of registered domains
    pub async fn len(&self) -> usize {
        self.inner.read().await.current.len()
    }

    /// Check if no domain is registered
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.current.is_empty()
    }

    /// Clear all domains and history
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        guard.current.clear();
        guard.history.clear();
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn list_active(&self) -> Result<Vec<DomainSnapshot>, Error> {
        let guard = self.inner.read().await;
        let mut active: Vec<DomainSnapshot> = guard
            .current
            .values()
            .filter(|snapshot| snapshot.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(active)
    }

    async fn get_current(&self, domain: &str) -> Result<Option<DomainSnapshot>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.current.get(domain).cloned())
    }

    async fn get_latest_history(&self, domain: &str) -> Result<Option<DomainSnapshot>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .history
            .get(domain)
            .and_then(|rows| rows.last())
            .cloned())
    }

    async fn update_field(
        &self,
        domain: &str,
        field: SnapshotField,
        value: &str,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if let Some(snapshot) = guard.current.get_mut(domain) {
            field.apply(snapshot, value);
            snapshot.last_check = Utc::now();
        }
        Ok(())
    }

    async fn append_history(&self, snapshot: &DomainSnapshot) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .history
            .entry(snapshot.name.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemorySnapshotStore::new();

        // Initially empty
        assert!(store.is_empty().await);
        assert!(store.get_current("example.com").await.unwrap().is_none());

        store.insert_domain(DomainSnapshot::new("example.com")).await;
        assert_eq!(store.len().await, 1);

        store
            .update_field("example.com", SnapshotField::Spf, "v=spf1 ~all")
            .await
            .unwrap();

        let current = store.get_current("example.com").await.unwrap().unwrap();
        assert_eq!(current.spf, "v=spf1 ~all");
    }

    #[tokio::test]
    async fn test_update_unknown_domain_is_noop() {
        let store = MemorySnapshotStore::new();
        store
            .update_field("missing.com", SnapshotField::Dmarc, "v=DMARC1")
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive() {
        let store = MemorySnapshotStore::new();
        store.insert_domain(DomainSnapshot::new("b.com")).await;
        store.insert_domain(DomainSnapshot::new("a.com")).await;
        store
            .insert_domain(DomainSnapshot::new("off.com").with_active(false))
            .await;

        let names: Vec<String> = store
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|snapshot| snapshot.name)
            .collect();

        assert_eq!(names, vec!["a.com", "b.com"]);
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let store = MemorySnapshotStore::new();
        let first = DomainSnapshot::new("example.com").with_spf("v=spf1 ~all");
        let second = first.clone().with_spf("v=spf1 -all");

        store.append_history(&first).await.unwrap();
        store.append_history(&second).await.unwrap();

        assert_eq!(store.history_len("example.com").await, 2);
        let latest = store.get_latest_history("example.com").await.unwrap();
        assert_eq!(latest, Some(second));
        assert_eq!(store.history("example.com").await[0], first);
    }
}
