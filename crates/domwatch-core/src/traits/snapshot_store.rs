// # Snapshot Store Trait
//
// Defines the interface for persistent snapshot management.
//
// ## Purpose
//
// The store keeps two views of every domain:
// - The live snapshot, overwritten on every poll
// - An append-only history, one row per observed change
//
// History rows are never updated. The latest row is the baseline the
// change detector compares against.
//
// ## Implementations
//
// - In-memory: `MemorySnapshotStore`
// - JSON file: `FileSnapshotStore`
// - PostgreSQL: `domwatch-store-postgres` crate
//
// ## Usage
//
// ```rust
// use domwatch_core::{MemorySnapshotStore, SnapshotField, SnapshotStore};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = MemorySnapshotStore::new();
//
//     for domain in store.list_active().await? {
//         store.update_field(&domain.name, SnapshotField::Spf, "v=spf1 ~all").await?;
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::model::{DomainSnapshot, SnapshotField};

/// Trait for snapshot store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Work on different domains must not serialize behind a long-held lock.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases)
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether a change happened (owned by the detector)
/// - ❌ Mutate or delete history rows
/// - ❌ Send notifications (owned by `NotificationDispatcher`)
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// List the live snapshots of all active domains
    async fn list_active(&self) -> Result<Vec<DomainSnapshot>, crate::Error>;

    /// Get the live snapshot of a domain
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainSnapshot))`: The live snapshot
    /// - `Ok(None)`: Domain is not registered
    /// - `Err(Error)`: Storage error
    async fn get_current(&self, domain: &str) -> Result<Option<DomainSnapshot>, crate::Error>;

    /// Get the most recent history row of a domain
    ///
    /// # Returns
    ///
    /// - `Ok(Some(DomainSnapshot))`: The latest history row
    /// - `Ok(None)`: The domain has never been recorded
    /// - `Err(Error)`: Storage error
    async fn get_latest_history(
        &self,
        domain: &str,
    ) -> Result<Option<DomainSnapshot>, crate::Error>;

    /// Overwrite one field of the live snapshot and stamp `last_check`
    ///
    /// Updating an unknown domain is not an error and changes nothing.
    async fn update_field(
        &self,
        domain: &str,
        field: SnapshotField,
        value: &str,
    ) -> Result<(), crate::Error>;

    /// Append a snapshot to the domain's history
    async fn append_history(&self, snapshot: &DomainSnapshot) -> Result<(), crate::Error>;

    /// Persist any pending changes
    ///
    /// Some implementations may buffer writes. This ensures
    /// all changes are flushed to persistent storage.
    async fn flush(&self) -> Result<(), crate::Error> {
        Ok(())
    }
}
