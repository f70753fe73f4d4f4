//! Core traits for domwatch
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`FactFetcher`]: Look up the current DNS and WHOIS facts of a domain
//! - [`SnapshotStore`]: Persist live snapshots and append-only history
//! - [`Subscriber`]: React to a detected change

pub mod fact_fetcher;
pub mod snapshot_store;
pub mod subscriber;

pub use fact_fetcher::{FactFetcher, WhoisFacts};
pub use snapshot_store::SnapshotStore;
pub use subscriber::Subscriber;
