// # domwatch-core
//
// Core library for domain security-posture monitoring.
//
// ## Architecture Overview
//
// This library provides the core functionality for watching a fleet of
// domains and reporting posture changes:
// - **FactFetcher**: Trait for looking up SPF, DMARC, nameservers and WHOIS
// - **SnapshotStore**: Trait for the live table and the append-only history
// - **Subscriber**: Trait for notification channels
// - **detect_changes**: Pure comparison of a fresh snapshot with history
// - **NotificationDispatcher**: Ordered fan-out of change events
// - **MonitorEngine**: Orchestrates one run over every active domain
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Batch Runs**: A run is finite; scheduling belongs to the caller
// 3. **Plugin-Based**: Fetchers, stores and subscribers are trait objects
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Append-Only History**: At most one history row per domain per run

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod model;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    DnsUpstream, EngineConfig, FetchFailurePolicy, FetcherConfig, NotifierConfig, SmtpConfig,
    StoreConfig, WatchConfig,
};
pub use detector::{Detection, detect_changes};
pub use dispatcher::{DispatchReport, LogSubscriber, NotificationDispatcher};
pub use engine::{MonitorEngine, RunReport};
pub use error::{Error, Result};
pub use model::{ChangeAction, ChangeEvent, DomainSnapshot, FieldKind, SnapshotField};
pub use state::{FileSnapshotStore, MemorySnapshotStore};
pub use traits::{FactFetcher, SnapshotStore, Subscriber, WhoisFacts};
