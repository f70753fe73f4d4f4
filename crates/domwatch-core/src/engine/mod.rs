//! Monitor engine
//!
//! The MonitorEngine is responsible for:
//! - Loading the active domains from the SnapshotStore
//! - Fetching fresh facts for each domain via the FactFetcher
//! - Writing the fetched facts back to the live table
//! - Detecting changes against the latest history row
//! - Appending history and dispatching change events
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ SnapshotStore │─── list_active ───┐
//! └───────────────┘                   │
//!                                     ▼
//!                            ┌───────────────┐
//!                            │ MonitorEngine │  (one task per domain,
//!                            └───────────────┘   bounded by a semaphore)
//!                                     │
//!         ┌───────────────────────────┼───────────────────────────┐
//!         │                           │                           │
//!         ▼                           ▼                           ▼
//! ┌─────────────┐           ┌───────────────┐          ┌────────────────────────┐
//! │ FactFetcher │           │ SnapshotStore │          │ NotificationDispatcher │
//! │ (fetch)     │           │ (write/append)│          │ (notify)               │
//! └─────────────┘           └───────────────┘          └────────────────────────┘
//! ```
//!
//! ## Per-Domain Flow
//!
//! 1. Fetch SPF, DMARC, nameservers and WHOIS concurrently, each under a timeout
//! 2. Write back nameservers, DMARC and SPF; WHOIS only when the lookup found data
//! 3. Load the latest history row and run the detector
//! 4. Append the snapshot to history when the detector asks for it
//! 5. After a successful append, dispatch every event in order
//!
//! A failure in one domain is recorded in the [`RunReport`] and never stops
//! the others.

use crate::config::{EngineConfig, FetchFailurePolicy};
use crate::detector::{Detection, detect_changes};
use crate::dispatcher::NotificationDispatcher;
use crate::error::{Error, Result};
use crate::model::{DomainSnapshot, SnapshotField, join_nameservers, summarize_whois};
use crate::traits::{FactFetcher, SnapshotStore};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Summary of one monitoring run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Domains whose pipeline ran to completion
    pub domains_checked: usize,
    /// Domains seen for the first time
    pub first_observations: usize,
    /// Domains whose monitored fields all matched history
    pub unchanged: usize,
    /// Domains with at least one changed field
    pub changed: usize,
    /// Change events handed to the dispatcher
    pub events_dispatched: usize,
    /// Subscriber deliveries that failed
    pub notification_failures: usize,
    /// Live-table writes that failed
    pub write_failures: usize,
    /// Domains that could not be processed, with the reason
    pub failed_domains: Vec<(String, String)>,
}

impl RunReport {
    /// Whether every domain completed without any store or delivery failure
    pub fn is_clean(&self) -> bool {
        self.failed_domains.is_empty()
            && self.write_failures == 0
            && self.notification_failures == 0
    }

    fn record(&mut self, name: String, outcome: DomainOutcome) {
        self.write_failures += outcome.write_failures;
        self.events_dispatched += outcome.events_dispatched;
        self.notification_failures += outcome.notification_failures;

        match outcome.result {
            Ok(Observation::First) => {
                self.domains_checked += 1;
                self.first_observations += 1;
            }
            Ok(Observation::Unchanged) => {
                self.domains_checked += 1;
                self.unchanged += 1;
            }
            Ok(Observation::Changed) => {
                self.domains_checked += 1;
                self.changed += 1;
            }
            Err(e) => self.failed_domains.push((name, e.to_string())),
        }
    }
}

/// Core monitor engine
///
/// The engine runs one finite batch per [`MonitorEngine::run_once`] call.
/// Scheduling (cron, systemd timer, a loop in the caller) is left to the
/// embedding program.
///
/// ## Lifecycle
///
/// 1. Create with [`MonitorEngine::new()`]
/// 2. Call [`MonitorEngine::run_once()`] as often as needed
/// 3. Drop to cleanup
///
/// ## Threading
///
/// Each domain is processed on its own task of a `JoinSet`. A semaphore caps
/// the number of domains in flight at `max_concurrency`. All tasks are
/// joined before `run_once` returns.
pub struct MonitorEngine {
    /// Shared per-domain pipeline
    pipeline: DomainPipeline,

    /// Maximum number of domains processed at the same time
    max_concurrency: usize,
}

impl MonitorEngine {
    /// Create a new monitor engine
    ///
    /// # Parameters
    ///
    /// - `fetcher`: Fact fetcher implementation
    /// - `store`: Snapshot store implementation
    /// - `dispatcher`: Dispatcher holding the registered subscribers
    /// - `config`: Engine configuration
    pub fn new(
        fetcher: Arc<dyn FactFetcher>,
        store: Arc<dyn SnapshotStore>,
        dispatcher: Arc<NotificationDispatcher>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pipeline: DomainPipeline {
                fetcher,
                store,
                dispatcher,
                fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
                policy: config.fetch_failure_policy,
            },
            max_concurrency: config.max_concurrency,
        })
    }

    /// Run one monitoring pass over every active domain
    ///
    /// # Returns
    ///
    /// - `Ok(RunReport)`: The run finished; per-domain failures are in the report
    /// - `Err(Error)`: The active domains could not be listed or the final flush failed
    pub async fn run_once(&self) -> Result<RunReport> {
        let domains = self.pipeline.store.list_active().await?;
        info!(
            "Starting run over {} active domains (fetcher: {}, subscribers: {})",
            domains.len(),
            self.pipeline.fetcher.fetcher_name(),
            self.pipeline.dispatcher.len()
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for listed in domains {
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("Worker pool closed: {}", e)))?;
            let pipeline = self.pipeline.clone();

            tasks.spawn(async move {
                let name = listed.name.clone();
                let outcome = pipeline.process(listed).await;
                drop(permit);
                (name, outcome)
            });
        }

        let mut report = RunReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, outcome)) => report.record(name, outcome),
                Err(e) => {
                    error!("Domain task aborted: {}", e);
                    report
                        .failed_domains
                        .push(("<task>".to_string(), e.to_string()));
                }
            }
        }

        self.pipeline.store.flush().await?;

        info!(
            "Run finished: {} checked, {} first, {} unchanged, {} changed, {} events, {} failed",
            report.domains_checked,
            report.first_observations,
            report.unchanged,
            report.changed,
            report.events_dispatched,
            report.failed_domains.len()
        );

        Ok(report)
    }
}

/// What the detector concluded for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    First,
    Unchanged,
    Changed,
}

/// Result of one domain's pipeline
#[derive(Debug)]
struct DomainOutcome {
    write_failures: usize,
    events_dispatched: usize,
    notification_failures: usize,
    result: Result<Observation>,
}

/// Everything a domain task needs, cheap to clone
#[derive(Clone)]
struct DomainPipeline {
    fetcher: Arc<dyn FactFetcher>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Arc<NotificationDispatcher>,
    fetch_timeout: Duration,
    policy: FetchFailurePolicy,
}

impl DomainPipeline {
    async fn process(&self, listed: DomainSnapshot) -> DomainOutcome {
        let name = listed.name.clone();
        let mut outcome = DomainOutcome {
            write_failures: 0,
            events_dispatched: 0,
            notification_failures: 0,
            result: Ok(Observation::Unchanged),
        };

        let (spf, dmarc, nameservers, whois) = tokio::join!(
            self.bounded(&name, "SPF", self.fetcher.fetch_spf(&name)),
            self.bounded(&name, "DMARC", self.fetcher.fetch_dmarc(&name)),
            self.bounded(&name, "nameservers", self.fetcher.fetch_nameservers(&name)),
            tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_whois_summary(&name)),
        );
        let nameservers = nameservers.map(|list| join_nameservers(&list));
        let whois = whois.unwrap_or_else(|_| {
            warn!("WHOIS lookup for {} timed out", name);
            Default::default()
        });

        let mut current = match self.store.get_current(&name).await {
            Ok(Some(stored)) => stored,
            Ok(None) => listed,
            Err(e) => {
                warn!("Failed to reload {}, using listed row: {}", name, e);
                listed
            }
        };
        current.last_check = Utc::now();

        for (field, fetched) in [
            (SnapshotField::Nameservers, nameservers),
            (SnapshotField::Dmarc, dmarc),
            (SnapshotField::Spf, spf),
        ] {
            let value = match (fetched, self.policy) {
                (Some(value), _) => value,
                (None, FetchFailurePolicy::Overwrite) => String::new(),
                (None, FetchFailurePolicy::KeepLastKnown) => {
                    debug!("Keeping last known {} for {}", field.column(), name);
                    continue;
                }
            };
            if !self.write_back(&name, field, &value).await {
                outcome.write_failures += 1;
            }
            field.apply(&mut current, &value);
        }

        if !whois.is_empty() {
            let summary = summarize_whois(&whois);
            if !self.write_back(&name, SnapshotField::Whois, &summary).await {
                outcome.write_failures += 1;
            }
            current.whois = summary;
        }

        let latest = match self.store.get_latest_history(&name).await {
            Ok(latest) => latest,
            Err(e) => {
                error!("Failed to load history for {}: {}", name, e);
                outcome.result = Err(e);
                return outcome;
            }
        };

        let detection = detect_changes(&current, latest.as_ref());
        debug!("{}: {}", name, detection.label());

        if detection.should_append_history() {
            if let Err(e) = self.store.append_history(&current).await {
                error!("Failed to append history for {}: {}", name, e);
                outcome.result = Err(e);
                return outcome;
            }
        }

        outcome.result = Ok(match detection {
            Detection::FirstObservation => {
                info!("First observation of {}", name);
                Observation::First
            }
            Detection::Unchanged => Observation::Unchanged,
            Detection::Changed(events) => {
                for event in &events {
                    info!(
                        "{} changed for {}: '{}' -> '{}'",
                        event.kind.label(),
                        name,
                        event.previous_value(),
                        event.current_value()
                    );
                    let delivery = self.dispatcher.dispatch(event).await;
                    outcome.events_dispatched += 1;
                    outcome.notification_failures += delivery.failed;
                }
                Observation::Changed
            }
        });

        outcome
    }

    /// Run a fetch under the configured timeout; failures become `None`
    async fn bounded<T>(
        &self,
        domain: &str,
        what: &str,
        fetch: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} lookup for {} failed: {}", what, domain, e);
                None
            }
            Err(_) => {
                warn!(
                    "{} lookup for {} timed out after {:?}",
                    what, domain, self.fetch_timeout
                );
                None
            }
        }
    }

    /// Write one live-table field; returns false on failure
    async fn write_back(&self, domain: &str, field: SnapshotField, value: &str) -> bool {
        match self.store.update_field(domain, field, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to update {} for {}: {}", field.column(), domain, e);
                false
            }
        }
    }
}
