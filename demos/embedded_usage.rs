//! Minimal embedding example for domwatch-core
//!
//! This example drives the engine from a custom application with an
//! in-memory store and a scripted fact source. Scheduling of runs is fully
//! managed by the application.

use domwatch_core::traits::{FactFetcher, Subscriber};
use domwatch_core::{
    ChangeEvent, DomainSnapshot, EngineConfig, Error, LogSubscriber, MemorySnapshotStore,
    MonitorEngine, NotificationDispatcher, Result, WhoisFacts,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Fact source whose answers the application controls
struct EmbeddedFetcher {
    spf: RwLock<String>,
}

impl EmbeddedFetcher {
    fn new(spf: &str) -> Self {
        Self {
            spf: RwLock::new(spf.to_string()),
        }
    }

    /// Simulate a DNS change (for testing)
    async fn publish_spf(&self, spf: &str) {
        *self.spf.write().await = spf.to_string();
    }
}

#[async_trait::async_trait]
impl FactFetcher for EmbeddedFetcher {
    async fn fetch_spf(&self, _domain: &str) -> Result<String> {
        Ok(self.spf.read().await.clone())
    }

    async fn fetch_dmarc(&self, _domain: &str) -> Result<String> {
        Ok("v=DMARC1; p=reject".to_string())
    }

    async fn fetch_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        if domain.ends_with(".test") {
            return Err(Error::fetch(format!("{} does not resolve", domain)));
        }
        Ok(vec![
            "ns1.example.net.".to_string(),
            "ns2.example.net.".to_string(),
        ])
    }

    async fn fetch_whois_summary(&self, _domain: &str) -> WhoisFacts {
        WhoisFacts::from([("registrar".to_string(), "Example Registrar".to_string())])
    }

    fn fetcher_name(&self) -> &'static str {
        "embedded"
    }
}

/// Subscriber that only counts deliveries
struct CountingSubscriber {
    delivered: AtomicUsize,
}

#[async_trait::async_trait]
impl Subscriber for CountingSubscriber {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        println!(
            "[Embedded] {} {:?} -> {:?}",
            event.domain(),
            event.previous_value(),
            event.current_value()
        );
        Ok(())
    }

    fn subscriber_name(&self) -> &'static str {
        "counting"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded domwatch-core Example ===\n");

    // Seed the store with the domains to watch
    let store = Arc::new(MemorySnapshotStore::new());
    store.insert_domain(DomainSnapshot::new("example.com")).await;
    store.insert_domain(DomainSnapshot::new("broken.test")).await;
    store
        .insert_domain(DomainSnapshot::new("retired.org").with_active(false))
        .await;

    let fetcher = Arc::new(EmbeddedFetcher::new("v=spf1 -all"));
    let counter = Arc::new(CountingSubscriber {
        delivered: AtomicUsize::new(0),
    });

    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(Arc::new(LogSubscriber));
    dispatcher.register(counter.clone());

    let engine = MonitorEngine::new(
        fetcher.clone(),
        store.clone(),
        dispatcher,
        EngineConfig::default(),
    )?;

    println!("1. First run records a baseline...");
    let report = engine.run_once().await?;
    println!(
        "   checked={} first_observations={} events={}\n",
        report.domains_checked, report.first_observations, report.events_dispatched
    );

    println!("2. Second run over unchanged facts...");
    let report = engine.run_once().await?;
    println!(
        "   unchanged={} events={}\n",
        report.unchanged, report.events_dispatched
    );

    println!("3. SPF record changes, third run reports it...");
    fetcher.publish_spf("v=spf1 include:_spf.example.net -all").await;
    let report = engine.run_once().await?;
    println!(
        "   changed={} events={}\n",
        report.changed, report.events_dispatched
    );

    println!(
        "History rows for example.com: {}",
        store.history_len("example.com").await
    );
    println!(
        "Events delivered to the counting subscriber: {}",
        counter.delivered.load(Ordering::SeqCst)
    );

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Runs are triggered by the application, not a scheduler");
    println!("- Inactive domains are never polled");
    println!("- A failed NS lookup is recorded as an empty value (Overwrite policy)");

    Ok(())
}
