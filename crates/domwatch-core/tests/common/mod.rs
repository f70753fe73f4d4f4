//! Test doubles and common utilities for contract tests
//!
//! This module provides scripted fetchers, recording subscribers and a
//! store wrapper with failure injection. Each test binary uses a different
//! subset, hence the dead_code allowance.

#![allow(dead_code)]

use async_trait::async_trait;
use domwatch_core::error::{Error, Result};
use domwatch_core::{
    ChangeEvent, DomainSnapshot, EngineConfig, FactFetcher, FetchFailurePolicy, MemorySnapshotStore,
    MonitorEngine, NotificationDispatcher, SnapshotField, SnapshotStore, Subscriber, WhoisFacts,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_SPF: &str = "v=spf1 include:_spf.google.com ~all";
pub const BASE_DMARC: &str = "v=DMARC1; p=quarantine; rua=mailto:dmarc@example.com";
pub const BASE_NS: [&str; 2] = ["ns1.example.net.", "ns2.example.net."];

/// Facts returned for one domain; `None` makes the lookup fail
#[derive(Debug, Clone, Default)]
pub struct DomainFacts {
    pub spf: Option<String>,
    pub dmarc: Option<String>,
    pub nameservers: Option<Vec<String>>,
    pub whois: WhoisFacts,
    /// Delay applied to the SPF lookup
    pub spf_delay: Option<Duration>,
}

impl DomainFacts {
    /// Facts matching [`baseline_snapshot`]
    pub fn baseline() -> Self {
        Self {
            spf: Some(BASE_SPF.to_string()),
            dmarc: Some(BASE_DMARC.to_string()),
            nameservers: Some(BASE_NS.iter().map(|ns| ns.to_string()).collect()),
            whois: WhoisFacts::new(),
            spf_delay: None,
        }
    }

    pub fn with_spf(mut self, spf: Option<&str>) -> Self {
        self.spf = spf.map(str::to_string);
        self
    }

    pub fn with_dmarc(mut self, dmarc: Option<&str>) -> Self {
        self.dmarc = dmarc.map(str::to_string);
        self
    }

    pub fn with_nameservers(mut self, nameservers: Option<&[&str]>) -> Self {
        self.nameservers = nameservers.map(|list| list.iter().map(|ns| ns.to_string()).collect());
        self
    }

    pub fn with_whois(mut self, key: &str, value: &str) -> Self {
        self.whois.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_spf_delay(mut self, delay: Duration) -> Self {
        self.spf_delay = Some(delay);
        self
    }
}

/// Snapshot matching [`DomainFacts::baseline`]
pub fn baseline_snapshot(name: &str) -> DomainSnapshot {
    DomainSnapshot::new(name)
        .with_spf(BASE_SPF)
        .with_dmarc(BASE_DMARC)
        .with_nameservers(&BASE_NS)
}

/// A FactFetcher answering from a per-domain script
#[derive(Default)]
pub struct ScriptedFetcher {
    facts: Mutex<HashMap<String, DomainFacts>>,
    /// Number of SPF lookups (one per processed domain)
    lookups: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the facts returned for a domain
    pub fn script(&self, domain: &str, facts: DomainFacts) {
        self.facts
            .lock()
            .unwrap()
            .insert(domain.to_string(), facts);
    }

    /// Number of domains looked up so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn facts_for(&self, domain: &str) -> DomainFacts {
        self.facts
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl FactFetcher for ScriptedFetcher {
    async fn fetch_spf(&self, domain: &str) -> Result<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let facts = self.facts_for(domain);
        if let Some(delay) = facts.spf_delay {
            tokio::time::sleep(delay).await;
        }
        facts
            .spf
            .ok_or_else(|| Error::fetch(format!("no SPF record for {}", domain)))
    }

    async fn fetch_dmarc(&self, domain: &str) -> Result<String> {
        self.facts_for(domain)
            .dmarc
            .ok_or_else(|| Error::fetch(format!("no DMARC record for {}", domain)))
    }

    async fn fetch_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        self.facts_for(domain)
            .nameservers
            .ok_or_else(|| Error::fetch(format!("NS lookup failed for {}", domain)))
    }

    async fn fetch_whois_summary(&self, domain: &str) -> WhoisFacts {
        self.facts_for(domain).whois
    }

    fn fetcher_name(&self) -> &'static str {
        "scripted"
    }
}

/// A Subscriber that records every event it receives
pub struct RecordingSubscriber {
    name: &'static str,
    events: Arc<Mutex<Vec<ChangeEvent>>>,
    /// Shared delivery log, to check ordering across subscribers
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingSubscriber {
    pub fn new(name: &'static str) -> Self {
        Self::with_order_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_order_log(name: &'static str, order: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            name,
            events: Arc::new(Mutex::new(Vec::new())),
            order,
        }
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        self.order.lock().unwrap().push(self.name);
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn subscriber_name(&self) -> &'static str {
        self.name
    }
}

/// A Subscriber that always fails
pub struct FailingSubscriber {
    calls: AtomicUsize,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl FailingSubscriber {
    pub fn new() -> Self {
        Self::with_order_log(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_order_log(order: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            order,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscriber for FailingSubscriber {
    async fn notify(&self, _event: &ChangeEvent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().unwrap().push("failing");
        Err(Error::subscriber("failing", "SMTP relay refused connection"))
    }

    fn subscriber_name(&self) -> &'static str {
        "failing"
    }
}

/// A SnapshotStore wrapper that can be told to fail specific operations
pub struct FailingStore {
    inner: MemorySnapshotStore,
    fail_list: AtomicBool,
    fail_updates: AtomicBool,
    fail_history_read: Mutex<HashSet<String>>,
    fail_history_append: Mutex<HashSet<String>>,
    append_calls: AtomicUsize,
}

impl FailingStore {
    pub fn wrapping(inner: MemorySnapshotStore) -> Self {
        Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_history_read: Mutex::new(HashSet::new()),
            fail_history_append: Mutex::new(HashSet::new()),
            append_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn fail_history_read_for(&self, domain: &str) {
        self.fail_history_read
            .lock()
            .unwrap()
            .insert(domain.to_string());
    }

    pub fn fail_history_append_for(&self, domain: &str) {
        self.fail_history_append
            .lock()
            .unwrap()
            .insert(domain.to_string());
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn list_active(&self) -> Result<Vec<DomainSnapshot>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::store("connection reset while listing domains"));
        }
        self.inner.list_active().await
    }

    async fn get_current(&self, domain: &str) -> Result<Option<DomainSnapshot>> {
        self.inner.get_current(domain).await
    }

    async fn get_latest_history(&self, domain: &str) -> Result<Option<DomainSnapshot>> {
        if self.fail_history_read.lock().unwrap().contains(domain) {
            return Err(Error::store(format!("history read failed for {}", domain)));
        }
        self.inner.get_latest_history(domain).await
    }

    async fn update_field(&self, domain: &str, field: SnapshotField, value: &str) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::store(format!(
                "update of {} failed for {}",
                field.column(),
                domain
            )));
        }
        self.inner.update_field(domain, field, value).await
    }

    async fn append_history(&self, snapshot: &DomainSnapshot) -> Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history_append.lock().unwrap().contains(&snapshot.name) {
            return Err(Error::store(format!(
                "history append failed for {}",
                snapshot.name
            )));
        }
        self.inner.append_history(snapshot).await
    }
}

/// Engine with default settings
pub fn engine(
    fetcher: Arc<dyn FactFetcher>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Arc<NotificationDispatcher>,
) -> MonitorEngine {
    MonitorEngine::new(fetcher, store, dispatcher, EngineConfig::default())
        .expect("engine construction succeeds")
}

/// Engine with a chosen failure policy and a one-second fetch timeout
pub fn engine_with_policy(
    fetcher: Arc<dyn FactFetcher>,
    store: Arc<dyn SnapshotStore>,
    dispatcher: Arc<NotificationDispatcher>,
    policy: FetchFailurePolicy,
) -> MonitorEngine {
    let config = EngineConfig {
        fetch_timeout_secs: 1,
        fetch_failure_policy: policy,
        ..EngineConfig::default()
    };
    MonitorEngine::new(fetcher, store, dispatcher, config).expect("engine construction succeeds")
}

/// Register a domain and, optionally, a history row with the same facts
pub async fn seed(store: &MemorySnapshotStore, snapshot: DomainSnapshot, with_history: bool) {
    if with_history {
        store
            .append_history(&snapshot)
            .await
            .expect("memory append succeeds");
    }
    store.insert_domain(snapshot).await;
}
