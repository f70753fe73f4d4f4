// # Fact Fetcher Trait
//
// Defines the interface for looking up the current security posture of a domain.
//
// ## Implementations
//
// - hickory-resolver + WHOIS over TCP: `domwatch-fetch` crate
// - Scripted fetchers in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use domwatch_core::FactFetcher;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let fetcher = /* FactFetcher implementation */;
//
//     let spf = fetcher.fetch_spf("example.com").await?;
//     let nameservers = fetcher.fetch_nameservers("example.com").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;

/// Normalized WHOIS facts (`creationDate`, `expirationDate`, `registrar`)
///
/// An empty map means the lookup produced nothing usable.
pub type WhoisFacts = BTreeMap<String, String>;

/// Trait for fact fetcher implementations
///
/// Every lookup is independent: a failure in one must not influence the
/// others, and the engine treats each error as "field unknown for this poll".
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the engine calls them from several
/// tasks at once.
///
/// ## Forbidden Capabilities
/// - ❌ Access the snapshot store (owned by `MonitorEngine`)
/// - ❌ Retry in a loop (a failed lookup is reported, the next run retries)
/// - ❌ Normalize record text (comparison is exact, callers see raw values)
#[async_trait]
pub trait FactFetcher: Send + Sync {
    /// Fetch the SPF record published at the domain apex
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The first TXT record starting with `v=spf1`
    /// - `Err(Error)`: Lookup failed or no SPF record exists
    async fn fetch_spf(&self, domain: &str) -> Result<String, crate::Error>;

    /// Fetch the DMARC record published at `_dmarc.<domain>`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The first TXT record starting with `v=DMARC1`
    /// - `Err(Error)`: Lookup failed or no DMARC record exists
    async fn fetch_dmarc(&self, domain: &str) -> Result<String, crate::Error>;

    /// Fetch the NS records of the domain, in answer order
    async fn fetch_nameservers(&self, domain: &str) -> Result<Vec<String>, crate::Error>;

    /// Fetch WHOIS dates and registrar
    ///
    /// Never fails: lookup errors are reported as an empty map.
    async fn fetch_whois_summary(&self, domain: &str) -> WhoisFacts;

    /// Get the fetcher name (for logging/debugging)
    fn fetcher_name(&self) -> &'static str;
}
