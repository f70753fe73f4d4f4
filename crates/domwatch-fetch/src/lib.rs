// # DNS/WHOIS Fact Fetcher
//
// This crate provides the production FactFetcher for domwatch.
//
// ## Trust Level: Trusted (Fact Source)
//
// **Allowed Capabilities**:
// - DNS queries to the configured recursive upstream
// - TCP connections to WHOIS servers on port 43
//
// **Forbidden Capabilities**:
// - Access the snapshot store
// - Cache answers across lookups
// - Retry beyond the resolver's own attempts
//
// ## Lookups
//
// | Fact        | Query                              | Failure          |
// |-------------|------------------------------------|------------------|
// | SPF         | TXT at the apex, `v=spf1` prefix   | `Err`            |
// | DMARC       | TXT at `_dmarc.<domain>`           | `Err`            |
// | Nameservers | NS at the apex, answer order       | `Err`            |
// | WHOIS       | IANA referral, then registry       | empty map        |

pub mod dns;
pub mod whois;

use async_trait::async_trait;
use domwatch_core::config::FetcherConfig;
use domwatch_core::traits::FactFetcher;
use domwatch_core::{Result, WhoisFacts};
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

pub use whois::{WhoisClient, WhoisParser};

/// Fact fetcher backed by hickory-resolver and a raw WHOIS client
pub struct HickoryFactFetcher {
    resolver: TokioAsyncResolver,
    whois: WhoisClient,
}

impl std::fmt::Debug for HickoryFactFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryFactFetcher")
            .field("whois", &self.whois)
            .finish_non_exhaustive()
    }
}

impl HickoryFactFetcher {
    /// Create a fetcher from configuration
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        config.validate()?;

        let timeout = Duration::from_secs(config.timeout_secs);
        tracing::debug!(
            "Using {:?} upstream, WHOIS referrals from {}",
            config.upstream,
            config.whois_server
        );

        Ok(Self {
            resolver: dns::build_resolver(config.upstream, timeout),
            whois: WhoisClient::new(config.whois_server.clone(), timeout)?,
        })
    }
}

#[async_trait]
impl FactFetcher for HickoryFactFetcher {
    async fn fetch_spf(&self, domain: &str) -> Result<String> {
        dns::lookup_spf(&self.resolver, domain).await
    }

    async fn fetch_dmarc(&self, domain: &str) -> Result<String> {
        dns::lookup_dmarc(&self.resolver, domain).await
    }

    async fn fetch_nameservers(&self, domain: &str) -> Result<Vec<String>> {
        dns::lookup_nameservers(&self.resolver, domain).await
    }

    async fn fetch_whois_summary(&self, domain: &str) -> WhoisFacts {
        match self.whois.lookup(domain).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!("WHOIS lookup for {} failed: {}", domain, e);
                WhoisFacts::new()
            }
        }
    }

    fn fetcher_name(&self) -> &'static str {
        "hickory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domwatch_core::config::DnsUpstream;

    #[tokio::test]
    async fn test_new_from_default_config() {
        let fetcher = HickoryFactFetcher::new(&FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.fetcher_name(), "hickory");
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = FetcherConfig {
            upstream: DnsUpstream::Quad9,
            timeout_secs: 0,
            whois_server: "whois.iana.org".to_string(),
        };
        assert!(HickoryFactFetcher::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_whois_failure_yields_empty_map() {
        let config = FetcherConfig {
            // Reserved TLD, never resolves
            whois_server: "whois.invalid".to_string(),
            timeout_secs: 2,
            ..FetcherConfig::default()
        };
        let fetcher = HickoryFactFetcher::new(&config).unwrap();

        assert!(fetcher.fetch_whois_summary("example.com").await.is_empty());
    }
}
