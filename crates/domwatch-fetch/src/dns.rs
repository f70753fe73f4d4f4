//! DNS lookups for SPF, DMARC and nameservers
//!
//! Record selection is split from I/O so it can be tested without a
//! resolver:
//! - [`extract_spf`]: first TXT record starting with `v=spf1`
//! - [`extract_dmarc`]: first TXT record starting with `v=DMARC1`

use domwatch_core::config::DnsUpstream;
use domwatch_core::{Error, Result};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::rdata::TXT;
use std::time::Duration;

const SPF_PREFIX: &str = "v=spf1";
const DMARC_PREFIX: &str = "v=DMARC1";

/// Build a resolver for the configured upstream
pub fn build_resolver(upstream: DnsUpstream, timeout: Duration) -> TokioAsyncResolver {
    let config = match upstream {
        DnsUpstream::Cloudflare => ResolverConfig::cloudflare(),
        DnsUpstream::Google => ResolverConfig::google(),
        DnsUpstream::Quad9 => ResolverConfig::quad9(),
    };

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 2;

    TokioAsyncResolver::tokio(config, opts)
}

/// Join the character-strings of one TXT record
///
/// Long records are split into 255-byte chunks on the wire; the chunks are
/// concatenated without a separator.
pub fn txt_to_string(txt: &TXT) -> String {
    txt.txt_data()
        .iter()
        .map(|chunk| String::from_utf8_lossy(chunk))
        .collect()
}

/// Pick the SPF record out of the apex TXT records
pub fn extract_spf<I, S>(records: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    first_with_prefix(records, SPF_PREFIX)
}

/// Pick the DMARC record out of the `_dmarc` TXT records
pub fn extract_dmarc<I, S>(records: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    first_with_prefix(records, DMARC_PREFIX)
}

fn first_with_prefix<I, S>(records: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    records
        .into_iter()
        .find(|record| record.as_ref().starts_with(prefix))
        .map(|record| record.as_ref().to_string())
}

/// All TXT records at `name`, one string per record
pub async fn lookup_txt(resolver: &TokioAsyncResolver, name: &str) -> Result<Vec<String>> {
    let lookup = resolver
        .txt_lookup(name)
        .await
        .map_err(|e| Error::fetch(format!("TXT lookup for {} failed: {}", name, e)))?;

    Ok(lookup.iter().map(txt_to_string).collect())
}

/// SPF record of `domain`
pub async fn lookup_spf(resolver: &TokioAsyncResolver, domain: &str) -> Result<String> {
    let records = lookup_txt(resolver, domain).await?;
    extract_spf(&records).ok_or_else(|| Error::not_found(format!("No SPF record for {}", domain)))
}

/// DMARC record of `domain`
pub async fn lookup_dmarc(resolver: &TokioAsyncResolver, domain: &str) -> Result<String> {
    let records = lookup_txt(resolver, &format!("_dmarc.{}", domain)).await?;
    extract_dmarc(&records)
        .ok_or_else(|| Error::not_found(format!("No DMARC record for {}", domain)))
}

/// Nameservers of `domain`, in answer order
pub async fn lookup_nameservers(
    resolver: &TokioAsyncResolver,
    domain: &str,
) -> Result<Vec<String>> {
    let lookup = resolver
        .ns_lookup(domain)
        .await
        .map_err(|e| Error::fetch(format!("NS lookup for {} failed: {}", domain, e)))?;

    Ok(lookup.iter().map(|ns| ns.0.to_utf8()).collect())
}
