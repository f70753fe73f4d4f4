//! WHOIS client (RFC 3912)
//!
//! A lookup takes two queries on TCP port 43:
//! 1. Ask the referral server (`whois.iana.org` by default) about the TLD
//!    and read its `refer:` line
//! 2. Ask the referred registry server about the domain
//!
//! The registry answer is reduced to three facts by [`WhoisParser`]:
//! `creationDate`, `expirationDate` and `registrar`.

use domwatch_core::{Error, Result, WhoisFacts};
use regex::Regex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Well-known WHOIS port
const WHOIS_PORT: u16 = 43;

/// Largest response accepted from a server
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// Extracts the monitored facts from a WHOIS response
#[derive(Debug, Clone)]
pub struct WhoisParser {
    creation: Regex,
    /// Expiration patterns, tried in order
    expiration: Vec<Regex>,
    registrar: Regex,
}

impl WhoisParser {
    /// Compile the patterns
    pub fn new() -> Result<Self> {
        Ok(Self {
            creation: compile(r"Creation Date:[ \t]*(.*)")?,
            expiration: vec![
                compile(r"Registry Expiry Date:[ \t]*(.*)")?,
                compile(r"Registrar Registration Expiration Date:[ \t]*(.*)")?,
                compile(r"Expiration Date:[ \t]*(.*)")?,
            ],
            registrar: compile(r"Registrar:[ \t]*(.*)")?,
        })
    }

    /// Parse a registry response
    ///
    /// Keys are only present when a value was found. Values are trimmed.
    pub fn parse(&self, response: &str) -> WhoisFacts {
        let mut facts = WhoisFacts::new();

        if let Some(value) = first_capture(&self.creation, response) {
            facts.insert("creationDate".to_string(), value);
        }
        if let Some(value) = self
            .expiration
            .iter()
            .find_map(|pattern| first_capture(pattern, response))
        {
            facts.insert("expirationDate".to_string(), value);
        }
        if let Some(value) = first_capture(&self.registrar, response) {
            facts.insert("registrar".to_string(), value);
        }

        facts
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::config(format!("Invalid WHOIS pattern: {}", e)))
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Registry server named by a referral response
pub fn referral(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("refer") && !value.is_empty()).then(|| value.to_string())
    })
}

/// WHOIS client with IANA-style referral
#[derive(Debug, Clone)]
pub struct WhoisClient {
    referral_server: String,
    timeout: Duration,
    parser: WhoisParser,
}

impl WhoisClient {
    /// Create a client that starts every lookup at `referral_server`
    pub fn new(referral_server: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            referral_server: referral_server.into(),
            timeout,
            parser: WhoisParser::new()?,
        })
    }

    /// Look up a domain and return its parsed facts
    pub async fn lookup(&self, domain: &str) -> Result<WhoisFacts> {
        let tld = domain
            .trim_end_matches('.')
            .rsplit('.')
            .next()
            .filter(|tld| !tld.is_empty())
            .ok_or_else(|| Error::invalid_input(format!("Invalid domain name: {}", domain)))?;

        let iana = self.query(&self.referral_server, tld).await?;
        let registry = referral(&iana)
            .ok_or_else(|| Error::not_found(format!("No WHOIS referral for .{}", tld)))?;

        tracing::debug!("WHOIS for {} referred to {}", domain, registry);

        let response = self.query(&registry, domain).await?;
        Ok(self.parser.parse(&response))
    }

    /// Send one query and read the whole answer
    async fn query(&self, server: &str, query: &str) -> Result<String> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, WHOIS_PORT)).await?;
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;

            let mut response = Vec::new();
            (&mut stream)
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut response)
                .await?;
            Ok::<_, std::io::Error>(response)
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::timeout(format!("WHOIS query to {}", server)))?
            .map_err(|e| Error::fetch(format!("WHOIS query to {} failed: {}", server, e)))?;

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERISIGN_SAMPLE: &str = "   Domain Name: EXAMPLE.COM\r\n\
   Registry Domain ID: 2336799_DOMAIN_COM-VRSN\r\n\
   Registrar WHOIS Server: whois.iana.org\r\n\
   Updated Date: 2024-08-14T07:01:34Z\r\n\
   Creation Date: 1995-08-14T04:00:00Z \r\n\
   Registry Expiry Date: 2025-08-13T04:00:00Z\r\n\
   Registrar: RESERVED-Internet Assigned Numbers Authority\r\n\
   Registrar IANA ID: 376\r\n";

    #[test]
    fn test_parse_registry_response() {
        let facts = WhoisParser::new().unwrap().parse(VERISIGN_SAMPLE);

        assert_eq!(facts["creationDate"], "1995-08-14T04:00:00Z");
        assert_eq!(facts["expirationDate"], "2025-08-13T04:00:00Z");
        assert_eq!(
            facts["registrar"],
            "RESERVED-Internet Assigned Numbers Authority"
        );
    }

    #[test]
    fn test_expiration_fallback_order() {
        let parser = WhoisParser::new().unwrap();

        let registrar_style = "Registrar Registration Expiration Date: 2030-01-01\n\
            Expiration Date: 1999-01-01\n";
        assert_eq!(parser.parse(registrar_style)["expirationDate"], "2030-01-01");

        let plain = "Expiration Date: 2031-05-05\n";
        assert_eq!(parser.parse(plain)["expirationDate"], "2031-05-05");
    }

    #[test]
    fn test_empty_value_does_not_take_next_line() {
        let response = "Registrar:\n\
            Registrar IANA ID: 9999\n\
            Creation Date: \n\
            Updated Date: 2020-01-01\n";
        let facts = WhoisParser::new().unwrap().parse(response);

        assert!(!facts.contains_key("registrar"));
        assert!(!facts.contains_key("creationDate"));
    }

    #[test]
    fn test_parse_empty_response() {
        let facts = WhoisParser::new()
            .unwrap()
            .parse("No match for \"NOPE.EXAMPLE\".\n");
        assert!(facts.is_empty());
    }

    #[test]
    fn test_referral_line() {
        let iana = "% IANA WHOIS server\n\
            domain:       COM\n\
            \n\
            refer:        whois.verisign-grs.com\n\
            \n\
            organisation: VeriSign Global Registry Services\n";
        assert_eq!(referral(iana).as_deref(), Some("whois.verisign-grs.com"));
        assert_eq!(referral("domain: TEST\n"), None);
    }
}
