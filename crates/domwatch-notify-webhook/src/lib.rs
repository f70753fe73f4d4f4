// # Webhook Subscriber
//
// Delivers change events as JSON to an HTTP endpoint.
//
// ## Trust Level: Untrusted (Subscriber)
//
// **Allowed Capabilities**:
// - Perform one HTTP POST per event to the configured endpoint
// - Map HTTP status codes to errors
//
// **Forbidden Capabilities**:
// - Retry or queue deliveries (a failed delivery is reported and dropped)
// - Spawn tasks
// - Access the snapshot store
//
// ## Payload
//
// The body is the serialized [`ChangeEvent`]:
//
// ```json
// {
//   "kind": "UPDATE_SPF",
//   "action": "ACTION_CHANGE",
//   "detected_at": "2024-05-01T12:00:00Z",
//   "current": { "name": "example.com", "spf": "v=spf1 -all", ... },
//   "previous": { "name": "example.com", "spf": "v=spf1 ~all", ... }
// }
// ```

use async_trait::async_trait;
use domwatch_core::config::{NotifierConfig, validate_webhook_url};
use domwatch_core::traits::Subscriber;
use domwatch_core::{ChangeEvent, Error, Result};
use reqwest::Url;
use std::time::Duration;

/// Default HTTP timeout for webhook requests (10 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscriber name used in logs and errors
const NAME: &str = "webhook";

/// Webhook subscriber
///
/// Stateless and single-shot: every event is one POST.
#[derive(Clone)]
pub struct WebhookSubscriber {
    /// Endpoint receiving the events
    url: Url,

    /// HTTP client for deliveries
    client: reqwest::Client,
}

// Custom Debug implementation; path and query often carry a token
impl std::fmt::Debug for WebhookSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSubscriber")
            .field("host", &self.url.host_str())
            .field("url", &"<REDACTED>")
            .finish()
    }
}

impl WebhookSubscriber {
    /// Create a new webhook subscriber
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the URL does not parse, is not
    /// http(s), has no host, or the HTTP client cannot be built.
    pub fn new(url: &str) -> Result<Self> {
        let url = validate_webhook_url(url)?;

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }

    /// Build a subscriber from notifier configuration
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        match config {
            NotifierConfig::Webhook { url } => Self::new(url),
            other => Err(Error::config(format!(
                "Invalid config for webhook subscriber: {}",
                other.type_name()
            ))),
        }
    }

    /// Endpoint the subscriber posts to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Subscriber for WebhookSubscriber {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        tracing::debug!(
            "Posting {} for {} to webhook",
            event.kind,
            event.domain()
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                Error::subscriber(NAME, format!("HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        match status.as_u16() {
            401 | 403 => Err(Error::subscriber(
                NAME,
                format!("Endpoint rejected credentials. Status: {}", status),
            )),
            404 => Err(Error::subscriber(
                NAME,
                format!("Endpoint not found on {}", self.url.host_str().unwrap_or_default()),
            )),
            429 => Err(Error::subscriber(
                NAME,
                format!("Rate limit exceeded. Status: {}", status),
            )),
            500..=599 => Err(Error::subscriber(
                NAME,
                format!("Endpoint server error (transient): {} - {}", status, error_text),
            )),
            _ => Err(Error::subscriber(
                NAME,
                format!("Delivery failed: {} - {}", status, error_text),
            )),
        }
    }

    fn subscriber_name(&self) -> &'static str {
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domwatch_core::{DomainSnapshot, FieldKind};
    use httpmock::prelude::*;

    fn event() -> ChangeEvent {
        let previous = DomainSnapshot::new("example.com").with_spf("v=spf1 ~all");
        let current = previous.clone().with_spf("v=spf1 -all");
        ChangeEvent::changed(FieldKind::Spf, current, previous)
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(WebhookSubscriber::new("ftp://example.com/hook").is_err());
        assert!(WebhookSubscriber::new("http://").is_err());
        assert!(WebhookSubscriber::new("hooks.example.com/x").is_err());
        assert!(WebhookSubscriber::new("https://hooks.example.com/x").is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = NotifierConfig::Webhook {
            url: "https://hooks.example.com/domwatch".to_string(),
        };
        let subscriber = WebhookSubscriber::from_config(&config).unwrap();
        assert_eq!(subscriber.url().as_str(), "https://hooks.example.com/domwatch");
        assert_eq!(subscriber.subscriber_name(), "webhook");
    }

    #[test]
    fn test_debug_hides_token() {
        let subscriber =
            WebhookSubscriber::new("https://hooks.example.com/services/T000/secret-token").unwrap();
        let debug_str = format!("{:?}", subscriber);

        assert!(debug_str.contains("hooks.example.com"));
        assert!(!debug_str.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_posts_event_json() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hooks/domwatch")
                    .json_body_partial(
                        r#"{
                            "kind": "UPDATE_SPF",
                            "action": "ACTION_CHANGE",
                            "current": { "spf": "v=spf1 -all" },
                            "previous": { "spf": "v=spf1 ~all" }
                        }"#,
                    );
                then.status(204);
            })
            .await;

        let subscriber = WebhookSubscriber::new(&server.url("/hooks/domwatch")).unwrap();
        subscriber.notify(&event()).await.unwrap();

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_a_subscriber_error() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/domwatch");
                then.status(500).body("upstream unavailable");
            })
            .await;

        let subscriber = WebhookSubscriber::new(&server.url("/hooks/domwatch")).unwrap();
        let err = subscriber.notify(&event()).await.unwrap_err();

        hook.assert_async().await;
        assert!(matches!(err, Error::Subscriber { .. }));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_rejected_credentials_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403);
            })
            .await;

        let subscriber = WebhookSubscriber::new(&server.url("/hooks/domwatch")).unwrap();
        let err = subscriber.notify(&event()).await.unwrap_err();

        assert!(err.to_string().contains("rejected credentials"));
    }
}
