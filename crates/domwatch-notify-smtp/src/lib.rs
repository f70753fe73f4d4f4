// # SMTP Subscriber
//
// Sends one plain-text email per change event.
//
// ## Trust Level: Untrusted (Subscriber)
//
// **Allowed Capabilities**:
// - Open SMTP connections to the configured relay only
// - Format messages from the event
//
// **Forbidden Capabilities**:
// - Retry or queue deliveries
// - Access the snapshot store
//
// ## Security Requirements
//
// - The SMTP password NEVER appears in logs or Debug output
// - Addresses are parsed when the subscriber is built, not per event

use async_trait::async_trait;
use domwatch_core::config::{NotifierConfig, SmtpConfig};
use domwatch_core::traits::Subscriber;
use domwatch_core::{ChangeEvent, Error, FieldKind, Result};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// SMTP command timeout (30 seconds)
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Subscriber name used in logs and errors
const NAME: &str = "smtp";

/// Email subscriber backed by an async lettre transport
pub struct SmtpSubscriber {
    host: String,
    port: u16,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

// Custom Debug implementation; the transport holds the credentials
impl std::fmt::Debug for SmtpSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSubscriber")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from.to_string())
            .field("to", &self.to.len())
            .finish()
    }
}

impl SmtpSubscriber {
    /// Create a new SMTP subscriber
    ///
    /// No connection is opened until the first event is sent.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        config.validate()?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| Error::config(format!("Invalid sender '{}': {}", config.from, e)))?;

        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| Error::config(format!("Invalid recipient '{}': {}", addr, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                Error::config(format!("Invalid SMTP relay '{}': {}", config.host, e))
            })?
        } else {
            tracing::warn!("SMTP relay {} used without STARTTLS", config.host);
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            from,
            to,
            transport: builder.build(),
        })
    }

    /// Build a subscriber from notifier configuration
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        match config {
            NotifierConfig::Smtp(smtp) => Self::new(smtp),
            other => Err(Error::config(format!(
                "Invalid config for SMTP subscriber: {}",
                other.type_name()
            ))),
        }
    }

    fn build_message(&self, event: &ChangeEvent) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(event))
            .header(ContentType::TEXT_PLAIN);

        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(body(event))
            .map_err(|e| Error::subscriber(NAME, format!("Failed to build message: {}", e)))
    }
}

/// `[domwatch] <FIELD> changed for <domain>`
fn subject(event: &ChangeEvent) -> String {
    format!(
        "[domwatch] {} changed for {}",
        event.kind.label(),
        event.domain()
    )
}

fn body(event: &ChangeEvent) -> String {
    let hint = match event.kind {
        FieldKind::Spf => "Check that every service sending mail for this domain is still authorized.",
        FieldKind::Dmarc => "Review the DMARC policy and its reporting addresses.",
        FieldKind::Nameservers => "Confirm that the delegation change was intended.",
    };

    format!(
        "Domain: {}\n\
        Field: {}\n\
        Action: {}\n\
        Old value: {}\n\
        New value: {}\n\
        Detected at: {}\n\n\
        {}\n",
        event.domain(),
        event.kind.label(),
        event.action,
        display_value(event.previous_value()),
        display_value(event.current_value()),
        event.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        hint
    )
}

fn display_value(value: &str) -> &str {
    if value.is_empty() { "(none)" } else { value }
}

#[async_trait]
impl Subscriber for SmtpSubscriber {
    async fn notify(&self, event: &ChangeEvent) -> Result<()> {
        let message = self.build_message(event)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::subscriber(NAME, format!("SMTP delivery failed: {}", e)))?;

        tracing::debug!(
            "Sent {} notification for {} to {} recipients",
            event.kind,
            event.domain(),
            self.to.len()
        );
        Ok(())
    }

    fn subscriber_name(&self) -> &'static str {
        NAME
    }
}
