// # Subscriber Trait
//
// Defines the interface for consumers of change events.
//
// ## Implementations
//
// - Logging: `LogSubscriber` (this crate)
// - Email: `domwatch-notify-smtp` crate
// - HTTP webhook: `domwatch-notify-webhook` crate

use async_trait::async_trait;

use crate::model::ChangeEvent;

/// Trait for notification subscribers
///
/// Subscribers are registered with a [`crate::NotificationDispatcher`] and
/// receive every event it dispatches, in registration order.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O towards their own channel (SMTP relay, HTTP endpoint)
/// - ✅ Return an error when delivery fails
///
/// ## Forbidden Capabilities
/// - ❌ Retry or sleep (delivery is best-effort)
/// - ❌ Access the snapshot store
/// - ❌ Mutate the event
///
/// A returned error is logged by the dispatcher and never reaches the
/// engine, so one broken channel cannot block the others.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one event
    async fn notify(&self, event: &ChangeEvent) -> Result<(), crate::Error>;

    /// Get the subscriber name (for logging/debugging)
    fn subscriber_name(&self) -> &'static str;
}
