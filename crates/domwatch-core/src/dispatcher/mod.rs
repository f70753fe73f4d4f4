//! Notification dispatcher
//!
//! The dispatcher keeps an ordered registry of [`Subscriber`]s and fans each
//! change event out to all of them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use domwatch_core::NotificationDispatcher;
//! use std::sync::Arc;
//!
//! let dispatcher = NotificationDispatcher::new();
//! dispatcher.register(Arc::new(smtp_subscriber));
//! dispatcher.register(Arc::new(webhook_subscriber));
//!
//! let report = dispatcher.dispatch(&event).await;
//! ```
//!
//! ## Delivery
//!
//! Delivery is sequential and follows registration order. A subscriber that
//! returns an error is logged and skipped; the remaining subscribers still
//! receive the event. `dispatch` itself never fails.

use crate::model::ChangeEvent;
use crate::traits::Subscriber;
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Outcome of a single dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that accepted the event
    pub delivered: usize,
    /// Subscribers that returned an error
    pub failed: usize,
}

/// Fan-out registry of notification subscribers
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock. `dispatch` clones the
/// subscriber list before delivering, so registration changes made during a
/// dispatch apply to the next one.
#[derive(Default)]
pub struct NotificationDispatcher {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl NotificationDispatcher {
    /// Create a new empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber
    ///
    /// Subscribers are appended; registering the same subscriber twice
    /// delivers every event to it twice.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        debug!("Registering subscriber {}", subscriber.subscriber_name());
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.push(subscriber);
    }

    /// Remove a subscriber by identity
    ///
    /// # Returns
    ///
    /// `true` if the subscriber was registered, `false` otherwise
    pub fn unregister(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match subscribers.iter().position(|s| Arc::ptr_eq(s, subscriber)) {
            Some(index) => {
                subscribers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every registered subscriber
    pub async fn dispatch(&self, event: &ChangeEvent) -> DispatchReport {
        let subscribers = self.snapshot();
        let mut report = DispatchReport::default();

        for subscriber in subscribers {
            match subscriber.notify(event).await {
                Ok(()) => {
                    debug!(
                        "{} delivered {} for {}",
                        subscriber.subscriber_name(),
                        event.kind,
                        event.domain()
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        "Subscriber {} failed to handle {} for {}: {}",
                        subscriber.subscriber_name(),
                        event.kind,
                        event.domain(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no subscriber is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the registered subscribers, in delivery order
    pub fn subscriber_names(&self) -> Vec<&'static str> {
        self.snapshot()
            .iter()
            .map(|subscriber| subscriber.subscriber_name())
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Subscriber that writes every event to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

#[async_trait]
impl Subscriber for LogSubscriber {
    async fn notify(&self, event: &ChangeEvent) -> Result<(), crate::Error> {
        info!(
            domain = %event.domain(),
            kind = %event.kind,
            action = %event.action,
            "{} changed: '{}' -> '{}'",
            event.kind.label(),
            event.previous_value(),
            event.current_value()
        );
        Ok(())
    }

    fn subscriber_name(&self) -> &'static str {
        "log"
    }
}
