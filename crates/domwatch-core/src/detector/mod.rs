//! Change detection
//!
//! Compares a freshly fetched snapshot with the latest history row and
//! decides what the engine has to do:
//!
//! | previous history | fields differ | result                     | history append |
//! |------------------|---------------|----------------------------|----------------|
//! | none             | n/a           | [`Detection::FirstObservation`] | yes       |
//! | present          | no            | [`Detection::Unchanged`]   | no             |
//! | present          | yes           | [`Detection::Changed`]     | yes, once      |
//!
//! Comparison is exact string equality. Values are not trimmed or
//! normalized; fetchers must hand over canonical text if two spellings of
//! the same record should compare equal.
//!
//! Events come out in [`FieldKind::ALL`] order: SPF, DMARC, nameservers.

use crate::model::{ChangeEvent, DomainSnapshot, FieldKind};

/// Outcome of comparing a snapshot with its history
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// No history exists yet; the snapshot must be recorded as-is
    FirstObservation,
    /// Every monitored field matches the latest history row
    Unchanged,
    /// At least one monitored field differs; one event per field
    Changed(Vec<ChangeEvent>),
}

impl Detection {
    /// Whether the current snapshot must be appended to history
    pub fn should_append_history(&self) -> bool {
        !matches!(self, Detection::Unchanged)
    }

    /// Events to dispatch (empty unless [`Detection::Changed`])
    pub fn events(&self) -> &[ChangeEvent] {
        match self {
            Detection::Changed(events) => events,
            Detection::FirstObservation | Detection::Unchanged => &[],
        }
    }

    /// Consume the detection, yielding its events
    pub fn into_events(self) -> Vec<ChangeEvent> {
        match self {
            Detection::Changed(events) => events,
            Detection::FirstObservation | Detection::Unchanged => Vec::new(),
        }
    }

    /// Short label for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Detection::FirstObservation => "first_observation",
            Detection::Unchanged => "unchanged",
            Detection::Changed(_) => "changed",
        }
    }
}

/// Compare `current` with the latest history row
///
/// Pure: no I/O and no clock access. Event timestamps are taken from
/// `current.last_check`.
pub fn detect_changes(current: &DomainSnapshot, previous: Option<&DomainSnapshot>) -> Detection {
    let Some(previous) = previous else {
        return Detection::FirstObservation;
    };

    let events: Vec<ChangeEvent> = FieldKind::ALL
        .into_iter()
        .filter(|kind| current.field(*kind) != previous.field(*kind))
        .map(|kind| ChangeEvent::changed(kind, current.clone(), previous.clone()))
        .collect();

    if events.is_empty() {
        Detection::Unchanged
    } else {
        Detection::Changed(events)
    }
}
