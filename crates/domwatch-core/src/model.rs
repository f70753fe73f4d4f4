//! Domain snapshots and change events
//!
//! A [`DomainSnapshot`] is the security-posture state of one domain at one
//! poll. A [`ChangeEvent`] describes a single monitored field that differs
//! between the fresh snapshot and the last history row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator used when a nameserver list is stored as a single string
pub const NAMESERVER_SEPARATOR: &str = ", ";

/// Known state of one domain at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    /// Domain name (stable identity)
    pub name: String,
    /// Registrar, maintained by the registrar-management process
    pub registrar: String,
    /// Lifecycle state, passthrough
    pub state: String,
    /// Tier, passthrough
    pub tier: String,
    /// Transfer target, passthrough
    pub transfer_to: String,
    /// Time of the poll that produced this snapshot
    pub last_check: DateTime<Utc>,
    /// SPF record text
    pub spf: String,
    /// DMARC record text
    pub dmarc: String,
    /// Nameserver list joined with [`NAMESERVER_SEPARATOR`]
    pub nameservers: String,
    /// Whether the domain is monitored
    pub active: bool,
    /// WHOIS summary (`key:value` pairs)
    pub whois: String,
}

impl DomainSnapshot {
    /// Create an active snapshot with empty posture fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registrar: String::new(),
            state: String::new(),
            tier: String::new(),
            transfer_to: String::new(),
            last_check: Utc::now(),
            spf: String::new(),
            dmarc: String::new(),
            nameservers: String::new(),
            active: true,
            whois: String::new(),
        }
    }

    /// Set the SPF record
    pub fn with_spf(mut self, spf: impl Into<String>) -> Self {
        self.spf = spf.into();
        self
    }

    /// Set the DMARC record
    pub fn with_dmarc(mut self, dmarc: impl Into<String>) -> Self {
        self.dmarc = dmarc.into();
        self
    }

    /// Set the nameserver list
    pub fn with_nameservers<S: AsRef<str>>(mut self, nameservers: &[S]) -> Self {
        self.nameservers = join_nameservers(nameservers);
        self
    }

    /// Set the registrar
    pub fn with_registrar(mut self, registrar: impl Into<String>) -> Self {
        self.registrar = registrar.into();
        self
    }

    /// Set the active flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the poll timestamp
    pub fn with_last_check(mut self, last_check: DateTime<Utc>) -> Self {
        self.last_check = last_check;
        self
    }

    /// Value of a monitored field
    pub fn field(&self, kind: FieldKind) -> &str {
        match kind {
            FieldKind::Spf => &self.spf,
            FieldKind::Dmarc => &self.dmarc,
            FieldKind::Nameservers => &self.nameservers,
        }
    }
}

/// Join a nameserver list into its stored form
pub fn join_nameservers<S: AsRef<str>>(nameservers: &[S]) -> String {
    nameservers
        .iter()
        .map(|ns| ns.as_ref())
        .collect::<Vec<_>>()
        .join(NAMESERVER_SEPARATOR)
}

/// Render a WHOIS map as `key:value` pairs, ordered by key
pub fn summarize_whois(facts: &BTreeMap<String, String>) -> String {
    facts
        .iter()
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Monitored field that can raise a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "UPDATE_SPF")]
    Spf,
    #[serde(rename = "UPDATE_DMARC")]
    Dmarc,
    #[serde(rename = "UPDATE_NAMESERVERS")]
    Nameservers,
}

impl FieldKind {
    /// Evaluation order used by the detector
    pub const ALL: [FieldKind; 3] = [FieldKind::Spf, FieldKind::Dmarc, FieldKind::Nameservers];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Spf => "UPDATE_SPF",
            FieldKind::Dmarc => "UPDATE_DMARC",
            FieldKind::Nameservers => "UPDATE_NAMESERVERS",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Spf => "SPF",
            FieldKind::Dmarc => "DMARC",
            FieldKind::Nameservers => "Nameservers",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live-table column accepted by [`crate::SnapshotStore::update_field`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotField {
    Spf,
    Dmarc,
    Nameservers,
    Whois,
}

impl SnapshotField {
    /// Column name in the live table
    pub fn column(&self) -> &'static str {
        match self {
            SnapshotField::Spf => "spf",
            SnapshotField::Dmarc => "dmarc",
            SnapshotField::Nameservers => "nameservers",
            SnapshotField::Whois => "whois",
        }
    }

    /// Write a value into the matching snapshot field
    pub fn apply(&self, snapshot: &mut DomainSnapshot, value: &str) {
        let slot = match self {
            SnapshotField::Spf => &mut snapshot.spf,
            SnapshotField::Dmarc => &mut snapshot.dmarc,
            SnapshotField::Nameservers => &mut snapshot.nameservers,
            SnapshotField::Whois => &mut snapshot.whois,
        };
        *slot = value.to_string();
    }
}

impl From<FieldKind> for SnapshotField {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Spf => SnapshotField::Spf,
            FieldKind::Dmarc => SnapshotField::Dmarc,
            FieldKind::Nameservers => SnapshotField::Nameservers,
        }
    }
}

/// Why an event was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeAction {
    /// No history existed before
    #[serde(rename = "ACTION_INSERT")]
    Insert,
    /// The stored value differed
    #[serde(rename = "ACTION_CHANGE")]
    Change,
}

impl ChangeAction {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Insert => "ACTION_INSERT",
            ChangeAction::Change => "ACTION_CHANGE",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level change detected during a run
///
/// Events are transient: they drive dispatch and are then dropped. Both
/// snapshots are owned copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Which field changed
    pub kind: FieldKind,
    /// Insert or change
    pub action: ChangeAction,
    /// Poll time of the current snapshot
    pub detected_at: DateTime<Utc>,
    /// Freshly fetched snapshot
    pub current: DomainSnapshot,
    /// Last history snapshot, present for [`ChangeAction::Change`]
    pub previous: Option<DomainSnapshot>,
}

impl ChangeEvent {
    /// Create a change event between two snapshots
    pub fn changed(kind: FieldKind, current: DomainSnapshot, previous: DomainSnapshot) -> Self {
        Self {
            kind,
            action: ChangeAction::Change,
            detected_at: current.last_check,
            current,
            previous: Some(previous),
        }
    }

    /// Domain the event is about
    pub fn domain(&self) -> &str {
        &self.current.name
    }

    /// New value of the changed field
    pub fn current_value(&self) -> &str {
        self.current.field(self.kind)
    }

    /// Old value of the changed field, empty when there is no previous snapshot
    pub fn previous_value(&self) -> &str {
        self.previous
            .as_ref()
            .map(|previous| previous.field(self.kind))
            .unwrap_or("")
    }
}
