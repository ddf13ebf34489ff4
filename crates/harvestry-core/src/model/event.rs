use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{HarvestingId, ReferenceEventId};
use crate::model::reference::Reference;

/// The reconciliation outcome for one reference within one harvesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

impl EventKind {
    /// All four kinds, in a stable order.
    pub const ALL: [Self; 4] = [Self::Created, Self::Updated, Self::Deleted, Self::Unchanged];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            "unchanged" => Ok(Self::Unchanged),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one reconciliation outcome.
///
/// Carries a full snapshot of the reference as it stood when the
/// event was produced, including resolved contributions. Append-only:
/// events are never mutated or deleted, forming the audit trail
/// clients query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEvent {
    pub id: ReferenceEventId,
    pub harvesting_id: HarvestingId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub reference: Reference,
}

impl ReferenceEvent {
    #[must_use]
    pub fn new(harvesting_id: HarvestingId, kind: EventKind, reference: Reference) -> Self {
        Self {
            id: ReferenceEventId::new(),
            harvesting_id,
            kind,
            timestamp: Utc::now(),
            reference,
        }
    }
}
