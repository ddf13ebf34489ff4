use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::event::EventKind;
use crate::model::harvesting::Harvesting;
use crate::model::ids::RetrievalId;
use crate::model::person::Person;

/// One request to aggregate references for a person across a set of
/// sources.
///
/// Completion is derived, never stored: a retrieval is complete once
/// every harvesting has reached a terminal state, which is vacuously
/// true for a retrieval with zero harvestings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub id: RetrievalId,
    pub person: Person,

    /// Event kinds the caller asked to retain. Filtering is a
    /// presentation concern: all four kinds are always computed and
    /// stored.
    pub event_kinds: Vec<EventKind>,

    pub harvestings: Vec<Harvesting>,

    pub created_at: DateTime<Utc>,
}

impl Retrieval {
    #[must_use]
    pub fn new(person: Person, event_kinds: Vec<EventKind>) -> Self {
        Self {
            id: RetrievalId::new(),
            person,
            event_kinds,
            harvestings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether all harvestings have reached a terminal state.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.harvestings.iter().all(|h| h.state.is_terminal())
    }
}
