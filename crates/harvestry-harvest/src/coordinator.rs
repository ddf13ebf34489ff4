//! The retrieval coordinator: fans one concurrent harvesting job out
//! per requested source and answers snapshot reads.
//!
//! The "is it done" question is answered by re-reading persisted
//! state: the coordinator persists the retrieval and its pending
//! harvesting shells before dispatch, so a concurrent reader sees
//! pending rather than "not found", then spawns detached tasks and
//! returns immediately.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvestry_core::model::{
    EventKind, Harvesting, Person, ReferenceEvent, ReferenceEventId, Retrieval, RetrievalId,
};
use harvestry_core::schema::Database;

use crate::error::{HarvestError, HarvestResult};
use crate::harvester::HarvesterRegistry;
use crate::job::HarvestJob;

/// One harvesting with its retained events, as seen by a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestingSnapshot {
    pub harvesting: Harvesting,
    pub events: Vec<ReferenceEvent>,
}

/// A point-in-time view of a retrieval, safe to poll repeatedly.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSnapshot {
    pub retrieval: Retrieval,
    pub harvestings: Vec<HarvestingSnapshot>,
}

impl RetrievalSnapshot {
    /// Whether every harvesting has reached a terminal state.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.retrieval.is_complete()
    }
}

/// Orchestrates retrievals across the registered harvesters.
#[derive(Debug, Clone)]
pub struct RetrievalCoordinator {
    db_path: PathBuf,
    registry: Arc<HarvesterRegistry>,
}

impl RetrievalCoordinator {
    #[must_use]
    pub fn new(db_path: impl AsRef<Path>, registry: Arc<HarvesterRegistry>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            registry,
        }
    }

    /// Start a retrieval for a person and return its id immediately.
    ///
    /// The submitted person is resolved against the stored person
    /// registry by identifier overlap, so a fresh `Person` value
    /// carrying a known identifier lands in the same `(source,
    /// person)` reconciliation scope as earlier retrievals for that
    /// human.
    ///
    /// `sources`: `None` dispatches every registered harvester that is
    /// relevant to the resolved person; an explicit list must name
    /// known harvesters only (validated synchronously, nothing
    /// persisted on rejection) and an explicitly empty list yields a
    /// retrieval with zero harvestings, complete from the start.
    /// `event_kinds` selects the kinds retained by snapshot reads;
    /// empty means all.
    pub async fn start_retrieval(
        &self,
        person: Person,
        sources: Option<Vec<String>>,
        event_kinds: Vec<EventKind>,
    ) -> HarvestResult<RetrievalId> {
        if let Some(names) = &sources {
            for name in names {
                if !self.registry.contains(name) {
                    return Err(HarvestError::UnknownHarvester { name: name.clone() });
                }
            }
        }

        // Resolution may widen the identifier set, so it happens
        // before relevance is computed. The shells are persisted in
        // the same session, before dispatch, each in one transaction.
        let retrieval = {
            let db = Database::open(&self.db_path)?;
            let person = db.transaction(|db| db.resolve_person(&person))?;

            let requested: Vec<String> = match sources {
                Some(names) => names,
                None => self
                    .registry
                    .names()
                    .into_iter()
                    .filter(|name| {
                        self.registry
                            .get(name)
                            .is_some_and(|h| h.is_relevant(&person))
                    })
                    .map(String::from)
                    .collect(),
            };

            let mut retrieval = Retrieval::new(person, event_kinds);
            for name in &requested {
                retrieval
                    .harvestings
                    .push(Harvesting::new(retrieval.id, name.clone()));
            }

            db.transaction(|db| {
                db.insert_retrieval(&retrieval)?;
                for harvesting in &retrieval.harvestings {
                    db.insert_harvesting(harvesting)?;
                }
                Ok(())
            })?;
            retrieval
        };
        let sources: Vec<&str> = retrieval
            .harvestings
            .iter()
            .map(|h| h.harvester.as_str())
            .collect();
        tracing::info!(
            retrieval = %retrieval.id,
            person = %retrieval.person.display_name,
            ?sources,
            "retrieval started"
        );

        for harvesting in &retrieval.harvestings {
            // Validated above; the registry is immutable once shared.
            let Some(harvester) = self.registry.get(&harvesting.harvester) else {
                continue;
            };
            let job = HarvestJob::new(&self.db_path, harvester);
            let harvesting_id = harvesting.id;
            let person = retrieval.person.clone();
            tokio::spawn(async move {
                if let Err(error) = job.run(harvesting_id, &person).await {
                    tracing::error!(harvesting = %harvesting_id, %error, "harvesting job aborted");
                }
            });
        }

        Ok(retrieval.id)
    }

    /// Read the current state of a retrieval, with events filtered to
    /// the retrieval's requested kinds.
    pub fn get_retrieval(&self, id: &RetrievalId) -> HarvestResult<Option<RetrievalSnapshot>> {
        let db = Database::open(&self.db_path)?;
        let Some(retrieval) = db.get_retrieval(id)? else {
            return Ok(None);
        };

        let mut harvestings = Vec::with_capacity(retrieval.harvestings.len());
        for harvesting in &retrieval.harvestings {
            let events = db
                .list_events_for_harvesting(&harvesting.id)?
                .into_iter()
                .filter(|e| {
                    retrieval.event_kinds.is_empty() || retrieval.event_kinds.contains(&e.kind)
                })
                .collect();
            harvestings.push(HarvestingSnapshot {
                harvesting: harvesting.clone(),
                events,
            });
        }

        Ok(Some(RetrievalSnapshot {
            retrieval,
            harvestings,
        }))
    }

    /// Fetch one historical event with its full reference payload.
    pub fn get_reference_event(
        &self,
        id: &ReferenceEventId,
    ) -> HarvestResult<Option<ReferenceEvent>> {
        let db = Database::open(&self.db_path)?;
        Ok(db.get_reference_event(id)?)
    }

    /// The registered source names.
    #[must_use]
    pub fn known_sources(&self) -> Vec<&'static str> {
        self.registry.names()
    }
}
