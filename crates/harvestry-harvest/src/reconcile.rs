//! Reference reconciliation.
//!
//! Diffs the canonical references normalized from one harvesting's
//! fetch against the previously stored, non-deleted references for the
//! same `(source, person)` scope, classifies each as created, updated,
//! unchanged, or deleted, and appends one event per affected reference.

use std::collections::BTreeMap;

use chrono::Utc;
use harvestry_core::model::{
    Contribution, ContributorId, EventKind, Harvesting, Person, Reference, ReferenceEvent,
};
use harvestry_core::schema::Database;

use crate::error::HarvestResult;
use crate::harvester::NormalizedReference;
use crate::identity::{ContributorMention, IdentityResolver};

/// Applies one harvesting's fetched document set to the store.
#[derive(Debug)]
pub struct Reconciler<'a> {
    db: &'a Database,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Reconcile the fetched set against the stored set and return the
    /// emitted events.
    ///
    /// All four event kinds are always computed and persisted;
    /// caller-side filtering is a presentation concern. Events for
    /// fetched references are emitted in document order, followed by
    /// deletion events for stored references absent from the fetch.
    pub fn reconcile(
        &self,
        harvesting: &Harvesting,
        person: &Person,
        source: &str,
        fetched: Vec<NormalizedReference>,
    ) -> HarvestResult<Vec<ReferenceEvent>> {
        let resolver = IdentityResolver::new(self.db, source);

        // BTreeMap keeps the deletion scan in a stable key order.
        let mut previous: BTreeMap<String, Reference> = self
            .db
            .list_current_references(source, &person.id)?
            .into_iter()
            .map(|r| (r.source_identifier.clone(), r))
            .collect();

        let mut events = Vec::with_capacity(fetched.len());

        for normalized in fetched {
            let NormalizedReference {
                mut reference,
                contributors,
            } = normalized;

            reference.person_id = person.id;
            reference.deleted = false;

            // Compare on provisional contributions first; contributor
            // rows are only resolved (and written) once the reference
            // is known to persist. An unchanged refetch must not mint
            // fresh rows for name-only mentions.
            let mentions = Self::dedup_mentions(contributors);
            reference.contributions = provisional_contributions(&mentions)?;

            let stored = match previous.remove(&reference.source_identifier) {
                Some(stored) => Some(stored),
                // Not in the current scope: the key may still exist in
                // the store, deleted or harvested for another person.
                None => self
                    .db
                    .get_reference_by_key(source, &reference.source_identifier)?,
            };

            let event = match stored {
                Some(old) if !old.deleted => {
                    reference.id = old.id;
                    reference.created_at = old.created_at;
                    if reference.content_eq(&old) {
                        // No write beyond the confirmation record.
                        self.record_event(harvesting, EventKind::Unchanged, old)?
                    } else {
                        reference.contributions =
                            self.resolve_contributions(&resolver, &mentions)?;
                        reference.updated_at = Utc::now();
                        self.apply(harvesting, EventKind::Updated, reference)?
                    }
                }
                Some(old) => {
                    // Reappearance after deletion: created again, flag
                    // cleared, id and event history preserved.
                    reference.id = old.id;
                    reference.created_at = old.created_at;
                    reference.contributions = self.resolve_contributions(&resolver, &mentions)?;
                    reference.updated_at = Utc::now();
                    self.apply(harvesting, EventKind::Created, reference)?
                }
                None => {
                    reference.contributions = self.resolve_contributions(&resolver, &mentions)?;
                    self.apply(harvesting, EventKind::Created, reference)?
                }
            };
            events.push(event);
        }

        // Whatever remains of the stored set was not fetched this run.
        for (_, mut absent) in previous {
            self.db.mark_reference_deleted(&absent.id)?;
            absent.deleted = true;
            let event = self.record_event(harvesting, EventKind::Deleted, absent)?;
            events.push(event);
        }

        Ok(events)
    }

    /// Drop mentions that would duplicate an already seen
    /// `(identifier, role)` pair on the same reference, with a
    /// warning. Name-only mentions carry no shared identity and are
    /// never duplicates of each other.
    fn dedup_mentions(mentions: Vec<ContributorMention>) -> Vec<ContributorMention> {
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut kept = Vec::with_capacity(mentions.len());
        for mention in mentions {
            if let Some(identifier) = &mention.source_identifier {
                let key = (identifier.clone(), mention.role.clone());
                if seen.contains(&key) {
                    tracing::warn!(
                        name = %mention.name,
                        role = %mention.role,
                        "duplicate contributor/role pair on one reference, dropping mention"
                    );
                    continue;
                }
                seen.push(key);
            }
            kept.push(mention);
        }
        kept
    }

    /// Resolve deduplicated contributor mentions into contribution
    /// rows, creating or updating contributor records as needed.
    ///
    /// Contributions are recomputed in full at every harvest; ranks
    /// follow source order and stay contiguous from 0.
    fn resolve_contributions(
        &self,
        resolver: &IdentityResolver<'_>,
        mentions: &[ContributorMention],
    ) -> HarvestResult<Vec<Contribution>> {
        let mut contributions: Vec<Contribution> = Vec::with_capacity(mentions.len());
        for mention in mentions {
            let contributor = resolver.resolve(mention)?;
            let rank = contribution_rank(contributions.len())?;
            contributions.push(Contribution {
                contributor_id: contributor.id,
                contributor_name: contributor.name,
                role: mention.role.clone(),
                rank,
            });
        }
        Ok(contributions)
    }

    /// Write the reference's current state and the event in one
    /// transaction.
    fn apply(
        &self,
        harvesting: &Harvesting,
        kind: EventKind,
        reference: Reference,
    ) -> HarvestResult<ReferenceEvent> {
        let event = ReferenceEvent::new(harvesting.id, kind, reference);
        self.db.transaction(|db| {
            db.upsert_reference(&event.reference)?;
            db.replace_contributions(&event.reference.id, &event.reference.contributions)?;
            db.insert_reference_event(&event)?;
            Ok(())
        })?;
        Ok(event)
    }

    fn record_event(
        &self,
        harvesting: &Harvesting,
        kind: EventKind,
        reference: Reference,
    ) -> HarvestResult<ReferenceEvent> {
        let event = ReferenceEvent::new(harvesting.id, kind, reference);
        self.db.insert_reference_event(&event)?;
        Ok(event)
    }
}

/// Contribution rows for the content comparison, prior to resolution.
/// The contributor ids are placeholders and are never persisted;
/// `content_eq` compares contributions by `(name, role, rank)`.
fn provisional_contributions(
    mentions: &[ContributorMention],
) -> HarvestResult<Vec<Contribution>> {
    mentions
        .iter()
        .enumerate()
        .map(|(index, mention)| {
            Ok(Contribution {
                contributor_id: ContributorId::new(),
                contributor_name: mention.name.clone(),
                role: mention.role.clone(),
                rank: contribution_rank(index)?,
            })
        })
        .collect()
}

fn contribution_rank(index: usize) -> HarvestResult<u32> {
    u32::try_from(index).map_err(|_| {
        harvestry_core::Error::InvalidData(format!("contribution rank {index} out of range")).into()
    })
}
