//! The harvesting job: one source's fetch → normalize → reconcile →
//! persist pipeline, owning a terminal state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use harvestry_core::model::{HarvestingId, HarvestingState, Person};
use harvestry_core::schema::Database;

use crate::error::{HarvestError, HarvestResult};
use crate::harvester::Harvester;
use crate::reconcile::Reconciler;

/// Runs one harvesting to a terminal state.
///
/// Opens its own store connection; sibling jobs share nothing in
/// memory. Adapter failures (transport errors, unparseable top-level
/// payloads) drive the harvesting to `Failed` with the error detail
/// retained; individual malformed records are skipped with a warning
/// and the job still completes. A failure here never propagates to
/// sibling harvestings.
#[derive(Debug)]
pub struct HarvestJob {
    db_path: PathBuf,
    harvester: Arc<dyn Harvester>,
}

impl HarvestJob {
    #[must_use]
    pub fn new(db_path: impl AsRef<Path>, harvester: Arc<dyn Harvester>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            harvester,
        }
    }

    /// Run the job to completion. Returns the terminal state reached.
    ///
    /// Only store failures while recording state surface as errors;
    /// harvest failures are captured in the harvesting row.
    pub async fn run(
        &self,
        harvesting_id: HarvestingId,
        person: &Person,
    ) -> HarvestResult<HarvestingState> {
        let source = self.harvester.name();

        // Open, mark running, drop: the store connection must not be
        // held across the fetch for the job future to stay Send.
        {
            let db = Database::open(&self.db_path)?;
            db.update_harvesting_state(&harvesting_id, HarvestingState::Running, None)?;
        }
        tracing::info!(source, harvesting = %harvesting_id, "harvesting started");

        let fetch_result = self.harvester.fetch(person).await;

        let db = Database::open(&self.db_path)?;
        let outcome = fetch_result
            .and_then(|documents| self.reconcile_documents(&db, harvesting_id, person, &documents));

        match outcome {
            Ok(event_count) => {
                db.update_harvesting_state(&harvesting_id, HarvestingState::Completed, None)?;
                tracing::info!(source, harvesting = %harvesting_id, event_count, "harvesting completed");
                Ok(HarvestingState::Completed)
            }
            Err(error) => {
                let detail = error.to_string();
                db.update_harvesting_state(
                    &harvesting_id,
                    HarvestingState::Failed,
                    Some(&detail),
                )?;
                tracing::warn!(source, harvesting = %harvesting_id, %detail, "harvesting failed");
                Ok(HarvestingState::Failed)
            }
        }
    }

    fn reconcile_documents(
        &self,
        db: &Database,
        harvesting_id: HarvestingId,
        person: &Person,
        documents: &[crate::harvester::RawDocument],
    ) -> HarvestResult<usize> {
        let source = self.harvester.name();

        let mut fetched = Vec::with_capacity(documents.len());
        for document in documents {
            match self.harvester.normalize(person, document) {
                Ok(mut normalized) => {
                    normalized.reference.harvester_version = self.harvester.version().to_string();
                    fetched.push(normalized);
                }
                Err(error) => {
                    // Partial-success policy: a malformed record does
                    // not fail the run.
                    tracing::warn!(source, %error, "skipping malformed record");
                }
            }
        }

        let harvesting = db.get_harvesting(&harvesting_id)?.ok_or_else(|| {
            HarvestError::Database(harvestry_core::Error::NotFound {
                entity: "harvesting",
                id: harvesting_id.to_string(),
            })
        })?;

        let events = Reconciler::new(db).reconcile(&harvesting, person, source, fetched)?;
        Ok(events.len())
    }
}
