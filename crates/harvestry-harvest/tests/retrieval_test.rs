//! End-to-end retrieval tests: coordinator → jobs → reconciliation →
//! store, driven by scripted in-crate harvesters instead of real
//! source APIs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

use harvestry_core::model::{
    EventKind, HarvestingState, IdentifierKind, Person, Reference, RetrievalId,
};
use harvestry_core::schema::Database;
use harvestry_harvest::{
    ContributorMention, HarvestError, HarvestResult, Harvester, HarvesterRegistry,
    NormalizedReference, RawDocument, RetrievalCoordinator, RetrievalSnapshot,
};

/// A harvester serving a scripted document set that tests can swap
/// between runs. Documents are `{"id", "title", "authors": [{"id",
/// "name"}]}` objects; a document without an id is malformed.
#[derive(Debug)]
struct ScriptedHarvester {
    name: &'static str,
    docs: Mutex<Vec<Value>>,
    fail_with: Mutex<Option<String>>,
}

impl ScriptedHarvester {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            docs: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        })
    }

    fn serve(&self, docs: Vec<Value>) {
        *self.docs.lock().unwrap() = docs;
        *self.fail_with.lock().unwrap() = None;
    }

    fn fail(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait::async_trait]
impl Harvester for ScriptedHarvester {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn is_relevant(&self, _person: &Person) -> bool {
        true
    }

    async fn fetch(&self, _person: &Person) -> HarvestResult<Vec<RawDocument>> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(HarvestError::Http {
                source_name: self.name.to_string(),
                message,
            });
        }
        let docs = self.docs.lock().unwrap().clone();
        Ok(docs.into_iter().map(RawDocument::new).collect())
    }

    fn normalize(
        &self,
        person: &Person,
        document: &RawDocument,
    ) -> HarvestResult<NormalizedReference> {
        let id = document.payload["id"]
            .as_str()
            .ok_or_else(|| HarvestError::Parse {
                source_name: self.name.to_string(),
                message: "missing id".to_string(),
            })?;
        let mut reference = Reference::new(self.name, id, person.id);
        if let Some(title) = document.payload["title"].as_str() {
            reference = reference.with_title(title, None);
        }
        let contributors = document.payload["authors"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .map(|a| {
                        ContributorMention::new(
                            a["id"].as_str().map(String::from),
                            a["name"].as_str().unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(NormalizedReference {
            reference,
            contributors,
        })
    }
}

struct Fixture {
    _dir: TempDir,
    db_path: std::path::PathBuf,
    coordinator: RetrievalCoordinator,
}

fn fixture(harvesters: Vec<Arc<ScriptedHarvester>>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("test.db");
    let mut registry = HarvesterRegistry::new();
    for harvester in harvesters {
        registry.register(harvester);
    }
    let coordinator = RetrievalCoordinator::new(&db_path, Arc::new(registry));
    Fixture {
        _dir: dir,
        db_path,
        coordinator,
    }
}

async fn run_to_completion(
    coordinator: &RetrievalCoordinator,
    person: &Person,
    sources: Option<Vec<String>>,
    event_kinds: Vec<EventKind>,
) -> (RetrievalId, RetrievalSnapshot) {
    let id = coordinator
        .start_retrieval(person.clone(), sources, event_kinds)
        .await
        .unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let snapshot = coordinator.get_retrieval(&id).unwrap().unwrap();
        if snapshot.is_complete() {
            return (id, snapshot);
        }
        assert!(std::time::Instant::now() < deadline, "retrieval stalled");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn events_of_kind(snapshot: &RetrievalSnapshot, kind: EventKind) -> Vec<String> {
    snapshot
        .harvestings
        .iter()
        .flat_map(|h| &h.events)
        .filter(|e| e.kind == kind)
        .map(|e| e.reference.source_identifier.clone())
        .collect()
}

#[tokio::test]
async fn test_first_retrieval_creates_everything() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![
        json!({"id": "hal-0001", "title": "Premier article",
               "authors": [{"id": "10227", "name": "V. Sebillotte Cuchet"}]}),
        json!({"id": "hal-0002", "title": "Second article"}),
    ]);
    let fx = fixture(vec![hal]);
    let person = Person::new("Violaine Sebillotte Cuchet");

    let (_, snapshot) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    assert_eq!(snapshot.harvestings.len(), 1);
    assert_eq!(
        snapshot.harvestings[0].harvesting.state,
        HarvestingState::Completed
    );
    let mut created = events_of_kind(&snapshot, EventKind::Created);
    created.sort();
    assert_eq!(created, vec!["hal-0001", "hal-0002"]);
}

#[tokio::test]
async fn test_failed_source_does_not_disturb_its_sibling() {
    let hal = ScriptedHarvester::new("hal");
    hal.fail("503 Service Unavailable");
    let idref = ScriptedHarvester::new("idref");
    idref.serve(vec![json!({"id": "idref-01", "title": "Notice"})]);
    let fx = fixture(vec![hal, idref]);
    let person = Person::new("Alessandro Buccheri");

    let (_, snapshot) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    assert_eq!(snapshot.harvestings.len(), 2);
    let by_name = |name: &str| {
        snapshot
            .harvestings
            .iter()
            .find(|h| h.harvesting.harvester == name)
            .unwrap()
    };

    let failed = by_name("hal");
    assert_eq!(failed.harvesting.state, HarvestingState::Failed);
    assert!(failed.harvesting.error.as_ref().unwrap().contains("503"));
    assert!(failed.events.is_empty());

    let completed = by_name("idref");
    assert_eq!(completed.harvesting.state, HarvestingState::Completed);
    assert_eq!(completed.events.len(), 1);
    assert_eq!(completed.events[0].kind, EventKind::Created);
}

#[tokio::test]
async fn test_second_run_classifies_unchanged_updated_and_deleted() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![
        json!({"id": "hal-0001", "title": "Stable"}),
        json!({"id": "hal-0002", "title": "Old title"}),
        json!({"id": "hal-0003", "title": "Withdrawn"}),
    ]);
    let fx = fixture(vec![Arc::clone(&hal)]);
    let person = Person::new("Alessandro Buccheri");

    run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    hal.serve(vec![
        json!({"id": "hal-0001", "title": "Stable"}),
        json!({"id": "hal-0002", "title": "New title"}),
    ]);
    let (_, snapshot) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    assert_eq!(events_of_kind(&snapshot, EventKind::Unchanged), ["hal-0001"]);
    assert_eq!(events_of_kind(&snapshot, EventKind::Updated), ["hal-0002"]);
    assert_eq!(events_of_kind(&snapshot, EventKind::Deleted), ["hal-0003"]);
    assert!(events_of_kind(&snapshot, EventKind::Created).is_empty());

    // The updated reference kept its identity; the deleted one is
    // flagged, not removed.
    let db = Database::open(&fx.db_path).unwrap();
    let updated = db.get_reference_by_key("hal", "hal-0002").unwrap().unwrap();
    assert_eq!(updated.titles[0].value, "New title");
    let deleted = db.get_reference_by_key("hal", "hal-0003").unwrap().unwrap();
    assert!(deleted.deleted);
}

#[tokio::test]
async fn test_deleted_reference_reappears_as_created_with_history() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![json!({"id": "hal-0001", "title": "Flickering"})]);
    let fx = fixture(vec![Arc::clone(&hal)]);
    let person = Person::new("Jeanne Mas");

    run_to_completion(&fx.coordinator, &person, None, vec![]).await;
    let db = Database::open(&fx.db_path).unwrap();
    let original = db.get_reference_by_key("hal", "hal-0001").unwrap().unwrap();

    hal.serve(vec![]);
    run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    hal.serve(vec![json!({"id": "hal-0001", "title": "Flickering"})]);
    let (_, third) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    assert_eq!(events_of_kind(&third, EventKind::Created), ["hal-0001"]);
    let reborn = db.get_reference_by_key("hal", "hal-0001").unwrap().unwrap();
    assert_eq!(reborn.id, original.id);
    assert!(!reborn.deleted);
}

#[tokio::test]
async fn test_contributor_identity_survives_renames_across_runs() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![json!({"id": "hal-0001", "title": "Metaphors",
        "authors": [{"id": "123456", "name": "Alessandro Buccheri"}]})]);
    let fx = fixture(vec![Arc::clone(&hal)]);
    let person = Person::new("Alessandro Buccheri");

    run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    hal.serve(vec![json!({"id": "hal-0001", "title": "Metaphors",
        "authors": [{"id": "123456", "name": "A. Buccheri"}]})]);
    let (_, snapshot) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    // The contribution changed (display name), so the reference is
    // updated rather than unchanged.
    assert_eq!(events_of_kind(&snapshot, EventKind::Updated), ["hal-0001"]);

    let db = Database::open(&fx.db_path).unwrap();
    let reference = db.get_reference_by_key("hal", "hal-0001").unwrap().unwrap();
    let contributions = db.list_contributions(&reference.id).unwrap();
    assert_eq!(contributions.len(), 1);
    assert_eq!(contributions[0].contributor_name, "A. Buccheri");

    // One contributor row: the rename became a variant, not a clone.
    let contributor = db
        .get_contributor_by_identifier("hal", "123456")
        .unwrap()
        .unwrap();
    assert_eq!(contributor.name, "A. Buccheri");
    assert_eq!(contributor.name_variants, vec!["Alessandro Buccheri"]);
}

#[tokio::test]
async fn test_resubmitted_person_shares_reconciliation_scope() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![
        json!({"id": "hal-0001", "title": "Premier article"}),
        json!({"id": "hal-0002", "title": "Second article"}),
    ]);
    let fx = fixture(vec![Arc::clone(&hal)]);

    // Two invocations build two distinct person values, as separate
    // CLI runs would, sharing only an identifier.
    let first = Person::new("Violaine Sebillotte Cuchet")
        .with_identifier(IdentifierKind::IdHal, "10227");
    run_to_completion(&fx.coordinator, &first, None, vec![]).await;

    hal.serve(vec![json!({"id": "hal-0001", "title": "Premier article"})]);
    let second =
        Person::new("V. Sebillotte Cuchet").with_identifier(IdentifierKind::IdHal, "10227");
    let (_, snapshot) = run_to_completion(&fx.coordinator, &second, None, vec![]).await;

    // The second run reconciles against the first run's stock: the
    // surviving document is unchanged and the missing one is deleted.
    assert_eq!(events_of_kind(&snapshot, EventKind::Unchanged), ["hal-0001"]);
    assert_eq!(events_of_kind(&snapshot, EventKind::Deleted), ["hal-0002"]);
    assert!(events_of_kind(&snapshot, EventKind::Created).is_empty());

    let db = Database::open(&fx.db_path).unwrap();
    let deleted = db.get_reference_by_key("hal", "hal-0002").unwrap().unwrap();
    assert!(deleted.deleted);
    assert_eq!(snapshot.retrieval.person.id, first.id);
}

#[tokio::test]
async fn test_event_kind_filter_is_presentation_only() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![
        json!({"id": "hal-0001", "title": "Un"}),
        json!({"id": "hal-0002", "title": "Deux"}),
    ]);
    let fx = fixture(vec![Arc::clone(&hal)]);
    let person = Person::new("Jeanne Mas");

    run_to_completion(&fx.coordinator, &person, None, vec![]).await;

    // Second run, unchanged everywhere, but the retrieval only asks
    // for created/deleted events.
    let (_, snapshot) = run_to_completion(
        &fx.coordinator,
        &person,
        None,
        vec![EventKind::Created, EventKind::Deleted],
    )
    .await;

    assert!(snapshot.harvestings[0].events.is_empty());

    // All events were still recorded underneath.
    let db = Database::open(&fx.db_path).unwrap();
    let stored = db
        .list_events_for_harvesting(&snapshot.harvestings[0].harvesting.id)
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.kind == EventKind::Unchanged));
}

#[tokio::test]
async fn test_explicit_empty_source_list_yields_empty_complete_retrieval() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![json!({"id": "hal-0001", "title": "Ignored"})]);
    let fx = fixture(vec![hal]);
    let person = Person::new("Jeanne Mas");

    let (_, snapshot) =
        run_to_completion(&fx.coordinator, &person, Some(vec![]), vec![]).await;

    assert!(snapshot.harvestings.is_empty());
    assert!(snapshot.is_complete());
}

#[tokio::test]
async fn test_unknown_source_rejected_before_anything_persists() {
    let fx = fixture(vec![ScriptedHarvester::new("hal")]);
    let person = Person::new("Jeanne Mas");

    let result = fx
        .coordinator
        .start_retrieval(person, Some(vec!["scopus".to_string()]), vec![])
        .await;
    assert!(matches!(
        result,
        Err(HarvestError::UnknownHarvester { name }) if name == "scopus"
    ));
}

#[tokio::test]
async fn test_retrieval_event_lookup_returns_full_snapshot() {
    let hal = ScriptedHarvester::new("hal");
    hal.serve(vec![json!({"id": "hal-0001", "title": "Premier article"})]);
    let fx = fixture(vec![hal]);
    let person = Person::new("Jeanne Mas");

    let (_, snapshot) = run_to_completion(&fx.coordinator, &person, None, vec![]).await;
    let event_id = snapshot.harvestings[0].events[0].id;

    let event = fx
        .coordinator
        .get_reference_event(&event_id)
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, EventKind::Created);
    assert_eq!(event.reference.titles[0].value, "Premier article");
}
