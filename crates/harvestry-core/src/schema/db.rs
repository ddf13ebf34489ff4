use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;

use crate::error::Result;
use crate::model::{
    Contribution, Contributor, ContributorId, EventKind, Harvesting, HarvestingId,
    HarvestingState, Person, PersonId, PersonIdentifier, Reference, ReferenceEvent,
    ReferenceEventId, ReferenceId, Retrieval, RetrievalId,
};

use super::migrations::MIGRATIONS;

/// A database connection with CRUD methods for harvestry entities.
///
/// Each concurrent harvesting job opens its own `Database`; WAL mode
/// plus a busy timeout serialize writes on the natural keys across
/// connections.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a single transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                tracing::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }
}

fn parse_datetime(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(Into::into)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_uuid(value: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(value: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

// Person resolution
impl Database {
    /// Resolve a submitted person against the stored person registry.
    ///
    /// Matches the submitted person's exact id first, then any of its
    /// `(kind, value)` identifier pairs; the first match wins. On a
    /// match the stored person adopts the submitted display name and
    /// any identifier pairs it did not already carry (a pair already
    /// claimed by another person stays where it is). Without a match
    /// the person is inserted as submitted. Returns the person as
    /// stored, so successive retrievals for the same human share one
    /// `person_id` scope.
    pub fn resolve_person(&self, person: &Person) -> Result<Person> {
        let now = Utc::now().to_rfc3339();

        let Some(id) = self.find_person_id(person)? else {
            self.conn.execute(
                "INSERT INTO persons (id, display_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![person.id.to_string(), person.display_name, now],
            )?;
            for identifier in &person.identifiers {
                self.conn.execute(
                    "INSERT INTO person_identifiers (person_id, kind, value)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        person.id.to_string(),
                        identifier.kind.as_str(),
                        identifier.value
                    ],
                )?;
            }
            return Ok(person.clone());
        };

        self.conn.execute(
            "UPDATE persons SET display_name = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id.to_string(), person.display_name, now],
        )?;
        for identifier in &person.identifiers {
            self.conn.execute(
                "INSERT INTO person_identifiers (person_id, kind, value)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (kind, value) DO NOTHING",
                rusqlite::params![id.to_string(), identifier.kind.as_str(), identifier.value],
            )?;
        }

        Ok(Person {
            id,
            display_name: person.display_name.clone(),
            identifiers: self.list_person_identifiers(&id)?,
        })
    }

    fn find_person_id(&self, person: &Person) -> Result<Option<PersonId>> {
        let mut by_id = self.conn.prepare("SELECT id FROM persons WHERE id = ?1")?;
        let mut rows = by_id.query_map([person.id.to_string()], |row| row.get::<_, String>(0))?;
        if let Some(id) = rows.next().transpose()? {
            return Ok(Some(PersonId::from_uuid(parse_uuid(&id)?)));
        }

        let mut by_identifier = self
            .conn
            .prepare("SELECT person_id FROM person_identifiers WHERE kind = ?1 AND value = ?2")?;
        for identifier in &person.identifiers {
            let mut rows = by_identifier.query_map(
                rusqlite::params![identifier.kind.as_str(), identifier.value],
                |row| row.get::<_, String>(0),
            )?;
            if let Some(id) = rows.next().transpose()? {
                return Ok(Some(PersonId::from_uuid(parse_uuid(&id)?)));
            }
        }
        Ok(None)
    }

    fn list_person_identifiers(&self, person_id: &PersonId) -> Result<Vec<PersonIdentifier>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, value FROM person_identifiers
             WHERE person_id = ?1 ORDER BY kind, value",
        )?;
        let identifiers = stmt
            .query_map([person_id.to_string()], |row| {
                Ok(PersonIdentifier {
                    kind: parse_enum(&row.get::<_, String>(0)?)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(identifiers)
    }
}

// Retrieval CRUD
impl Database {
    /// Insert a retrieval shell (harvestings are inserted separately).
    pub fn insert_retrieval(&self, retrieval: &Retrieval) -> Result<()> {
        self.conn.execute(
            "INSERT INTO retrievals (id, person, event_kinds, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                retrieval.id.to_string(),
                serde_json::to_string(&retrieval.person)?,
                serde_json::to_string(&retrieval.event_kinds)?,
                retrieval.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a retrieval with its harvestings, or `None` if unknown.
    pub fn get_retrieval(&self, id: &RetrievalId) -> Result<Option<Retrieval>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, person, event_kinds, created_at FROM retrievals WHERE id = ?1")?;
        let mut rows = stmt.query_map([id.to_string()], |row| {
            let person: Person = parse_json(&row.get::<_, String>(1)?)?;
            let event_kinds: Vec<EventKind> = parse_json(&row.get::<_, String>(2)?)?;
            Ok(Retrieval {
                id: RetrievalId::from_uuid(parse_uuid(&row.get::<_, String>(0)?)?),
                person,
                event_kinds,
                harvestings: Vec::new(),
                created_at: parse_datetime(&row.get::<_, String>(3)?)?,
            })
        })?;

        let Some(retrieval) = rows.next().transpose()? else {
            return Ok(None);
        };
        let mut retrieval = retrieval;
        retrieval.harvestings = self.list_harvestings_for_retrieval(id)?;
        Ok(Some(retrieval))
    }
}

// Harvesting CRUD
impl Database {
    /// Insert a pending harvesting shell.
    pub fn insert_harvesting(&self, harvesting: &Harvesting) -> Result<()> {
        self.conn.execute(
            "INSERT INTO harvestings (id, retrieval_id, harvester, state, error, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                harvesting.id.to_string(),
                harvesting.retrieval_id.to_string(),
                harvesting.harvester,
                harvesting.state.as_str(),
                harvesting.error,
                harvesting.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Update the state of a harvesting, retaining optional error detail.
    pub fn update_harvesting_state(
        &self,
        id: &HarvestingId,
        state: HarvestingState,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE harvestings SET state = ?2, error = ?3 WHERE id = ?1",
            rusqlite::params![id.to_string(), state.as_str(), error],
        )?;
        Ok(())
    }

    /// Get a harvesting by id.
    pub fn get_harvesting(&self, id: &HarvestingId) -> Result<Option<Harvesting>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, retrieval_id, harvester, state, error, timestamp
             FROM harvestings WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id.to_string()], row_to_harvesting)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn list_harvestings_for_retrieval(&self, retrieval_id: &RetrievalId) -> Result<Vec<Harvesting>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, retrieval_id, harvester, state, error, timestamp
             FROM harvestings WHERE retrieval_id = ?1 ORDER BY harvester",
        )?;
        let harvestings = stmt
            .query_map([retrieval_id.to_string()], row_to_harvesting)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(harvestings)
    }
}

fn row_to_harvesting(row: &rusqlite::Row) -> rusqlite::Result<Harvesting> {
    Ok(Harvesting {
        id: HarvestingId::from_uuid(parse_uuid(&row.get::<_, String>(0)?)?),
        retrieval_id: RetrievalId::from_uuid(parse_uuid(&row.get::<_, String>(1)?)?),
        harvester: row.get(2)?,
        state: parse_enum(&row.get::<_, String>(3)?)?,
        error: row.get(4)?,
        timestamp: parse_datetime(&row.get::<_, String>(5)?)?,
    })
}

// Reference CRUD
impl Database {
    /// Insert or update a reference keyed by `(source, source_identifier)`.
    ///
    /// On conflict the stored row keeps its id; the mutable fields,
    /// person link, deleted flag, and `updated_at` are overwritten.
    /// Contributions are stored separately via [`Self::replace_contributions`].
    pub fn upsert_reference(&self, reference: &Reference) -> Result<()> {
        self.conn.execute(
            "INSERT INTO bib_references (
                id, source, source_identifier, person_id, harvester_version,
                titles, abstracts, manifestations, document_type, deleted,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (source, source_identifier) DO UPDATE SET
                person_id = excluded.person_id,
                harvester_version = excluded.harvester_version,
                titles = excluded.titles,
                abstracts = excluded.abstracts,
                manifestations = excluded.manifestations,
                document_type = excluded.document_type,
                deleted = excluded.deleted,
                updated_at = excluded.updated_at",
            rusqlite::params![
                reference.id.to_string(),
                reference.source,
                reference.source_identifier,
                reference.person_id.to_string(),
                reference.harvester_version,
                serde_json::to_string(&reference.titles)?,
                serde_json::to_string(&reference.abstracts)?,
                serde_json::to_string(&reference.manifestations)?,
                reference.document_type,
                reference.deleted,
                reference.created_at.to_rfc3339(),
                reference.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a reference (with contributions) by its natural key,
    /// regardless of its deleted flag.
    pub fn get_reference_by_key(
        &self,
        source: &str,
        source_identifier: &str,
    ) -> Result<Option<Reference>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_identifier, person_id, harvester_version,
                    titles, abstracts, manifestations, document_type, deleted,
                    created_at, updated_at
             FROM bib_references
             WHERE source = ?1 AND source_identifier = ?2",
        )?;
        let mut rows = stmt.query_map([source, source_identifier], row_to_reference)?;
        let Some(reference) = rows.next().transpose()? else {
            return Ok(None);
        };
        let mut reference = reference;
        reference.contributions = self.list_contributions(&reference.id)?;
        Ok(Some(reference))
    }

    /// All non-deleted references previously stored for `(source, person)`.
    pub fn list_current_references(
        &self,
        source: &str,
        person_id: &crate::model::PersonId,
    ) -> Result<Vec<Reference>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_identifier, person_id, harvester_version,
                    titles, abstracts, manifestations, document_type, deleted,
                    created_at, updated_at
             FROM bib_references
             WHERE source = ?1 AND person_id = ?2 AND deleted = 0
             ORDER BY source_identifier",
        )?;
        let mut references = stmt
            .query_map(
                rusqlite::params![source, person_id.to_string()],
                row_to_reference,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for reference in &mut references {
            reference.contributions = self.list_contributions(&reference.id)?;
        }
        Ok(references)
    }

    /// Set a reference's deleted flag. The row and its history remain.
    pub fn mark_reference_deleted(&self, id: &ReferenceId) -> Result<()> {
        self.conn.execute(
            "UPDATE bib_references SET deleted = 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Replace all contribution rows for a reference.
    pub fn replace_contributions(
        &self,
        reference_id: &ReferenceId,
        contributions: &[Contribution],
    ) -> Result<()> {
        self.conn.execute(
            "DELETE FROM contributions WHERE reference_id = ?1",
            [reference_id.to_string()],
        )?;
        for contribution in contributions {
            self.conn.execute(
                "INSERT INTO contributions (reference_id, contributor_id, contributor_name, role, rank)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    reference_id.to_string(),
                    contribution.contributor_id.to_string(),
                    contribution.contributor_name,
                    contribution.role,
                    contribution.rank,
                ],
            )?;
        }
        Ok(())
    }

    /// Contribution rows for a reference, in rank order.
    pub fn list_contributions(&self, reference_id: &ReferenceId) -> Result<Vec<Contribution>> {
        let mut stmt = self.conn.prepare(
            "SELECT contributor_id, contributor_name, role, rank
             FROM contributions WHERE reference_id = ?1 ORDER BY rank",
        )?;
        let contributions = stmt
            .query_map([reference_id.to_string()], |row| {
                Ok(Contribution {
                    contributor_id: ContributorId::from_uuid(parse_uuid(
                        &row.get::<_, String>(0)?,
                    )?),
                    contributor_name: row.get(1)?,
                    role: row.get(2)?,
                    rank: u32::try_from(row.get::<_, i64>(3)?).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Integer,
                            Box::new(e),
                        )
                    })?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contributions)
    }
}

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    Ok(Reference {
        id: ReferenceId::from_uuid(parse_uuid(&row.get::<_, String>(0)?)?),
        source: row.get(1)?,
        source_identifier: row.get(2)?,
        person_id: crate::model::PersonId::from_uuid(parse_uuid(&row.get::<_, String>(3)?)?),
        harvester_version: row.get(4)?,
        titles: parse_json(&row.get::<_, String>(5)?)?,
        abstracts: parse_json(&row.get::<_, String>(6)?)?,
        manifestations: parse_json(&row.get::<_, String>(7)?)?,
        document_type: row.get(8)?,
        deleted: row.get(9)?,
        contributions: Vec::new(),
        created_at: parse_datetime(&row.get::<_, String>(10)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(11)?)?,
    })
}

// Contributor CRUD
impl Database {
    /// Insert or update a contributor keyed by `(source, source_identifier)`.
    ///
    /// Only for contributors with a source identifier; the partial
    /// unique index is the conflict target, so concurrent retrievals
    /// converge on a single row per key. The stored row keeps its id,
    /// and on conflict the incoming name and variants are merged into
    /// the stored row rather than overwriting it, so a name variant
    /// recorded by one retrieval survives a concurrent upsert.
    pub fn upsert_contributor(&self, contributor: &Contributor) -> Result<()> {
        debug_assert!(contributor.source_identifier.is_some());
        self.transaction(|db| {
            db.conn.execute(
                "INSERT INTO contributors (
                    id, source, source_identifier, name, name_variants, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (source, source_identifier) WHERE source_identifier IS NOT NULL
                DO NOTHING",
                rusqlite::params![
                    contributor.id.to_string(),
                    contributor.source,
                    contributor.source_identifier,
                    contributor.name,
                    serde_json::to_string(&contributor.name_variants)?,
                    contributor.created_at.to_rfc3339(),
                    contributor.updated_at.to_rfc3339(),
                ],
            )?;
            if db.conn.changes() > 0 {
                return Ok(());
            }

            // The key already exists: merge into the stored row.
            let identifier = contributor.source_identifier.as_deref().unwrap_or_default();
            let Some(mut stored) =
                db.get_contributor_by_identifier(&contributor.source, identifier)?
            else {
                return Ok(());
            };
            stored.record_name(&contributor.name);
            for variant in &contributor.name_variants {
                if *variant != stored.name && !stored.name_variants.contains(variant) {
                    stored.name_variants.push(variant.clone());
                }
            }
            db.conn.execute(
                "UPDATE contributors SET name = ?2, name_variants = ?3, updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.name,
                    serde_json::to_string(&stored.name_variants)?,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Insert a name-only contributor row.
    pub fn insert_contributor(&self, contributor: &Contributor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO contributors (
                id, source, source_identifier, name, name_variants, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                contributor.id.to_string(),
                contributor.source,
                contributor.source_identifier,
                contributor.name,
                serde_json::to_string(&contributor.name_variants)?,
                contributor.created_at.to_rfc3339(),
                contributor.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a contributor by its source-scoped identifier.
    pub fn get_contributor_by_identifier(
        &self,
        source: &str,
        source_identifier: &str,
    ) -> Result<Option<Contributor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_identifier, name, name_variants, created_at, updated_at
             FROM contributors
             WHERE source = ?1 AND source_identifier = ?2",
        )?;
        let mut rows = stmt.query_map([source, source_identifier], row_to_contributor)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Get a contributor by id.
    pub fn get_contributor(&self, id: &ContributorId) -> Result<Option<Contributor>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, source_identifier, name, name_variants, created_at, updated_at
             FROM contributors WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id.to_string()], row_to_contributor)?;
        rows.next().transpose().map_err(Into::into)
    }
}

fn row_to_contributor(row: &rusqlite::Row) -> rusqlite::Result<Contributor> {
    Ok(Contributor {
        id: ContributorId::from_uuid(parse_uuid(&row.get::<_, String>(0)?)?),
        source: row.get(1)?,
        source_identifier: row.get(2)?,
        name: row.get(3)?,
        name_variants: parse_json(&row.get::<_, String>(4)?)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(6)?)?,
    })
}

// ReferenceEvent CRUD
impl Database {
    /// Append a reference event. Events are never updated or deleted.
    pub fn insert_reference_event(&self, event: &ReferenceEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO reference_events (id, harvesting_id, kind, timestamp, reference)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                event.id.to_string(),
                event.harvesting_id.to_string(),
                event.kind.as_str(),
                event.timestamp.to_rfc3339(),
                serde_json::to_string(&event.reference)?,
            ],
        )?;
        Ok(())
    }

    /// Get one historical event with its full reference snapshot.
    pub fn get_reference_event(&self, id: &ReferenceEventId) -> Result<Option<ReferenceEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, harvesting_id, kind, timestamp, reference
             FROM reference_events WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id.to_string()], row_to_event)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Events for one harvesting, in emission order.
    pub fn list_events_for_harvesting(
        &self,
        harvesting_id: &HarvestingId,
    ) -> Result<Vec<ReferenceEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, harvesting_id, kind, timestamp, reference
             FROM reference_events WHERE harvesting_id = ?1 ORDER BY rowid",
        )?;
        let events = stmt
            .query_map([harvesting_id.to_string()], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<ReferenceEvent> {
    Ok(ReferenceEvent {
        id: ReferenceEventId::from_uuid(parse_uuid(&row.get::<_, String>(0)?)?),
        harvesting_id: HarvestingId::from_uuid(parse_uuid(&row.get::<_, String>(1)?)?),
        kind: parse_enum(&row.get::<_, String>(2)?)?,
        timestamp: parse_datetime(&row.get::<_, String>(3)?)?,
        reference: parse_json(&row.get::<_, String>(4)?)?,
    })
}
