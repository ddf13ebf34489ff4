/// A schema migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATION_001: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Persons: retrieval subjects, resolved across submissions by
-- identifier overlap
CREATE TABLE IF NOT EXISTS persons (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Each (kind, value) pair belongs to exactly one person
CREATE TABLE IF NOT EXISTS person_identifiers (
    person_id TEXT NOT NULL REFERENCES persons(id),
    kind TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (kind, value)
);

CREATE INDEX IF NOT EXISTS idx_person_identifiers_person ON person_identifiers(person_id);

-- Retrievals: one aggregation request per person
CREATE TABLE IF NOT EXISTS retrievals (
    id TEXT PRIMARY KEY,
    person TEXT NOT NULL,
    event_kinds TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Harvestings: one source's run within a retrieval
CREATE TABLE IF NOT EXISTS harvestings (
    id TEXT PRIMARY KEY,
    retrieval_id TEXT NOT NULL REFERENCES retrievals(id),
    harvester TEXT NOT NULL,
    state TEXT NOT NULL,
    error TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_harvestings_retrieval_id ON harvestings(retrieval_id);
CREATE INDEX IF NOT EXISTS idx_harvestings_state ON harvestings(state);

-- References ("bib_" prefix: REFERENCES is an SQL keyword)
CREATE TABLE IF NOT EXISTS bib_references (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    source_identifier TEXT NOT NULL,
    person_id TEXT NOT NULL,
    harvester_version TEXT NOT NULL,
    titles TEXT NOT NULL,
    abstracts TEXT NOT NULL,
    manifestations TEXT NOT NULL,
    document_type TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (source, source_identifier)
);

CREATE INDEX IF NOT EXISTS idx_references_person ON bib_references(person_id, source);
CREATE INDEX IF NOT EXISTS idx_references_deleted ON bib_references(deleted);

-- Contributors: permanent, keyed per source identifier space
CREATE TABLE IF NOT EXISTS contributors (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    source_identifier TEXT,
    name TEXT NOT NULL,
    name_variants TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- At most one live row per identified contributor, regardless of
-- concurrent retrievals; name-only rows are exempt.
CREATE UNIQUE INDEX IF NOT EXISTS idx_contributors_source_identifier
    ON contributors(source, source_identifier)
    WHERE source_identifier IS NOT NULL;

-- Contributions: fully recomputed per reference at each harvest
CREATE TABLE IF NOT EXISTS contributions (
    reference_id TEXT NOT NULL REFERENCES bib_references(id),
    contributor_id TEXT NOT NULL REFERENCES contributors(id),
    contributor_name TEXT NOT NULL,
    role TEXT NOT NULL,
    rank INTEGER NOT NULL,
    PRIMARY KEY (reference_id, rank),
    UNIQUE (reference_id, contributor_id, role)
);

-- Reference events: append-only audit trail
CREATE TABLE IF NOT EXISTS reference_events (
    id TEXT PRIMARY KEY,
    harvesting_id TEXT NOT NULL REFERENCES harvestings(id),
    kind TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    reference TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reference_events_harvesting ON reference_events(harvesting_id);
CREATE INDEX IF NOT EXISTS idx_reference_events_kind ON reference_events(kind);
"#;

/// All migrations, in order.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: MIGRATION_001,
}];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            last = migration.version;
        }
    }
}
