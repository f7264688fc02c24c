//! SQL schema for the popsync snapshot cache.
//!
//! Every row belongs to one snapshot; a snapshot is one run's view of one
//! base filter. Deleting a snapshot cascades to its rows.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id          TEXT PRIMARY KEY,
    filter_signature     TEXT NOT NULL,   -- sha256 of the base filter
    instance_of          TEXT NOT NULL,
    country              TEXT NOT NULL,
    identifying_property TEXT NOT NULL,
    created_at           TEXT NOT NULL,   -- RFC 3339 UTC
    primed_at            TEXT             -- NULL until the code index is loaded
);

-- Code index: from the bulk query, then rebuilt per entity on full fetch.
CREATE TABLE IF NOT EXISTS codes (
    snapshot_id TEXT    NOT NULL REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    code        TEXT    NOT NULL,
    entity_id   INTEGER NOT NULL,         -- Q-number
    PRIMARY KEY (snapshot_id, code, entity_id)
);

-- Entities holding a complete fact snapshot.
CREATE TABLE IF NOT EXISTS entities (
    snapshot_id TEXT    NOT NULL REFERENCES snapshots(snapshot_id) ON DELETE CASCADE,
    entity_id   INTEGER NOT NULL,
    stored_at   TEXT    NOT NULL,
    PRIMARY KEY (snapshot_id, entity_id)
);

CREATE TABLE IF NOT EXISTS facts (
    snapshot_id     TEXT    NOT NULL,
    entity_id       INTEGER NOT NULL,
    position        INTEGER NOT NULL,     -- statement order on the entity
    statement_id    TEXT,                 -- NULL for planned, unwritten facts
    property        TEXT    NOT NULL,
    rank            TEXT    NOT NULL,     -- 'preferred' | 'normal' | 'deprecated'
    value_json      TEXT    NOT NULL,
    qualifiers_json TEXT    NOT NULL DEFAULT '[]',
    references_json TEXT    NOT NULL DEFAULT '[]',
    PRIMARY KEY (snapshot_id, entity_id, position),
    FOREIGN KEY (snapshot_id, entity_id)
        REFERENCES entities(snapshot_id, entity_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS codes_lookup_idx   ON codes(snapshot_id, code);
CREATE INDEX IF NOT EXISTS facts_property_idx ON facts(snapshot_id, entity_id, property);
CREATE INDEX IF NOT EXISTS snapshots_filter_idx ON snapshots(filter_signature);

PRAGMA user_version = 1;
";
