//! SQL schema for the SQLite backend.
//!
//! Executed once at connection startup; idempotent thanks to
//! `CREATE TABLE IF NOT EXISTS`. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- The event log is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    global_position INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id        TEXT NOT NULL UNIQUE,
    stream_id       TEXT NOT NULL,
    stream_type     TEXT NOT NULL,
    version         INTEGER NOT NULL,
    event_type      TEXT NOT NULL,
    payload         TEXT NOT NULL,      -- JSON
    actor           TEXT,
    occurred_at     TEXT NOT NULL,      -- RFC 3339 UTC, fixed precision
    UNIQUE (stream_id, version)
);

CREATE INDEX IF NOT EXISTS events_stream_idx      ON events(stream_id, version);
CREATE INDEX IF NOT EXISTS events_type_idx        ON events(event_type);
CREATE INDEX IF NOT EXISTS events_occurred_idx    ON events(occurred_at);

-- Read models: written only by the projector, rebuildable from the log.

CREATE TABLE IF NOT EXISTS persons (
    id               TEXT PRIMARY KEY,
    given_names      TEXT NOT NULL,
    surname          TEXT NOT NULL,
    sex              TEXT,
    birth_date       TEXT,
    death_date       TEXT,
    notes            TEXT,
    parent_family_id TEXT,
    version          INTEGER NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS families (
    id            TEXT PRIMARY KEY,
    husband_id    TEXT,
    wife_id       TEXT,
    marriage_date TEXT,
    children      TEXT NOT NULL DEFAULT '[]',   -- JSON array of uuids
    version       INTEGER NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sources (
    id             TEXT PRIMARY KEY,
    title          TEXT NOT NULL,
    author         TEXT,
    publication    TEXT,
    citation_count INTEGER NOT NULL DEFAULT 0,
    version        INTEGER NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS citations (
    id           TEXT PRIMARY KEY,
    source_id    TEXT NOT NULL,
    source_title TEXT NOT NULL DEFAULT '',
    page         TEXT,
    quality      INTEGER,
    version      INTEGER NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS media (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    file_name  TEXT NOT NULL,
    mime_type  TEXT,
    version    INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS persons_surname_idx    ON persons(surname, given_names);
CREATE INDEX IF NOT EXISTS citations_source_idx   ON citations(source_id);

PRAGMA user_version = 1;
";
