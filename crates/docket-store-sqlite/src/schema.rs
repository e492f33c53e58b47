//! SQL schema for the Docket SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `PRAGMA user_version` number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS packages (
    package_id   TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,      -- 'contract' | 'rate'
    state_number INTEGER NOT NULL,   -- state-assigned sequence, per kind
    created_at   TEXT NOT NULL,      -- ISO 8601 UTC
    UNIQUE (kind, state_number)
);

-- Revision rows are never deleted. The one unsubmitted draft per package is
-- the only row whose form columns may be overwritten; submit stamps the
-- submitted_* columns exactly once and the row is frozen from then on.
CREATE TABLE IF NOT EXISTS revisions (
    revision_id      TEXT PRIMARY KEY,
    package_id       TEXT NOT NULL REFERENCES packages(package_id),
    created_at       TEXT NOT NULL,
    form_type        TEXT NOT NULL,   -- discriminant of FormData variant
    form_json        TEXT NOT NULL,   -- JSON payload (inner data only)
    submitted_at     TEXT,
    submitted_by     TEXT,
    submitted_reason TEXT,
    unlocked_at      TEXT,
    unlocked_by      TEXT,
    unlocked_reason  TEXT
);

-- At most one draft per package.
CREATE UNIQUE INDEX IF NOT EXISTS revisions_one_draft_idx
    ON revisions(package_id) WHERE submitted_at IS NULL;

-- Interval-stamped links between contract and rate revisions.
--   valid_after IS NULL      => pending: a draft's working association
--   valid_after IS NOT NULL  => activated fact; only valid_until may change
-- A row with valid_after = valid_until and is_removal = 1 marks an explicit
-- disconnection at that instant.
CREATE TABLE IF NOT EXISTS revision_links (
    link_id              TEXT PRIMARY KEY,
    contract_revision_id TEXT NOT NULL REFERENCES revisions(revision_id),
    rate_revision_id     TEXT NOT NULL REFERENCES revisions(revision_id),
    valid_after          TEXT,
    valid_until          TEXT,
    is_removal           INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS revisions_package_idx ON revisions(package_id);
CREATE INDEX IF NOT EXISTS links_contract_idx ON revision_links(contract_revision_id);
CREATE INDEX IF NOT EXISTS links_rate_idx     ON revision_links(rate_revision_id);

PRAGMA user_version = 1;
";
