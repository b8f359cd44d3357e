use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                name                TEXT NOT NULL,
                password            TEXT NOT NULL,
                avatar              TEXT,
                relationship_id     TEXT,
                relationship_days   INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE invite_codes (
                code                TEXT PRIMARY KEY,
                created_by          TEXT NOT NULL REFERENCES users(id),
                first_meeting_date  TEXT NOT NULL,
                is_used             INTEGER NOT NULL DEFAULT 0,
                expires_at          TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_invite_codes_expires ON invite_codes(expires_at);

            CREATE TABLE relationships (
                id                  TEXT PRIMARY KEY,
                status              TEXT NOT NULL,
                invite_code         TEXT NOT NULL,
                first_meeting_date  TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE relationship_partners (
                relationship_id     TEXT NOT NULL REFERENCES relationships(id) ON DELETE CASCADE,
                user_id             TEXT NOT NULL REFERENCES users(id),
                position            INTEGER NOT NULL,
                joined_at           TEXT NOT NULL,
                PRIMARY KEY (relationship_id, user_id)
            );

            CREATE INDEX idx_partners_user ON relationship_partners(user_id);

            CREATE TABLE events (
                id                  TEXT PRIMARY KEY,
                relationship_id     TEXT NOT NULL REFERENCES relationships(id),
                created_by          TEXT NOT NULL REFERENCES users(id),
                title               TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                date                TEXT NOT NULL,
                kind                TEXT NOT NULL,
                is_public           INTEGER NOT NULL DEFAULT 0,
                image               TEXT,
                source_type         TEXT NOT NULL DEFAULT 'manual',
                source_id           TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_events_relationship ON events(relationship_id, date);

            CREATE TABLE whispers (
                id                  TEXT PRIMARY KEY,
                relationship_id     TEXT NOT NULL REFERENCES relationships(id),
                created_by          TEXT NOT NULL REFERENCES users(id),
                kind                TEXT NOT NULL,
                text                TEXT NOT NULL,
                recurrence          TEXT NOT NULL,
                date                TEXT NOT NULL,
                is_done             INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_whispers_relationship ON whispers(relationship_id, date);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
