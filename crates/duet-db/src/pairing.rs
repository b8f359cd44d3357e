use anyhow::Result;
use chrono::{DateTime, Utc};
use duet_core::model::{Invite, Relationship, RelationshipId, RelationshipStatus, UserId};
use duet_core::store::{InviteStore, RelationshipStore};
use duet_core::StoreResult;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::models::{InviteRow, PartnerRow, RelationshipRow, fmt_ts};
use crate::{Database, OptionalExt, store_error};

const INVITE_COLUMNS: &str =
    "code, created_by, first_meeting_date, is_used, expires_at, created_at, updated_at";

const RELATIONSHIP_COLUMNS: &str =
    "r.id, r.status, r.invite_code, r.first_meeting_date, r.created_at, r.updated_at";

impl Database {
    /// Delete invites whose expiry has passed. SQLite has no TTL index, so
    /// the server calls this periodically.
    pub fn purge_expired_invites(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM invite_codes WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [fmt_ts(now)],
            )?;
            Ok(removed)
        })
    }
}

fn invite_row(row: &Row<'_>) -> rusqlite::Result<InviteRow> {
    Ok(InviteRow {
        code: row.get(0)?,
        created_by: row.get(1)?,
        first_meeting_date: row.get(2)?,
        is_used: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn relationship_row(row: &Row<'_>) -> rusqlite::Result<RelationshipRow> {
    Ok(RelationshipRow {
        id: row.get(0)?,
        status: row.get(1)?,
        invite_code: row.get(2)?,
        first_meeting_date: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn load_partners(conn: &Connection, relationship_id: &str) -> Result<Vec<PartnerRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, joined_at FROM relationship_partners
         WHERE relationship_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([relationship_id], |row| {
            Ok(PartnerRow {
                user_id: row.get(0)?,
                joined_at: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn hydrate(conn: &Connection, rows: Vec<RelationshipRow>) -> Result<Vec<Relationship>> {
    rows.into_iter()
        .map(|row| {
            let partners = load_partners(conn, &row.id)?;
            row.into_relationship(partners)
        })
        .collect()
}

impl InviteStore for Database {
    fn insert_invite(&self, invite: &Invite) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO invite_codes (code, created_by, first_meeting_date, is_used, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    invite.code,
                    invite.created_by.to_string(),
                    invite.first_meeting_date.to_string(),
                    invite.is_used,
                    invite.expires_at.map(fmt_ts),
                    fmt_ts(invite.created_at),
                    fmt_ts(invite.updated_at),
                ],
            )?;
            Ok(())
        })
        .map_err(store_error)
    }

    fn find_invite(&self, code: &str) -> StoreResult<Option<Invite>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {INVITE_COLUMNS} FROM invite_codes WHERE code = ?1");
            conn.query_row(&sql, [code], invite_row).optional()
        })?;
        Ok(row.map(InviteRow::into_invite).transpose()?)
    }

    fn claim_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Invite>> {
        let row = self.with_conn(|conn| {
            let sql = format!(
                "UPDATE invite_codes SET is_used = 1, updated_at = ?2
                 WHERE code = ?1 AND is_used = 0 AND (expires_at IS NULL OR expires_at > ?2)
                 RETURNING {INVITE_COLUMNS}"
            );
            conn.query_row(&sql, rusqlite::params![code, fmt_ts(now)], invite_row)
                .optional()
        })?;
        if row.is_none() {
            debug!("claim on invite {code} matched nothing");
        }
        Ok(row.map(InviteRow::into_invite).transpose()?)
    }

    fn release_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE invite_codes SET is_used = 0, updated_at = ?2 WHERE code = ?1",
                rusqlite::params![code, fmt_ts(now)],
            )?;
            Ok(())
        })?;
        Ok(())
    }
}

impl RelationshipStore for Database {
    fn insert_relationship(&self, relationship: &Relationship) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = relationship.id.to_string();
            tx.execute(
                "INSERT INTO relationships (id, status, invite_code, first_meeting_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id,
                    relationship.status.as_str(),
                    relationship.invite_code,
                    relationship.first_meeting_date.map(|d| d.to_string()),
                    fmt_ts(relationship.created_at),
                    fmt_ts(relationship.updated_at),
                ],
            )?;
            for (position, partner) in relationship.partners.iter().enumerate() {
                tx.execute(
                    "INSERT INTO relationship_partners (relationship_id, user_id, position, joined_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        id,
                        partner.user_id.to_string(),
                        position as i64,
                        fmt_ts(partner.joined_at),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(store_error)
    }

    fn find_relationship(&self, id: RelationshipId) -> StoreResult<Option<Relationship>> {
        let found = self.with_conn(|conn| {
            let sql = format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships r WHERE r.id = ?1");
            let row = conn.query_row(&sql, [id.to_string()], relationship_row).optional()?;
            Ok(hydrate(conn, row.into_iter().collect())?.pop())
        })?;
        Ok(found)
    }

    fn find_active_by_user(&self, user_id: UserId) -> StoreResult<Vec<Relationship>> {
        let found = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships r
                 JOIN relationship_partners p ON p.relationship_id = r.id
                 WHERE p.user_id = ?1 AND r.status = ?2
                 ORDER BY r.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id.to_string(), RelationshipStatus::Active.as_str()],
                    relationship_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            hydrate(conn, rows)
        })?;
        Ok(found)
    }

    fn transition_status(
        &self,
        id: RelationshipId,
        from: RelationshipStatus,
        to: RelationshipStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE relationships SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
                rusqlite::params![id.to_string(), from.as_str(), to.as_str(), fmt_ts(now)],
            )?;
            Ok(changed)
        })?;
        Ok(changed == 1)
    }
}
