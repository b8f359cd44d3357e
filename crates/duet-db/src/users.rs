use anyhow::Result;
use chrono::{DateTime, Utc};
use duet_core::event::EventImage;
use duet_core::model::{RelationshipLink, User, UserId};
use duet_core::store::UserStore;
use duet_core::StoreResult;
use rusqlite::{Connection, Row};

use crate::models::{UserRow, fmt_ts};
use crate::{Database, OptionalExt, store_error};

const USER_COLUMNS: &str = "id, username, email, name, password, avatar, \
     relationship_id, relationship_days, created_at, updated_at";

/// A registration that has already been validated and hashed.
pub struct NewAccount<'a> {
    pub id: UserId,
    pub username: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: &'a str,
}

impl Database {
    // -- Accounts --

    /// Fails with `StoreError::Conflict` if the username or email is taken.
    pub fn create_user(&self, account: &NewAccount<'_>, now: DateTime<Utc>) -> StoreResult<()> {
        self.with_conn(|conn| {
            let now = fmt_ts(now);
            conn.execute(
                "INSERT INTO users (id, username, email, name, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    account.id.to_string(),
                    account.username,
                    account.email,
                    account.name,
                    account.password_hash,
                    now,
                ],
            )?;
            Ok(())
        })
        .map_err(store_error)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// Apply a profile edit. `None` leaves a field alone and `avatar: Some(None)`
    /// removes the avatar. Returns false if the user does not exist.
    pub fn update_profile(
        &self,
        id: UserId,
        name: Option<&str>,
        avatar: Option<Option<&EventImage>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let avatar_json = match avatar {
            Some(Some(image)) => Some(serde_json::to_string(image)?),
            _ => None,
        };
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET name = COALESCE(?2, name),
                     avatar = CASE WHEN ?3 THEN ?4 ELSE avatar END,
                     updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), name, avatar.is_some(), avatar_json, fmt_ts(now)],
            )?;
            Ok(changed == 1)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], user_row).optional()?;
    Ok(row)
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        name: row.get(3)?,
        password: row.get(4)?,
        avatar: row.get(5)?,
        relationship_id: row.get(6)?,
        relationship_days: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl UserStore for Database {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = self.get_user_by_id(id)?;
        Ok(row.map(UserRow::into_user).transpose()?)
    }

    fn set_relationship_link(
        &self,
        id: UserId,
        link: Option<RelationshipLink>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET relationship_id = ?2, relationship_days = ?3, updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![
                    id.to_string(),
                    link.map(|l| l.relationship_id.to_string()),
                    link.map_or(0, |l| l.relationship_days),
                    fmt_ts(now),
                ],
            )?;
            Ok(changed)
        })?;
        Ok(changed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::StoreError;
    use duet_core::event::ImageKind;
    use duet_core::model::RelationshipId;

    fn account<'a>(id: UserId, username: &'a str, email: &'a str) -> NewAccount<'a> {
        NewAccount {
            id,
            username,
            email,
            name: "Alice",
            password_hash: "hash",
        }
    }

    #[test]
    fn duplicate_username_or_email_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_user(&account(UserId::random(), "alice", "alice@example.com"), now)
            .unwrap();

        let err = db
            .create_user(&account(UserId::random(), "alice", "other@example.com"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let err = db
            .create_user(&account(UserId::random(), "alicia", "alice@example.com"), now)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let row = db.get_user_by_email("alice@example.com").unwrap().unwrap();
        assert_eq!(row.username, "alice");
    }

    #[test]
    fn profile_edits_touch_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::random();
        db.create_user(&account(id, "alice", "alice@example.com"), Utc::now())
            .unwrap();
        let avatar = EventImage {
            kind: ImageKind::Base64,
            data: "aGVsbG8=".into(),
            filename: "avatar.jpg".into(),
            size: 5,
            uploaded_at: Utc::now(),
        };

        assert!(db.update_profile(id, None, Some(Some(&avatar)), Utc::now()).unwrap());
        let user = db.find_user(id).unwrap().unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.avatar.unwrap().data, "aGVsbG8=");

        assert!(db.update_profile(id, Some("Alice B"), None, Utc::now()).unwrap());
        let user = db.find_user(id).unwrap().unwrap();
        assert_eq!(user.name, "Alice B");
        assert!(user.avatar.is_some());

        assert!(db.update_profile(id, None, Some(None), Utc::now()).unwrap());
        assert_eq!(db.find_user(id).unwrap().unwrap().avatar, None);

        assert!(!db.update_profile(UserId::random(), Some("x"), None, Utc::now()).unwrap());
    }

    #[test]
    fn relationship_link_is_written_and_cleared() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::random();
        db.create_user(&account(id, "alice", "alice@example.com"), Utc::now())
            .unwrap();
        assert_eq!(db.find_user(id).unwrap().unwrap().relationship, None);

        let link = RelationshipLink {
            relationship_id: RelationshipId::random(),
            relationship_days: 3,
        };
        assert!(db.set_relationship_link(id, Some(link), Utc::now()).unwrap());
        assert_eq!(db.find_user(id).unwrap().unwrap().relationship, Some(link));

        assert!(db.set_relationship_link(id, None, Utc::now()).unwrap());
        let row = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(row.relationship_id, None);
        assert_eq!(row.relationship_days, 0);

        assert!(!db.set_relationship_link(UserId::random(), None, Utc::now()).unwrap());
    }
}
