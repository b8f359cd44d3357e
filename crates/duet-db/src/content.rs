use anyhow::Result;
use duet_core::event::Event;
use duet_core::model::{EventId, RelationshipId, WhisperId};
use duet_core::store::{EventStore, Page, WhisperStore};
use duet_core::whisper::Whisper;
use duet_core::StoreResult;
use rusqlite::Row;

use crate::models::{EventRow, WhisperRow, fmt_ts};
use crate::{Database, OptionalExt, store_error};

const EVENT_COLUMNS: &str = "id, relationship_id, created_by, title, description, date, kind, \
     is_public, image, source_type, source_id, created_at, updated_at";

const WHISPER_COLUMNS: &str = "id, relationship_id, created_by, kind, text, recurrence, date, \
     is_done, created_at, updated_at";

fn event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        relationship_id: row.get(1)?,
        created_by: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        date: row.get(5)?,
        kind: row.get(6)?,
        is_public: row.get(7)?,
        image: row.get(8)?,
        source_type: row.get(9)?,
        source_id: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn whisper_row(row: &Row<'_>) -> rusqlite::Result<WhisperRow> {
    Ok(WhisperRow {
        id: row.get(0)?,
        relationship_id: row.get(1)?,
        created_by: row.get(2)?,
        kind: row.get(3)?,
        text: row.get(4)?,
        recurrence: row.get(5)?,
        date: row.get(6)?,
        is_done: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn image_json(event: &Event) -> Result<Option<String>> {
    Ok(event.image.as_ref().map(serde_json::to_string).transpose()?)
}

impl EventStore for Database {
    fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO events ({EVENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                rusqlite::params![
                    event.id.to_string(),
                    event.relationship_id.to_string(),
                    event.created_by.to_string(),
                    event.title,
                    event.description,
                    fmt_ts(event.date),
                    event.kind.as_str(),
                    event.is_public,
                    image_json(event)?,
                    event.source.as_str(),
                    event.source.source_id().map(|id| id.to_string()),
                    fmt_ts(event.created_at),
                    fmt_ts(event.updated_at),
                ],
            )?;
            Ok(())
        })
        .map_err(store_error)
    }

    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], event_row).optional()
        })?;
        Ok(row.map(EventRow::into_event).transpose()?)
    }

    fn update_event(&self, event: &Event) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE events SET title = ?2, description = ?3, date = ?4, kind = ?5,
                     is_public = ?6, image = ?7, updated_at = ?8
                 WHERE id = ?1",
                rusqlite::params![
                    event.id.to_string(),
                    event.title,
                    event.description,
                    fmt_ts(event.date),
                    event.kind.as_str(),
                    event.is_public,
                    image_json(event)?,
                    fmt_ts(event.updated_at),
                ],
            )?;
            Ok(changed)
        })?;
        Ok(changed == 1)
    }

    fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM events WHERE id = ?1", [id.to_string()])?)
        })?;
        Ok(changed == 1)
    }

    fn list_events(&self, relationship_id: RelationshipId, page: Page) -> StoreResult<Vec<Event>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE relationship_id = ?1
                 ORDER BY date DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![relationship_id.to_string(), page.limit, page.offset],
                    event_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(EventRow::into_event).collect::<Result<Vec<_>>>()?)
    }
}

impl WhisperStore for Database {
    fn insert_whisper(&self, whisper: &Whisper) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO whispers ({WHISPER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                rusqlite::params![
                    whisper.id.to_string(),
                    whisper.relationship_id.to_string(),
                    whisper.created_by.to_string(),
                    whisper.kind,
                    whisper.text,
                    whisper.recurrence.as_str(),
                    fmt_ts(whisper.date),
                    whisper.is_done,
                    fmt_ts(whisper.created_at),
                    fmt_ts(whisper.updated_at),
                ],
            )?;
            Ok(())
        })
        .map_err(store_error)
    }

    fn find_whisper(&self, id: WhisperId) -> StoreResult<Option<Whisper>> {
        let row = self.with_conn(|conn| {
            let sql = format!("SELECT {WHISPER_COLUMNS} FROM whispers WHERE id = ?1");
            conn.query_row(&sql, [id.to_string()], whisper_row).optional()
        })?;
        Ok(row.map(WhisperRow::into_whisper).transpose()?)
    }

    fn update_whisper(&self, whisper: &Whisper) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE whispers SET text = ?2, recurrence = ?3, date = ?4, is_done = ?5, updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    whisper.id.to_string(),
                    whisper.text,
                    whisper.recurrence.as_str(),
                    fmt_ts(whisper.date),
                    whisper.is_done,
                    fmt_ts(whisper.updated_at),
                ],
            )?;
            Ok(changed)
        })?;
        Ok(changed == 1)
    }

    fn delete_whisper(&self, id: WhisperId) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM whispers WHERE id = ?1", [id.to_string()])?)
        })?;
        Ok(changed == 1)
    }

    fn list_whispers(
        &self,
        relationship_id: RelationshipId,
        page: Page,
    ) -> StoreResult<Vec<Whisper>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WHISPER_COLUMNS} FROM whispers WHERE relationship_id = ?1
                 ORDER BY date DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![relationship_id.to_string(), page.limit, page.offset],
                    whisper_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(rows.into_iter().map(WhisperRow::into_whisper).collect::<Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use duet_core::event::{EventImage, EventKind, EventService, ImageKind, NewEvent};
    use duet_core::model::{Caller, Relationship, UserId};
    use duet_core::store::RelationshipStore;
    use duet_core::whisper::{NewWhisper, Recurrence, WhisperChanges, WhisperService};
    use duet_core::{CoreContext, ErrorKind};

    use super::*;
    use crate::users::NewAccount;

    fn couple(db: &Database) -> (Caller, Caller, Relationship) {
        let now = Utc::now();
        let mut callers = Vec::new();
        for _ in 0..2 {
            let id = UserId::random();
            let name = format!("user-{}", &id.to_string()[..8]);
            let email = format!("{name}@example.com");
            let account = NewAccount {
                id,
                username: &name,
                email: &email,
                name: &name,
                password_hash: "hash",
            };
            db.create_user(&account, now).unwrap();
            callers.push(Caller::new(id, name));
        }
        let b = callers.pop().unwrap();
        let a = callers.pop().unwrap();
        let mut rel = Relationship::pending(a.user_id, format!("C{}", &a.user_id.to_string()[..7]), None, now);
        rel.activate(b.user_id, now).unwrap();
        db.insert_relationship(&rel).unwrap();
        (a, b, rel)
    }

    fn event(title: &str, days_ago: i64) -> NewEvent {
        NewEvent {
            title: title.into(),
            description: "with cake".into(),
            date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() - Duration::days(days_ago),
            kind: EventKind::Birthday,
            image: None,
        }
    }

    #[test]
    fn events_persist_with_image_and_list_newest_first() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (a, b, _) = couple(&db);
        let (c, _, _) = couple(&db);
        let service = EventService::new(db.clone(), CoreContext::default());

        let image = EventImage {
            kind: ImageKind::Url,
            data: "https://example.com/cake.jpg".into(),
            filename: "cake.jpg".into(),
            size: 1024,
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap(),
        };
        let older = service.create(&a, event("Older", 10)).unwrap();
        let newer = service
            .create(&b, NewEvent { image: Some(image.clone()), ..event("Newer", 1) })
            .unwrap();
        service.create(&c, event("Elsewhere", 0)).unwrap();

        let listed = service.list(&a, Page::default()).unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(listed[0].image, Some(image));
        assert_eq!(listed[0].description, "with cake");

        let second_page = service.list(&a, Page::new(Some(1), Some(1))).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, older.id);

        assert_eq!(service.get(&c, older.id).unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn whisper_conversion_is_stored_with_its_source() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (a, b, rel) = couple(&db);
        let service = WhisperService::new(db.clone(), CoreContext::default());

        let whisper = service
            .create(
                &a,
                NewWhisper {
                    kind: "cook_dinner".into(),
                    text: "Cook dinner together".into(),
                    recurrence: Recurrence::Once,
                    date: Utc.with_ymd_and_hms(2024, 5, 5, 18, 0, 0).unwrap(),
                },
            )
            .unwrap();
        service
            .update(&b, whisper.id, WhisperChanges { is_done: Some(true), ..Default::default() })
            .unwrap();
        assert!(db.find_whisper(whisper.id).unwrap().unwrap().is_done);

        let converted = service.convert_to_event(&b, whisper.id, None).unwrap();
        let stored = db.find_event(converted.id).unwrap().unwrap();
        assert_eq!(stored.relationship_id, rel.id);
        assert_eq!(stored.kind, EventKind::Date);
        assert_eq!(stored.source, converted.source);

        service.delete(&a, whisper.id).unwrap();
        assert!(db.find_whisper(whisper.id).unwrap().is_none());
        assert!(!db.delete_whisper(whisper.id).unwrap());
    }
}
