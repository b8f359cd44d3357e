//! Whispers: lightweight recurring suggestions between partners.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::event::{build_event, Event, EventImage, EventKind, EventSource, NewEvent};
use crate::guard::{AccessGuard, RelationshipScoped};
use crate::model::{Caller, RelationshipId, UserId, WhisperId};
use crate::resolver::RelationshipResolver;
use crate::store::{EventStore, Page, RelationshipStore, WhisperStore};
use crate::CoreContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Once,
    Everyday,
    Weekly,
}

impl Recurrence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Everyday => "everyday",
            Self::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Self::Once),
            "everyday" => Ok(Self::Everyday),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown recurrence '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whisper {
    pub id: WhisperId,
    /// Free-form template key, e.g. `watch_sunset` or `custom`.
    pub kind: String,
    pub text: String,
    pub recurrence: Recurrence,
    /// For `once` the day itself, otherwise the start date.
    pub date: DateTime<Utc>,
    pub relationship_id: RelationshipId,
    pub created_by: UserId,
    pub is_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipScoped for Whisper {
    const RESOURCE: &'static str = "whisper";

    fn relationship_id(&self) -> RelationshipId {
        self.relationship_id
    }
}

#[derive(Debug, Clone)]
pub struct NewWhisper {
    pub kind: String,
    pub text: String,
    pub recurrence: Recurrence,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct WhisperChanges {
    pub text: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub date: Option<DateTime<Utc>>,
    pub is_done: Option<bool>,
}

impl WhisperChanges {
    fn apply(self, whisper: &mut Whisper, now: DateTime<Utc>) {
        if let Some(text) = self.text {
            whisper.text = text;
        }
        if let Some(recurrence) = self.recurrence {
            whisper.recurrence = recurrence;
        }
        if let Some(date) = self.date {
            whisper.date = date;
        }
        if let Some(is_done) = self.is_done {
            whisper.is_done = is_done;
        }
        whisper.updated_at = now;
    }
}

/// Whisper operations. Either partner may edit, delete or convert a whisper
/// the other one created.
pub struct WhisperService<S> {
    store: Arc<S>,
    guard: AccessGuard<S>,
    ctx: CoreContext,
}

impl<S: WhisperStore + EventStore + RelationshipStore> WhisperService<S> {
    pub fn new(store: Arc<S>, ctx: CoreContext) -> Self {
        let guard = AccessGuard::new(RelationshipResolver::new(store.clone(), ctx.clone()));
        Self { store, guard, ctx }
    }

    pub fn create(&self, caller: &Caller, new: NewWhisper) -> CoreResult<Whisper> {
        let rel = self.guard.current(caller)?;
        let now = self.ctx.now();
        let whisper = Whisper {
            id: WhisperId::random(),
            kind: new.kind,
            text: new.text,
            recurrence: new.recurrence,
            date: new.date,
            relationship_id: rel.id,
            created_by: caller.user_id,
            is_done: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_whisper(&whisper)?;
        tracing::debug!("whisper {} created by {} in {}", whisper.id, caller.user_id, rel.id);
        Ok(whisper)
    }

    pub fn list(&self, caller: &Caller, page: Page) -> CoreResult<Vec<Whisper>> {
        let rel = self.guard.current(caller)?;
        Ok(self.store.list_whispers(rel.id, page)?)
    }

    pub fn update(
        &self,
        caller: &Caller,
        id: WhisperId,
        changes: WhisperChanges,
    ) -> CoreResult<Whisper> {
        let (_, mut whisper) = self.guard.authorize(caller, || self.store.find_whisper(id))?;
        changes.apply(&mut whisper, self.ctx.now());
        if !self.store.update_whisper(&whisper)? {
            return Err(CoreError::NotFound(Whisper::RESOURCE));
        }
        Ok(whisper)
    }

    pub fn delete(&self, caller: &Caller, id: WhisperId) -> CoreResult<()> {
        self.guard.authorize(caller, || self.store.find_whisper(id))?;
        if !self.store.delete_whisper(id)? {
            return Err(CoreError::NotFound(Whisper::RESOURCE));
        }
        Ok(())
    }

    /// Record a whisper as a `DATE` event for today, titled with its text.
    pub fn convert_to_event(
        &self,
        caller: &Caller,
        id: WhisperId,
        image: Option<EventImage>,
    ) -> CoreResult<Event> {
        let (rel, whisper) = self.guard.authorize(caller, || self.store.find_whisper(id))?;
        let now = self.ctx.now();
        let title = if whisper.text.trim().is_empty() {
            whisper.kind.clone()
        } else {
            whisper.text.clone()
        };
        let event = build_event(
            NewEvent {
                title,
                description: String::new(),
                date: now,
                kind: EventKind::Date,
                image,
            },
            rel.id,
            caller.user_id,
            EventSource::WhisperConverted(whisper.id),
            now,
        );
        self.store.insert_event(&event)?;
        tracing::debug!("whisper {} converted to event {} by {}", whisper.id, event.id, caller.user_id);
        Ok(event)
    }
}
