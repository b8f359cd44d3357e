//! Events: shared milestones on a couple's timeline.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::guard::{AccessGuard, RelationshipScoped};
use crate::model::{Caller, EventId, RelationshipId, UserId, WhisperId};
use crate::resolver::RelationshipResolver;
use crate::store::{EventStore, Page, RelationshipStore};
use crate::CoreContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Meeting,
    Trip,
    Party,
    Birthday,
    Anniversary,
    Date,
    FightMakeup,
    TodoCompleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "MEETING",
            Self::Trip => "TRIP",
            Self::Party => "PARTY",
            Self::Birthday => "BIRTHDAY",
            Self::Anniversary => "ANNIVERSARY",
            Self::Date => "DATE",
            Self::FightMakeup => "FIGHT_MAKEUP",
            Self::TodoCompleted => "TODO_COMPLETED",
        }
    }

    pub fn category(self) -> EventCategory {
        match self {
            Self::Meeting | Self::Anniversary => EventCategory::Milestone,
            Self::Birthday | Self::Party => EventCategory::Special,
            _ => EventCategory::Activity,
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "MEETING" => Self::Meeting,
            "TRIP" => Self::Trip,
            "PARTY" => Self::Party,
            "BIRTHDAY" => Self::Birthday,
            "ANNIVERSARY" => Self::Anniversary,
            "DATE" => Self::Date,
            "FIGHT_MAKEUP" => Self::FightMakeup,
            "TODO_COMPLETED" => Self::TodoCompleted,
            other => return Err(format!("unknown event type '{other}'")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Milestone,
    Activity,
    Special,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Milestone => "milestone",
            Self::Activity => "activity",
            Self::Special => "special",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Base64,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventImage {
    pub kind: ImageKind,
    pub data: String,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Manual,
    TodoCompleted,
    WhisperConverted(WhisperId),
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::TodoCompleted => "todo_completed",
            Self::WhisperConverted(_) => "whisper_converted",
        }
    }

    pub fn source_id(self) -> Option<WhisperId> {
        match self {
            Self::WhisperConverted(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub kind: EventKind,
    pub relationship_id: RelationshipId,
    pub created_by: UserId,
    pub is_public: bool,
    pub image: Option<EventImage>,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn category(&self) -> EventCategory {
        self.kind.category()
    }
}

impl RelationshipScoped for Event {
    const RESOURCE: &'static str = "event";

    fn relationship_id(&self) -> RelationshipId {
        self.relationship_id
    }
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub kind: EventKind,
    pub image: Option<EventImage>,
}

/// Partial update; `None` leaves the field alone. `image: Some(None)` removes
/// the image.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub kind: Option<EventKind>,
    pub image: Option<Option<EventImage>>,
    pub is_public: Option<bool>,
}

impl EventChanges {
    fn apply(self, event: &mut Event, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
        if let Some(image) = self.image {
            event.image = image;
        }
        if let Some(is_public) = self.is_public {
            event.is_public = is_public;
        }
        event.updated_at = now;
    }
}

pub(crate) fn build_event(
    new: NewEvent,
    relationship_id: RelationshipId,
    created_by: UserId,
    source: EventSource,
    now: DateTime<Utc>,
) -> Event {
    Event {
        id: EventId::random(),
        title: new.title,
        description: new.description,
        date: new.date,
        kind: new.kind,
        relationship_id,
        created_by,
        is_public: false,
        image: new.image,
        source,
        created_at: now,
        updated_at: now,
    }
}

/// Event operations, each gated on the caller's current active relationship.
pub struct EventService<S> {
    store: Arc<S>,
    guard: AccessGuard<S>,
    ctx: CoreContext,
}

impl<S: EventStore + RelationshipStore> EventService<S> {
    pub fn new(store: Arc<S>, ctx: CoreContext) -> Self {
        let guard = AccessGuard::new(RelationshipResolver::new(store.clone(), ctx.clone()));
        Self { store, guard, ctx }
    }

    pub fn create(&self, caller: &Caller, new: NewEvent) -> CoreResult<Event> {
        let rel = self.guard.current(caller)?;
        let source = match new.kind {
            EventKind::TodoCompleted => EventSource::TodoCompleted,
            _ => EventSource::Manual,
        };
        let event = build_event(new, rel.id, caller.user_id, source, self.ctx.now());
        self.store.insert_event(&event)?;
        tracing::debug!("event {} created by {} in {}", event.id, caller.user_id, rel.id);
        Ok(event)
    }

    pub fn get(&self, caller: &Caller, id: EventId) -> CoreResult<Event> {
        let (_, event) = self.guard.authorize(caller, || self.store.find_event(id))?;
        Ok(event)
    }

    pub fn update(&self, caller: &Caller, id: EventId, changes: EventChanges) -> CoreResult<Event> {
        let (_, mut event) = self.guard.authorize(caller, || self.store.find_event(id))?;
        changes.apply(&mut event, self.ctx.now());
        if !self.store.update_event(&event)? {
            return Err(CoreError::NotFound(Event::RESOURCE));
        }
        Ok(event)
    }

    pub fn delete(&self, caller: &Caller, id: EventId) -> CoreResult<()> {
        self.guard.authorize(caller, || self.store.find_event(id))?;
        if !self.store.delete_event(id)? {
            return Err(CoreError::NotFound(Event::RESOURCE));
        }
        Ok(())
    }

    /// Events of the caller's current relationship; filtered by the store, not per item.
    pub fn list(&self, caller: &Caller, page: Page) -> CoreResult<Vec<Event>> {
        let rel = self.guard.current(caller)?;
        Ok(self.store.list_events(rel.id, page)?)
    }
}
