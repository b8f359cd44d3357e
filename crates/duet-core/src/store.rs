//! Narrow persistence interfaces the core talks through.
//!
//! Every method is a single atomic operation on the backing store. The core
//! holds no shared mutable state of its own; coordination between concurrent
//! requests happens here (insert-if-absent, conditional updates).

use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::event::Event;
use crate::model::{
    EventId, Invite, Relationship, RelationshipId, RelationshipLink, RelationshipStatus, User,
    UserId, WhisperId,
};
use crate::whisper::Whisper;

pub trait InviteStore: Send + Sync {
    /// Insert a new invite. Fails with `StoreError::Conflict` if the code exists.
    fn insert_invite(&self, invite: &Invite) -> StoreResult<()>;

    fn find_invite(&self, code: &str) -> StoreResult<Option<Invite>>;

    /// Atomically mark an unused, unexpired invite as used and return it.
    /// Returns `None` when the invite is absent, used or expired.
    fn claim_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Invite>>;

    /// Undo a claim whose pairing could not be completed.
    fn release_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<()>;
}

pub trait RelationshipStore: Send + Sync {
    fn insert_relationship(&self, relationship: &Relationship) -> StoreResult<()>;

    fn find_relationship(&self, id: RelationshipId) -> StoreResult<Option<Relationship>>;

    /// All active relationships listing `user_id` as a partner, newest first.
    fn find_active_by_user(&self, user_id: UserId) -> StoreResult<Vec<Relationship>>;

    /// Conditional status update. Returns false if the stored status was not `from`.
    fn transition_status(
        &self,
        id: RelationshipId,
        from: RelationshipStatus,
        to: RelationshipStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

pub trait UserStore: Send + Sync {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Overwrite the denormalised relationship cache. Returns false if the user does not exist.
    fn set_relationship_link(
        &self,
        id: UserId,
        link: Option<RelationshipLink>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

pub trait EventStore: Send + Sync {
    fn insert_event(&self, event: &Event) -> StoreResult<()>;
    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>>;
    fn update_event(&self, event: &Event) -> StoreResult<bool>;
    fn delete_event(&self, id: EventId) -> StoreResult<bool>;
    /// Newest `date` first.
    fn list_events(&self, relationship_id: RelationshipId, page: Page) -> StoreResult<Vec<Event>>;
}

pub trait WhisperStore: Send + Sync {
    fn insert_whisper(&self, whisper: &Whisper) -> StoreResult<()>;
    fn find_whisper(&self, id: WhisperId) -> StoreResult<Option<Whisper>>;
    fn update_whisper(&self, whisper: &Whisper) -> StoreResult<bool>;
    fn delete_whisper(&self, id: WhisperId) -> StoreResult<bool>;
    /// Newest `date` first.
    fn list_whispers(
        &self,
        relationship_id: RelationshipId,
        page: Page,
    ) -> StoreResult<Vec<Whisper>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}
