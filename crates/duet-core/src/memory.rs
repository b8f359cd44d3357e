//! In-memory store used by the core's unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};
use crate::event::Event;
use crate::model::{
    Caller, EventId, Invite, Relationship, RelationshipId, RelationshipLink, RelationshipStatus,
    User, UserId, WhisperId,
};
use crate::store::{EventStore, InviteStore, Page, RelationshipStore, UserStore, WhisperStore};
use crate::whisper::Whisper;

#[derive(Default)]
pub struct MemoryStore {
    invites: Mutex<HashMap<String, Invite>>,
    relationships: Mutex<HashMap<RelationshipId, Relationship>>,
    users: Mutex<HashMap<UserId, User>>,
    events: Mutex<HashMap<EventId, Event>>,
    whispers: Mutex<HashMap<WhisperId, Whisper>>,
    fail_user_updates: AtomicBool,
    fail_relationship_inserts: AtomicBool,
    fail_releases: AtomicBool,
    steal_next_claim: AtomicBool,
}

fn injected(what: &str) -> StoreError {
    StoreError::Backend(anyhow::anyhow!("injected {what} failure"))
}

impl MemoryStore {
    pub fn add_user(&self, username: &str) -> Caller {
        let now = Utc::now();
        let user = User {
            id: UserId::random(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: username.to_string(),
            avatar: None,
            relationship: None,
            created_at: now,
            updated_at: now,
        };
        let caller = Caller::new(user.id, username);
        self.users.lock().unwrap().insert(user.id, user);
        caller
    }

    pub fn fail_user_updates(&self, on: bool) {
        self.fail_user_updates.store(on, Ordering::SeqCst);
    }

    pub fn fail_relationship_inserts(&self, on: bool) {
        self.fail_relationship_inserts.store(on, Ordering::SeqCst);
    }

    pub fn fail_releases(&self, on: bool) {
        self.fail_releases.store(on, Ordering::SeqCst);
    }

    /// The next claim behaves as if a concurrent request won it: the invite
    /// ends up used but the caller gets nothing back.
    pub fn steal_next_claim(&self) {
        self.steal_next_claim.store(true, Ordering::SeqCst);
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.lock().unwrap().len()
    }
}

/// Two fresh users and an active relationship between them, created now.
pub fn paired(store: &MemoryStore) -> (Caller, Caller, Relationship) {
    paired_at(store, Utc::now())
}

/// Like [`paired`] with both partners joining at `at`. User caches are left empty.
pub fn paired_at(store: &MemoryStore, at: DateTime<Utc>) -> (Caller, Caller, Relationship) {
    let n = store.users.lock().unwrap().len();
    let a = store.add_user(&format!("user{n}"));
    let b = store.add_user(&format!("user{}", n + 1));
    let mut rel = Relationship::pending(a.user_id, format!("PAIR{n:04}"), None, at);
    rel.activate(b.user_id, at).unwrap();
    store.relationships.lock().unwrap().insert(rel.id, rel.clone());
    (a, b, rel)
}

impl InviteStore for MemoryStore {
    fn insert_invite(&self, invite: &Invite) -> StoreResult<()> {
        let mut invites = self.invites.lock().unwrap();
        if invites.contains_key(&invite.code) {
            return Err(StoreError::Conflict);
        }
        invites.insert(invite.code.clone(), invite.clone());
        Ok(())
    }

    fn find_invite(&self, code: &str) -> StoreResult<Option<Invite>> {
        Ok(self.invites.lock().unwrap().get(code).cloned())
    }

    fn claim_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<Option<Invite>> {
        let stolen = self.steal_next_claim.swap(false, Ordering::SeqCst);
        let mut invites = self.invites.lock().unwrap();
        match invites.get_mut(code) {
            Some(invite) if invite.is_redeemable(now) => {
                invite.is_used = true;
                invite.updated_at = now;
                Ok((!stolen).then(|| invite.clone()))
            }
            _ => Ok(None),
        }
    }

    fn release_invite(&self, code: &str, now: DateTime<Utc>) -> StoreResult<()> {
        if self.fail_releases.load(Ordering::SeqCst) {
            return Err(injected("release"));
        }
        if let Some(invite) = self.invites.lock().unwrap().get_mut(code) {
            invite.is_used = false;
            invite.updated_at = now;
        }
        Ok(())
    }
}

impl RelationshipStore for MemoryStore {
    fn insert_relationship(&self, relationship: &Relationship) -> StoreResult<()> {
        if self.fail_relationship_inserts.load(Ordering::SeqCst) {
            return Err(injected("relationship insert"));
        }
        self.relationships
            .lock()
            .unwrap()
            .insert(relationship.id, relationship.clone());
        Ok(())
    }

    fn find_relationship(&self, id: RelationshipId) -> StoreResult<Option<Relationship>> {
        Ok(self.relationships.lock().unwrap().get(&id).cloned())
    }

    fn find_active_by_user(&self, user_id: UserId) -> StoreResult<Vec<Relationship>> {
        let mut found: Vec<_> = self
            .relationships
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_active() && r.has_partner(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn transition_status(
        &self,
        id: RelationshipId,
        from: RelationshipStatus,
        to: RelationshipStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut rels = self.relationships.lock().unwrap();
        match rels.get_mut(&id) {
            Some(rel) if rel.status == from => {
                rel.status = to;
                rel.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl UserStore for MemoryStore {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    fn set_relationship_link(
        &self,
        id: UserId,
        link: Option<RelationshipLink>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if self.fail_user_updates.load(Ordering::SeqCst) {
            return Err(injected("user update"));
        }
        let mut users = self.users.lock().unwrap();
        Ok(match users.get_mut(&id) {
            Some(user) => {
                user.relationship = link;
                user.updated_at = now;
                true
            }
            None => false,
        })
    }
}

fn page_of<T: Clone>(mut items: Vec<T>, date: impl Fn(&T) -> DateTime<Utc>, page: Page) -> Vec<T> {
    items.sort_by(|a, b| date(b).cmp(&date(a)));
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

impl EventStore for MemoryStore {
    fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.events.lock().unwrap().insert(event.id, event.clone());
        Ok(())
    }

    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.events.lock().unwrap().get(&id).cloned())
    }

    fn update_event(&self, event: &Event) -> StoreResult<bool> {
        let mut events = self.events.lock().unwrap();
        Ok(match events.get_mut(&event.id) {
            Some(slot) => {
                *slot = event.clone();
                true
            }
            None => false,
        })
    }

    fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        Ok(self.events.lock().unwrap().remove(&id).is_some())
    }

    fn list_events(&self, relationship_id: RelationshipId, page: Page) -> StoreResult<Vec<Event>> {
        let scoped = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.relationship_id == relationship_id)
            .cloned()
            .collect();
        Ok(page_of(scoped, |e: &Event| e.date, page))
    }
}

impl WhisperStore for MemoryStore {
    fn insert_whisper(&self, whisper: &Whisper) -> StoreResult<()> {
        self.whispers.lock().unwrap().insert(whisper.id, whisper.clone());
        Ok(())
    }

    fn find_whisper(&self, id: WhisperId) -> StoreResult<Option<Whisper>> {
        Ok(self.whispers.lock().unwrap().get(&id).cloned())
    }

    fn update_whisper(&self, whisper: &Whisper) -> StoreResult<bool> {
        let mut whispers = self.whispers.lock().unwrap();
        Ok(match whispers.get_mut(&whisper.id) {
            Some(slot) => {
                *slot = whisper.clone();
                true
            }
            None => false,
        })
    }

    fn delete_whisper(&self, id: WhisperId) -> StoreResult<bool> {
        Ok(self.whispers.lock().unwrap().remove(&id).is_some())
    }

    fn list_whispers(
        &self,
        relationship_id: RelationshipId,
        page: Page,
    ) -> StoreResult<Vec<Whisper>> {
        let scoped = self
            .whispers
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.relationship_id == relationship_id)
            .cloned()
            .collect();
        Ok(page_of(scoped, |w: &Whisper| w.date, page))
    }
}
