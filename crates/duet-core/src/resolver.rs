use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::model::{Relationship, User, UserId};
use crate::observe::PairingEvent;
use crate::store::{RelationshipStore, UserStore};
use crate::CoreContext;

/// Finds a user's single current active relationship. The relationship store
/// is the source of truth; user records only cache the answer.
pub struct RelationshipResolver<S> {
    store: Arc<S>,
    ctx: CoreContext,
}

impl<S> Clone for RelationshipResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<S> RelationshipResolver<S> {
    pub fn context(&self) -> &CoreContext {
        &self.ctx
    }
}

impl<S: RelationshipStore> RelationshipResolver<S> {
    pub fn new(store: Arc<S>, ctx: CoreContext) -> Self {
        Self { store, ctx }
    }

    pub fn find_current(&self, user_id: UserId) -> CoreResult<Relationship> {
        self.try_find_current(user_id)?
            .ok_or(CoreError::NoActiveRelationship)
    }

    /// Like [`find_current`](Self::find_current) but `None` instead of an error.
    ///
    /// More than one active relationship for the same user is an integrity
    /// violation. It is reported, and the most recently created one wins so
    /// the user keeps working.
    pub fn try_find_current(&self, user_id: UserId) -> CoreResult<Option<Relationship>> {
        let active = self.store.find_active_by_user(user_id)?;
        let count = active.len();
        let current = active
            .into_iter()
            .filter(|rel| rel.is_active() && rel.has_partner(user_id))
            .max_by_key(|rel| (rel.created_at, rel.id));

        if count > 1 {
            if let Some(rel) = &current {
                self.ctx.emit(PairingEvent::DuplicateActiveRelationships {
                    user_id,
                    count,
                    chosen: rel.id,
                });
            }
        }
        Ok(current)
    }
}

impl<S: RelationshipStore + UserStore> RelationshipResolver<S> {
    /// Re-derive the user's relationship link and rewrite the cached copy if
    /// it drifted. A failed rewrite is reported but the derived value is
    /// still returned.
    pub fn reconcile_user(&self, user_id: UserId) -> CoreResult<User> {
        let mut user = self
            .store
            .find_user(user_id)?
            .ok_or(CoreError::NotFound("user"))?;
        let now = self.ctx.now();
        let current = self.try_find_current(user_id)?;
        let link = current.as_ref().map(|rel| rel.link(now));

        if user.relationship == link {
            return Ok(user);
        }

        match self.store.set_relationship_link(user_id, link, now) {
            Ok(true) => self.ctx.emit(PairingEvent::UserReconciled {
                user_id,
                relationship_id: link.map(|l| l.relationship_id),
                relationship_days: link.map_or(0, |l| l.relationship_days),
            }),
            Ok(false) => return Err(CoreError::NotFound("user")),
            Err(e) => self.ctx.emit(PairingEvent::UserSyncFailed {
                user_id,
                relationship_id: link.map(|l| l.relationship_id),
                reason: e.to_string(),
            }),
        }

        user.relationship = link;
        user.updated_at = now;
        Ok(user)
    }
}
