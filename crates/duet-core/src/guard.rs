use crate::error::{CoreError, CoreResult, StoreResult};
use crate::model::{Caller, Relationship, RelationshipId};
use crate::observe::PairingEvent;
use crate::resolver::RelationshipResolver;
use crate::store::RelationshipStore;

/// A resource that belongs to exactly one relationship.
pub trait RelationshipScoped {
    const RESOURCE: &'static str;

    fn relationship_id(&self) -> RelationshipId;
}

/// Relationship-membership access check shared by every event and whisper
/// operation. Ownership means "belongs to my current active relationship",
/// not "created by me".
pub struct AccessGuard<S> {
    resolver: RelationshipResolver<S>,
}

impl<S: RelationshipStore> AccessGuard<S> {
    pub fn new(resolver: RelationshipResolver<S>) -> Self {
        Self { resolver }
    }

    /// The caller's active relationship, or `NoActiveRelationship`.
    pub fn current(&self, caller: &Caller) -> CoreResult<Relationship> {
        self.resolver.find_current(caller.user_id)
    }

    /// Resolve the caller's relationship, then load the target and check it
    /// belongs there. A resource in some other relationship is `Forbidden`,
    /// a missing one is `NotFound`.
    pub fn authorize<R, F>(&self, caller: &Caller, load: F) -> CoreResult<(Relationship, R)>
    where
        R: RelationshipScoped,
        F: FnOnce() -> StoreResult<Option<R>>,
    {
        let rel = self.current(caller)?;
        let resource = load()?.ok_or(CoreError::NotFound(R::RESOURCE))?;

        if resource.relationship_id() != rel.id {
            self.resolver.context().emit(PairingEvent::AccessDenied {
                user_id: caller.user_id,
                resource: R::RESOURCE,
            });
            return Err(CoreError::Forbidden(R::RESOURCE));
        }
        Ok((rel, resource))
    }
}
