//! Invite issuance, redemption and disconnect.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::code::{CodeGenerator, RandomCodes, normalize_code};
use crate::error::{CoreError, CoreResult, StoreError};
use crate::model::{Caller, Invite, Relationship, RelationshipLink, RelationshipStatus, UserId};
use crate::observe::PairingEvent;
use crate::resolver::RelationshipResolver;
use crate::store::{InviteStore, RelationshipStore, UserStore};
use crate::CoreContext;

pub const INVITE_TTL_DAYS: i64 = 7;

/// Candidate codes drawn before issuance gives up.
pub const MAX_CODE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedInvite {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

pub struct PairingEngine<S> {
    store: Arc<S>,
    codes: Arc<dyn CodeGenerator>,
    invite_ttl: Duration,
    resolver: RelationshipResolver<S>,
    ctx: CoreContext,
}

impl<S: InviteStore + RelationshipStore + UserStore> PairingEngine<S> {
    pub fn new(store: Arc<S>, ctx: CoreContext) -> Self {
        Self {
            resolver: RelationshipResolver::new(store.clone(), ctx.clone()),
            store,
            codes: Arc::new(RandomCodes::new()),
            invite_ttl: Duration::days(INVITE_TTL_DAYS),
            ctx,
        }
    }

    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_invite_ttl(mut self, ttl: Duration) -> Self {
        self.invite_ttl = ttl;
        self
    }

    pub fn resolver(&self) -> &RelationshipResolver<S> {
        &self.resolver
    }

    /// Persist a fresh invite code for `caller`, drawing a new candidate on
    /// every uniqueness conflict up to [`MAX_CODE_ATTEMPTS`] times.
    pub fn issue_invite(
        &self,
        caller: &Caller,
        first_meeting_date: NaiveDate,
    ) -> CoreResult<IssuedInvite> {
        let now = self.ctx.now();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let invite = Invite::new(
                self.codes.generate(),
                caller.user_id,
                first_meeting_date,
                now,
                self.invite_ttl,
            );
            match self.store.insert_invite(&invite) {
                Ok(()) => {
                    self.ctx.emit(PairingEvent::InviteIssued {
                        inviter: caller.user_id,
                        code: invite.code.clone(),
                        attempts: attempt,
                    });
                    return Ok(IssuedInvite {
                        code: invite.code,
                        expires_at: now + self.invite_ttl,
                    });
                }
                Err(StoreError::Conflict) => self.ctx.emit(PairingEvent::InviteCollision {
                    inviter: caller.user_id,
                    attempt,
                }),
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::CodeGenerationExhausted {
            attempts: MAX_CODE_ATTEMPTS,
        })
    }

    /// Pair `caller` with the creator of `code`.
    ///
    /// The invite is claimed atomically before the relationship is written,
    /// so two concurrent redemptions of one code cannot both succeed. If the
    /// relationship write fails the claim is released again. Updating the
    /// two user records happens last and never fails the call.
    pub fn redeem_invite(&self, caller: &Caller, code: &str) -> CoreResult<Relationship> {
        let code = normalize_code(code);
        let redeemer = caller.user_id;
        let now = self.ctx.now();

        let invite = match self.store.find_invite(&code)? {
            Some(invite) if invite.is_redeemable(now) => invite,
            _ => return Err(self.reject(redeemer, "unknown_or_used", CoreError::InviteNotFound)),
        };
        if invite.created_by == redeemer {
            return Err(self.reject(redeemer, "self_redemption", CoreError::SelfRedemption));
        }
        for user_id in [invite.created_by, redeemer] {
            if self.resolver.try_find_current(user_id)?.is_some() {
                return Err(self.reject(
                    redeemer,
                    "already_paired",
                    CoreError::AlreadyPaired(user_id),
                ));
            }
        }

        let mut relationship = Relationship::pending(
            invite.created_by,
            invite.code.as_str(),
            Some(invite.first_meeting_date),
            now,
        );
        relationship.activate(redeemer, now)?;

        if self.store.claim_invite(&code, now)?.is_none() {
            return Err(self.reject(redeemer, "claimed_concurrently", CoreError::InviteNotFound));
        }

        if let Err(e) = self.store.insert_relationship(&relationship) {
            let released = match self.store.release_invite(&code, now) {
                Ok(()) => true,
                Err(release_err) => {
                    tracing::error!("failed to release invite {code}: {release_err}");
                    false
                }
            };
            self.ctx.emit(PairingEvent::ClaimReleased { code, released });
            return Err(e.into());
        }

        self.sync_users(&relationship, Some(relationship.link(now)), now);
        self.ctx.emit(PairingEvent::Paired {
            relationship_id: relationship.id,
            inviter: invite.created_by,
            redeemer,
        });
        Ok(relationship)
    }

    pub fn current(&self, caller: &Caller) -> CoreResult<Relationship> {
        self.resolver.find_current(caller.user_id)
    }

    /// Move the caller's active relationship to `disconnected` and clear both
    /// partners' cached link.
    pub fn disconnect(&self, caller: &Caller) -> CoreResult<Relationship> {
        let mut relationship = self.resolver.find_current(caller.user_id)?;
        let now = self.ctx.now();
        relationship.disconnect(now)?;

        let moved = self.store.transition_status(
            relationship.id,
            RelationshipStatus::Active,
            RelationshipStatus::Disconnected,
            now,
        )?;
        if !moved {
            return Err(CoreError::NoActiveRelationship);
        }

        self.sync_users(&relationship, None, now);
        self.ctx.emit(PairingEvent::Disconnected {
            relationship_id: relationship.id,
            by: caller.user_id,
        });
        Ok(relationship)
    }

    fn sync_users(
        &self,
        relationship: &Relationship,
        link: Option<RelationshipLink>,
        now: DateTime<Utc>,
    ) {
        for user_id in relationship.partner_ids() {
            let reason = match self.store.set_relationship_link(user_id, link, now) {
                Ok(true) => continue,
                Ok(false) => "user record missing".to_string(),
                Err(e) => e.to_string(),
            };
            self.ctx.emit(PairingEvent::UserSyncFailed {
                user_id,
                relationship_id: Some(relationship.id),
                reason,
            });
        }
    }

    fn reject(&self, redeemer: UserId, reason: &'static str, err: CoreError) -> CoreError {
        self.ctx.emit(PairingEvent::InviteRejected { redeemer, reason });
        err
    }
}
