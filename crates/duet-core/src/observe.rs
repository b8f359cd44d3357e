//! Structured observability for the pairing core.
//!
//! Core components emit [`PairingEvent`]s to an injected [`PairingObserver`]
//! instead of logging directly, so callers decide where they go.

use std::fmt;

use crate::model::{RelationshipId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    InviteIssued {
        inviter: UserId,
        code: String,
        attempts: u32,
    },
    /// Candidate code already existed; another one will be drawn.
    InviteCollision {
        inviter: UserId,
        attempt: u32,
    },
    InviteRejected {
        redeemer: UserId,
        reason: &'static str,
    },
    Paired {
        relationship_id: RelationshipId,
        inviter: UserId,
        redeemer: UserId,
    },
    /// Relationship insert failed after the invite was claimed.
    ClaimReleased {
        code: String,
        released: bool,
    },
    /// Denormalised user cache could not be written.
    UserSyncFailed {
        user_id: UserId,
        relationship_id: Option<RelationshipId>,
        reason: String,
    },
    Disconnected {
        relationship_id: RelationshipId,
        by: UserId,
    },
    /// Data-integrity violation: more than one active relationship for one user.
    DuplicateActiveRelationships {
        user_id: UserId,
        count: usize,
        chosen: RelationshipId,
    },
    UserReconciled {
        user_id: UserId,
        relationship_id: Option<RelationshipId>,
        relationship_days: i64,
    },
    AccessDenied {
        user_id: UserId,
        resource: &'static str,
    },
}

impl fmt::Display for PairingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InviteIssued { inviter, code, attempts } => {
                write!(f, "invite_issued user={inviter} code={code} attempts={attempts}")
            }
            Self::InviteCollision { inviter, attempt } => {
                write!(f, "invite_collision user={inviter} attempt={attempt}")
            }
            Self::InviteRejected { redeemer, reason } => {
                write!(f, "invite_rejected user={redeemer} reason={reason}")
            }
            Self::Paired { relationship_id, inviter, redeemer } => {
                write!(f, "paired rel={relationship_id} inviter={inviter} redeemer={redeemer}")
            }
            Self::ClaimReleased { code, released } => {
                write!(f, "claim_released code={code} released={released}")
            }
            Self::UserSyncFailed { user_id, relationship_id: Some(rel), reason } => {
                write!(f, "user_sync_failed user={user_id} rel={rel}: {reason}")
            }
            Self::UserSyncFailed { user_id, relationship_id: None, reason } => {
                write!(f, "user_sync_failed user={user_id} rel=none: {reason}")
            }
            Self::Disconnected { relationship_id, by } => {
                write!(f, "disconnected rel={relationship_id} by={by}")
            }
            Self::DuplicateActiveRelationships { user_id, count, chosen } => {
                write!(f, "duplicate_active user={user_id} count={count} chosen={chosen}")
            }
            Self::UserReconciled { user_id, relationship_id, relationship_days } => match relationship_id {
                Some(rel) => write!(f, "user_reconciled user={user_id} rel={rel} days={relationship_days}"),
                None => write!(f, "user_reconciled user={user_id} rel=none"),
            },
            Self::AccessDenied { user_id, resource } => {
                write!(f, "access_denied user={user_id} resource={resource}")
            }
        }
    }
}

pub trait PairingObserver: Send + Sync {
    fn emit(&self, event: PairingEvent);
}

/// Observer that forwards to `tracing`.
pub struct TracingObserver;

impl PairingObserver for TracingObserver {
    fn emit(&self, event: PairingEvent) {
        match &event {
            PairingEvent::DuplicateActiveRelationships { .. } => {
                tracing::error!(target: "duet::pairing", "{}", event);
            }
            PairingEvent::UserSyncFailed { .. } | PairingEvent::ClaimReleased { .. } => {
                tracing::warn!(target: "duet::pairing", "{}", event);
            }
            PairingEvent::InviteCollision { .. }
            | PairingEvent::InviteRejected { .. }
            | PairingEvent::AccessDenied { .. } => {
                tracing::debug!(target: "duet::pairing", "{}", event);
            }
            _ => tracing::info!(target: "duet::pairing", "{}", event),
        }
    }
}

#[cfg(test)]
pub use recording::RecordingObserver;
