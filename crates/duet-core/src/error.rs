use thiserror::Error;

use crate::model::{RelationshipStatus, UserId};

/// Errors surfaced by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated")]
    Conflict,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Illegal relationship lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move relationship from {from} to {to}")]
    InvalidStatus {
        from: RelationshipStatus,
        to: RelationshipStatus,
    },

    #[error("user {0} is already a partner")]
    DuplicatePartner(UserId),

    #[error("relationship already has two partners")]
    Full,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("could not generate a unique invite code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },

    /// Missing, expired or already used. Deliberately not distinguished.
    #[error("invite code not found")]
    InviteNotFound,

    #[error("no active relationship, you must be paired first")]
    NoActiveRelationship,

    #[error("access to this {0} is forbidden")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("an invite code cannot be redeemed by its creator")]
    SelfRedemption,

    #[error("user {0} is already in an active relationship")]
    AlreadyPaired(UserId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Stable tag for a [`CoreError`], used by the boundary layer to pick a
/// transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CodeGenerationExhausted,
    InviteNotFound,
    NoActiveRelationship,
    Forbidden,
    NotFound,
    SelfRedemption,
    AlreadyPaired,
    Invalid,
    StorageFailure,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CodeGenerationExhausted { .. } => ErrorKind::CodeGenerationExhausted,
            Self::InviteNotFound => ErrorKind::InviteNotFound,
            Self::NoActiveRelationship => ErrorKind::NoActiveRelationship,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SelfRedemption => ErrorKind::SelfRedemption,
            Self::AlreadyPaired(_) => ErrorKind::AlreadyPaired,
            Self::Transition(_) => ErrorKind::Invalid,
            Self::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
