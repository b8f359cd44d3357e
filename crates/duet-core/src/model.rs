use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::event::EventImage;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

id_type!(UserId);
id_type!(RelationshipId);
id_type!(EventId);
id_type!(WhisperId);

/// Identity of an authenticated request, produced once by the auth layer
/// and passed explicitly into every core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub username: String,
}

impl Caller {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

// -- Invites --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub code: String,
    pub created_by: UserId,
    pub first_meeting_date: NaiveDate,
    pub is_used: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invite {
    pub fn new(
        code: String,
        created_by: UserId,
        first_meeting_date: NaiveDate,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            code,
            created_by,
            first_meeting_date,
            is_used: false,
            expires_at: Some(now + ttl),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Unused and not past its expiry.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired(now)
    }
}

// -- Relationships --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    Pending,
    Active,
    Disconnected,
}

impl RelationshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "disconnected" => Ok(Self::Disconnected),
            other => Err(format!("unknown relationship status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: RelationshipId,
    /// Ordered: the inviter first, then whoever redeemed the code.
    pub partners: Vec<Partner>,
    pub status: RelationshipStatus,
    pub invite_code: String,
    pub first_meeting_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    pub const MAX_PARTNERS: usize = 2;

    /// A relationship with only its inviter, waiting for a second partner.
    pub fn pending(
        inviter: UserId,
        invite_code: impl Into<String>,
        first_meeting_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RelationshipId::random(),
            partners: vec![Partner {
                user_id: inviter,
                joined_at: now,
            }],
            status: RelationshipStatus::Pending,
            invite_code: invite_code.into(),
            first_meeting_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// `pending -> active`: the second partner joins.
    pub fn activate(&mut self, partner: UserId, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != RelationshipStatus::Pending {
            return Err(TransitionError::InvalidStatus {
                from: self.status,
                to: RelationshipStatus::Active,
            });
        }
        if self.has_partner(partner) {
            return Err(TransitionError::DuplicatePartner(partner));
        }
        if self.partners.len() >= Self::MAX_PARTNERS {
            return Err(TransitionError::Full);
        }

        self.partners.push(Partner {
            user_id: partner,
            joined_at: now,
        });
        self.status = RelationshipStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// `active -> disconnected`. Disconnected is terminal.
    pub fn disconnect(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != RelationshipStatus::Active {
            return Err(TransitionError::InvalidStatus {
                from: self.status,
                to: RelationshipStatus::Disconnected,
            });
        }
        self.status = RelationshipStatus::Disconnected;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == RelationshipStatus::Active
    }

    pub fn has_partner(&self, user_id: UserId) -> bool {
        self.partners.iter().any(|p| p.user_id == user_id)
    }

    pub fn partner_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.partners.iter().map(|p| p.user_id)
    }

    /// Whole days since the earliest partner joined: `floor(hours / 24)`.
    pub fn days_together(&self, now: DateTime<Utc>) -> i64 {
        self.partners
            .iter()
            .map(|p| p.joined_at)
            .min()
            .map(|earliest| (now - earliest).num_hours().max(0) / 24)
            .unwrap_or(0)
    }

    pub fn link(&self, now: DateTime<Utc>) -> RelationshipLink {
        RelationshipLink {
            relationship_id: self.id,
            relationship_days: self.days_together(now),
        }
    }
}

// -- Users --

/// Denormalised copy of relationship membership kept on the user record.
/// The relationship store is authoritative; this is a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipLink {
    pub relationship_id: RelationshipId,
    pub relationship_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<EventImage>,
    pub relationship: Option<RelationshipLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
