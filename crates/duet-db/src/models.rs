//! Database row types. These map directly to SQLite rows and are converted
//! into `duet-core` models at the edge of this crate.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duet_core::event::{Event, EventImage, EventKind, EventSource};
use duet_core::model::{
    EventId, Invite, Partner, Relationship, RelationshipId, RelationshipLink, User, UserId,
    WhisperId,
};
use duet_core::whisper::Whisper;

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that string
/// comparison in SQL matches chronological order.
pub fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(s.parse::<NaiveDate>()?)
}

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
    /// JSON-encoded `EventImage`.
    pub avatar: Option<String>,
    pub relationship_id: Option<String>,
    pub relationship_days: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        let relationship = match self.relationship_id {
            Some(id) => Some(RelationshipLink {
                relationship_id: id.parse()?,
                relationship_days: self.relationship_days,
            }),
            None => None,
        };
        let avatar = self
            .avatar
            .as_deref()
            .map(serde_json::from_str::<EventImage>)
            .transpose()?;
        Ok(User {
            id: self.id.parse()?,
            username: self.username,
            email: self.email,
            name: self.name,
            avatar,
            relationship,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct InviteRow {
    pub code: String,
    pub created_by: String,
    pub first_meeting_date: String,
    pub is_used: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl InviteRow {
    pub fn into_invite(self) -> Result<Invite> {
        Ok(Invite {
            code: self.code,
            created_by: self.created_by.parse()?,
            first_meeting_date: parse_date(&self.first_meeting_date)?,
            is_used: self.is_used,
            expires_at: self.expires_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct RelationshipRow {
    pub id: String,
    pub status: String,
    pub invite_code: String,
    pub first_meeting_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PartnerRow {
    pub user_id: String,
    pub joined_at: String,
}

impl RelationshipRow {
    pub fn into_relationship(self, partners: Vec<PartnerRow>) -> Result<Relationship> {
        let partners = partners
            .into_iter()
            .map(|p| {
                Ok(Partner {
                    user_id: p.user_id.parse::<UserId>()?,
                    joined_at: parse_ts(&p.joined_at)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Relationship {
            id: self.id.parse::<RelationshipId>()?,
            partners,
            status: self.status.parse().map_err(|e: String| anyhow!(e))?,
            invite_code: self.invite_code,
            first_meeting_date: self.first_meeting_date.as_deref().map(parse_date).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct EventRow {
    pub id: String,
    pub relationship_id: String,
    pub created_by: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub kind: String,
    pub is_public: bool,
    pub image: Option<String>,
    pub source_type: String,
    pub source_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EventRow {
    pub fn into_event(self) -> Result<Event> {
        let source = match (self.source_type.as_str(), self.source_id) {
            ("manual", _) => EventSource::Manual,
            ("todo_completed", _) => EventSource::TodoCompleted,
            ("whisper_converted", Some(id)) => EventSource::WhisperConverted(id.parse::<WhisperId>()?),
            (other, _) => return Err(anyhow!("invalid event source '{other}'")),
        };
        let image = self
            .image
            .as_deref()
            .map(serde_json::from_str::<EventImage>)
            .transpose()?;
        Ok(Event {
            id: self.id.parse::<EventId>()?,
            title: self.title,
            description: self.description,
            date: parse_ts(&self.date)?,
            kind: self.kind.parse::<EventKind>().map_err(|e| anyhow!(e))?,
            relationship_id: self.relationship_id.parse()?,
            created_by: self.created_by.parse()?,
            is_public: self.is_public,
            image,
            source,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct WhisperRow {
    pub id: String,
    pub relationship_id: String,
    pub created_by: String,
    pub kind: String,
    pub text: String,
    pub recurrence: String,
    pub date: String,
    pub is_done: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl WhisperRow {
    pub fn into_whisper(self) -> Result<Whisper> {
        Ok(Whisper {
            id: self.id.parse()?,
            kind: self.kind,
            text: self.text,
            recurrence: self.recurrence.parse().map_err(|e: String| anyhow!(e))?,
            date: parse_ts(&self.date)?,
            relationship_id: self.relationship_id.parse()?,
            created_by: self.created_by.parse()?,
            is_done: self.is_done,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}
