//! Ownership and soft-delete columns shared by every CRM record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Creator/editor tracking plus soft-delete marker.
///
/// Aggregates fold this from their events; projections copy it into read
/// models so list queries can hide deleted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAudit {
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordAudit {
    pub fn created(actor: Option<UserId>, at: DateTime<Utc>) -> Self {
        Self {
            created_by: actor,
            updated_by: actor,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    pub fn touch(&mut self, actor: Option<UserId>, at: DateTime<Utc>) {
        if actor.is_some() {
            self.updated_by = actor;
        }
        self.updated_at = at;
    }

    pub fn mark_deleted(&mut self, actor: Option<UserId>, at: DateTime<Utc>) {
        self.touch(actor, at);
        self.deleted_at = Some(at);
    }

    pub fn restore(&mut self, actor: Option<UserId>, at: DateTime<Utc>) {
        self.touch(actor, at);
        self.deleted_at = None;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Default for RecordAudit {
    fn default() -> Self {
        Self::created(None, DateTime::<Utc>::MIN_UTC)
    }
}
