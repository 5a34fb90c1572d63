//! Client (account) entity.

use crate::identity::IdentityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engagement state of a client account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    Paused,
    Archived,
}

/// A client account row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub status: ClientStatus,
    /// Identity of the account owner on the team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
