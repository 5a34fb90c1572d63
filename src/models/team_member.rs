//! Team member entity.

use crate::identity::IdentityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Manager,
    Member,
}

/// A team member row. `identity` links the member to task assignments and
/// presence keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub identity: IdentityId,
    pub name: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}
