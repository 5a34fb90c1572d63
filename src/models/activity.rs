//! Activity log entity.

use crate::identity::IdentityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the team activity feed ("alice completed task X").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub actor_id: IdentityId,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub created_at: DateTime<Utc>,
}
