//! Closed enums naming the synced collections and presence channels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The collections kept in sync with the remote change feed.
///
/// One feed topic, one connection supervisor and one collection store exist
/// per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Tasks,
    Clients,
    TeamMembers,
    Activity,
}

impl ResourceKind {
    /// Every synced resource kind.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Tasks,
        ResourceKind::Clients,
        ResourceKind::TeamMembers,
        ResourceKind::Activity,
    ];

    /// The change-feed topic for this kind.
    pub fn topic(&self) -> &'static str {
        match self {
            ResourceKind::Tasks => "tasks",
            ResourceKind::Clients => "clients",
            ResourceKind::TeamMembers => "team_members",
            ResourceKind::Activity => "activity_logs",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic())
    }
}

/// Channels carrying presence (who is online) rather than row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceChannel {
    /// Team chat screen.
    Chat,
    /// The dashboard "online now" widget.
    TeamWidget,
}

impl PresenceChannel {
    /// The presence channel key on the transport.
    pub fn key(&self) -> &'static str {
        match self {
            PresenceChannel::Chat => "presence:chat",
            PresenceChannel::TeamWidget => "presence:team_widget",
        }
    }
}

impl fmt::Display for PresenceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
