//! Tagged variant returned by the bulk-list boundary.

use super::{ActivityEntry, Client, Task, TeamMember};
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};

/// One fully typed collection, as returned by the bulk list operation.
///
/// The tag keeps the fetch path closed over the known resource kinds: a
/// mismatched payload is a boundary bug, not something that silently flows
/// into the wrong store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum CollectionRows {
    Tasks(Vec<Task>),
    Clients(Vec<Client>),
    TeamMembers(Vec<TeamMember>),
    Activity(Vec<ActivityEntry>),
}

impl CollectionRows {
    /// The resource kind this payload belongs to.
    pub fn kind(&self) -> ResourceKind {
        match self {
            CollectionRows::Tasks(_) => ResourceKind::Tasks,
            CollectionRows::Clients(_) => ResourceKind::Clients,
            CollectionRows::TeamMembers(_) => ResourceKind::TeamMembers,
            CollectionRows::Activity(_) => ResourceKind::Activity,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectionRows::Tasks(rows) => rows.len(),
            CollectionRows::Clients(rows) => rows.len(),
            CollectionRows::TeamMembers(rows) => rows.len(),
            CollectionRows::Activity(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty payload of the given kind.
    pub fn empty(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Tasks => CollectionRows::Tasks(Vec::new()),
            ResourceKind::Clients => CollectionRows::Clients(Vec::new()),
            ResourceKind::TeamMembers => CollectionRows::TeamMembers(Vec::new()),
            ResourceKind::Activity => CollectionRows::Activity(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tagging_round_trip() {
        for kind in ResourceKind::ALL {
            let rows = CollectionRows::empty(kind);
            assert_eq!(rows.kind(), kind);
            assert!(rows.is_empty());
            let json = serde_json::to_string(&rows).unwrap();
            let back: CollectionRows = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), kind);
        }
    }
}
