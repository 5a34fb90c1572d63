//! Boundary data models for the synced collections.
//!
//! Entities arrive from the persistence API as loosely typed JSON rows; the
//! types here give them closed, statically known shapes at the boundary so
//! the aggregator and consumers never touch dynamic payloads.

mod activity;
mod client;
mod rows;
mod task;
mod team_member;

pub use activity::ActivityEntry;
pub use client::{Client, ClientStatus};
pub use rows::CollectionRows;
pub use task::{Platform, Task, TaskPriority, TaskStatus};
pub use team_member::{MemberRole, TeamMember};
