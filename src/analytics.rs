//! Derived metrics over the task and team collections.
//!
//! [`recompute`] is pure and synchronous: the same collections and the same
//! evaluation instant always produce the same snapshot. It runs only when a
//! source collection's snapshot is replaced, never on reads.

use crate::models::{Platform, Task, TaskPriority, TaskStatus, TeamMember};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of trailing week buckets in the weekly series.
pub const WEEKLY_BUCKETS: usize = 8;

const SECONDS_PER_DAY: f64 = 86_400.0;
const SECONDS_PER_WEEK: i64 = 7 * 86_400;

/// Productivity of one team member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProductivity {
    pub member_id: String,
    pub name: String,
    /// Tasks assigned to this member.
    pub assigned: u32,
    /// Completed tasks among those assigned.
    pub completed: u32,
    /// `round(100 * completed / assigned)`; 0 with no assigned tasks.
    pub efficiency: u8,
}

/// One week-long bucket of the trailing series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekBucket {
    /// Monday 00:00 UTC opening this bucket's week.
    pub week_start: DateTime<Utc>,
    pub created: u32,
    pub completed: u32,
}

/// The derived metrics snapshot.
///
/// Always a pure function of the current task and team collections; never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub in_progress_tasks: u32,
    pub overdue_tasks: u32,
    /// `round(100 * completed / total)`; 0 with no tasks.
    pub completion_rate: u8,
    /// Mean days between creation and completion, one decimal; 0 when no
    /// task has both timestamps.
    pub avg_completion_days: f64,
    pub by_platform: BTreeMap<Platform, u32>,
    pub by_priority: BTreeMap<TaskPriority, u32>,
    pub member_productivity: Vec<MemberProductivity>,
    /// Exactly [`WEEKLY_BUCKETS`] buckets, oldest first; the last bucket is
    /// the current week.
    pub weekly: Vec<WeekBucket>,
}

impl AnalyticsSnapshot {
    /// The snapshot for empty collections at `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        recompute(&[], &[], now)
    }
}

/// Monday 00:00 UTC of the week containing `t`.
fn start_of_week(t: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = t.weekday().num_days_from_monday() as i64;
    let monday = t.date_naive() - Duration::days(days_from_monday);
    DateTime::from_naive_utc_and_offset(monday.and_time(NaiveTime::MIN), Utc)
}

/// Index of the bucket containing `ts`, if it falls within the series.
fn bucket_index(series_start: DateTime<Utc>, ts: DateTime<Utc>) -> Option<usize> {
    let offset = (ts - series_start).num_seconds();
    if offset < 0 {
        return None;
    }
    let idx = (offset / SECONDS_PER_WEEK) as usize;
    (idx < WEEKLY_BUCKETS).then_some(idx)
}

fn round_pct(part: usize, total: usize) -> u8 {
    if total == 0 {
        0
    } else {
        ((part as f64 / total as f64) * 100.0).round() as u8
    }
}

/// Derive the full metrics snapshot from the two collections.
pub fn recompute(tasks: &[Task], team: &[TeamMember], now: DateTime<Utc>) -> AnalyticsSnapshot {
    let total = tasks.len();
    let completed = tasks.iter().filter(|t| t.is_completed()).count();
    let in_progress = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::InProgress)
        .count();
    let overdue = tasks.iter().filter(|t| t.is_overdue(now)).count();

    // Mean completion latency over tasks carrying both timestamps.
    let latencies: Vec<f64> = tasks
        .iter()
        .filter_map(|t| t.completed_at.map(|done| (done - t.created_at).num_seconds()))
        .map(|secs| secs as f64 / SECONDS_PER_DAY)
        .collect();
    let avg_completion_days = if latencies.is_empty() {
        0.0
    } else {
        let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    let mut by_platform: BTreeMap<Platform, u32> = BTreeMap::new();
    let mut by_priority: BTreeMap<TaskPriority, u32> = BTreeMap::new();
    for task in tasks {
        *by_platform.entry(task.platform).or_insert(0) += 1;
        *by_priority.entry(task.priority).or_insert(0) += 1;
    }

    let member_productivity = team
        .iter()
        .map(|member| {
            let assigned: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.assignee_id.as_ref() == Some(&member.identity))
                .collect();
            let done = assigned.iter().filter(|t| t.is_completed()).count();
            MemberProductivity {
                member_id: member.id.clone(),
                name: member.name.clone(),
                assigned: assigned.len() as u32,
                completed: done as u32,
                efficiency: round_pct(done, assigned.len()),
            }
        })
        .collect();

    // Trailing weekly series: bucket 7 is the current week. A task counts as
    // created in the bucket containing created_at and as completed in the
    // bucket containing completed_at, so it may land in two buckets, one, or
    // none.
    let series_start = start_of_week(now) - Duration::weeks((WEEKLY_BUCKETS - 1) as i64);
    let mut weekly: Vec<WeekBucket> = (0..WEEKLY_BUCKETS)
        .map(|i| WeekBucket {
            week_start: series_start + Duration::weeks(i as i64),
            created: 0,
            completed: 0,
        })
        .collect();
    for task in tasks {
        if let Some(idx) = bucket_index(series_start, task.created_at) {
            weekly[idx].created += 1;
        }
        if let Some(done) = task.completed_at {
            if let Some(idx) = bucket_index(series_start, done) {
                weekly[idx].completed += 1;
            }
        }
    }

    AnalyticsSnapshot {
        total_tasks: total as u32,
        completed_tasks: completed as u32,
        in_progress_tasks: in_progress as u32,
        overdue_tasks: overdue as u32,
        completion_rate: round_pct(completed, total),
        avg_completion_days,
        by_platform,
        by_priority,
        member_productivity,
        weekly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityId;
    use crate::models::MemberRole;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn task(id: &str, created: DateTime<Utc>, completed: Option<DateTime<Utc>>) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {}", id),
            status: if completed.is_some() {
                TaskStatus::Completed
            } else {
                TaskStatus::Todo
            },
            priority: TaskPriority::Medium,
            platform: Platform::Instagram,
            assignee_id: None,
            created_at: created,
            updated_at: completed.unwrap_or(created),
            completed_at: completed,
            due_at: None,
        }
    }

    fn member(id: &str, identity: &str) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            identity: IdentityId::new(identity),
            name: format!("member {}", id),
            role: MemberRole::Member,
            created_at: at(2026, 1, 1, 0),
        }
    }

    #[test]
    fn empty_collections() {
        let now = at(2026, 8, 7, 12);
        let snap = recompute(&[], &[], now);
        assert_eq!(snap.total_tasks, 0);
        assert_eq!(snap.completion_rate, 0);
        assert_eq!(snap.avg_completion_days, 0.0);
        assert_eq!(snap.weekly.len(), WEEKLY_BUCKETS);
        assert!(snap.weekly.iter().all(|b| b.created == 0 && b.completed == 0));
        assert!(snap.by_platform.is_empty());
        assert!(snap.member_productivity.is_empty());
    }

    #[test]
    fn rate_and_latency_scenario() {
        // 10 tasks, 4 completed exactly 2 days after creation.
        let now = at(2026, 8, 7, 12);
        let created = at(2026, 8, 3, 9);
        let mut tasks: Vec<Task> = (0..4)
            .map(|i| {
                task(
                    &format!("done-{}", i),
                    created,
                    Some(created + Duration::days(2)),
                )
            })
            .collect();
        tasks.extend((0..6).map(|i| task(&format!("open-{}", i), created, None)));

        let snap = recompute(&tasks, &[], now);
        assert_eq!(snap.total_tasks, 10);
        assert_eq!(snap.completed_tasks, 4);
        assert_eq!(snap.completion_rate, 40);
        assert_eq!(snap.avg_completion_days, 2.0);
    }

    #[test]
    fn recompute_is_idempotent() {
        let now = at(2026, 8, 7, 12);
        let tasks = vec![
            task("a", at(2026, 7, 1, 8), Some(at(2026, 7, 4, 8))),
            task("b", at(2026, 8, 3, 8), None),
        ];
        let team = vec![member("m1", "user-1")];
        assert_eq!(recompute(&tasks, &team, now), recompute(&tasks, &team, now));
    }

    #[test]
    fn weekly_buckets_span_and_edges() {
        // 2026-08-07 is a Friday; the current week opened Monday 08-03.
        let now = at(2026, 8, 7, 12);
        let tasks = vec![
            // Created this week and completed this week: same bucket twice.
            task("this-week", at(2026, 8, 3, 10), Some(at(2026, 8, 5, 10))),
            // Created seven weeks back: oldest bucket.
            task("oldest", at(2026, 6, 16, 10), None),
            // Created before the series: counted nowhere.
            task("ancient", at(2026, 1, 1, 10), None),
        ];
        let snap = recompute(&tasks, &[], now);

        assert_eq!(snap.weekly.len(), WEEKLY_BUCKETS);
        assert_eq!(snap.weekly[7].week_start, at(2026, 8, 3, 0));
        assert_eq!(snap.weekly[7].created, 1);
        assert_eq!(snap.weekly[7].completed, 1);
        assert_eq!(snap.weekly[0].created, 1);
        let total_created: u32 = snap.weekly.iter().map(|b| b.created).sum();
        assert_eq!(total_created, 2);
    }

    #[test]
    fn member_efficiency() {
        let now = at(2026, 8, 7, 12);
        let identity = IdentityId::new("user-1");
        let mut done = task("t1", at(2026, 8, 3, 9), Some(at(2026, 8, 4, 9)));
        done.assignee_id = Some(identity.clone());
        let mut open = task("t2", at(2026, 8, 3, 9), None);
        open.assignee_id = Some(identity.clone());
        let mut open2 = task("t3", at(2026, 8, 3, 9), None);
        open2.assignee_id = Some(identity);

        let team = vec![member("m1", "user-1"), member("m2", "user-2")];
        let snap = recompute(&[done, open, open2], &team, now);

        assert_eq!(snap.member_productivity.len(), 2);
        let m1 = &snap.member_productivity[0];
        assert_eq!(m1.assigned, 3);
        assert_eq!(m1.completed, 1);
        assert_eq!(m1.efficiency, 33);
        let m2 = &snap.member_productivity[1];
        assert_eq!(m2.assigned, 0);
        assert_eq!(m2.efficiency, 0);
    }

    #[test]
    fn overdue_counts_open_past_due_only() {
        let now = at(2026, 8, 7, 12);
        let mut overdue = task("late", at(2026, 8, 1, 9), None);
        overdue.due_at = Some(at(2026, 8, 6, 9));
        let mut done_late = task("done", at(2026, 8, 1, 9), Some(at(2026, 8, 7, 9)));
        done_late.due_at = Some(at(2026, 8, 6, 9));
        let mut future = task("future", at(2026, 8, 1, 9), None);
        future.due_at = Some(at(2026, 8, 20, 9));

        let snap = recompute(&[overdue, done_late, future], &[], now);
        assert_eq!(snap.overdue_tasks, 1);
    }
}
