use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::db::{Assignment, AttendanceRecord, Student};

pub const PRESENT: &str = "PRESENT";
pub const ABSENT: &str = "ABSENT";
/// Sentinel for a cohort member with no record on a given date, e.g. a
/// student who joined after the session was recorded.
pub const STATUS_NONE: &str = "N/A";

/// Roll-number ordering used by every roster view: case-insensitive, with a
/// byte-order tiebreak so equal folds still sort deterministically.
pub fn roll_no_cmp(a: &str, b: &str) -> Ordering {
    match a.to_lowercase().cmp(&b.to_lowercase()) {
        Ordering::Equal => a.cmp(b),
        other => other,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub student_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub date: String,
    pub present: i64,
    pub total: i64,
    pub records: Vec<SessionRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    pub present_count: i64,
    pub total_sessions: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailRow {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    pub status: String,
}

/// Latest record per (date, student), restricted to current cohort members.
/// Input order is insertion order, so a re-submission for the same date
/// shadows the earlier one.
fn effective_by_date<'a>(
    records: &'a [AttendanceRecord],
    cohort: &[Student],
) -> HashMap<&'a str, HashMap<&'a str, &'a AttendanceRecord>> {
    let members: HashSet<&str> = cohort.iter().map(|s| s.id.as_str()).collect();
    let mut by_date: HashMap<&str, HashMap<&str, &AttendanceRecord>> = HashMap::new();
    for rec in records {
        if !members.contains(rec.student_id.as_str()) {
            continue;
        }
        by_date
            .entry(rec.date.as_str())
            .or_default()
            .insert(rec.student_id.as_str(), rec);
    }
    by_date
}

/// Session list for one subject: distinct dates with at least one record for
/// a current cohort member, most recent first. `total` is the cohort size at
/// query time, not the historical roster size.
pub fn session_rollup(records: &[AttendanceRecord], cohort: &[Student]) -> Vec<Session> {
    let by_date = effective_by_date(records, cohort);

    let mut roster: Vec<&Student> = cohort.iter().collect();
    roster.sort_by(|a, b| roll_no_cmp(&a.roll_no, &b.roll_no));

    let mut dates: Vec<&str> = by_date.keys().copied().collect();
    dates.sort();
    dates.reverse();

    dates
        .into_iter()
        .map(|date| {
            let day = &by_date[date];
            let present = day.values().filter(|r| r.status == PRESENT).count() as i64;
            let session_records = roster
                .iter()
                .filter_map(|s| day.get(s.id.as_str()))
                .map(|r| SessionRecord {
                    student_id: r.student_id.clone(),
                    status: r.status.clone(),
                })
                .collect();
            Session {
                date: date.to_string(),
                present,
                total: cohort.len() as i64,
                records: session_records,
            }
        })
        .collect()
}

pub fn percentage(present_count: i64, total_sessions: i64) -> i64 {
    if total_sessions <= 0 {
        return 0;
    }
    ((100.0 * present_count as f64) / total_sessions as f64).round() as i64
}

/// Per-student totals over all sessions of a subject, sorted by roll number.
/// Percentages are taken against sessions actually held, so a student who
/// joined mid-term is measured only over recorded history.
pub fn student_stats(
    records: &[AttendanceRecord],
    cohort: &[Student],
    total_sessions: i64,
) -> Vec<StudentStats> {
    let by_date = effective_by_date(records, cohort);

    let mut present_counts: HashMap<&str, i64> = HashMap::new();
    for day in by_date.values() {
        for rec in day.values() {
            if rec.status == PRESENT {
                *present_counts.entry(rec.student_id.as_str()).or_default() += 1;
            }
        }
    }

    let mut stats: Vec<StudentStats> = cohort
        .iter()
        .map(|s| {
            let present_count = present_counts.get(s.id.as_str()).copied().unwrap_or(0);
            StudentStats {
                id: s.id.clone(),
                name: s.name.clone(),
                roll_no: s.roll_no.clone(),
                present_count,
                total_sessions,
                percentage: percentage(present_count, total_sessions),
            }
        })
        .collect();
    stats.sort_by(|a, b| roll_no_cmp(&a.roll_no, &b.roll_no));
    stats
}

/// Point-in-time roster for one date: every current cohort member with their
/// recorded status, or "N/A" when no record exists for them on that date.
pub fn session_detail(
    records: &[AttendanceRecord],
    cohort: &[Student],
    date: &str,
) -> Vec<SessionDetailRow> {
    let by_date = effective_by_date(records, cohort);
    let day = by_date.get(date);

    let mut rows: Vec<SessionDetailRow> = cohort
        .iter()
        .map(|s| {
            let status = day
                .and_then(|d| d.get(s.id.as_str()))
                .map(|r| r.status.clone())
                .unwrap_or_else(|| STATUS_NONE.to_string());
            SessionDetailRow {
                id: s.id.clone(),
                name: s.name.clone(),
                roll_no: s.roll_no.clone(),
                status,
            }
        })
        .collect();
    rows.sort_by(|a, b| roll_no_cmp(&a.roll_no, &b.roll_no));
    rows
}

/// Mean attendance across sessions as a whole percentage. A session with a
/// recorded total of 0 contributes 0 rather than dividing by zero.
pub fn average_attendance_percent(sessions: &[Session]) -> i64 {
    if sessions.is_empty() {
        return 0;
    }
    let sum: f64 = sessions
        .iter()
        .map(|s| s.present as f64 / s.total.max(1) as f64)
        .sum();
    (100.0 * sum / sessions.len() as f64).round() as i64
}

/// Groups assignments by cohort, ordered lexicographically by rendered label.
/// Within a group, assignments keep insertion order.
pub fn group_assignments_by_cohort(
    assignments: &[Assignment],
) -> Vec<(String, Vec<&Assignment>)> {
    let mut grouped: BTreeMap<String, Vec<&Assignment>> = BTreeMap::new();
    for a in assignments {
        grouped.entry(a.cohort().label()).or_default().push(a);
    }
    grouped.into_iter().collect()
}
