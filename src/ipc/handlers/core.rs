use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::collections::HashMap;

fn handle_health(_state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

// Totals plus per-department student counts for the admin dashboard tiles.
fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let students = match db::students_all(&state.db) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subjects = match db::subjects_all(&state.db) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let assignments = match db::assignments_all(&state.db) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut per_dept: HashMap<&str, i64> = HashMap::new();
    for s in &students {
        *per_dept.entry(s.department.as_str()).or_default() += 1;
    }
    let mut per_dept: Vec<(&str, i64)> = per_dept.into_iter().collect();
    per_dept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let per_dept_json: Vec<serde_json::Value> = per_dept
        .iter()
        .map(|(dept, count)| json!({ "department": dept, "count": count }))
        .collect();

    ok(
        &req.id,
        json!({
            "students": students.len(),
            "subjects": subjects.len(),
            "assignments": assignments.len(),
            "studentsPerDepartment": per_dept_json
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "stats.overview" => Some(handle_overview(state, req)),
        _ => None,
    }
}
