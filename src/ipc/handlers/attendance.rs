use crate::ai;
use crate::calc;
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    cohort_from_params, get_optional_text, get_required_text, has_cohort_params, require_cr,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

fn parse_date(raw: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    Ok(raw.to_string())
}

fn current_cr(state: &AppState) -> Result<db::Student, HandlerErr> {
    let student_id = require_cr(&state.operator)?;
    db::student_by_id(&state.db, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student no longer exists"))
}

/// Cohort for the reporting views: explicit params when any are given (the
/// admin's filtered views), otherwise the CR session's own class.
fn resolve_cohort(state: &AppState, params: &Value) -> Result<db::Cohort, HandlerErr> {
    if has_cohort_params(params) {
        return cohort_from_params(params);
    }
    Ok(current_cr(state)?.cohort())
}

fn sheet_open(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cr = current_cr(state)?;
    let subject_id = get_required_text(params, "subjectId")?;
    let subject = db::subject_by_id(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "subject not found"))?;

    let mut classmates = db::students_in_cohort(&state.db, &cr.cohort())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    classmates.sort_by(|a, b| calc::roll_no_cmp(&a.roll_no, &b.roll_no));

    // Everyone starts present; the client toggles from there.
    let rows: Vec<Value> = classmates
        .iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "name": s.name,
                "rollNo": s.roll_no,
                "status": calc::PRESENT,
            })
        })
        .collect();

    Ok(json!({
        "subject": subject,
        "date": chrono::Local::now().date_naive().to_string(),
        "students": rows,
    }))
}

fn submit(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cr = current_cr(state)?;
    let subject_id = get_required_text(params, "subjectId")?;
    let subject = db::subject_by_id(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "subject not found"))?;
    let date = parse_date(&get_required_text(params, "date")?)?;

    let mut statuses: HashMap<String, String> = HashMap::new();
    if let Some(map) = params.get("statuses").and_then(|v| v.as_object()) {
        for (student_id, status) in map {
            let status = status.as_str().unwrap_or_default();
            if status != calc::PRESENT && status != calc::ABSENT {
                return Err(HandlerErr::bad_params(format!(
                    "status for {} must be PRESENT or ABSENT",
                    student_id
                )));
            }
            statuses.insert(student_id.clone(), status.to_string());
        }
    }

    let classmates = db::students_in_cohort(&state.db, &cr.cohort())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if classmates.is_empty() {
        return Err(HandlerErr::bad_params("no students found in this class"));
    }

    // One record per current cohort member, unlisted students default to
    // present. Appended as-is: aggregation resolves overlapping submissions.
    let records: Vec<db::AttendanceRecord> = classmates
        .iter()
        .map(|s| db::AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            date: date.clone(),
            subject_id: subject_id.clone(),
            student_id: s.id.clone(),
            status: statuses
                .get(&s.id)
                .cloned()
                .unwrap_or_else(|| calc::PRESENT.to_string()),
            marked_by: cr.id.clone(),
        })
        .collect();
    db::insert_attendance_batch(&state.db, &records)
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

    let present = records.iter().filter(|r| r.status == calc::PRESENT).count();
    let insight = match state.ai.generate_insight(
        &subject.name,
        classmates.len() as i64,
        present as i64,
        &date,
    ) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => ai::EMPTY_INSIGHT.to_string(),
        Err(_) => ai::FALLBACK_INSIGHT.to_string(),
    };

    Ok(json!({
        "created": records.len(),
        "present": present,
        "insight": insight,
    }))
}

fn history(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cohort = resolve_cohort(state, params)?;

    // No subject selected: every derived view is empty, not an error.
    let Some(subject_id) = get_optional_text(params, "subjectId") else {
        return Ok(json!({
            "sessions": [],
            "students": [],
            "summary": { "sessionsHeld": 0, "averageAttendance": 0 },
        }));
    };

    let students = db::students_in_cohort(&state.db, &cohort)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    // No live assignment is required: records outlive their subject.
    let records = db::attendance_for_subject(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let sessions = calc::session_rollup(&records, &students);
    let stats = calc::student_stats(&records, &students, sessions.len() as i64);
    let average = calc::average_attendance_percent(&sessions);

    Ok(json!({
        "sessions": sessions,
        "students": stats,
        "summary": {
            "sessionsHeld": sessions.len(),
            "averageAttendance": average,
        },
    }))
}

fn session_detail(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cohort = resolve_cohort(state, params)?;
    let subject_id = get_required_text(params, "subjectId")?;
    let date = parse_date(&get_required_text(params, "date")?)?;

    let students = db::students_in_cohort(&state.db, &cohort)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let records = db::attendance_for_subject(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let rows = calc::session_detail(&records, &students, &date);
    Ok(json!({ "date": date, "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.sheetOpen" => sheet_open(state, &req.params),
        "attendance.submit" => submit(state, &req.params),
        "attendance.history" => history(state, &req.params),
        "attendance.sessionDetail" => session_detail(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
