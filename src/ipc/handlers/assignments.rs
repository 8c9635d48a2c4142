use crate::calc;
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_text, get_required_text, get_semester, get_year, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

// Legacy data may carry assignments without a degree, so the field is
// tolerated as empty here; the other three cohort fields are mandatory.
fn cohort_for_assign(params: &Value) -> Result<db::Cohort, HandlerErr> {
    Ok(db::Cohort {
        degree: get_optional_text(params, "degree").unwrap_or_default(),
        department: get_required_text(params, "department")?,
        year: get_year(params)?,
        semester: get_semester(params)?,
    })
}

fn assign(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cohort = cohort_for_assign(params)?;

    let subject_ids: Vec<String> = params
        .get("subjectIds")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    if subject_ids.is_empty() {
        return Err(HandlerErr::bad_params("select at least one subject to assign"));
    }

    // Validate the whole batch before touching anything.
    for subject_id in &subject_ids {
        if db::subject_by_id(&state.db, subject_id)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
            .is_none()
        {
            return Err(HandlerErr::new(
                "not_found",
                format!("subject {} not found", subject_id),
            ));
        }
    }

    let tx = state
        .db
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let mut created = 0;
    let mut duplicates = 0;
    for subject_id in &subject_ids {
        if db::assignment_exists(&tx, subject_id, &cohort)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
        {
            duplicates += 1;
            continue;
        }
        db::insert_assignment(
            &tx,
            &db::Assignment {
                id: Uuid::new_v4().to_string(),
                subject_id: subject_id.clone(),
                degree: cohort.degree.clone(),
                department: cohort.department.clone(),
                year: cohort.year,
                semester: cohort.semester,
            },
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
        created += 1;
    }
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "created": created,
        "duplicates": duplicates,
        "cohort": cohort.label()
    }))
}

fn delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let assignment_id = get_required_text(params, "assignmentId")?;
    let deleted = db::delete_assignment(&state.db, &assignment_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "assignment not found"));
    }
    Ok(json!({ "ok": true }))
}

fn list_grouped(state: &mut AppState) -> Result<Value, HandlerErr> {
    let assignments =
        db::assignments_all(&state.db).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let subjects = db::subjects_all(&state.db).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let by_id: HashMap<&str, &db::Subject> =
        subjects.iter().map(|s| (s.id.as_str(), s)).collect();

    let groups: Vec<Value> = calc::group_assignments_by_cohort(&assignments)
        .into_iter()
        .map(|(label, members)| {
            let assignments_json: Vec<Value> = members
                .iter()
                .filter_map(|a| {
                    // Cascade delete keeps this join total, but stay defensive.
                    let subject = by_id.get(a.subject_id.as_str())?;
                    Some(json!({
                        "id": a.id,
                        "subjectId": a.subject_id,
                        "subjectName": subject.name,
                        "subjectCode": subject.code,
                    }))
                })
                .collect();
            let first = members[0];
            json!({
                "label": label,
                "degree": first.degree,
                "department": first.department,
                "year": first.year,
                "semester": first.semester,
                "assignments": assignments_json,
            })
        })
        .collect();

    Ok(json!({ "groups": groups }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.assign" => assign(state, &req.params),
        "assignments.delete" => delete(state, &req.params),
        "assignments.listGrouped" => list_grouped(state),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
