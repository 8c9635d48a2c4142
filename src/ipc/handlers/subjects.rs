use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{cohort_from_params, get_required_text, require_cr, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

fn list(state: &mut AppState) -> Result<Value, HandlerErr> {
    let subjects = db::subjects_all(&state.db).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "subjects": subjects }))
}

fn create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let subject = db::Subject {
        id: Uuid::new_v4().to_string(),
        name: get_required_text(params, "name")?,
        code: get_required_text(params, "code")?,
    };
    db::insert_subject(&state.db, &subject).map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "subject": subject }))
}

fn update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let subject = db::Subject {
        id: get_required_text(params, "subjectId")?,
        name: get_required_text(params, "name")?,
        code: get_required_text(params, "code")?,
    };
    let updated =
        db::update_subject(&state.db, &subject).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if updated == 0 {
        return Err(HandlerErr::new("not_found", "subject not found"));
    }
    Ok(json!({ "subject": subject }))
}

fn delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = get_required_text(params, "subjectId")?;
    if db::subject_by_id(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .is_none()
    {
        return Err(HandlerErr::new("not_found", "subject not found"));
    }

    let assignments_removed = db::delete_subject_cascade(&state.db, &subject_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    Ok(json!({ "ok": true, "assignmentsRemoved": assignments_removed }))
}

fn for_cohort(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cohort = cohort_from_params(params)?;
    let subjects = db::subjects_for_cohort(&state.db, &cohort, false)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "subjects": subjects }))
}

// The CR's own schedule. Assignments predating the degree field match any
// degree here, unlike the admin's filtered views.
fn mine(state: &mut AppState) -> Result<Value, HandlerErr> {
    let student_id = require_cr(&state.operator)?;
    let student = db::student_by_id(&state.db, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student no longer exists"))?;

    let subjects = db::subjects_for_cohort(&state.db, &student.cohort(), true)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => list(state),
        "subjects.create" => create(state, &req.params),
        "subjects.update" => update(state, &req.params),
        "subjects.delete" => delete(state, &req.params),
        "subjects.forCohort" => for_cohort(state, &req.params),
        "subjects.mine" => mine(state),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
