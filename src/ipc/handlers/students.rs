use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    cohort_from_params, get_optional_text, get_required_text, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

/// Roll numbers suggested to the AI generator start in this range, offset by
/// the current headcount.
const GENERATED_ROLL_BASE: i64 = 2024000;
const DEFAULT_GENERATE_COUNT: i64 = 5;

struct StudentFields {
    name: String,
    roll_no: String,
    cohort: db::Cohort,
    is_cr: bool,
    email: Option<String>,
    password: Option<String>,
    security_question: Option<String>,
    security_answer: Option<String>,
}

fn student_fields(params: &Value) -> Result<StudentFields, HandlerErr> {
    Ok(StudentFields {
        name: get_required_text(params, "name")?,
        roll_no: get_required_text(params, "rollNo")?,
        cohort: cohort_from_params(params)?,
        is_cr: params.get("isCR").and_then(|v| v.as_bool()).unwrap_or(false),
        email: get_optional_text(params, "email"),
        password: get_optional_text(params, "password"),
        security_question: get_optional_text(params, "securityQuestion"),
        security_answer: get_optional_text(params, "securityAnswer"),
    })
}

fn list(state: &mut AppState) -> Result<Value, HandlerErr> {
    let students = db::students_all(&state.db).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "students": students }))
}

fn create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let fields = student_fields(params)?;

    if db::roll_no_taken(&state.db, &fields.roll_no, None)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
    {
        return Err(HandlerErr::new(
            "duplicate_roll_no",
            format!("roll number {} is already registered", fields.roll_no),
        ));
    }

    let student = db::Student {
        id: Uuid::new_v4().to_string(),
        name: fields.name,
        roll_no: fields.roll_no,
        degree: fields.cohort.degree,
        department: fields.cohort.department,
        year: fields.cohort.year,
        semester: fields.cohort.semester,
        is_cr: fields.is_cr,
        email: fields.email,
        password: fields.password,
        security_question: fields.security_question,
        security_answer: fields.security_answer,
    };
    db::insert_student(&state.db, &student).map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(json!({ "student": student }))
}

fn update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_text(params, "studentId")?;
    let fields = student_fields(params)?;

    let existing = db::student_by_id(&state.db, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    if db::roll_no_taken(&state.db, &fields.roll_no, Some(&existing.id))
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
    {
        return Err(HandlerErr::new(
            "duplicate_roll_no",
            format!("roll number {} is already registered", fields.roll_no),
        ));
    }

    let student = db::Student {
        id: existing.id,
        name: fields.name,
        roll_no: fields.roll_no,
        degree: fields.cohort.degree,
        department: fields.cohort.department,
        year: fields.cohort.year,
        semester: fields.cohort.semester,
        is_cr: fields.is_cr,
        email: fields.email,
        password: fields.password,
        security_question: fields.security_question,
        security_answer: fields.security_answer,
    };
    db::update_student(&state.db, &student).map_err(|e| HandlerErr::db("db_update_failed", e))?;
    Ok(json!({ "student": student }))
}

fn delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_text(params, "studentId")?;
    let deleted = db::delete_student(&state.db, &student_id)
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    // Attendance records referencing the student stay behind; aggregation
    // drops them from current-cohort views.
    Ok(json!({ "ok": true }))
}

fn generate(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let cohort = cohort_from_params(params)?;
    let count = match params.get("count") {
        None => DEFAULT_GENERATE_COUNT,
        Some(v) => v
            .as_i64()
            .filter(|c| *c >= 1)
            .ok_or_else(|| HandlerErr::bad_params("count must be a positive number"))?,
    };

    let existing = db::students_all(&state.db).map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let start_roll_no = GENERATED_ROLL_BASE + existing.len() as i64;

    // Best-effort: a collaborator failure means zero students, not an error.
    let generated = state
        .ai
        .generate_students(
            count,
            &cohort.degree,
            &cohort.department,
            cohort.year,
            cohort.semester,
            start_roll_no,
        )
        .unwrap_or_default();

    let mut created: Vec<db::Student> = Vec::new();
    let mut skipped = 0;
    for g in generated {
        if db::roll_no_taken(&state.db, &g.roll_no, None)
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
        {
            skipped += 1;
            continue;
        }
        let student = db::Student {
            id: Uuid::new_v4().to_string(),
            name: g.name,
            roll_no: g.roll_no,
            degree: cohort.degree.clone(),
            department: cohort.department.clone(),
            year: cohort.year,
            semester: cohort.semester,
            is_cr: g.is_cr,
            email: if g.email.is_empty() { None } else { Some(g.email) },
            password: Some(db::DEFAULT_CR_PASSWORD.to_string()),
            security_question: None,
            security_answer: None,
        };
        db::insert_student(&state.db, &student)
            .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
        created.push(student);
    }

    Ok(json!({
        "created": created.len(),
        "skipped": skipped,
        "students": created
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state),
        "students.create" => create(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        "students.generate" => generate(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
