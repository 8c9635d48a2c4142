use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, get_required_text, HandlerErr};
use crate::ipc::types::{AppState, Operator, Request, ResetFlow};
use rand::RngExt;
use serde_json::{json, Value};

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "admin";
const MIN_PASSWORD_LEN: usize = 4;

fn admin_login(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;
    if username != ADMIN_USERNAME || password != ADMIN_PASSWORD {
        return Err(HandlerErr::new(
            "invalid_credentials",
            "invalid admin credentials",
        ));
    }
    state.operator = Some(Operator::Admin);
    state.reset = None;
    Ok(json!({ "role": "ADMIN" }))
}

fn cr_login(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let roll_no = get_required_text(params, "rollNo")?;
    let password = get_required_str(params, "password")?;

    let student = db::student_by_roll_no(&state.db, &roll_no)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    if !student.is_cr {
        return Err(HandlerErr::new(
            "forbidden",
            "you are not assigned as a class representative",
        ));
    }

    // Students without a stored password fall back to the shared default.
    let valid = match student.password.as_deref() {
        Some(stored) if !stored.is_empty() => stored == password,
        _ => password == db::DEFAULT_CR_PASSWORD,
    };
    if !valid {
        return Err(HandlerErr::new("invalid_credentials", "invalid password"));
    }

    state.operator = Some(Operator::Cr {
        student_id: student.id.clone(),
    });
    state.reset = None;
    Ok(json!({ "role": "CR", "student": student }))
}

fn logout(state: &mut AppState) -> Result<Value, HandlerErr> {
    state.operator = None;
    state.reset = None;
    Ok(json!({ "ok": true }))
}

fn whoami(state: &mut AppState) -> Result<Value, HandlerErr> {
    let student_id = match &state.operator {
        None => return Ok(json!({ "role": null })),
        Some(Operator::Admin) => return Ok(json!({ "role": "ADMIN" })),
        Some(Operator::Cr { student_id }) => student_id.clone(),
    };
    let student = db::student_by_id(&state.db, &student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    match student {
        Some(s) => Ok(json!({ "role": "CR", "student": s })),
        None => {
            // The student was deleted while logged in.
            state.operator = None;
            Ok(json!({ "role": null }))
        }
    }
}

fn mask_email(email: &str) -> String {
    let Some((name, domain)) = email.split_once('@') else {
        return email.to_string();
    };
    if name.chars().count() <= 2 {
        return format!("{}@{}", name, domain);
    }
    let visible: String = name.chars().take(2).collect();
    let masked = "*".repeat(name.chars().count() - 2);
    format!("{}{}@{}", visible, masked, domain)
}

fn reset_identify(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let roll_no = get_required_text(params, "rollNo")?;
    let student = db::student_by_roll_no(&state.db, &roll_no)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found with this roll number"))?;

    if !student.is_cr {
        return Err(HandlerErr::new(
            "forbidden",
            "only class representatives can reset passwords",
        ));
    }

    let email = student.email.as_deref().filter(|e| !e.is_empty());
    let question = student.security_question.as_deref().filter(|q| !q.is_empty());
    if email.is_none() && question.is_none() {
        return Err(HandlerErr::new(
            "no_recovery_method",
            "no recovery methods (email or security question) set",
        ));
    }

    let mut methods: Vec<&str> = Vec::new();
    if email.is_some() {
        methods.push("email");
    }
    if question.is_some() {
        methods.push("securityQuestion");
    }

    state.reset = Some(ResetFlow {
        student_id: student.id.clone(),
        server_code: None,
        verified: false,
    });

    Ok(json!({
        "rollNo": student.roll_no,
        "methods": methods,
        "maskedEmail": email.map(mask_email),
        "securityQuestion": question,
    }))
}

fn reset_student(state: &AppState) -> Result<db::Student, HandlerErr> {
    let flow = state
        .reset
        .as_ref()
        .ok_or_else(|| HandlerErr::new("bad_state", "identify a student first"))?;
    db::student_by_id(&state.db, &flow.student_id)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student no longer exists"))
}

fn reset_send_code(state: &mut AppState) -> Result<Value, HandlerErr> {
    let student = reset_student(state)?;
    let email = student
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| HandlerErr::new("no_recovery_method", "no email on file"))?
        .to_string();

    // Simulated delivery: the code goes back to the caller instead of to the
    // mailbox.
    let code = rand::rng().random_range(1000..10000).to_string();
    if let Some(flow) = state.reset.as_mut() {
        flow.server_code = Some(code.clone());
        flow.verified = false;
    }

    Ok(json!({
        "code": code,
        "maskedEmail": mask_email(&email),
    }))
}

fn reset_verify_code(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let code = get_required_text(params, "code")?;
    let flow = state
        .reset
        .as_mut()
        .ok_or_else(|| HandlerErr::new("bad_state", "identify a student first"))?;
    let expected = flow
        .server_code
        .as_deref()
        .ok_or_else(|| HandlerErr::new("bad_state", "no verification code was issued"))?;
    if code != expected {
        return Err(HandlerErr::new("invalid_code", "invalid verification code"));
    }
    flow.verified = true;
    Ok(json!({ "verified": true }))
}

fn reset_verify_answer(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let answer = get_required_str(params, "answer")?;
    let student = reset_student(state)?;
    let stored = student
        .security_answer
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| HandlerErr::new("no_recovery_method", "security answer not set on account"))?;

    if answer.trim().to_lowercase() != stored.trim().to_lowercase() {
        return Err(HandlerErr::new("invalid_answer", "incorrect answer"));
    }
    if let Some(flow) = state.reset.as_mut() {
        flow.verified = true;
    }
    Ok(json!({ "verified": true }))
}

fn reset_password(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let new_password = get_required_str(params, "newPassword")?;
    let confirm = get_required_str(params, "confirmPassword")?;

    let flow = state
        .reset
        .as_ref()
        .ok_or_else(|| HandlerErr::new("bad_state", "identify a student first"))?;
    if !flow.verified {
        return Err(HandlerErr::new("bad_state", "verify your identity first"));
    }

    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerErr::bad_params(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if new_password != confirm {
        return Err(HandlerErr::bad_params("passwords do not match"));
    }

    let updated = db::set_student_password(&state.db, &flow.student_id, &new_password)
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    if updated == 0 {
        return Err(HandlerErr::new("not_found", "student no longer exists"));
    }

    state.reset = None;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "auth.adminLogin" => admin_login(state, &req.params),
        "auth.crLogin" => cr_login(state, &req.params),
        "auth.logout" => logout(state),
        "auth.whoami" => whoami(state),
        "auth.resetIdentify" => reset_identify(state, &req.params),
        "auth.resetSendCode" => reset_send_code(state),
        "auth.resetVerifyCode" => reset_verify_code(state, &req.params),
        "auth.resetVerifyAnswer" => reset_verify_answer(state, &req.params),
        "auth.resetPassword" => reset_password(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
