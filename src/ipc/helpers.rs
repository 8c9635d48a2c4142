use serde_json::Value;

use super::error::err;
use super::types::Operator;
use crate::db::Cohort;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db(code: &'static str, e: rusqlite::Error) -> Self {
        Self::new(code, e.to_string())
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Required, trimmed, non-empty string param.
pub fn get_required_text(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let value = get_required_str(params, key)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(trimmed.to_string())
}

/// Optional string param; absent, null, or blank all collapse to None.
pub fn get_optional_text(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn get_int_in_range(
    params: &Value,
    key: &str,
    min: i64,
    max: i64,
) -> Result<i64, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key)))?;
    if !(min..=max).contains(&value) {
        return Err(HandlerErr::bad_params(format!(
            "{} must be between {} and {}",
            key, min, max
        )));
    }
    Ok(value)
}

pub fn get_year(params: &Value) -> Result<i64, HandlerErr> {
    get_int_in_range(params, "year", 1, 4)
}

pub fn get_semester(params: &Value) -> Result<i64, HandlerErr> {
    get_int_in_range(params, "semester", 1, 8)
}

pub fn cohort_from_params(params: &Value) -> Result<Cohort, HandlerErr> {
    Ok(Cohort {
        degree: get_required_text(params, "degree")?,
        department: get_required_text(params, "department")?,
        year: get_year(params)?,
        semester: get_semester(params)?,
    })
}

/// True when the caller supplied any cohort field at all; used to decide
/// between an explicit cohort and the CR session's own.
pub fn has_cohort_params(params: &Value) -> bool {
    ["degree", "department", "year", "semester"]
        .iter()
        .any(|k| params.get(*k).is_some())
}

pub fn require_cr(operator: &Option<Operator>) -> Result<String, HandlerErr> {
    match operator {
        Some(Operator::Cr { student_id }) => Ok(student_id.clone()),
        _ => Err(HandlerErr::new(
            "forbidden",
            "log in as a class representative first",
        )),
    }
}
