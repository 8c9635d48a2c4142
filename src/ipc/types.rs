use rusqlite::Connection;
use serde::Deserialize;

use crate::ai::{GeminiClient, TextGenerator};
use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The one logical operator driving this process.
pub enum Operator {
    Admin,
    Cr { student_id: String },
}

/// Multi-step password-reset progress. Cleared on login, logout, or a
/// completed reset.
pub struct ResetFlow {
    pub student_id: String,
    pub server_code: Option<String>,
    pub verified: bool,
}

pub struct AppState {
    pub db: Connection,
    pub operator: Option<Operator>,
    pub reset: Option<ResetFlow>,
    pub ai: Box<dyn TextGenerator>,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            db: db::open_db()?,
            operator: None,
            reset: None,
            ai: Box::new(GeminiClient::from_env()),
        })
    }
}
