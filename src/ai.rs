use anyhow::Context;
use serde_json::{json, Value};

pub const FALLBACK_INSIGHT: &str = "Unable to generate insight at this time.";
pub const EMPTY_INSIGHT: &str = "Attendance data processed.";

const GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GeneratedStudent {
    pub name: String,
    pub roll_no: String,
    pub email: String,
    pub is_cr: bool,
}

/// External generative-text collaborator. Both operations are best-effort,
/// single-attempt enrichment: callers degrade to an empty result set or a
/// fallback string and never surface collaborator failures as errors.
pub trait TextGenerator {
    fn generate_students(
        &self,
        count: i64,
        degree: &str,
        department: &str,
        year: i64,
        semester: i64,
        start_roll_no: i64,
    ) -> anyhow::Result<Vec<GeneratedStudent>>;

    fn generate_insight(
        &self,
        subject_name: &str,
        total_students: i64,
        present_count: i64,
        date: &str,
    ) -> anyhow::Result<String>;
}

/// Gemini-backed implementation. The API key comes from GEMINI_API_KEY; when
/// it is unset every call fails fast and the callers' fallbacks kick in.
pub struct GeminiClient {
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }

    fn generate_content(&self, body: Value) -> anyhow::Result<Value> {
        let key = self
            .api_key
            .as_deref()
            .context("GEMINI_API_KEY is not set")?;
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{GEMINI_MODEL}:generateContent"
        );
        let resp = reqwest::blocking::Client::new()
            .post(&url)
            .query(&[("key", key)])
            .json(&body)
            .send()?;
        if !resp.status().is_success() {
            anyhow::bail!("generateContent returned {}", resp.status());
        }
        Ok(resp.json()?)
    }

    fn response_text(value: &Value) -> Option<&str> {
        value
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()
    }
}

impl TextGenerator for GeminiClient {
    fn generate_students(
        &self,
        count: i64,
        degree: &str,
        department: &str,
        year: i64,
        semester: i64,
        start_roll_no: i64,
    ) -> anyhow::Result<Vec<GeneratedStudent>> {
        let prompt = format!(
            "Generate {count} realistic college student profiles for Degree: {degree}, \
             Department: {department}, Year: {year}, Semester: {semester}. \
             Start roll numbers from {start_roll_no}. \
             One of them should be a Class Representative (isCR)."
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "name": { "type": "STRING" },
                            "rollNo": { "type": "STRING" },
                            "email": { "type": "STRING" },
                            "isCR": { "type": "BOOLEAN" }
                        },
                        "required": ["name", "rollNo", "email", "isCR"]
                    }
                }
            }
        });

        let response = self.generate_content(body)?;
        let text = Self::response_text(&response).context("response has no text part")?;
        let raw: Vec<Value> = serde_json::from_str(text).context("response is not a JSON array")?;

        Ok(raw
            .into_iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?.trim().to_string();
                let roll_no = entry.get("rollNo")?.as_str()?.trim().to_string();
                if name.is_empty() || roll_no.is_empty() {
                    return None;
                }
                Some(GeneratedStudent {
                    name,
                    roll_no,
                    email: entry
                        .get("email")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    is_cr: entry.get("isCR").and_then(|v| v.as_bool()).unwrap_or(false),
                })
            })
            .collect())
    }

    fn generate_insight(
        &self,
        subject_name: &str,
        total_students: i64,
        present_count: i64,
        date: &str,
    ) -> anyhow::Result<String> {
        let prompt = format!(
            "Analyze this attendance data: Course: {subject_name}, Date: {date}, \
             Present: {present_count}/{total_students}. \
             Give a 1-sentence professional summary or observation suitable for a \
             dashboard notification."
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self.generate_content(body)?;
        Ok(Self::response_text(&response).unwrap_or_default().to_string())
    }
}
