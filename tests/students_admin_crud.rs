use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_unitrackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("GEMINI_API_KEY")
        .spawn()
        .expect("spawn unitrackd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value["error"]["code"]
        .as_str()
        .expect("error code")
        .to_string()
}

fn student_params(name: &str, roll_no: &str) -> serde_json::Value {
    json!({
        "name": name,
        "rollNo": roll_no,
        "degree": "B.Tech",
        "department": "Computer Science",
        "year": 1,
        "semester": 1,
        "isCR": false,
    })
}

#[test]
fn create_validates_and_enforces_roll_uniqueness() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "name": "   ",
            "rollNo": "2024001",
            "degree": "B.Tech",
            "department": "Computer Science",
            "year": 1,
            "semester": 1,
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({
            "name": "Asha Rao",
            "rollNo": "2024001",
            "degree": "B.Tech",
            "department": "Computer Science",
            "year": 5,
            "semester": 1,
        }),
    );
    assert_eq!(code, "bad_params");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student_params("Asha Rao", "2024001"),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        student_params("Impostor", "2024001"),
    );
    assert_eq!(code, "duplicate_roll_no");

    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["students"].as_array().expect("students").len(), 1);
}

#[test]
fn update_replaces_fields_and_checks_collisions() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        student_params("Asha Rao", "2024001"),
    );
    let first_id = first["student"]["id"].as_str().expect("id").to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Vikram Iyer", "2024002"),
    );

    // Keeping your own roll number is not a collision.
    let mut params = student_params("Asha R. Rao", "2024001");
    params["studentId"] = json!(first_id);
    params["year"] = json!(2);
    params["semester"] = json!(3);
    let updated = request_ok(&mut stdin, &mut reader, "3", "students.update", params);
    assert_eq!(updated["student"]["name"], "Asha R. Rao");
    assert_eq!(updated["student"]["year"], 2);

    let mut params = student_params("Asha R. Rao", "2024002");
    params["studentId"] = json!(first_id);
    let code = request_err(&mut stdin, &mut reader, "4", "students.update", params);
    assert_eq!(code, "duplicate_roll_no");

    let mut params = student_params("Ghost", "2024099");
    params["studentId"] = json!("missing");
    let code = request_err(&mut stdin, &mut reader, "5", "students.update", params);
    assert_eq!(code, "not_found");
}

#[test]
fn delete_frees_the_roll_number() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        student_params("Asha Rao", "2024001"),
    );
    let student_id = created["student"]["id"].as_str().expect("id").to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(code, "not_found");

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        student_params("Asha Again", "2024001"),
    );
}

#[test]
fn generate_degrades_to_nothing_without_the_collaborator() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let generated = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.generate",
        json!({
            "degree": "B.Tech",
            "department": "Computer Science",
            "year": 1,
            "semester": 1,
            "count": 3,
        }),
    );
    assert_eq!(generated["created"], 0);
    assert_eq!(generated["skipped"], 0);
    assert_eq!(generated["students"].as_array().expect("students").len(), 0);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "students.generate",
        json!({
            "degree": "B.Tech",
            "department": "Computer Science",
            "year": 1,
            "semester": 1,
            "count": 0,
        }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn overview_counts_students_per_department() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        student_params("Asha Rao", "2024001"),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        student_params("Vikram Iyer", "2024002"),
    );
    let mut physics = student_params("Nilam Bose", "2024003");
    physics["department"] = json!("Physics");
    request_ok(&mut stdin, &mut reader, "3", "students.create", physics);

    let overview = request_ok(&mut stdin, &mut reader, "4", "stats.overview", json!({}));
    assert_eq!(overview["students"], 3);
    // The two seeded subjects.
    assert_eq!(overview["subjects"], 2);
    assert_eq!(overview["assignments"], 0);

    let per_dept = overview["studentsPerDepartment"].as_array().expect("departments");
    assert_eq!(per_dept[0]["department"], "Computer Science");
    assert_eq!(per_dept[0]["count"], 2);
    assert_eq!(per_dept[1]["department"], "Physics");
    assert_eq!(per_dept[1]["count"], 1);
}
