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

fn cs_cohort() -> serde_json::Value {
    json!({
        "degree": "B.Tech",
        "department": "Computer Science",
        "year": 1,
        "semester": 1,
    })
}

fn with_cohort(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    let obj = base.as_object_mut().expect("cohort object");
    for (k, v) in extra.as_object().expect("extra object") {
        obj.insert(k.clone(), v.clone());
    }
    base
}

#[test]
fn bulk_assign_creates_once_and_counts_duplicates() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["cs101", "cs102"] })),
    );
    assert_eq!(first["created"], 2);
    assert_eq!(first["duplicates"], 0);
    assert_eq!(
        first["cohort"],
        "B.Tech - Computer Science - Y1 / S1"
    );

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["cs101"] })),
    );
    assert_eq!(second["created"], 0);
    assert_eq!(second["duplicates"], 1);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Operating Systems", "code": "CS301" }),
    );
    let os_id = created["subject"]["id"].as_str().expect("subject id").to_string();

    let mixed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["cs101", os_id] })),
    );
    assert_eq!(mixed["created"], 1);
    assert_eq!(mixed["duplicates"], 1);
}

#[test]
fn assign_validates_inputs_before_mutating() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": [] })),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.assign",
        json!({
            "degree": "B.Tech",
            "department": "Computer Science",
            "year": "one",
            "semester": 1,
            "subjectIds": ["cs101"],
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["nope"] })),
    );
    assert_eq!(code, "not_found");

    // Nothing landed.
    let grouped = request_ok(&mut stdin, &mut reader, "4", "assignments.listGrouped", json!({}));
    assert_eq!(grouped["groups"].as_array().expect("groups").len(), 0);
}

#[test]
fn grouped_listing_sorts_labels_and_keeps_insertion_order() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    // Created after the B.Tech group but sorting before it.
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["cs102", "cs101"] })),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.assign",
        json!({
            "degree": "B.Sc",
            "department": "Physics",
            "year": 2,
            "semester": 3,
            "subjectIds": ["cs101"],
        }),
    );

    let grouped = request_ok(&mut stdin, &mut reader, "3", "assignments.listGrouped", json!({}));
    let groups = grouped["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["label"], "B.Sc - Physics - Y2 / S3");
    assert_eq!(groups[1]["label"], "B.Tech - Computer Science - Y1 / S1");

    let members = groups[1]["assignments"].as_array().expect("assignments");
    let subject_ids: Vec<&str> = members
        .iter()
        .map(|a| a["subjectId"].as_str().expect("subject id"))
        .collect();
    assert_eq!(subject_ids, vec!["cs102", "cs101"]);
    assert_eq!(members[0]["subjectName"], "Data Structures & Algorithms");
    assert_eq!(members[0]["subjectCode"], "CS201");
}

#[test]
fn delete_removes_a_single_assignment() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.assign",
        with_cohort(cs_cohort(), json!({ "subjectIds": ["cs101", "cs102"] })),
    );
    let grouped = request_ok(&mut stdin, &mut reader, "2", "assignments.listGrouped", json!({}));
    let assignment_id = grouped["groups"][0]["assignments"][0]["id"]
        .as_str()
        .expect("assignment id")
        .to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.delete",
        json!({ "assignmentId": assignment_id }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.delete",
        json!({ "assignmentId": assignment_id }),
    );
    assert_eq!(code, "not_found");

    let grouped = request_ok(&mut stdin, &mut reader, "5", "assignments.listGrouped", json!({}));
    assert_eq!(
        grouped["groups"][0]["assignments"]
            .as_array()
            .expect("assignments")
            .len(),
        1
    );
}
