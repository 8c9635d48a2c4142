use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

/// Fallback CR password: used at login when a student has no password set,
/// and assigned to AI-generated students.
pub const DEFAULT_CR_PASSWORD: &str = "12345";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    pub degree: String,
    pub department: String,
    pub year: i64,
    pub semester: i64,
    pub is_cr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub subject_id: String,
    pub degree: String,
    pub department: String,
    pub year: i64,
    pub semester: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub date: String,
    pub subject_id: String,
    pub student_id: String,
    pub status: String,
    pub marked_by: String,
}

/// The (degree, department, year, semester) grouping that defines a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub degree: String,
    pub department: String,
    pub year: i64,
    pub semester: i64,
}

impl Cohort {
    pub fn label(&self) -> String {
        format!(
            "{} - {} - Y{} / S{}",
            self.degree, self.department, self.year, self.semester
        )
    }
}

impl Student {
    pub fn cohort(&self) -> Cohort {
        Cohort {
            degree: self.degree.clone(),
            department: self.department.clone(),
            year: self.year,
            semester: self.semester,
        }
    }
}

impl Assignment {
    pub fn cohort(&self) -> Cohort {
        Cohort {
            degree: self.degree.clone(),
            department: self.department.clone(),
            year: self.year,
            semester: self.semester,
        }
    }
}

/// Opens the transient application store. Everything lives in memory and is
/// gone when the process exits.
pub fn open_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;

    // No foreign keys anywhere: attendance records must survive deletion of
    // the student or subject they reference, and queries join defensively.
    conn.execute(
        "CREATE TABLE students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            degree TEXT NOT NULL,
            department TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL,
            is_cr INTEGER NOT NULL,
            email TEXT,
            password TEXT,
            security_question TEXT,
            security_answer TEXT
        )",
        [],
    )?;
    // Roll numbers double as the CR login key, so they are unique here at the
    // store boundary.
    conn.execute(
        "CREATE UNIQUE INDEX idx_students_roll_no ON students(roll_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_students_cohort ON students(degree, department, year, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE assignments(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            degree TEXT NOT NULL,
            department TEXT NOT NULL,
            year INTEGER NOT NULL,
            semester INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_assignments_subject ON assignments(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_assignments_cohort ON assignments(degree, department, year, semester)",
        [],
    )?;

    // Append-only log. rowid order is insertion order, which aggregation
    // relies on for latest-record-wins.
    conn.execute(
        "CREATE TABLE attendance_records(
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL,
            marked_by TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_attendance_subject ON attendance_records(subject_id)",
        [],
    )?;

    seed_subjects(&conn)?;
    Ok(conn)
}

fn seed_subjects(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        ("cs101", "Introduction to Programming", "CS101"),
    )?;
    conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        ("cs102", "Data Structures & Algorithms", "CS201"),
    )?;
    Ok(())
}

// ---- students ----

const STUDENT_COLS: &str = "id, name, roll_no, degree, department, year, semester, is_cr, \
     email, password, security_question, security_answer";

fn row_to_student(r: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        name: r.get(1)?,
        roll_no: r.get(2)?,
        degree: r.get(3)?,
        department: r.get(4)?,
        year: r.get(5)?,
        semester: r.get(6)?,
        is_cr: r.get::<_, i64>(7)? != 0,
        email: r.get(8)?,
        password: r.get(9)?,
        security_question: r.get(10)?,
        security_answer: r.get(11)?,
    })
}

pub fn students_all(conn: &Connection) -> rusqlite::Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLS} FROM students ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([], |r| row_to_student(r))?;
    rows.collect()
}

pub fn students_in_cohort(conn: &Connection, cohort: &Cohort) -> rusqlite::Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLS} FROM students
         WHERE degree = ? AND department = ? AND year = ? AND semester = ?
         ORDER BY rowid"
    ))?;
    let rows = stmt.query_map(
        (&cohort.degree, &cohort.department, cohort.year, cohort.semester),
        |r| row_to_student(r),
    )?;
    rows.collect()
}

pub fn student_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?"),
        [id],
        |r| row_to_student(r),
    )
    .optional()
}

pub fn student_by_roll_no(conn: &Connection, roll_no: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!("SELECT {STUDENT_COLS} FROM students WHERE roll_no = ?"),
        [roll_no],
        |r| row_to_student(r),
    )
    .optional()
}

/// True when another student (excluding `exclude_id`, if given) already holds
/// the roll number.
pub fn roll_no_taken(
    conn: &Connection,
    roll_no: &str,
    exclude_id: Option<&str>,
) -> rusqlite::Result<bool> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE roll_no = ?",
            [roll_no],
            |r| r.get(0),
        )
        .optional()?;
    Ok(match existing {
        Some(id) => exclude_id != Some(id.as_str()),
        None => false,
    })
}

pub fn insert_student(conn: &Connection, s: &Student) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO students(id, name, roll_no, degree, department, year, semester, is_cr,
                              email, password, security_question, security_answer)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &s.id,
            &s.name,
            &s.roll_no,
            &s.degree,
            &s.department,
            s.year,
            s.semester,
            s.is_cr as i64,
            &s.email,
            &s.password,
            &s.security_question,
            &s.security_answer,
        ),
    )?;
    Ok(())
}

pub fn update_student(conn: &Connection, s: &Student) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE students SET name = ?, roll_no = ?, degree = ?, department = ?, year = ?,
                             semester = ?, is_cr = ?, email = ?, password = ?,
                             security_question = ?, security_answer = ?
         WHERE id = ?",
        (
            &s.name,
            &s.roll_no,
            &s.degree,
            &s.department,
            s.year,
            s.semester,
            s.is_cr as i64,
            &s.email,
            &s.password,
            &s.security_question,
            &s.security_answer,
            &s.id,
        ),
    )
}

pub fn delete_student(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM students WHERE id = ?", [id])
}

pub fn set_student_password(conn: &Connection, id: &str, password: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE students SET password = ? WHERE id = ?",
        (password, id),
    )
}

// ---- subjects ----

pub fn subjects_all(conn: &Connection) -> rusqlite::Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name, code FROM subjects ORDER BY rowid")?;
    let rows = stmt.query_map([], |r| {
        Ok(Subject {
            id: r.get(0)?,
            name: r.get(1)?,
            code: r.get(2)?,
        })
    })?;
    rows.collect()
}

pub fn subject_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<Subject>> {
    conn.query_row(
        "SELECT id, name, code FROM subjects WHERE id = ?",
        [id],
        |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
            })
        },
    )
    .optional()
}

pub fn insert_subject(conn: &Connection, s: &Subject) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        (&s.id, &s.name, &s.code),
    )?;
    Ok(())
}

pub fn update_subject(conn: &Connection, s: &Subject) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE subjects SET name = ?, code = ? WHERE id = ?",
        (&s.name, &s.code, &s.id),
    )
}

/// Deletes a subject and every assignment referencing it in one transaction.
/// Attendance records for the subject are left in place.
/// Returns the number of assignments removed.
pub fn delete_subject_cascade(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let assignments_removed = tx.execute("DELETE FROM assignments WHERE subject_id = ?", [id])?;
    tx.execute("DELETE FROM subjects WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(assignments_removed)
}

// ---- assignments ----

pub fn assignments_all(conn: &Connection) -> rusqlite::Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_id, degree, department, year, semester
         FROM assignments ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok(Assignment {
            id: r.get(0)?,
            subject_id: r.get(1)?,
            degree: r.get(2)?,
            department: r.get(3)?,
            year: r.get(4)?,
            semester: r.get(5)?,
        })
    })?;
    rows.collect()
}

pub fn assignment_exists(
    conn: &Connection,
    subject_id: &str,
    cohort: &Cohort,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM assignments
         WHERE subject_id = ? AND degree = ? AND department = ? AND year = ? AND semester = ?",
        (
            subject_id,
            &cohort.degree,
            &cohort.department,
            cohort.year,
            cohort.semester,
        ),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

pub fn insert_assignment(conn: &Connection, a: &Assignment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO assignments(id, subject_id, degree, department, year, semester)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &a.id,
            &a.subject_id,
            &a.degree,
            &a.department,
            a.year,
            a.semester,
        ),
    )?;
    Ok(())
}

pub fn delete_assignment(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM assignments WHERE id = ?", [id])
}

/// Resolves the subjects taught to a cohort. Assignments whose subject no
/// longer exists are dropped; result order is subject insertion order.
///
/// `match_empty_degree` enables the legacy-data rule used when resolving a
/// CR's own subjects: an assignment with an empty degree matches any degree.
/// Admin filtered views pass `false` and match all four fields exactly.
pub fn subjects_for_cohort(
    conn: &Connection,
    cohort: &Cohort,
    match_empty_degree: bool,
) -> rusqlite::Result<Vec<Subject>> {
    let sql = if match_empty_degree {
        "SELECT subject_id FROM assignments
         WHERE (degree = ? OR degree = '') AND department = ? AND year = ? AND semester = ?"
    } else {
        "SELECT subject_id FROM assignments
         WHERE degree = ? AND department = ? AND year = ? AND semester = ?"
    };
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(
            (&cohort.degree, &cohort.department, cohort.year, cohort.semester),
            |r| r.get::<_, String>(0),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let subjects = subjects_all(conn)?;
    Ok(subjects
        .into_iter()
        .filter(|s| ids.contains(&s.id))
        .collect())
}

// ---- attendance ----

pub fn attendance_for_subject(
    conn: &Connection,
    subject_id: &str,
) -> rusqlite::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, subject_id, student_id, status, marked_by
         FROM attendance_records
         WHERE subject_id = ?
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map([subject_id], |r| {
        Ok(AttendanceRecord {
            id: r.get(0)?,
            date: r.get(1)?,
            subject_id: r.get(2)?,
            student_id: r.get(3)?,
            status: r.get(4)?,
            marked_by: r.get(5)?,
        })
    })?;
    rows.collect()
}

/// Bulk append of one submission. All records land together or not at all.
pub fn insert_attendance_batch(
    conn: &Connection,
    records: &[AttendanceRecord],
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for rec in records {
        tx.execute(
            "INSERT INTO attendance_records(id, date, subject_id, student_id, status, marked_by)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &rec.id,
                &rec.date,
                &rec.subject_id,
                &rec.student_id,
                &rec.status,
                &rec.marked_by,
            ),
        )?;
    }
    tx.commit()?;
    Ok(())
}
