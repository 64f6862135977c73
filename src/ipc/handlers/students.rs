use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use super::common::{
    class_exists, db_conn, is_unique_violation, optional_str, required_i64, required_str,
    HandlerErr,
};

const STATUSES: [&str; 4] = ["active", "transferred", "withdrawn", "completed"];

fn validate_status(status: &str) -> Result<(), HandlerErr> {
    if STATUSES.contains(&status) {
        return Ok(());
    }
    Err(
        HandlerErr::new("bad_params", "status must be one of: active, transferred, withdrawn, completed")
            .with_details(json!({ "status": status })),
    )
}

fn student_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "enrollmentNo": row.get::<_, String>(2)?,
        "classId": row.get::<_, Option<String>>(3)?,
        "status": row.get::<_, String>(4)?,
        "year": row.get::<_, i64>(5)?,
        "birthDate": row.get::<_, Option<String>>(6)?,
        "guardianContact": row.get::<_, Option<String>>(7)?,
        "movementType": row.get::<_, Option<String>>(8)?,
        "movementDate": row.get::<_, Option<String>>(9)?,
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let class_id = optional_str(&req.params, "classId");
    let status = optional_str(&req.params, "status");
    // Name filter is a substring pattern, case-insensitive via LIKE.
    let search = optional_str(&req.params, "search").map(|s| format!("%{}%", s));

    let mut stmt = match conn.prepare(
        "SELECT id, name, enrollment_no, class_id, status, year,
                birth_date, guardian_contact, movement_type, movement_date
         FROM students
         WHERE (?1 IS NULL OR class_id = ?1)
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR name LIKE ?3)
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((class_id, status, search), student_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct StudentFields {
    name: String,
    enrollment_no: String,
    class_id: Option<String>,
    year: i64,
    rg: Option<String>,
    cpf: Option<String>,
    birth_date: Option<String>,
    birthplace: Option<String>,
    father_name: Option<String>,
    mother_name: Option<String>,
    guardian_contact: Option<String>,
}

fn parse_student_fields(params: &serde_json::Value) -> Result<StudentFields, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    let enrollment_no = required_str(params, "enrollmentNo")?.trim().to_string();
    if enrollment_no.is_empty() {
        return Err(HandlerErr::new("bad_params", "enrollmentNo must not be empty"));
    }
    Ok(StudentFields {
        name,
        enrollment_no,
        class_id: optional_str(params, "classId"),
        year: required_i64(params, "year")?,
        rg: optional_str(params, "rg"),
        cpf: optional_str(params, "cpf"),
        birth_date: optional_str(params, "birthDate"),
        birthplace: optional_str(params, "birthplace"),
        father_name: optional_str(params, "fatherName"),
        mother_name: optional_str(params, "motherName"),
        guardian_contact: optional_str(params, "guardianContact"),
    })
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_student_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Some(cid) = f.class_id.as_deref() {
        match class_exists(conn, cid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return e.response(&req.id),
        }
    }

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(
            id, name, enrollment_no, class_id, rg, cpf, birth_date, birthplace,
            father_name, mother_name, guardian_contact, status, year)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)",
        (
            &student_id,
            &f.name,
            &f.enrollment_no,
            &f.class_id,
            &f.rg,
            &f.cpf,
            &f.birth_date,
            &f.birthplace,
            &f.father_name,
            &f.mother_name,
            &f.guardian_contact,
            f.year,
        ),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "duplicate_enrollment",
                "a student with this enrollment number already exists",
                Some(json!({ "enrollmentNo": f.enrollment_no })),
            );
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "name": f.name }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_student_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Some(cid) = f.class_id.as_deref() {
        match class_exists(conn, cid) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "class not found", None),
            Err(e) => return e.response(&req.id),
        }
    }

    let updated = match conn.execute(
        "UPDATE students
         SET name = ?, enrollment_no = ?, class_id = ?, rg = ?, cpf = ?,
             birth_date = ?, birthplace = ?, father_name = ?, mother_name = ?,
             guardian_contact = ?, year = ?
         WHERE id = ?",
        (
            &f.name,
            &f.enrollment_no,
            &f.class_id,
            &f.rg,
            &f.cpf,
            &f.birth_date,
            &f.birthplace,
            &f.father_name,
            &f.mother_name,
            &f.guardian_contact,
            f.year,
            &student_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => {
            if is_unique_violation(&e) {
                return err(
                    &req.id,
                    "duplicate_enrollment",
                    "a student with this enrollment number already exists",
                    Some(json!({ "enrollmentNo": f.enrollment_no })),
                );
            }
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    };

    if updated == 0 {
        return err(&req.id, "not_found", "student not found", None);
    }
    ok(&req.id, json!({ "studentId": student_id }))
}

/// Lifecycle change: soft retire (or reactivate) plus the movement fields
/// the transfer report tabulates.
fn handle_students_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status = match required_str(&req.params, "status") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_status(&status) {
        return e.response(&req.id);
    }

    let movement_type = optional_str(&req.params, "movementType");
    let movement_from = optional_str(&req.params, "movementFrom");
    let movement_to = optional_str(&req.params, "movementTo");
    let movement_date = optional_str(&req.params, "movementDate");

    let updated = match conn.execute(
        "UPDATE students
         SET status = ?, movement_type = ?, movement_from = ?, movement_to = ?,
             movement_date = ?
         WHERE id = ?",
        (
            &status,
            &movement_type,
            &movement_from,
            &movement_to,
            &movement_date,
            &student_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    if updated == 0 {
        return err(&req.id, "not_found", "student not found", None);
    }
    ok(&req.id, json!({ "studentId": student_id, "status": status }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    for (table, sql) in [
        ("grades", "DELETE FROM grades WHERE student_id = ?"),
        ("attendance", "DELETE FROM attendance WHERE student_id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.setStatus" => Some(handle_students_set_status(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
