use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use super::common::{
    db_conn, optional_i64, optional_str, required_i64, required_str, HandlerErr,
};

fn staff_name(conn: &Connection, staff_id: Option<&str>) -> Result<Option<String>, HandlerErr> {
    let Some(id) = staff_id else {
        return Ok(None);
    };
    conn.query_row("SELECT name FROM staff WHERE id = ?", [id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    let year = optional_i64(&req.params, "year");

    // Correlated subquery for the roster count so joins can't double-count;
    // only active students count toward occupancy.
    let sql = "SELECT
           c.id, c.name, c.grade_level, c.shift, c.year, c.capacity,
           c.teacher_id, c.teacher2_id,
           (SELECT COUNT(*) FROM students s
             WHERE s.class_id = c.id AND s.status = 'active') AS enrolled
         FROM classes c
         WHERE (?1 IS NULL OR c.year = ?1)
         ORDER BY c.shift, c.name";

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([year], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade_level: String = row.get(2)?;
            let shift: String = row.get(3)?;
            let year: i64 = row.get(4)?;
            let capacity: Option<i64> = row.get(5)?;
            let teacher_id: Option<String> = row.get(6)?;
            let teacher2_id: Option<String> = row.get(7)?;
            let enrolled: i64 = row.get(8)?;
            Ok((
                id,
                name,
                grade_level,
                shift,
                year,
                capacity,
                teacher_id,
                teacher2_id,
                enrolled,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut classes = Vec::with_capacity(rows.len());
    for (id, name, grade_level, shift, year, capacity, teacher_id, teacher2_id, enrolled) in rows
    {
        let teacher_name = match staff_name(conn, teacher_id.as_deref()) {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        };
        let teacher2_name = match staff_name(conn, teacher2_id.as_deref()) {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        };
        classes.push(json!({
            "id": id,
            "name": name,
            "gradeLevel": grade_level,
            "shift": shift,
            "year": year,
            "capacity": capacity,
            "teacherId": teacher_id,
            "teacherName": teacher_name,
            "teacher2Id": teacher2_id,
            "teacher2Name": teacher2_name,
            "enrolled": enrolled,
            "occupancyPercent": calc::occupancy(enrolled, capacity),
        }));
    }

    ok(&req.id, json!({ "classes": classes }))
}

struct ClassFields {
    name: String,
    grade_level: String,
    shift: String,
    year: i64,
    capacity: Option<i64>,
    teacher_id: Option<String>,
    teacher2_id: Option<String>,
}

fn parse_class_fields(params: &serde_json::Value) -> Result<ClassFields, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    Ok(ClassFields {
        name,
        grade_level: required_str(params, "gradeLevel")?,
        shift: required_str(params, "shift")?,
        year: required_i64(params, "year")?,
        capacity: optional_i64(params, "capacity"),
        teacher_id: optional_str(params, "teacherId"),
        teacher2_id: optional_str(params, "teacher2Id"),
    })
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_class_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, grade_level, shift, year, capacity, teacher_id, teacher2_id)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &class_id,
            &f.name,
            &f.grade_level,
            &f.shift,
            f.year,
            f.capacity,
            &f.teacher_id,
            &f.teacher2_id,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": f.name }))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_class_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let updated = match conn.execute(
        "UPDATE classes
         SET name = ?, grade_level = ?, shift = ?, year = ?, capacity = ?,
             teacher_id = ?, teacher2_id = ?
         WHERE id = ?",
        (
            &f.name,
            &f.grade_level,
            &f.shift,
            f.year,
            f.capacity,
            &f.teacher_id,
            &f.teacher2_id,
            &class_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    if updated == 0 {
        return err(&req.id, "not_found", "class not found", None);
    }
    ok(&req.id, json!({ "classId": class_id }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for (table, sql) in [
        ("grades", "DELETE FROM grades WHERE class_id = ?"),
        ("attendance", "DELETE FROM attendance WHERE class_id = ?"),
        (
            "schedule_slots",
            "DELETE FROM schedule_slots WHERE class_id = ?",
        ),
    ] {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    // Students survive the class; they lose the assignment and keep their
    // lifecycle status.
    if let Err(e) = tx.execute(
        "UPDATE students SET class_id = NULL WHERE class_id = ?",
        [&class_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    if let Err(e) = tx.execute("DELETE FROM classes WHERE id = ?", [&class_id]) {
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
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
