use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

use super::common::{db_conn, is_unique_violation, optional_str, required_str, HandlerErr};

fn validate_role(role: &str) -> Result<(), HandlerErr> {
    match role {
        "teacher" | "management" => Ok(()),
        other => Err(
            HandlerErr::new("bad_params", "role must be one of: teacher, management")
                .with_details(json!({ "role": other })),
        ),
    }
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "staff": [] }));
    };

    let role = optional_str(&req.params, "role");

    let mut stmt = match conn.prepare(
        "SELECT id, name, enrollment_no, email, role, phone, status
         FROM staff
         WHERE (?1 IS NULL OR role = ?1)
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([role], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "enrollmentNo": row.get::<_, String>(2)?,
                "email": row.get::<_, String>(3)?,
                "role": row.get::<_, String>(4)?,
                "phone": row.get::<_, Option<String>>(5)?,
                "status": row.get::<_, String>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(staff) => ok(&req.id, json!({ "staff": staff })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct StaffFields {
    name: String,
    enrollment_no: String,
    email: String,
    role: String,
    phone: Option<String>,
}

fn parse_staff_fields(params: &serde_json::Value) -> Result<StaffFields, HandlerErr> {
    let name = required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    let role = required_str(params, "role")?;
    validate_role(&role)?;
    Ok(StaffFields {
        name,
        enrollment_no: required_str(params, "enrollmentNo")?,
        email: required_str(params, "email")?,
        role,
        phone: optional_str(params, "phone"),
    })
}

fn handle_staff_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_staff_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let staff_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO staff(id, name, enrollment_no, email, role, phone, status)
         VALUES(?, ?, ?, ?, ?, ?, 'active')",
        (
            &staff_id,
            &f.name,
            &f.enrollment_no,
            &f.email,
            &f.role,
            &f.phone,
        ),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "duplicate_enrollment",
                "a staff member with this enrollment number or email already exists",
                Some(json!({ "enrollmentNo": f.enrollment_no, "email": f.email })),
            );
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "staff" })),
        );
    }

    ok(&req.id, json!({ "staffId": staff_id, "name": f.name }))
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let staff_id = match required_str(&req.params, "staffId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_staff_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status = optional_str(&req.params, "status").unwrap_or_else(|| "active".to_string());

    let updated = match conn.execute(
        "UPDATE staff
         SET name = ?, enrollment_no = ?, email = ?, role = ?, phone = ?, status = ?
         WHERE id = ?",
        (
            &f.name,
            &f.enrollment_no,
            &f.email,
            &f.role,
            &f.phone,
            &status,
            &staff_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => {
            if is_unique_violation(&e) {
                return err(
                    &req.id,
                    "duplicate_enrollment",
                    "a staff member with this enrollment number or email already exists",
                    Some(json!({ "enrollmentNo": f.enrollment_no, "email": f.email })),
                );
            }
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    };

    if updated == 0 {
        return err(&req.id, "not_found", "staff member not found", None);
    }
    ok(&req.id, json!({ "staffId": staff_id }))
}

fn handle_staff_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let staff_id = match required_str(&req.params, "staffId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Classes keep existing without the assignment.
    if let Err(e) = conn.execute(
        "UPDATE classes SET teacher_id = NULL WHERE teacher_id = ?",
        [&staff_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = conn.execute(
        "UPDATE classes SET teacher2_id = NULL WHERE teacher2_id = ?",
        [&staff_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let deleted = match conn.execute("DELETE FROM staff WHERE id = ?", [&staff_id]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "staff member not found", None);
    }
    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.create" => Some(handle_staff_create(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        "staff.delete" => Some(handle_staff_delete(state, req)),
        _ => None,
    }
}
