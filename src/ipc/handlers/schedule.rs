use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

use super::common::{class_exists, db_conn, optional_str, required_str, HandlerErr};

const DAYS: [&str; 5] = ["mon", "tue", "wed", "thu", "fri"];

fn validate_day(day: &str) -> Result<(), HandlerErr> {
    if DAYS.contains(&day) {
        return Ok(());
    }
    Err(
        HandlerErr::new("bad_params", "day must be one of: mon, tue, wed, thu, fri")
            .with_details(json!({ "day": day })),
    )
}

fn handle_schedule_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }

    let mut stmt = match conn.prepare(
        "SELECT id, day, start_time, end_time, subject
         FROM schedule_slots
         WHERE class_id = ?
         ORDER BY day, start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "day": row.get::<_, String>(1)?,
                "startTime": row.get::<_, String>(2)?,
                "endTime": row.get::<_, String>(3)?,
                "subject": row.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(slots) => ok(&req.id, json!({ "classId": class_id, "slots": slots })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schedule_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let day = match required_str(&req.params, "day") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_day(&day) {
        return e.response(&req.id);
    }
    let start_time = match required_str(&req.params, "startTime") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let end_time = match required_str(&req.params, "endTime") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject = match required_str(&req.params, "subject") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }

    // Editing an existing slot passes its id; otherwise a new one is created.
    match optional_str(&req.params, "slotId") {
        Some(slot_id) => {
            let updated = match conn.execute(
                "UPDATE schedule_slots
                 SET day = ?, start_time = ?, end_time = ?, subject = ?
                 WHERE id = ? AND class_id = ?",
                (&day, &start_time, &end_time, &subject, &slot_id, &class_id),
            ) {
                Ok(n) => n,
                Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
            };
            if updated == 0 {
                return err(&req.id, "not_found", "schedule slot not found", None);
            }
            ok(&req.id, json!({ "slotId": slot_id }))
        }
        None => {
            let slot_id = Uuid::new_v4().to_string();
            if let Err(e) = conn.execute(
                "INSERT INTO schedule_slots(id, class_id, day, start_time, end_time, subject)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (&slot_id, &class_id, &day, &start_time, &end_time, &subject),
            ) {
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
            ok(&req.id, json!({ "slotId": slot_id }))
        }
    }
}

fn handle_schedule_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let slot_id = match required_str(&req.params, "slotId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let deleted = match conn.execute("DELETE FROM schedule_slots WHERE id = ?", [&slot_id]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "schedule slot not found", None);
    }
    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.list" => Some(handle_schedule_list(state, req)),
        "schedule.set" => Some(handle_schedule_set(state, req)),
        "schedule.delete" => Some(handle_schedule_delete(state, req)),
        _ => None,
    }
}
