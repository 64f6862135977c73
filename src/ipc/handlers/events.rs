use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

use super::common::{db_conn, optional_i64, optional_str, required_str, HandlerErr};

fn handle_events_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "events": [] }));
    };

    // Optional YYYY-MM window; the calendar screen loads one month at a time.
    let month_prefix = match (
        optional_i64(&req.params, "year"),
        optional_i64(&req.params, "month"),
    ) {
        (Some(y), Some(m)) => {
            if !(1..=12).contains(&m) {
                return err(&req.id, "bad_params", "month must be between 1 and 12", None);
            }
            Some(format!("{:04}-{:02}-%", y, m))
        }
        _ => None,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, title, date, start_time, end_time, location, description
         FROM events
         WHERE (?1 IS NULL OR date LIKE ?1)
         ORDER BY date, start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([month_prefix], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "title": row.get::<_, String>(1)?,
                "date": row.get::<_, String>(2)?,
                "startTime": row.get::<_, Option<String>>(3)?,
                "endTime": row.get::<_, Option<String>>(4)?,
                "location": row.get::<_, Option<String>>(5)?,
                "description": row.get::<_, Option<String>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(events) => ok(&req.id, json!({ "events": events })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

struct EventFields {
    title: String,
    date: String,
    start_time: Option<String>,
    end_time: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

fn parse_event_fields(params: &serde_json::Value) -> Result<EventFields, HandlerErr> {
    let title = required_str(params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::new("bad_params", "title must not be empty"));
    }
    Ok(EventFields {
        title,
        date: required_str(params, "date")?,
        start_time: optional_str(params, "startTime"),
        end_time: optional_str(params, "endTime"),
        location: optional_str(params, "location"),
        description: optional_str(params, "description"),
    })
}

fn handle_events_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_event_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let event_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO events(id, title, date, start_time, end_time, location, description)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &event_id,
            &f.title,
            &f.date,
            &f.start_time,
            &f.end_time,
            &f.location,
            &f.description,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "eventId": event_id }))
}

fn handle_events_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let event_id = match required_str(&req.params, "eventId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let f = match parse_event_fields(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let updated = match conn.execute(
        "UPDATE events
         SET title = ?, date = ?, start_time = ?, end_time = ?, location = ?, description = ?
         WHERE id = ?",
        (
            &f.title,
            &f.date,
            &f.start_time,
            &f.end_time,
            &f.location,
            &f.description,
            &event_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "event not found", None);
    }
    ok(&req.id, json!({ "eventId": event_id }))
}

fn handle_events_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let event_id = match required_str(&req.params, "eventId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let deleted = match conn.execute("DELETE FROM events WHERE id = ?", [&event_id]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "event not found", None);
    }
    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.list" => Some(handle_events_list(state, req)),
        "events.create" => Some(handle_events_create(state, req)),
        "events.update" => Some(handle_events_update(state, req)),
        "events.delete" => Some(handle_events_delete(state, req)),
        _ => None,
    }
}
