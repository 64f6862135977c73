use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{Datelike, NaiveDate, Weekday};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use super::common::{
    class_exists, db_conn, optional_str, required_i64, required_str, student_exists, HandlerErr,
};

const CYCLE: [&str; 3] = ["present", "absent", "justified"];

/// present -> absent -> justified -> present.
fn next_status(current: &str) -> &'static str {
    match current {
        "present" => "absent",
        "absent" => "justified",
        _ => "present",
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "date must be YYYY-MM-DD"))
}

/// School days of a month: weekdays only, weekends are skipped.
fn school_days(year: i32, month: u32) -> Result<Vec<NaiveDate>, HandlerErr> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| HandlerErr::new("bad_params", "month must be between 1 and 12"))?;
    let mut days = Vec::new();
    let mut day = first;
    while day.month() == month {
        if day.weekday() != Weekday::Sat && day.weekday() != Weekday::Sun {
            days.push(day);
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }
    Ok(days)
}

fn handle_attendance_month(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let month = match required_i64(&req.params, "month") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if !(1..=12).contains(&month) {
        return err(&req.id, "bad_params", "month must be between 1 and 12", None);
    }
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }

    let days = match school_days(year as i32, month as u32) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (first, last) = match (days.first(), days.last()) {
        (Some(f), Some(l)) => (f.to_string(), l.to_string()),
        _ => return err(&req.id, "bad_params", "month has no school days", None),
    };

    let mut students_stmt = match conn.prepare(
        "SELECT id, name, enrollment_no
         FROM students
         WHERE class_id = ? AND status = 'active'
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = students_stmt
        .query_map([&class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut cells_stmt = match conn.prepare(
        "SELECT student_id, date, status, justification
         FROM attendance
         WHERE class_id = ? AND date >= ? AND date <= ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let cells = cells_stmt
        .query_map((&class_id, &first, &last), |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "date": r.get::<_, String>(1)?,
                "status": r.get::<_, String>(2)?,
                "justification": r.get::<_, Option<String>>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let cells = match cells {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "year": year,
            "month": month,
            "days": days.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "students": students
                .into_iter()
                .map(|(id, name, enrollment_no)| json!({
                    "id": id,
                    "name": name,
                    "enrollmentNo": enrollment_no,
                }))
                .collect::<Vec<_>>(),
            "cells": cells,
        }),
    )
}

/// Advance one (student, date) cell through the three-state cycle. A cell
/// with no record yet materializes as "present" on first interaction.
/// Toggling away from "justified" clears the justification text.
fn handle_attendance_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let date = match required_str(&req.params, "date").and_then(|d| parse_date(&d).map(|_| d)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    let existing: Option<(String, String)> = match conn
        .query_row(
            "SELECT id, status FROM attendance
             WHERE student_id = ? AND class_id = ? AND date = ?",
            (&student_id, &class_id, &date),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let status = match existing {
        Some((record_id, current)) => {
            let status = next_status(&current);
            if let Err(e) = conn.execute(
                "UPDATE attendance SET status = ?, justification = NULL WHERE id = ?",
                (status, &record_id),
            ) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            status
        }
        None => {
            let status = CYCLE[0];
            if let Err(e) = conn.execute(
                "INSERT INTO attendance(id, student_id, class_id, date, status)
                 VALUES(?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &student_id,
                    &class_id,
                    &date,
                    status,
                ),
            ) {
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }
            status
        }
    };

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "date": date,
            "status": status,
        }),
    )
}

/// Mark a cell justified and attach the free-text justification, creating
/// the record when the cell was never touched.
fn handle_attendance_justify(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let date = match required_str(&req.params, "date").and_then(|d| parse_date(&d).map(|_| d)) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let justification = optional_str(&req.params, "justification").unwrap_or_default();
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    }

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM attendance
             WHERE student_id = ? AND class_id = ? AND date = ?",
            (&student_id, &class_id, &date),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let result = match existing {
        Some(record_id) => conn.execute(
            "UPDATE attendance SET status = 'justified', justification = ? WHERE id = ?",
            (&justification, &record_id),
        ),
        None => conn.execute(
            "INSERT INTO attendance(id, student_id, class_id, date, status, justification)
             VALUES(?, ?, ?, ?, 'justified', ?)",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                &class_id,
                &date,
                &justification,
            ),
        ),
    };
    if let Err(e) = result {
        return err(&req.id, "db_write_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "date": date,
            "status": "justified",
        }),
    )
}

/// Month tallies per student, shared with the attendance report.
pub fn month_tallies(
    conn: &rusqlite::Connection,
    class_id: &str,
    first: &str,
    last: &str,
) -> Result<std::collections::HashMap<String, calc::AttendanceTally>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status, COUNT(*)
             FROM attendance
             WHERE class_id = ? AND date >= ? AND date <= ?
             GROUP BY student_id, status",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((class_id, first, last), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut tallies: std::collections::HashMap<String, calc::AttendanceTally> =
        std::collections::HashMap::new();
    for (student_id, status, count) in rows {
        let t = tallies.entry(student_id).or_default();
        match status.as_str() {
            "present" => t.present += count,
            "absent" => t.absent += count,
            "justified" => t.justified += count,
            _ => {}
        }
    }
    Ok(tallies)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.month" => Some(handle_attendance_month(state, req)),
        "attendance.toggle" => Some(handle_attendance_toggle(state, req)),
        "attendance.justify" => Some(handle_attendance_justify(state, req)),
        _ => None,
    }
}
