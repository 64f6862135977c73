use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use super::common::{class_exists, db_conn, required_i64, required_str, HandlerErr};

fn validate_subject(subject: &str) -> Result<(), HandlerErr> {
    if calc::SUBJECTS.contains(&subject) {
        return Ok(());
    }
    Err(HandlerErr::new("bad_params", "unknown subject")
        .with_details(json!({ "subject": subject })))
}

fn parse_score(value: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    let v = value.get(key);
    match v {
        None => Ok(None),
        Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => {
            let score = raw.as_f64().ok_or_else(|| {
                HandlerErr::new("bad_params", format!("{} must be a number or null", key))
            })?;
            if !(0.0..=10.0).contains(&score) {
                return Err(HandlerErr::new(
                    "bad_params",
                    format!("{} must be between 0 and 10", key),
                )
                .with_details(json!({ key: score })));
            }
            Ok(Some(score))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bimesters([Option<f64>; 4]);

impl Bimesters {
    fn mean(self) -> Option<f64> {
        calc::annual_mean(self.0)
    }
}

#[derive(Debug, Clone)]
struct GradeRow {
    scores: Bimesters,
    annual_mean: Option<f64>,
    situation: Option<String>,
}

/// Grid for one class x subject x year: every active student appears, with
/// whatever scores were entered. The mean and situation come back from the
/// write-through columns maintained by [`handle_grades_save`]; students
/// without a row yet show no mean and "In progress".
fn handle_grades_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject = match required_str(&req.params, "subject") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_subject(&subject) {
        return e.response(&req.id);
    }
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }

    let students = match list_active_students(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut grades: HashMap<String, GradeRow> = HashMap::new();
    {
        let mut stmt = match conn.prepare(
            "SELECT student_id, b1, b2, b3, b4, annual_mean, situation
             FROM grades
             WHERE class_id = ? AND subject = ? AND year = ?",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map((&class_id, &subject, year), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    GradeRow {
                        scores: Bimesters([r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?]),
                        annual_mean: r.get(5)?,
                        situation: r.get(6)?,
                    },
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        match rows {
            Ok(v) => {
                for (sid, g) in v {
                    grades.insert(sid, g);
                }
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let rows: Vec<serde_json::Value> = students
        .into_iter()
        .map(|(id, name, enrollment_no)| {
            let g = grades.remove(&id).unwrap_or_else(|| GradeRow {
                scores: Bimesters::default(),
                annual_mean: None,
                situation: None,
            });
            let situation = g
                .situation
                .unwrap_or_else(|| calc::situation(g.annual_mean).as_str().to_string());
            json!({
                "studentId": id,
                "name": name,
                "enrollmentNo": enrollment_no,
                "b1": g.scores.0[0],
                "b2": g.scores.0[1],
                "b3": g.scores.0[2],
                "b4": g.scores.0[3],
                "annualMean": g.annual_mean,
                "situation": situation,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "subject": subject,
            "year": year,
            "rows": rows,
        }),
    )
}

fn list_active_students(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<(String, String, String)>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, enrollment_no
             FROM students
             WHERE class_id = ? AND status = 'active'
             ORDER BY name",
        )
        .map_err(HandlerErr::query)?;
    stmt.query_map([class_id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)
}

/// Batch upsert keyed by (student, class, subject, year). The derived
/// annual mean and situation are recomputed write-through on every save;
/// an entry with all four scores null is stored as-is (scores can be
/// cleared again before the bimester closes).
fn handle_grades_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let subject = match required_str(&req.params, "subject") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = validate_subject(&subject) {
        return e.response(&req.id);
    }
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing entries", None);
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }

    // Validate everything up front so a bad entry aborts before any write.
    let mut parsed: Vec<(String, Bimesters)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let student_id = match entry.get("studentId").and_then(|v| v.as_str()) {
            Some(v) => v.to_string(),
            None => return err(&req.id, "bad_params", "entry missing studentId", None),
        };
        let b = Bimesters([
            match parse_score(entry, "b1") {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            },
            match parse_score(entry, "b2") {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            },
            match parse_score(entry, "b3") {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            },
            match parse_score(entry, "b4") {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            },
        ]);
        parsed.push((student_id, b));
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let mut saved = 0usize;
    for (student_id, b) in &parsed {
        let mean = b.mean();
        let situation = calc::situation(mean).as_str();

        let existing: Option<String> = match tx
            .query_row(
                "SELECT id FROM grades
                 WHERE student_id = ? AND class_id = ? AND subject = ? AND year = ?",
                (student_id, &class_id, &subject, year),
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return err(&req.id, "db_query_failed", e.to_string(), None);
            }
        };

        let result = match existing {
            Some(gid) => tx.execute(
                "UPDATE grades
                 SET b1 = ?, b2 = ?, b3 = ?, b4 = ?, annual_mean = ?, situation = ?
                 WHERE id = ?",
                (b.0[0], b.0[1], b.0[2], b.0[3], mean, situation, &gid),
            ),
            None => tx.execute(
                "INSERT INTO grades(
                    id, student_id, class_id, subject, year,
                    b1, b2, b3, b4, annual_mean, situation)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    student_id,
                    &class_id,
                    &subject,
                    year,
                    b.0[0],
                    b.0[1],
                    b.0[2],
                    b.0[3],
                    mean,
                    situation,
                ),
            ),
        };
        if let Err(e) = result {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_write_failed",
                e.to_string(),
                Some(json!({ "studentId": student_id })),
            );
        }
        saved += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "saved": saved }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.get" => Some(handle_grades_get(state, req)),
        "grades.save" => Some(handle_grades_save(state, req)),
        _ => None,
    }
}
