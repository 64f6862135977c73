use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::render::TableModel;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

use super::attendance;
use super::common::{class_exists, db_conn, required_i64, required_str, HandlerErr};

fn emitted_line() -> String {
    format!("Emitido em: {}", chrono::Local::now().format("%d/%m/%Y"))
}

struct ClassSummary {
    id: String,
    name: String,
    capacity: Option<i64>,
    enrolled: i64,
}

fn class_summaries(conn: &Connection, year: i64) -> Result<Vec<ClassSummary>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.name, c.capacity,
                    (SELECT COUNT(*) FROM students s
                     WHERE s.class_id = c.id AND s.status = 'active') AS enrolled
             FROM classes c
             WHERE c.year = ?
             ORDER BY c.name",
        )
        .map_err(HandlerErr::query)?;
    stmt.query_map([year], |r| {
        Ok(ClassSummary {
            id: r.get(0)?,
            name: r.get(1)?,
            capacity: r.get(2)?,
            enrolled: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(HandlerErr::query)
}

/// Vacancies per class. Capacity is advisory: a class may run over it, in
/// which case vacancies bottom out at zero rather than going negative.
fn vacancies(capacity: i64, enrolled: i64) -> i64 {
    (capacity - enrolled).max(0)
}

fn handle_reports_capacity(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let classes = match class_summaries(conn, year) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut rows = Vec::with_capacity(classes.len() + 1);
    let mut total_enrolled = 0i64;
    let mut total_capacity = 0i64;
    for class in &classes {
        let capacity = calc::effective_capacity(class.capacity);
        total_enrolled += class.enrolled;
        total_capacity += capacity;
        rows.push(vec![
            class.name.clone(),
            capacity.to_string(),
            class.enrolled.to_string(),
            vacancies(capacity, class.enrolled).to_string(),
            calc::fmt_percent(calc::occupancy(class.enrolled, class.capacity)),
        ]);
    }
    let total_occupancy = if total_capacity > 0 {
        Some(100.0 * total_enrolled as f64 / total_capacity as f64)
    } else {
        None
    };
    rows.push(vec![
        "TOTAL".to_string(),
        total_capacity.to_string(),
        total_enrolled.to_string(),
        vacancies(total_capacity, total_enrolled).to_string(),
        calc::fmt_percent(total_occupancy),
    ]);

    let table = TableModel {
        title: "Relatório de Vagas e Ocupação".to_string(),
        meta: vec![format!("Ano letivo: {}", year), emitted_line()],
        head: vec![
            "Turma".to_string(),
            "Vagas".to_string(),
            "Matriculados".to_string(),
            "Disponíveis".to_string(),
            "Ocupação".to_string(),
        ],
        rows,
    };
    ok(&req.id, json!({ "table": table }))
}

fn handle_reports_enrollment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let classes = match class_summaries(conn, year) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Status breakdown per class, including students who left during the
    // year (their class link survives the status change).
    let mut rows = Vec::with_capacity(classes.len() + 1);
    let mut totals = [0i64; 4];
    for class in &classes {
        let mut counts = [0i64; 4];
        let mut stmt = match conn.prepare(
            "SELECT status, COUNT(*) FROM students
             WHERE class_id = ? GROUP BY status",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let pairs = stmt
            .query_map([&class.id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let pairs = match pairs {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        for (status, count) in pairs {
            let slot = match status.as_str() {
                "active" => 0,
                "transferred" => 1,
                "withdrawn" => 2,
                "completed" => 3,
                _ => continue,
            };
            counts[slot] += count;
            totals[slot] += count;
        }
        let class_total: i64 = counts.iter().sum();
        rows.push(vec![
            class.name.clone(),
            counts[0].to_string(),
            counts[1].to_string(),
            counts[2].to_string(),
            counts[3].to_string(),
            class_total.to_string(),
        ]);
    }
    rows.push(vec![
        "TOTAL".to_string(),
        totals[0].to_string(),
        totals[1].to_string(),
        totals[2].to_string(),
        totals[3].to_string(),
        totals.iter().sum::<i64>().to_string(),
    ]);

    let table = TableModel {
        title: "Relatório de Matrículas".to_string(),
        meta: vec![format!("Ano letivo: {}", year), emitted_line()],
        head: vec![
            "Turma".to_string(),
            "Ativos".to_string(),
            "Transferidos".to_string(),
            "Desistentes".to_string(),
            "Concluídos".to_string(),
            "Total".to_string(),
        ],
        rows,
    };
    ok(&req.id, json!({ "table": table }))
}

fn handle_reports_transfers(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let year = match required_i64(&req.params, "year") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT s.name, s.enrollment_no, COALESCE(c.name, ''), s.status,
                COALESCE(s.movement_type, ''), COALESCE(s.movement_from, ''),
                COALESCE(s.movement_to, ''), COALESCE(s.movement_date, '')
         FROM students s
         LEFT JOIN classes c ON c.id = s.class_id
         WHERE s.year = ? AND s.status != 'active'
         ORDER BY s.movement_date, s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([year], |r| {
            Ok(vec![
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, String>(7)?,
            ])
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let count = rows.len();
    let table = TableModel {
        title: "Relatório de Transferências e Movimentação".to_string(),
        meta: vec![
            format!("Ano letivo: {}", year),
            format!("Registros: {}", count),
            emitted_line(),
        ],
        head: vec![
            "Aluno".to_string(),
            "Matrícula".to_string(),
            "Turma".to_string(),
            "Situação".to_string(),
            "Movimentação".to_string(),
            "Origem".to_string(),
            "Destino".to_string(),
            "Data".to_string(),
        ],
        rows,
    };
    ok(&req.id, json!({ "table": table, "count": count }))
}

/// Class x subject grid with per-student derived means plus a class-mean
/// row per bimester column, averaging only the scores actually entered.
fn handle_reports_performance(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    if !calc::SUBJECTS.contains(&subject.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "unknown subject",
            Some(json!({ "subject": subject })),
        );
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

    let mut stmt = match conn.prepare(
        "SELECT s.name, g.b1, g.b2, g.b3, g.b4
         FROM students s
         LEFT JOIN grades g ON g.student_id = s.id
             AND g.class_id = s.class_id AND g.subject = ?2 AND g.year = ?3
         WHERE s.class_id = ?1 AND s.status = 'active'
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = stmt
        .query_map((&class_id, &subject, year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                [
                    r.get::<_, Option<f64>>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, Option<f64>>(3)?,
                    r.get::<_, Option<f64>>(4)?,
                ],
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut columns: [Vec<Option<f64>>; 4] = Default::default();
    let mut rows = Vec::with_capacity(students.len() + 1);
    for (name, scores) in &students {
        for (i, s) in scores.iter().enumerate() {
            columns[i].push(*s);
        }
        let mean = calc::annual_mean(*scores);
        rows.push(vec![
            name.clone(),
            calc::fmt_mean(scores[0]),
            calc::fmt_mean(scores[1]),
            calc::fmt_mean(scores[2]),
            calc::fmt_mean(scores[3]),
            calc::fmt_mean(mean),
            calc::situation(mean).as_str().to_string(),
        ]);
    }
    rows.push(vec![
        "Média da turma".to_string(),
        calc::fmt_mean(calc::bimester_mean(&columns[0])),
        calc::fmt_mean(calc::bimester_mean(&columns[1])),
        calc::fmt_mean(calc::bimester_mean(&columns[2])),
        calc::fmt_mean(calc::bimester_mean(&columns[3])),
        String::new(),
        String::new(),
    ]);

    let table = TableModel {
        title: "Relatório de Desempenho".to_string(),
        meta: vec![
            format!("Disciplina: {}", subject),
            format!("Ano letivo: {}", year),
            emitted_line(),
        ],
        head: vec![
            "Aluno".to_string(),
            "1º Bim".to_string(),
            "2º Bim".to_string(),
            "3º Bim".to_string(),
            "4º Bim".to_string(),
            "Média".to_string(),
            "Situação".to_string(),
        ],
        rows,
    };
    ok(&req.id, json!({ "table": table }))
}

/// End-of-year ledger for one class: one row per active student with the
/// annual mean of every subject, closed by the overall situation. Subjects
/// with an incomplete set of bimestral scores stay "-".
fn handle_reports_ata_final(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let class: Option<(String, String)> = match conn
        .query_row(
            "SELECT name, shift FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((class_name, shift)) = class else {
        return err(&req.id, "not_found", "class not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name FROM students
         WHERE class_id = ? AND status = 'active'
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = stmt
        .query_map([&class_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Every grade row of the class for the year, keyed student -> subject.
    let mut stmt = match conn.prepare(
        "SELECT student_id, subject, b1, b2, b3, b4
         FROM grades
         WHERE class_id = ? AND year = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grade_rows = stmt
        .query_map((&class_id, year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                [
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, Option<f64>>(3)?,
                    r.get::<_, Option<f64>>(4)?,
                    r.get::<_, Option<f64>>(5)?,
                ],
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let grade_rows = match grade_rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut grades: HashMap<String, HashMap<String, [Option<f64>; 4]>> = HashMap::new();
    for (student_id, subject, scores) in grade_rows {
        grades.entry(student_id).or_default().insert(subject, scores);
    }

    let mut rows = Vec::with_capacity(students.len());
    for (number, (id, name)) in students.iter().enumerate() {
        let mut row = Vec::with_capacity(calc::SUBJECTS.len() + 3);
        row.push(format!("{:02}", number + 1));
        row.push(name.clone());
        let mut means = Vec::with_capacity(calc::SUBJECTS.len());
        for subject in calc::SUBJECTS {
            let scores = grades
                .get(id)
                .and_then(|m| m.get(subject))
                .copied()
                .unwrap_or_default();
            let mean = calc::annual_mean(scores);
            means.push(mean);
            row.push(calc::fmt_mean(mean));
        }
        let overall = calc::overall_mean(&means);
        row.push(calc::situation(overall).as_str().to_string());
        rows.push(row);
    }

    let mut head = Vec::with_capacity(calc::SUBJECTS.len() + 3);
    head.push("Nº".to_string());
    head.push("Aluno".to_string());
    head.extend(calc::SUBJECTS.iter().map(|s| s.to_string()));
    head.push("Situação".to_string());

    let table = TableModel {
        title: "Ata Final".to_string(),
        meta: vec![
            format!("Turma: {}", class_name),
            format!("Turno: {}", shift),
            format!("Ano letivo: {}", year),
            format!("Alunos ativos: {}", students.len()),
            emitted_line(),
        ],
        head,
        rows,
    };
    ok(&req.id, json!({ "table": table }))
}

fn month_bounds(year: i64, month: i64) -> Result<(String, String), HandlerErr> {
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::new("bad_params", "month must be between 1 and 12"));
    }
    let first = NaiveDate::from_ymd_opt(year as i32, month as u32, 1)
        .ok_or_else(|| HandlerErr::new("bad_params", "invalid year/month"))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year as i32 + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1)
    };
    let last = next
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| HandlerErr::new("bad_params", "invalid year/month"))?;
    Ok((first.to_string(), last.to_string()))
}

fn handle_reports_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }
    let (first, last) = match month_bounds(year, month) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let tallies = match attendance::month_tallies(conn, &class_id, &first, &last) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name FROM students
         WHERE class_id = ? AND status = 'active'
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = stmt
        .query_map([&class_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut rows = Vec::with_capacity(students.len() + 1);
    let mut total = calc::AttendanceTally::default();
    for (id, name) in &students {
        let t = tallies.get(id).copied().unwrap_or_default();
        total.present += t.present;
        total.absent += t.absent;
        total.justified += t.justified;
        rows.push(vec![
            name.clone(),
            t.present.to_string(),
            t.absent.to_string(),
            t.justified.to_string(),
            calc::fmt_percent(calc::attendance_percent(t)),
        ]);
    }
    rows.push(vec![
        "TOTAL".to_string(),
        total.present.to_string(),
        total.absent.to_string(),
        total.justified.to_string(),
        calc::fmt_percent(calc::attendance_percent(total)),
    ]);

    let table = TableModel {
        title: "Relatório de Frequência".to_string(),
        meta: vec![
            format!("Período: {:02}/{}", month, year),
            emitted_line(),
        ],
        head: vec![
            "Aluno".to_string(),
            "Presenças".to_string(),
            "Faltas".to_string(),
            "Justificadas".to_string(),
            "Frequência".to_string(),
        ],
        rows,
    };
    ok(&req.id, json!({ "table": table }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.capacity" => Some(handle_reports_capacity(state, req)),
        "reports.enrollment" => Some(handle_reports_enrollment(state, req)),
        "reports.transfers" => Some(handle_reports_transfers(state, req)),
        "reports.performance" => Some(handle_reports_performance(state, req)),
        "reports.ataFinal" => Some(handle_reports_ata_final(state, req)),
        "reports.attendance" => Some(handle_reports_attendance(state, req)),
        _ => None,
    }
}
