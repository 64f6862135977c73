use crate::calc;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::render::{self, FieldMap, NOT_INFORMED};
use crate::templates;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::common::{class_exists, db_conn, required_str, HandlerErr};

const ARTIFACT_DIR: &str = "documents";

struct StudentRow {
    name: String,
    enrollment_no: String,
    class_id: Option<String>,
    rg: Option<String>,
    cpf: Option<String>,
    birth_date: Option<String>,
    birthplace: Option<String>,
    father_name: Option<String>,
    mother_name: Option<String>,
    guardian_contact: Option<String>,
}

struct ClassRow {
    name: String,
    grade_level: String,
    shift: String,
    year: i64,
}

fn load_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    conn.query_row(
        "SELECT name, enrollment_no, class_id, rg, cpf, birth_date, birthplace,
                father_name, mother_name, guardian_contact
         FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentRow {
                name: r.get(0)?,
                enrollment_no: r.get(1)?,
                class_id: r.get(2)?,
                rg: r.get(3)?,
                cpf: r.get(4)?,
                birth_date: r.get(5)?,
                birthplace: r.get(6)?,
                father_name: r.get(7)?,
                mother_name: r.get(8)?,
                guardian_contact: r.get(9)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)
}

fn load_class(conn: &Connection, class_id: &str) -> Result<Option<ClassRow>, HandlerErr> {
    conn.query_row(
        "SELECT name, grade_level, shift, year FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassRow {
                name: r.get(0)?,
                grade_level: r.get(1)?,
                shift: r.get(2)?,
                year: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)
}

/// Personal fields fall back to the "Not informed" placeholder when blank.
fn personal(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => NOT_INFORMED.to_string(),
    }
}

/// Stored dates are ISO (`YYYY-MM-DD`); documents show `dd/mm/yyyy`.
fn display_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) => d.format("%d/%m/%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

fn today() -> String {
    chrono::Local::now().format("%d/%m/%Y").to_string()
}

fn profile_field(profile: &serde_json::Value, key: &str) -> String {
    personal(
        profile
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    )
}

/// Resolve every token for one student's documents. A student with no class
/// on record still resolves: class-relationship tokens go blank instead of
/// aborting the render.
fn student_fields(
    conn: &Connection,
    student: &StudentRow,
    profile: &serde_json::Value,
) -> Result<FieldMap, HandlerErr> {
    let class = match &student.class_id {
        Some(id) => load_class(conn, id)?,
        None => None,
    };

    let mut fields = FieldMap::new();
    fields.insert("NOME_ALUNO".into(), student.name.clone());
    fields.insert("MATRICULA".into(), student.enrollment_no.clone());
    fields.insert("RG_ALUNO".into(), personal(student.rg.clone()));
    fields.insert("CPF_ALUNO".into(), personal(student.cpf.clone()));
    fields.insert(
        "DATA_NASCIMENTO".into(),
        match &student.birth_date {
            Some(d) if !d.trim().is_empty() => display_date(d),
            _ => NOT_INFORMED.to_string(),
        },
    );
    fields.insert("NATURALIDADE".into(), personal(student.birthplace.clone()));
    fields.insert("NOME_PAI".into(), personal(student.father_name.clone()));
    fields.insert("NOME_MAE".into(), personal(student.mother_name.clone()));
    fields.insert(
        "NOME_RESPONSAVEL".into(),
        personal(student.guardian_contact.clone()),
    );

    match &class {
        Some(c) => {
            fields.insert("TURMA".into(), c.name.clone());
            fields.insert("ANO_SERIE".into(), c.grade_level.clone());
            fields.insert("TURNO".into(), c.shift.clone());
            fields.insert("ANO_LETIVO".into(), c.year.to_string());
            fields.insert("ANO".into(), c.year.to_string());
        }
        None => {
            fields.insert("TURMA".into(), String::new());
            fields.insert("ANO_SERIE".into(), String::new());
            fields.insert("TURNO".into(), String::new());
            fields.insert("ANO_LETIVO".into(), String::new());
            fields.insert("ANO".into(), String::new());
        }
    }

    fields.insert("CIDADE".into(), profile_field(profile, "city"));
    fields.insert("NOME_DIRETOR".into(), profile_field(profile, "directorName"));
    fields.insert(
        "NIVEL_ENSINO".into(),
        profile_field(profile, "educationLevel"),
    );
    fields.insert("DATA".into(), today());
    fields.insert("DATA_EMISSAO".into(), today());

    Ok(fields)
}

fn load_profile(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    db::settings_get_json(conn, "school.profile")
        .map(|v| v.unwrap_or_else(|| json!({})))
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))
}

/// Subject lines for the report card's [NOTAS] block, one per subject that
/// has at least one score entered.
fn report_card_lines(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
    year: i64,
) -> Result<(String, Vec<Option<f64>>), HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT subject, b1, b2, b3, b4 FROM grades
             WHERE student_id = ? AND class_id = ? AND year = ?",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((student_id, class_id, year), |r| {
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
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut by_subject: std::collections::HashMap<String, [Option<f64>; 4]> =
        rows.into_iter().collect();

    let mut lines = Vec::new();
    let mut subject_means = Vec::new();
    for subject in calc::SUBJECTS {
        let Some(scores) = by_subject.remove(subject) else {
            continue;
        };
        if scores.iter().all(|s| s.is_none()) {
            continue;
        }
        let mean = calc::annual_mean(scores);
        lines.push(format!(
            "{}: {} | {} | {} | {} | Média: {}",
            subject,
            calc::fmt_mean(scores[0]),
            calc::fmt_mean(scores[1]),
            calc::fmt_mean(scores[2]),
            calc::fmt_mean(scores[3]),
            calc::fmt_mean(mean),
        ));
        subject_means.push(mean);
    }
    if lines.is_empty() {
        lines.push("Nenhuma nota lançada.".to_string());
    }
    Ok((lines.join("\n"), subject_means))
}

fn save_artifact(
    state: &AppState,
    file_name: &str,
    payload: &serde_json::Value,
) -> Result<String, HandlerErr> {
    let workspace = state
        .workspace
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let dir = workspace.join(ARTIFACT_DIR);
    std::fs::create_dir_all(&dir)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    let path = dir.join(file_name);
    let text = serde_json::to_string_pretty(payload)
        .map_err(|e| HandlerErr::new("io_failed", e.to_string()))?;
    std::fs::write(&path, text).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;
    Ok(path.to_string_lossy().to_string())
}

fn handle_documents_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let template_key = match required_str(&req.params, "templateKey") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(title) = templates::title(&template_key) else {
        return err(
            &req.id,
            "not_found",
            "unknown template",
            Some(json!({ "key": template_key })),
        );
    };
    let body = match super::templates::effective_body(state, &template_key) {
        Some(b) => b.to_string(),
        None => return err(&req.id, "not_found", "unknown template", None),
    };
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let student = match load_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return e.response(&req.id),
    };
    let profile = match load_profile(conn) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    let mut fields = match student_fields(conn, &student, &profile) {
        Ok(f) => f,
        Err(e) => return e.response(&req.id),
    };

    // The report card carries the grade block even in single-student runs.
    if template_key == templates::REPORT_CARD {
        if let Some(class_id) = &student.class_id {
            let year: i64 = fields
                .get("ANO_LETIVO")
                .and_then(|y| y.parse().ok())
                .unwrap_or(0);
            match report_card_lines(conn, &student_id, class_id, year) {
                Ok((notas, subject_means)) => {
                    let overall = calc::overall_mean(&subject_means);
                    fields.insert("NOTAS".into(), notas);
                    fields.insert("MEDIA_GERAL".into(), calc::fmt_mean(overall));
                    fields.insert(
                        "SITUACAO".into(),
                        calc::situation(overall).as_str().to_string(),
                    );
                }
                Err(e) => return e.response(&req.id),
            }
        } else {
            fields.insert("NOTAS".into(), "Nenhuma nota lançada.".to_string());
            fields.insert("MEDIA_GERAL".into(), calc::fmt_mean(None));
            fields.insert(
                "SITUACAO".into(),
                calc::situation(None).as_str().to_string(),
            );
        }
    }

    let document = render::render(&body, &fields);
    let period = fields
        .get("ANO_LETIVO")
        .filter(|y| !y.is_empty())
        .cloned()
        .unwrap_or_else(|| chrono::Local::now().format("%Y").to_string());
    let file_name = format!(
        "{}.json",
        render::artifact_name(title, &student.name, &period)
    );

    let payload = json!({
        "templateKey": template_key,
        "title": title,
        "studentId": student_id,
        "document": document,
    });
    let path = match save_artifact(state, &file_name, &payload) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    ok(
        &req.id,
        json!({
            "title": title,
            "fileName": file_name,
            "path": path,
            "document": document,
        }),
    )
}

/// Report cards for a whole class in one run: one field map per active
/// student, each document starting on a fresh page.
fn handle_documents_generate_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(&req.params, "classId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let body = match super::templates::effective_body(state, templates::REPORT_CARD) {
        Some(b) => b.to_string(),
        None => return err(&req.id, "not_found", "unknown template", None),
    };
    let conn = match db_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match class_exists(conn, &class_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    }
    let class = match load_class(conn, &class_id) {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return e.response(&req.id),
    };
    let profile = match load_profile(conn) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    let mut stmt = match conn.prepare(
        "SELECT id FROM students
         WHERE class_id = ? AND status = 'active'
         ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let student_ids = stmt
        .query_map([&class_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let student_ids = match student_ids {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut field_maps = Vec::with_capacity(student_ids.len());
    for student_id in &student_ids {
        let student = match load_student(conn, student_id) {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => return e.response(&req.id),
        };
        let mut fields = match student_fields(conn, &student, &profile) {
            Ok(f) => f,
            Err(e) => return e.response(&req.id),
        };
        match report_card_lines(conn, student_id, &class_id, class.year) {
            Ok((notas, subject_means)) => {
                let overall = calc::overall_mean(&subject_means);
                fields.insert("NOTAS".into(), notas);
                fields.insert("MEDIA_GERAL".into(), calc::fmt_mean(overall));
                fields.insert(
                    "SITUACAO".into(),
                    calc::situation(overall).as_str().to_string(),
                );
            }
            Err(e) => return e.response(&req.id),
        }
        field_maps.push(fields);
    }

    let document = render::render_batch(&body, &field_maps);
    let title = templates::title(templates::REPORT_CARD).unwrap_or("Boletim Escolar");
    let file_name = format!(
        "{}.json",
        render::artifact_name(title, &class.name, &class.year.to_string())
    );
    let payload = json!({
        "templateKey": templates::REPORT_CARD,
        "title": title,
        "classId": class_id,
        "students": field_maps.len(),
        "document": document,
    });
    let path = match save_artifact(state, &file_name, &payload) {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    ok(
        &req.id,
        json!({
            "title": title,
            "fileName": file_name,
            "path": path,
            "students": field_maps.len(),
            "pages": document.pages.len(),
            "document": document,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "documents.generate" => Some(handle_documents_generate(state, req)),
        "documents.generateBatch" => Some(handle_documents_generate_batch(state, req)),
        _ => None,
    }
}
