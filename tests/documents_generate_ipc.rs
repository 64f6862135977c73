
use serde_json::json;
use test_support::{
    request_ok, seed_class_with_students, select_workspace, spawn_sidecar, temp_dir,
};

fn page_text(document: &serde_json::Value, page: usize) -> String {
    document
        .pointer(&format!("/pages/{}/ops", page))
        .and_then(|v| v.as_array())
        .expect("page ops")
        .iter()
        .filter_map(|op| op.get("text").and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        // Wrapping breaks at spaces, so joining with a space restores the
        // original phrases for the contains checks below.
        .join(" ")
}

#[test]
fn generate_fills_tokens_and_falls_back_for_missing_fields() {
    let workspace = temp_dir("escola-documents-generate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "0",
        "settings.set",
        json!({
            "profile": {
                "schoolName": "Escola Municipal Boa Vista",
                "city": "Boa Vista",
                "directorName": "Maria Oliveira",
                "educationLevel": "Fundamental"
            }
        }),
    );

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001")],
    );
    let _ = class_id;

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "documents.generate",
        json!({
            "studentId": students[0],
            "templateKey": "enrollment_declaration"
        }),
    );
    let document = res.get("document").expect("document");
    let text = page_text(document, 0);

    assert!(text.contains("Ana Souza"));
    assert!(text.contains("7º Ano"));
    assert!(text.contains("Boa Vista"));
    assert!(text.contains("Maria Oliveira"));
    // RG/CPF were never captured: the placeholder shows, the token does not.
    assert!(text.contains("Not informed"));
    assert!(!text.contains("[RG_ALUNO]"));
    assert!(!text.contains("[NOME_ALUNO]"));

    // The artifact landed in the workspace with a readable name.
    let file_name = res.get("fileName").and_then(|v| v.as_str()).expect("fileName");
    assert!(file_name.starts_with("declaracao-de-matricula-"));
    assert!(workspace.join("documents").join(file_name).is_file());
}

#[test]
fn generate_is_idempotent_for_identical_inputs() {
    let workspace = temp_dir("escola-documents-idempotent");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (_class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Bruno Lima", "2025002")],
    );

    let params = json!({
        "studentId": students[0],
        "templateKey": "conduct_term"
    });
    let first = request_ok(&mut stdin, &mut reader, "1", "documents.generate", params.clone());
    let second = request_ok(&mut stdin, &mut reader, "2", "documents.generate", params);
    assert_eq!(first.get("document"), second.get("document"));
}

#[test]
fn template_override_lives_for_the_session_and_resets() {
    let workspace = temp_dir("escola-documents-template");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (_class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Carla Dias", "2025010")],
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "templates.save",
        json!({
            "key": "enrollment_declaration",
            "body": "Declaro que [NOME_ALUNO] estuda aqui. [TOKEN_NOVO] fica como está."
        }),
    );

    let list = request_ok(&mut stdin, &mut reader, "2", "templates.list", json!({}));
    let entry = list
        .get("templates")
        .and_then(|v| v.as_array())
        .expect("templates")
        .iter()
        .find(|t| t.get("key").and_then(|v| v.as_str()) == Some("enrollment_declaration"))
        .expect("declaration entry")
        .clone();
    assert_eq!(entry.get("customized").and_then(|v| v.as_bool()), Some(true));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "documents.generate",
        json!({
            "studentId": students[0],
            "templateKey": "enrollment_declaration"
        }),
    );
    let text = page_text(res.get("document").expect("document"), 0);
    assert!(text.contains("Declaro que Carla Dias estuda aqui."));
    // Unrecognized tokens survive verbatim.
    assert!(text.contains("[TOKEN_NOVO]"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "templates.reset",
        json!({ "key": "enrollment_declaration" }),
    );
    let list = request_ok(&mut stdin, &mut reader, "5", "templates.list", json!({}));
    let entry = list
        .get("templates")
        .and_then(|v| v.as_array())
        .expect("templates")
        .iter()
        .find(|t| t.get("key").and_then(|v| v.as_str()) == Some("enrollment_declaration"))
        .expect("declaration entry")
        .clone();
    assert_eq!(entry.get("customized").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn batch_report_cards_place_each_student_on_a_fresh_page() {
    let workspace = temp_dir("escola-documents-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001"), ("Bruno Lima", "2025002")],
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.save",
        json!({
            "classId": class_id,
            "subject": "Matemática",
            "year": 2025,
            "entries": [
                { "studentId": students[0], "b1": 7.0, "b2": 8.0, "b3": 6.0, "b4": 9.0 },
            ]
        }),
    );

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "documents.generateBatch",
        json!({ "classId": class_id }),
    );
    assert_eq!(res.get("students").and_then(|v| v.as_i64()), Some(2));
    let document = res.get("document").expect("document");
    let pages = document
        .get("pages")
        .and_then(|v| v.as_array())
        .expect("pages");
    assert_eq!(pages.len(), 2);

    let first = page_text(document, 0);
    let second = page_text(document, 1);
    assert!(first.contains("Ana Souza"));
    assert!(first.contains("Matemática: 7.0 | 8.0 | 6.0 | 9.0 | Média: 7.5"));
    assert!(first.contains("Média Geral: 7.5"));
    assert!(first.contains("Situação: Approved"));
    // Every page restarts at the first-page offset.
    assert_eq!(
        document.pointer("/pages/1/ops/0/y").and_then(|v| v.as_i64()),
        Some(30)
    );

    assert!(second.contains("Bruno Lima"));
    assert!(second.contains("Nenhuma nota lançada."));
    assert!(second.contains("Situação: In progress"));
}
