
use serde_json::json;
use test_support::{
    request_err, request_ok, seed_class_with_students, select_workspace, spawn_sidecar, temp_dir,
};

#[test]
fn save_then_get_derives_mean_and_situation() {
    let workspace = temp_dir("escola-grades-roundtrip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001"), ("Bruno Lima", "2025002")],
    );

    let saved = request_ok(
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
                { "studentId": students[1], "b1": 5.0, "b2": 4.5 },
            ]
        }),
    );
    assert_eq!(saved.get("saved").and_then(|v| v.as_i64()), Some(2));

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.get",
        json!({ "classId": class_id, "subject": "Matemática", "year": 2025 }),
    );
    let rows = grid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2);

    // Rows come back in name order: Ana first.
    let ana = &rows[0];
    assert_eq!(ana.get("annualMean").and_then(|v| v.as_f64()), Some(7.5));
    assert_eq!(ana.get("situation").and_then(|v| v.as_str()), Some("Approved"));

    // Two bimesters missing: no mean yet, still in progress, never zero.
    let bruno = &rows[1];
    assert!(bruno.get("annualMean").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        bruno.get("situation").and_then(|v| v.as_str()),
        Some("In progress")
    );
    assert_eq!(bruno.get("b1").and_then(|v| v.as_f64()), Some(5.0));
    assert!(bruno.get("b3").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn grid_reads_the_stored_mean_and_situation_back() {
    let workspace = temp_dir("escola-grades-stored");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001")],
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grades.save",
        json!({
            "classId": class_id,
            "subject": "Geografia",
            "year": 2025,
            "entries": [
                { "studentId": students[0], "b1": 7.0, "b2": 8.0, "b3": 6.0, "b4": 9.0 },
            ]
        }),
    );

    // Overwrite the write-through columns out of band: the grid must serve
    // the stored values, not a recomputation from b1..b4.
    {
        let conn = rusqlite::Connection::open(workspace.join("escola.sqlite3"))
            .expect("open workspace db");
        let changed = conn
            .execute(
                "UPDATE grades SET annual_mean = 9.9, situation = 'Reproved'
                 WHERE student_id = ? AND subject = 'Geografia'",
                [&students[0]],
            )
            .expect("update grades");
        assert_eq!(changed, 1);
    }

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.get",
        json!({ "classId": class_id, "subject": "Geografia", "year": 2025 }),
    );
    let rows = grid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows[0].get("annualMean").and_then(|v| v.as_f64()), Some(9.9));
    assert_eq!(
        rows[0].get("situation").and_then(|v| v.as_str()),
        Some("Reproved")
    );

    // The next save puts the derived values back.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.save",
        json!({
            "classId": class_id,
            "subject": "Geografia",
            "year": 2025,
            "entries": [
                { "studentId": students[0], "b1": 7.0, "b2": 8.0, "b3": 6.0, "b4": 9.0 },
            ]
        }),
    );
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.get",
        json!({ "classId": class_id, "subject": "Geografia", "year": 2025 }),
    );
    let rows = grid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows[0].get("annualMean").and_then(|v| v.as_f64()), Some(7.5));
    assert_eq!(
        rows[0].get("situation").and_then(|v| v.as_str()),
        Some("Approved")
    );
}

#[test]
fn resave_overwrites_instead_of_duplicating() {
    let workspace = temp_dir("escola-grades-resave");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Carla Dias", "2025010")],
    );

    for (id, b4) in [("1", json!(2.0)), ("2", json!(9.5))] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "grades.save",
            json!({
                "classId": class_id,
                "subject": "História",
                "year": 2025,
                "entries": [
                    { "studentId": students[0], "b1": 6.0, "b2": 6.0, "b3": 6.0, "b4": b4 },
                ]
            }),
        );
    }

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.get",
        json!({ "classId": class_id, "subject": "História", "year": 2025 }),
    );
    let rows = grid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("b4").and_then(|v| v.as_f64()), Some(9.5));
    // (6 + 6 + 6 + 9.5) / 4 = 6.875 -> 6.9 half-up.
    assert_eq!(rows[0].get("annualMean").and_then(|v| v.as_f64()), Some(6.9));
}

#[test]
fn bad_entries_are_rejected_before_any_write() {
    let workspace = temp_dir("escola-grades-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Davi Rocha", "2025020")],
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "grades.save",
        json!({
            "classId": class_id,
            "subject": "Matemática",
            "year": 2025,
            "entries": [
                { "studentId": students[0], "b1": 11.0 },
            ]
        }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "grades.save",
        json!({
            "classId": class_id,
            "subject": "Alquimia",
            "year": 2025,
            "entries": []
        }),
    );
    assert_eq!(code, "bad_params");

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.get",
        json!({ "classId": class_id, "subject": "Matemática", "year": 2025 }),
    );
    let rows = grid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert!(rows[0].get("b1").map(|v| v.is_null()).unwrap_or(false));
}
