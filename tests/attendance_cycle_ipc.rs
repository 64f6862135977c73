
use serde_json::json;
use test_support::{
    request_err, request_ok, seed_class_with_students, select_workspace, spawn_sidecar, temp_dir,
};

#[test]
fn toggle_cycles_through_three_states_and_back() {
    let workspace = temp_dir("escola-attendance-cycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001")],
    );

    let params = json!({
        "classId": class_id,
        "studentId": students[0],
        "date": "2025-03-10"
    });

    // First interaction materializes "present", then the period-3 cycle.
    let expected = ["present", "absent", "justified", "present", "absent"];
    for (i, want) in expected.iter().enumerate() {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("t{}", i),
            "attendance.toggle",
            params.clone(),
        );
        assert_eq!(res.get("status").and_then(|v| v.as_str()), Some(*want));
    }

    // Six more toggles land on the same state: period is exactly 3.
    let mut last = String::new();
    for i in 0..6 {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("p{}", i),
            "attendance.toggle",
            params.clone(),
        );
        last = res
            .get("status")
            .and_then(|v| v.as_str())
            .expect("status")
            .to_string();
    }
    assert_eq!(last, "absent");
}

#[test]
fn justify_upserts_and_toggle_clears_justification() {
    let workspace = temp_dir("escola-attendance-justify");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Bruno Lima", "2025002")],
    );

    // Justify a cell that was never touched.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.justify",
        json!({
            "classId": class_id,
            "studentId": students[0],
            "date": "2025-03-11",
            "justification": "Atestado médico"
        }),
    );
    assert_eq!(res.get("status").and_then(|v| v.as_str()), Some("justified"));

    let month = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.month",
        json!({ "classId": class_id, "year": 2025, "month": 3 }),
    );
    let cells = month.get("cells").and_then(|v| v.as_array()).expect("cells");
    assert_eq!(cells.len(), 1);
    assert_eq!(
        cells[0].get("justification").and_then(|v| v.as_str()),
        Some("Atestado médico")
    );

    // Toggling off "justified" wraps to "present" and drops the text.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.toggle",
        json!({
            "classId": class_id,
            "studentId": students[0],
            "date": "2025-03-11"
        }),
    );
    assert_eq!(res.get("status").and_then(|v| v.as_str()), Some("present"));

    let month = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "attendance.month",
        json!({ "classId": class_id, "year": 2025, "month": 3 }),
    );
    let cells = month.get("cells").and_then(|v| v.as_array()).expect("cells");
    assert_eq!(cells.len(), 1);
    assert!(cells[0]
        .get("justification")
        .map(|v| v.is_null())
        .unwrap_or(false));
}

#[test]
fn month_grid_skips_weekends() {
    let workspace = temp_dir("escola-attendance-month");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, _students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Carla Dias", "2025010")],
    );

    // March 2025: 31 days, 5 Saturdays + 5 Sundays -> 21 school days.
    let month = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.month",
        json!({ "classId": class_id, "year": 2025, "month": 3 }),
    );
    let days = month.get("days").and_then(|v| v.as_array()).expect("days");
    assert_eq!(days.len(), 21);
    assert_eq!(days[0].as_str(), Some("2025-03-03"));
    assert!(!days.iter().any(|d| d.as_str() == Some("2025-03-01")));
    assert!(!days.iter().any(|d| d.as_str() == Some("2025-03-09")));
}

#[test]
fn toggle_and_justify_reject_an_unknown_class() {
    let workspace = temp_dir("escola-attendance-unknown-class");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (_class_id, students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001")],
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "attendance.toggle",
        json!({
            "classId": "nope",
            "studentId": students[0],
            "date": "2025-03-10"
        }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.justify",
        json!({
            "classId": "nope",
            "studentId": students[0],
            "date": "2025-03-10",
            "justification": "Consulta"
        }),
    );
    assert_eq!(code, "not_found");
}
