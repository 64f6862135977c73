
use serde_json::json;
use test_support::{
    request_err, request_ok, seed_class_with_students, select_workspace, spawn_sidecar, temp_dir,
};

#[test]
fn events_crud_with_month_filter() {
    let workspace = temp_dir("escola-events-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "events.create",
        json!({
            "title": "Reunião de pais",
            "date": "2025-04-15",
            "startTime": "19:00",
            "location": "Auditório"
        }),
    );
    let event_id = created
        .get("eventId")
        .and_then(|v| v.as_str())
        .expect("eventId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "events.create",
        json!({ "title": "Festa Junina", "date": "2025-06-20" }),
    );

    let april = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "events.list",
        json!({ "year": 2025, "month": 4 }),
    );
    let events = april.get("events").and_then(|v| v.as_array()).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get("title").and_then(|v| v.as_str()),
        Some("Reunião de pais")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "events.update",
        json!({
            "eventId": event_id,
            "title": "Reunião de pais e mestres",
            "date": "2025-04-16"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "events.delete",
        json!({ "eventId": event_id }),
    );

    let all = request_ok(&mut stdin, &mut reader, "6", "events.list", json!({}));
    let events = all.get("events").and_then(|v| v.as_array()).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get("title").and_then(|v| v.as_str()),
        Some("Festa Junina")
    );
}

#[test]
fn schedule_set_updates_in_place_and_rejects_bad_days() {
    let workspace = temp_dir("escola-schedule");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let (class_id, _students) = seed_class_with_students(
        &mut stdin,
        &mut reader,
        2025,
        &[("Ana Souza", "2025001")],
    );

    let set = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.set",
        json!({
            "classId": class_id,
            "day": "mon",
            "startTime": "07:30",
            "endTime": "08:20",
            "subject": "Matemática"
        }),
    );
    let slot_id = set
        .get("slotId")
        .and_then(|v| v.as_str())
        .expect("slotId")
        .to_string();

    // Passing the slot id edits instead of stacking a second slot.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.set",
        json!({
            "classId": class_id,
            "slotId": slot_id,
            "day": "mon",
            "startTime": "07:30",
            "endTime": "08:20",
            "subject": "Geografia"
        }),
    );

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.list",
        json!({ "classId": class_id }),
    );
    let slots = list.get("slots").and_then(|v| v.as_array()).expect("slots");
    assert_eq!(slots.len(), 1);
    assert_eq!(
        slots[0].get("subject").and_then(|v| v.as_str()),
        Some("Geografia")
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.set",
        json!({
            "classId": class_id,
            "day": "sat",
            "startTime": "07:30",
            "endTime": "08:20",
            "subject": "Matemática"
        }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn class_delete_detaches_students_and_clears_dependents() {
    let workspace = temp_dir("escola-class-delete");
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
            "subject": "Matemática",
            "year": 2025,
            "entries": [{ "studentId": students[0], "b1": 7.0 }]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.set",
        json!({
            "classId": class_id,
            "day": "tue",
            "startTime": "08:20",
            "endTime": "09:10",
            "subject": "Matemática"
        }),
    );

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    assert_eq!(res.get("deleted").and_then(|v| v.as_bool()), Some(true));

    // The student survives, unlinked from the deleted class.
    let list = request_ok(&mut stdin, &mut reader, "4", "students.list", json!({}));
    let all = list
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(all.len(), 1);
    assert!(all[0].get("classId").map(|v| v.is_null()).unwrap_or(false));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "grades.get",
        json!({ "classId": class_id, "subject": "Matemática", "year": 2025 }),
    );
    assert_eq!(code, "not_found");
}
