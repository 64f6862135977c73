use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "escola.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            enrollment_no TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            phone TEXT,
            status TEXT NOT NULL DEFAULT 'active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_level TEXT NOT NULL,
            shift TEXT NOT NULL,
            year INTEGER NOT NULL,
            capacity INTEGER,
            teacher_id TEXT,
            teacher2_id TEXT,
            FOREIGN KEY(teacher_id) REFERENCES staff(id),
            FOREIGN KEY(teacher2_id) REFERENCES staff(id)
        )",
        [],
    )?;
    ensure_classes_second_teacher(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_year ON classes(year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            enrollment_no TEXT NOT NULL UNIQUE,
            class_id TEXT,
            rg TEXT,
            cpf TEXT,
            birth_date TEXT,
            birthplace TEXT,
            father_name TEXT,
            mother_name TEXT,
            guardian_contact TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            movement_type TEXT,
            movement_from TEXT,
            movement_to TEXT,
            movement_date TEXT,
            year INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_students_movement_columns(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_year ON students(year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            year INTEGER NOT NULL,
            b1 REAL,
            b2 REAL,
            b3 REAL,
            b4 REAL,
            annual_mean REAL,
            situation TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, class_id, subject, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class ON grades(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            justification TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, class_id, date)
        )",
        [],
    )?;
    ensure_attendance_justification(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class_date ON attendance(class_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            date TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            location TEXT,
            description TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_date ON events(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_slots(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            subject TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_slots_class ON schedule_slots(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let text: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match text {
        Some(t) => Ok(Some(serde_json::from_str(&t)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_students_movement_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "movement_type")? {
        conn.execute("ALTER TABLE students ADD COLUMN movement_type TEXT", [])?;
    }
    if !table_has_column(conn, "students", "movement_from")? {
        conn.execute("ALTER TABLE students ADD COLUMN movement_from TEXT", [])?;
    }
    if !table_has_column(conn, "students", "movement_to")? {
        conn.execute("ALTER TABLE students ADD COLUMN movement_to TEXT", [])?;
    }
    if !table_has_column(conn, "students", "movement_date")? {
        conn.execute("ALTER TABLE students ADD COLUMN movement_date TEXT", [])?;
    }
    Ok(())
}

fn ensure_classes_second_teacher(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "teacher2_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE classes ADD COLUMN teacher2_id TEXT", [])?;
    Ok(())
}

fn ensure_attendance_justification(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance", "justification")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attendance ADD COLUMN justification TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
