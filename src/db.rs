use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "simadam.sqlite3";

/// Open (creating if needed) the workspace database.
///
/// Tables are created idempotently. Cross-table references are resolved by
/// the handlers before every write, so no database-level foreign keys are
/// declared; UNIQUE constraints stay as a storage backstop beneath the
/// application checks.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nip TEXT,
            full_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_place TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            subject TEXT,
            user_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_user ON teachers(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            grade INTEGER NOT NULL,
            academic_year TEXT NOT NULL,
            homeroom_teacher_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_homeroom ON classes(homeroom_teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nis TEXT NOT NULL UNIQUE,
            nisn TEXT,
            full_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            birth_place TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT,
            parent_name TEXT NOT NULL,
            parent_phone TEXT,
            origin_school TEXT NOT NULL,
            entry_year INTEGER NOT NULL,
            class_id INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_origin ON students(origin_school)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS spp_payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            month INTEGER NOT NULL,
            year INTEGER NOT NULL,
            amount REAL NOT NULL,
            payment_date TEXT,
            status TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(student_id, month, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spp_payments_student ON spp_payments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spp_payments_status ON spp_payments(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS letters(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            letter_number TEXT NOT NULL,
            letter_type TEXT NOT NULL,
            subject TEXT NOT NULL,
            sender TEXT,
            recipient TEXT,
            letter_date TEXT NOT NULL,
            received_date TEXT,
            description TEXT,
            file_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_letters_type ON letters(letter_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS certificate_pickups(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            certificate_type TEXT NOT NULL,
            pickup_date TEXT,
            picked_by TEXT,
            relationship TEXT,
            id_card_number TEXT,
            notes TEXT,
            is_picked_up INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_certificate_pickups_student ON certificate_pickups(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_transfers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            transfer_date TEXT NOT NULL,
            destination_school TEXT NOT NULL,
            transfer_reason TEXT NOT NULL,
            letter_number TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_transfers_student ON student_transfers(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_cards(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            card_number TEXT NOT NULL UNIQUE,
            issue_date TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_student_cards_student ON student_cards(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_profile(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            school_name TEXT NOT NULL,
            address TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            website TEXT,
            headmaster_name TEXT NOT NULL,
            logo_path TEXT,
            description TEXT,
            vision TEXT,
            mission TEXT,
            established_year INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS background_settings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}
