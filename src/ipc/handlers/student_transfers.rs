use crate::ipc::helpers::{
    id_exists, nullable_str, now_ts, opt_date, opt_i64, opt_str, patch_str, query_rows,
    require_date, require_i64, require_ref, require_str, with_db, HandlerErr, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, student_id, transfer_date, destination_school, transfer_reason, \
                    letter_number, notes, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "student_id": r.get::<_, i64>(1)?,
        "transfer_date": r.get::<_, String>(2)?,
        "destination_school": r.get::<_, String>(3)?,
        "transfer_reason": r.get::<_, String>(4)?,
        "letter_number": r.get::<_, String>(5)?,
        "notes": r.get::<_, Option<String>>(6)?,
        "created_at": r.get::<_, String>(7)?,
        "updated_at": r.get::<_, String>(8)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM student_transfers WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

/// A transfer retires the student: the insert and the flip to inactive are
/// one unit, so a failure of either leaves nothing persisted.
fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "student_id")?;
    let transfer_date = require_date(params, "transfer_date")?;
    let destination_school = require_str(params, "destination_school")?;
    let transfer_reason = require_str(params, "transfer_reason")?;
    let letter_number = require_str(params, "letter_number")?;
    let notes = nullable_str(params, "notes")?;

    let active: Option<i64> = conn
        .query_row(
            "SELECT is_active FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    match active {
        None => return Err(HandlerErr::ref_not_found("student", student_id)),
        Some(0) => {
            return Err(HandlerErr::rule(format!(
                "student with id {} is already inactive",
                student_id
            )))
        }
        Some(_) => {}
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let now = now_ts();
    tx.execute(
        "INSERT INTO student_transfers(student_id, transfer_date, destination_school, \
         transfer_reason, letter_number, notes, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            transfer_date,
            destination_school,
            transfer_reason,
            letter_number,
            notes,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE students SET is_active = 0, updated_at = ? WHERE id = ?",
        rusqlite::params![now, student_id],
    )
    .map_err(HandlerErr::db_update)?;
    tx.commit().map_err(HandlerErr::db_tx)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("transfer", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM student_transfers ORDER BY id", COLS),
        [],
        row,
    )
}

fn get_by_id(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    Ok(fetch(conn, id)?.unwrap_or(serde_json::Value::Null))
}

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "student_transfers", id)? {
        return Err(HandlerErr::not_found("transfer", id));
    }

    let student_id = opt_i64(params, "student_id")?;
    let transfer_date = opt_date(params, "transfer_date")?;
    let destination_school = opt_str(params, "destination_school")?;
    let transfer_reason = opt_str(params, "transfer_reason")?;
    let letter_number = opt_str(params, "letter_number")?;
    let notes = patch_str(params, "notes")?;

    // Repointing an existing transfer record does not touch any student's
    // active flag; only creation carries the side effect.
    if let Some(sid) = student_id {
        require_ref(conn, "students", "student", sid)?;
    }

    let mut patch = RowPatch::new();
    patch.int("student_id", student_id);
    patch.text("transfer_date", transfer_date);
    patch.text("destination_school", destination_school);
    patch.text("transfer_reason", transfer_reason);
    patch.text("letter_number", letter_number);
    patch.text_patch("notes", notes);
    patch.apply(conn, "student_transfers", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("transfer", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "student_transfers", id)? {
        return Err(HandlerErr::not_found("transfer", id));
    }
    // The student stays inactive; there is no reactivation path.
    conn.execute("DELETE FROM student_transfers WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "studentId")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM student_transfers WHERE student_id = ? ORDER BY id",
            COLS
        ),
        [student_id],
        row,
    )
}

fn get_by_date_range(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let start = require_date(params, "startDate")?;
    let end = require_date(params, "endDate")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM student_transfers WHERE transfer_date >= ? AND transfer_date <= ? \
             ORDER BY id",
            COLS
        ),
        [start, end],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "studentTransfers.create" => Some(with_db(state, req, create)),
        "studentTransfers.getAll" => Some(with_db(state, req, get_all)),
        "studentTransfers.getById" => Some(with_db(state, req, get_by_id)),
        "studentTransfers.update" => Some(with_db(state, req, update)),
        "studentTransfers.delete" => Some(with_db(state, req, delete)),
        "studentTransfers.getByStudent" => Some(with_db(state, req, get_by_student)),
        "studentTransfers.getByDateRange" => Some(with_db(state, req, get_by_date_range)),
        _ => None,
    }
}
