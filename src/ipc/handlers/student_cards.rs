use crate::ipc::helpers::{
    bool_or, id_exists, nullable_str, now_ts, opt_bool, opt_date, opt_i64, opt_str, patch_str,
    query_rows, require_bool, require_date, require_i64, require_ref, require_str, today,
    with_db, HandlerErr, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use chrono::Duration;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, student_id, card_number, issue_date, expiry_date, is_active, notes, \
                    created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "student_id": r.get::<_, i64>(1)?,
        "card_number": r.get::<_, String>(2)?,
        "issue_date": r.get::<_, String>(3)?,
        "expiry_date": r.get::<_, String>(4)?,
        "is_active": r.get::<_, i64>(5)? != 0,
        "notes": r.get::<_, Option<String>>(6)?,
        "created_at": r.get::<_, String>(7)?,
        "updated_at": r.get::<_, String>(8)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM student_cards WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn number_taken(conn: &Connection, number: &str, exclude: Option<i64>) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM student_cards WHERE card_number = ? AND id != ?",
        (number, exclude.unwrap_or(-1)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "student_id")?;
    let card_number = require_str(params, "card_number")?;
    let issue_date = require_date(params, "issue_date")?;
    let expiry_date = require_date(params, "expiry_date")?;
    let is_active = bool_or(params, "is_active", true)?;
    let notes = nullable_str(params, "notes")?;

    require_ref(conn, "students", "student", student_id)?;
    if number_taken(conn, &card_number, None)? {
        return Err(HandlerErr::duplicate("card_number", &card_number));
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO student_cards(student_id, card_number, issue_date, expiry_date, is_active, \
         notes, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            card_number,
            issue_date,
            expiry_date,
            is_active as i64,
            notes,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("student card", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM student_cards ORDER BY id", COLS),
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
    if !id_exists(conn, "student_cards", id)? {
        return Err(HandlerErr::not_found("student card", id));
    }

    let student_id = opt_i64(params, "student_id")?;
    let card_number = opt_str(params, "card_number")?;
    let issue_date = opt_date(params, "issue_date")?;
    let expiry_date = opt_date(params, "expiry_date")?;
    let is_active = opt_bool(params, "is_active")?;
    let notes = patch_str(params, "notes")?;

    if let Some(sid) = student_id {
        require_ref(conn, "students", "student", sid)?;
    }
    if let Some(ref number) = card_number {
        if number_taken(conn, number, Some(id))? {
            return Err(HandlerErr::duplicate("card_number", number));
        }
    }

    let mut patch = RowPatch::new();
    patch.int("student_id", student_id);
    patch.text("card_number", card_number);
    patch.text("issue_date", issue_date);
    patch.text("expiry_date", expiry_date);
    patch.flag("is_active", is_active);
    patch.text_patch("notes", notes);
    patch.apply(conn, "student_cards", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("student card", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "student_cards", id)? {
        return Err(HandlerErr::not_found("student card", id));
    }
    conn.execute("DELETE FROM student_cards WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "studentId")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM student_cards WHERE student_id = ? ORDER BY id",
            COLS
        ),
        [student_id],
        row,
    )
}

fn get_by_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let is_active = require_bool(params, "isActive")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM student_cards WHERE is_active = ? ORDER BY id",
            COLS
        ),
        [is_active as i64],
        row,
    )
}

// Active cards whose expiry falls inside the window [today, today + days].
fn get_expiring(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let days = require_i64(params, "daysUntilExpiry")?;
    if days < 0 {
        return Err(HandlerErr::bad_params("daysUntilExpiry must not be negative"));
    }
    let from = today();
    let to = from + Duration::days(days);
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM student_cards \
             WHERE expiry_date >= ? AND expiry_date <= ? AND is_active = 1 ORDER BY id",
            COLS
        ),
        [
            from.format("%Y-%m-%d").to_string(),
            to.format("%Y-%m-%d").to_string(),
        ],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "studentCards.create" => Some(with_db(state, req, create)),
        "studentCards.getAll" => Some(with_db(state, req, get_all)),
        "studentCards.getById" => Some(with_db(state, req, get_by_id)),
        "studentCards.update" => Some(with_db(state, req, update)),
        "studentCards.delete" => Some(with_db(state, req, delete)),
        "studentCards.getByStudent" => Some(with_db(state, req, get_by_student)),
        "studentCards.getByStatus" => Some(with_db(state, req, get_by_status)),
        "studentCards.getExpiring" => Some(with_db(state, req, get_expiring)),
        _ => None,
    }
}
