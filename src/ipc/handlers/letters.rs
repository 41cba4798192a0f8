use crate::ipc::helpers::{
    id_exists, nullable_date, nullable_str, now_ts, opt_date, opt_enum, opt_str, patch_date,
    patch_str, query_rows, require_date, require_enum, require_i64, require_str, with_db,
    HandlerErr, RowPatch, LETTER_TYPES,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, letter_number, letter_type, subject, sender, recipient, letter_date, \
                    received_date, description, file_path, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "letter_number": r.get::<_, String>(1)?,
        "letter_type": r.get::<_, String>(2)?,
        "subject": r.get::<_, String>(3)?,
        "sender": r.get::<_, Option<String>>(4)?,
        "recipient": r.get::<_, Option<String>>(5)?,
        "letter_date": r.get::<_, String>(6)?,
        "received_date": r.get::<_, Option<String>>(7)?,
        "description": r.get::<_, Option<String>>(8)?,
        "file_path": r.get::<_, Option<String>>(9)?,
        "created_at": r.get::<_, String>(10)?,
        "updated_at": r.get::<_, String>(11)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM letters WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn number_taken(conn: &Connection, number: &str, exclude: Option<i64>) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM letters WHERE letter_number = ? AND id != ?",
        (number, exclude.unwrap_or(-1)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let letter_number = require_str(params, "letter_number")?;
    let letter_type = require_enum(params, "letter_type", LETTER_TYPES)?;
    let subject = require_str(params, "subject")?;
    let sender = nullable_str(params, "sender")?;
    let recipient = nullable_str(params, "recipient")?;
    let letter_date = require_date(params, "letter_date")?;
    let received_date = nullable_date(params, "received_date")?;
    let description = nullable_str(params, "description")?;
    let file_path = nullable_str(params, "file_path")?;

    if number_taken(conn, &letter_number, None)? {
        return Err(HandlerErr::duplicate("letter_number", &letter_number));
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO letters(letter_number, letter_type, subject, sender, recipient, \
         letter_date, received_date, description, file_path, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            letter_number,
            letter_type,
            subject,
            sender,
            recipient,
            letter_date,
            received_date,
            description,
            file_path,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("letter", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM letters ORDER BY id", COLS),
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
    if !id_exists(conn, "letters", id)? {
        return Err(HandlerErr::not_found("letter", id));
    }

    let letter_number = opt_str(params, "letter_number")?;
    let letter_type = opt_enum(params, "letter_type", LETTER_TYPES)?;
    let subject = opt_str(params, "subject")?;
    let sender = patch_str(params, "sender")?;
    let recipient = patch_str(params, "recipient")?;
    let letter_date = opt_date(params, "letter_date")?;
    let received_date = patch_date(params, "received_date")?;
    let description = patch_str(params, "description")?;
    let file_path = patch_str(params, "file_path")?;

    if let Some(ref number) = letter_number {
        if number_taken(conn, number, Some(id))? {
            return Err(HandlerErr::duplicate("letter_number", number));
        }
    }

    let mut patch = RowPatch::new();
    patch.text("letter_number", letter_number);
    patch.text("letter_type", letter_type);
    patch.text("subject", subject);
    patch.text_patch("sender", sender);
    patch.text_patch("recipient", recipient);
    patch.text("letter_date", letter_date);
    patch.text_patch("received_date", received_date);
    patch.text_patch("description", description);
    patch.text_patch("file_path", file_path);
    patch.apply(conn, "letters", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("letter", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "letters", id)? {
        return Err(HandlerErr::not_found("letter", id));
    }
    conn.execute("DELETE FROM letters WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_type(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let letter_type = require_enum(params, "letterType", LETTER_TYPES)?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM letters WHERE letter_type = ? ORDER BY id",
            COLS
        ),
        [letter_type],
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
            "SELECT {} FROM letters WHERE letter_date >= ? AND letter_date <= ? ORDER BY id",
            COLS
        ),
        [start, end],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "letters.create" => Some(with_db(state, req, create)),
        "letters.getAll" => Some(with_db(state, req, get_all)),
        "letters.getById" => Some(with_db(state, req, get_by_id)),
        "letters.update" => Some(with_db(state, req, update)),
        "letters.delete" => Some(with_db(state, req, delete)),
        "letters.getByType" => Some(with_db(state, req, get_by_type)),
        "letters.getByDateRange" => Some(with_db(state, req, get_by_date_range)),
        _ => None,
    }
}
