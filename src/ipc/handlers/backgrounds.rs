use crate::ipc::helpers::{
    bool_or, id_exists, now_ts, opt_bool, opt_str, query_rows, require_i64, require_str, with_db,
    HandlerErr, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, name, file_path, is_active, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "name": r.get::<_, String>(1)?,
        "file_path": r.get::<_, String>(2)?,
        "is_active": r.get::<_, i64>(3)? != 0,
        "created_at": r.get::<_, String>(4)?,
        "updated_at": r.get::<_, String>(5)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM background_settings WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

/// At most one background may be active. Activation always runs as
/// clear-all-then-write inside one transaction so two racing calls cannot
/// leave two active rows.
fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = require_str(params, "name")?;
    let file_path = require_str(params, "file_path")?;
    let is_active = bool_or(params, "is_active", false)?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let now = now_ts();
    if is_active {
        tx.execute(
            "UPDATE background_settings SET is_active = 0, updated_at = ? WHERE is_active = 1",
            [&now],
        )
        .map_err(HandlerErr::db_update)?;
    }
    tx.execute(
        "INSERT INTO background_settings(name, file_path, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        rusqlite::params![name, file_path, is_active as i64, now, now],
    )
    .map_err(HandlerErr::db_insert)?;
    let id = tx.last_insert_rowid();
    tx.commit().map_err(HandlerErr::db_tx)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("background", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM background_settings ORDER BY id", COLS),
        [],
        row,
    )
}

fn get_by_id(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    Ok(fetch(conn, id)?.unwrap_or(serde_json::Value::Null))
}

fn get_active(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    conn.query_row(
        &format!(
            "SELECT {} FROM background_settings WHERE is_active = 1 LIMIT 1",
            COLS
        ),
        [],
        row,
    )
    .optional()
    .map(|v| v.unwrap_or(serde_json::Value::Null))
    .map_err(HandlerErr::db_query)
}

fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "background_settings", id)? {
        return Err(HandlerErr::not_found("background", id));
    }

    let name = opt_str(params, "name")?;
    let file_path = opt_str(params, "file_path")?;
    let is_active = opt_bool(params, "is_active")?;

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    if is_active == Some(true) {
        tx.execute(
            "UPDATE background_settings SET is_active = 0, updated_at = ? WHERE is_active = 1 \
             AND id != ?",
            rusqlite::params![now_ts(), id],
        )
        .map_err(HandlerErr::db_update)?;
    }
    let mut patch = RowPatch::new();
    patch.text("name", name);
    patch.text("file_path", file_path);
    patch.flag("is_active", is_active);
    patch.apply(&tx, "background_settings", id)?;
    tx.commit().map_err(HandlerErr::db_tx)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("background", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    let active: Option<i64> = conn
        .query_row(
            "SELECT is_active FROM background_settings WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    match active {
        None => return Err(HandlerErr::not_found("background", id)),
        Some(0) => {}
        Some(_) => return Err(HandlerErr::rule("cannot delete the active background")),
    }

    conn.execute("DELETE FROM background_settings WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn set_active(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "background_settings", id)? {
        return Err(HandlerErr::not_found("background", id));
    }

    let tx = conn.unchecked_transaction().map_err(HandlerErr::db_tx)?;
    let now = now_ts();
    tx.execute(
        "UPDATE background_settings SET is_active = 0, updated_at = ? WHERE is_active = 1",
        [&now],
    )
    .map_err(HandlerErr::db_update)?;
    tx.execute(
        "UPDATE background_settings SET is_active = 1, updated_at = ? WHERE id = ?",
        rusqlite::params![now, id],
    )
    .map_err(HandlerErr::db_update)?;
    tx.commit().map_err(HandlerErr::db_tx)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("background", id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backgroundSettings.create" => Some(with_db(state, req, create)),
        "backgroundSettings.getAll" => Some(with_db(state, req, get_all)),
        "backgroundSettings.getById" => Some(with_db(state, req, get_by_id)),
        "backgroundSettings.getActive" => Some(with_db(state, req, get_active)),
        "backgroundSettings.update" => Some(with_db(state, req, update)),
        "backgroundSettings.delete" => Some(with_db(state, req, delete)),
        "backgroundSettings.setActive" => Some(with_db(state, req, set_active)),
        _ => None,
    }
}
