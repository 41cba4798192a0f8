use crate::ipc::helpers::{
    bool_or, id_exists, nullable_datetime, nullable_str, now_ts, opt_bool, opt_i64, opt_str,
    patch_datetime, patch_str, query_rows, require_bool, require_i64, require_ref, require_str,
    with_db, HandlerErr, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, student_id, certificate_type, pickup_date, picked_by, relationship, \
                    id_card_number, notes, is_picked_up, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "student_id": r.get::<_, i64>(1)?,
        "certificate_type": r.get::<_, String>(2)?,
        "pickup_date": r.get::<_, Option<String>>(3)?,
        "picked_by": r.get::<_, Option<String>>(4)?,
        "relationship": r.get::<_, Option<String>>(5)?,
        "id_card_number": r.get::<_, Option<String>>(6)?,
        "notes": r.get::<_, Option<String>>(7)?,
        "is_picked_up": r.get::<_, i64>(8)? != 0,
        "created_at": r.get::<_, String>(9)?,
        "updated_at": r.get::<_, String>(10)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM certificate_pickups WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "student_id")?;
    let certificate_type = require_str(params, "certificate_type")?;
    let pickup_date = nullable_datetime(params, "pickup_date")?;
    let picked_by = nullable_str(params, "picked_by")?;
    let relationship = nullable_str(params, "relationship")?;
    let id_card_number = nullable_str(params, "id_card_number")?;
    let notes = nullable_str(params, "notes")?;
    let is_picked_up = bool_or(params, "is_picked_up", false)?;

    require_ref(conn, "students", "student", student_id)?;

    let now = now_ts();
    conn.execute(
        "INSERT INTO certificate_pickups(student_id, certificate_type, pickup_date, picked_by, \
         relationship, id_card_number, notes, is_picked_up, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            certificate_type,
            pickup_date,
            picked_by,
            relationship,
            id_card_number,
            notes,
            is_picked_up as i64,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("certificate pickup", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM certificate_pickups ORDER BY id", COLS),
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
    if !id_exists(conn, "certificate_pickups", id)? {
        return Err(HandlerErr::not_found("certificate pickup", id));
    }

    let student_id = opt_i64(params, "student_id")?;
    let certificate_type = opt_str(params, "certificate_type")?;
    let pickup_date = patch_datetime(params, "pickup_date")?;
    let picked_by = patch_str(params, "picked_by")?;
    let relationship = patch_str(params, "relationship")?;
    let id_card_number = patch_str(params, "id_card_number")?;
    let notes = patch_str(params, "notes")?;
    let is_picked_up = opt_bool(params, "is_picked_up")?;

    if let Some(sid) = student_id {
        require_ref(conn, "students", "student", sid)?;
    }

    let mut patch = RowPatch::new();
    patch.int("student_id", student_id);
    patch.text("certificate_type", certificate_type);
    patch.text_patch("pickup_date", pickup_date);
    patch.text_patch("picked_by", picked_by);
    patch.text_patch("relationship", relationship);
    patch.text_patch("id_card_number", id_card_number);
    patch.text_patch("notes", notes);
    patch.flag("is_picked_up", is_picked_up);
    patch.apply(conn, "certificate_pickups", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("certificate pickup", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "certificate_pickups", id)? {
        return Err(HandlerErr::not_found("certificate pickup", id));
    }
    conn.execute("DELETE FROM certificate_pickups WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "studentId")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM certificate_pickups WHERE student_id = ? ORDER BY id",
            COLS
        ),
        [student_id],
        row,
    )
}

fn get_by_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let is_picked_up = require_bool(params, "isPickedUp")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM certificate_pickups WHERE is_picked_up = ? ORDER BY id",
            COLS
        ),
        [is_picked_up as i64],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "certificatePickups.create" => Some(with_db(state, req, create)),
        "certificatePickups.getAll" => Some(with_db(state, req, get_all)),
        "certificatePickups.getById" => Some(with_db(state, req, get_by_id)),
        "certificatePickups.update" => Some(with_db(state, req, update)),
        "certificatePickups.delete" => Some(with_db(state, req, delete)),
        "certificatePickups.getByStudent" => Some(with_db(state, req, get_by_student)),
        "certificatePickups.getByStatus" => Some(with_db(state, req, get_by_status)),
        _ => None,
    }
}
