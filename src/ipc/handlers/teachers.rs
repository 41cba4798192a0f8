use crate::ipc::helpers::{
    bool_or, id_exists, nullable_i64, nullable_str, now_ts, opt_bool, opt_date, opt_enum,
    opt_str, patch_i64, patch_str, query_rows, require_date, require_enum, require_i64,
    require_ref, require_str, with_db, HandlerErr, Patch, RowPatch, GENDERS,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, nip, full_name, gender, birth_place, birth_date, address, phone, email, \
                    subject, user_id, is_active, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "nip": r.get::<_, Option<String>>(1)?,
        "full_name": r.get::<_, String>(2)?,
        "gender": r.get::<_, String>(3)?,
        "birth_place": r.get::<_, String>(4)?,
        "birth_date": r.get::<_, String>(5)?,
        "address": r.get::<_, String>(6)?,
        "phone": r.get::<_, Option<String>>(7)?,
        "email": r.get::<_, Option<String>>(8)?,
        "subject": r.get::<_, Option<String>>(9)?,
        "user_id": r.get::<_, Option<i64>>(10)?,
        "is_active": r.get::<_, i64>(11)? != 0,
        "created_at": r.get::<_, String>(12)?,
        "updated_at": r.get::<_, String>(13)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM teachers WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

// NIP uniqueness only applies to teachers that have one.
fn nip_taken(conn: &Connection, nip: &str, exclude: Option<i64>) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM teachers WHERE nip = ? AND id != ?",
        (nip, exclude.unwrap_or(-1)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let nip = nullable_str(params, "nip")?;
    let full_name = require_str(params, "full_name")?;
    let gender = require_enum(params, "gender", GENDERS)?;
    let birth_place = require_str(params, "birth_place")?;
    let birth_date = require_date(params, "birth_date")?;
    let address = require_str(params, "address")?;
    let phone = nullable_str(params, "phone")?;
    let email = nullable_str(params, "email")?;
    let subject = nullable_str(params, "subject")?;
    let user_id = nullable_i64(params, "user_id")?;
    let is_active = bool_or(params, "is_active", true)?;

    if let Some(uid) = user_id {
        require_ref(conn, "users", "user", uid)?;
    }
    if let Some(ref nip) = nip {
        if nip_taken(conn, nip, None)? {
            return Err(HandlerErr::duplicate("nip", nip));
        }
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO teachers(nip, full_name, gender, birth_place, birth_date, address, phone, \
         email, subject, user_id, is_active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            nip,
            full_name,
            gender,
            birth_place,
            birth_date,
            address,
            phone,
            email,
            subject,
            user_id,
            is_active as i64,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("teacher", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM teachers ORDER BY id", COLS),
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
    if !id_exists(conn, "teachers", id)? {
        return Err(HandlerErr::not_found("teacher", id));
    }

    let nip = patch_str(params, "nip")?;
    let full_name = opt_str(params, "full_name")?;
    let gender = opt_enum(params, "gender", GENDERS)?;
    let birth_place = opt_str(params, "birth_place")?;
    let birth_date = opt_date(params, "birth_date")?;
    let address = opt_str(params, "address")?;
    let phone = patch_str(params, "phone")?;
    let email = patch_str(params, "email")?;
    let subject = patch_str(params, "subject")?;
    let user_id = patch_i64(params, "user_id")?;
    let is_active = opt_bool(params, "is_active")?;

    if let Patch::Set(uid) = &user_id {
        require_ref(conn, "users", "user", *uid)?;
    }
    if let Patch::Set(nip) = &nip {
        if nip_taken(conn, nip, Some(id))? {
            return Err(HandlerErr::duplicate("nip", nip));
        }
    }

    let mut patch = RowPatch::new();
    patch.text_patch("nip", nip);
    patch.text("full_name", full_name);
    patch.text("gender", gender);
    patch.text("birth_place", birth_place);
    patch.text("birth_date", birth_date);
    patch.text("address", address);
    patch.text_patch("phone", phone);
    patch.text_patch("email", email);
    patch.text_patch("subject", subject);
    patch.int_patch("user_id", user_id);
    patch.flag("is_active", is_active);
    patch.apply(conn, "teachers", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("teacher", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "teachers", id)? {
        return Err(HandlerErr::not_found("teacher", id));
    }
    conn.execute("DELETE FROM teachers WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_user_id(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let user_id = require_i64(params, "userId")?;
    conn.query_row(
        &format!("SELECT {} FROM teachers WHERE user_id = ?", COLS),
        [user_id],
        row,
    )
    .optional()
    .map(|v| v.unwrap_or(serde_json::Value::Null))
    .map_err(HandlerErr::db_query)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.create" => Some(with_db(state, req, create)),
        "teachers.getAll" => Some(with_db(state, req, get_all)),
        "teachers.getById" => Some(with_db(state, req, get_by_id)),
        "teachers.update" => Some(with_db(state, req, update)),
        "teachers.delete" => Some(with_db(state, req, delete)),
        "teachers.getByUserId" => Some(with_db(state, req, get_by_user_id)),
        _ => None,
    }
}
