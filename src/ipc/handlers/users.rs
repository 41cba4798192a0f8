use crate::ipc::helpers::{
    bool_or, id_exists, now_ts, opt_bool, opt_enum, opt_str, query_rows, require_enum,
    require_i64, require_str, with_db, HandlerErr, RowPatch, USER_ROLES,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::auth::hash_password;

// Responses never carry password_hash.
const COLS: &str = "id, username, email, full_name, role, is_active, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "username": r.get::<_, String>(1)?,
        "email": r.get::<_, String>(2)?,
        "full_name": r.get::<_, String>(3)?,
        "role": r.get::<_, String>(4)?,
        "is_active": r.get::<_, i64>(5)? != 0,
        "created_at": r.get::<_, String>(6)?,
        "updated_at": r.get::<_, String>(7)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn value_taken(
    conn: &Connection,
    column: &str,
    value: &str,
    exclude: Option<i64>,
) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM users WHERE {} = ? AND id != ?", column);
    conn.query_row(&sql, (value, exclude.unwrap_or(-1)), |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn check_username(username: &str) -> Result<(), HandlerErr> {
    if username.len() >= 3 {
        return Ok(());
    }
    Err(HandlerErr::bad_params(
        "username must be at least 3 characters",
    ))
}

fn check_email(email: &str) -> Result<(), HandlerErr> {
    if email.contains('@') {
        return Ok(());
    }
    Err(HandlerErr::bad_params("email must be a valid address"))
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = require_str(params, "username")?;
    check_username(&username)?;
    let email = require_str(params, "email")?;
    check_email(&email)?;
    let password = require_str(params, "password")?;
    if password.len() < 6 {
        return Err(HandlerErr::bad_params(
            "password must be at least 6 characters",
        ));
    }
    let full_name = require_str(params, "full_name")?;
    let role = require_enum(params, "role", USER_ROLES)?;
    let is_active = bool_or(params, "is_active", true)?;

    if value_taken(conn, "username", &username, None)? {
        return Err(HandlerErr::duplicate("username", &username));
    }
    if value_taken(conn, "email", &email, None)? {
        return Err(HandlerErr::duplicate("email", &email));
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO users(username, email, password_hash, full_name, role, is_active, \
         created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            username,
            email,
            hash_password(&password),
            full_name,
            role,
            is_active as i64,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("user", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM users ORDER BY id", COLS),
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
    if !id_exists(conn, "users", id)? {
        return Err(HandlerErr::not_found("user", id));
    }

    let username = opt_str(params, "username")?;
    if let Some(ref u) = username {
        check_username(u)?;
    }
    let email = opt_str(params, "email")?;
    if let Some(ref e) = email {
        check_email(e)?;
    }
    let full_name = opt_str(params, "full_name")?;
    let role = opt_enum(params, "role", USER_ROLES)?;
    let is_active = opt_bool(params, "is_active")?;

    if let Some(ref u) = username {
        if value_taken(conn, "username", u, Some(id))? {
            return Err(HandlerErr::duplicate("username", u));
        }
    }
    if let Some(ref e) = email {
        if value_taken(conn, "email", e, Some(id))? {
            return Err(HandlerErr::duplicate("email", e));
        }
    }

    let mut patch = RowPatch::new();
    patch.text("username", username);
    patch.text("email", email);
    patch.text("full_name", full_name);
    patch.text("role", role);
    patch.flag("is_active", is_active);
    patch.apply(conn, "users", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("user", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "users", id)? {
        return Err(HandlerErr::not_found("user", id));
    }
    conn.execute("DELETE FROM users WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(with_db(state, req, create)),
        "users.getAll" => Some(with_db(state, req, get_all)),
        "users.getById" => Some(with_db(state, req, get_by_id)),
        "users.update" => Some(with_db(state, req, update)),
        "users.delete" => Some(with_db(state, req, delete)),
        _ => None,
    }
}
