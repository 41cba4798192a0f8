use crate::ipc::helpers::{
    bool_or, id_exists, nullable_i64, nullable_str, now_ts, opt_bool, opt_date, opt_enum,
    opt_i64, opt_str, patch_i64, patch_str, query_rows, require_date, require_enum, require_i64,
    require_ref, require_str, with_db, HandlerErr, Patch, RowPatch, GENDERS, STUDENT_ORIGINS,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, nis, nisn, full_name, gender, birth_place, birth_date, address, phone, \
                    parent_name, parent_phone, origin_school, entry_year, class_id, is_active, \
                    created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "nis": r.get::<_, String>(1)?,
        "nisn": r.get::<_, Option<String>>(2)?,
        "full_name": r.get::<_, String>(3)?,
        "gender": r.get::<_, String>(4)?,
        "birth_place": r.get::<_, String>(5)?,
        "birth_date": r.get::<_, String>(6)?,
        "address": r.get::<_, String>(7)?,
        "phone": r.get::<_, Option<String>>(8)?,
        "parent_name": r.get::<_, String>(9)?,
        "parent_phone": r.get::<_, Option<String>>(10)?,
        "origin_school": r.get::<_, String>(11)?,
        "entry_year": r.get::<_, i64>(12)?,
        "class_id": r.get::<_, Option<i64>>(13)?,
        "is_active": r.get::<_, i64>(14)? != 0,
        "created_at": r.get::<_, String>(15)?,
        "updated_at": r.get::<_, String>(16)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn nis_taken(conn: &Connection, nis: &str, exclude: Option<i64>) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM students WHERE nis = ? AND id != ?",
        (nis, exclude.unwrap_or(-1)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let nis = require_str(params, "nis")?;
    let nisn = nullable_str(params, "nisn")?;
    let full_name = require_str(params, "full_name")?;
    let gender = require_enum(params, "gender", GENDERS)?;
    let birth_place = require_str(params, "birth_place")?;
    let birth_date = require_date(params, "birth_date")?;
    let address = require_str(params, "address")?;
    let phone = nullable_str(params, "phone")?;
    let parent_name = require_str(params, "parent_name")?;
    let parent_phone = nullable_str(params, "parent_phone")?;
    let origin_school = require_enum(params, "origin_school", STUDENT_ORIGINS)?;
    let entry_year = require_i64(params, "entry_year")?;
    let class_id = nullable_i64(params, "class_id")?;
    let is_active = bool_or(params, "is_active", true)?;

    if let Some(cid) = class_id {
        require_ref(conn, "classes", "class", cid)?;
    }
    if nis_taken(conn, &nis, None)? {
        return Err(HandlerErr::duplicate("nis", &nis));
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO students(nis, nisn, full_name, gender, birth_place, birth_date, address, \
         phone, parent_name, parent_phone, origin_school, entry_year, class_id, is_active, \
         created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            nis,
            nisn,
            full_name,
            gender,
            birth_place,
            birth_date,
            address,
            phone,
            parent_name,
            parent_phone,
            origin_school,
            entry_year,
            class_id,
            is_active as i64,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("student", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM students ORDER BY id", COLS),
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
    let Some(_existing) = fetch(conn, id)? else {
        return Err(HandlerErr::not_found("student", id));
    };

    let nis = opt_str(params, "nis")?;
    let nisn = patch_str(params, "nisn")?;
    let full_name = opt_str(params, "full_name")?;
    let gender = opt_enum(params, "gender", GENDERS)?;
    let birth_place = opt_str(params, "birth_place")?;
    let birth_date = opt_date(params, "birth_date")?;
    let address = opt_str(params, "address")?;
    let phone = patch_str(params, "phone")?;
    let parent_name = opt_str(params, "parent_name")?;
    let parent_phone = patch_str(params, "parent_phone")?;
    let origin_school = opt_enum(params, "origin_school", STUDENT_ORIGINS)?;
    let entry_year = opt_i64(params, "entry_year")?;
    let class_id = patch_i64(params, "class_id")?;
    let is_active = opt_bool(params, "is_active")?;

    if let Patch::Set(cid) = &class_id {
        require_ref(conn, "classes", "class", *cid)?;
    }
    if let Some(ref nis) = nis {
        if nis_taken(conn, nis, Some(id))? {
            return Err(HandlerErr::duplicate("nis", nis));
        }
    }

    let mut patch = RowPatch::new();
    patch.text("nis", nis);
    patch.text_patch("nisn", nisn);
    patch.text("full_name", full_name);
    patch.text("gender", gender);
    patch.text("birth_place", birth_place);
    patch.text("birth_date", birth_date);
    patch.text("address", address);
    patch.text_patch("phone", phone);
    patch.text("parent_name", parent_name);
    patch.text_patch("parent_phone", parent_phone);
    patch.text("origin_school", origin_school);
    patch.int("entry_year", entry_year);
    patch.int_patch("class_id", class_id);
    patch.flag("is_active", is_active);
    patch.apply(conn, "students", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("student", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "students", id)? {
        return Err(HandlerErr::not_found("student", id));
    }
    conn.execute("DELETE FROM students WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_class(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = require_i64(params, "classId")?;
    query_rows(
        conn,
        &format!("SELECT {} FROM students WHERE class_id = ? ORDER BY id", COLS),
        [class_id],
        row,
    )
}

fn get_by_origin(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let origin = require_enum(params, "origin", STUDENT_ORIGINS)?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM students WHERE origin_school = ? ORDER BY id",
            COLS
        ),
        [origin],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_db(state, req, create)),
        "students.getAll" => Some(with_db(state, req, get_all)),
        "students.getById" => Some(with_db(state, req, get_by_id)),
        "students.update" => Some(with_db(state, req, update)),
        "students.delete" => Some(with_db(state, req, delete)),
        "students.getByClass" => Some(with_db(state, req, get_by_class)),
        "students.getByOrigin" => Some(with_db(state, req, get_by_origin)),
        _ => None,
    }
}
