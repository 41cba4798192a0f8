use crate::ipc::helpers::{
    now_ts, opt_str, patch_i64, patch_str, with_db, HandlerErr, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, school_name, address, phone, email, website, headmaster_name, logo_path, \
                    description, vision, mission, established_year, created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "school_name": r.get::<_, String>(1)?,
        "address": r.get::<_, String>(2)?,
        "phone": r.get::<_, Option<String>>(3)?,
        "email": r.get::<_, Option<String>>(4)?,
        "website": r.get::<_, Option<String>>(5)?,
        "headmaster_name": r.get::<_, String>(6)?,
        "logo_path": r.get::<_, Option<String>>(7)?,
        "description": r.get::<_, Option<String>>(8)?,
        "vision": r.get::<_, Option<String>>(9)?,
        "mission": r.get::<_, Option<String>>(10)?,
        "established_year": r.get::<_, Option<i64>>(11)?,
        "created_at": r.get::<_, String>(12)?,
        "updated_at": r.get::<_, String>(13)?,
    }))
}

// The profile is a logical singleton: the lowest-id row is "the" profile.
fn fetch_singleton(conn: &Connection) -> Result<Option<(i64, serde_json::Value)>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM school_profile ORDER BY id LIMIT 1", COLS),
        [],
        |r| Ok((r.get::<_, i64>(0)?, row(r)?)),
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    Ok(fetch_singleton(conn)?
        .map(|(_, v)| v)
        .unwrap_or(serde_json::Value::Null))
}

/// Partial update of the singleton; creates it first if no row exists yet,
/// with placeholder text for mandatory fields the input leaves out.
fn update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_name = opt_str(params, "school_name")?;
    let address = opt_str(params, "address")?;
    let phone = patch_str(params, "phone")?;
    let email = patch_str(params, "email")?;
    let website = patch_str(params, "website")?;
    let headmaster_name = opt_str(params, "headmaster_name")?;
    let logo_path = patch_str(params, "logo_path")?;
    let description = patch_str(params, "description")?;
    let vision = patch_str(params, "vision")?;
    let mission = patch_str(params, "mission")?;
    let established_year = patch_i64(params, "established_year")?;

    let existing = fetch_singleton(conn)?;
    let id = match existing {
        Some((id, _)) => id,
        None => {
            let now = now_ts();
            conn.execute(
                "INSERT INTO school_profile(school_name, address, headmaster_name, created_at, \
                 updated_at)
                 VALUES(?, ?, ?, ?, ?)",
                rusqlite::params![
                    school_name
                        .clone()
                        .unwrap_or_else(|| "School Name".to_string()),
                    address.clone().unwrap_or_else(|| "School Address".to_string()),
                    headmaster_name
                        .clone()
                        .unwrap_or_else(|| "Headmaster Name".to_string()),
                    now,
                    now,
                ],
            )
            .map_err(HandlerErr::db_insert)?;
            conn.last_insert_rowid()
        }
    };

    let mut patch = RowPatch::new();
    patch.text("school_name", school_name);
    patch.text("address", address);
    patch.text_patch("phone", phone);
    patch.text_patch("email", email);
    patch.text_patch("website", website);
    patch.text("headmaster_name", headmaster_name);
    patch.text_patch("logo_path", logo_path);
    patch.text_patch("description", description);
    patch.text_patch("vision", vision);
    patch.text_patch("mission", mission);
    patch.int_patch("established_year", established_year);
    patch.apply(conn, "school_profile", id)?;

    conn.query_row(
        &format!("SELECT {} FROM school_profile WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .ok_or_else(|| HandlerErr::not_found("school profile", id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schoolProfile.get" => Some(with_db(state, req, get)),
        "schoolProfile.update" => Some(with_db(state, req, update)),
        _ => None,
    }
}
