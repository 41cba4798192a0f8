use crate::ipc::helpers::{
    bool_or, id_exists, nullable_i64, now_ts, opt_bool, opt_i64, opt_str, patch_i64, query_rows,
    require_i64, require_str, with_db, HandlerErr, Patch, RowPatch,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, name, grade, academic_year, homeroom_teacher_id, is_active, created_at, \
                    updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "name": r.get::<_, String>(1)?,
        "grade": r.get::<_, i64>(2)?,
        "academic_year": r.get::<_, String>(3)?,
        "homeroom_teacher_id": r.get::<_, Option<i64>>(4)?,
        "is_active": r.get::<_, i64>(5)? != 0,
        "created_at": r.get::<_, String>(6)?,
        "updated_at": r.get::<_, String>(7)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM classes WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn check_grade(grade: i64) -> Result<(), HandlerErr> {
    if (1..=3).contains(&grade) {
        return Ok(());
    }
    Err(HandlerErr::bad_params("grade must be between 1 and 3"))
}

// The homeroom assignment requires a teacher that is both present and active.
fn check_homeroom(conn: &Connection, teacher_id: i64) -> Result<(), HandlerErr> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT is_active FROM teachers WHERE id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    match active {
        None => Err(HandlerErr::ref_not_found("teacher", teacher_id)),
        Some(0) => Err(HandlerErr::rule(format!(
            "teacher with id {} is inactive",
            teacher_id
        ))),
        Some(_) => Ok(()),
    }
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = require_str(params, "name")?;
    let grade = require_i64(params, "grade")?;
    check_grade(grade)?;
    let academic_year = require_str(params, "academic_year")?;
    let homeroom_teacher_id = nullable_i64(params, "homeroom_teacher_id")?;
    let is_active = bool_or(params, "is_active", true)?;

    if let Some(tid) = homeroom_teacher_id {
        check_homeroom(conn, tid)?;
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO classes(name, grade, academic_year, homeroom_teacher_id, is_active, \
         created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            name,
            grade,
            academic_year,
            homeroom_teacher_id,
            is_active as i64,
            now,
            now,
        ],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("class", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM classes ORDER BY id", COLS),
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
    if !id_exists(conn, "classes", id)? {
        return Err(HandlerErr::not_found("class", id));
    }

    let name = opt_str(params, "name")?;
    let grade = opt_i64(params, "grade")?;
    if let Some(g) = grade {
        check_grade(g)?;
    }
    let academic_year = opt_str(params, "academic_year")?;
    let homeroom_teacher_id = patch_i64(params, "homeroom_teacher_id")?;
    let is_active = opt_bool(params, "is_active")?;

    if let Patch::Set(tid) = &homeroom_teacher_id {
        check_homeroom(conn, *tid)?;
    }

    let mut patch = RowPatch::new();
    patch.text("name", name);
    patch.int("grade", grade);
    patch.text("academic_year", academic_year);
    patch.int_patch("homeroom_teacher_id", homeroom_teacher_id);
    patch.flag("is_active", is_active);
    patch.apply(conn, "classes", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("class", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "classes", id)? {
        return Err(HandlerErr::not_found("class", id));
    }

    // Delete-guard: retired (inactive) students do not hold the class.
    let active_students: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ? AND is_active = 1",
            [id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db_query)?;
    if active_students > 0 {
        return Err(HandlerErr::rule(
            "cannot delete a class with active students assigned",
        ));
    }

    conn.execute("DELETE FROM classes WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_grade(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let grade = require_i64(params, "grade")?;
    query_rows(
        conn,
        &format!("SELECT {} FROM classes WHERE grade = ? ORDER BY id", COLS),
        [grade],
        row,
    )
}

fn get_by_academic_year(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let academic_year = require_str(params, "academicYear")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM classes WHERE academic_year = ? ORDER BY id",
            COLS
        ),
        [academic_year],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(with_db(state, req, create)),
        "classes.getAll" => Some(with_db(state, req, get_all)),
        "classes.getById" => Some(with_db(state, req, get_by_id)),
        "classes.update" => Some(with_db(state, req, update)),
        "classes.delete" => Some(with_db(state, req, delete)),
        "classes.getByGrade" => Some(with_db(state, req, get_by_grade)),
        "classes.getByAcademicYear" => Some(with_db(state, req, get_by_academic_year)),
        _ => None,
    }
}
