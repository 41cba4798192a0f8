use crate::ipc::helpers::{
    id_exists, nullable_datetime, nullable_str, now_ts, opt_enum, opt_f64, opt_i64,
    patch_datetime, patch_str, query_rows, require_enum, require_f64, require_i64, require_ref,
    with_db, HandlerErr, RowPatch, PAYMENT_STATUSES,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const COLS: &str = "id, student_id, month, year, amount, payment_date, status, notes, \
                    created_at, updated_at";

fn row(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "student_id": r.get::<_, i64>(1)?,
        "month": r.get::<_, i64>(2)?,
        "year": r.get::<_, i64>(3)?,
        "amount": r.get::<_, f64>(4)?,
        "payment_date": r.get::<_, Option<String>>(5)?,
        "status": r.get::<_, String>(6)?,
        "notes": r.get::<_, Option<String>>(7)?,
        "created_at": r.get::<_, String>(8)?,
        "updated_at": r.get::<_, String>(9)?,
    }))
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<serde_json::Value>, HandlerErr> {
    conn.query_row(
        &format!("SELECT {} FROM spp_payments WHERE id = ?", COLS),
        [id],
        row,
    )
    .optional()
    .map_err(HandlerErr::db_query)
}

fn check_month(month: i64) -> Result<(), HandlerErr> {
    if (1..=12).contains(&month) {
        return Ok(());
    }
    Err(HandlerErr::bad_params("month must be between 1 and 12"))
}

fn check_amount(amount: f64) -> Result<(), HandlerErr> {
    if amount > 0.0 {
        return Ok(());
    }
    Err(HandlerErr::bad_params("amount must be positive"))
}

// At most one payment per (student, month, year).
fn triple_taken(
    conn: &Connection,
    student_id: i64,
    month: i64,
    year: i64,
    exclude: Option<i64>,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM spp_payments WHERE student_id = ? AND month = ? AND year = ? AND id != ?",
        (student_id, month, year, exclude.unwrap_or(-1)),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db_query)
}

fn create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "student_id")?;
    let month = require_i64(params, "month")?;
    check_month(month)?;
    let year = require_i64(params, "year")?;
    let amount = require_f64(params, "amount")?;
    check_amount(amount)?;
    let payment_date = nullable_datetime(params, "payment_date")?;
    let status = require_enum(params, "status", PAYMENT_STATUSES)?;
    let notes = nullable_str(params, "notes")?;

    require_ref(conn, "students", "student", student_id)?;
    if triple_taken(conn, student_id, month, year, None)? {
        return Err(HandlerErr {
            code: "duplicate_value",
            message: format!(
                "payment for student {} already exists for {}/{}",
                student_id, month, year
            ),
            details: Some(json!({
                "student_id": student_id,
                "month": month,
                "year": year,
            })),
        });
    }

    let now = now_ts();
    conn.execute(
        "INSERT INTO spp_payments(student_id, month, year, amount, payment_date, status, notes, \
         created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![student_id, month, year, amount, payment_date, status, notes, now, now],
    )
    .map_err(HandlerErr::db_insert)?;

    let id = conn.last_insert_rowid();
    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("payment", id))
}

fn get_all(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    query_rows(
        conn,
        &format!("SELECT {} FROM spp_payments ORDER BY id", COLS),
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
    let (cur_student, cur_month, cur_year): (i64, i64, i64) = conn
        .query_row(
            "SELECT student_id, month, year FROM spp_payments WHERE id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?
        .ok_or_else(|| HandlerErr::not_found("payment", id))?;

    let student_id = opt_i64(params, "student_id")?;
    let month = opt_i64(params, "month")?;
    if let Some(m) = month {
        check_month(m)?;
    }
    let year = opt_i64(params, "year")?;
    let amount = opt_f64(params, "amount")?;
    if let Some(a) = amount {
        check_amount(a)?;
    }
    let payment_date = patch_datetime(params, "payment_date")?;
    let status = opt_enum(params, "status", PAYMENT_STATUSES)?;
    let notes = patch_str(params, "notes")?;

    if let Some(sid) = student_id {
        require_ref(conn, "students", "student", sid)?;
    }

    // Uniqueness over the effective triple: take each component from the
    // input when present, else from the stored row, and exclude this row.
    if student_id.is_some() || month.is_some() || year.is_some() {
        let eff_student = student_id.unwrap_or(cur_student);
        let eff_month = month.unwrap_or(cur_month);
        let eff_year = year.unwrap_or(cur_year);
        if triple_taken(conn, eff_student, eff_month, eff_year, Some(id))? {
            return Err(HandlerErr {
                code: "duplicate_value",
                message: format!(
                    "payment for student {} already exists for {}/{}",
                    eff_student, eff_month, eff_year
                ),
                details: Some(json!({
                    "student_id": eff_student,
                    "month": eff_month,
                    "year": eff_year,
                })),
            });
        }
    }

    let mut patch = RowPatch::new();
    patch.int("student_id", student_id);
    patch.int("month", month);
    patch.int("year", year);
    patch.real("amount", amount);
    patch.text_patch("payment_date", payment_date);
    patch.text("status", status);
    patch.text_patch("notes", notes);
    patch.apply(conn, "spp_payments", id)?;

    fetch(conn, id)?.ok_or_else(|| HandlerErr::not_found("payment", id))
}

fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = require_i64(params, "id")?;
    if !id_exists(conn, "spp_payments", id)? {
        return Err(HandlerErr::not_found("payment", id));
    }
    conn.execute("DELETE FROM spp_payments WHERE id = ?", [id])
        .map_err(HandlerErr::db_delete)?;
    Ok(json!({ "success": true }))
}

fn get_by_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = require_i64(params, "studentId")?;
    require_ref(conn, "students", "student", student_id)?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM spp_payments WHERE student_id = ? ORDER BY id",
            COLS
        ),
        [student_id],
        row,
    )
}

fn get_by_status(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let status = require_enum(params, "status", PAYMENT_STATUSES)?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM spp_payments WHERE status = ? ORDER BY id",
            COLS
        ),
        [status],
        row,
    )
}

fn get_by_month_year(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let month = require_i64(params, "month")?;
    let year = require_i64(params, "year")?;
    query_rows(
        conn,
        &format!(
            "SELECT {} FROM spp_payments WHERE month = ? AND year = ? ORDER BY id",
            COLS
        ),
        [month, year],
        row,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sppPayments.create" => Some(with_db(state, req, create)),
        "sppPayments.getAll" => Some(with_db(state, req, get_all)),
        "sppPayments.getById" => Some(with_db(state, req, get_by_id)),
        "sppPayments.update" => Some(with_db(state, req, update)),
        "sppPayments.delete" => Some(with_db(state, req, delete)),
        "sppPayments.getByStudent" => Some(with_db(state, req, get_by_student)),
        "sppPayments.getByStatus" => Some(with_db(state, req, get_by_status)),
        "sppPayments.getByMonthYear" => Some(with_db(state, req, get_by_month_year)),
        _ => None,
    }
}
