use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

pub const USER_ROLES: &[&str] = &["admin", "guru"];
pub const GENDERS: &[&str] = &["L", "P"];
pub const STUDENT_ORIGINS: &[&str] = &[
    "smp_darul_muttaqien",
    "mts",
    "luar_smp_darul_muttaqien",
];
pub const PAYMENT_STATUSES: &[&str] = &["belum_bayar", "lunas", "terlambat"];
pub const LETTER_TYPES: &[&str] = &["masuk", "keluar"];

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(what: &str, id: i64) -> Self {
        HandlerErr {
            code: "not_found",
            message: format!("{} with id {} not found", what, id),
            details: Some(json!({ "id": id })),
        }
    }

    pub fn ref_not_found(what: &str, id: i64) -> Self {
        HandlerErr {
            code: "ref_not_found",
            message: format!("{} with id {} not found", what, id),
            details: Some(json!({ "id": id })),
        }
    }

    pub fn duplicate(field: &str, value: impl ToString) -> Self {
        HandlerErr {
            code: "duplicate_value",
            message: format!("{} {} already exists", field, value.to_string()),
            details: Some(json!({ "field": field, "value": value.to_string() })),
        }
    }

    pub fn rule(message: impl Into<String>) -> Self {
        HandlerErr {
            code: "rule_violation",
            message: message.into(),
            details: None,
        }
    }

    pub fn db_query(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_insert(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_update(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_delete(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: None,
        }
    }

    pub fn db_tx(e: rusqlite::Error) -> Self {
        HandlerErr {
            code: "db_tx_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

/// Resolve the open database connection and run one handler body, mapping
/// its result into the response envelope.
pub fn with_db(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

/// Update payloads distinguish three states per field: key absent (leave the
/// stored value untouched), explicit null (clear a nullable column), and a
/// concrete value.
pub enum Patch<T> {
    Absent,
    Null,
    Set(T),
}

pub fn require_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn require_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn require_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn require_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn require_enum(
    params: &serde_json::Value,
    key: &str,
    allowed: &'static [&str],
) -> Result<String, HandlerErr> {
    let value = require_str(params, key)?;
    check_enum(key, &value, allowed)?;
    Ok(value)
}

pub fn check_enum(key: &str, value: &str, allowed: &[&str]) -> Result<(), HandlerErr> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(HandlerErr {
        code: "bad_params",
        message: format!("{} must be one of: {}", key, allowed.join(", ")),
        details: Some(json!({ "value": value })),
    })
}

pub fn require_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = require_str(params, key)?;
    parse_date(&raw).ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

/// Create-side nullable text field: absent and explicit null both read as
/// "no value".
pub fn nullable_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn nullable_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn nullable_date(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match nullable_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn nullable_datetime(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    match nullable_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a date or datetime", key))),
    }
}

/// Create-side boolean with a schema default; explicit null is not a boolean.
pub fn bool_or(params: &serde_json::Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Update-side optional field over a NOT NULL column: absent leaves the row
/// alone, null is rejected.
pub fn opt_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => {
            Err(HandlerErr::bad_params(format!("{} must not be null", key)))
        }
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => {
            Err(HandlerErr::bad_params(format!("{} must not be null", key)))
        }
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn opt_f64(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => {
            Err(HandlerErr::bad_params(format!("{} must not be null", key)))
        }
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn opt_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => {
            Err(HandlerErr::bad_params(format!("{} must not be null", key)))
        }
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn opt_enum(
    params: &serde_json::Value,
    key: &str,
    allowed: &'static [&str],
) -> Result<Option<String>, HandlerErr> {
    match opt_str(params, key)? {
        None => Ok(None),
        Some(value) => {
            check_enum(key, &value, allowed)?;
            Ok(Some(value))
        }
    }
}

pub fn opt_date(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match opt_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

/// Update-side field over a nullable text column.
pub fn patch_str(params: &serde_json::Value, key: &str) -> Result<Patch<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(Patch::Absent),
        Some(v) if v.is_null() => Ok(Patch::Null),
        Some(v) => v
            .as_str()
            .map(|s| Patch::Set(s.to_string()))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string or null", key))),
    }
}

pub fn patch_i64(params: &serde_json::Value, key: &str) -> Result<Patch<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(Patch::Absent),
        Some(v) if v.is_null() => Ok(Patch::Null),
        Some(v) => v
            .as_i64()
            .map(Patch::Set)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer or null", key))),
    }
}

pub fn patch_date(params: &serde_json::Value, key: &str) -> Result<Patch<String>, HandlerErr> {
    match patch_str(params, key)? {
        Patch::Absent => Ok(Patch::Absent),
        Patch::Null => Ok(Patch::Null),
        Patch::Set(raw) => parse_date(&raw)
            .map(Patch::Set)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key))),
    }
}

pub fn patch_datetime(params: &serde_json::Value, key: &str) -> Result<Patch<String>, HandlerErr> {
    match patch_str(params, key)? {
        Patch::Absent => Ok(Patch::Absent),
        Patch::Null => Ok(Patch::Null),
        Patch::Set(raw) => parse_datetime(&raw)
            .map(Patch::Set)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a date or datetime", key))),
    }
}

/// Normalize a date input to YYYY-MM-DD. Full RFC 3339 timestamps are
/// accepted and truncated to their date part.
pub fn parse_date(raw: &str) -> Option<String> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Some(d.format("%Y-%m-%d").to_string());
    }
    DateTime::parse_from_rfc3339(t)
        .ok()
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

/// Normalize a datetime input to RFC 3339 UTC. A bare date reads as midnight
/// UTC.
pub fn parse_datetime(raw: &str) -> Option<String> {
    let t = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        );
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d").ok().map(|d| {
        d.and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    })
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Accumulates the SET clause of a sparse UPDATE: only fields the caller
/// feeds in are touched, and `apply` always refreshes `updated_at`.
pub struct RowPatch {
    sets: Vec<String>,
    vals: Vec<Value>,
}

impl RowPatch {
    pub fn new() -> Self {
        RowPatch {
            sets: Vec::new(),
            vals: Vec::new(),
        }
    }

    pub fn text(&mut self, col: &str, v: Option<String>) {
        if let Some(v) = v {
            self.sets.push(format!("{} = ?", col));
            self.vals.push(Value::Text(v));
        }
    }

    pub fn text_patch(&mut self, col: &str, p: Patch<String>) {
        match p {
            Patch::Absent => {}
            Patch::Null => {
                self.sets.push(format!("{} = ?", col));
                self.vals.push(Value::Null);
            }
            Patch::Set(v) => {
                self.sets.push(format!("{} = ?", col));
                self.vals.push(Value::Text(v));
            }
        }
    }

    pub fn int(&mut self, col: &str, v: Option<i64>) {
        if let Some(v) = v {
            self.sets.push(format!("{} = ?", col));
            self.vals.push(Value::Integer(v));
        }
    }

    pub fn int_patch(&mut self, col: &str, p: Patch<i64>) {
        match p {
            Patch::Absent => {}
            Patch::Null => {
                self.sets.push(format!("{} = ?", col));
                self.vals.push(Value::Null);
            }
            Patch::Set(v) => {
                self.sets.push(format!("{} = ?", col));
                self.vals.push(Value::Integer(v));
            }
        }
    }

    pub fn real(&mut self, col: &str, v: Option<f64>) {
        if let Some(v) = v {
            self.sets.push(format!("{} = ?", col));
            self.vals.push(Value::Real(v));
        }
    }

    pub fn flag(&mut self, col: &str, v: Option<bool>) {
        if let Some(v) = v {
            self.sets.push(format!("{} = ?", col));
            self.vals.push(Value::Integer(v as i64));
        }
    }

    pub fn apply(mut self, conn: &Connection, table: &str, id: i64) -> Result<(), HandlerErr> {
        self.sets.push("updated_at = ?".to_string());
        self.vals.push(Value::Text(now_ts()));
        self.vals.push(Value::Integer(id));
        let sql = format!("UPDATE {} SET {} WHERE id = ?", table, self.sets.join(", "));
        conn.execute(&sql, params_from_iter(self.vals))
            .map_err(HandlerErr::db_update)?;
        Ok(())
    }
}

pub fn query_rows<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnMut(&rusqlite::Row) -> rusqlite::Result<serde_json::Value>,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map(params, map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    Ok(json!(rows))
}

pub fn id_exists(conn: &Connection, table: &str, id: i64) -> Result<bool, HandlerErr> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    conn.query_row(&sql, [id], |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
        .map_err(HandlerErr::db_query)
}

/// Existence leg of the referential rules: the id must resolve or the write
/// is rejected before it happens.
pub fn require_ref(
    conn: &Connection,
    table: &str,
    what: &str,
    id: i64,
) -> Result<(), HandlerErr> {
    if id_exists(conn, table, id)? {
        return Ok(());
    }
    Err(HandlerErr::ref_not_found(what, id))
}
