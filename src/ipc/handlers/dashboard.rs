use crate::ipc::helpers::{with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn get_stats(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students WHERE is_active = 1),
           (SELECT COUNT(*) FROM teachers WHERE is_active = 1),
           (SELECT COUNT(*) FROM students WHERE origin_school = 'smp_darul_muttaqien'),
           (SELECT COUNT(*) FROM students WHERE origin_school = 'mts'),
           (SELECT COUNT(*) FROM students WHERE origin_school = 'luar_smp_darul_muttaqien')",
        [],
        |r| {
            Ok(json!({
                "total_students": r.get::<_, i64>(0)?,
                "total_teachers": r.get::<_, i64>(1)?,
                "students_from_smp": r.get::<_, i64>(2)?,
                "students_from_mts": r.get::<_, i64>(3)?,
                "students_from_other": r.get::<_, i64>(4)?,
            }))
        },
    )
    .map_err(HandlerErr::db_query)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.getStats" => Some(with_db(state, req, get_stats)),
        _ => None,
    }
}
