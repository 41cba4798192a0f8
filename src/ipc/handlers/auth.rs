use crate::ipc::helpers::{now_ts, require_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stored credential format is `digest:salt`, where digest is the hex
/// SHA-256 of salt followed by the password.
pub(super) fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}:{}", digest_with_salt(password, &salt), salt)
}

pub(super) fn verify_password(password: &str, stored: &str) -> bool {
    let Some((digest, salt)) = stored.split_once(':') else {
        return false;
    };
    digest_with_salt(password, salt) == digest
}

fn digest_with_salt(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}

struct AuthUser {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl AuthUser {
    // The credential never leaves the daemon.
    fn public_row(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "username": self.username,
            "email": self.email,
            "full_name": self.full_name,
            "role": self.role,
            "is_active": self.is_active,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        })
    }
}

fn fetch_by<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Option<AuthUser>, HandlerErr> {
    conn.query_row(sql, params, |r| {
        Ok(AuthUser {
            id: r.get(0)?,
            username: r.get(1)?,
            email: r.get(2)?,
            password_hash: r.get(3)?,
            full_name: r.get(4)?,
            role: r.get(5)?,
            is_active: r.get::<_, i64>(6)? != 0,
            created_at: r.get(7)?,
            updated_at: r.get(8)?,
        })
    })
    .optional()
    .map_err(HandlerErr::db_query)
}

const USER_COLS: &str = "id, username, email, password_hash, full_name, role, is_active, \
                         created_at, updated_at";

fn login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = require_str(params, "username")?;
    let password = require_str(params, "password")?;

    let user = fetch_by(
        conn,
        &format!("SELECT {} FROM users WHERE username = ?", USER_COLS),
        [&username],
    )?
    .ok_or_else(|| HandlerErr {
        code: "auth_failed",
        message: "invalid username or password".to_string(),
        details: None,
    })?;

    if !user.is_active {
        return Err(HandlerErr {
            code: "account_inactive",
            message: "user account is inactive".to_string(),
            details: None,
        });
    }
    if !verify_password(&password, &user.password_hash) {
        return Err(HandlerErr {
            code: "auth_failed",
            message: "invalid username or password".to_string(),
            details: None,
        });
    }

    let token = format!("tok_{}", Uuid::new_v4().simple());
    Ok(json!({ "user": user.public_row(), "token": token }))
}

fn logout(_conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    // Tokens are stateless; there is nothing to invalidate server-side.
    Ok(json!({ "success": true }))
}

fn reset_password(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let email = require_str(params, "email")?;
    let new_password = require_str(params, "new_password")?;
    if new_password.len() < 6 {
        return Err(HandlerErr::bad_params(
            "new_password must be at least 6 characters",
        ));
    }

    let user = fetch_by(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?", USER_COLS),
        [&email],
    )?
    .ok_or_else(|| HandlerErr {
        code: "not_found",
        message: "no user with this email".to_string(),
        details: None,
    })?;

    if !user.is_active {
        return Err(HandlerErr {
            code: "account_inactive",
            message: "user account is inactive".to_string(),
            details: None,
        });
    }

    conn.execute(
        "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![hash_password(&new_password), now_ts(), user.id],
    )
    .map_err(HandlerErr::db_update)?;

    Ok(json!({ "success": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(with_db(state, req, login)),
        "auth.logout" => Some(with_db(state, req, logout)),
        "auth.resetPassword" => Some(with_db(state, req, reset_password)),
        _ => None,
    }
}
