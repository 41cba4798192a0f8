use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_simadamd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn simadamd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn user_params(username: &str, email: &str) -> serde_json::Value {
    json!({
        "username": username,
        "email": email,
        "password": "rahasia123",
        "full_name": "Admin Sekolah",
        "role": "admin"
    })
}

#[test]
fn login_verifies_the_stored_credential() {
    let workspace = temp_dir("simadam-auth-login");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        user_params("admin1", "admin1@sekolah.sch.id"),
    );
    // No credential material in any user-shaped response.
    assert!(created.get("password_hash").is_none());

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "admin1", "password": "rahasia123" }),
    );
    let user = login.get("user").expect("user");
    assert_eq!(user.get("username").and_then(|v| v.as_str()), Some("admin1"));
    assert!(user.get("password_hash").is_none());
    let token = login.get("token").and_then(|v| v.as_str()).expect("token");
    assert!(token.starts_with("tok_"));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "username": "admin1", "password": "salah" }),
    );
    assert_eq!(code, "auth_failed");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "username": "nobody", "password": "rahasia123" }),
    );
    assert_eq!(code, "auth_failed");

    let logout = request_ok(&mut stdin, &mut reader, "6", "auth.logout", json!({}));
    assert_eq!(logout.get("success").and_then(|v| v.as_bool()), Some(true));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn inactive_accounts_cannot_log_in_or_reset() {
    let workspace = temp_dir("simadam-auth-inactive");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        user_params("guru1", "guru1@sekolah.sch.id"),
    );
    let id = created.get("id").and_then(|v| v.as_i64()).expect("id");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "users.update",
        json!({ "id": id, "is_active": false }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "auth.login",
        json!({ "username": "guru1", "password": "rahasia123" }),
    );
    assert_eq!(code, "account_inactive");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "auth.resetPassword",
        json!({ "email": "guru1@sekolah.sch.id", "new_password": "barubaru1" }),
    );
    assert_eq!(code, "account_inactive");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn reset_password_overwrites_the_credential() {
    let workspace = temp_dir("simadam-auth-reset");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        user_params("staf1", "staf1@sekolah.sch.id"),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "auth.resetPassword",
        json!({ "email": "unknown@sekolah.sch.id", "new_password": "barubaru1" }),
    );
    assert_eq!(code, "not_found");

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.resetPassword",
        json!({ "email": "staf1@sekolah.sch.id", "new_password": "barubaru1" }),
    );
    assert_eq!(reset.get("success").and_then(|v| v.as_bool()), Some(true));

    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "auth.login",
        json!({ "username": "staf1", "password": "rahasia123" }),
    );
    assert_eq!(code, "auth_failed");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        json!({ "username": "staf1", "password": "barubaru1" }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn user_crud_enforces_unique_username_and_email() {
    let workspace = temp_dir("simadam-users-unique");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        user_params("operator", "operator@sekolah.sch.id"),
    );
    let first_id = first.get("id").and_then(|v| v.as_i64()).expect("id");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "users.create",
        user_params("operator", "other@sekolah.sch.id"),
    );
    assert_eq!(code, "duplicate_value");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "users.create",
        user_params("operator2", "operator@sekolah.sch.id"),
    );
    assert_eq!(code, "duplicate_value");

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "users.create",
        user_params("operator2", "operator2@sekolah.sch.id"),
    );
    let second_id = second.get("id").and_then(|v| v.as_i64()).expect("id");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "users.update",
        json!({ "id": second_id, "username": "operator" }),
    );
    assert_eq!(code, "duplicate_value");

    // Short usernames and junk emails stop at validation.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "users.create",
        user_params("ab", "ab@sekolah.sch.id"),
    );
    assert_eq!(code, "bad_params");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "8",
        "users.create",
        user_params("abcde", "not-an-email"),
    );
    assert_eq!(code, "bad_params");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "users.update",
        json!({ "id": first_id, "full_name": "Operator Utama", "role": "guru" }),
    );
    assert_eq!(
        updated.get("full_name").and_then(|v| v.as_str()),
        Some("Operator Utama")
    );
    assert_eq!(updated.get("role").and_then(|v| v.as_str()), Some("guru"));
    assert_eq!(
        updated.get("username").and_then(|v| v.as_str()),
        Some("operator")
    );

    let del = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "users.delete",
        json!({ "id": second_id }),
    );
    assert_eq!(del.get("success").and_then(|v| v.as_bool()), Some(true));
    let gone = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "users.getById",
        json!({ "id": second_id }),
    );
    assert!(gone.is_null());

    let _ = std::fs::remove_dir_all(workspace);
}
