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

fn teacher_params(nip: serde_json::Value) -> serde_json::Value {
    json!({
        "nip": nip,
        "full_name": "Hendra Wijaya",
        "gender": "L",
        "birth_place": "Sukabumi",
        "birth_date": "1979-12-01",
        "address": "Jl. Flamboyan No. 4",
        "phone": null,
        "email": null,
        "subject": "Bahasa Arab",
        "user_id": null
    })
}

#[test]
fn nip_uniqueness_only_applies_when_present() {
    let workspace = temp_dir("simadam-teachers-nip");
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
        "teachers.create",
        teacher_params(json!("197912-001")),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        teacher_params(json!("197912-001")),
    );
    assert_eq!(code, "duplicate_value");

    // Two teachers without a NIP never collide with each other.
    let a = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        teacher_params(json!(null)),
    );
    let b = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        teacher_params(json!(null)),
    );
    assert!(a.get("nip").map(|v| v.is_null()).unwrap_or(false));
    assert!(b.get("nip").map(|v| v.is_null()).unwrap_or(false));

    let b_id = b.get("id").and_then(|v| v.as_i64()).expect("id");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.update",
        json!({ "id": b_id, "nip": "197912-001" }),
    );
    assert_eq!(code, "duplicate_value");

    // Assigning a fresh NIP, then clearing it again, both work.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.update",
        json!({ "id": b_id, "nip": "197912-002" }),
    );
    assert_eq!(
        updated.get("nip").and_then(|v| v.as_str()),
        Some("197912-002")
    );
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.update",
        json!({ "id": b_id, "nip": null }),
    );
    assert!(cleared.get("nip").map(|v| v.is_null()).unwrap_or(false));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn user_link_is_checked_and_queryable() {
    let workspace = temp_dir("simadam-teachers-user");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mut p = teacher_params(json!(null));
    p["user_id"] = json!(123);
    let code = request_err(&mut stdin, &mut reader, "2", "teachers.create", p);
    assert_eq!(code, "ref_not_found");

    let user = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "users.create",
        json!({
            "username": "hendra",
            "email": "hendra@sekolah.sch.id",
            "password": "rahasia123",
            "full_name": "Hendra Wijaya",
            "role": "guru"
        }),
    );
    let user_id = user.get("id").and_then(|v| v.as_i64()).expect("id");

    let mut p = teacher_params(json!(null));
    p["user_id"] = json!(user_id);
    let teacher = request_ok(&mut stdin, &mut reader, "4", "teachers.create", p);
    let teacher_id = teacher.get("id").and_then(|v| v.as_i64()).expect("id");

    let linked = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.getByUserId",
        json!({ "userId": user_id }),
    );
    assert_eq!(linked.get("id").and_then(|v| v.as_i64()), Some(teacher_id));

    let unlinked = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.getByUserId",
        json!({ "userId": 999 }),
    );
    assert!(unlinked.is_null());

    let _ = std::fs::remove_dir_all(workspace);
}
