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

fn student(nis: &str, origin: &str) -> serde_json::Value {
    json!({
        "nis": nis,
        "nisn": null,
        "full_name": "Student",
        "gender": "L",
        "birth_place": "Bogor",
        "birth_date": "2008-05-05",
        "address": "Jl. Kamboja No. 6",
        "phone": null,
        "parent_name": "Parent",
        "parent_phone": null,
        "origin_school": origin,
        "entry_year": 2023,
        "class_id": null
    })
}

#[test]
fn stats_count_active_rows_and_origins() {
    let workspace = temp_dir("simadam-dashboard");
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
        "students.create",
        student("S900", "smp_darul_muttaqien"),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        student("S901", "mts"),
    );
    let s3 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        student("S902", "luar_smp_darul_muttaqien"),
    );
    let s3_id = s3.get("id").and_then(|v| v.as_i64()).expect("id");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({
            "nip": null,
            "full_name": "Guru Satu",
            "gender": "P",
            "birth_place": "Bogor",
            "birth_date": "1990-01-01",
            "address": "Jl. Teratai No. 10",
            "phone": null,
            "email": null,
            "subject": null,
            "user_id": null
        }),
    );

    // Retiring a student drops the active count but not the origin tallies.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.update",
        json!({ "id": s3_id, "is_active": false }),
    );

    let stats = request_ok(&mut stdin, &mut reader, "7", "dashboard.getStats", json!({}));
    assert_eq!(stats.get("total_students").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(stats.get("total_teachers").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        stats.get("students_from_smp").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        stats.get("students_from_mts").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        stats.get("students_from_other").and_then(|v| v.as_i64()),
        Some(1)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
