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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("simadam-router-smoke");
    let bundle_out = workspace.join("smoke-backup.simadam.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request(&mut stdin, &mut reader, "3", "users.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "4", "students.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "5", "teachers.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "6", "classes.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "7", "sppPayments.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "8", "letters.getAll", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "certificatePickups.getAll",
        json!({}),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "studentTransfers.getAll",
        json!({}),
    );
    let _ = request(&mut stdin, &mut reader, "11", "studentCards.getAll", json!({}));
    let _ = request(&mut stdin, &mut reader, "12", "schoolProfile.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "backgroundSettings.getAll",
        json!({}),
    );
    let _ = request(&mut stdin, &mut reader, "14", "auth.logout", json!({}));
    let _ = request(&mut stdin, &mut reader, "15", "dashboard.getStats", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "backup.export",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "backup.import",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );

    // Unknown methods fall through to the router's not_implemented reply.
    writeln!(
        stdin,
        "{}",
        json!({ "id": "18", "method": "nosuch.method", "params": {} })
    )
    .expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let unknown: serde_json::Value =
        serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn requests_before_workspace_selection_are_rejected() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "students.getAll", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    drop(stdin);
    let _ = child.wait();
}
