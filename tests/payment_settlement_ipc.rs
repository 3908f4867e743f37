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
    let exe = env!("CARGO_BIN_EXE_admitd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn admitd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn raw_request(
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
    let value = raw_request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

#[test]
fn scenario_a_one_rupee_full_payment_settles() {
    let workspace = temp_dir("admit-pay-a");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "payment.open",
        json!({ "totalFee": 1 }),
    );
    assert_eq!(opened.get("totalFee").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(opened.get("paidAmount").and_then(|v| v.as_i64()), Some(0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "payment.selectMode",
        json!({ "mode": "full" }),
    );
    let paid = request_ok(&mut stdin, &mut reader, "3", "payment.pay", json!({}));
    assert_eq!(
        paid.get("invoice")
            .and_then(|i| i.get("amount"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(paid.get("paidAmount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(paid.get("settled").and_then(|v| v.as_bool()), Some(true));
    assert!(paid.get("redirectAfterMs").and_then(|v| v.as_u64()).is_some());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn scenario_b_two_part_installments_settle_at_the_total() {
    let workspace = temp_dir("admit-pay-b");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "payment.open",
        json!({ "totalFee": 60000, "maxInstallmentLimit": 50000 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "payment.selectMode",
        json!({ "mode": "part" }),
    );

    // First installment is capped at the per-transaction ceiling.
    let first = request_ok(&mut stdin, &mut reader, "3", "payment.pay", json!({}));
    assert_eq!(
        first
            .get("invoice")
            .and_then(|i| i.get("amount"))
            .and_then(|v| v.as_i64()),
        Some(50000)
    );
    assert_eq!(first.get("paidAmount").and_then(|v| v.as_i64()), Some(50000));
    assert_eq!(first.get("balance").and_then(|v| v.as_i64()), Some(10000));
    assert_eq!(first.get("settled").and_then(|v| v.as_bool()), Some(false));
    assert!(first.get("redirectAfterMs").is_none());

    // Second installment only charges what is left.
    let second = request_ok(&mut stdin, &mut reader, "4", "payment.pay", json!({}));
    assert_eq!(
        second
            .get("invoice")
            .and_then(|i| i.get("amount"))
            .and_then(|v| v.as_i64()),
        Some(10000)
    );
    assert_eq!(
        second.get("paidAmount").and_then(|v| v.as_i64()),
        Some(60000)
    );
    assert_eq!(second.get("settled").and_then(|v| v.as_bool()), Some(true));
    // The settling charge schedules the navigation-away, exactly once.
    assert!(second
        .get("redirectAfterMs")
        .and_then(|v| v.as_u64())
        .is_some());

    // Paying past settlement is refused and schedules nothing further.
    let refused = raw_request(&mut stdin, &mut reader, "5", "payment.pay", json!({}));
    assert_eq!(refused.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        refused
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("already_settled")
    );

    let state = request_ok(&mut stdin, &mut reader, "6", "payment.state", json!({}));
    assert_eq!(state.get("paidAmount").and_then(|v| v.as_i64()), Some(60000));
    assert_eq!(state.get("settled").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn receipts_are_written_with_payer_details_from_the_record() {
    let workspace = temp_dir("admit-pay-receipt");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "record.save",
        json!({ "fields": {
            "first_name": "Asha",
            "last_name": "Rao",
            "course": "B.Tech CSE"
        }}),
    );

    let opened = request_ok(&mut stdin, &mut reader, "2", "payment.open", json!({}));
    assert_eq!(
        opened.get("payerName").and_then(|v| v.as_str()),
        Some("Asha Rao")
    );
    assert_eq!(
        opened.get("course").and_then(|v| v.as_str()),
        Some("B.Tech CSE")
    );

    let paid = request_ok(&mut stdin, &mut reader, "3", "payment.pay", json!({}));
    let receipt_path = paid
        .get("receiptPath")
        .and_then(|v| v.as_str())
        .expect("receipt path");
    let text = std::fs::read_to_string(receipt_path).expect("read receipt");
    assert!(text.contains("Asha Rao"));
    assert!(text.contains("B.Tech CSE"));
    assert!(text.contains("integrity: sha256:"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn payment_session_defaults_use_placeholder_details() {
    let workspace = temp_dir("admit-pay-placeholder");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);

    // No record saved: display fields fall back at invoice time.
    let _ = request_ok(&mut stdin, &mut reader, "1", "payment.open", json!({}));
    let paid = request_ok(&mut stdin, &mut reader, "2", "payment.pay", json!({}));
    assert_eq!(
        paid.get("invoice")
            .and_then(|i| i.get("payerName"))
            .and_then(|v| v.as_str()),
        Some("N/A")
    );
    assert_eq!(
        paid.get("invoice")
            .and_then(|i| i.get("course"))
            .and_then(|v| v.as_str()),
        Some("N/A")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
