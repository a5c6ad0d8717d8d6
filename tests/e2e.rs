use std::process::Command;

fn run(fixture: &str) -> (String, String, bool) {
    let path = format!("tests/fixtures/{fixture}");
    let output = Command::new(env!("CARGO_BIN_EXE_splitledger"))
        .arg(&path)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn expense_and_settlement_produce_balances() {
    let (stdout, stderr, success) = run("valid.csv");

    assert!(success);
    assert!(stderr.is_empty());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec![
        "group,participant,balance,status",
        "1,1,400.00,owed",
        "1,2,0.00,settled",
        "1,3,-400.00,owes",
    ]);
}

#[test]
fn errors_warn_but_do_not_block() {
    let (stdout, stderr, success) = run("with_errors.csv");

    assert!(success);
    assert!(stderr.contains("unrecognized event type"));
    assert!(stderr.contains("missing amount"));

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec![
        "group,participant,balance,status",
        "1,1,50.00,owed",
        "1,2,-50.00,owes",
    ]);
}

#[test]
fn pending_members_share_expenses_but_stay_separate() {
    let (stdout, stderr, success) = run("pending.csv");

    assert!(success);
    assert!(stderr.is_empty());

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec![
        "group,participant,balance,status",
        "1,1,75.00,owed",
        "1,2,0.00,settled",
        "1,p:7,-75.00,owes",
    ]);
}
