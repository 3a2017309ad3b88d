use std::process::{Command, Output};

use anyhow::Context as _;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn stampede(args: &[&str]) -> anyhow::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_stampede"))
        .args(args)
        .output()
        .context("run stampede binary")
}

fn expect_code(out: &Output, code: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == code,
        "expected exit code {code}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let out = stampede(&["run", "--stop", "10x"])?;
    expect_code(&out, 30)?;

    let out = stampede(&["run", "--concurrency", "4..2"])?;
    expect_code(&out, 30)
}

#[test]
fn unknown_workload_step_exits_30() -> anyhow::Result<()> {
    let out = stampede(&["run", "--workload", "dummy,nope", "--output", "json"])?;
    expect_code(&out, 30)?;

    let stderr = String::from_utf8_lossy(&out.stderr);
    anyhow::ensure!(stderr.contains("nope"), "stderr:\n{stderr}");
    Ok(())
}

#[test]
fn failed_iterations_exit_10() -> anyhow::Result<()> {
    let out = stampede(&[
        "run",
        "--workload",
        "dummyWithErrors",
        "--iterations",
        "3",
        "--output",
        "json",
    ])?;
    expect_code(&out, 10)
}

#[test]
fn successful_run_exits_0_and_ends_with_a_summary_line() -> anyhow::Result<()> {
    let out = stampede(&[
        "run",
        "--workload",
        "dummy",
        "--iterations",
        "5",
        "--concurrency",
        "2",
        "--output",
        "json",
    ])?;
    expect_code(&out, 0)?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout.lines().last().context("no output lines")?;
    let summary: serde_json::Value = serde_json::from_str(last).context("parse summary line")?;

    anyhow::ensure!(summary["kind"] == "summary", "last line: {last}");
    anyhow::ensure!(summary["last"]["total"] == 5, "last line: {last}");
    anyhow::ensure!(summary["last"]["total_errors"] == 0, "last line: {last}");
    Ok(())
}

#[test]
fn csv_dir_receives_samples_and_lists_runs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_dir = dir.path().join("runs");

    let out = stampede(&[
        "run",
        "--workload",
        "dummy",
        "--iterations",
        "4",
        "--output",
        "json",
        "--csv-dir",
        csv_dir.to_str().context("utf-8 temp path")?,
    ])?;
    expect_code(&out, 0)?;

    let mut csv_files = Vec::new();
    for entry in std::fs::read_dir(&csv_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            csv_files.push(path);
        }
    }
    anyhow::ensure!(csv_files.len() == 1, "csv files: {csv_files:?}");

    let rows = std::fs::read_to_string(&csv_files[0])?;
    // header + one row per result sample
    anyhow::ensure!(rows.lines().count() == 5, "csv:\n{rows}");

    let meta = std::fs::read_to_string(csv_dir.join("csv.meta"))?;
    anyhow::ensure!(meta.lines().count() == 2, "meta:\n{meta}");

    let out = stampede(&["runs", "--csv-dir", csv_dir.to_str().context("utf-8 temp path")?])?;
    expect_code(&out, 0)?;
    let listing = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        listing.lines().count() == 1 && listing.contains("iterations=4 errors=0"),
        "runs:\n{listing}"
    );
    Ok(())
}
