use std::io::{BufRead as _, BufReader};
use std::process::{Child, Command, Stdio};

use anyhow::Context as _;

/// Child process that is killed when the test is done with it.
struct Spawned(Child);

impl Drop for Spawned {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn(args: &[&str]) -> anyhow::Result<Spawned> {
    let child = Command::new(env!("CARGO_BIN_EXE_stampede"))
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn stampede binary")?;
    Ok(Spawned(child))
}

/// Starts a broker on an ephemeral port and returns it with its address.
fn start_bus() -> anyhow::Result<(Spawned, String)> {
    let mut bus = spawn(&["bus", "--bind", "127.0.0.1:0"])?;
    let stderr = bus.0.stderr.take().context("bus stderr")?;

    let mut line = String::new();
    BufReader::new(stderr)
        .read_line(&mut line)
        .context("read bus address")?;
    let addr = line
        .trim()
        .strip_prefix("bus=")
        .with_context(|| format!("unexpected bus banner: {line}"))?
        .to_string();
    Ok((bus, addr))
}

#[test]
fn run_dispatches_iterations_to_a_slave_process() -> anyhow::Result<()> {
    let (_bus, addr) = start_bus()?;
    let _slave = spawn(&["slave", "--bus", &addr, "--consumers", "2"])?;

    let out = Command::new(env!("CARGO_BIN_EXE_stampede"))
        .args([
            "run",
            "--workload",
            "dummy,sleep",
            "--iterations",
            "6",
            "--concurrency",
            "2",
            "--bus",
            &addr,
            "--timeout",
            "10s",
            "--output",
            "json",
        ])
        .output()
        .context("run stampede binary")?;

    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        out.status.code() == Some(0),
        "exit {:?}\nstdout:\n{stdout}\nstderr:\n{}",
        out.status.code(),
        String::from_utf8_lossy(&out.stderr)
    );

    let last = stdout.lines().last().context("no output lines")?;
    let summary: serde_json::Value = serde_json::from_str(last).context("parse summary line")?;
    anyhow::ensure!(summary["last"]["total"] == 6, "last line: {last}");
    anyhow::ensure!(summary["last"]["commands"]["sleep"]["count"] == 6, "last line: {last}");
    Ok(())
}
