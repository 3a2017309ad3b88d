use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use stampede_core::Concurrency;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "us" | "µs" | "usec" | "usecs" | "microsecond" | "microseconds" => {
            Ok(Duration::from_micros(value))
        }
        "ns" | "nsec" | "nsecs" | "nanosecond" | "nanoseconds" => Ok(Duration::from_nanos(value)),
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        "h" | "hr" | "hrs" | "hour" | "hours" => {
            let secs = value
                .checked_mul(60)
                .and_then(|v| v.checked_mul(60))
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

/// `N` for a fixed worker count, `START..TARGET` for a ramp.
fn parse_concurrency(input: &str) -> Result<Concurrency, String> {
    let s = input.trim();
    let count = |v: &str| {
        v.trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid concurrency '{s}' (expected e.g. 4 or 1..10)"))
    };

    let concurrency = match s.split_once("..") {
        Some((start, target)) => Concurrency::ramp(count(start)?, count(target)?),
        None => Concurrency::fixed(count(s)?),
    };

    if concurrency.start == 0 {
        return Err("concurrency must start with at least one worker".to_string());
    }
    if concurrency.target < concurrency.start {
        return Err(format!(
            "concurrency target {} is below the start {}",
            concurrency.target, concurrency.start
        ));
    }
    Ok(concurrency)
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Progress bar and a final summary.
    HumanReadable,
    /// Emit one JSON line (NDJSON) per sample to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Distributed load generator",
    long_about = "stampede drives a workload (a comma separated list of named steps) at a controlled concurrency and reports latency, errors and throughput.\n\nIterations run in-process by default. With --bus they are pushed to a TCP broker and served by `stampede slave` processes.",
    after_help = "Examples:\n  stampede run --workload dummy --iterations 100 --concurrency 10\n  stampede run --workload dummy,sleep --iterations 50 --concurrency 1..8 --concurrency-step-time 1s\n  stampede bus --bind 127.0.0.1:7700\n  stampede slave --bus 127.0.0.1:7700 --consumers 4\n  stampede run --workload dummy --iterations 100 --bus 127.0.0.1:7700 --output json\n  stampede runs --csv-dir ./results"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an experiment
    Run(RunArgs),

    /// Serve dispatched jobs from a bus
    Slave(SlaveArgs),

    /// Run the TCP job broker
    Bus(BusArgs),

    /// List runs stored by `run --csv-dir`
    Runs(RunsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Comma separated list of steps run by every iteration
    #[arg(long, env = "STAMPEDE_WORKLOAD", default_value = "dummy")]
    pub workload: String,

    /// Iterations per batch
    #[arg(long, default_value_t = 1)]
    pub iterations: u64,

    /// Concurrent workers: `N`, or `START..TARGET` to ramp
    #[arg(long, value_parser = parse_concurrency, default_value = "1")]
    pub concurrency: Concurrency,

    /// Time between two ramp steps (e.g. 10s, 250ms, 1m)
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pub concurrency_step_time: Duration,

    /// Start a new batch every interval (requires --stop)
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pub interval: Duration,

    /// Stop starting batches after this long
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pub stop: Duration,

    /// Dispatch iterations through the broker at this address instead of running them here
    #[arg(long, env = "STAMPEDE_BUS", value_name = "ADDR")]
    pub bus: Option<String>,

    /// Job queue name on the bus
    #[arg(long, default_value = stampede_core::DEFAULT_QUEUE)]
    pub queue: String,

    /// How long to wait for a slave reply
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub timeout: Duration,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Write result samples as CSV into this directory
    #[arg(long, env = "STAMPEDE_CSV_DIR", value_name = "DIR")]
    pub csv_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SlaveArgs {
    /// Broker address
    #[arg(long, env = "STAMPEDE_BUS", value_name = "ADDR")]
    pub bus: String,

    /// Job queue name on the bus
    #[arg(long, default_value = stampede_core::DEFAULT_QUEUE)]
    pub queue: String,

    /// Jobs served concurrently
    #[arg(long, default_value_t = 1)]
    pub consumers: usize,
}

#[derive(Debug, Args)]
pub struct BusArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:7700", value_name = "ADDR")]
    pub bind: String,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    /// Directory passed to `run --csv-dir`
    #[arg(long, env = "STAMPEDE_CSV_DIR", value_name = "DIR")]
    pub csv_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        }
    }

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn parse_concurrency_accepts_fixed_and_ramp() {
        assert_eq!(parse_concurrency("4"), Ok(Concurrency::fixed(4)));
        assert_eq!(parse_concurrency("1..10"), Ok(Concurrency::ramp(1, 10)));
        assert_eq!(parse_concurrency(" 2 .. 3 "), Ok(Concurrency::ramp(2, 3)));
    }

    #[test]
    fn parse_concurrency_rejects_impossible_shapes() {
        assert!(parse_concurrency("0").is_err());
        assert!(parse_concurrency("5..2").is_err());
        assert!(parse_concurrency("a..b").is_err());
        assert!(parse_concurrency("").is_err());
    }

    #[test]
    fn cli_parses_run() {
        let cli = parse(&[
            "stampede",
            "run",
            "--workload",
            "dummy,sleep",
            "--iterations",
            "10",
            "--concurrency",
            "1..4",
            "--concurrency-step-time",
            "250ms",
            "--interval",
            "1s",
            "--stop",
            "3s",
            "--output",
            "json",
        ]);

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.workload, "dummy,sleep");
                assert_eq!(args.iterations, 10);
                assert_eq!(args.concurrency, Concurrency::ramp(1, 4));
                assert_eq!(args.concurrency_step_time, Duration::from_millis(250));
                assert_eq!(args.interval, Duration::from_secs(1));
                assert_eq!(args.stop, Duration::from_secs(3));
                assert_eq!(args.bus, None);
                assert_eq!(args.queue, stampede_core::DEFAULT_QUEUE);
                assert_eq!(args.timeout, Duration::from_secs(5));
                assert!(matches!(args.output, OutputFormat::Json));
            }
            other => panic!("expected run command, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_slave_and_bus() {
        match parse(&["stampede", "slave", "--bus", "127.0.0.1:9000", "--consumers", "3"]).command
        {
            Command::Slave(args) => {
                assert_eq!(args.bus, "127.0.0.1:9000");
                assert_eq!(args.consumers, 3);
                assert_eq!(args.queue, stampede_core::DEFAULT_QUEUE);
            }
            other => panic!("expected slave command, got {other:?}"),
        }

        match parse(&["stampede", "bus"]).command {
            Command::Bus(args) => assert_eq!(args.bind, "127.0.0.1:7700"),
            other => panic!("expected bus command, got {other:?}"),
        }
    }
}
