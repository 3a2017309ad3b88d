use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::time::Duration;

use stampede_core::{ExperimentConfiguration, Sample};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&mut self, _guid: &str, _config: &ExperimentConfiguration) {}

    fn on_sample(&mut self, sample: &Sample) {
        emit_json_line(&JsonSampleLine::new("sample", sample));
    }

    fn print_summary(&mut self, guid: &str, last: Option<&Sample>) -> anyhow::Result<()> {
        let line = JsonSummaryLine {
            kind: "summary",
            guid: guid.to_string(),
            last: last.map(|s| JsonSampleLine::new("sample", s)),
        };
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSampleLine {
    pub kind: &'static str,
    pub sample_type: String,
    pub system_time: String,
    pub wall_time_secs: f64,

    pub total: u64,
    pub total_errors: u64,
    pub total_workers: i64,

    pub average_ms: f64,
    pub total_time_ms: f64,
    pub last_result_ms: f64,
    pub worst_result_ms: f64,
    pub ninetyfifth_percentile_ms: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub commands: BTreeMap<String, JsonCommand>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCommand {
    pub count: u64,
    pub throughput: f64,
    pub average_ms: f64,
    pub total_time_ms: f64,
    pub last_time_ms: f64,
    pub worst_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub guid: String,
    pub last: Option<JsonSampleLine>,
}

fn ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

impl JsonSampleLine {
    fn new(kind: &'static str, s: &Sample) -> Self {
        let commands = s
            .commands
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    JsonCommand {
                        count: c.count,
                        throughput: c.throughput,
                        average_ms: ms(c.average),
                        total_time_ms: ms(c.total_time),
                        last_time_ms: ms(c.last_time),
                        worst_time_ms: ms(c.worst_time),
                    },
                )
            })
            .collect();

        Self {
            kind,
            sample_type: s.kind.to_string(),
            system_time: s.system_time.clone(),
            wall_time_secs: s.wall_time.as_secs_f64(),
            total: s.total,
            total_errors: s.total_errors,
            total_workers: s.total_workers,
            average_ms: ms(s.average),
            total_time_ms: ms(s.total_time),
            last_result_ms: ms(s.last_result),
            worst_result_ms: ms(s.worst_result),
            ninetyfifth_percentile_ms: ms(s.ninetyfifth_percentile),
            last_error: s.last_error.clone(),
            commands,
        }
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use stampede_core::{Command, SampleType};

    fn sample() -> Sample {
        let mut commands = BTreeMap::new();
        commands.insert(
            "dummy".to_string(),
            Command {
                count: 2,
                throughput: 4.0,
                average: Duration::from_millis(250),
                total_time: Duration::from_millis(500),
                last_time: Duration::from_millis(200),
                worst_time: Duration::from_millis(300),
            },
        );
        Sample {
            commands,
            average: Duration::from_millis(250),
            total_time: Duration::from_millis(500),
            system_time: "2026-01-01T00:00:00Z".to_string(),
            total: 2,
            total_errors: 0,
            total_workers: 1,
            last_result: Duration::from_millis(200),
            last_error: None,
            worst_result: Duration::from_millis(300),
            ninetyfifth_percentile: Duration::from_millis(300),
            wall_time: Duration::from_millis(1_500),
            kind: SampleType::Result,
        }
    }

    fn to_value<T: Serialize>(line: &T) -> Value {
        match serde_json::to_value(line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    #[test]
    fn sample_line_has_kind_and_type() {
        let v = to_value(&JsonSampleLine::new("sample", &sample()));

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("sample"));
        assert_eq!(v.get("sample_type").and_then(Value::as_str), Some("Result"));
        assert_eq!(v.get("total").and_then(Value::as_u64), Some(2));
        assert_eq!(v.get("wall_time_secs").and_then(Value::as_f64), Some(1.5));
        assert_eq!(
            v.pointer("/commands/dummy/worst_time_ms")
                .and_then(Value::as_f64),
            Some(300.0)
        );
        assert!(v.get("last_error").is_none());
    }

    #[test]
    fn summary_line_wraps_the_last_sample() {
        let s = sample();
        let line = JsonSummaryLine {
            kind: "summary",
            guid: "g-1".to_string(),
            last: Some(JsonSampleLine::new("sample", &s)),
        };
        let v = to_value(&line);

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("guid").and_then(Value::as_str), Some("g-1"));
        assert_eq!(
            v.pointer("/last/average_ms").and_then(Value::as_f64),
            Some(250.0)
        );
    }
}
