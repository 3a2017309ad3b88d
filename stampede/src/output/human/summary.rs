use std::fmt::Write as _;

use stampede_core::Sample;

use super::format::{format_duration, format_rate};

pub(crate) fn render(guid: &str, last: Option<&Sample>) -> String {
    let mut out = String::new();

    let Some(s) = last else {
        writeln!(&mut out, "experiment {guid}: no samples").ok();
        return out;
    };

    writeln!(&mut out, "experiment {guid}").ok();
    writeln!(&mut out, "  iterations: {} (failed {})", s.total, s.total_errors).ok();
    writeln!(&mut out, "  workers: {}", s.total_workers).ok();
    writeln!(&mut out, "  wall time: {}", format_duration(s.wall_time)).ok();
    writeln!(
        &mut out,
        "  latency = latest={} worst={} average={} p95={}",
        format_duration(s.last_result),
        format_duration(s.worst_result),
        format_duration(s.average),
        format_duration(s.ninetyfifth_percentile),
    )
    .ok();

    if !s.commands.is_empty() {
        out.push_str("\ncommands\n");
        let width = s.commands.keys().map(String::len).max().unwrap_or(0);
        for (name, c) in &s.commands {
            writeln!(
                &mut out,
                "  {name:<width$}  count={} throughput={}/s average={} last={} worst={} total={}",
                c.count,
                format_rate(c.throughput),
                format_duration(c.average),
                format_duration(c.last_time),
                format_duration(c.worst_time),
                format_duration(c.total_time),
            )
            .ok();
        }
    }

    if s.total_errors > 0 {
        out.push_str("\nerrors\n");
        writeln!(&mut out, "  total: {}", s.total_errors).ok();
        if let Some(err) = &s.last_error {
            writeln!(&mut out, "  last: {err}").ok();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::{Command, SampleType};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn sample(total_errors: u64) -> Sample {
        let mut commands = BTreeMap::new();
        commands.insert(
            "dummy".to_string(),
            Command {
                count: 4,
                throughput: 2.0,
                average: Duration::from_millis(500),
                total_time: Duration::from_secs(2),
                last_time: Duration::from_millis(400),
                worst_time: Duration::from_millis(700),
            },
        );
        Sample {
            commands,
            average: Duration::from_millis(500),
            total_time: Duration::from_secs(2),
            system_time: String::new(),
            total: 4,
            total_errors,
            total_workers: 0,
            last_result: Duration::from_millis(400),
            last_error: (total_errors > 0).then(|| "step `dummy` failed: nope".to_string()),
            worst_result: Duration::from_millis(700),
            ninetyfifth_percentile: Duration::from_millis(700),
            wall_time: Duration::from_secs(3),
            kind: SampleType::Heartbeat,
        }
    }

    #[test]
    fn render_includes_totals_latency_and_commands() {
        let out = render("g-1", Some(&sample(0)));

        assert!(out.contains("experiment g-1"));
        assert!(out.contains("iterations: 4 (failed 0)"));
        assert!(out.contains("wall time: 3.00s"));
        assert!(out.contains("worst=700.00ms"));
        assert!(out.contains("p95=700.00ms"));
        assert!(out.contains("dummy  count=4 throughput=2.00/s"));
        assert!(!out.contains("errors"));
    }

    #[test]
    fn render_lists_the_last_error() {
        let out = render("g-1", Some(&sample(2)));
        assert!(out.contains("iterations: 4 (failed 2)"));
        assert!(out.contains("last: step `dummy` failed: nope"));
    }

    #[test]
    fn render_without_samples() {
        assert_eq!(render("g-1", None), "experiment g-1: no samples\n");
    }
}
