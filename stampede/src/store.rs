//! CSV persistence for result samples.
//!
//! Every run gets its own `<unix_nanos>-<guid>.csv` file with one row per result sample, plus a
//! row in the shared `csv.meta` index describing how the run was configured.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use csv::Writer;
use stampede_core::{Command, ExperimentConfiguration, Sample, SampleType, WorkloadRegistry};

const META_FILE: &str = "csv.meta";
const COMMAND_PREFIX: &str = "Commands|";

const SAMPLE_COLUMNS: [&str; 10] = [
    "Average",
    "TotalTime",
    "Total",
    "TotalErrors",
    "TotalWorkers",
    "LastResult",
    "WorstResult",
    "NinetyfifthPercentile",
    "WallTime",
    "Type",
];

const COMMAND_FIELDS: [&str; 6] = [
    "Count",
    "Throughput",
    "Average",
    "TotalTime",
    "LastTime",
    "WorstTime",
];

const META_COLUMNS: [&str; 8] = [
    "csv guid",
    "start time",
    "iterations",
    "concurrency",
    "concurrency step time",
    "stop",
    "interval",
    "workload",
];

#[derive(Debug, Clone)]
pub(crate) struct CsvStore {
    dir: PathBuf,
    commands: Vec<String>,
}

/// A run found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredRun {
    pub guid: String,
    pub path: PathBuf,
}

impl CsvStore {
    /// Column set is fixed from the registry at construction: one group per registered step.
    pub(crate) fn new(dir: impl Into<PathBuf>, registry: &WorkloadRegistry) -> Self {
        Self {
            dir: dir.into(),
            commands: registry.describe().map(|s| s.name().to_string()).collect(),
        }
    }

    /// Appends the run to `csv.meta` and creates its sample file.
    pub(crate) fn writer(
        &self,
        guid: &str,
        config: &ExperimentConfiguration,
    ) -> anyhow::Result<CsvWriter> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create csv directory {}", self.dir.display()))?;

        let started = SystemTime::now();
        self.write_meta(started, guid, config)?;

        let nanos = started
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let path = self.dir.join(format!("{nanos}-{guid}.csv"));
        let file =
            File::create(&path).with_context(|| format!("create csv file {}", path.display()))?;

        let mut writer = Writer::from_writer(file);
        writer.write_record(header(&self.commands))?;
        writer.flush()?;

        tracing::debug!(path = %path.display(), "csv store opened");
        Ok(CsvWriter {
            path,
            commands: self.commands.clone(),
            writer,
        })
    }

    fn write_meta(
        &self,
        started: SystemTime,
        guid: &str,
        config: &ExperimentConfiguration,
    ) -> anyhow::Result<()> {
        let path = self.dir.join(META_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        let empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = Writer::from_writer(file);
        if empty {
            writer.write_record(META_COLUMNS)?;
        }

        let concurrency = if config.concurrency.target > config.concurrency.start {
            format!("{}..{}", config.concurrency.start, config.concurrency.target)
        } else {
            config.concurrency.start.to_string()
        };

        writer.write_record([
            guid.to_string(),
            humantime::format_rfc3339_seconds(started).to_string(),
            config.iterations.to_string(),
            concurrency,
            humantime::format_duration(config.concurrency_step_time).to_string(),
            humantime::format_duration(config.stop).to_string(),
            humantime::format_duration(config.interval).to_string(),
            config.workload.clone(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

/// Sample files in `dir`, oldest first.
pub(crate) fn list_runs(dir: &Path) -> anyhow::Result<Vec<StoredRun>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("read csv directory {}", dir.display()))?;

    let mut runs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let guid = match stem.split_once('-') {
            Some((_, guid)) if !guid.is_empty() => guid.to_string(),
            _ => continue,
        };
        runs.push(StoredRun { guid, path });
    }
    runs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(runs)
}

/// Sample file of one run. Rows are flushed as they are written.
#[derive(Debug)]
pub(crate) struct CsvWriter {
    path: PathBuf,
    commands: Vec<String>,
    writer: Writer<File>,
}

impl CsvWriter {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Persists result samples; worker and heartbeat samples are skipped.
    pub(crate) fn write(&mut self, sample: &Sample) -> anyhow::Result<()> {
        if sample.kind != SampleType::Result {
            return Ok(());
        }

        let mut row = vec![
            nanos(sample.average),
            nanos(sample.total_time),
            sample.total.to_string(),
            sample.total_errors.to_string(),
            sample.total_workers.to_string(),
            nanos(sample.last_result),
            nanos(sample.worst_result),
            nanos(sample.ninetyfifth_percentile),
            nanos(sample.wall_time),
            sample.kind.to_string(),
        ];

        for name in &self.commands {
            match sample.commands.get(name).filter(|c| c.count > 0) {
                Some(c) => row.extend([
                    c.count.to_string(),
                    format!("{:.8}", c.throughput),
                    nanos(c.average),
                    nanos(c.total_time),
                    nanos(c.last_time),
                    nanos(c.worst_time),
                ]),
                None => row.extend(std::iter::repeat_n(String::new(), COMMAND_FIELDS.len())),
            }
        }

        self.writer.write_record(&row)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn header(commands: &[String]) -> Vec<String> {
    let mut header: Vec<String> = SAMPLE_COLUMNS.iter().map(|c| (*c).to_string()).collect();
    for name in commands {
        header.extend(
            COMMAND_FIELDS
                .iter()
                .map(|field| format!("{COMMAND_PREFIX}{name}|{field}")),
        );
    }
    header
}

fn nanos(d: Duration) -> String {
    d.as_nanos().to_string()
}

fn parse_nanos(s: &str) -> anyhow::Result<Duration> {
    let n: u64 = s
        .parse()
        .with_context(|| format!("invalid duration cell '{s}'"))?;
    Ok(Duration::from_nanos(n))
}

/// Reads a sample file back. Only result samples are ever stored, and the wall-clock time of
/// the sample is not part of the file.
pub(crate) fn load_samples(path: &Path) -> anyhow::Result<Vec<Sample>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;

    // command name -> field -> column index
    let mut columns: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for (idx, name) in reader.headers()?.iter().enumerate() {
        if let Some(rest) = name.strip_prefix(COMMAND_PREFIX)
            && let Some((command, field)) = rest.rsplit_once('|')
        {
            columns
                .entry(command.to_string())
                .or_default()
                .insert(field.to_string(), idx);
        }
    }

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |idx: usize| record.get(idx).unwrap_or_default();

        let mut commands = BTreeMap::new();
        for (name, fields) in &columns {
            let field = |f: &str| fields.get(f).map(|idx| cell(*idx)).unwrap_or_default();
            if field("Count").is_empty() {
                continue;
            }
            let command = Command {
                count: field("Count").parse()?,
                throughput: field("Throughput").parse()?,
                average: parse_nanos(field("Average"))?,
                total_time: parse_nanos(field("TotalTime"))?,
                last_time: parse_nanos(field("LastTime"))?,
                worst_time: parse_nanos(field("WorstTime"))?,
            };
            if command.count > 0 {
                commands.insert(name.clone(), command);
            }
        }

        samples.push(Sample {
            commands,
            average: parse_nanos(cell(0))?,
            total_time: parse_nanos(cell(1))?,
            system_time: String::new(),
            total: cell(2).parse()?,
            total_errors: cell(3).parse()?,
            total_workers: cell(4).parse()?,
            last_result: parse_nanos(cell(5))?,
            last_error: None,
            worst_result: parse_nanos(cell(6))?,
            ninetyfifth_percentile: parse_nanos(cell(7))?,
            wall_time: parse_nanos(cell(8))?,
            kind: SampleType::Result,
        });
    }
    Ok(samples)
}
