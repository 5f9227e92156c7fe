//! Command implementations for the GSP CLI.
//!
//! Provides subcommands that build, count, check and inspect GSP power
//! datasets from a directory of raw per-site exports.

use anyhow::Context;
use clap::{Args, Subcommand};
use gsp_core::config::{DuplicatePolicy, NegativeValuePolicy, PipelineConfig, Window, WindowBound};
use gsp_core::site::{CoordinateLookup, CoordinateTable, NoCoordinates};
use gsp_data::dedupe::DuplicateResolver;
use gsp_data::ingest::CsvIngestor;
use gsp_data::sanitize::sanitize;
use gsp_db::{read_dataset, DatasetBuilder, PersistOutcome};
use gsp_utils::dates::format_timestamp;
use log::{info, warn};
use std::path::{Path, PathBuf};

pub mod pipeline;

use pipeline::{for_each_file, list_csv_files, run_pipeline};

#[derive(Subcommand)]
pub enum Command {
    /// Normalize every export in a directory and persist one aligned dataset
    Build {
        /// Directory holding one `<site>.csv` export per site
        #[arg(short, long)]
        input: PathBuf,

        /// Dataset file to create; left untouched if it already exists
        #[arg(short, long)]
        output: PathBuf,

        /// Also write one single-site dataset per site into this directory
        #[arg(long)]
        per_site_dir: Option<PathBuf>,

        /// CSV of `site_id,latitude,longitude` rows
        #[arg(long)]
        coordinates: Option<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Count raw rows per site
    Count {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },

    /// Report negative readings and out-of-season duplicates without writing
    Check {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the shape and attributes of a persisted dataset as JSON
    Inspect {
        /// Dataset file written by `build`
        path: PathBuf,
    },
}

/// Configuration file plus per-field overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct Settings {
    /// TOML pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grid step, e.g. `10min`, `30min`, `1h`
    #[arg(long)]
    pub frequency: Option<String>,

    /// Explicit grid start
    #[arg(long)]
    pub start: Option<String>,

    /// Explicit grid end
    #[arg(long)]
    pub end: Option<String>,

    /// IANA timezone used to localize naive timestamps
    #[arg(long)]
    pub timezone: Option<String>,

    /// `local` or `utc`
    #[arg(long)]
    pub time_basis: Option<String>,

    #[arg(long, value_parser = ["report", "replace"])]
    pub negative_values: Option<String>,

    #[arg(long, value_parser = ["keep_first", "keep_last"])]
    pub duplicates: Option<String>,

    /// Leave out the final grid point
    #[arg(long)]
    pub drop_last_row: bool,

    /// Floor default grid bounds onto multiples of the step
    #[arg(long)]
    pub snap_to_step: bool,

    /// Month in which duplicate timestamps are expected
    #[arg(long)]
    pub dst_month: Option<u32>,

    #[arg(long)]
    pub description: Option<String>,

    /// Worker threads, 0 for one per core
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl Settings {
    /// Load the configuration file (or defaults) and apply the overrides.
    pub fn resolve(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(frequency) = &self.frequency {
            config.frequency = frequency.parse()?;
        }
        if self.start.is_some() || self.end.is_some() {
            config.window = Window::new(
                parse_bound(self.start.as_deref())
                    .context("invalid --start")?
                    .or(config.window.start),
                parse_bound(self.end.as_deref())
                    .context("invalid --end")?
                    .or(config.window.end),
            );
        }
        if let Some(timezone) = &self.timezone {
            config.timezone = timezone.parse()?;
        }
        if let Some(basis) = &self.time_basis {
            config.time_basis = basis.parse()?;
        }
        match self.negative_values.as_deref() {
            Some("report") => config.negative_values = NegativeValuePolicy::Report,
            Some("replace") => config.negative_values = NegativeValuePolicy::Replace,
            Some(other) => anyhow::bail!("unknown negative value policy '{}'", other),
            None => {}
        }
        match self.duplicates.as_deref() {
            Some("keep_first") => config.duplicates = DuplicatePolicy::KeepFirst,
            Some("keep_last") => config.duplicates = DuplicatePolicy::KeepLast,
            Some(other) => anyhow::bail!("unknown duplicate policy '{}'", other),
            None => {}
        }
        config.drop_last_row |= self.drop_last_row;
        config.snap_to_step |= self.snap_to_step;
        if let Some(month) = self.dst_month {
            config.dst_month = month;
        }
        if let Some(description) = &self.description {
            config.description = description.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }

        config.validate()?;
        Ok(config)
    }
}

// Resolved against the time basis only once every override is applied.
fn parse_bound(raw: Option<&str>) -> anyhow::Result<Option<WindowBound>> {
    raw.map(str::parse::<WindowBound>)
        .transpose()
        .map_err(anyhow::Error::from)
}

pub fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Build {
            input,
            output,
            per_site_dir,
            coordinates,
            settings,
        } => run_build(
            &input,
            &output,
            per_site_dir.as_deref(),
            coordinates.as_deref(),
            &settings.resolve()?,
        ),
        Command::Count { input, settings } => run_count(&input, &settings.resolve()?),
        Command::Check { input, settings } => run_check(&input, &settings.resolve()?),
        Command::Inspect { path } => run_inspect(&path),
    }
}

/// Run the pipeline over `input` and persist the aligned dataset at `output`.
pub fn run_build(
    input: &Path,
    output: &Path,
    per_site_dir: Option<&Path>,
    coordinates: Option<&Path>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let table = coordinates
        .map(|path| {
            CoordinateTable::from_path(path)
                .with_context(|| format!("Failed to load coordinates from {}", path.display()))
        })
        .transpose()?;
    let lookup: &dyn CoordinateLookup = match &table {
        Some(table) => table,
        None => &NoCoordinates,
    };

    let summary = run_pipeline(input, config)?;
    for failure in &summary.failures {
        warn!(
            "{} [{}] {}",
            failure.site_id,
            failure.error.kind(),
            failure.error
        );
    }
    if summary.dataset.is_empty() {
        warn!("No site produced data; writing an empty dataset");
    }

    let builder = DatasetBuilder::new(config).with_lookup(lookup);
    let array = builder.build_multi(&summary.dataset);
    let outcome = builder
        .persist(&array, output)
        .with_context(|| format!("Failed to persist {}", output.display()))?;
    report_outcome(output, outcome);

    if let Some(dir) = per_site_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        for series in &summary.normalized {
            let dest = dir.join(format!("{}.sqlite", series.site_id()));
            let outcome = builder
                .persist(&builder.build_single(series), &dest)
                .with_context(|| format!("Failed to persist {}", dest.display()))?;
            report_outcome(&dest, outcome);
        }
    }

    println!(
        "{} sites, {} timestamps, {} failed, {} diagnostics",
        summary.dataset.sites().len(),
        summary.dataset.timestamps().len(),
        summary.failures.len(),
        summary.diagnostics.len()
    );
    Ok(())
}

fn report_outcome(path: &Path, outcome: PersistOutcome) {
    match outcome {
        PersistOutcome::Written => info!("Wrote {}", path.display()),
        PersistOutcome::Skipped => info!("{} already exists, skipped", path.display()),
    }
}

/// Raw row count per site, in file-name order.
pub fn count_rows(input: &Path, config: &PipelineConfig) -> anyhow::Result<Vec<(String, usize)>> {
    let files = list_csv_files(input)
        .with_context(|| format!("Failed to list {}", input.display()))?;
    let ingestor = CsvIngestor::new(config);
    let results = for_each_file(&files, config.workers, |path| ingestor.ingest_path(path))?;

    let mut counts = Vec::with_capacity(results.len());
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok((series, stats)) => counts.push((series.site_id, stats.rows)),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(counts)
}

pub fn run_count(input: &Path, config: &PipelineConfig) -> anyhow::Result<()> {
    for (site_id, rows) in count_rows(input, config)? {
        println!("{}\t{}", site_id, rows);
    }
    Ok(())
}

/// Negative readings and anomalous duplicates found in one site.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub site_id: String,
    pub negatives: Vec<chrono::NaiveDateTime>,
    pub anomalous_years: Vec<i32>,
    pub duplicates: usize,
}

pub fn check_sites(input: &Path, config: &PipelineConfig) -> anyhow::Result<Vec<CheckReport>> {
    let files = list_csv_files(input)
        .with_context(|| format!("Failed to list {}", input.display()))?;
    let ingestor = CsvIngestor::new(config);
    let resolver = DuplicateResolver::from_config(config);
    let results = for_each_file(&files, config.workers, |path| {
        ingestor.ingest_path(path).map(|(series, _)| {
            let sanitized = sanitize(series, NegativeValuePolicy::Report);
            let negatives = sanitized.negatives().to_vec();
            let deduplicated = resolver.resolve(sanitized.into_series());
            CheckReport {
                site_id: deduplicated.series.site_id,
                negatives,
                anomalous_years: deduplicated.anomalies.iter().map(|a| a.year).collect(),
                duplicates: deduplicated.duplicates_removed,
            }
        })
    })?;

    let mut reports = Vec::with_capacity(results.len());
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    Ok(reports)
}

pub fn run_check(input: &Path, config: &PipelineConfig) -> anyhow::Result<()> {
    for report in check_sites(input, config)? {
        let first_negative = report
            .negatives
            .first()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\tnegatives={} (first {})\tduplicates={}\tanomalous_years={:?}",
            report.site_id,
            report.negatives.len(),
            first_negative,
            report.duplicates,
            report.anomalous_years
        );
    }
    Ok(())
}

pub fn run_inspect(path: &Path) -> anyhow::Result<()> {
    let array = read_dataset(path).with_context(|| format!("Failed to read {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&array.summary())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsp_core::config::TimeBasis;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gsp-cmd-lib-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn exports(dir: &Path) {
        fs::write(
            dir.join("bolney.csv"),
            "time,bolney\n\
             2021-10-31 00:00:00,5\n\
             2021-10-31 00:10:00,-3\n\
             2021-10-31 00:30:00,7\n",
        )
        .unwrap();
        fs::write(
            dir.join("ninfield.csv"),
            "time,ninfield\n\
             2021-03-28 00:00:00,1\n\
             2021-03-28 00:00:00,2\n\
             2021-03-28 00:10:00,3\n",
        )
        .unwrap();
    }

    #[test]
    fn settings_override_config() {
        let settings = Settings {
            frequency: Some("30min".to_string()),
            start: Some("2021-10-30".to_string()),
            time_basis: Some("utc".to_string()),
            negative_values: Some("report".to_string()),
            duplicates: Some("keep_first".to_string()),
            drop_last_row: true,
            workers: Some(3),
            ..Settings::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.frequency.to_string(), "30min");
        let (start, end) = config.window_bounds();
        // midnight BST on 2021-10-30
        assert_eq!(
            start.map(|ts| format_timestamp(&ts)),
            Some("2021-10-29T23:00:00".to_string())
        );
        assert_eq!(end, None);
        assert_eq!(config.time_basis, TimeBasis::Utc);
        assert_eq!(config.negative_values, NegativeValuePolicy::Report);
        assert_eq!(config.duplicates, DuplicatePolicy::KeepFirst);
        assert!(config.drop_last_row);
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn settings_bounds_use_final_time_basis() {
        let settings = Settings {
            start: Some("2021-07-01T00:00:00+01:00".to_string()),
            end: Some("2021-07-01 12:00".to_string()),
            ..Settings::default()
        };
        let local = settings.resolve().unwrap().window_bounds();
        assert_eq!(
            local.0.map(|ts| format_timestamp(&ts)),
            Some("2021-07-01T00:00:00".to_string())
        );

        let utc = Settings {
            time_basis: Some("utc".to_string()),
            ..settings
        }
        .resolve()
        .unwrap()
        .window_bounds();
        assert_eq!(
            utc.0.map(|ts| format_timestamp(&ts)),
            Some("2021-06-30T23:00:00".to_string())
        );
        assert_eq!(
            utc.1.map(|ts| format_timestamp(&ts)),
            Some("2021-07-01T11:00:00".to_string())
        );
    }

    #[test]
    fn settings_read_toml_then_override() {
        let dir = scratch_dir("settings");
        let path = dir.join("gsp.toml");
        fs::write(&path, "frequency = \"1h\"\ndst_month = 3\n").unwrap();
        let settings = Settings {
            config: Some(path),
            dst_month: Some(10),
            ..Settings::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.frequency.to_string(), "1h");
        assert_eq!(config.dst_month, 10);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn settings_reject_invalid_values() {
        let bad_window = Settings {
            start: Some("2022-01-02".to_string()),
            end: Some("2022-01-01".to_string()),
            ..Settings::default()
        };
        assert!(bad_window.resolve().is_err());

        let bad_zone = Settings {
            timezone: Some("Mars/Olympus".to_string()),
            ..Settings::default()
        };
        assert!(bad_zone.resolve().is_err());
    }

    #[test]
    fn count_and_check_report_per_site() {
        let dir = scratch_dir("count");
        exports(&dir);
        let config = PipelineConfig::default();

        let counts = count_rows(&dir, &config).unwrap();
        assert_eq!(
            counts,
            vec![("bolney".to_string(), 3), ("ninfield".to_string(), 3)]
        );

        let reports = check_sites(&dir, &config).unwrap();
        assert_eq!(reports[0].negatives.len(), 1);
        assert!(reports[0].anomalous_years.is_empty());
        assert_eq!(reports[1].duplicates, 1);
        assert_eq!(reports[1].anomalous_years, vec![2021]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn build_writes_once_and_inspects() {
        let dir = scratch_dir("build");
        let input = dir.join("raw");
        fs::create_dir_all(&input).unwrap();
        exports(&input);
        fs::write(
            dir.join("coords.csv"),
            "site_id,latitude,longitude\nbolney,50.99,-0.21\nninfield,,\n",
        )
        .unwrap();
        let output = dir.join("gsp.sqlite");
        let per_site = dir.join("sites");
        let config = PipelineConfig::default();

        let coords = dir.join("coords.csv");
        run_build(
            &input,
            &output,
            Some(per_site.as_path()),
            Some(coords.as_path()),
            &config,
        )
        .unwrap();
        let array = read_dataset(&output).unwrap();
        assert_eq!(array.dim("gsp_id").unwrap().labels, vec!["bolney", "ninfield"]);
        assert_eq!(array.site_coordinates.len(), 1);
        assert!(per_site.join("bolney.sqlite").is_file());
        assert!(per_site.join("ninfield.sqlite").is_file());

        let before = fs::read(&output).unwrap();
        run_build(&input, &output, None, None, &config).unwrap();
        assert_eq!(fs::read(&output).unwrap(), before);

        run_inspect(&output).unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }
}
