//! Per-site processing over a directory of raw exports.
//!
//! Every file goes through ingest, sanitize, dedupe and interpolation on its
//! own, on a rayon pool. A failing file is recorded and skipped; the others
//! carry on. Alignment runs once all sites are done.

use gsp_core::config::PipelineConfig;
use gsp_core::dataset::MultiSiteDataset;
use gsp_core::diagnostic::{Diagnostic, Diagnostics};
use gsp_core::error::SiteError;
use gsp_core::series::NormalizedSiteSeries;
use gsp_data::align::align;
use gsp_data::dedupe::DuplicateResolver;
use gsp_data::ingest::{site_id_from_path, CsvIngestor, IngestStats};
use gsp_data::interpolation::{Interpolated, TimeGridInterpolator};
use gsp_data::sanitize::{sanitize, Sanitized};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Per-site numbers for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteReport {
    pub site_id: String,
    pub ingest: IngestStats,
    pub negatives_replaced: usize,
    pub duplicates_removed: usize,
    /// Grid points produced, zero when the site had no data
    pub grid_points: usize,
}

/// A file that was knocked out of the run.
#[derive(Debug)]
pub struct SiteFailure {
    pub path: PathBuf,
    pub site_id: String,
    pub error: SiteError,
}

/// One site after the per-site chain.
#[derive(Debug)]
pub struct ProcessedSite {
    pub report: SiteReport,
    /// `None` when the site had nothing on its grid
    pub series: Option<NormalizedSiteSeries>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub dataset: MultiSiteDataset,
    pub normalized: Vec<NormalizedSiteSeries>,
    pub sites: Vec<SiteReport>,
    pub failures: Vec<SiteFailure>,
    pub diagnostics: Diagnostics,
}

/// `*.csv` files in `dir` (extension matched case-insensitively), sorted by
/// file name.
pub fn list_csv_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Run one file through ingest, sanitize, dedupe and interpolation.
pub fn process_site(path: &Path, config: &PipelineConfig) -> Result<ProcessedSite, SiteError> {
    let (series, ingest) = CsvIngestor::new(config).ingest_path(path)?;

    let (series, negatives_replaced) = match sanitize(series, config.negative_values) {
        Sanitized::Unchanged(series) => (series, 0),
        Sanitized::Replaced { series, replaced } => (series, replaced.len()),
        Sanitized::Reported { series, offending } => {
            return Err(SiteError::NegativeValues {
                site_id: series.site_id,
                offending,
            })
        }
    };

    let deduplicated = DuplicateResolver::from_config(config).resolve(series);
    let mut diagnostics: Vec<Diagnostic> = deduplicated
        .anomalies
        .into_iter()
        .map(Diagnostic::DuplicateAnomaly)
        .collect();

    let site_id = deduplicated.series.site_id.clone();
    let (series, grid_points) =
        match TimeGridInterpolator::from_config(config).interpolate(&deduplicated.series) {
            Interpolated::Series(series) => {
                let len = series.len();
                (Some(series), len)
            }
            Interpolated::NoData { site_id } => {
                diagnostics.push(Diagnostic::AlignmentGapWarning { site_id });
                (None, 0)
            }
        };

    Ok(ProcessedSite {
        report: SiteReport {
            site_id,
            ingest,
            negatives_replaced,
            duplicates_removed: deduplicated.duplicates_removed,
            grid_points,
        },
        series,
        diagnostics,
    })
}

/// Run `f` over `files` on a pool of `workers` threads (0 = rayon default),
/// keeping input order.
pub fn for_each_file<T, F>(files: &[PathBuf], workers: usize, f: F) -> anyhow::Result<Vec<T>>
where
    T: Send,
    F: Fn(&Path) -> T + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;
    debug!(
        "pipeline: {} files on {} threads",
        files.len(),
        pool.current_num_threads()
    );
    Ok(pool.install(|| files.par_iter().map(|path| f(path.as_path())).collect()))
}

/// Process every `*.csv` in `dir` and align the survivors.
///
/// Only configuration problems and an unreadable directory fail the run;
/// per-file problems end up in [`RunSummary::failures`].
pub fn run_pipeline(dir: &Path, config: &PipelineConfig) -> anyhow::Result<RunSummary> {
    config.validate()?;
    let files = list_csv_files(dir)?;
    info!("pipeline: {} csv files in {}", files.len(), dir.display());

    let results = for_each_file(&files, config.workers, |path| process_site(path, config))?;

    let mut normalized = Vec::new();
    let mut sites = Vec::new();
    let mut failures = Vec::new();
    let mut diagnostics = Diagnostics::new();
    for (path, result) in files.into_iter().zip(results) {
        match result {
            Ok(processed) => {
                diagnostics.extend(processed.diagnostics);
                normalized.extend(processed.series);
                sites.push(processed.report);
            }
            Err(error) => {
                warn!("pipeline: skipping {}: {}", path.display(), error);
                failures.push(SiteFailure {
                    site_id: site_id_from_path(&path),
                    path,
                    error,
                });
            }
        }
    }

    let aligned = align(normalized.clone(), config.frequency)?;
    diagnostics.extend(aligned.diagnostics);
    diagnostics.log();

    info!(
        "pipeline: {} sites aligned over {} timestamps, {} failed, {} diagnostics",
        aligned.dataset.sites().len(),
        aligned.dataset.timestamps().len(),
        failures.len(),
        diagnostics.len()
    );
    Ok(RunSummary {
        dataset: aligned.dataset,
        normalized,
        sites,
        failures,
        diagnostics,
    })
}
