use chrono::NaiveDateTime;
use gsp_core::dataset::MultiSiteDataset;
use gsp_core::diagnostic::Diagnostic;
use gsp_core::error::DatasetError;
use gsp_core::grid::Frequency;
use gsp_core::series::NormalizedSiteSeries;
use std::collections::{BTreeSet, HashSet};

/// Aligned table plus anything worth reporting about its inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    pub dataset: MultiSiteDataset,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outer-join normalized series on their timestamps, one column per site.
///
/// Grids stepping at anything other than `frequency` are still joined but
/// reported as `FrequencyMismatch`. A site id seen a second time is skipped
/// and reported as `DuplicateSite`.
pub fn align(
    series: Vec<NormalizedSiteSeries>,
    frequency: Frequency,
) -> Result<Aligned, DatasetError> {
    let mut diagnostics = Vec::new();
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(series.len());

    for s in series {
        if !seen.insert(s.site_id().to_string()) {
            diagnostics.push(Diagnostic::DuplicateSite {
                site_id: s.site_id().to_string(),
            });
            continue;
        }
        let step = s.grid().step();
        if step != frequency {
            diagnostics.push(Diagnostic::FrequencyMismatch {
                site_id: s.site_id().to_string(),
                expected: frequency,
                found: step,
            });
        }
        inputs.push(s);
    }

    let Some(first) = inputs.first() else {
        return Ok(Aligned {
            dataset: MultiSiteDataset::empty(frequency),
            diagnostics,
        });
    };

    let sites: Vec<String> = inputs.iter().map(|s| s.site_id().to_string()).collect();
    let shared_grid = *first.grid();
    let dataset = if inputs.iter().all(|s| *s.grid() == shared_grid) {
        log::debug!("align: {} sites share one grid", inputs.len());
        let columns = inputs.into_iter().map(|s| s.into_values()).collect();
        MultiSiteDataset::try_new(shared_grid.timestamps(), sites, columns, frequency)?
    } else {
        let axis: Vec<NaiveDateTime> = inputs
            .iter()
            .flat_map(|s| s.grid().iter())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        log::debug!(
            "align: joining {} sites onto {} timestamps",
            inputs.len(),
            axis.len()
        );
        let columns = inputs
            .iter()
            .map(|s| column_on_axis(s, &axis))
            .collect();
        MultiSiteDataset::try_new(axis, sites, columns, frequency)?
    };

    Ok(Aligned {
        dataset,
        diagnostics,
    })
}

fn column_on_axis(series: &NormalizedSiteSeries, axis: &[NaiveDateTime]) -> Vec<Option<f64>> {
    axis.iter().map(|ts| series.get(*ts)).collect()
}
