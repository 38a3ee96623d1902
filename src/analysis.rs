use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::canonical::canonicalize;
use crate::classify::classify;
use crate::packet::PacketVars;
use crate::{
    AnalysisConfig, AnalysisError, CanonicalGroup, FilterSelection, Network, ReachabilityReport,
    ReachabilityRow, UnreachableLine,
};

/// Find every filter line in the selection that can never match.
///
/// Rows come out in a fixed order: one row per reference cycle (devices in
/// name order), then the unreachable lines of each canonical filter in
/// first-seen order, each in line order. The order does not depend on
/// [`AnalysisConfig::parallel`].
///
/// # Errors
///
/// Returns [`AnalysisError::NoFiltersMatched`] if the selection names no
/// existing filter.
///
/// # Example
///
/// ```
/// use aclreach::{analyze, AnalysisConfig, FilterSelection, Network, Reason};
///
/// let network = Network::from_dsl(r#"
///     device r1 {
///         filter acl {
///             permit any
///             deny dst 10.0.0.0/8
///         }
///     }
/// "#).unwrap();
/// let report = analyze(&network, &FilterSelection::All, &AnalysisConfig::default()).unwrap();
/// assert_eq!(report.rows().len(), 1);
/// assert_eq!(report.rows()[0].reason(), Reason::BlockingLines);
/// ```
pub fn analyze(
    network: &Network,
    selection: &FilterSelection,
    config: &AnalysisConfig,
) -> Result<ReachabilityReport, AnalysisError> {
    let start = Instant::now();
    let selected = selection.resolve(network, config.ignore_composites)?;
    let (groups, cycles) = canonicalize(network, &selected);

    let vars = PacketVars::for_groups(&groups);

    let findings: Vec<Vec<(usize, UnreachableLine)>> = if config.parallel {
        groups
            .par_iter()
            .map(|g| classify(g.filter(), &vars))
            .collect::<Result<_, AnalysisError>>()?
    } else {
        groups
            .iter()
            .map(|g| classify(g.filter(), &vars))
            .collect::<Result<_, AnalysisError>>()?
    };

    let mut rows: Vec<ReachabilityRow> = cycles
        .iter()
        .map(|c| ReachabilityRow::cycle(&c.device, &c.filters))
        .collect();
    for (group, lines) in groups.iter().zip(findings) {
        let sources: Vec<String> = group.sources().iter().map(ToString::to_string).collect();
        for (index, finding) in &lines {
            rows.push(ReachabilityRow::line(
                sources.clone(),
                group.filter().original(),
                *index,
                finding,
            ));
        }
    }

    let report = ReachabilityReport::new(rows, groups.len(), start.elapsed());
    info!(
        devices = selected.len(),
        canonical_filters = groups.len(),
        cycles = cycles.len(),
        findings = report.rows().len(),
        duration_us = report.duration().as_micros() as u64,
        "filter line reachability analysis complete"
    );
    Ok(report)
}

/// Resolve the selection and return its canonical filters without
/// classifying them.
///
/// # Errors
///
/// Returns [`AnalysisError::NoFiltersMatched`] if the selection names no
/// existing filter.
pub fn canonical_filters(
    network: &Network,
    selection: &FilterSelection,
    config: &AnalysisConfig,
) -> Result<Vec<CanonicalGroup>, AnalysisError> {
    let selected = selection.resolve(network, config.ignore_composites)?;
    Ok(canonicalize(network, &selected).0)
}
