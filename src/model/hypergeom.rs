//! # Hypergeometric Enrichment
//!
//! ## Role
//! Find entities over-represented among the significantly changed pairs of a
//! z-test run.
//!
//! ## Procedure
//! 1. A pair is *reported* when its adjusted p-value is below the threshold
//!    and, for one-sided alternatives, its statistic has the matching sign
//!    (`less → stat < 0`, `greater → stat > 0`). Undefined p-values never
//!    report.
//! 2. Occurrences are counted per entity over reported pairs (`Diff`) and over
//!    all pairs (`Total`). Oriented counting uses sources only; unoriented
//!    counting uses both endpoints.
//! 3. `p = P(X >= Diff)` for `X ~ Hypergeom(all occurrences, reported
//!    occurrences, Total)`, then adjusted across the reported entities.
//!
//! Rows come back sorted by adjusted p-value, raw p-value, then descending
//! proportion.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info_span};

use crate::data::ids::EntityIdx;
use crate::data::pairs::PairSet;
use crate::error::{DiffCorrError, Result};
use crate::model::adjust::{adjust_pvalues, fdr_order};
use crate::model::ztest::Alternative;

pub const DEFAULT_FDR_THRESHOLD: f32 = 0.05;

/// Enrichment parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnrichmentSettings {
    pub alternative: Alternative,
    /// Count sources only (directed networks) instead of both endpoints
    pub oriented: bool,
    pub fdr_threshold: f32,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            alternative: Alternative::TwoSided,
            oriented: true,
            fdr_threshold: DEFAULT_FDR_THRESHOLD,
        }
    }
}

/// One enriched entity
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichmentRow {
    pub entity: EntityIdx,
    /// Reported pairs touching the entity
    pub diff: usize,
    /// All pairs touching the entity
    pub total: usize,
    pub proportion: f32,
    pub pvalue: f32,
    pub adjusted: f32,
}

#[inline]
fn ln_choose(n: u64, k: u64) -> f64 {
    libm::lgamma(n as f64 + 1.0) - libm::lgamma(k as f64 + 1.0) - libm::lgamma((n - k) as f64 + 1.0)
}

/// Survival function `P(X >= k)` of `X ~ Hypergeom(population, successes, draws)`.
///
/// Requires `successes <= population` and `draws <= population`.
pub fn hypergeom_sf(k: u64, population: u64, successes: u64, draws: u64) -> f64 {
    debug_assert!(successes <= population && draws <= population);
    let failures = population.saturating_sub(successes);
    let low = draws.saturating_sub(failures);
    let high = successes.min(draws);
    let start = k.max(low);
    if start > high {
        return 0.0;
    }

    let denom = ln_choose(population, draws);
    let total: f64 = (start..=high)
        .map(|x| (ln_choose(successes, x) + ln_choose(failures, draws - x) - denom).exp())
        .sum();
    total.min(1.0)
}

/// Occurrence counts in first-seen order
#[derive(Default)]
struct Occurrence {
    order: Vec<usize>,
    counts: HashMap<usize, usize>,
    sum: usize,
}

impl Occurrence {
    fn add(&mut self, entity: usize) {
        let count = self.counts.entry(entity).or_insert(0);
        if *count == 0 {
            self.order.push(entity);
        }
        *count += 1;
        self.sum += 1;
    }

    fn add_pair(&mut self, (source, target): (usize, usize), oriented: bool) {
        self.add(source);
        if !oriented {
            self.add(target);
        }
    }

    fn get(&self, entity: usize) -> usize {
        self.counts.get(&entity).copied().unwrap_or(0)
    }
}

fn reports(statistic: f32, adjusted: f32, settings: &EnrichmentSettings) -> bool {
    if adjusted < 0.0 || adjusted >= settings.fdr_threshold {
        return false;
    }
    match settings.alternative {
        Alternative::Less => statistic < 0.0,
        Alternative::Greater => statistic > 0.0,
        Alternative::TwoSided => true,
    }
}

/// Enrichment of every entity touched by a reported pair.
///
/// `statistic` and `pvalue` are the per-pair z-test outputs in `pairs` order.
pub fn enrichment(
    pairs: &PairSet,
    statistic: &[f32],
    pvalue: &[f32],
    settings: EnrichmentSettings,
) -> Result<Vec<EnrichmentRow>> {
    if statistic.len() != pairs.len() || pvalue.len() != pairs.len() {
        return Err(DiffCorrError::config(format!(
            "{} pairs but {} statistics and {} p-values",
            pairs.len(),
            statistic.len(),
            pvalue.len()
        )));
    }
    let _span = info_span!("enrichment", pairs = pairs.len()).entered();

    let (adjusted, order) = fdr_order(pvalue);
    let mut initial = Occurrence::default();
    let mut reported = Occurrence::default();
    for k in order {
        let pair = pairs.pair(k);
        initial.add_pair(pair, settings.oriented);
        if reports(statistic[k], adjusted[k], &settings) {
            reported.add_pair(pair, settings.oriented);
        }
    }
    debug!(
        reported = reported.sum,
        total = initial.sum,
        entities = reported.order.len(),
        "occurrences counted"
    );

    let mut rows: Vec<EnrichmentRow> = reported
        .order
        .iter()
        .map(|&entity| {
            let diff = reported.get(entity);
            let total = initial.get(entity);
            let pvalue = hypergeom_sf(diff as u64, initial.sum as u64, reported.sum as u64, total as u64);
            EnrichmentRow {
                entity: EntityIdx::from(entity),
                diff,
                total,
                proportion: diff as f32 / total as f32,
                pvalue: pvalue as f32,
                adjusted: 0.0,
            }
        })
        .collect();

    let row_pvalues: Vec<f32> = rows.iter().map(|r| r.pvalue).collect();
    for (row, adj) in rows.iter_mut().zip(adjust_pvalues(&row_pvalues)) {
        row.adjusted = adj;
    }
    rows.sort_by(|a, b| {
        a.adjusted
            .total_cmp(&b.adjusted)
            .then(a.pvalue.total_cmp(&b.pvalue))
            .then(b.proportion.total_cmp(&a.proportion))
    });
    Ok(rows)
}
