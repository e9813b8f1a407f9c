//! # Fisher Z-Test
//!
//! ## Role
//! Compare two correlation coefficients measured on independent sample sets.
//!
//! ## Formulae
//! - Clamp both coefficients to `[-0.99, 0.99]`.
//! - `stat = atanh(r_ref) - atanh(r_exp)`
//! - `se = 1 / sqrt(n - 3)` per side, times `sqrt(1.5)` for rank-based measures.
//! - `std = sqrt(se_ref² + se_exp²)`
//! - p-value: `less → Φ(stat/std)`, `greater → 1 - Φ(stat/std)`,
//!   `two-sided → 2Φ(-|stat|/std)`.
//!
//! A subset of exactly three samples has an infinite standard error, so its
//! statistic is never significant (`p = 1` two-sided). Fewer than three
//! samples, or an unresolved alternative, give [`UNDEFINED_TEST_VALUE`] as the
//! p-value. The statistic itself is always written.
//!
//! ## Single-coefficient test
//! [`correlation_pvalue`] tests one side's coefficient against zero:
//! `z = atanh(r)·sqrt(n - 3)`, or `atanh(r)·sqrt((n - 3) / (1 + r²/2))` for
//! rank-based measures.

use std::ops::Range;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info_span;

use crate::error::{DiffCorrError, Result};
use crate::model::correlation::{Correlation, UNDEFINED_CORRELATION};
use crate::utils::threading::{split_by_ranges, BatchExecutor};

/// Marks an undefined test p-value
pub const UNDEFINED_TEST_VALUE: f32 = -2.0;

const LEFT_CORR_BOUND: f32 = -0.99;
const RIGHT_CORR_BOUND: f32 = 0.99;

/// Alternative hypothesis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    Less,
    Greater,
    #[default]
    TwoSided,
}

impl Alternative {
    pub fn as_str(self) -> &'static str {
        match self {
            Alternative::Less => "less",
            Alternative::Greater => "greater",
            Alternative::TwoSided => "two-sided",
        }
    }

    /// Tolerant lookup; unknown names resolve to `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "less" => Some(Alternative::Less),
            "greater" => Some(Alternative::Greater),
            "two-sided" | "two_sided" => Some(Alternative::TwoSided),
            _ => None,
        }
    }
}

impl FromStr for Alternative {
    type Err = DiffCorrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| DiffCorrError::config(format!("unknown alternative '{}'", s)))
    }
}

impl std::fmt::Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard normal CDF
#[inline]
pub fn norm_cdf(x: f32) -> f32 {
    libm::erfcf(-x / std::f32::consts::SQRT_2) / 2.0
}

/// Fisher z difference of two clamped coefficients
#[inline]
pub fn fisher_stat(r_ref: f32, r_exp: f32) -> f32 {
    let r_ref = r_ref.clamp(LEFT_CORR_BOUND, RIGHT_CORR_BOUND);
    let r_exp = r_exp.clamp(LEFT_CORR_BOUND, RIGHT_CORR_BOUND);
    r_ref.atanh() - r_exp.atanh()
}

/// Standard error of one side's z-transformed coefficient
#[inline]
pub fn standard_error(size: usize, method: Correlation) -> f32 {
    let se = 1.0 / (size as f32 - 3.0).sqrt();
    if method.is_rank_based() {
        se * 1.5f32.sqrt()
    } else {
        se
    }
}

/// p-value of `stat` under `alternative`
#[inline]
pub fn pvalue(stat: f32, std: f32, alternative: Option<Alternative>) -> f32 {
    if std.is_nan() {
        return UNDEFINED_TEST_VALUE;
    }
    match alternative {
        Some(Alternative::Less) => norm_cdf(stat / std),
        Some(Alternative::Greater) => 1.0 - norm_cdf(stat / std),
        Some(Alternative::TwoSided) => 2.0 * norm_cdf(-stat.abs() / std),
        None => UNDEFINED_TEST_VALUE,
    }
}

/// One test: `(statistic, p-value)`.
pub fn ztest_pair(
    r_ref: f32,
    n_ref: usize,
    r_exp: f32,
    n_exp: usize,
    method: Correlation,
    alternative: Option<Alternative>,
) -> (f32, f32) {
    let stat = fisher_stat(r_ref, r_exp);
    let se_ref = standard_error(n_ref, method);
    let se_exp = standard_error(n_exp, method);
    let std = (se_ref * se_ref + se_exp * se_exp).sqrt();
    (stat, pvalue(stat, std, alternative))
}

/// p-value of a single coefficient measured on `size` samples, against zero.
pub fn correlation_pvalue(r: f32, size: usize, method: Correlation, alternative: Alternative) -> f32 {
    if r == UNDEFINED_CORRELATION || size < 3 {
        return UNDEFINED_TEST_VALUE;
    }
    let r = r.clamp(LEFT_CORR_BOUND, RIGHT_CORR_BOUND);
    let dof = size as f32 - 3.0;
    let scale = if method.is_rank_based() {
        (dof / (1.0 + r * r / 2.0)).sqrt()
    } else {
        dof.sqrt()
    };
    pvalue(r.atanh() * scale, 1.0, Some(alternative))
}

/// [`correlation_pvalue`] for every coefficient of one side.
pub fn correlation_pvalues(
    corrs: &[f32],
    size: usize,
    method: Correlation,
    alternative: Alternative,
    executor: &BatchExecutor,
) -> Vec<f32> {
    let mut out = vec![0.0f32; corrs.len()];
    executor.for_each_batch(&mut out, 1, |range, chunk| {
        for (dst, &r) in chunk.iter_mut().zip(&corrs[range]) {
            *dst = correlation_pvalue(r, size, method, alternative);
        }
    });
    out
}

/// Subset sizes behind each coefficient
#[derive(Clone, Copy, Debug)]
pub enum SubsetSizes<'a> {
    /// Every pair measured on the same number of samples per side
    Fixed { reference: usize, experimental: usize },
    /// Per-pair sizes, for heterogeneous subsets
    PerPair {
        reference: &'a [usize],
        experimental: &'a [usize],
    },
}

impl SubsetSizes<'_> {
    #[inline]
    fn at(&self, k: usize) -> (usize, usize) {
        match self {
            SubsetSizes::Fixed {
                reference,
                experimental,
            } => (*reference, *experimental),
            SubsetSizes::PerPair {
                reference,
                experimental,
            } => (reference[k], experimental[k]),
        }
    }
}

/// Test settings shared by a batch
#[derive(Clone, Copy, Debug)]
pub struct ZTestSettings {
    pub method: Correlation,
    pub alternative: Option<Alternative>,
}

/// Kernel over `range`: writes statistics, and p-values when `pvalue_out` is given.
///
/// Coefficients and outputs are batch-local (length `range.len()`); `range`
/// addresses the per-pair sizes.
pub fn ztest_range(
    ref_corrs: &[f32],
    exp_corrs: &[f32],
    sizes: SubsetSizes<'_>,
    settings: ZTestSettings,
    range: Range<usize>,
    stat_out: &mut [f32],
    mut pvalue_out: Option<&mut [f32]>,
) {
    debug_assert_eq!(stat_out.len(), range.len());
    debug_assert_eq!(ref_corrs.len(), range.len());
    for (local, k) in range.enumerate() {
        let (n_ref, n_exp) = sizes.at(k);
        let (stat, p) = ztest_pair(
            ref_corrs[local],
            n_ref,
            exp_corrs[local],
            n_exp,
            settings.method,
            settings.alternative,
        );
        stat_out[local] = stat;
        if let Some(out) = pvalue_out.as_deref_mut() {
            out[local] = p;
        }
    }
}

/// Batched z-test output
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZTestResult {
    pub statistic: Vec<f32>,
    pub pvalue: Vec<f32>,
}

fn run_batched(
    ref_corrs: &[f32],
    exp_corrs: &[f32],
    sizes: SubsetSizes<'_>,
    settings: ZTestSettings,
    executor: &BatchExecutor,
) -> ZTestResult {
    let n = ref_corrs.len();
    let mut statistic = vec![0.0f32; n];
    let mut pvalue = vec![0.0f32; n];

    let _span = info_span!("ztest", pairs = n).entered();
    let ranges = executor.partition(n);
    let stat_chunks = split_by_ranges(&mut statistic, &ranges);
    let p_chunks = split_by_ranges(&mut pvalue, &ranges);
    let batches: Vec<_> = ranges
        .into_iter()
        .zip(stat_chunks)
        .zip(p_chunks)
        .collect();
    executor.scope(batches, |((range, stat), p)| {
        ztest_range(
            &ref_corrs[range.clone()],
            &exp_corrs[range.clone()],
            sizes,
            settings,
            range,
            stat,
            Some(p),
        )
    });

    ZTestResult { statistic, pvalue }
}

/// Test every coefficient pair, both sides measured on fixed subset sizes.
pub fn ztest_unsized(
    ref_corrs: &[f32],
    n_ref: usize,
    exp_corrs: &[f32],
    n_exp: usize,
    settings: ZTestSettings,
    executor: &BatchExecutor,
) -> Result<ZTestResult> {
    if ref_corrs.len() != exp_corrs.len() {
        return Err(DiffCorrError::config(format!(
            "coefficient arrays differ in length ({} vs {})",
            ref_corrs.len(),
            exp_corrs.len()
        )));
    }
    let sizes = SubsetSizes::Fixed {
        reference: n_ref,
        experimental: n_exp,
    };
    Ok(run_batched(ref_corrs, exp_corrs, sizes, settings, executor))
}

/// Test every coefficient pair with per-pair subset sizes.
pub fn ztest_sized(
    ref_corrs: &[f32],
    ref_sizes: &[usize],
    exp_corrs: &[f32],
    exp_sizes: &[usize],
    settings: ZTestSettings,
    executor: &BatchExecutor,
) -> Result<ZTestResult> {
    let n = ref_corrs.len();
    if exp_corrs.len() != n || ref_sizes.len() != n || exp_sizes.len() != n {
        return Err(DiffCorrError::config(format!(
            "z-test inputs differ in length (corrs {}/{}, sizes {}/{})",
            n,
            exp_corrs.len(),
            ref_sizes.len(),
            exp_sizes.len()
        )));
    }
    let sizes = SubsetSizes::PerPair {
        reference: ref_sizes,
        experimental: exp_sizes,
    };
    Ok(run_batched(ref_corrs, exp_corrs, sizes, settings, executor))
}
