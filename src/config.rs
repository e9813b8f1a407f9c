//! # Configuration Logic
//!
//! ## Role
//! CLI argument parsing and validation. The library never reads `Config`
//! directly: [`Config::pipeline_options`] hands the core its
//! [`PipelineOptions`].
//!
//! ## Validation
//! - Input files must exist
//! - `--nthreads` must be at least 1
//! - Reference and experimental groups must differ
//! - `--fdr-threshold` must lie in `(0, 1]`
//!
//! Groups that match no samples are rejected later, once the description
//! table has been resolved against the data matrix.
//!
//! ## Example CLI
//! ```bash
//! diffcorr ztest --data expr.csv --description desc.csv \
//!     --reference-group healthy --experimental-group tumor --out results/
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

use crate::error::{DiffCorrError, Result};
use crate::model::hypergeom::{EnrichmentSettings, DEFAULT_FDR_THRESHOLD};
use crate::model::{Alternative, Correlation, ScoreKind};
use crate::pipelines::bootstrap::{PipelineOptions, DEFAULT_REPEATS, DEFAULT_SEED};

/// Which pipeline to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Tool {
    /// Per-pair differential correlation z-test
    Ztest,
    /// Per-source aggregated z-score
    Score,
    /// Entity enrichment among significant z-test pairs
    Hypergeom,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "diffcorr", version, about = "Differential correlation analysis between two sample groups")]
pub struct Config {
    /// Pipeline to run
    #[arg(value_enum)]
    pub tool: Tool,

    /// Entity x sample matrix (first column entity ids, header row sample ids)
    #[arg(long)]
    pub data: PathBuf,

    /// Sample description table with `Sample` and `Group` columns
    #[arg(long)]
    pub description: PathBuf,

    /// Group label of the reference condition
    #[arg(long)]
    pub reference_group: String,

    /// Group label of the experimental condition
    #[arg(long)]
    pub experimental_group: String,

    /// Interaction table with `Source` and `Target` columns (all pairs when omitted)
    #[arg(long)]
    pub interaction: Option<PathBuf>,

    /// Output directory (created if missing)
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = Correlation::default())]
    pub correlation: Correlation,

    #[arg(long, value_enum, default_value_t = Alternative::default())]
    pub alternative: Alternative,

    /// Score aggregation (score tool only)
    #[arg(long, value_enum, default_value_t = ScoreKind::default())]
    pub score: ScoreKind,

    /// Adjusted p-value cutoff for significant pairs (hypergeom tool only)
    #[arg(long, default_value_t = DEFAULT_FDR_THRESHOLD)]
    pub fdr_threshold: f32,

    /// Count both endpoints of a pair instead of its source (hypergeom tool only)
    #[arg(long)]
    pub unoriented: bool,

    /// Bootstrap rounds after the observed one
    #[arg(long, default_value_t = DEFAULT_REPEATS)]
    pub repeats: usize,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// Permutation seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Field delimiter for every input and output table
    #[arg(long, default_value_t = ',')]
    pub delimiter: char,

    /// Print span timings
    #[arg(long)]
    pub profile: bool,

    /// Emit library log events to stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_exists(&self.data)?;
        check_exists(&self.description)?;
        if let Some(path) = &self.interaction {
            check_exists(path)?;
        }
        if self.nthreads == Some(0) {
            return Err(DiffCorrError::config("--nthreads must be at least 1"));
        }
        if self.fdr_threshold.is_nan() || self.fdr_threshold <= 0.0 || self.fdr_threshold > 1.0 {
            return Err(DiffCorrError::config(format!(
                "--fdr-threshold must be in (0, 1], got {}",
                self.fdr_threshold
            )));
        }
        if self.reference_group == self.experimental_group {
            return Err(DiffCorrError::config(format!(
                "reference and experimental groups are both '{}'",
                self.reference_group
            )));
        }
        Ok(())
    }

    /// Worker count, defaulting to the available cores
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            correlation: self.correlation,
            alternative: self.alternative,
            score: self.score,
            repeats: self.repeats,
            process_num: self.nthreads(),
            seed: self.seed,
        }
    }

    pub fn enrichment_settings(&self) -> EnrichmentSettings {
        EnrichmentSettings {
            alternative: self.alternative,
            oriented: !self.unoriented,
            fdr_threshold: self.fdr_threshold,
        }
    }

    /// Output file for the selected tool inside `out`
    pub fn output_path(&self) -> PathBuf {
        let name = match self.tool {
            Tool::Ztest => format!("{}_{}_ztest.csv", self.correlation, self.alternative),
            Tool::Score => format!(
                "{}_{}_{}_zscore.csv",
                self.correlation, self.score, self.alternative
            ),
            Tool::Hypergeom => format!("{}_{}_hypergeom.csv", self.correlation, self.alternative),
        };
        self.out.join(name)
    }
}

fn check_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(DiffCorrError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[
            "diffcorr",
            "score",
            "--data",
            "d.csv",
            "--description",
            "s.csv",
            "--reference-group",
            "a",
            "--experimental-group",
            "b",
            "--out",
            "res",
        ]);
        assert_eq!(config.tool, Tool::Score);
        let options = config.pipeline_options();
        assert_eq!(options.correlation, Correlation::Spearman);
        assert_eq!(options.alternative, Alternative::TwoSided);
        assert_eq!(options.score, ScoreKind::Mean);
        assert_eq!(options.repeats, 1000);
        assert_eq!(options.seed, 733);
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.enrichment_settings(), EnrichmentSettings::default());
        assert_eq!(
            config.output_path(),
            PathBuf::from("res").join("spearman_mean_two-sided_zscore.csv")
        );
    }

    #[test]
    fn test_hypergeom_options() {
        let config = parse(&[
            "diffcorr",
            "hypergeom",
            "--data",
            "d.csv",
            "--description",
            "s.csv",
            "--reference-group",
            "a",
            "--experimental-group",
            "b",
            "--out",
            "res",
            "--alternative",
            "greater",
            "--unoriented",
            "--fdr-threshold",
            "0.1",
        ]);
        assert_eq!(config.tool, Tool::Hypergeom);
        let settings = config.enrichment_settings();
        assert_eq!(settings.alternative, Alternative::Greater);
        assert!(!settings.oriented);
        assert!((settings.fdr_threshold - 0.1).abs() < 1e-7);
        assert_eq!(
            config.output_path(),
            PathBuf::from("res").join("spearman_greater_hypergeom.csv")
        );
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("d.csv");
        let description = dir.path().join("s.csv");
        fs::write(&data, "id,s1\n").unwrap();
        fs::write(&description, "Sample,Group\n").unwrap();

        let base = [
            "diffcorr",
            "ztest",
            "--data",
            data.to_str().unwrap(),
            "--description",
            description.to_str().unwrap(),
            "--reference-group",
            "a",
            "--out",
            "res",
            "--correlation",
            "pearson",
        ];

        let mut ok = base.to_vec();
        ok.extend(["--experimental-group", "b", "--nthreads", "3"]);
        let config = parse(&ok);
        assert!(config.validate().is_ok());
        assert_eq!(config.nthreads(), 3);
        assert_eq!(config.output_path(), PathBuf::from("res").join("pearson_two-sided_ztest.csv"));

        let mut zero = base.to_vec();
        zero.extend(["--experimental-group", "b", "--nthreads", "0"]);
        assert!(matches!(parse(&zero).validate(), Err(DiffCorrError::Config { .. })));

        let mut threshold = base.to_vec();
        threshold.extend(["--experimental-group", "b", "--fdr-threshold", "0"]);
        assert!(matches!(parse(&threshold).validate(), Err(DiffCorrError::Config { .. })));

        let mut same = base.to_vec();
        same.extend(["--experimental-group", "a"]);
        assert!(parse(&same).validate().is_err());

        let mut missing = base.to_vec();
        missing.extend(["--experimental-group", "b", "--interaction", "/no/such/file.csv"]);
        assert!(matches!(
            parse(&missing).validate(),
            Err(DiffCorrError::FileNotFound { .. })
        ));
    }
}
