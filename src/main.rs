//! # diffcorr: Differential Correlation Analysis
//!
//! Tests whether pairwise correlations between entities differ between a
//! reference and an experimental sample group, with bootstrap calibration.
//!
//! ## Usage
//! ```bash
//! # Per-pair z-test over every pair of matrix rows
//! diffcorr ztest --data expr.csv --description desc.csv \
//!     --reference-group healthy --experimental-group tumor --out results/
//!
//! # Per-source scores over an interaction network
//! diffcorr score --data expr.csv --description desc.csv --interaction net.csv \
//!     --reference-group healthy --experimental-group tumor --score median --out results/
//!
//! # Entities enriched among significant pairs
//! diffcorr hypergeom --data expr.csv --description desc.csv --interaction net.csv \
//!     --reference-group healthy --experimental-group tumor --fdr-threshold 0.1 --out results/
//!
//! # With profiling output
//! diffcorr ztest ... --profile
//! ```

use std::time::Instant;

use diffcorr::config::{Config, Tool};
use diffcorr::data::PairSet;
use diffcorr::io::table;
use diffcorr::model::hypergeom::enrichment;
use diffcorr::pipelines::{PipelineOptions, ScorePipeline, ZTestPipeline};
use diffcorr::utils::telemetry::{HeartbeatConfig, HeartbeatHandle, Stage, TelemetryBlackboard};
use diffcorr::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber. `profile` adds span close timings.
fn init_tracing(profile: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let span_events = if profile { FmtSpan::CLOSE } else { FmtSpan::NONE };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(span_events)
                .with_target(false)
                .with_timer(fmt::time::uptime()),
        )
        .init();
}

fn run() -> Result<()> {
    let start = Instant::now();

    let config = Config::parse_and_validate()?;

    if config.profile || config.verbose {
        init_tracing(config.profile);
        if config.profile {
            eprintln!("=== Profiling enabled ===\n");
        }
    }

    let options = config.pipeline_options();
    eprintln!("diffcorr v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("Threads: {}", options.process_num);

    let telemetry = TelemetryBlackboard::new();
    let heartbeat = HeartbeatHandle::spawn(telemetry.clone(), HeartbeatConfig::default())?;

    telemetry.set_stage(Stage::LoadingData);
    let data = table::read_matrix(&config.data, config.delimiter)?;
    let description = table::read_description(&config.description, config.delimiter)?;
    let conditions =
        description.conditions(&config.reference_group, &config.experimental_group, &data.samples)?;
    eprintln!(
        "Data: {} entities x {} samples ({} reference, {} experimental)",
        data.matrix.n_entities(),
        data.matrix.n_samples(),
        conditions.n_reference(),
        conditions.n_experimental()
    );

    let mut pairs = match &config.interaction {
        Some(path) => {
            let interactions = table::read_interactions(path, config.delimiter, &data.entities)?;
            eprintln!(
                "Interactions: {} kept, {} dropped",
                interactions.sources.len(),
                interactions.dropped
            );
            PairSet::explicit(interactions.sources, interactions.targets)?
        }
        None => PairSet::exhaustive(data.matrix.n_entities()),
    };
    // Score runs group consecutive equal sources
    if config.tool == Tool::Score {
        pairs.sort_by_source(None)?;
    }
    eprintln!("Pairs: {}", pairs.len());

    std::fs::create_dir_all(&config.out)?;
    let path = config.output_path();

    match config.tool {
        Tool::Ztest => {
            eprintln!("Mode: z-test ({}, {})", options.correlation, options.alternative);
            let with_permutation = options.repeats > 0;
            let output = ZTestPipeline::new(options)
                .with_telemetry(telemetry.clone())
                .run(&data.matrix, &pairs, &conditions)?;
            telemetry.set_stage(Stage::WritingOutput);
            table::write_ztest(&path, &data.entities, &pairs, &output, with_permutation, config.delimiter)?;
        }
        Tool::Score => {
            eprintln!(
                "Mode: score ({}, {}, {})",
                options.correlation, options.score, options.alternative
            );
            let output = ScorePipeline::new(options)
                .with_telemetry(telemetry.clone())
                .run(&data.matrix, &pairs, &conditions)?;
            telemetry.set_stage(Stage::WritingOutput);
            table::write_scores(&path, &data.entities, &output, config.delimiter)?;
        }
        Tool::Hypergeom => {
            let settings = config.enrichment_settings();
            eprintln!(
                "Mode: hypergeom ({}, {}, FDR < {})",
                options.correlation, settings.alternative, settings.fdr_threshold
            );
            // Only the analytic p-values feed the enrichment
            let output = ZTestPipeline::new(PipelineOptions { repeats: 0, ..options })
                .with_telemetry(telemetry.clone())
                .run(&data.matrix, &pairs, &conditions)?;
            let rows = enrichment(&pairs, &output.statistic, &output.pvalue, settings)?;
            eprintln!("Enriched entities: {}", rows.len());
            telemetry.set_stage(Stage::WritingOutput);
            table::write_hypergeom(&path, &data.entities, &rows, config.delimiter)?;
        }
    }

    telemetry.set_stage(Stage::Complete);
    heartbeat.shutdown();

    eprintln!("File saved at: {}", path.display());
    eprintln!("\nCompleted in {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
