use std::fs;
use std::path::Path;

use diffcorr::data::PairSet;
use diffcorr::io::table::{
    read_description, read_interactions, read_matrix, write_hypergeom, write_scores, write_ztest,
};
use diffcorr::model::hypergeom::{enrichment, EnrichmentSettings};
use diffcorr::model::Correlation;
use diffcorr::pipelines::{PipelineOptions, ScorePipeline, ZTestPipeline};
use tempfile::tempdir;

// --- Helpers ---

fn write_inputs(dir: &Path) {
    fs::write(
        dir.join("data.csv"),
        "\
gene,s1,s2,s3,s4,s5,s6,s7,s8,s9,s10
TP53,1.0,2.1,2.9,4.2,5.1,6.3,2.0,1.1,3.5,0.2
MDM2,1.2,2.0,3.1,3.9,5.3,5.8,7.1,0.4,2.2,3.0
EGFR,0.5,0.1,0.9,0.3,0.7,3.2,1.1,4.5,0.6,2.9
MYC,9.0,7.5,6.1,5.2,3.9,1.2,2.5,3.3,8.1,0.7
",
    )
    .unwrap();
    fs::write(
        dir.join("description.csv"),
        "\
Sample,Group
s1,normal
s2,normal
s3,normal
s4,normal
s5,normal
s6,tumor
s7,tumor
s8,tumor
s9,tumor
s10,tumor
",
    )
    .unwrap();
    fs::write(
        dir.join("interaction.csv"),
        "\
Source,Target
MYC,TP53
TP53,MDM2
TP53,EGFR
KRAS,TP53
MYC,EGFR
",
    )
    .unwrap();
}

fn options() -> PipelineOptions {
    PipelineOptions {
        correlation: Correlation::Pearson,
        repeats: 20,
        process_num: 2,
        ..PipelineOptions::default()
    }
}

// --- Round trips ---

#[test]
fn ztest_tables_round_trip() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    let data = read_matrix(&dir.path().join("data.csv"), ',').unwrap();
    let description = read_description(&dir.path().join("description.csv"), ',').unwrap();
    let conditions = description.conditions("normal", "tumor", &data.samples).unwrap();
    assert_eq!(conditions.n_reference(), 5);
    assert_eq!(conditions.n_experimental(), 5);

    let pairs = PairSet::exhaustive(data.matrix.n_entities());
    let output = ZTestPipeline::new(options())
        .run(&data.matrix, &pairs, &conditions)
        .unwrap();

    let path = dir.path().join("pearson_two-sided_ztest.csv");
    write_ztest(&path, &data.entities, &pairs, &output, true, ',').unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Source,Target,RefCorr,RefPvalue,ExpCorr,ExpPvalue,Statistic,Pvalue,AdjPvalue,PermutePvalue")
    );
    let rows: Vec<Vec<&str>> = lines.map(|l| l.split(',').collect()).collect();
    assert_eq!(rows.len(), 6);

    let adjusted: Vec<f32> = rows.iter().map(|r| r[8].parse().unwrap()).collect();
    assert!(adjusted.windows(2).all(|w| w[0] <= w[1]));
    for row in &rows {
        assert_eq!(row.len(), 10);
        for column in [3, 5, 9] {
            let p: f32 = row[column].parse().unwrap();
            assert!((0.0..=1.0).contains(&p), "column {} of {:?}", column, row);
        }
    }
}

#[test]
fn score_tables_round_trip() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    let data = read_matrix(&dir.path().join("data.csv"), ',').unwrap();
    let description = read_description(&dir.path().join("description.csv"), ',').unwrap();
    let conditions = description.conditions("normal", "tumor", &data.samples).unwrap();
    let interactions =
        read_interactions(&dir.path().join("interaction.csv"), ',', &data.entities).unwrap();
    assert_eq!(interactions.dropped, 1);

    let mut pairs = PairSet::explicit(interactions.sources, interactions.targets).unwrap();
    pairs.sort_by_source(None).unwrap();

    let output = ScorePipeline::new(options())
        .run(&data.matrix, &pairs, &conditions)
        .unwrap();
    assert_eq!(output.len(), 2);

    let path = dir.path().join("pearson_mean_two-sided_zscore.csv");
    write_scores(&path, &data.entities, &output, ',').unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Source,Score,Pvalue,AdjPvalue");
    let rows: Vec<Vec<&str>> = lines[1..].iter().map(|l| l.split(',').collect()).collect();
    assert_eq!(rows.len(), 2);

    let mut names: Vec<&str> = rows.iter().map(|r| r[0]).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["MYC", "TP53"]);

    let adjusted: Vec<f32> = rows.iter().map(|r| r[3].parse().unwrap()).collect();
    assert!(adjusted[0] <= adjusted[1]);
    for (row, &adj) in rows.iter().zip(&adjusted) {
        let score: f32 = row[1].parse().unwrap();
        let pvalue: f32 = row[2].parse().unwrap();
        assert!(score >= 0.0);
        assert!((0.0..=1.0).contains(&pvalue));
        assert!(adj >= pvalue && adj <= 1.0);
    }
}

#[test]
fn hypergeom_table_round_trip() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path());

    let data = read_matrix(&dir.path().join("data.csv"), ',').unwrap();
    let description = read_description(&dir.path().join("description.csv"), ',').unwrap();
    let conditions = description.conditions("normal", "tumor", &data.samples).unwrap();
    let interactions =
        read_interactions(&dir.path().join("interaction.csv"), ',', &data.entities).unwrap();
    let pairs = PairSet::explicit(interactions.sources, interactions.targets).unwrap();

    let output = ZTestPipeline::new(PipelineOptions { repeats: 0, ..options() })
        .run(&data.matrix, &pairs, &conditions)
        .unwrap();
    let settings = EnrichmentSettings {
        fdr_threshold: 1.0,
        ..EnrichmentSettings::default()
    };
    let rows = enrichment(&pairs, &output.statistic, &output.pvalue, settings).unwrap();

    let path = dir.path().join("pearson_two-sided_hypergeom.csv");
    write_hypergeom(&path, &data.entities, &rows, ',').unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Entity,Diff,Total,Proportion,Pvalue,AdjPvalue");
    assert_eq!(lines.len(), rows.len() + 1);
    for line in &lines[1..] {
        let cells: Vec<&str> = line.split(',').collect();
        assert_eq!(cells.len(), 6);
        // oriented: only TP53 and MYC appear as sources
        assert!(cells[0] == "TP53" || cells[0] == "MYC");
        let diff: usize = cells[1].parse().unwrap();
        let total: usize = cells[2].parse().unwrap();
        assert!(diff >= 1 && diff <= total && total == 2);
    }
}
