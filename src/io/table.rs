//! # Delimited Tables
//!
//! Readers and writers for the command-line tables:
//! - **Data matrix:** header row of sample ids (the first header cell names the
//!   id column and is ignored), then one row per entity: id followed by one
//!   numeric value per sample.
//! - **Description:** `Sample` and `Group` columns, in any order; extra columns
//!   are ignored.
//! - **Interactions:** `Source` and `Target` columns of entity ids. Rows naming
//!   an entity missing from the matrix are dropped.
//!
//! Blank lines are skipped everywhere. Cells are trimmed.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::data::conditions::ConditionAssignment;
use crate::data::ids::{EntityIdx, Labels, SampleIdx};
use crate::data::matrix::SampleMatrix;
use crate::data::pairs::PairSet;
use crate::error::{DiffCorrError, Result};
use crate::model::adjust::fdr_order;
use crate::model::hypergeom::EnrichmentRow;
use crate::pipelines::{ScoreOutput, ZTestOutput};

/// Matrix with its row and column labels
#[derive(Clone, Debug)]
pub struct DataTable {
    pub entities: Labels,
    pub samples: Labels,
    pub matrix: SampleMatrix,
}

/// Sample-to-group assignments, in file order
#[derive(Clone, Debug, Default)]
pub struct Description {
    rows: Vec<(String, String)>,
}

/// Interaction pairs resolved against the matrix row labels
#[derive(Clone, Debug, Default)]
pub struct Interactions {
    pub sources: Vec<EntityIdx>,
    pub targets: Vec<EntityIdx>,
    /// Rows whose source or target is not a matrix row
    pub dropped: usize,
}

fn open(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(DiffCorrError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Split a line into trimmed cells
fn cells(line: &str, delimiter: char) -> impl Iterator<Item = &str> {
    line.split(delimiter).map(str::trim)
}

/// Non-blank lines with their 1-based line numbers
fn numbered_lines(reader: impl BufRead) -> impl Iterator<Item = Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(i, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(Ok((i + 1, line))),
            Err(e) => Some(Err(e.into())),
        })
}

/// Position of each named column in a header row
fn locate_columns<const N: usize>(
    header: &str,
    delimiter: char,
    names: [&str; N],
    path: &Path,
) -> Result<[usize; N]> {
    let header: Vec<&str> = cells(header, delimiter).collect();
    let mut found = [0usize; N];
    for (slot, name) in found.iter_mut().zip(names) {
        *slot = header.iter().position(|&c| c == name).ok_or_else(|| {
            DiffCorrError::invalid_data(format!(
                "{}: missing column '{}'",
                path.display(),
                name
            ))
        })?;
    }
    Ok(found)
}

/// Read an entity × sample matrix.
pub fn read_matrix(path: &Path, delimiter: char) -> Result<DataTable> {
    let mut lines = numbered_lines(open(path)?);

    let samples: Vec<String> = match lines.next() {
        Some(header) => {
            let (_, header) = header?;
            cells(&header, delimiter).skip(1).map(str::to_owned).collect()
        }
        None => {
            return Err(DiffCorrError::invalid_data(format!(
                "{}: empty data table",
                path.display()
            )))
        }
    };
    let n_samples = samples.len();

    let mut entities = Vec::new();
    let mut data = Vec::new();
    for line in lines {
        let (line_no, line) = line?;
        let mut fields = cells(&line, delimiter);
        let id = fields.next().unwrap_or_default().to_owned();

        let start = data.len();
        for cell in fields {
            let value = cell.parse::<f32>().map_err(|_| {
                DiffCorrError::parse(line_no, format!("non-numeric value '{}' for '{}'", cell, id))
            })?;
            data.push(value);
        }
        let width = data.len() - start;
        if width != n_samples {
            return Err(DiffCorrError::parse(
                line_no,
                format!("expected {} values for '{}', found {}", n_samples, id, width),
            ));
        }
        entities.push(id);
    }

    let matrix = SampleMatrix::new(data, entities.len(), n_samples)?;
    info!(
        entities = matrix.n_entities(),
        samples = matrix.n_samples(),
        "loaded data matrix"
    );
    Ok(DataTable {
        entities: Labels::from_names(entities),
        samples: Labels::from_names(samples),
        matrix,
    })
}

/// Read a `Sample`/`Group` description table.
pub fn read_description(path: &Path, delimiter: char) -> Result<Description> {
    let mut lines = numbered_lines(open(path)?);
    let [sample_col, group_col] = match lines.next() {
        Some(header) => locate_columns(&header?.1, delimiter, ["Sample", "Group"], path)?,
        None => {
            return Err(DiffCorrError::invalid_data(format!(
                "{}: empty description table",
                path.display()
            )))
        }
    };

    let mut rows = Vec::new();
    for line in lines {
        let (line_no, line) = line?;
        let fields: Vec<&str> = cells(&line, delimiter).collect();
        match (fields.get(sample_col), fields.get(group_col)) {
            (Some(sample), Some(group)) => rows.push(((*sample).to_owned(), (*group).to_owned())),
            _ => return Err(DiffCorrError::parse(line_no, "missing Sample or Group cell")),
        }
    }
    Ok(Description { rows })
}

impl Description {
    pub fn new(rows: Vec<(String, String)>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Matrix columns of the samples listed under `group`, in file order.
    /// Samples absent from the matrix are skipped with a warning.
    pub fn group_columns(&self, group: &str, samples: &Labels) -> Vec<SampleIdx> {
        let mut columns = Vec::new();
        for (sample, g) in &self.rows {
            if g != group {
                continue;
            }
            match samples.sample(sample) {
                Some(idx) => columns.push(idx),
                None => warn!(sample = %sample, group, "described sample missing from data matrix"),
            }
        }
        columns
    }

    /// Resolve both groups into a validated condition assignment.
    pub fn conditions(
        &self,
        reference_group: &str,
        experimental_group: &str,
        samples: &Labels,
    ) -> Result<ConditionAssignment> {
        let reference = self.group_columns(reference_group, samples);
        let experimental = self.group_columns(experimental_group, samples);
        for (group, columns) in [(reference_group, &reference), (experimental_group, &experimental)] {
            if columns.is_empty() {
                return Err(DiffCorrError::config(format!(
                    "group '{}' has no samples in the data matrix",
                    group
                )));
            }
        }
        let conditions = ConditionAssignment::new(reference, experimental);
        conditions.validate(samples.len())?;
        Ok(conditions)
    }
}

/// Read a `Source`/`Target` interaction table, keeping only pairs whose
/// entities are matrix rows.
pub fn read_interactions(path: &Path, delimiter: char, entities: &Labels) -> Result<Interactions> {
    let mut lines = numbered_lines(open(path)?);
    let [source_col, target_col] = match lines.next() {
        Some(header) => locate_columns(&header?.1, delimiter, ["Source", "Target"], path)?,
        None => return Ok(Interactions::default()),
    };

    let mut out = Interactions::default();
    for line in lines {
        let (line_no, line) = line?;
        let fields: Vec<&str> = cells(&line, delimiter).collect();
        let (source, target) = match (fields.get(source_col), fields.get(target_col)) {
            (Some(s), Some(t)) => (*s, *t),
            _ => return Err(DiffCorrError::parse(line_no, "missing Source or Target cell")),
        };
        match (entities.entity(source), entities.entity(target)) {
            (Some(s), Some(t)) => {
                out.sources.push(s);
                out.targets.push(t);
            }
            _ => out.dropped += 1,
        }
    }

    if out.dropped > 0 {
        warn!(dropped = out.dropped, kept = out.sources.len(), "interactions with unknown entities dropped");
    }
    Ok(out)
}

/// Write pairwise results sorted by adjusted then analytic p-value.
///
/// `PermutePvalue` is written only when `with_permutation` is set.
pub fn write_ztest(
    path: &Path,
    entities: &Labels,
    pairs: &PairSet,
    output: &ZTestOutput,
    with_permutation: bool,
    delimiter: char,
) -> Result<()> {
    if pairs.len() != output.len() {
        return Err(DiffCorrError::config(format!(
            "{} pairs but {} results",
            pairs.len(),
            output.len()
        )));
    }
    let (adjusted, order) = fdr_order(&output.pvalue);

    let mut writer = BufWriter::new(File::create(path)?);
    let d = delimiter;
    write!(
        writer,
        "Source{d}Target{d}RefCorr{d}RefPvalue{d}ExpCorr{d}ExpPvalue{d}Statistic{d}Pvalue{d}AdjPvalue"
    )?;
    if with_permutation {
        write!(writer, "{d}PermutePvalue")?;
    }
    writeln!(writer)?;

    for k in order {
        let (source, target) = pairs.pair(k);
        write!(
            writer,
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            entities.name(source),
            entities.name(target),
            output.reference_corrs[k],
            output.reference_pvalue[k],
            output.experimental_corrs[k],
            output.experimental_pvalue[k],
            output.statistic[k],
            output.pvalue[k],
            adjusted[k],
        )?;
        if with_permutation {
            write!(writer, "{d}{}", output.permutation_pvalue[k])?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write per-source scores with their empirical p-value and its adjustment,
/// sorted by adjusted then raw p-value. Ties keep source order.
pub fn write_scores(path: &Path, entities: &Labels, output: &ScoreOutput, delimiter: char) -> Result<()> {
    let (adjusted, order) = fdr_order(&output.permutation_pvalue);

    let mut writer = BufWriter::new(File::create(path)?);
    let d = delimiter;
    writeln!(writer, "Source{d}Score{d}Pvalue{d}AdjPvalue")?;
    for i in order {
        writeln!(
            writer,
            "{}{d}{}{d}{}{d}{}",
            entities.name(output.sources[i].as_usize()),
            output.scores[i],
            output.permutation_pvalue[i],
            adjusted[i],
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write enrichment rows in the order given.
pub fn write_hypergeom(path: &Path, entities: &Labels, rows: &[EnrichmentRow], delimiter: char) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let d = delimiter;
    writeln!(writer, "Entity{d}Diff{d}Total{d}Proportion{d}Pvalue{d}AdjPvalue")?;
    for row in rows {
        writeln!(
            writer,
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            entities.name(row.entity.as_usize()),
            row.diff,
            row.total,
            row.proportion,
            row.pvalue,
            row.adjusted,
        )?;
    }
    writer.flush()?;
    Ok(())
}
