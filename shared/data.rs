//! # Tabular input and output
//!
//! All files are tab-separated with a header row. Design matrices have one
//! column per variable and one row per sample; every cell must parse as a
//! finite number. A response file is read from a named column, or from its
//! first column when no name is given. Statistic files for thresholding use
//! the design layout with one row per trial.

use crate::filter::result::{AggregatedResult, SelectionResult};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed TSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("The column '{0}' was not found in the input file.")]
    ColumnNotFound(String),
    #[error("The file '{0}' has a header but no data rows.")]
    NoRows(String),
    #[error("The file '{0}' has no columns.")]
    NoColumns(String),
    #[error("Row {row}, column '{column}' holds '{value}', which is not a finite number.")]
    NonNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("{found} variable names were given for {expected} columns.")]
    NameCount { found: usize, expected: usize },
}

/// A numeric table together with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, DataError> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, DataError> {
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
}

fn parse_cell(value: &str, row: usize, column: &str) -> Result<f64, DataError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(DataError::NonNumeric {
            row,
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Loads a tab-separated numeric table.
pub fn load_matrix(path: impl AsRef<Path>) -> Result<LabeledMatrix, DataError> {
    let path = path.as_ref();
    let mut reader = tsv_reader(path)?;
    let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if names.is_empty() {
        return Err(DataError::NoColumns(path.display().to_string()));
    }

    let mut cells = Vec::new();
    let mut n_rows = 0;
    for record in reader.records() {
        let record = record?;
        n_rows += 1;
        for (value, name) in record.iter().zip(&names) {
            cells.push(parse_cell(value, n_rows, name)?);
        }
    }
    if n_rows == 0 {
        return Err(DataError::NoRows(path.display().to_string()));
    }
    let values = Array2::from_shape_vec((n_rows, names.len()), cells)
        .map_err(|_| DataError::NoColumns(path.display().to_string()))?;
    log::debug!(
        "Loaded {} rows x {} columns from {}",
        n_rows,
        names.len(),
        path.display()
    );
    Ok(LabeledMatrix { names, values })
}

/// Loads one response column, by name or the first column when `column` is `None`.
pub fn load_response(path: impl AsRef<Path>, column: Option<&str>) -> Result<Array1<f64>, DataError> {
    let table = load_matrix(path)?;
    let index = match column {
        Some(name) => table
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))?,
        None => 0,
    };
    Ok(table.values.column(index).to_owned())
}

/// Writes `values` with `names` as the header row.
pub fn write_matrix(
    path: impl AsRef<Path>,
    names: &[String],
    values: ArrayView2<f64>,
) -> Result<(), DataError> {
    if names.len() != values.ncols() {
        return Err(DataError::NameCount {
            found: names.len(),
            expected: values.ncols(),
        });
    }
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(names)?;
    let mut buffer = ryu::Buffer::new();
    let mut row_cells = Vec::with_capacity(values.ncols());
    for row in values.rows() {
        row_cells.clear();
        row_cells.extend(row.iter().map(|v| buffer.format(*v).to_string()));
        writer.write_record(&row_cells)?;
    }
    writer.flush()?;
    Ok(())
}

fn name_of(names: &[String], j: usize) -> String {
    names.get(j).cloned().unwrap_or_else(|| format!("V{}", j + 1))
}

/// Writes the selected variables of a single run: index, name, statistic.
pub fn write_selection(
    path: impl AsRef<Path>,
    names: &[String],
    result: &SelectionResult,
) -> Result<(), DataError> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(["index", "name", "statistic"])?;
    let mut buffer = ryu::Buffer::new();
    let statistic = result.statistic();
    for &j in result.selected() {
        writer.write_record([
            j.to_string(),
            name_of(names, j),
            buffer.format(statistic[j]).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the selected variables of an aggregated run: index, name,
/// aggregated score and per-trial selection frequency.
pub fn write_aggregated(
    path: impl AsRef<Path>,
    names: &[String],
    result: &AggregatedResult,
) -> Result<(), DataError> {
    let mut writer = tsv_writer(path.as_ref())?;
    writer.write_record(["index", "name", "score", "selection_frequency"])?;
    let mut buffer = ryu::Buffer::new();
    let score = result.aggregated().statistic();
    let frequency = result.selection_frequency();
    for &j in result.ako_selected() {
        let score_cell = buffer.format(score[j]).to_string();
        writer.write_record([
            j.to_string(),
            name_of(names, j),
            score_cell,
            buffer.format(frequency[j]).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// One-line summary of a selection for terminal output.
pub fn describe_selection(names: &[String], selected: &[usize]) -> String {
    if selected.is_empty() {
        return "none".to_string();
    }
    selected.iter().map(|&j| name_of(names, j)).join(", ")
}
