//! Tabular request data: CSV in, column selection, result rendering.

use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

pub const PROBABILITY_COLUMN: &str = "default_probability";
pub const PREDICTION_COLUMN: &str = "default_prediction";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("no columns to parse from the uploaded file")]
    NoColumns,
    #[error("header column {0} has an empty name")]
    EmptyHeader(usize),
    #[error("column {0:?} appears more than once in the header")]
    DuplicateHeader(String),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("column {0:?} is not present in the table")]
    UnknownColumn(String),
}

/// A header row plus string cells, exactly as uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    #[cfg(test)]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { columns, rows }
    }

    /// Parses comma-separated data with a header row.
    ///
    /// Rows with a different number of fields than the header are rejected.
    pub fn from_csv(data: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(data);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(TableError::NoColumns);
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(TableError::EmptyHeader(index));
            }
            if !seen.insert(column.as_str()) {
                return Err(TableError::DuplicateHeader(column.clone()));
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Projects the table onto `names`, in that order. Columns not named are dropped.
    pub fn select(&self, names: &[String]) -> Result<Self, TableError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| TableError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Self {
            columns: names.to_vec(),
            rows,
        })
    }
}

/// Feature table with the prediction columns appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    features: Table,
    probabilities: Option<Vec<f64>>,
    predictions: Vec<i64>,
}

impl ResultTable {
    pub fn new(features: Table, probabilities: Option<Vec<f64>>, predictions: Vec<i64>) -> Self {
        debug_assert_eq!(features.row_count(), predictions.len());
        debug_assert!(
            probabilities
                .as_ref()
                .is_none_or(|p| p.len() == predictions.len())
        );
        Self {
            features,
            probabilities,
            predictions,
        }
    }

    #[cfg(test)]
    pub fn features(&self) -> &Table {
        &self.features
    }

    #[cfg(test)]
    pub fn probabilities(&self) -> Option<&[f64]> {
        self.probabilities.as_deref()
    }

    #[cfg(test)]
    pub fn predictions(&self) -> &[i64] {
        &self.predictions
    }

    pub fn row_count(&self) -> usize {
        self.predictions.len()
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.features.columns().to_vec();
        if self.probabilities.is_some() {
            columns.push(PROBABILITY_COLUMN.to_string());
        }
        columns.push(PREDICTION_COLUMN.to_string());
        columns
    }

    /// Rows as JSON values; numeric-looking feature cells become numbers.
    pub fn json_rows(&self) -> Vec<Vec<Value>> {
        self.features
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut out: Vec<Value> = row.iter().map(|cell| json_cell(cell)).collect();
                if let Some(probabilities) = &self.probabilities {
                    out.push(Value::from(probabilities[i]));
                }
                out.push(Value::from(self.predictions[i]));
                out
            })
            .collect()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns())?;
        for (i, row) in self.features.rows().iter().enumerate() {
            let mut record = row.clone();
            if let Some(probabilities) = &self.probabilities {
                record.push(probabilities[i].to_string());
            }
            record.push(self.predictions[i].to_string());
            writer.write_record(&record)?;
        }
        writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))
    }
}

fn json_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    match cell.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::from(cell),
    }
}
