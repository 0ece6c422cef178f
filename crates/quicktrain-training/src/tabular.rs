//! Table preparation for the text and tabular backends.

use crate::error::{TrainingError, TrainingResult};
use crate::split::SplitPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// One labeled text sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledText {
    pub text: String,
    pub label: String,
}

/// Rows loaded from one labeled file, plus how many were unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabeledTable {
    pub rows: Vec<LabeledText>,
    pub dropped: usize,
}

impl LabeledTable {
    pub fn extend(&mut self, other: Self) {
        self.rows.extend(other.rows);
        self.dropped += other.dropped;
    }

    /// Sorted distinct labels mapped to dense ids.
    #[must_use]
    pub fn label_index(&self) -> BTreeMap<String, usize> {
        let mut labels: Vec<&str> = self.rows.iter().map(|r| r.label.as_str()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.into_iter().enumerate().map(|(id, l)| (l.to_string(), id)).collect()
    }
}

fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn push_row(table: &mut LabeledTable, text: Option<String>, label: Option<String>) {
    match (text, label) {
        (Some(text), Some(label)) => table.rows.push(LabeledText { text, label }),
        _ => table.dropped += 1,
    }
}

/// Loads labeled text from a `.csv`, `.json` (array or one record per line) or `.jsonl` file.
///
/// A `text` / `label` header pair is used when present; otherwise the first column is
/// the text and the second the label. Rows with empty text or no label are dropped.
pub fn read_labeled_text(path: &Path) -> TrainingResult<LabeledTable> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let table = match extension.as_str() {
        "json" | "jsonl" | "ndjson" => read_labeled_json(&std::fs::read_to_string(path)?)?,
        _ => read_labeled_csv(std::fs::File::open(path)?)?,
    };

    debug!(path = %path.display(), rows = table.rows.len(), dropped = table.dropped, "Loaded labeled text");
    Ok(table)
}

fn read_labeled_csv<R: std::io::Read>(reader: R) -> TrainingResult<LabeledTable> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();

    let position = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let (text_col, label_col) = match (position("text"), position("label")) {
        (Some(t), Some(l)) => (t, l),
        _ if headers.len() >= 2 => (0, 1),
        _ => {
            return Err(TrainingError::Assembly(format!(
                "labeled table needs at least two columns, found {}",
                headers.len()
            )));
        }
    };

    let mut table = LabeledTable::default();
    for record in reader.records() {
        let record = record?;
        let cell = |i: usize| record.get(i).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        push_row(&mut table, cell(text_col), cell(label_col));
    }
    Ok(table)
}

fn read_labeled_json(contents: &str) -> TrainingResult<LabeledTable> {
    let records: Vec<Value> = if contents.trim_start().starts_with('[') {
        serde_json::from_str(contents)?
    } else {
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };

    let mut table = LabeledTable::default();
    for record in &records {
        match record {
            Value::Object(map) => {
                push_row(&mut table, map.get("text").and_then(cell_text), map.get("label").and_then(cell_text));
            }
            Value::Array(cells) => {
                push_row(&mut table, cells.first().and_then(cell_text), cells.get(1).and_then(cell_text));
            }
            _ => table.dropped += 1,
        }
    }
    Ok(table)
}

/// Writes rows as a `text,label` CSV.
pub fn write_labeled_csv(path: &Path, rows: &[LabeledText]) -> TrainingResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A headed CSV table whose last column is the prediction target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Reads a table with at least two columns and one data row.
    pub fn read(path: &Path) -> TrainingResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.len() < 2 {
            return Err(TrainingError::Assembly(format!(
                "{}: need at least one feature column and a target column",
                path.display()
            )));
        }

        let rows = reader
            .records()
            .map(|r| r.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        if rows.is_empty() {
            return Err(TrainingError::Assembly(format!("{}: table has no rows", path.display())));
        }

        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn target_column(&self) -> &str {
        self.headers.last().map_or("", String::as_str)
    }

    #[must_use]
    pub fn feature_columns(&self) -> &[String] {
        &self.headers[..self.headers.len().saturating_sub(1)]
    }

    /// Splits rows into `(train, held_out)` tables sharing this header.
    #[must_use]
    pub fn split(self, policy: &SplitPolicy) -> (Self, Self) {
        let (kept, held_out) = policy.partition(self.rows);
        (
            Self { headers: self.headers.clone(), rows: kept },
            Self { headers: self.headers, rows: held_out },
        )
    }
}
