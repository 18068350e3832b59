//! Domain models: values, columns, schemas, tables, datasets.
//!
//! A [`RawDataset`] is the immutable table created once per upload, identified
//! by a content fingerprint. A [`DerivedDataset`] is the table obtained by
//! running a pipeline over a raw dataset; it is never owned independently,
//! only held by the result cache and handed out behind `Arc`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;

/// A single cell value.
///
/// `Number` is always finite: the parser refuses to infer NaN or infinities,
/// so derived equality is well-behaved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Temporal(NaiveDate),
    Text(String),
}

impl Value {
    /// The column type this value belongs to, or `None` for `Null`.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(_) => Some(ColumnType::Numeric),
            Value::Temporal(_) => Some(ColumnType::Temporal),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value can live in a column of the given type.
    /// `Null` is compatible with every type.
    pub fn matches(&self, ty: ColumnType) -> bool {
        match self.column_type() {
            None => true,
            Some(t) => t == ty,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// Stable textual form, used for describe strings, CSV export and
    /// row/cell keys. `Null` renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Temporal(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Inferred type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Text,
    Temporal,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Temporal => write!(f, "temporal"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A named, typed column. Names are unique within a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable,
        }
    }
}

/// An ordered list of columns with by-name lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Stable one-line description, part of the dataset fingerprint.
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|c| {
                let null_mark = if c.nullable { "?" } else { "" };
                format!("{}:{}{}", c.name, c.ty, null_mark)
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A rectangular table: every row has exactly `schema.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: Schema,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == schema.len()));
        Self { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column cells by index, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Rows as JSON objects keyed by column name, for CLI output and
    /// debugging. The rendering layer uses the array form instead.
    pub fn to_json_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (col, cell) in self.schema.columns().iter().zip(row) {
                    obj.insert(
                        col.name.clone(),
                        serde_json::to_value(cell).unwrap_or(serde_json::Value::Null),
                    );
                }
                serde_json::Value::Object(obj)
            })
            .collect()
    }

    /// Rough in-memory footprint, used for cache accounting.
    pub fn approximate_bytes(&self) -> usize {
        let cell_bytes: usize = self
            .rows
            .iter()
            .flat_map(|row| row.iter())
            .map(|v| match v {
                Value::Null => 1,
                Value::Bool(_) => 1,
                Value::Number(_) => 8,
                Value::Temporal(_) => 4,
                Value::Text(s) => 24 + s.len(),
            })
            .sum();
        let header_bytes: usize = self.schema.columns().iter().map(|c| 16 + c.name.len()).sum();
        cell_bytes + header_bytes
    }
}

/// Where the raw bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Xlsx,
}

impl InputFormat {
    /// Map a file name to a format by extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Csv => write!(f, "csv"),
            InputFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Parsing metadata carried alongside a raw dataset for display purposes.
/// Not part of the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub format: InputFormat,
    /// Detected text encoding (CSV only).
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only).
    pub delimiter: Option<char>,
}

/// The immutable table created once per upload.
///
/// Identified by a content fingerprint over the raw bytes and the inferred
/// schema, computed eagerly at load time so cache keys are stable before any
/// transform runs. Never mutated; replaced wholesale on a new upload.
#[derive(Debug, Clone)]
pub struct RawDataset {
    table: Table,
    fingerprint: String,
    source: SourceInfo,
}

impl RawDataset {
    pub fn new(table: Table, fingerprint: String, source: SourceInfo) -> Self {
        Self {
            table,
            fingerprint,
            source,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }
}

/// The table obtained by applying a pipeline to a raw dataset.
///
/// Always a pure function of (raw dataset, pipeline); cached by
/// (fingerprint, pipeline hash) and shared behind `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDataset {
    table: Table,
    approximate_bytes: usize,
}

impl DerivedDataset {
    pub fn new(table: Table) -> Self {
        let approximate_bytes = table.approximate_bytes();
        Self {
            table,
            approximate_bytes,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn schema(&self) -> &Schema {
        self.table.schema()
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    pub fn approximate_bytes(&self) -> usize {
        self.approximate_bytes
    }

    /// Row iterator for the rendering boundary.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.table.rows().iter().map(|r| r.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Numeric, false),
            Column::new("name", ColumnType::Text, true),
        ])
    }

    #[test]
    fn test_schema_lookup() {
        let schema = sample_schema();
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.column("id").unwrap().ty, ColumnType::Numeric);
    }

    #[test]
    fn test_schema_describe_is_stable() {
        let schema = sample_schema();
        assert_eq!(schema.describe(), "id:numeric,name:text?");
        assert_eq!(schema.describe(), sample_schema().describe());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(
            Value::Temporal(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()).to_string(),
            "2024-03-15"
        );
    }

    #[test]
    fn test_value_matches_type() {
        assert!(Value::Null.matches(ColumnType::Numeric));
        assert!(Value::Number(1.0).matches(ColumnType::Numeric));
        assert!(!Value::Text("a".into()).matches(ColumnType::Numeric));
    }

    #[test]
    fn test_table_json_records() {
        let table = Table::new(
            sample_schema(),
            vec![
                vec![Value::Number(1.0), Value::Text("Alice".into())],
                vec![Value::Number(2.0), Value::Null],
            ],
        );
        let records = table.to_json_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Alice");
        assert_eq!(records[1]["name"], serde_json::Value::Null);
    }

    #[test]
    fn test_derived_dataset_tracks_size() {
        let table = Table::new(
            sample_schema(),
            vec![vec![Value::Number(1.0), Value::Text("Alice".into())]],
        );
        let derived = DerivedDataset::new(table);
        assert_eq!(derived.row_count(), 1);
        assert!(derived.approximate_bytes() > 0);
    }

    #[test]
    fn test_input_format_from_file_name() {
        assert_eq!(InputFormat::from_file_name("data.csv"), Some(InputFormat::Csv));
        assert_eq!(InputFormat::from_file_name("Data.XLSX"), Some(InputFormat::Xlsx));
        assert_eq!(InputFormat::from_file_name("data.parquet"), None);
    }
}
