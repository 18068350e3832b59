//! Dataset profiling: telemetry, per-column statistics, correlations.
//!
//! Pure functions over a table; the rendering collaborator turns these
//! numbers into KPI tiles and charts. Profiling a derived dataset twice
//! yields identical output.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::{ColumnType, Table, Value};

/// Headline numbers plus per-column detail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    /// Total missing cells across the table.
    pub missing_cells: usize,
    /// Rows that duplicate an earlier row, first occurrences not counted.
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnProfile>,
    /// Column count per type, for the type-distribution chart.
    pub type_counts: BTreeMap<String, usize>,
    /// Pearson correlations over numeric columns; `None` with fewer than two.
    pub correlation: Option<CorrelationMatrix>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
    pub missing: usize,
    pub distinct: usize,
    /// Present for numeric columns with at least one value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major, aligned with `columns`; diagonal is 1.
    pub values: Vec<Vec<f64>>,
}

/// Profile a table.
pub fn profile(table: &Table) -> DatasetProfile {
    let row_count = table.row_count();
    let column_count = table.schema().len();

    let mut missing_cells = 0;
    let mut columns = Vec::with_capacity(column_count);
    let mut type_counts: BTreeMap<String, usize> = BTreeMap::new();

    for (idx, column) in table.schema().columns().iter().enumerate() {
        let mut missing = 0;
        let mut distinct: HashSet<String> = HashSet::new();
        for cell in table.column_values(idx) {
            if cell.is_null() {
                missing += 1;
            } else {
                distinct.insert(cell_key(cell));
            }
        }
        missing_cells += missing;
        *type_counts.entry(column.ty.to_string()).or_default() += 1;

        let numeric = if column.ty == ColumnType::Numeric {
            numeric_summary(table.column_values(idx).filter_map(Value::as_number))
        } else {
            None
        };

        columns.push(ColumnProfile {
            name: column.name.clone(),
            ty: column.ty,
            nullable: column.nullable,
            missing,
            distinct: distinct.len(),
            numeric,
        });
    }

    DatasetProfile {
        row_count,
        column_count,
        missing_cells,
        duplicate_rows: duplicate_rows(table),
        columns,
        type_counts,
        correlation: correlation_matrix(table),
    }
}

/// Cells keyed by type tag + canonical text, so `Null`, empty text and the
/// number 0 never collide.
fn cell_key(value: &Value) -> String {
    match value {
        Value::Null => "_".to_string(),
        Value::Bool(b) => format!("b:{}", b),
        Value::Number(n) => format!("n:{}", n.to_bits()),
        Value::Temporal(d) => format!("d:{}", d),
        Value::Text(s) => format!("t:{}", s),
    }
}

fn duplicate_rows(table: &Table) -> usize {
    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates = 0;
    for row in table.rows() {
        let key = row
            .iter()
            .map(cell_key)
            .collect::<Vec<_>>()
            .join("\u{1f}");
        if !seen.insert(key) {
            duplicates += 1;
        }
    }
    duplicates
}

fn numeric_summary(values: impl Iterator<Item = f64>) -> Option<NumericSummary> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    Some(NumericSummary {
        min,
        max,
        mean,
        std: variance.sqrt(),
    })
}

fn correlation_matrix(table: &Table) -> Option<CorrelationMatrix> {
    let numeric: Vec<(usize, String)> = table
        .schema()
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.ty == ColumnType::Numeric)
        .map(|(i, c)| (i, c.name.clone()))
        .collect();

    if numeric.len() < 2 {
        return None;
    }

    let values: Vec<Vec<f64>> = numeric
        .iter()
        .map(|(a, _)| {
            numeric
                .iter()
                .map(|(b, _)| pearson(table, *a, *b))
                .collect()
        })
        .collect();

    Some(CorrelationMatrix {
        columns: numeric.into_iter().map(|(_, name)| name).collect(),
        values,
    })
}

/// Pairwise-complete Pearson correlation; rows with a missing cell in either
/// column are skipped. Undefined correlations (constant column, fewer than
/// two complete pairs) report 0; the diagonal is exactly 1.
fn pearson(table: &Table, a: usize, b: usize) -> f64 {
    if a == b {
        return 1.0;
    }

    let pairs: Vec<(f64, f64)> = table
        .rows()
        .iter()
        .filter_map(|row| Some((row[a].as_number()?, row[b].as_number()?)))
        .collect();

    if pairs.len() < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        cov / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputFormat;
    use crate::parser;

    fn table() -> Table {
        parser::load_bytes(
            b"id,score,city\n1,10,NY\n2,,LA\n3,30,NY\n1,10,NY",
            InputFormat::Csv,
        )
        .unwrap()
        .table()
        .clone()
    }

    #[test]
    fn test_headline_counts() {
        let p = profile(&table());
        assert_eq!(p.row_count, 4);
        assert_eq!(p.column_count, 3);
        assert_eq!(p.missing_cells, 1);
        assert_eq!(p.duplicate_rows, 1);
    }

    #[test]
    fn test_column_profiles() {
        let p = profile(&table());
        let score = p.columns.iter().find(|c| c.name == "score").unwrap();
        assert_eq!(score.missing, 1);
        assert_eq!(score.distinct, 2);

        let stats = score.numeric.as_ref().unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert!((stats.mean - 50.0 / 3.0).abs() < 1e-9);

        let city = p.columns.iter().find(|c| c.name == "city").unwrap();
        assert!(city.numeric.is_none());
        assert_eq!(city.distinct, 2);
    }

    #[test]
    fn test_type_counts() {
        let p = profile(&table());
        assert_eq!(p.type_counts.get("numeric"), Some(&2));
        assert_eq!(p.type_counts.get("text"), Some(&1));
    }

    #[test]
    fn test_correlation_perfectly_linear() {
        let t = parser::load_bytes(b"x,y\n1,2\n2,4\n3,6", InputFormat::Csv)
            .unwrap()
            .table()
            .clone();
        let matrix = profile(&t).correlation.unwrap();
        assert_eq!(matrix.columns, vec!["x", "y"]);
        assert!((matrix.values[0][1] - 1.0).abs() < 1e-9);
        assert_eq!(matrix.values[0][0], 1.0);
    }

    #[test]
    fn test_correlation_skips_incomplete_pairs() {
        let t = parser::load_bytes(b"x,y\n1,2\n2,\n3,6", InputFormat::Csv)
            .unwrap()
            .table()
            .clone();
        let matrix = profile(&t).correlation.unwrap();
        // Computed over the two complete pairs only.
        assert!((matrix.values[0][1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_correlation_for_single_numeric_column() {
        let t = parser::load_bytes(b"x,name\n1,a\n2,b", InputFormat::Csv)
            .unwrap()
            .table()
            .clone();
        assert!(profile(&t).correlation.is_none());
    }

    #[test]
    fn test_profile_is_deterministic() {
        let t = table();
        let a = serde_json::to_string(&profile(&t)).unwrap();
        let b = serde_json::to_string(&profile(&t)).unwrap();
        assert_eq!(a, b);
    }
}
