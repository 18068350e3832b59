//! Dataset ingestion with encoding and delimiter auto-detection.
//!
//! Turns CSV or XLSX bytes into an immutable [`RawDataset`] with an inferred,
//! typed schema and an eagerly computed content fingerprint. Large inputs can
//! be read through [`load_reader`] in bounded-size chunks to cap peak read
//! memory; chunking never affects the parsed output or the fingerprint.

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;

use crate::error::{LoadError, LoadResult};
use crate::models::{Column, ColumnType, InputFormat, RawDataset, Schema, SourceInfo, Table, Value};

/// Default read-chunk size: 16 MiB, well under typical available memory.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Ingestion tuning knobs.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Size of each read chunk in bytes for [`load_reader`].
    pub chunk_size: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Detect the text encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the detected encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> LoadResult<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Ok(s),
            Err(_) => Ok(String::from_utf8_lossy(bytes).to_string()),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            Ok(encoding_rs::ISO_8859_15.decode(bytes).0.to_string())
        }
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.to_string()),
        _ => Ok(String::from_utf8_lossy(bytes).to_string()),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Load a raw dataset from in-memory bytes.
///
/// The fingerprint is computed eagerly over the raw bytes plus the inferred
/// schema, so cache keys are stable before any transform runs.
pub fn load_bytes(bytes: &[u8], format: InputFormat) -> LoadResult<RawDataset> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(bytes);
    build_dataset(bytes, format, hasher)
}

/// Load a raw dataset from a reader, consuming it in bounded-size chunks.
///
/// Each chunk is fed to the fingerprint hasher as it arrives and appended to
/// the reassembled buffer; only the chunk size bounds the read buffer, the
/// resulting dataset is identical to [`load_bytes`] over the same bytes.
pub fn load_reader<R: Read>(
    mut reader: R,
    format: InputFormat,
    options: &LoadOptions,
) -> LoadResult<RawDataset> {
    let chunk_size = options.chunk_size.max(1);
    let mut hasher = blake3::Hasher::new();
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; chunk_size];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
        bytes.extend_from_slice(&chunk[..n]);
    }

    build_dataset(&bytes, format, hasher)
}

/// Load a raw dataset from a file path, mapping the extension to a format.
pub fn load_path<P: AsRef<Path>>(path: P, options: &LoadOptions) -> LoadResult<RawDataset> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = InputFormat::from_file_name(name)
        .ok_or_else(|| LoadError::UnsupportedFormat(name.to_string()))?;

    let file = std::fs::File::open(path)?;
    load_reader(file, format, options)
}

/// Parse bytes, infer the schema and seal the fingerprint.
fn build_dataset(
    bytes: &[u8],
    format: InputFormat,
    mut hasher: blake3::Hasher,
) -> LoadResult<RawDataset> {
    let (headers, cells, source) = match format {
        InputFormat::Csv => parse_csv_cells(bytes)?,
        InputFormat::Xlsx => parse_xlsx_cells(bytes)?,
    };

    let table = infer_table(headers, cells)?;

    // Schema participates in the fingerprint: same bytes, different inference
    // rules must never collide.
    hasher.update(table.schema().describe().as_bytes());
    let fingerprint = hasher.finalize().to_hex().to_string();

    Ok(RawDataset::new(table, fingerprint, source))
}

/// Split CSV bytes into headers and raw string cells.
///
/// Empty lines are skipped; short rows are padded with missing cells; extra
/// cells beyond the header width are ignored.
fn parse_csv_cells(
    bytes: &[u8],
) -> LoadResult<(Vec<String>, Vec<Vec<Option<String>>>, SourceInfo)> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    let mut lines = content.lines();

    let header_line = lines.next().ok_or(LoadError::EmptyFile)?;
    if header_line.trim().is_empty() {
        return Err(LoadError::EmptyFile);
    }

    let headers: Vec<String> = header_line
        .split(delimiter)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        let cells: Vec<Option<String>> = line
            .split(delimiter)
            .map(|s| {
                let cell = s.trim().trim_matches('"');
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();

        let mut row = cells;
        row.resize(headers.len(), None);
        rows.push(row);
    }

    let source = SourceInfo {
        format: InputFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
    };
    Ok((headers, rows, source))
}

/// Read the first worksheet of an XLSX workbook into headers and string cells.
///
/// Cells are normalized to their textual form and run through the same type
/// inference as CSV, so both formats produce identical tables for identical
/// content. Date cells surface as Excel serial numbers.
fn parse_xlsx_cells(
    bytes: &[u8],
) -> LoadResult<(Vec<String>, Vec<Vec<Option<String>>>, SourceInfo)> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| LoadError::Parse(format!("cannot open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first_sheet = sheet_names.first().ok_or(LoadError::EmptyFile)?;

    let range = workbook
        .worksheet_range(first_sheet)
        .map_err(|e| LoadError::Parse(format!("cannot read sheet '{}': {}", first_sheet, e)))?;

    let mut row_iter = range.rows();
    let header_row = row_iter.next().ok_or(LoadError::EmptyFile)?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_to_string(cell).unwrap_or_default())
        .collect();

    let mut rows = Vec::new();
    for row in row_iter {
        let mut cells: Vec<Option<String>> = row.iter().map(cell_to_string).collect();
        cells.resize(headers.len(), None);

        // Trailing all-empty rows are common in exported workbooks.
        if cells.iter().all(|c| c.is_none()) {
            continue;
        }
        rows.push(cells);
    }

    let source = SourceInfo {
        format: InputFormat::Xlsx,
        encoding: None,
        delimiter: None,
    };
    Ok((headers, rows, source))
}

fn cell_to_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.trim().to_string(),
        Data::DurationIso(s) => s.trim().to_string(),
        Data::Error(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Infer per-column types over raw string cells and build the typed table.
pub(crate) fn infer_table(
    headers: Vec<String>,
    cells: Vec<Vec<Option<String>>>,
) -> LoadResult<Table> {
    if headers.is_empty() {
        return Err(LoadError::EmptyFile);
    }

    for (i, name) in headers.iter().enumerate() {
        if name.is_empty() {
            return Err(LoadError::Parse(format!("empty column name at position {}", i + 1)));
        }
        if headers[..i].contains(name) {
            return Err(LoadError::Parse(format!("duplicate column name '{}'", name)));
        }
    }

    let column_types: Vec<ColumnType> = (0..headers.len())
        .map(|col| infer_column_type(cells.iter().map(|row| row[col].as_deref())))
        .collect();

    let columns: Vec<Column> = headers
        .iter()
        .zip(&column_types)
        .enumerate()
        .map(|(col, (name, ty))| {
            let nullable = cells.iter().any(|row| row[col].is_none());
            Column::new(name.clone(), *ty, nullable)
        })
        .collect();

    let rows: Vec<Vec<Value>> = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&column_types)
                .map(|(cell, ty)| match cell {
                    None => Value::Null,
                    Some(text) => typed_value(text, *ty),
                })
                .collect()
        })
        .collect();

    Ok(Table::new(Schema::new(columns), rows))
}

/// Pick the narrowest type every non-missing cell of a column fits.
///
/// Precedence: numeric, boolean, temporal (ISO dates), else text. A column
/// with no non-missing cells stays text.
fn infer_column_type<'a, I: Iterator<Item = Option<&'a str>> + Clone>(cells: I) -> ColumnType {
    let mut non_null = cells.clone().flatten().peekable();
    if non_null.peek().is_none() {
        return ColumnType::Text;
    }

    if cells.clone().flatten().all(|c| parse_number(c).is_some()) {
        ColumnType::Numeric
    } else if cells.clone().flatten().all(|c| parse_bool(c).is_some()) {
        ColumnType::Boolean
    } else if cells.flatten().all(|c| parse_date(c).is_some()) {
        ColumnType::Temporal
    } else {
        ColumnType::Text
    }
}

fn typed_value(text: &str, ty: ColumnType) -> Value {
    match ty {
        ColumnType::Numeric => parse_number(text).map(Value::Number).unwrap_or(Value::Null),
        ColumnType::Boolean => parse_bool(text).map(Value::Bool).unwrap_or(Value::Null),
        ColumnType::Temporal => parse_date(text).map(Value::Temporal).unwrap_or(Value::Null),
        ColumnType::Text => Value::Text(text.to_string()),
    }
}

/// Finite numbers only: "NaN" and "inf" parse as f64 but are not data.
fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// ISO dates only, per the inference contract.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let csv = "name,age\nAlice,30\nBob,25";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();

        let schema = dataset.schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.column("name").unwrap().ty, ColumnType::Text);
        assert_eq!(schema.column("age").unwrap().ty, ColumnType::Numeric);
        assert_eq!(dataset.table().row_count(), 2);
        assert_eq!(dataset.table().rows()[0][1], Value::Number(30.0));
    }

    #[test]
    fn test_semicolon_delimiter_detected() {
        let csv = "a;b;c\n1;2;3";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();
        assert_eq!(dataset.source().delimiter, Some(';'));
        assert_eq!(dataset.schema().len(), 3);
    }

    #[test]
    fn test_detect_delimiter_variants() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
    }

    #[test]
    fn test_missing_values_set_nullable() {
        let csv = "id,score\n1,10\n2,\n3,30";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();

        let score = dataset.schema().column("score").unwrap();
        assert_eq!(score.ty, ColumnType::Numeric);
        assert!(score.nullable);
        assert_eq!(dataset.table().rows()[1][1], Value::Null);
    }

    #[test]
    fn test_boolean_and_temporal_inference() {
        let csv = "flag,when\ntrue,2024-01-01\nFALSE,2024-02-29";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();

        assert_eq!(dataset.schema().column("flag").unwrap().ty, ColumnType::Boolean);
        assert_eq!(dataset.schema().column("when").unwrap().ty, ColumnType::Temporal);
        assert_eq!(dataset.table().rows()[1][0], Value::Bool(false));
    }

    #[test]
    fn test_mixed_column_falls_back_to_text() {
        let csv = "v\n1\nhello";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();
        assert_eq!(dataset.schema().column("v").unwrap().ty, ColumnType::Text);
        assert_eq!(dataset.table().rows()[0][0], Value::Text("1".into()));
    }

    #[test]
    fn test_nan_text_is_not_numeric() {
        let csv = "v\n1\nNaN";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();
        assert_eq!(dataset.schema().column("v").unwrap().ty, ColumnType::Text);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let csv = "a,b\n1,2\n\n3,4\n";
        let dataset = load_bytes(csv.as_bytes(), InputFormat::Csv).unwrap();
        assert_eq!(dataset.table().row_count(), 2);
    }

    #[test]
    fn test_empty_csv_fails() {
        let result = load_bytes(b"", InputFormat::Csv);
        assert!(matches!(result, Err(LoadError::EmptyFile)));
    }

    #[test]
    fn test_header_only_is_valid() {
        let dataset = load_bytes(b"a,b", InputFormat::Csv).unwrap();
        assert_eq!(dataset.schema().len(), 2);
        assert_eq!(dataset.table().row_count(), 0);
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let result = load_bytes(b"a,a\n1,2", InputFormat::Csv);
        assert!(matches!(result, Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_fingerprint_stable_across_loads() {
        let csv = b"id,score\n1,10\n2,20";
        let a = load_bytes(csv, InputFormat::Csv).unwrap();
        let b = load_bytes(csv, InputFormat::Csv).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_on_content() {
        let a = load_bytes(b"id\n1", InputFormat::Csv).unwrap();
        let b = load_bytes(b"id\n2", InputFormat::Csv).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_chunked_reader_matches_load_bytes() {
        let csv = b"id,name\n1,Alice\n2,Bob\n3,Carol";
        let whole = load_bytes(csv, InputFormat::Csv).unwrap();

        // Tiny chunks: many reads, identical dataset and fingerprint.
        let options = LoadOptions { chunk_size: 3 };
        let chunked = load_reader(&csv[..], InputFormat::Csv, &options).unwrap();

        assert_eq!(whole.fingerprint(), chunked.fingerprint());
        assert_eq!(whole.table(), chunked.table());
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert!(decoded.contains("Soci"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.parquet");
        std::fs::write(&path, b"whatever").unwrap();

        let result = load_path(&path, &LoadOptions::default());
        assert!(matches!(result, Err(LoadError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_path_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, b"id,v\n1,2\n3,4").unwrap();

        let dataset = load_path(&path, &LoadOptions::default()).unwrap();
        assert_eq!(dataset.table().row_count(), 2);
        assert_eq!(dataset.source().format, InputFormat::Csv);
    }
}
