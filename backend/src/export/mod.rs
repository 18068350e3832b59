//! Export boundary: serialize a derived dataset to downloadable bytes.
//!
//! Pure formatting, no side effects on the data model. CSV goes through the
//! `csv` crate writer; XLSX is built in memory with `rust_xlsxwriter`.

use std::str::FromStr;

use rust_xlsxwriter::Workbook;

use crate::error::{ExportError, ExportResult};
use crate::models::{DerivedDataset, Table, Value};

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

/// Serialize a derived dataset.
pub fn serialize(dataset: &DerivedDataset, format: ExportFormat) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Csv => to_csv(dataset.table()),
        ExportFormat::Xlsx => to_xlsx(dataset.table()),
    }
}

/// RFC-4180 CSV, UTF-8, header row first, missing cells as empty fields.
fn to_csv(table: &Table) -> ExportResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    writer.write_record(table.schema().names())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Single-worksheet workbook with typed cells; missing cells stay blank,
/// temporal cells are written as ISO text.
fn to_xlsx(table: &Table) -> ExportResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in table.schema().names().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match cell {
                Value::Null => {}
                Value::Number(n) => {
                    worksheet.write_number(r, c, *n)?;
                }
                Value::Bool(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                Value::Temporal(d) => {
                    worksheet.write_string(r, c, d.format("%Y-%m-%d").to_string())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputFormat;
    use crate::parser;

    fn dataset() -> DerivedDataset {
        let raw = parser::load_bytes(b"id,name,score\n1,Alice,10\n2,Bob,", InputFormat::Csv).unwrap();
        DerivedDataset::new(raw.table().clone())
    }

    #[test]
    fn test_csv_round_shape() {
        let bytes = serialize(&dataset(), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "id,name,score\n1,Alice,10\n2,Bob,\n");
    }

    #[test]
    fn test_csv_quotes_embedded_delimiters() {
        let raw =
            parser::load_bytes(b"name;note\nAlice;\"a, b\"", InputFormat::Csv).unwrap();
        let bytes =
            serialize(&DerivedDataset::new(raw.table().clone()), ExportFormat::Csv).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"a, b\""));
    }

    #[test]
    fn test_xlsx_is_nonempty_zip() {
        let bytes = serialize(&dataset(), ExportFormat::Xlsx).unwrap();
        // XLSX is a ZIP container: PK magic.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_serialize_is_pure() {
        let d = dataset();
        let a = serialize(&d, ExportFormat::Csv).unwrap();
        let b = serialize(&d, ExportFormat::Csv).unwrap();
        assert_eq!(a, b);
        assert_eq!(d.row_count(), 2);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("parquet".parse::<ExportFormat>().is_err());
    }
}
