//! REST API types for frontend integration.
//!
//! Responses are camelCase JSON. The result endpoint returns the column list
//! plus a bounded row preview; the charting collaborator consumes it as-is.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::models::{Column, ColumnType, DerivedDataset, RawDataset, Value};
use crate::profile::DatasetProfile;
use crate::transform::pipeline::Pipeline;

/// Default number of preview rows in the result endpoint.
pub const DEFAULT_PREVIEW_ROWS: usize = 50;

/// One column of a schema, as shown to the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
}

impl From<&Column> for ColumnInfo {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            ty: column.ty,
            nullable: column.nullable,
        }
    }
}

/// Response to session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
}

/// Response sent after an upload: the dataset telemetry the original
/// ingestion screen shows as KPI tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub session_id: Uuid,
    /// "ready" on success.
    pub status: String,
    pub metadata: UploadMetadata,
}

/// Metadata about the uploaded dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub fingerprint: String,
    pub format: String,
    pub encoding: Option<String>,
    pub delimiter: Option<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnInfo>,
}

impl UploadResponse {
    pub fn new(session_id: Uuid, raw: &RawDataset, profile: &DatasetProfile) -> Self {
        Self {
            session_id,
            status: "ready".to_string(),
            metadata: UploadMetadata {
                fingerprint: raw.fingerprint().to_string(),
                format: raw.source().format.to_string(),
                encoding: raw.source().encoding.clone(),
                delimiter: raw.source().delimiter.map(|d| d.to_string()),
                row_count: profile.row_count,
                column_count: profile.column_count,
                missing_cells: profile.missing_cells,
                duplicate_rows: profile.duplicate_rows,
                columns: raw.schema().columns().iter().map(ColumnInfo::from).collect(),
            },
        }
    }
}

/// One operation of the current pipeline, with its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    pub index: usize,
    pub description: String,
    pub operation: JsonValue,
}

/// The current pipeline, returned after every pipeline edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    pub operations: Vec<OperationInfo>,
}

impl From<&Pipeline> for PipelineResponse {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            operations: pipeline
                .ops()
                .iter()
                .enumerate()
                .map(|(index, op)| OperationInfo {
                    index,
                    description: op.describe(),
                    operation: serde_json::to_value(op).unwrap_or(JsonValue::Null),
                })
                .collect(),
        }
    }
}

/// Column list + bounded row preview of the derived dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    pub columns: Vec<ColumnInfo>,
    /// Total rows in the derived dataset, not the preview length.
    pub row_count: usize,
    pub rows: Vec<Vec<Value>>,
    pub truncated: bool,
}

impl ResultResponse {
    pub fn preview(dataset: &DerivedDataset, limit: usize) -> Self {
        let row_count = dataset.row_count();
        let rows: Vec<Vec<Value>> = dataset
            .table()
            .rows()
            .iter()
            .take(limit)
            .cloned()
            .collect();
        Self {
            columns: dataset
                .schema()
                .columns()
                .iter()
                .map(ColumnInfo::from)
                .collect(),
            row_count,
            truncated: rows.len() < row_count,
            rows,
        }
    }
}

/// Create a structured error body.
pub fn error_response(error: &str) -> JsonValue {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InputFormat;
    use crate::parser;
    use crate::profile::profile;

    #[test]
    fn test_upload_response_metadata() {
        let raw = parser::load_bytes(b"id,score\n1,10\n2,", InputFormat::Csv).unwrap();
        let p = profile(raw.table());
        let response = UploadResponse::new(Uuid::new_v4(), &raw, &p);

        assert_eq!(response.status, "ready");
        assert_eq!(response.metadata.row_count, 2);
        assert_eq!(response.metadata.missing_cells, 1);
        assert_eq!(response.metadata.columns.len(), 2);
        assert_eq!(response.metadata.delimiter.as_deref(), Some(","));

        // camelCase wire format
        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire["metadata"]["rowCount"].is_number());
        assert!(wire["sessionId"].is_string());
    }

    #[test]
    fn test_result_preview_truncation() {
        let raw = parser::load_bytes(b"v\n1\n2\n3\n4", InputFormat::Csv).unwrap();
        let derived = DerivedDataset::new(raw.table().clone());

        let full = ResultResponse::preview(&derived, 10);
        assert_eq!(full.rows.len(), 4);
        assert!(!full.truncated);

        let cut = ResultResponse::preview(&derived, 2);
        assert_eq!(cut.rows.len(), 2);
        assert_eq!(cut.row_count, 4);
        assert!(cut.truncated);
    }

    #[test]
    fn test_error_response_shape() {
        let body = error_response("boom");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "boom");
    }
}
