//! HTTP server for the DataNexus API.
//!
//! A thin wrapper over the session controller: every endpoint maps to one
//! controller call plus response shaping. Rendering and upload widgets are
//! external collaborators talking to these routes.
//!
//! # API Endpoints
//!
//! | Method | Path                                    | Description                     |
//! |--------|-----------------------------------------|---------------------------------|
//! | GET    | `/health`                               | Health check + cache stats      |
//! | POST   | `/api/sessions`                         | Create a session                |
//! | DELETE | `/api/sessions/{id}`                    | Tear a session down             |
//! | POST   | `/api/sessions/{id}/upload`             | Upload a CSV/XLSX file          |
//! | POST   | `/api/sessions/{id}/operations`         | Append an operation             |
//! | DELETE | `/api/sessions/{id}/operations/{index}` | Remove an operation             |
//! | PUT    | `/api/sessions/{id}/operations/{f}/{t}` | Move an operation               |
//! | POST   | `/api/sessions/{id}/reset`              | Clear the pipeline              |
//! | GET    | `/api/sessions/{id}/result`             | Derived dataset preview         |
//! | GET    | `/api/sessions/{id}/profile`            | Dataset profile                 |
//! | GET    | `/api/sessions/{id}/export`             | Download the derived dataset    |
//! | GET    | `/api/logs`                             | SSE stream of activity logs     |

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Sse},
    routing::{delete, get, post, put},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{
    error_response, PipelineResponse, ResultResponse, SessionCreatedResponse, UploadResponse,
    DEFAULT_PREVIEW_ROWS,
};
use crate::error::{ServerError, ServerResult, SessionError};
use crate::export::{self, ExportFormat};
use crate::models::InputFormat;
use crate::profile;
use crate::session::SessionManager;
use crate::validation;

type AppState = Arc<SessionManager>;

type Rejection = (StatusCode, Json<JsonValue>);

/// Start the HTTP server.
pub async fn start_server(
    port: u16,
    manager: Arc<SessionManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", delete(close_session))
        .route("/api/sessions/{id}/upload", post(upload))
        .route("/api/sessions/{id}/operations", post(append_operation))
        .route("/api/sessions/{id}/operations/{index}", delete(remove_operation))
        .route("/api/sessions/{id}/operations/{from}/{to}", put(reorder_operation))
        .route("/api/sessions/{id}/reset", post(reset_session))
        .route("/api/sessions/{id}/result", get(current_result))
        .route("/api/sessions/{id}/profile", get(dataset_profile))
        .route("/api/sessions/{id}/export", get(export_result))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(manager);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("DataNexus server running on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Map a server error to an HTTP status + structured body.
fn reject(err: ServerError) -> Rejection {
    let status = match &err {
        ServerError::BadRequest(_) | ServerError::Load(_) => StatusCode::BAD_REQUEST,
        ServerError::Session(SessionError::UnknownSession(_)) => StatusCode::NOT_FOUND,
        ServerError::Session(SessionError::NoDataset) => StatusCode::CONFLICT,
        ServerError::Session(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log_error(err.to_string());
    (status, Json(error_response(&err.to_string())))
}

/// Health check endpoint.
async fn health(State(manager): State<AppState>) -> Json<JsonValue> {
    let stats = manager.cache().stats();
    Json(json!({
        "status": "ok",
        "service": "datanexus",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": manager.session_count(),
        "cache": {
            "entries": manager.cache().len(),
            "hits": stats.hits,
            "misses": stats.misses,
            "evictions": stats.evictions,
        }
    }))
}

/// Create a new session.
async fn create_session(State(manager): State<AppState>) -> Json<SessionCreatedResponse> {
    let session_id = manager.create();
    log_info(format!("Session {} created", session_id));
    Json(SessionCreatedResponse { session_id })
}

/// Tear a session down.
async fn close_session(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Rejection> {
    if manager.remove(id) {
        log_info(format!("Session {} closed", id));
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(reject(SessionError::UnknownSession(id).into()))
    }
}

/// Upload a dataset file into a session.
async fn upload(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Rejection> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut declared_format: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        reject(ServerError::BadRequest(format!("Multipart error: {}", e)))
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| reject(ServerError::BadRequest(format!("Read error: {}", e))))?
                        .to_vec(),
                );
            }
            "format" => {
                declared_format = field.text().await.ok();
            }
            _ => {}
        }
    }

    let bytes =
        file_data.ok_or_else(|| reject(ServerError::BadRequest("No file provided".into())))?;

    let format = resolve_format(file_name.as_deref(), declared_format.as_deref())
        .map_err(reject)?;

    let response = manager
        .with_session(id, |session| -> ServerResult<UploadResponse> {
            let raw = session.upload(&bytes, format)?;
            let stats = profile::profile(raw.table());
            Ok(UploadResponse::new(id, raw, &stats))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    log_success(format!(
        "Upload into {}: {} rows x {} columns ({})",
        id,
        response.metadata.row_count,
        response.metadata.column_count,
        file_name.as_deref().unwrap_or("unnamed"),
    ));

    Ok(Json(response))
}

/// Map the file name extension, or the declared format field, to a format.
fn resolve_format(
    file_name: Option<&str>,
    declared: Option<&str>,
) -> Result<InputFormat, ServerError> {
    if let Some(declared) = declared {
        return match declared.to_ascii_lowercase().as_str() {
            "csv" => Ok(InputFormat::Csv),
            "xlsx" => Ok(InputFormat::Xlsx),
            other => Err(ServerError::BadRequest(format!(
                "unsupported format '{}'",
                other
            ))),
        };
    }
    file_name
        .and_then(InputFormat::from_file_name)
        .ok_or_else(|| {
            ServerError::BadRequest("cannot determine file format, expected .csv or .xlsx".into())
        })
}

/// Append an operation to the session's pipeline.
///
/// The body is one operation object; it is checked against the pipeline
/// schema before construction, then validated against the current derived
/// schema by the session controller.
async fn append_operation(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<JsonValue>,
) -> Result<Json<PipelineResponse>, Rejection> {
    let mut ops = validation::parse_pipeline_definition(&json!([body]))
        .map_err(|errors| reject(ServerError::BadRequest(errors.join("; "))))?;
    let op = ops
        .pop()
        .ok_or_else(|| reject(ServerError::BadRequest("no operation provided".into())))?;

    let response = manager
        .with_session(id, |session| -> ServerResult<PipelineResponse> {
            let description = op.describe();
            session.append_operation(op)?;
            log_info(format!("Session {}: + {}", id, description));
            Ok(PipelineResponse::from(session.pipeline()))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    Ok(Json(response))
}

/// Remove the operation at an index.
async fn remove_operation(
    State(manager): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<PipelineResponse>, Rejection> {
    let response = manager
        .with_session(id, |session| -> ServerResult<PipelineResponse> {
            let removed = session.remove_operation(index)?;
            log_info(format!("Session {}: - {}", id, removed.describe()));
            Ok(PipelineResponse::from(session.pipeline()))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    Ok(Json(response))
}

/// Move an operation from one position to another.
async fn reorder_operation(
    State(manager): State<AppState>,
    Path((id, from, to)): Path<(Uuid, usize, usize)>,
) -> Result<Json<PipelineResponse>, Rejection> {
    let response = manager
        .with_session(id, |session| -> ServerResult<PipelineResponse> {
            session.reorder(from, to)?;
            log_info(format!("Session {}: moved {} -> {}", id, from, to));
            Ok(PipelineResponse::from(session.pipeline()))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    Ok(Json(response))
}

/// Discard all operations, keeping the dataset.
async fn reset_session(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineResponse>, Rejection> {
    let response = manager
        .with_session(id, |session| {
            session.reset();
            log_info(format!("Session {}: pipeline reset", id));
            PipelineResponse::from(session.pipeline())
        })
        .map_err(|e| reject(ServerError::Session(e)))?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct PreviewParams {
    limit: Option<usize>,
}

/// Column list + bounded row preview of the current derived dataset.
async fn current_result(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<ResultResponse>, Rejection> {
    let limit = params.limit.unwrap_or(DEFAULT_PREVIEW_ROWS);

    let response = manager
        .with_session(id, |session| -> ServerResult<ResultResponse> {
            let result = session.current_result()?;
            Ok(ResultResponse::preview(&result, limit))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    Ok(Json(response))
}

/// Profile of the current derived dataset.
async fn dataset_profile(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<profile::DatasetProfile>, Rejection> {
    let response = manager
        .with_session(id, |session| -> ServerResult<profile::DatasetProfile> {
            let result = session.current_result()?;
            Ok(profile::profile(result.table()))
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    format: Option<String>,
}

/// Download the current derived dataset.
async fn export_result(
    State(manager): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, Rejection> {
    let format: ExportFormat = params
        .format
        .as_deref()
        .unwrap_or("csv")
        .parse()
        .map_err(|e: String| reject(ServerError::BadRequest(e)))?;

    let bytes = manager
        .with_session(id, |session| -> ServerResult<Vec<u8>> {
            let result = session.current_result()?;
            Ok(export::serialize(&result, format)?)
        })
        .map_err(|e| reject(e.into()))?
        .map_err(reject)?;

    log_success(format!("Session {}: exported {} bytes", id, bytes.len()));

    let disposition = format!("attachment; filename=\"datanexus.{}\"", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// SSE endpoint for real-time activity streaming.
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let json = serde_json::to_string(&event).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format_prefers_declared_field() {
        assert_eq!(
            resolve_format(Some("data.csv"), Some("xlsx")).unwrap(),
            InputFormat::Xlsx
        );
        assert_eq!(resolve_format(Some("data.csv"), None).unwrap(), InputFormat::Csv);
        assert!(resolve_format(Some("data.bin"), None).is_err());
        assert!(resolve_format(None, None).is_err());
        assert!(resolve_format(None, Some("parquet")).is_err());
    }
}
