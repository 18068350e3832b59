//! # DataNexus - deterministic cleaning pipelines for tabular data
//!
//! DataNexus turns an immutable uploaded dataset plus an ordered list of
//! no-code operations into a deterministic cleaned dataset, memoizing results
//! by content so repeated interaction never recomputes unchanged state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│  Pipeline   │────▶│   Derived   │
//! │   (bytes)   │     │ (fingerprnt)│     │ (via cache) │     │   dataset   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                               ▲
//!                                        ┌──────┴──────┐
//!                                        │   Session   │
//!                                        │ (op edits)  │
//!                                        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use datanexus::{parser, transform::{Operation, FillStrategy, pipeline}, InputFormat};
//!
//! let raw = parser::load_bytes(b"id,score\n1,10\n2,\n3,30", InputFormat::Csv).unwrap();
//! let ops = vec![Operation::FillMissing {
//!     column: "score".into(),
//!     strategy: FillStrategy::Mean,
//! }];
//! let derived = pipeline::run(&raw, &ops).unwrap();
//! assert_eq!(derived.row_count(), 3);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Value, Table, RawDataset, DerivedDataset)
//! - [`parser`] - Ingestion with encoding/delimiter auto-detection
//! - [`transform`] - The operation registry and pipeline engine
//! - [`cache`] - Content-addressed LRU result cache
//! - [`session`] - Per-user session state and the session manager
//! - [`profile`] - Dataset profiling (telemetry, statistics, correlations)
//! - [`export`] - CSV/XLSX serialization
//! - [`validation`] - JSON Schema validation of pipeline definitions
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Ingestion
pub mod parser;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// Session state
pub mod session;

// Profiling
pub mod profile;

// Export
pub mod export;

// Validation
pub mod validation;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ApplyError, ApplyErrorKind, ExportError, LoadError, OpError, PipelineError, ServerError,
    SessionError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Column, ColumnType, DerivedDataset, InputFormat, RawDataset, Schema, SourceInfo, Table, Value,
};

// =============================================================================
// Re-exports - Ingestion
// =============================================================================

pub use parser::{load_bytes, load_path, load_reader, LoadOptions};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    operations_description,
    ops::{FillStrategy, Operation, Predicate},
    pipeline::{run, Pipeline},
};

// =============================================================================
// Re-exports - Cache
// =============================================================================

pub use cache::{CacheConfig, CacheKey, CacheStats, ResultCache};

// =============================================================================
// Re-exports - Session
// =============================================================================

pub use session::{SessionManager, SessionState};

// =============================================================================
// Re-exports - Profiling
// =============================================================================

pub use profile::{profile, DatasetProfile};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{serialize, ExportFormat};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, ResultResponse, UploadResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
