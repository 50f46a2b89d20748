//! # Sheetport - declarative tabular record export
//!
//! Sheetport compiles JSON records into download-ready documents: CSV
//! lines in a legacy Windows encoding, or binary .xls workbooks (BIFF8
//! inside an OLE2 container) that old Excel versions open natively.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Records    │────▶│  Registry   │────▶│  Transform  │────▶│  CSV / XLS  │
//! │  (JSON)     │     │ (procedures)│     │  (per cell) │     │ (attachment)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetport::{CellType, ColumnProcedure, CsvExporter, ExportConfig, HeaderSpec};
//!
//! let mut config = ExportConfig::new("Users");
//! config.header = HeaderSpec::from_labels(&["Name", "Email"]);
//! config.procedures = vec![
//!     ColumnProcedure::new("A", "extractName", CellType::String),
//!     ColumnProcedure::new("B", "extractEmail", CellType::String),
//! ];
//! config.registry.register_field("extractName", "name");
//! config.registry.register_field("extractEmail", "email");
//!
//! let bytes = CsvExporter::new(config).try_output(&records)?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (CellType, CellAddress, HeaderSpec)
//! - [`registry`] - Transform registry and export configuration
//! - [`transform`] - Per-cell transform execution
//! - [`csv`] - CSV serialization and Windows normalization
//! - [`document`] - Binary .xls document builder
//! - [`export`] - Exporter facade
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Configuration
pub mod registry;

// Transformation
pub mod transform;

// Serialization
pub mod csv;
pub mod document;

// Facade
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    CsvError,
    DocumentError,
    ExportError,
    ServerError,
    TransformError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CellAddress,
    CellType,
    DocumentMetadata,
    HeaderSpec,
    Record,
};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{
    ColumnProcedure,
    ExportConfig,
    Transform,
    TransformRegistry,
};

// =============================================================================
// Re-exports - CSV
// =============================================================================

pub use csv::{
    serialize_row,
    windows_encode,
    windows_normalize,
    DEFAULT_LEGACY_ENCODING,
};

// =============================================================================
// Re-exports - Document
// =============================================================================

pub use document::DocumentBuilder;

// =============================================================================
// Re-exports - Export facade
// =============================================================================

pub use export::{
    CsvExporter,
    ExcelExporter,
    ExporterCatalog,
    FileExporter,
};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, CatalogResponse};

// Server
pub mod server {
    pub use crate::api::server::{respond_as_csv, respond_as_excel, start_server};
}
