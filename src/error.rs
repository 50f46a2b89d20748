//! Error types for the sheetport export pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ConfigError`] - export configuration errors
//! - [`TransformError`] - column procedure execution errors
//! - [`CsvError`] - CSV serialization and transcoding errors
//! - [`DocumentError`] - spreadsheet document assembly errors
//! - [`ExportError`] - top-level export facade errors
//! - [`ServerError`] - HTTP transport errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors in the export configuration itself.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A column procedure has an empty column reference.
    #[error("Column procedure has an empty column reference")]
    EmptyColumn,

    /// A column procedure names no transform.
    #[error("Column procedure for '{0}' names no transform")]
    EmptyTransform(String),

    /// A cell address could not be parsed.
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// An unrecognized cell type name.
    #[error("Unknown cell type '{cell_type}' for column '{column}'")]
    UnknownCellType { column: String, cell_type: String },

    /// A transform name that resolves to nothing in the registry.
    #[error("Transform '{transform}' for column '{column}' is not registered")]
    UnknownTransform { column: String, transform: String },
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Errors while executing a column procedure against a record.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The named transform is not in the registry.
    #[error("Missing transform '{name}' at cell {address}")]
    MissingTransform { name: String, address: String },

    /// The procedure is structurally unusable.
    #[error("Malformed procedure at cell {address}: {reason}")]
    MalformedProcedure { address: String, reason: String },
}

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors during CSV line serialization and transcoding.
#[derive(Debug, Error)]
pub enum CsvError {
    /// The in-memory row buffer could not be written or flushed.
    #[error("Row buffer error: {0}")]
    Buffer(String),

    /// A character has no representation in the target encoding.
    #[error("Text cannot be represented in {encoding}")]
    Encoding { encoding: String },
}

impl From<csv::Error> for CsvError {
    fn from(e: csv::Error) -> Self {
        CsvError::Buffer(e.to_string())
    }
}

// =============================================================================
// Document Errors
// =============================================================================

/// Errors during spreadsheet document assembly.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Configuration error surfaced at compile time.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Column procedure execution failed.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// A value could not be coerced to its declared cell type.
    #[error("Cannot coerce value at cell {address} to {cell_type}: {value}")]
    Coerce {
        address: String,
        cell_type: String,
        value: String,
    },

    /// The binary writer failed.
    #[error("Document writer error: {0}")]
    Writer(String),

    /// Too many rows for the legacy format.
    #[error("Row {0} exceeds the 65535-row sheet limit")]
    RowLimit(u32),

    /// IO error from the writer path.
    #[error("Document IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Export Errors (top-level)
// =============================================================================

/// Top-level export facade errors.
///
/// This is the error type behind the typed `try_*` facade methods.
/// The lossy methods log these and return empty output instead.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Transform error.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Document assembly error.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// No exporter registered under the requested name.
    #[error("Unknown export: {0}")]
    UnknownExport(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for transform execution.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for document assembly.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
