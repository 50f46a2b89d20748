//! Sheetport server binary.
//!
//! Starts the export HTTP server with a sample "users" export
//! registered. The listen port comes from the `PORT` environment
//! variable (default 3000).

use sheetport::{
    CellType, ColumnProcedure, DocumentMetadata, ExportConfig, ExporterCatalog, HeaderSpec,
};

const DEFAULT_PORT: u16 = 3000;

fn users_export() -> ExportConfig {
    let mut config = ExportConfig::new("Users");
    config.header = HeaderSpec::from_labels(&["Name", "Email", "Age", "Active"]);
    config.procedures = vec![
        ColumnProcedure::new("A", "extractName", CellType::String),
        ColumnProcedure::new("B", "extractEmail", CellType::String),
        ColumnProcedure::new("C", "extractAge", CellType::Numeric),
        ColumnProcedure::new("D", "extractActive", CellType::Boolean),
    ];
    config.registry.register_field("extractName", "name");
    config.registry.register_field("extractEmail", "email");
    config.registry.register_field("extractAge", "age");
    config.registry.register_field("extractActive", "active");
    config.metadata = DocumentMetadata {
        creator: "sheetport".to_string(),
        title: "Users".to_string(),
        ..DocumentMetadata::default()
    };
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let mut catalog = ExporterCatalog::new();
    catalog.register("users", users_export())?;

    sheetport::server::start_server(port, catalog).await
}
