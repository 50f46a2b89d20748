//! Export facade.
//!
//! [`CsvExporter`] and [`ExcelExporter`] are the crate's front door.
//! Each operation exists in two forms: a typed `try_*` method returning
//! `Result`, and a lossy twin that logs the failure to the broadcast
//! channel and returns empty output. The lossy form matches how callers
//! behind an HTTP boundary historically consumed these exporters; the
//! typed form is for callers that need to tell an error apart from a
//! genuinely empty document.

use encoding_rs::Encoding;
use serde_json::Value;

use crate::api::logs::log_error;
use crate::csv::{self, DEFAULT_LEGACY_ENCODING};
use crate::document::DocumentBuilder;
use crate::error::{ExportResult, ServerError};
use crate::models::Record;
use crate::registry::ExportConfig;
use crate::transform;

/// Common surface for attachment-producing exporters.
pub trait FileExporter {
    /// MIME type the output should be served with.
    fn content_type(&self) -> &'static str;

    /// File extension, without the leading dot.
    fn extension(&self) -> &'static str;

    /// Compile records into an attachment body.
    fn try_output(&self, records: &[Record]) -> ExportResult<Vec<u8>>;

    /// Lossy twin of [`try_output`]: logs the error and returns an
    /// empty body.
    ///
    /// [`try_output`]: FileExporter::try_output
    fn output(&self, records: &[Record]) -> Vec<u8> {
        recover(self.try_output(records)).unwrap_or_default()
    }
}

fn recover<T>(result: ExportResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log_error(format!("export failed: {err}"));
            None
        }
    }
}

/// CSV document exporter.
pub struct CsvExporter {
    config: ExportConfig,
    encoding: &'static Encoding,
}

impl CsvExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config,
            encoding: DEFAULT_LEGACY_ENCODING,
        }
    }

    /// Override the legacy output encoding (Shift_JIS by default).
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Serialize one row of already-extracted field values.
    pub fn try_row(&self, fields: &[Value]) -> ExportResult<String> {
        Ok(csv::serialize_row(fields)?)
    }

    /// Lossy twin of [`try_row`].
    ///
    /// [`try_row`]: CsvExporter::try_row
    pub fn row(&self, fields: &[Value]) -> String {
        recover(self.try_row(fields)).unwrap_or_default()
    }

    /// CRLF-normalize and transcode to the exporter's legacy encoding.
    pub fn try_windows(&self, text: &str) -> ExportResult<Vec<u8>> {
        Ok(csv::windows_encode(text, self.encoding)?)
    }

    /// Lossy twin of [`try_windows`].
    ///
    /// [`try_windows`]: CsvExporter::try_windows
    pub fn windows(&self, text: &str) -> Vec<u8> {
        recover(self.try_windows(text)).unwrap_or_default()
    }

    /// Build the full document: one header line, then one line per
    /// record with the configured procedures applied in order.
    pub fn try_document(&self, records: &[Record]) -> ExportResult<String> {
        self.config.validate()?;

        let mut lines = Vec::with_capacity(records.len() + 1);
        let header: Vec<Value> = self
            .config
            .header
            .resolved()?
            .into_iter()
            .map(|(_, label)| Value::String(label.to_string()))
            .collect();
        if !header.is_empty() {
            lines.push(csv::serialize_row(&header)?);
        }

        for (index, record) in records.iter().enumerate() {
            let row = self.config.start_row + index as u32;
            let mut fields = Vec::with_capacity(self.config.procedures.len());
            for procedure in &self.config.procedures {
                let (value, _) = transform::execute(&self.config.registry, procedure, record, row)?;
                fields.push(value);
            }
            lines.push(csv::serialize_row(&fields)?);
        }

        Ok(lines.join("\n"))
    }

    /// Lossy twin of [`try_document`].
    ///
    /// [`try_document`]: CsvExporter::try_document
    pub fn document(&self, records: &[Record]) -> String {
        recover(self.try_document(records)).unwrap_or_default()
    }
}

impl FileExporter for CsvExporter {
    fn content_type(&self) -> &'static str {
        "text/csv"
    }

    fn extension(&self) -> &'static str {
        "csv"
    }

    fn try_output(&self, records: &[Record]) -> ExportResult<Vec<u8>> {
        let document = self.try_document(records)?;
        self.try_windows(&document)
    }
}

/// Legacy binary .xls exporter.
pub struct ExcelExporter {
    config: ExportConfig,
}

impl ExcelExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Compile records into a complete .xls file.
    pub fn try_compile(&self, records: &[Record]) -> ExportResult<Vec<u8>> {
        self.config.validate()?;
        Ok(DocumentBuilder::new(&self.config).compile(records)?)
    }

    /// Lossy twin of [`try_compile`].
    ///
    /// [`try_compile`]: ExcelExporter::try_compile
    pub fn compile(&self, records: &[Record]) -> Vec<u8> {
        recover(self.try_compile(records)).unwrap_or_default()
    }
}

impl FileExporter for ExcelExporter {
    fn content_type(&self) -> &'static str {
        "application/vnd.ms-excel"
    }

    fn extension(&self) -> &'static str {
        "xls"
    }

    fn try_output(&self, records: &[Record]) -> ExportResult<Vec<u8>> {
        self.try_compile(records)
    }
}

/// Named exporters registered at startup, looked up per request.
pub struct ExporterCatalog {
    entries: Vec<(String, ExportConfig)>,
}

impl ExporterCatalog {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a configuration under a request name.
    ///
    /// The configuration is validated here so a broken registration
    /// fails at startup instead of on first request.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        config: ExportConfig,
    ) -> Result<(), crate::error::ConfigError> {
        config.validate()?;
        self.entries.push((name.into(), config));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ExportConfig, ServerError> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| ServerError::UnknownExport(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl Default for ExporterCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::logs::LOG_BROADCASTER;
    use crate::models::{CellType, HeaderSpec};
    use crate::registry::ColumnProcedure;
    use serde_json::json;

    fn users_config() -> ExportConfig {
        let mut config = ExportConfig::new("利用者");
        config.header = HeaderSpec::from_labels(&["氏名", "メール"]);
        config.procedures = vec![
            ColumnProcedure::new("A", "extractName", CellType::String),
            ColumnProcedure::new("B", "extractEmail", CellType::String),
        ];
        config.registry.register_field("extractName", "name");
        config.registry.register_field("extractEmail", "email");
        config
    }

    fn user(name: &str, email: &str) -> Record {
        let mut record = Record::new();
        record.insert("name".into(), json!(name));
        record.insert("email".into(), json!(email));
        record
    }

    #[test]
    fn test_document_builds_header_and_rows() {
        let exporter = CsvExporter::new(users_config());
        let text = exporter
            .try_document(&[user("田中", "tanaka@example.jp"), user("Doe, Jane", "jane@example.jp")])
            .unwrap();
        assert_eq!(
            text,
            "氏名,メール\n田中,tanaka@example.jp\n\"Doe, Jane\",jane@example.jp"
        );
    }

    #[test]
    fn test_output_is_shift_jis_with_crlf() {
        let exporter = CsvExporter::new(users_config());
        let bytes = exporter.try_output(&[user("田中", "tanaka@example.jp")]).unwrap();
        let (decoded, _, _) = DEFAULT_LEGACY_ENCODING.decode(&bytes);
        assert_eq!(decoded, "氏名,メール\r\n田中,tanaka@example.jp");
    }

    #[test]
    fn test_excel_output_is_ole2() {
        let exporter = ExcelExporter::new(users_config());
        let bytes = exporter.try_compile(&[user("田中", "t@example.jp")]).unwrap();
        assert_eq!(&bytes[0..4], &[0xD0, 0xCF, 0x11, 0xE0]);
    }

    #[test]
    fn test_compiled_file_round_trips_through_disk() {
        let exporter = ExcelExporter::new(users_config());
        let bytes = exporter.try_compile(&[user("田中", "t@example.jp")]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.xls");
        std::fs::write(&path, &bytes).unwrap();
        let read = std::fs::read(&path).unwrap();
        assert_eq!(read, bytes);
        assert_eq!(read.len() % 512, 0);
    }

    #[test]
    fn test_lossy_failure_is_empty_and_logged_once() {
        let mut config = users_config();
        config
            .procedures
            .push(ColumnProcedure::new("C", "extractPhone", CellType::String));

        let mut rx = LOG_BROADCASTER.subscribe();
        let exporter = CsvExporter::new(config);
        let text = exporter.document(&[user("田中", "t@example.jp")]);
        assert_eq!(text, "");

        let mut mentions = 0;
        while let Ok(entry) = rx.try_recv() {
            if entry.message.contains("extractPhone") {
                mentions += 1;
            }
        }
        assert_eq!(mentions, 1);
    }

    #[test]
    fn test_typed_failure_names_the_transform() {
        let mut config = users_config();
        config
            .procedures
            .push(ColumnProcedure::new("C", "extractPhone", CellType::String));
        let exporter = CsvExporter::new(config);
        let err = exporter.try_document(&[user("a", "b")]).unwrap_err();
        assert!(err.to_string().contains("extractPhone"));
    }

    #[test]
    fn test_exporter_attachment_surface() {
        let csv = CsvExporter::new(users_config());
        assert_eq!(csv.content_type(), "text/csv");
        assert_eq!(csv.extension(), "csv");
        let xls = ExcelExporter::new(users_config());
        assert_eq!(xls.content_type(), "application/vnd.ms-excel");
        assert_eq!(xls.extension(), "xls");
    }

    #[test]
    fn test_catalog_rejects_broken_registration() {
        let mut catalog = ExporterCatalog::new();
        let mut config = users_config();
        config.procedures.push(ColumnProcedure::new("", "noop", CellType::String));
        assert!(catalog.register("broken", config).is_err());

        catalog.register("users", users_config()).unwrap();
        assert!(catalog.get("users").is_ok());
        assert!(matches!(catalog.get("nope"), Err(ServerError::UnknownExport(_))));
    }
}
